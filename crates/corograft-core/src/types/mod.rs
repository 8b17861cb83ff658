//! # Types
//!
//! Value types shared by the scanner, parser, and injector.
//!
//! These types keep register slots and thread identifiers from being mixed up
//! with plain integers (file offsets, record sizes, and so on).

pub mod registers;
pub mod thread;

// Re-export all public types
pub use registers::{RegisterSet, X86_64Register, ELF_NGREG};
pub use thread::ThreadId;
