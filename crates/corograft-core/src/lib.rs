//! # corograft-core
//!
//! Binary-format engine for grafting user-space coroutines into an ELF core
//! dump as synthetic threads.
//!
//! This crate provides:
//! - Scanning a core file's `PT_NOTE` segment for a template `NT_PRSTATUS`
//!   record and the highest thread id ([`scanner`])
//! - Parsing `NAME:VALUE` register lines into kernel slot order ([`parser`])
//! - Appending synthetic thread records with rollback on failure ([`injector`])
//! - A session object tying the three together ([`session`])
//!
//! ## Supported Files
//!
//! Little-endian, 64-bit, x86-64 Linux core files. The debugger sees each
//! appended record as one more thread with the supplied registers.

pub mod elf;
pub mod error;
pub mod injector;
pub mod io;
pub mod parser;
pub mod scanner;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use error::{CoreError, CoreResult, ParseError};
pub use session::{CoreSession, ScanSummary};
pub use types::{RegisterSet, ThreadId, X86_64Register};
