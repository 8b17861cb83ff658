//! # Core Session
//!
//! One editing session over one core file.
//!
//! ## Lifecycle
//!
//! 1. [`CoreSession::open`] (or [`CoreSession::from_storage`]) scans the file.
//!    If the scan fails there is no session.
//! 2. [`CoreSession::append_threads`] runs the append protocol once.
//! 3. [`CoreSession::into_inner`] hands the storage back (closing a file is
//!    just dropping it).
//!
//! ## Example
//!
//! ```rust,no_run
//! use corograft_core::parser::parse_register_line;
//! use corograft_core::CoreSession;
//!
//! let mut session = CoreSession::open("core.1234")?;
//! println!("{}", session.summary());
//!
//! let regs = parse_register_line("RSP:0x7ffeeb1a0c20 RIP:0x401234")?;
//! let report = session.append_threads(&[regs])?;
//! println!("added threads {:?}", report.thread_ids);
//! # Ok::<(), corograft_core::error::CoreError>(())
//! ```

use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::Path;

use tracing::info;

use crate::error::{CoreError, CoreResult};
use crate::injector::{self, InjectReport};
use crate::io::Storage;
use crate::scanner::{self, NoteScan};
use crate::types::{RegisterSet, ThreadId};

/// Scan results in printable form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary
{
    /// File size at scan time
    pub file_size: u64,
    /// File offset of the `PT_NOTE` program header
    pub descriptor_offset: u64,
    /// `p_offset` of the note segment
    pub note_offset: u64,
    /// `p_filesz` of the note segment
    pub note_size: u64,
    /// Largest thread id in the file
    pub max_id: ThreadId,
    /// Number of `NT_PRSTATUS` records
    pub thread_count: usize,
    /// Size of one `NT_PRSTATUS` record
    pub template_size: usize,
}

impl fmt::Display for ScanSummary
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        writeln!(f, "file size {}", self.file_size)?;
        writeln!(f, "note program header: offset {}", self.descriptor_offset)?;
        writeln!(f, "note program: filesz {}, offset {}", self.note_size, self.note_offset)?;
        writeln!(f, "max pid {}, thread number {}", self.max_id, self.thread_count)?;
        write!(f, "first thread size {}", self.template_size)
    }
}

/// An open, scanned core file
pub struct CoreSession<S: Storage = File>
{
    storage: S,
    scan: Option<NoteScan>,
    summary: ScanSummary,
}

impl CoreSession<File>
{
    /// Open a core file read/write and scan it.
    ///
    /// ## Errors
    ///
    /// - `CoreError::Io`: the file could not be opened or read
    /// - Any error from [`scanner::scan`]
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self>
    {
        let path = path.as_ref();
        info!("core file {}", path.display());
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Self::from_storage(file)
    }
}

impl<S: Storage> CoreSession<S>
{
    /// Scan an already open storage.
    ///
    /// ## Errors
    ///
    /// Any error from [`scanner::scan`].
    pub fn from_storage(mut storage: S) -> CoreResult<Self>
    {
        let scan = scanner::scan(&mut storage)?;
        let summary = ScanSummary {
            file_size: scan.file_size,
            descriptor_offset: scan.descriptor_offset,
            note_offset: scan.descriptor.offset(),
            note_size: scan.descriptor.file_size(),
            max_id: scan.max_id,
            thread_count: scan.thread_count,
            template_size: scan.template_size,
        };
        Ok(Self {
            storage,
            scan: Some(scan),
            summary,
        })
    }

    /// What the scan found
    pub fn summary(&self) -> ScanSummary
    {
        self.summary
    }

    /// Scan details, until the session has been consumed
    pub fn scan(&self) -> Option<&NoteScan>
    {
        self.scan.as_ref()
    }

    /// Append one synthetic thread per register set.
    ///
    /// The session is consumed by this call whatever the outcome; a second
    /// call returns `CoreError::SessionConsumed`.
    ///
    /// ## Errors
    ///
    /// - `CoreError::SessionConsumed`: already called once
    /// - Any error from [`injector::append_threads`]
    pub fn append_threads(&mut self, threads: &[RegisterSet]) -> CoreResult<InjectReport>
    {
        let scan = self.scan.take().ok_or(CoreError::SessionConsumed)?;
        injector::append_threads(&mut self.storage, &scan, threads)
    }

    /// Give back the underlying storage
    pub fn into_inner(self) -> S
    {
        self.storage
    }
}
