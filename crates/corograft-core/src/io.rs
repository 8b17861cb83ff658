//! # Storage and Retrying I/O
//!
//! The scanner and injector never touch `std::fs::File` directly. They work
//! against the [`Storage`] trait so the same code runs on a real core file and
//! on an in-memory image.
//!
//! All reads and writes go through [`read_exact_retry`] and
//! [`write_all_retry`], which retry transient `Interrupted` / `WouldBlock`
//! conditions and give up on anything else.

use std::fs::File;
use std::io::{self, Cursor, ErrorKind, Read, Seek, SeekFrom, Write};

/// A seekable, writable byte store that can be shrunk.
///
/// Implemented for [`File`] and for `Cursor<Vec<u8>>`.
pub trait Storage: Read + Write + Seek
{
    /// Cut the store down to `len` bytes.
    ///
    /// The cursor position is left untouched.
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Current length of the store in bytes.
    ///
    /// Leaves the cursor at the end of the store.
    fn end_offset(&mut self) -> io::Result<u64>
    {
        self.seek(SeekFrom::End(0))
    }
}

impl Storage for File
{
    fn truncate(&mut self, len: u64) -> io::Result<()>
    {
        self.set_len(len)
    }
}

impl Storage for Cursor<Vec<u8>>
{
    fn truncate(&mut self, len: u64) -> io::Result<()>
    {
        let len = usize::try_from(len).map_err(|_| io::Error::new(ErrorKind::InvalidInput, "length exceeds usize"))?;
        self.get_mut().truncate(len);
        Ok(())
    }
}

impl<S: Storage + ?Sized> Storage for &mut S
{
    fn truncate(&mut self, len: u64) -> io::Result<()>
    {
        (**self).truncate(len)
    }
}

const fn is_transient(kind: ErrorKind) -> bool
{
    matches!(kind, ErrorKind::Interrupted | ErrorKind::WouldBlock)
}

/// Fill `buf` completely, retrying transient errors.
///
/// ## Errors
///
/// - `UnexpectedEof` if the reader runs dry before `buf` is full
/// - Any non-transient error from the reader
pub fn read_exact_retry<R: Read + ?Sized>(reader: &mut R, mut buf: &mut [u8]) -> io::Result<()>
{
    while !buf.is_empty() {
        match reader.read(buf) {
            Ok(0) => {
                return Err(io::Error::new(ErrorKind::UnexpectedEof, "unexpected end of file"));
            }
            Ok(n) => buf = &mut buf[n..],
            Err(e) if is_transient(e.kind()) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Write all of `buf`, retrying transient errors.
///
/// ## Errors
///
/// - `WriteZero` if the writer stops accepting bytes
/// - Any non-transient error from the writer
pub fn write_all_retry<W: Write + ?Sized>(writer: &mut W, mut buf: &[u8]) -> io::Result<()>
{
    while !buf.is_empty() {
        match writer.write(buf) {
            Ok(0) => {
                return Err(io::Error::new(ErrorKind::WriteZero, "failed to write whole buffer"));
            }
            Ok(n) => buf = &buf[n..],
            Err(e) if is_transient(e.kind()) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Seek to `offset` and read exactly `buf.len()` bytes.
pub fn read_exact_at<S: Storage + ?Sized>(storage: &mut S, offset: u64, buf: &mut [u8]) -> io::Result<()>
{
    storage.seek(SeekFrom::Start(offset))?;
    read_exact_retry(storage, buf)
}

/// Seek to `offset` and write all of `buf`.
pub fn write_all_at<S: Storage + ?Sized>(storage: &mut S, offset: u64, buf: &[u8]) -> io::Result<()>
{
    storage.seek(SeekFrom::Start(offset))?;
    write_all_retry(storage, buf)
}
