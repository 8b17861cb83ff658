//! # Note-Segment Scanner
//!
//! Finds the `PT_NOTE` segment of a core file, loads it, and walks its
//! records to pick a template `NT_PRSTATUS` record and the highest thread id.
//!
//! The scan never writes. Everything the injector needs later is returned in
//! a [`NoteScan`].

use tracing::{debug, info, warn};

use crate::elf::{CoreHeader, NoteDescriptor, NoteIter, PROGRAM_HEADER_SIZE};
use crate::error::{CoreError, CoreResult};
use crate::io::{read_exact_at, Storage};
use crate::types::ThreadId;

/// Result of a successful scan
///
/// Owns a copy of the whole note segment. The template record is the first
/// `NT_PRSTATUS` record in it; all `NT_PRSTATUS` records share its size.
/// Other records (`NT_PRPSINFO`, `NT_FPREGSET`, ...) may sit between them and
/// are never cloned.
#[derive(Debug, Clone)]
pub struct NoteScan
{
    /// The `PT_NOTE` program header as found on disk
    pub descriptor: NoteDescriptor,
    /// File offset of the program header itself (the patch target)
    pub descriptor_offset: u64,
    /// The note segment payload, `descriptor.file_size()` bytes
    pub payload: Vec<u8>,
    /// Offset of the template record inside `payload`
    pub template_offset: usize,
    /// Padded size of every `NT_PRSTATUS` record
    pub template_size: usize,
    /// Offset of the `elf_prstatus` description inside the template record
    pub template_desc_offset: usize,
    /// Largest thread id seen
    pub max_id: ThreadId,
    /// Number of `NT_PRSTATUS` records seen
    pub thread_count: usize,
    /// File size at scan time
    pub file_size: u64,
}

impl NoteScan
{
    /// Bytes of the template record
    pub fn template(&self) -> &[u8]
    {
        &self.payload[self.template_offset..self.template_offset + self.template_size]
    }
}

/// What the record walk found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadSurvey
{
    /// Offset of the first `NT_PRSTATUS` record
    pub first_offset: usize,
    /// Padded size of the first `NT_PRSTATUS` record
    pub record_size: usize,
    /// Description offset within the first record
    pub desc_offset: usize,
    /// Largest `pr_pid`
    pub max_id: ThreadId,
    /// Number of `NT_PRSTATUS` records
    pub thread_count: usize,
    /// Bytes left over after the last record that fit
    pub trailing: usize,
}

/// Scan a core file.
///
/// ## Errors
///
/// - `CoreError::Format`: not a 64-bit x86-64 core, a truncated program
///   header table, no `PT_NOTE` segment, no threads, or `NT_PRSTATUS` records
///   of different sizes
/// - `CoreError::Io`: a read or seek failed
/// - `CoreError::Resource`: the note segment buffer could not be allocated
pub fn scan<S: Storage + ?Sized>(storage: &mut S) -> CoreResult<NoteScan>
{
    let header = CoreHeader::read(storage)?;
    let file_size = storage.end_offset()?;
    debug!(
        "ELF header: phoff {} phnum {} phentsize {}",
        header.phoff, header.phnum, header.phentsize
    );

    let (descriptor, descriptor_offset) = find_note_descriptor(storage, &header)?;
    let payload = read_payload(storage, &descriptor, file_size)?;
    let survey = survey_threads(&payload)?;

    if survey.trailing > 0 {
        warn!(
            "note segment has {} trailing bytes after offset {} that do not form a record; ignoring them",
            survey.trailing,
            payload.len() - survey.trailing
        );
    }

    info!(
        "file size {}, note program header at {}, note segment offset {} size {}, max thread id {}, {} threads, record size {}",
        file_size,
        descriptor_offset,
        descriptor.offset(),
        descriptor.file_size(),
        survey.max_id,
        survey.thread_count,
        survey.record_size
    );

    Ok(NoteScan {
        descriptor,
        descriptor_offset,
        payload,
        template_offset: survey.first_offset,
        template_size: survey.record_size,
        template_desc_offset: survey.desc_offset,
        max_id: survey.max_id,
        thread_count: survey.thread_count,
        file_size,
    })
}

/// Walk the program header table and return the first `PT_NOTE` header
/// together with its own file offset.
fn find_note_descriptor<S: Storage + ?Sized>(storage: &mut S, header: &CoreHeader) -> CoreResult<(NoteDescriptor, u64)>
{
    let mut buf = [0u8; PROGRAM_HEADER_SIZE];
    for index in 0..header.phnum {
        let offset = header.program_header_offset(index)?;
        read_exact_at(storage, offset, &mut buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => CoreError::format("program header table extends past end of file"),
            _ => CoreError::Io(e),
        })?;
        let phdr = NoteDescriptor::from_bytes(&buf)?;
        if phdr.is_note() {
            debug!("PT_NOTE is program header #{index} at offset {offset}");
            return Ok((phdr, offset));
        }
    }
    Err(CoreError::format("no note segment"))
}

/// Load the whole note segment into one buffer.
fn read_payload<S: Storage + ?Sized>(storage: &mut S, descriptor: &NoteDescriptor, file_size: u64) -> CoreResult<Vec<u8>>
{
    let size = descriptor.file_size();
    let fits = descriptor
        .offset()
        .checked_add(size)
        .is_some_and(|end| end <= file_size);
    if !fits {
        return Err(CoreError::Format(format!(
            "note segment (offset {}, size {size}) extends past end of file ({file_size} bytes)",
            descriptor.offset()
        )));
    }

    let len = usize::try_from(size).map_err(|_| CoreError::Resource { size })?;
    let mut payload = Vec::new();
    payload
        .try_reserve_exact(len)
        .map_err(|_| CoreError::Resource { size })?;
    payload.resize(len, 0);

    read_exact_at(storage, descriptor.offset(), &mut payload)?;
    Ok(payload)
}

/// Walk the note records of a segment and collect thread information.
///
/// The walk ends quietly at the first record that does not fit; how many
/// bytes were left is reported in [`ThreadSurvey::trailing`].
///
/// ## Errors
///
/// - `CoreError::Format`: no `NT_PRSTATUS` record, max id of zero, a
///   truncated `elf_prstatus`, or `NT_PRSTATUS` records of different sizes
///   (the record size is used as the footprint of every synthetic thread)
pub fn survey_threads(payload: &[u8]) -> CoreResult<ThreadSurvey>
{
    let mut records = NoteIter::new(payload);
    let mut first: Option<(usize, usize, usize)> = None;
    let mut max_id = ThreadId::default();
    let mut thread_count = 0usize;

    for record in records.by_ref() {
        debug!(
            "note record at {}: type {:#x}, size {}",
            record.offset, record.note_type, record.size
        );
        if !record.is_prstatus() {
            continue;
        }

        let tid = record.thread_id()?;
        max_id = max_id.max(tid);
        thread_count += 1;

        match first {
            None => first = Some((record.offset, record.size, record.desc_offset)),
            Some((_, first_size, _)) if record.size != first_size => {
                return Err(CoreError::Format(format!(
                    "NT_PRSTATUS record at offset {} is {} bytes, expected {first_size} like the first one",
                    record.offset, record.size
                )));
            }
            Some(_) => {}
        }
    }

    let Some((first_offset, record_size, desc_offset)) = first else {
        return Err(CoreError::format("no threads found"));
    };
    if max_id == ThreadId::default() {
        return Err(CoreError::format("no threads found (all thread ids are zero)"));
    }

    Ok(ThreadSurvey {
        first_offset,
        record_size,
        desc_offset,
        max_id,
        thread_count,
        trailing: records.remaining(),
    })
}
