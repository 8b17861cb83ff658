//! # Thread Injector
//!
//! Appends synthetic `NT_PRSTATUS` records to a scanned core file.
//!
//! ## Append Protocol
//!
//! A program segment must stay contiguous, so new records cannot be slotted
//! in after the original note segment. Instead the whole segment is copied to
//! the end of the file, the new records follow it, and the `PT_NOTE` program
//! header is pointed at the copy:
//!
//! ```text
//! before: [ehdr][phdrs][notes]...[loads]
//! after:  [ehdr][phdrs'][notes]...[loads][notes copy][thread 1]..[thread N]
//!                  |                         ^
//!                  +--- p_offset, p_filesz --+
//! ```
//!
//! If any write fails, the file is truncated back to its old length and the
//! original program header bytes are written back.

use std::io;

use tracing::{debug, error, info};

use crate::elf::{patch_prstatus, NoteDescriptor};
use crate::error::{AppendStage, CoreError, CoreResult};
use crate::io::{write_all_at, write_all_retry, Storage};
use crate::scanner::NoteScan;
use crate::types::{RegisterSet, ThreadId};

/// Outcome of a successful append
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectReport
{
    /// File length before the append; the relocated note segment starts here
    pub checkpoint: u64,
    /// The program header now on disk
    pub descriptor: NoteDescriptor,
    /// Bytes added to the file
    pub appended_bytes: u64,
    /// Identifiers given to the new threads, in input order
    pub thread_ids: Vec<ThreadId>,
    /// Running maximum identifier after the append
    pub max_id: ThreadId,
}

/// Append one synthetic thread per register set.
///
/// Thread ids continue from `scan.max_id`. Nothing is written when `threads`
/// is empty.
///
/// ## Errors
///
/// - `CoreError::Format`: the new thread ids would overflow `pid_t`, or the
///   new segment size overflows (checked before any write)
/// - `CoreError::Io`: the end of the file could not be located (nothing
///   written)
/// - `CoreError::AppendFailed`: a write failed and the file was restored
/// - `CoreError::RollbackFailed`: a write failed and restoring failed too
pub fn append_threads<S: Storage + ?Sized>(
    storage: &mut S,
    scan: &NoteScan,
    threads: &[RegisterSet],
) -> CoreResult<InjectReport>
{
    if threads.is_empty() {
        info!("no thread to append");
        return Ok(InjectReport {
            checkpoint: scan.file_size,
            descriptor: scan.descriptor,
            appended_bytes: 0,
            thread_ids: Vec::new(),
            max_id: scan.max_id,
        });
    }

    let thread_ids = assign_ids(scan.max_id, threads.len())?;
    let new_size = threads
        .len()
        .checked_mul(scan.template_size)
        .and_then(|extra| u64::try_from(extra).ok())
        .and_then(|extra| extra.checked_add(scan.descriptor.file_size()))
        .ok_or_else(|| CoreError::format("note segment size overflows"))?;

    let checkpoint = storage.end_offset()?;
    let descriptor = scan.descriptor.relocated(checkpoint, new_size);

    info!(
        "append {} extra threads (ids {}..={}) at offset {checkpoint}",
        threads.len(),
        thread_ids[0],
        thread_ids[thread_ids.len() - 1]
    );

    match write_records(storage, scan, threads, &thread_ids, &descriptor) {
        Ok(()) => {
            info!(
                "note program header at {} now covers offset {} size {}",
                scan.descriptor_offset,
                descriptor.offset(),
                descriptor.file_size()
            );
            Ok(InjectReport {
                checkpoint,
                descriptor,
                appended_bytes: new_size,
                max_id: thread_ids[thread_ids.len() - 1],
                thread_ids,
            })
        }
        Err((stage, source)) => Err(roll_back(storage, scan, checkpoint, stage, source)),
    }
}

/// `max_id + 1 ..= max_id + count`
fn assign_ids(max_id: ThreadId, count: usize) -> CoreResult<Vec<ThreadId>>
{
    let mut ids = Vec::with_capacity(count);
    let mut next = max_id;
    for _ in 0..count {
        next = next
            .checked_next()
            .ok_or_else(|| CoreError::Format(format!("thread id overflow: cannot add {count} threads after {max_id}")))?;
        ids.push(next);
    }
    Ok(ids)
}

/// Steps 2 to 5 of the protocol. The storage cursor must be at end of file.
fn write_records<S: Storage + ?Sized>(
    storage: &mut S,
    scan: &NoteScan,
    threads: &[RegisterSet],
    thread_ids: &[ThreadId],
    descriptor: &NoteDescriptor,
) -> Result<(), (AppendStage, io::Error)>
{
    debug!("write source note segment data with size {}", scan.payload.len());
    write_all_retry(storage, &scan.payload).map_err(|e| (AppendStage::NotePayload, e))?;

    let mut scratch = scan.template().to_vec();
    for (index, (regs, tid)) in threads.iter().zip(thread_ids).enumerate() {
        patch_prstatus(&mut scratch, scan.template_desc_offset, *tid, regs);
        write_all_retry(storage, &scratch).map_err(|e| (AppendStage::ThreadRecord(index), e))?;
        debug!("appended thread {tid} ({} bytes)", scratch.len());
    }

    write_all_at(storage, scan.descriptor_offset, descriptor.as_bytes())
        .and_then(|()| storage.flush())
        .map_err(|e| (AppendStage::Descriptor, e))
}

/// Undo a partial append and build the error to report.
fn roll_back<S: Storage + ?Sized>(
    storage: &mut S,
    scan: &NoteScan,
    checkpoint: u64,
    stage: AppendStage,
    source: io::Error,
) -> CoreError
{
    error!("append failed at {stage}: {source}; rolling back to {checkpoint} bytes");

    let restored = storage
        .truncate(checkpoint)
        .and_then(|()| write_all_at(storage, scan.descriptor_offset, scan.descriptor.as_bytes()))
        .and_then(|()| storage.flush());

    match restored {
        Ok(()) => {
            info!("rollback complete, file restored to {checkpoint} bytes");
            CoreError::AppendFailed { stage, source }
        }
        Err(rollback) => {
            error!(
                "rollback failed: {rollback}. The core file is in an unspecified state (expected length {checkpoint}, \
                 note program header at {})",
                scan.descriptor_offset
            );
            CoreError::RollbackFailed {
                stage,
                source,
                rollback,
            }
        }
    }
}
