//! # ELF Core Layout
//!
//! Bounds-checked views over the pieces of an x86-64 ELF core file that the
//! scanner and injector need: the file header, the `PT_NOTE` program header,
//! and the note records inside the note segment.
//!
//! The on-disk structures come from `object::elf`, read as Pod values. Only
//! little-endian x86-64 cores are handled.
//!
//! ## Note Record Layout
//!
//! ```text
//! +----------+----------+--------+----------------------+----------------------+
//! | n_namesz | n_descsz | n_type | name (align4)        | desc (align4)        |
//! +----------+----------+--------+----------------------+----------------------+
//!   4 bytes    4 bytes    4 bytes
//! ```
//!
//! ## References
//!
//! - [ELF-64 Object File Format](https://uclibc.org/docs/elf-64-gen.pdf)
//! - `elf_prstatus` in `include/uapi/linux/elfcore.h`

use object::elf::{
    FileHeader64, NoteHeader64, ProgramHeader64, SectionHeader64, ELFCLASS64, ELFMAG, EM_X86_64, ET_CORE,
    NT_PRSTATUS, PN_XNUM, PT_NOTE,
};
use object::endian::LittleEndian;
use object::pod;

use crate::error::{CoreError, CoreResult};
use crate::io::{read_exact_at, Storage};
use crate::types::{RegisterSet, ThreadId};

/// Byte order of every supported core file
pub const LE: LittleEndian = LittleEndian;

/// `sizeof(Elf64_Ehdr)`
pub const FILE_HEADER_SIZE: usize = 64;
/// `sizeof(Elf64_Phdr)`
pub const PROGRAM_HEADER_SIZE: usize = 56;
/// `sizeof(Elf64_Shdr)`
pub const SECTION_HEADER_SIZE: usize = 64;
/// `sizeof(Elf64_Nhdr)`
pub const NOTE_HEADER_SIZE: usize = 12;

/// Offset of `pr_pid` inside an x86-64 `elf_prstatus`
pub const PRSTATUS_PID_OFFSET: usize = 32;
/// Offset of `pr_reg` inside an x86-64 `elf_prstatus`
pub const PRSTATUS_REG_OFFSET: usize = 112;
/// Smallest `elf_prstatus` description that still holds the full register set
pub const PRSTATUS_MIN_SIZE: usize = PRSTATUS_REG_OFFSET + RegisterSet::BYTES;

/// Round `n` up to a multiple of 4
pub const fn align4(n: u64) -> u64
{
    (n + 3) & !3
}

/// The fields of the ELF file header the scanner cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreHeader
{
    /// File offset of the program header table
    pub phoff: u64,
    /// Size of one program header entry
    pub phentsize: u16,
    /// Number of program headers (`PN_XNUM` already resolved)
    pub phnum: u32,
    /// File offset of the section header table (used for `PN_XNUM`)
    pub shoff: u64,
}

impl CoreHeader
{
    /// Read and validate the file header at offset 0.
    ///
    /// ## Errors
    ///
    /// - `CoreError::Format`: the file is too short, or is not a 64-bit
    ///   x86-64 ELF core
    /// - `CoreError::Io`: reading failed for another reason
    pub fn read<S: Storage + ?Sized>(storage: &mut S) -> CoreResult<Self>
    {
        let mut buf = [0u8; FILE_HEADER_SIZE];
        read_exact_at(storage, 0, &mut buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => CoreError::format("file is shorter than an ELF header"),
            _ => CoreError::Io(e),
        })?;

        let mut header = Self::parse(&buf)?;
        if header.phnum == u32::from(PN_XNUM) {
            header.phnum = header.read_extended_phnum(storage)?;
        }
        Ok(header)
    }

    /// Validate a raw 64-byte file header.
    ///
    /// ## Errors
    ///
    /// - `CoreError::Format`: bad magic, not `ELFCLASS64`, not `ET_CORE`,
    ///   not `EM_X86_64`, or an unexpected program header entry size
    pub fn parse(bytes: &[u8]) -> CoreResult<Self>
    {
        let (ehdr, _) = pod::from_bytes::<FileHeader64<LittleEndian>>(bytes)
            .map_err(|()| CoreError::format("file is shorter than an ELF header"))?;

        if ehdr.e_ident.magic != ELFMAG {
            return Err(CoreError::format("not an ELF file"));
        }
        if ehdr.e_ident.class != ELFCLASS64 {
            return Err(CoreError::format("not a 64-bit ELF file"));
        }
        let e_type = ehdr.e_type.get(LE);
        if e_type != ET_CORE {
            return Err(CoreError::Format(format!("not a core file (e_type {e_type})")));
        }
        let machine = ehdr.e_machine.get(LE);
        if machine != EM_X86_64 {
            return Err(CoreError::Format(format!("unsupported machine {machine}, only x86-64 cores are handled")));
        }
        let phentsize = ehdr.e_phentsize.get(LE);
        if usize::from(phentsize) != PROGRAM_HEADER_SIZE {
            return Err(CoreError::Format(format!("unexpected program header size {phentsize}")));
        }

        Ok(Self {
            phoff: ehdr.e_phoff.get(LE),
            phentsize,
            phnum: u32::from(ehdr.e_phnum.get(LE)),
            shoff: ehdr.e_shoff.get(LE),
        })
    }

    /// Cores with 65535 or more segments keep the real count in `sh_info`
    /// of section header 0.
    fn read_extended_phnum<S: Storage + ?Sized>(&self, storage: &mut S) -> CoreResult<u32>
    {
        if self.shoff == 0 {
            return Err(CoreError::format("e_phnum is PN_XNUM but there is no section header"));
        }
        let mut buf = [0u8; SECTION_HEADER_SIZE];
        read_exact_at(storage, self.shoff, &mut buf)?;
        let (shdr, _) = pod::from_bytes::<SectionHeader64<LittleEndian>>(&buf)
            .map_err(|()| CoreError::format("truncated section header"))?;
        Ok(shdr.sh_info.get(LE))
    }

    /// File offset of program header `index`
    pub fn program_header_offset(&self, index: u32) -> CoreResult<u64>
    {
        u64::from(index)
            .checked_mul(u64::from(self.phentsize))
            .and_then(|rel| rel.checked_add(self.phoff))
            .ok_or_else(|| CoreError::format("program header table offset overflows"))
    }
}

/// A copy of the `PT_NOTE` program header
///
/// The scanner reads it, the injector writes a relocated copy back to the
/// same file offset, and rollback writes the original bytes back again.
#[derive(Debug, Clone, Copy)]
pub struct NoteDescriptor
{
    raw: ProgramHeader64<LittleEndian>,
}

impl NoteDescriptor
{
    /// Decode a 56-byte program header.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self>
    {
        let (raw, _) = pod::from_bytes::<ProgramHeader64<LittleEndian>>(bytes)
            .map_err(|()| CoreError::format("truncated program header"))?;
        Ok(Self { raw: *raw })
    }

    /// Raw on-disk bytes of the header
    pub fn as_bytes(&self) -> &[u8]
    {
        pod::bytes_of(&self.raw)
    }

    /// Whether this is a `PT_NOTE` header
    pub fn is_note(&self) -> bool
    {
        self.raw.p_type.get(LE) == PT_NOTE
    }

    /// `p_offset`: where the segment payload starts in the file
    pub fn offset(&self) -> u64
    {
        self.raw.p_offset.get(LE)
    }

    /// `p_filesz`: payload size in the file
    pub fn file_size(&self) -> u64
    {
        self.raw.p_filesz.get(LE)
    }

    /// Copy of this header pointing at a new payload location
    ///
    /// Every other field (type, flags, addresses, alignment) is kept.
    #[must_use]
    pub fn relocated(&self, offset: u64, file_size: u64) -> Self
    {
        let mut raw = self.raw;
        raw.p_offset.set(LE, offset);
        raw.p_filesz.set(LE, file_size);
        Self { raw }
    }
}

impl PartialEq for NoteDescriptor
{
    fn eq(&self, other: &Self) -> bool
    {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for NoteDescriptor {}

/// One note record borrowed from a note segment buffer
#[derive(Debug, Clone, Copy)]
pub struct NoteRecord<'a>
{
    /// Offset of the record inside the segment
    pub offset: usize,
    /// `n_type`
    pub note_type: u32,
    /// Name bytes (unpadded, `n_namesz` long)
    pub name: &'a [u8],
    /// Description bytes (unpadded, `n_descsz` long)
    pub desc: &'a [u8],
    /// Offset of the description relative to the start of the record
    pub desc_offset: usize,
    /// Padded record size: header + align4(name) + align4(desc)
    pub size: usize,
    /// The whole padded record
    pub bytes: &'a [u8],
}

impl<'a> NoteRecord<'a>
{
    /// Decode the record at the start of `data`, if it fits.
    ///
    /// Returns `None` when either the 12-byte header or the full padded
    /// record runs past the end of `data`.
    pub fn parse(data: &'a [u8], offset: usize) -> Option<Self>
    {
        let (nhdr, _) = pod::from_bytes::<NoteHeader64<LittleEndian>>(data).ok()?;
        let namesz = u64::from(nhdr.n_namesz.get(LE));
        let descsz = u64::from(nhdr.n_descsz.get(LE));

        let desc_offset = NOTE_HEADER_SIZE as u64 + align4(namesz);
        let size = desc_offset + align4(descsz);
        if size > data.len() as u64 {
            return None;
        }
        // Both fit below data.len(), so the usize casts are lossless.
        let desc_offset = desc_offset as usize;
        let size = size as usize;

        Some(Self {
            offset,
            note_type: nhdr.n_type.get(LE),
            name: &data[NOTE_HEADER_SIZE..NOTE_HEADER_SIZE + namesz as usize],
            desc: &data[desc_offset..desc_offset + descsz as usize],
            desc_offset,
            size,
            bytes: &data[..size],
        })
    }

    /// Whether this is an `NT_PRSTATUS` (per-thread status) record
    pub fn is_prstatus(&self) -> bool
    {
        self.note_type == NT_PRSTATUS
    }

    /// `pr_pid` of an `NT_PRSTATUS` record
    ///
    /// ## Errors
    ///
    /// - `CoreError::Format`: the description is too small to hold a full
    ///   x86-64 `elf_prstatus` register set
    pub fn thread_id(&self) -> CoreResult<ThreadId>
    {
        if self.desc.len() < PRSTATUS_MIN_SIZE {
            return Err(CoreError::Format(format!(
                "NT_PRSTATUS record at offset {} has a {}-byte description, need at least {PRSTATUS_MIN_SIZE}",
                self.offset,
                self.desc.len()
            )));
        }
        let mut pid = [0u8; 4];
        pid.copy_from_slice(&self.desc[PRSTATUS_PID_OFFSET..PRSTATUS_PID_OFFSET + 4]);
        Ok(ThreadId(i32::from_le_bytes(pid)))
    }
}

/// Walks the records of a note segment in order
///
/// Stops at the first record that does not fit; [`NoteIter::remaining`] then
/// tells how many bytes were left over.
#[derive(Debug, Clone)]
pub struct NoteIter<'a>
{
    data: &'a [u8],
    pos: usize,
}

impl<'a> NoteIter<'a>
{
    /// Start walking at the beginning of `data`
    pub fn new(data: &'a [u8]) -> Self
    {
        Self { data, pos: 0 }
    }

    /// Bytes not covered by the records walked so far
    pub fn remaining(&self) -> usize
    {
        self.data.len() - self.pos
    }
}

impl<'a> Iterator for NoteIter<'a>
{
    type Item = NoteRecord<'a>;

    fn next(&mut self) -> Option<Self::Item>
    {
        let record = NoteRecord::parse(&self.data[self.pos..], self.pos)?;
        // A zero-size record cannot happen (the header alone is 12 bytes),
        // so the walk always makes progress.
        self.pos += record.size;
        Some(record)
    }
}

/// Stamp a thread id and register set into a copy of an `NT_PRSTATUS` record.
///
/// `desc_offset` is the description offset within `record`, as reported by
/// [`NoteRecord::desc_offset`]. The caller guarantees the description is at
/// least [`PRSTATUS_MIN_SIZE`] bytes.
pub fn patch_prstatus(record: &mut [u8], desc_offset: usize, tid: ThreadId, regs: &RegisterSet)
{
    let pid_at = desc_offset + PRSTATUS_PID_OFFSET;
    record[pid_at..pid_at + 4].copy_from_slice(&tid.raw().to_le_bytes());

    let reg_at = desc_offset + PRSTATUS_REG_OFFSET;
    regs.write_le(&mut record[reg_at..reg_at + RegisterSet::BYTES]);
}
