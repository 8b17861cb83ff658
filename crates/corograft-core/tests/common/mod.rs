//! Synthetic x86-64 core images for integration tests.

#![allow(dead_code)]

use std::io::{self, Cursor, ErrorKind, Read, Seek, SeekFrom, Write};

use corograft_core::elf::{align4, PRSTATUS_PID_OFFSET, PRSTATUS_REG_OFFSET};
use corograft_core::io::Storage;
use object::elf::{
    FileHeader64, Ident, ProgramHeader64, SectionHeader64, ELFCLASS32, ELFCLASS64, ELFDATA2LSB, ELFMAG, ELFOSABI_NONE,
    EM_X86_64, ET_CORE, EV_CURRENT, NT_FPREGSET, NT_PRPSINFO, NT_PRSTATUS, PF_R, PN_XNUM, PT_LOAD, PT_NOTE,
};
use object::endian::{LittleEndian, U16, U32, U64};
use object::pod;

pub const LE: LittleEndian = LittleEndian;

/// `sizeof(struct elf_prstatus)` on x86-64
pub const PRSTATUS_DESC_SIZE: usize = 336;
/// Header + "CORE\0" padded to 8 + description
pub const PRSTATUS_RECORD_SIZE: usize = 12 + 8 + PRSTATUS_DESC_SIZE;

/// Program header index of PT_NOTE in every fixture (PT_LOAD comes first)
pub const NOTE_PHDR_INDEX: u64 = 1;
pub const DESCRIPTOR_OFFSET: u64 = 64 + 56 * NOTE_PHDR_INDEX;

/// Serialize one note record.
pub fn note(note_type: u32, name: &[u8], desc: &[u8]) -> Vec<u8>
{
    let mut out = Vec::new();
    out.extend_from_slice(&u32::try_from(name.len()).unwrap().to_le_bytes());
    out.extend_from_slice(&u32::try_from(desc.len()).unwrap().to_le_bytes());
    out.extend_from_slice(&note_type.to_le_bytes());
    out.extend_from_slice(name);
    out.resize(align4(out.len() as u64) as usize, 0);
    out.extend_from_slice(desc);
    out.resize(align4(out.len() as u64) as usize, 0);
    out
}

/// An `NT_PRSTATUS` record for thread `pid`.
///
/// The signal fields and every register slot are filled with recognizable
/// bytes so tests can tell template bytes from patched ones.
pub fn prstatus(pid: i32) -> Vec<u8>
{
    prstatus_sized(pid, PRSTATUS_DESC_SIZE)
}

pub fn prstatus_sized(pid: i32, desc_size: usize) -> Vec<u8>
{
    let mut desc = vec![0u8; desc_size];
    // si_signo = SIGSEGV
    desc[0..4].copy_from_slice(&11u32.to_le_bytes());
    desc[PRSTATUS_PID_OFFSET..PRSTATUS_PID_OFFSET + 4].copy_from_slice(&pid.to_le_bytes());
    for slot in 0..27 {
        let at = PRSTATUS_REG_OFFSET + slot * 8;
        if at + 8 <= desc_size {
            desc[at..at + 8].copy_from_slice(&(0x1111_0000_u64 + slot as u64).to_le_bytes());
        }
    }
    // pr_fpvalid
    if desc_size >= PRSTATUS_REG_OFFSET + 27 * 8 + 4 {
        let at = PRSTATUS_REG_OFFSET + 27 * 8;
        desc[at..at + 4].copy_from_slice(&1u32.to_le_bytes());
    }
    note(NT_PRSTATUS, b"CORE\0", &desc)
}

pub fn prpsinfo() -> Vec<u8>
{
    note(NT_PRPSINFO, b"CORE\0", &[0x5a; 136])
}

pub fn fpregset() -> Vec<u8>
{
    note(NT_FPREGSET, b"CORE\0", &[0x3c; 512])
}

/// Note payload holding one `NT_PRSTATUS` per pid and nothing else.
pub fn thread_notes(pids: &[i32]) -> Vec<u8>
{
    pids.iter().flat_map(|&pid| prstatus(pid)).collect()
}

/// Layout knobs for [`CoreImage::build`]
#[derive(Debug, Clone)]
pub struct CoreLayout
{
    pub class: u8,
    pub e_type: u16,
    pub machine: u16,
    pub with_note: bool,
    pub extended_phnum: bool,
}

impl Default for CoreLayout
{
    fn default() -> Self
    {
        Self {
            class: ELFCLASS64,
            e_type: ET_CORE,
            machine: EM_X86_64,
            with_note: true,
            extended_phnum: false,
        }
    }
}

impl CoreLayout
{
    pub fn class32() -> Self
    {
        Self {
            class: ELFCLASS32,
            ..Self::default()
        }
    }
}

/// A built core image and where its pieces landed
#[derive(Debug, Clone)]
pub struct CoreImage
{
    pub bytes: Vec<u8>,
    pub note_offset: u64,
    pub note_size: u64,
    pub load_offset: u64,
}

fn phdr(p_type: u32, offset: u64, size: u64, vaddr: u64, align: u64) -> ProgramHeader64<LittleEndian>
{
    ProgramHeader64 {
        p_type: U32::new(LE, p_type),
        p_flags: U32::new(LE, if p_type == PT_LOAD { PF_R } else { 0 }),
        p_offset: U64::new(LE, offset),
        p_vaddr: U64::new(LE, vaddr),
        p_paddr: U64::new(LE, 0),
        p_filesz: U64::new(LE, size),
        p_memsz: U64::new(LE, if p_type == PT_LOAD { size } else { 0 }),
        p_align: U64::new(LE, align),
    }
}

impl CoreImage
{
    /// ELF header, `[PT_LOAD, PT_NOTE]` program headers, the notes, then a
    /// 64-byte load segment.
    pub fn new(notes: &[u8]) -> Self
    {
        Self::build(notes, &CoreLayout::default())
    }

    pub fn build(notes: &[u8], layout: &CoreLayout) -> Self
    {
        let phnum: u64 = 2;
        let note_offset = 64 + 56 * phnum;
        let note_size = notes.len() as u64;
        let load_offset = note_offset + note_size;
        let load_size = 64u64;
        let shoff = if layout.extended_phnum { load_offset + load_size } else { 0 };

        let ehdr = FileHeader64::<LittleEndian> {
            e_ident: Ident {
                magic: ELFMAG,
                class: layout.class,
                data: ELFDATA2LSB,
                version: EV_CURRENT,
                os_abi: ELFOSABI_NONE,
                abi_version: 0,
                padding: [0; 7],
            },
            e_type: U16::new(LE, layout.e_type),
            e_machine: U16::new(LE, layout.machine),
            e_version: U32::new(LE, u32::from(EV_CURRENT)),
            e_entry: U64::new(LE, 0),
            e_phoff: U64::new(LE, 64),
            e_shoff: U64::new(LE, shoff),
            e_flags: U32::new(LE, 0),
            e_ehsize: U16::new(LE, 64),
            e_phentsize: U16::new(LE, 56),
            e_phnum: U16::new(LE, if layout.extended_phnum { PN_XNUM } else { phnum as u16 }),
            e_shentsize: U16::new(LE, 64),
            e_shnum: U16::new(LE, u16::from(layout.extended_phnum)),
            e_shstrndx: U16::new(LE, 0),
        };

        let mut bytes = Vec::new();
        bytes.extend_from_slice(pod::bytes_of(&ehdr));
        bytes.extend_from_slice(pod::bytes_of(&phdr(PT_LOAD, load_offset, load_size, 0x40_0000, 0x1000)));
        let second = if layout.with_note { PT_NOTE } else { PT_LOAD };
        bytes.extend_from_slice(pod::bytes_of(&phdr(second, note_offset, note_size, 0, 4)));
        bytes.extend_from_slice(notes);
        bytes.extend_from_slice(&[0xaa; 64]);

        if layout.extended_phnum {
            let shdr = SectionHeader64::<LittleEndian> {
                sh_name: U32::new(LE, 0),
                sh_type: U32::new(LE, 0),
                sh_flags: U64::new(LE, 0),
                sh_addr: U64::new(LE, 0),
                sh_offset: U64::new(LE, 0),
                sh_size: U64::new(LE, 0),
                sh_link: U32::new(LE, 0),
                sh_info: U32::new(LE, phnum as u32),
                sh_addralign: U64::new(LE, 0),
                sh_entsize: U64::new(LE, 0),
            };
            bytes.extend_from_slice(pod::bytes_of(&shdr));
        }

        Self {
            bytes,
            note_offset,
            note_size,
            load_offset,
        }
    }

    pub fn cursor(&self) -> Cursor<Vec<u8>>
    {
        Cursor::new(self.bytes.clone())
    }
}

/// Read the program header at `offset` of `bytes`.
pub fn read_phdr(bytes: &[u8], offset: u64) -> ProgramHeader64<LittleEndian>
{
    let start = offset as usize;
    let (phdr, _) = pod::from_bytes::<ProgramHeader64<LittleEndian>>(&bytes[start..start + 56]).unwrap();
    *phdr
}

/// Which writes a [`FailingStorage`] refuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailMode
{
    /// Only the write call with this 0-based index fails
    Nth(usize),
    /// Every write call from this 0-based index on fails
    From(usize),
    /// Nothing fails for good: odd-numbered calls return `Interrupted` or
    /// `WouldBlock` (alternating), the others accept at most 7 bytes
    Transient,
}

/// In-memory storage that fails chosen write calls
///
/// Outside [`FailMode::Transient`], every `write_all` issued by the injector
/// becomes exactly one `write` call on a `Cursor<Vec<u8>>`, so write indices
/// map to protocol steps: 0 = note payload copy, 1..=N = thread records,
/// N+1 = program header.
#[derive(Debug)]
pub struct FailingStorage
{
    pub inner: Cursor<Vec<u8>>,
    pub mode: FailMode,
    pub writes: usize,
    pub fail_truncate: bool,
}

impl FailingStorage
{
    pub fn new(bytes: Vec<u8>, mode: FailMode) -> Self
    {
        Self {
            inner: Cursor::new(bytes),
            mode,
            writes: 0,
            fail_truncate: false,
        }
    }

    pub fn bytes(&self) -> &[u8]
    {
        self.inner.get_ref()
    }
}

impl Read for FailingStorage
{
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>
    {
        self.inner.read(buf)
    }
}

impl Seek for FailingStorage
{
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>
    {
        self.inner.seek(pos)
    }
}

impl Write for FailingStorage
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>
    {
        let index = self.writes;
        self.writes += 1;
        let fail = match self.mode {
            FailMode::Nth(n) => index == n,
            FailMode::From(n) => index >= n,
            FailMode::Transient => {
                if index % 2 == 1 {
                    let kind = if index % 4 == 1 { ErrorKind::Interrupted } else { ErrorKind::WouldBlock };
                    return Err(io::Error::from(kind));
                }
                let n = buf.len().min(7);
                return self.inner.write(&buf[..n]);
            }
        };
        if fail {
            return Err(io::Error::new(ErrorKind::Other, format!("injected failure on write #{index}")));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()>
    {
        self.inner.flush()
    }
}

impl Storage for FailingStorage
{
    fn truncate(&mut self, len: u64) -> io::Result<()>
    {
        if self.fail_truncate {
            return Err(io::Error::new(ErrorKind::Other, "injected truncate failure"));
        }
        Storage::truncate(&mut self.inner, len)
    }
}
