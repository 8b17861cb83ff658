//! x86-64 register names and the `elf_gregset_t` slot layout.

use std::fmt;
use std::str::FromStr;

/// Number of general registers in a Linux x86-64 `elf_gregset_t`
///
/// This is `sizeof(struct user_regs_struct) / sizeof(unsigned long)`.
pub const ELF_NGREG: usize = 27;

/// x86-64 register that can be named on a register line
///
/// The variants are declared in DWARF register-number order (RAX = 0,
/// RDX = 1, ... RIP = 16), which is how unwinders and coroutine libraries
/// usually list them. That order is *not* the order the kernel writes them
/// into a core file; use [`X86_64Register::slot`] to get the position inside
/// `prstatus.pr_reg`.
///
/// ## Example
///
/// ```rust
/// use corograft_core::types::X86_64Register;
///
/// let rsp: X86_64Register = "rsp".parse().unwrap();
/// assert_eq!(rsp, X86_64Register::Rsp);
/// assert_eq!(rsp.dwarf_number(), 7);
/// assert_eq!(rsp.slot(), 19);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum X86_64Register
{
    /// RAX - Accumulator register (often used for return values)
    Rax,
    /// RDX - Data register
    Rdx,
    /// RCX - Counter register
    Rcx,
    /// RBX - Base register
    Rbx,
    /// RSI - Source index register (second argument)
    Rsi,
    /// RDI - Destination index register (first argument)
    Rdi,
    /// RBP - Base pointer (frame pointer)
    Rbp,
    /// RSP - Stack pointer
    Rsp,
    /// R8 - General-purpose register (x86-64 extension)
    R8,
    /// R9 - General-purpose register (x86-64 extension)
    R9,
    /// R10 - General-purpose register (x86-64 extension)
    R10,
    /// R11 - General-purpose register (x86-64 extension)
    R11,
    /// R12 - General-purpose register (x86-64 extension)
    R12,
    /// R13 - General-purpose register (x86-64 extension)
    R13,
    /// R14 - General-purpose register (x86-64 extension)
    R14,
    /// R15 - General-purpose register (x86-64 extension)
    R15,
    /// RIP - Instruction pointer
    Rip,
}

impl X86_64Register
{
    /// Every nameable register, in DWARF order
    pub const ALL: [X86_64Register; 17] = [
        X86_64Register::Rax,
        X86_64Register::Rdx,
        X86_64Register::Rcx,
        X86_64Register::Rbx,
        X86_64Register::Rsi,
        X86_64Register::Rdi,
        X86_64Register::Rbp,
        X86_64Register::Rsp,
        X86_64Register::R8,
        X86_64Register::R9,
        X86_64Register::R10,
        X86_64Register::R11,
        X86_64Register::R12,
        X86_64Register::R13,
        X86_64Register::R14,
        X86_64Register::R15,
        X86_64Register::Rip,
    ];

    /// DWARF register number (System V AMD64 ABI, figure 3.36)
    pub const fn dwarf_number(self) -> u16
    {
        self as u16
    }

    /// Index of this register inside `elf_gregset_t`
    ///
    /// Matches the field order of the kernel's `struct user_regs_struct`:
    ///
    /// - R15 = 0, R14 = 1, R13 = 2, R12 = 3, RBP = 4, RBX = 5
    /// - R11 = 6, R10 = 7, R9 = 8, R8 = 9
    /// - RAX = 10, RCX = 11, RDX = 12, RSI = 13, RDI = 14
    /// - RIP = 16, RSP = 19
    ///
    /// Slots 15, 17, 18 and 20-26 (`orig_rax`, segment registers, flags,
    /// fs/gs base) cannot be named and stay zero.
    pub const fn slot(self) -> usize
    {
        match self {
            X86_64Register::R15 => 0,
            X86_64Register::R14 => 1,
            X86_64Register::R13 => 2,
            X86_64Register::R12 => 3,
            X86_64Register::Rbp => 4,
            X86_64Register::Rbx => 5,
            X86_64Register::R11 => 6,
            X86_64Register::R10 => 7,
            X86_64Register::R9 => 8,
            X86_64Register::R8 => 9,
            X86_64Register::Rax => 10,
            X86_64Register::Rcx => 11,
            X86_64Register::Rdx => 12,
            X86_64Register::Rsi => 13,
            X86_64Register::Rdi => 14,
            X86_64Register::Rip => 16,
            X86_64Register::Rsp => 19,
        }
    }

    /// Upper-case register name as written on a register line
    pub const fn name(self) -> &'static str
    {
        match self {
            X86_64Register::Rax => "RAX",
            X86_64Register::Rdx => "RDX",
            X86_64Register::Rcx => "RCX",
            X86_64Register::Rbx => "RBX",
            X86_64Register::Rsi => "RSI",
            X86_64Register::Rdi => "RDI",
            X86_64Register::Rbp => "RBP",
            X86_64Register::Rsp => "RSP",
            X86_64Register::R8 => "R8",
            X86_64Register::R9 => "R9",
            X86_64Register::R10 => "R10",
            X86_64Register::R11 => "R11",
            X86_64Register::R12 => "R12",
            X86_64Register::R13 => "R13",
            X86_64Register::R14 => "R14",
            X86_64Register::R15 => "R15",
            X86_64Register::Rip => "RIP",
        }
    }
}

impl FromStr for X86_64Register
{
    type Err = ();

    /// Case-insensitive lookup by name
    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        X86_64Register::ALL
            .into_iter()
            .find(|reg| reg.name().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

impl fmt::Display for X86_64Register
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

/// A full `elf_gregset_t`: 27 register slots in kernel order
///
/// This is what gets copied into `prstatus.pr_reg` of a synthetic thread.
/// Slots that were never set are zero.
///
/// ## Example
///
/// ```rust
/// use corograft_core::types::{RegisterSet, X86_64Register};
///
/// let mut regs = RegisterSet::new();
/// regs.set(X86_64Register::Rip, 0x401234);
/// assert_eq!(regs.get(X86_64Register::Rip), 0x401234);
/// assert_eq!(regs.slots()[16], 0x401234);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterSet
{
    slots: [u64; ELF_NGREG],
}

impl RegisterSet
{
    /// Size of the set in bytes as laid out in a core file
    pub const BYTES: usize = ELF_NGREG * 8;

    /// All slots zero
    #[must_use]
    pub const fn new() -> Self
    {
        Self { slots: [0; ELF_NGREG] }
    }

    /// Value of a named register
    #[must_use]
    pub const fn get(&self, reg: X86_64Register) -> u64
    {
        self.slots[reg.slot()]
    }

    /// Overwrite a named register
    pub fn set(&mut self, reg: X86_64Register, value: u64)
    {
        self.slots[reg.slot()] = value;
    }

    /// Raw slots in kernel order
    #[must_use]
    pub const fn slots(&self) -> &[u64; ELF_NGREG]
    {
        &self.slots
    }

    /// Serialize the slots little-endian into `out`
    ///
    /// `out` must be exactly [`RegisterSet::BYTES`] long.
    pub fn write_le(&self, out: &mut [u8])
    {
        debug_assert_eq!(out.len(), Self::BYTES);
        for (chunk, value) in out.chunks_exact_mut(8).zip(self.slots.iter()) {
            chunk.copy_from_slice(&value.to_le_bytes());
        }
    }
}

impl Default for RegisterSet
{
    fn default() -> Self
    {
        Self::new()
    }
}
