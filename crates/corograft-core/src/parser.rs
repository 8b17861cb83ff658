//! # Register-Line Parser
//!
//! Turns a line such as
//!
//! ```text
//! RSP:0x7ffeeb1a0c20 RIP:0x0000000000401234 RAX:0x0 RDI:1
//! ```
//!
//! into a [`RegisterSet`] in kernel slot order. Names are matched
//! case-insensitively; values are decimal or `0x` hexadecimal, optionally
//! signed. Any bad token rejects the whole line.

use std::io::{self, BufRead};

use tracing::{debug, warn};

use crate::error::ParseError;
use crate::types::{RegisterSet, X86_64Register};

/// Parse one register line.
///
/// Unnamed slots are zero. When a register is named twice the last value
/// wins.
///
/// ## Example
///
/// ```rust
/// use corograft_core::parser::parse_register_line;
/// use corograft_core::types::X86_64Register;
///
/// let regs = parse_register_line("rsp:0x1000 RIP:4096\r\n").unwrap();
/// assert_eq!(regs.get(X86_64Register::Rsp), 0x1000);
/// assert_eq!(regs.get(X86_64Register::Rip), 4096);
///
/// assert!(parse_register_line("RSP:0x1000 FOO:0x1").is_err());
/// ```
///
/// ## Errors
///
/// - `ParseError::MissingSeparator`: a token has no `:`
/// - `ParseError::UnknownRegister`: a name is not one of the 17 registers
/// - `ParseError::InvalidValue`: a value is empty, out of range, or has
///   trailing characters
pub fn parse_register_line(line: &str) -> Result<RegisterSet, ParseError>
{
    let mut regs = RegisterSet::new();
    for token in line.trim_end_matches(['\r', '\n']).split(' ').filter(|t| !t.is_empty()) {
        let (name, value) = token
            .split_once(':')
            .ok_or_else(|| ParseError::MissingSeparator(token.to_string()))?;
        let reg: X86_64Register = name
            .parse()
            .map_err(|()| ParseError::UnknownRegister(name.to_string()))?;
        let value = parse_value(value).ok_or_else(|| ParseError::InvalidValue {
            register: reg.name().to_string(),
            value: value.to_string(),
        })?;
        regs.set(reg, value);
    }
    Ok(regs)
}

/// Parse a signed decimal or `0x` hexadecimal literal.
///
/// Hexadecimal accepts the full `u64` range so addresses above
/// `i64::MAX` survive; a leading `-` stores the two's complement.
fn parse_value(text: &str) -> Option<u64>
{
    let (negative, digits) = match text.as_bytes().first()? {
        b'-' => (true, &text[1..]),
        b'+' => (false, &text[1..]),
        _ => (false, text),
    };
    let magnitude = if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        // from_str_radix would accept a sign here
        if hex.starts_with(['+', '-']) {
            return None;
        }
        u64::from_str_radix(hex, 16).ok()?
    } else {
        if digits.starts_with(['+', '-']) {
            return None;
        }
        let value = digits.parse::<u64>().ok()?;
        // Decimal literals are signed 64-bit
        if value > i64::MAX as u64 + u64::from(negative) {
            return None;
        }
        value
    };

    Some(if negative { magnitude.wrapping_neg() } else { magnitude })
}

/// A line that was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedLine
{
    /// 1-based line number
    pub line_number: usize,
    /// Why the line was rejected
    pub error: ParseError,
}

/// Everything read from a register file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedLines
{
    /// Register sets, in input order
    pub threads: Vec<RegisterSet>,
    /// Lines that failed to parse
    pub rejected: Vec<RejectedLine>,
}

/// Parse every line of `reader`.
///
/// Blank lines are ignored. A line that fails to parse is logged, recorded in
/// [`ParsedLines::rejected`], and skipped; the rest of the input is still
/// read.
///
/// ## Errors
///
/// Only I/O errors from `reader` are returned.
pub fn parse_register_lines<R: BufRead>(reader: R) -> io::Result<ParsedLines>
{
    let mut parsed = ParsedLines::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        match parse_register_line(&line) {
            Ok(regs) => {
                debug!("line {line_number}: parsed thread registers");
                parsed.threads.push(regs);
            }
            Err(error) => {
                warn!("parse reg fail on line {line_number} ({error}): {line}");
                parsed.rejected.push(RejectedLine { line_number, error });
            }
        }
    }
    Ok(parsed)
}
