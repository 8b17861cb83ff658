//! # Error Types
//!
//! General error handling for core-file editing.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use thiserror::Error;

/// The step of the append protocol that was running when an I/O error hit.
///
/// Carried by [`CoreError::AppendFailed`] and [`CoreError::RollbackFailed`] so
/// the operator can tell which write failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendStage
{
    /// Re-appending the original note segment payload
    NotePayload,
    /// Appending the synthetic thread record with the given 0-based index
    ThreadRecord(usize),
    /// Rewriting the note program header in place
    Descriptor,
}

impl std::fmt::Display for AppendStage
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        match self {
            AppendStage::NotePayload => write!(f, "note payload"),
            AppendStage::ThreadRecord(index) => write!(f, "thread record #{index}"),
            AppendStage::Descriptor => write!(f, "note descriptor"),
        }
    }
}

/// Main error type for core-file operations
///
/// ## Error Categories
///
/// 1. **Format errors**: Format (not a supported core, no note segment, no threads)
/// 2. **I/O errors**: Io (scan phase), AppendFailed, RollbackFailed (append phase)
/// 3. **Resource errors**: Resource (note buffer allocation)
/// 4. **Input errors**: Parse (a malformed register line)
/// 5. **State errors**: SessionConsumed
#[derive(Error, Debug)]
pub enum CoreError
{
    /// The file is not something we can edit
    ///
    /// This happens when:
    /// - The file is not a 64-bit x86-64 ELF core image
    /// - There is no `PT_NOTE` program header
    /// - The note segment holds no `NT_PRSTATUS` records
    /// - `NT_PRSTATUS` records differ in size
    /// - Thread identifiers would overflow `pid_t`
    ///
    /// Nothing has been written when this error is returned.
    #[error("Invalid core file: {0}")]
    Format(String),

    /// I/O error while scanning the file
    ///
    /// Nothing has been written when this error is returned.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Appending failed and the file was restored
    ///
    /// The file has been truncated back to its original length and the note
    /// program header rewritten with its original bytes.
    #[error("Failed to append {stage}: {source}")]
    AppendFailed
    {
        /// Step that failed
        stage: AppendStage,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Appending failed and restoring the file failed too
    ///
    /// The file is in an unspecified state and must be checked by hand.
    #[error("Failed to append {stage}: {source}; rollback also failed: {rollback}")]
    RollbackFailed
    {
        /// Step that failed
        stage: AppendStage,
        /// Error that triggered the rollback
        source: std::io::Error,
        /// Error raised while rolling back
        rollback: std::io::Error,
    },

    /// Could not allocate a buffer for the note segment
    #[error("Resource exhausted: cannot allocate {size} bytes")]
    Resource
    {
        /// Requested buffer size in bytes
        size: u64,
    },

    /// A register line could not be parsed
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// The session already ran its one append operation
    #[error("Session already consumed by a previous append")]
    SessionConsumed,
}

impl CoreError
{
    pub(crate) fn format(msg: impl Into<String>) -> Self
    {
        CoreError::Format(msg.into())
    }
}

/// Errors produced while parsing a `NAME:VALUE` register line
///
/// Any of these rejects the whole line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError
{
    /// Register name is not one of the 17 supported x86-64 names
    #[error("unknown register `{0}`")]
    UnknownRegister(String),

    /// Token is not of the form `NAME:VALUE`
    #[error("expected NAME:VALUE, found `{0}`")]
    MissingSeparator(String),

    /// Value is empty, out of range, or has trailing characters
    #[error("invalid value `{value}` for register {register}")]
    InvalidValue
    {
        /// Register the value was assigned to
        register: String,
        /// Offending value text
        value: String,
    },
}

/// Convenience type alias for `Result<T, CoreError>`
///
/// ```rust
/// use corograft_core::error::CoreResult;
/// fn foo() -> CoreResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type CoreResult<T> = std::result::Result<T, CoreError>;
