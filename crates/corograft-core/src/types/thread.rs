//! Thread identifier type.

use std::fmt;

/// Kernel thread identifier as stored in `prstatus.pr_pid`
///
/// On Linux this is the LWP id (`pid_t`, a signed 32-bit value). Debuggers use
/// it as the thread's identity: two records with the same id collapse into one
/// thread, so every synthetic thread must get a fresh value.
///
/// ## Example
///
/// ```rust
/// use corograft_core::types::ThreadId;
///
/// let tid = ThreadId::from(41);
/// assert_eq!(tid.checked_next(), Some(ThreadId::from(42)));
/// assert_eq!(ThreadId::from(i32::MAX).checked_next(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ThreadId(pub i32);

impl ThreadId
{
    /// Get the raw `pid_t` value
    pub const fn raw(self) -> i32
    {
        self.0
    }

    /// The identifier after this one, or `None` on overflow
    pub fn checked_next(self) -> Option<Self>
    {
        self.0.checked_add(1).map(ThreadId)
    }
}

impl From<i32> for ThreadId
{
    fn from(value: i32) -> Self
    {
        Self(value)
    }
}

impl From<ThreadId> for i32
{
    fn from(value: ThreadId) -> Self
    {
        value.0
    }
}

impl fmt::Display for ThreadId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}
