//! Error types for `vectorcore`.
//!
//! A single enum covers the taxonomy described for the whole engine: bad
//! arguments, missing registry entries, exhausted quotas, I/O failures, and
//! on-disk corruption. Every fallible component method returns [`Result`].

use thiserror::Error;

/// Result type alias for `vectorcore` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur anywhere in the engine.
///
/// Each variant carries a stable short code (`VEC-NNN`) so callers can match
/// on `code()` without depending on the Rust-level variant names.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad dtype/dim/alignment, unknown metric, or missing required parameter (VEC-001).
    #[error("[VEC-001] invalid argument: {0}")]
    InvalidArgument(String),

    /// A value was syntactically valid but out of the accepted range (VEC-002).
    #[error("[VEC-002] invalid value for '{key}': {message}")]
    InvalidValue {
        /// Name of the offending field or parameter.
        key: String,
        /// Why the value was rejected.
        message: String,
    },

    /// Named object (metric, kernel, segment, key) not found in a registry (VEC-003).
    #[error("[VEC-003] not found: {0}")]
    NoExist(String),

    /// Quota exhausted during `add` / `reserve_space` (VEC-004).
    #[error("[VEC-004] out of memory: {0}")]
    NoMemory(String),

    /// I/O short-read, short-write, or CRC mismatch on read (VEC-005).
    #[error("[VEC-005] read failed: {0}")]
    ReadData(String),

    /// I/O short-write or flush failure (VEC-006).
    #[error("[VEC-006] write failed: {0}")]
    WriteData(String),

    /// Segment missing, wrong size, or magic mismatch when reopening a storage (VEC-007).
    #[error("[VEC-007] invalid format: {0}")]
    InvalidFormat(String),

    /// Invariant violation, e.g. dumping features after their declared count is reached (VEC-008).
    #[error("[VEC-008] logic error: {0}")]
    Logic(String),

    /// Underlying OS-level I/O error (VEC-009).
    #[error("[VEC-009] io error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected internal error; please report if encountered (VEC-010).
    #[error("[VEC-010] internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the stable error code (e.g. `"VEC-001"`).
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "VEC-001",
            Self::InvalidValue { .. } => "VEC-002",
            Self::NoExist(_) => "VEC-003",
            Self::NoMemory(_) => "VEC-004",
            Self::ReadData(_) => "VEC-005",
            Self::WriteData(_) => "VEC-006",
            Self::InvalidFormat(_) => "VEC-007",
            Self::Logic(_) => "VEC-008",
            Self::Io(_) => "VEC-009",
            Self::Internal(_) => "VEC-010",
        }
    }

    /// Returns `true` if retrying the same operation could plausibly succeed.
    ///
    /// Corruption and internal errors are not recoverable; everything else
    /// (bad argument, transient read/write failure, quota exhaustion) is.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InvalidFormat(_) | Self::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_matches_variant() {
        assert_eq!(Error::InvalidArgument("x".into()).code(), "VEC-001");
        assert_eq!(Error::NoExist("metric".into()).code(), "VEC-003");
        assert_eq!(Error::Logic("bad state".into()).code(), "VEC-008");
    }

    #[test]
    fn corruption_is_not_recoverable() {
        assert!(!Error::InvalidFormat("bad magic".into()).is_recoverable());
        assert!(!Error::Internal("oops".into()).is_recoverable());
        assert!(Error::NoMemory("quota".into()).is_recoverable());
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io_err.into();
        assert_eq!(err.code(), "VEC-009");
    }
}
