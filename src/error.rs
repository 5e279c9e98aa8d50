//! Structured error taxonomy for the codec core (spec section 7).
//!
//! Every fallible operation in this crate returns [`Result<T>`], never panics on malformed
//! input. `thiserror` generates the `Display`/`std::error::Error` impls; this mirrors how
//! `rad-medica-jpegexp-rs` (a sibling JPEG2000/HTJ2K crate) structures its error enum, since the
//! teacher (`openjp2-rs`) reports failures through an `opj_event_mgr` callback instead of a
//! `Result` type.

use std::fmt;

/// One of the six error kinds surfaced by this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or unexpected marker, body-length mismatch, invalid parameter.
    #[error("format error: {0}")]
    Format(String),

    /// Packet header or body ran out of bytes; codeblock segment truncated.
    #[error("truncated input: {0}")]
    Truncation(String),

    /// Feature named by the codestream that this implementation does not support.
    #[error("unsupported feature: {0}")]
    Unsupported(String),

    /// Allocation failure, or a configuration that exceeds a hard resource limit.
    #[error("resource error: {0}")]
    Resource(String),

    /// The caller's cancellation flag was observed between tasks.
    #[error("operation cancelled")]
    Cancelled,

    /// The underlying stream failed to read, write, or seek.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    pub fn truncation(msg: impl Into<String>) -> Self {
        Error::Truncation(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Error::Unsupported(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Error::Resource(msg.into())
    }

    /// `true` for the kinds that the marker layer downgrades to a warning per spec section 7
    /// ("Malformed PLT/PPT/TLM/PPM are downgraded to warnings and the optional index is
    /// disabled").
    pub fn is_recoverable_index_error(&self) -> bool {
        matches!(self, Error::Format(_) | Error::Truncation(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// A non-fatal condition logged via `log::warn!` and then discarded; used where the spec calls
/// for "recover locally, log a warning" (T1 truncation, malformed optional index tables).
pub struct Warning(pub String);

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_kinds() {
        assert!(Error::format("x").is_recoverable_index_error());
        assert!(Error::truncation("x").is_recoverable_index_error());
        assert!(!Error::Cancelled.is_recoverable_index_error());
    }
}
