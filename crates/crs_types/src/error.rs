use thiserror::Error;

// -----------------------------------------------------------------------------
// InvokeError

/// A failure raised while a finalized procedure (or a host accessor it calls)
/// is running.
///
/// Build-time failures are reported by the emitter instead; only coercions
/// whose outcome depends on the concrete runtime value surface here.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum InvokeError {
    #[error("object reference not set to an instance of an object")]
    NullReference,

    #[error("unable to cast `{from}` to `{to}`")]
    InvalidCast { from: String, to: String },

    #[error("index {index} is outside the bounds of an array of length {len}")]
    IndexOutOfRange { index: i64, len: usize },

    #[error("evaluation stack underflow")]
    StackUnderflow,

    #[error("expected {expected} arguments, found {found}")]
    ArgumentCount { expected: usize, found: usize },

    #[error("expected {expected}, found `{found}`")]
    TypeMismatch { expected: &'static str, found: String },

    #[error("procedure threw: {0}")]
    Thrown(String),

    #[error("host accessor failed: {0}")]
    Host(String),
}

impl InvokeError {
    /// Shorthand for [`InvokeError::TypeMismatch`] describing `found` by its
    /// debug representation.
    #[cold]
    pub fn mismatch(expected: &'static str, found: &impl core::fmt::Debug) -> Self {
        Self::TypeMismatch {
            expected,
            found: format!("{found:?}"),
        }
    }
}
