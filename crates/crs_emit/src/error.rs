use crs_types::info::TypeKindError;
use thiserror::Error;

use crate::label::Label;

// -----------------------------------------------------------------------------
// EmitError

/// A failure raised while a procedure is being built.
///
/// Every variant aborts the session that produced it: later calls on the
/// same builder fail with [`EmitError::SessionAborted`]. These failures are
/// deterministic for a given sequence of emission calls, retrying the same
/// shape reproduces them.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum EmitError {
    #[error("expecting end of {expected}, found {found}")]
    StructuralMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("{open} block(s) still open at end of method, innermost is {innermost}")]
    UnclosedBlock { open: usize, innermost: &'static str },

    #[error("`{method}` declares {declared} parameters, but {supplied} were supplied")]
    ArityMismatch {
        method: String,
        declared: usize,
        supplied: usize,
    },

    #[error("no conversion possible from `{from}` to `{to}`")]
    UnsupportedConversion { from: String, to: String },

    #[error("`{to}` is not assignable from `{from}`")]
    IncompatibleTypes { from: String, to: String },

    #[error("constants of type `{0}` cannot be loaded directly")]
    UnsupportedConstant(String),

    #[error("arrays of `{0}` are not supported by element instructions")]
    UnsupportedElementType(String),

    #[error("member `{member}` of `{declaring}` has no {accessor}")]
    MissingAccessor {
        declaring: String,
        member: String,
        accessor: &'static str,
    },

    #[error("data can only be stored into arguments or locals, got a constant of type `{0}`")]
    InvalidStoreTarget(String),

    #[error("argument {index} does not exist, the method takes {count}")]
    UnknownArgument { index: u32, count: usize },

    #[error("label {0} is already marked")]
    LabelAlreadyMarked(Label),

    #[error("label {0} is a branch target but was never marked")]
    LabelNotMarked(Label),

    #[error("label {0} was not defined by this session")]
    UnknownLabel(Label),

    #[error(transparent)]
    TypeKind(#[from] TypeKindError),

    #[error("the method was already finalized")]
    UseAfterFinalize,

    #[error("the session was aborted by an earlier error")]
    SessionAborted,
}

impl EmitError {
    #[cold]
    pub(crate) fn incompatible(from: &impl ToString, to: &impl ToString) -> Self {
        Self::IncompatibleTypes {
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}
