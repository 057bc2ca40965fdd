//! Bridge error type and its host exception mapping

use crate::host::class_names;
use thiserror::Error;

/// Everything that can stop a bridge entry point
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// A required reference argument was null
    #[error("{name} == null")]
    NullArgument { name: &'static str },

    /// Negative offset/size/index, or a buffer too small for the request
    #[error("{0}")]
    IndexOutOfRange(String),

    /// The handle was destroyed (or never created)
    #[error("Tried calling method on destroyed handle")]
    DestroyedHandle,

    /// The handle is in use by another call, on this thread or another
    #[error("Handle is already in use by another call")]
    HandleBusy,

    /// The class's identities have not been bound yet
    #[error("{0} is not initialized")]
    Unbound(&'static str),

    /// The engine rejected a keyword or could not build a program from them
    #[error("{0}")]
    Keyword(String),

    /// The engine rejected a serialized program or could not use one
    #[error("{0}")]
    Program(String),

    /// A host exception is already pending and stays in place
    #[error("host exception pending")]
    PendingException,

    /// Rust code panicked inside an entry point
    #[error("panic in {entry}: {message}")]
    Panicked { entry: &'static str, message: String },
}

impl BridgeError {
    /// Host exception class raised for this error, `None` when an exception
    /// is already pending
    pub fn exception_class(&self) -> Option<&'static str> {
        match self {
            BridgeError::NullArgument { .. } => Some(class_names::NULL_POINTER_EXCEPTION),
            BridgeError::IndexOutOfRange(_) => Some(class_names::INDEX_OUT_OF_BOUNDS_EXCEPTION),
            BridgeError::DestroyedHandle | BridgeError::HandleBusy | BridgeError::Unbound(_) => {
                Some(class_names::ILLEGAL_STATE_EXCEPTION)
            }
            BridgeError::Keyword(_) => Some(class_names::KEYWORD_EXCEPTION),
            BridgeError::Program(_) => Some(class_names::PROGRAM_EXCEPTION),
            BridgeError::Panicked { .. } => Some(class_names::RUNTIME_EXCEPTION),
            BridgeError::PendingException => None,
        }
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
