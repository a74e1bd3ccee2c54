//! Error taxonomy for the engine core.
//!
//! Caller contract violations surface as [`EngineError`]; execution-time VM
//! failures stay internal as [`VmError`] and collapse to the `Exception`
//! return code at the boundary — no Rust error ever crosses compiled-code
//! boundaries.

use thiserror::Error;

/// Programming errors on the caller's side of the boundary.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// `gas` outside `[0, 2^63-1]`.
    #[error("gas out of range: {0}")]
    GasOutOfRange(i64),

    /// A required callback pointer was null at instance creation.
    #[error("required callback pointer is null")]
    NullCallback,

    /// A bytes view had a null pointer but a non-zero length.
    #[error("bytes view with null pointer and non-zero length")]
    InvalidBytesView,
}

/// Execution-time VM failures. Every variant maps to the `Exception`
/// return code; the detail only reaches the embedder through logging.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VmError {
    #[error("out of gas")]
    OutOfGas,

    #[error("invalid instruction 0x{0:02x}")]
    InvalidInstruction(u8),

    #[error("stack underflow")]
    StackUnderflow,

    #[error("stack overflow")]
    StackOverflow,

    #[error("memory access out of range")]
    MemoryOutOfRange,

    #[error("host returned mismatched variant for {0:?}")]
    QueryTypeMismatch(crate::host::Query),

    #[error("code generation failed: {0}")]
    Compile(#[from] CompileError),
}

/// Failure of the code generation backend.
///
/// `deterministic` failures (malformed bytecode) are memoized per code hash;
/// transient ones are retried on the next call.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct CompileError {
    pub message: String,
    pub deterministic: bool,
}

impl CompileError {
    pub fn deterministic(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            deterministic: true,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            deterministic: false,
        }
    }
}
