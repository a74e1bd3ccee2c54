//! The code generation seam.
//!
//! The translation/optimization pipeline is an external collaborator: it
//! must hand back a callable entry point or fail with a diagnosable error.
//! [`CodegenBackend`] is that contract.  The in-tree [`ReferenceBackend`]
//! satisfies it with a small interpreter so the boundary protocol is fully
//! exercisable without a native-codegen dependency.

use std::sync::Arc;

use crate::error::{CompileError, VmError};
use crate::host::Host;
use crate::interp;
use crate::value::{Hash160, Hash256, Uint256};

/// Per-execution state handed to a compiled entry point.
pub struct ExecContext<'a> {
    pub host: &'a dyn Host,
    /// Remaining gas. Decremented as execution proceeds; never negative on
    /// a non-exceptional exit.
    pub gas: i64,
    pub input: &'a [u8],
    pub value: Uint256,
}

/// How one execution terminated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// STOP or RETURN. The output buffer is owned by the engine until the
    /// embedder destroys the result.
    Return { output: Vec<u8>, gas_left: i64 },
    /// SELFDESTRUCT. `gas_left` is carried here too; the C result layout
    /// drops it on this arm, the native API does not.
    SelfDestruct { beneficiary: Hash160, gas_left: i64 },
    /// Out-of-gas, invalid instruction, stack violation, compile failure.
    /// No output, no gas left.
    Exception,
}

type EntryPoint = dyn Fn(&mut ExecContext<'_>) -> Result<Outcome, VmError> + Send + Sync;

/// An executable artifact produced by a backend. Cheap to clone; cached
/// per code hash.
#[derive(Clone)]
pub struct CompiledCode {
    entry: Arc<EntryPoint>,
}

impl std::fmt::Debug for CompiledCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledCode").finish_non_exhaustive()
    }
}

impl CompiledCode {
    pub fn new(entry: Arc<EntryPoint>) -> Self {
        Self { entry }
    }

    pub fn run(&self, ctx: &mut ExecContext<'_>) -> Result<Outcome, VmError> {
        (self.entry)(ctx)
    }
}

/// A bytecode-to-entry-point translator.
///
/// Implementations must be safe to invoke from multiple threads; the cache
/// guarantees at most one in-flight compilation per code hash.
pub trait CodegenBackend: Send + Sync {
    /// Translates `code` into a callable artifact.
    ///
    /// The hash is the code's identity: the backend may use it for
    /// diagnostics but must not assume it matches the bytes.
    fn compile(&self, code_hash: &Hash256, code: &[u8]) -> Result<CompiledCode, CompileError>;
}

/// The in-tree reference backend: validates the bytecode up front and packages
/// the interpreter as the entry point.
///
/// A malformed program (e.g. a PUSH immediate running past the end of the
/// code) is a deterministic compile failure; the engine memoizes it per hash.
#[derive(Debug, Default)]
pub struct ReferenceBackend;

impl CodegenBackend for ReferenceBackend {
    fn compile(&self, code_hash: &Hash256, code: &[u8]) -> Result<CompiledCode, CompileError> {
        interp::validate(code)?;
        log::debug!("compiled {:?} ({} bytes) via reference backend", code_hash, code.len());
        let code: Arc<[u8]> = Arc::from(code);
        Ok(CompiledCode::new(Arc::new(move |ctx: &mut ExecContext<'_>| {
            interp::run(&code, ctx)
        })))
    }
}
