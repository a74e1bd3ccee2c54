//! C-compatible FFI boundary for a JIT-capable EVM execution engine.
//!
//! The host application supplies bytecode, a gas budget and four callbacks
//! (context queries, storage writes, nested calls, logs); the engine returns
//! a tagged result describing how execution terminated.  Compiled artifacts
//! are cached per instance, keyed by the caller-supplied code hash.
//!
//! The crate is usable two ways: through the `jitevm_*` `extern "C"`
//! functions below from C/Go/etc., or natively through [`Engine`] and the
//! [`Host`] trait from Rust.
//!
//! # Safety
//!
//! All pointer-taking FFI functions are `unsafe` and require careful
//! handling of memory and lifetimes.  Every result whose success arm carries
//! engine-owned memory must be released exactly once with
//! [`jitevm_destroy_result`]; all results must be destroyed before their
//! instance is.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use std::ffi::c_void;
use std::os::raw::{c_char, c_int};
use std::ptr;

use anyhow::{anyhow, Result};

mod abi;
mod backend;
mod cache;
mod callback_host;
mod engine;
mod error;
mod host;
mod interp;
mod value;

pub use abi::*;
pub use backend::{CodegenBackend, CompiledCode, ExecContext, Outcome, ReferenceBackend};
pub use cache::{CacheMode, CodeCache};
pub use callback_host::{CallbackHost, CallbackTable};
pub use engine::{CompatRuleset, Engine};
pub use error::{CompileError, EngineError, VmError};
pub use host::{
    call_succeeded, CallKind, CallRequest, Host, Query, Variant, CREATE_OUTPUT_MIN,
    MAX_LOG_TOPICS,
};
pub use value::{Hash160, Hash256, Uint256};

/// One engine instance as seen across the boundary: the native engine plus
/// the immutable callback table it was created with.
pub struct EvmInstance {
    pub engine: Engine,
    pub callbacks: CallbackTable,
}

/// Live engine-owned result allocations, tracked in debug builds so a
/// double destroy is a reportable programming error instead of silent UB.
#[cfg(debug_assertions)]
static LIVE_RESULTS: parking_lot::Mutex<std::collections::BTreeSet<usize>> =
    parking_lot::Mutex::new(std::collections::BTreeSet::new());

/// Converts a C string to a Rust string slice.
unsafe fn c_str_to_str<'a>(c_str: *const c_char) -> Result<&'a str> {
    if c_str.is_null() {
        return Err(anyhow!("null pointer"));
    }
    std::ffi::CStr::from_ptr(c_str)
        .to_str()
        .map_err(|e| anyhow!("invalid UTF-8: {}", e))
}

/// Engine software version as `major * 10_000 + minor * 100 + patch`.
#[no_mangle]
pub extern "C" fn jitevm_get_version() -> c_int {
    let mut parts = env!("CARGO_PKG_VERSION")
        .split('.')
        .map(|p| p.parse::<c_int>().unwrap_or(0));
    let major = parts.next().unwrap_or(0);
    let minor = parts.next().unwrap_or(0);
    let patch = parts.next().unwrap_or(0);
    major * 10_000 + minor * 100 + patch
}

/// Creates a new engine instance with the given callback table.
///
/// Every callback is required; returns null if any pointer is null (a
/// caller contract violation).  A single instance is thread-safe and can be
/// shared by many threads; independent instances share no compiled code.
#[no_mangle]
pub extern "C" fn jitevm_create_instance(
    query_fn: Option<EvmQueryFn>,
    store_fn: Option<EvmStoreFn>,
    call_fn: Option<EvmCallFn>,
    log_fn: Option<EvmLogFn>,
) -> *mut EvmInstance {
    let (Some(query), Some(store), Some(call), Some(log)) =
        (query_fn, store_fn, call_fn, log_fn)
    else {
        log::error!("{}", EngineError::NullCallback);
        return ptr::null_mut();
    };
    let callbacks = CallbackTable {
        query,
        store,
        call,
        log,
    };
    Box::into_raw(Box::new(EvmInstance {
        engine: Engine::default(),
        callbacks,
    }))
}

/// Destroys an instance. The handle is invalid afterwards.
///
/// # Safety
/// `instance` must be a pointer from [`jitevm_create_instance`] that has not
/// been destroyed, with no `execute` in flight; all results produced by the
/// instance must already have been destroyed.
#[no_mangle]
pub unsafe extern "C" fn jitevm_destroy_instance(instance: *mut EvmInstance) {
    if !instance.is_null() {
        drop(Box::from_raw(instance));
    }
}

/// Sets a named option (`compat`, `cache`, `cache-limit`, `opt`).
///
/// Returns true if the option was applied. Unknown names and invalid values
/// are rejected — never ignored — and leave prior configuration unchanged.
///
/// # Safety
/// `instance` must be valid; `name` and `value` must be non-null
/// NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn jitevm_set_option(
    instance: *mut EvmInstance,
    name: *const c_char,
    value: *const c_char,
) -> bool {
    if instance.is_null() {
        return false;
    }
    let (name, value) = match (c_str_to_str(name), c_str_to_str(value)) {
        (Ok(n), Ok(v)) => (n, v),
        _ => return false,
    };
    (*instance).engine.set_option(name, value)
}

/// Generates (or fetches from cache) and executes code for `code_hash`.
///
/// `gas` must be in `[0, 2^63-1]`; a negative value is a caller contract
/// violation reported as an `Exception` result.  The opaque `env` handle is
/// passed back, untouched, into every callback issued by this execution —
/// including callbacks that synchronously re-enter `jitevm_execute`.
///
/// # Safety
/// `instance` must be valid; `code` and `input_data` must reference readable
/// memory for the duration of the call (null pointers are only legal with
/// zero length).
#[no_mangle]
pub unsafe extern "C" fn jitevm_execute(
    instance: *mut EvmInstance,
    env: *mut EvmEnv,
    code_hash: EvmHash256,
    code: EvmBytesView,
    gas: i64,
    input_data: EvmBytesView,
    value: EvmUint256,
) -> EvmResult {
    let Some(inst) = instance.as_ref() else {
        log::error!("execute on null instance");
        return exception_result();
    };
    if (code.bytes.is_null() && code.size != 0)
        || (input_data.bytes.is_null() && input_data.size != 0)
    {
        log::error!("{}", EngineError::InvalidBytesView);
        return exception_result();
    }

    let host = CallbackHost::new(inst.callbacks, env);
    let outcome = match inst.engine.execute(
        &host,
        code_hash.into(),
        code.as_slice(),
        gas,
        input_data.as_slice(),
        value.into(),
    ) {
        Ok(outcome) => outcome,
        Err(err) => {
            // Programming bug on the caller's side, not a runtime condition.
            debug_assert!(false, "caller contract violation: {err}");
            log::error!("caller contract violation: {err}");
            return exception_result();
        }
    };

    match outcome {
        Outcome::Return { output, gas_left } => return_result(output, gas_left),
        Outcome::SelfDestruct {
            beneficiary,
            gas_left,
        } => {
            // The C result layout has no gas slot on this arm; the native
            // API keeps it. Known sharp edge of the wire format.
            log::debug!("selfdestruct result drops gas_left={gas_left} at the boundary");
            EvmResult {
                return_code: EvmReturnCode::SelfDestruct,
                data: EvmResultUnion {
                    selfdestruct_beneficiary: beneficiary.into(),
                },
            }
        }
        Outcome::Exception => exception_result(),
    }
}

/// Destroys an execution result, releasing the engine-owned output memory.
///
/// Must be called exactly once per result; afterwards the result must not
/// be read. In debug builds a second call panics instead of corrupting the
/// allocator; the `C-unwind` ABI lets that panic reach the caller.
///
/// # Safety
/// `result` must come from [`jitevm_execute`] and not have been destroyed.
#[no_mangle]
pub unsafe extern "C-unwind" fn jitevm_destroy_result(result: EvmResult) {
    if result.return_code != EvmReturnCode::Return {
        return;
    }
    let mem = result.data.success.internal_memory;
    if mem.is_null() {
        return;
    }
    #[cfg(debug_assertions)]
    {
        let removed = LIVE_RESULTS.lock().remove(&(mem as usize));
        assert!(removed, "jitevm_destroy_result called twice for one result");
    }
    drop(Box::from_raw(mem as *mut Vec<u8>));
}

fn exception_result() -> EvmResult {
    EvmResult {
        return_code: EvmReturnCode::Exception,
        data: EvmResultUnion {
            success: EvmResultSuccess {
                output_data: EvmBytesView::EMPTY,
                gas_left: 0,
                internal_memory: ptr::null_mut(),
            },
        },
    }
}

fn return_result(output: Vec<u8>, gas_left: i64) -> EvmResult {
    let (view, mem) = if output.is_empty() {
        (EvmBytesView::EMPTY, ptr::null_mut())
    } else {
        let boxed = Box::new(output);
        let view = EvmBytesView {
            bytes: boxed.as_ptr(),
            size: boxed.len(),
        };
        let mem = Box::into_raw(boxed) as *mut c_void;
        #[cfg(debug_assertions)]
        LIVE_RESULTS.lock().insert(mem as usize);
        (view, mem)
    };
    EvmResult {
        return_code: EvmReturnCode::Return,
        data: EvmResultUnion {
            success: EvmResultSuccess {
                output_data: view,
                gas_left,
                internal_memory: mem,
            },
        },
    }
}
