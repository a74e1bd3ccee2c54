//! [`Host`] implementation backed by the host application's C callbacks.
//!
//! This bridges the callback table registered at instance creation with the
//! engine's [`Host`] trait.  A `CallbackHost` just pairs the table with the
//! opaque `env` pointer for the current execution; all heavy lifting is
//! delegated to the callbacks.  The engine never dereferences `env` — it is
//! a capability token passed straight back to the host.

use crate::abi::{
    EvmBytesView, EvmCallFn, EvmEnv, EvmHash256, EvmLogFn, EvmMutableBytesView, EvmQueryFn,
    EvmQueryKey, EvmStoreFn, EvmVariant,
};
use crate::host::{CallRequest, Host, Query, Variant, MAX_LOG_TOPICS};
use crate::value::{Hash256, Uint256};

/// The four callbacks a host supplies at instance creation. All non-null;
/// immutable for the lifetime of the instance.
#[derive(Clone, Copy)]
pub struct CallbackTable {
    pub query: EvmQueryFn,
    pub store: EvmStoreFn,
    pub call: EvmCallFn,
    pub log: EvmLogFn,
}

/// Per-execution host view: the instance's callback table plus the opaque
/// environment handle of the current call. Built on the stack for each
/// `execute`, never stored.
pub struct CallbackHost {
    table: CallbackTable,
    env: *mut EvmEnv,
}

impl CallbackHost {
    pub fn new(table: CallbackTable, env: *mut EvmEnv) -> Self {
        Self { table, env }
    }
}

fn query_key(query: &Query) -> EvmQueryKey {
    match query {
        Query::Address => EvmQueryKey::Address,
        Query::Caller => EvmQueryKey::Caller,
        Query::Origin => EvmQueryKey::Origin,
        Query::GasPrice => EvmQueryKey::GasPrice,
        Query::Coinbase => EvmQueryKey::Coinbase,
        Query::Difficulty => EvmQueryKey::Difficulty,
        Query::GasLimit => EvmQueryKey::GasLimit,
        Query::Number => EvmQueryKey::Number,
        Query::Timestamp => EvmQueryKey::Timestamp,
        Query::CodeByAddress(_) => EvmQueryKey::CodeByAddress,
        Query::Balance(_) => EvmQueryKey::Balance,
        Query::StorageLoad(_) => EvmQueryKey::Storage,
    }
}

impl Host for CallbackHost {
    fn query(&self, query: Query) -> Variant {
        let arg = EvmVariant::encode_arg(&query);
        let raw = unsafe { (self.table.query)(self.env, query_key(&query), arg) };
        // The key implies the active member; decode_result copies any bytes
        // view out immediately so nothing borrowed from the host escapes.
        unsafe { raw.decode_result(&query) }
    }

    fn store_storage(&self, key: Uint256, value: Uint256) {
        unsafe { (self.table.store)(self.env, key.into(), value.into()) }
    }

    fn call(&self, request: CallRequest<'_>, output: &mut [u8]) -> i64 {
        let input = EvmBytesView {
            bytes: if request.input.is_empty() {
                core::ptr::null()
            } else {
                request.input.as_ptr()
            },
            size: request.input.len(),
        };
        let out = EvmMutableBytesView {
            bytes: if output.is_empty() {
                core::ptr::null_mut()
            } else {
                output.as_mut_ptr()
            },
            size: output.len(),
        };
        unsafe {
            (self.table.call)(
                (&request.kind).into(),
                request.gas,
                request.address.into(),
                request.value.into(),
                input,
                out,
            )
        }
    }

    fn log(&self, data: &[u8], topics: &[Hash256]) {
        assert!(topics.len() <= MAX_LOG_TOPICS, "topic count out of range");
        let view = EvmBytesView {
            bytes: if data.is_empty() {
                core::ptr::null()
            } else {
                data.as_ptr()
            },
            size: data.len(),
        };
        let wire: Vec<EvmHash256> = topics.iter().map(|t| (*t).into()).collect();
        let topics_ptr = if wire.is_empty() {
            core::ptr::null()
        } else {
            wire.as_ptr()
        };
        unsafe { (self.table.log)(view, wire.len(), topics_ptr) }
    }
}

// ---------------------------------------------------------------------------
//  Unit tests with mocked C callbacks
// ---------------------------------------------------------------------------
