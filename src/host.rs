//! The engine-side view of the host: a trait with four operations.
//!
//! Generated (or interpreted) code never touches raw callback pointers; it
//! talks to a [`Host`].  The FFI adapter in [`crate::callback_host`] bridges
//! the C callback table onto this trait, so the untagged wire variant is
//! confined to one module and everything past the seam is a proper tagged
//! enum.

use crate::value::{Hash160, Hash256, Uint256};

/// Maximum number of topics a single log entry may carry.
pub const MAX_LOG_TOPICS: usize = 4;

/// Number of leading bytes of a CREATE output buffer that carry the created
/// contract's 160-bit address. The buffer the engine provides is larger (at
/// least 160 bytes); hosts may write anywhere within it.
pub const CREATE_OUTPUT_MIN: usize = 20;

/// A context query issued by executing code.
///
/// The query carries its argument, and the key decides the type of the
/// answer — see [`Variant`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Query {
    /// Address of the executing contract. Answer: [`Variant::Address`].
    Address,
    /// Message sender. Answer: [`Variant::Address`].
    Caller,
    /// Transaction origin. Answer: [`Variant::Address`].
    Origin,
    /// Transaction gas price. Answer: [`Variant::Uint256`].
    GasPrice,
    /// Current block miner. Answer: [`Variant::Address`].
    Coinbase,
    /// Current block difficulty. Answer: [`Variant::Uint256`].
    Difficulty,
    /// Current block gas limit. Answer: [`Variant::Int64`].
    GasLimit,
    /// Current block number. Answer: [`Variant::Int64`].
    Number,
    /// Current block timestamp. Answer: [`Variant::Int64`].
    Timestamp,
    /// Code of the given address. Answer: [`Variant::Bytes`].
    CodeByAddress(Hash160),
    /// Balance of the given address. Answer: [`Variant::Uint256`].
    Balance(Hash160),
    /// Storage value at the given slot. Answer: [`Variant::Uint256`].
    StorageLoad(Uint256),
}

/// A tagged query answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Variant {
    Int64(i64),
    Uint256(Uint256),
    Address(Hash160),
    Bytes(Vec<u8>),
}

/// The kind of call-like operation requested from the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    Call,
    /// The `value` argument is passed through but must not be transferred.
    DelegateCall,
    CallCode,
    /// `address` is ignored; the output receives the created address.
    Create,
}

/// Parameters of one call/create request.
#[derive(Clone, Copy, Debug)]
pub struct CallRequest<'a> {
    pub kind: CallKind,
    /// Gas forwarded to the callee. Non-negative.
    pub gas: i64,
    /// Callee address. Meaningless for [`CallKind::Create`].
    pub address: Hash160,
    /// Value sent to the callee; the endowment for CREATE.
    pub value: Uint256,
    /// Call input data, or the init code for CREATE.
    pub input: &'a [u8],
}

/// Returns true when a call-callback return value signals success.
///
/// Non-negative is the gas remaining after the call; negative means an
/// exception occurred on the other side and the output buffer is unwritten.
pub fn call_succeeded(ret: i64) -> bool {
    ret >= 0
}

/// Everything the engine needs from its embedder.
///
/// All operations are synchronous; a `call` typically re-enters the engine's
/// own `execute` for the target code.  The engine never retries a failed
/// operation and never invokes `query` recursively from within itself.
pub trait Host {
    /// Answers a context query. The answer's variant must match the one the
    /// key calls for; a mismatch is treated as a VM exception by the engine.
    fn query(&self, query: Query) -> Variant;

    /// Persists a storage write. Fire-and-forget: the host must not signal
    /// failure back into the engine.
    fn store_storage(&self, key: Uint256, value: Uint256);

    /// Performs a nested call or create, writing any output into `output`.
    /// Returns gas remaining (>= 0) on success, negative on exception.
    fn call(&self, request: CallRequest<'_>, output: &mut [u8]) -> i64;

    /// Emits a log entry. `topics.len()` is at most [`MAX_LOG_TOPICS`];
    /// the engine validates this before calling.
    fn log(&self, data: &[u8], topics: &[Hash256]);
}
