//! `#[repr(C)]` types crossing the host/engine boundary.
//!
//! These types are the only wire format shared between the host application
//! (C, Go via CGO, ...) and the engine.  They MUST remain stable — **do not**
//! change their memory layout without bumping the crate major version and
//! updating every embedder.
//!
//! Endianness is part of the contract: [`EvmUint256`] is host-endian
//! (`words[0]` = lowest 64 bits), [`EvmHash256`] is semantically big-endian
//! raw bytes aligned to 8.  Converting between the two is a byte swap, never
//! a reinterpretation.

use core::ffi::c_void;

use crate::host::{CallKind, Query, Variant};
use crate::value::{Hash160, Hash256, Uint256};

/// Host-endian 256-bit integer. `words[0]` holds the 64 lowest bits.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvmUint256 {
    pub words: [u64; 4],
}

/// 160-bit address (20 raw bytes).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvmHash160 {
    pub bytes: [u8; 20],
}

/// Big-endian 256-bit integer/hash, aligned to 8 bytes.
#[repr(C, align(8))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvmHash256 {
    pub bytes: [u8; 32],
}

/// Reference to non-mutable memory. Zero length is legal.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct EvmBytesView {
    pub bytes: *const u8,
    pub size: usize,
}

impl EvmBytesView {
    pub const EMPTY: Self = Self {
        bytes: core::ptr::null(),
        size: 0,
    };

    /// Borrows the referenced range.
    ///
    /// # Safety
    /// The view must reference `size` readable bytes for the lifetime `'a`.
    pub unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        if self.bytes.is_null() || self.size == 0 {
            &[]
        } else {
            core::slice::from_raw_parts(self.bytes, self.size)
        }
    }
}

/// Reference to mutable memory.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct EvmMutableBytesView {
    pub bytes: *mut u8,
    pub size: usize,
}

/// The execution return code.
#[repr(i32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvmReturnCode {
    /// Execution ended by STOP or RETURN.
    Return = 0,
    /// Execution ended by SELFDESTRUCT.
    SelfDestruct = 1,
    /// Execution ended with an exception.
    Exception = -1,
}

/// Success arm of [`EvmResult`]: output view, gas left and the engine-owned
/// backing allocation released by `jitevm_destroy_result`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct EvmResultSuccess {
    pub output_data: EvmBytesView,
    pub gas_left: i64,
    pub internal_memory: *mut c_void,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub union EvmResultUnion {
    pub success: EvmResultSuccess,
    pub selfdestruct_beneficiary: EvmHash160,
}

/// Execution result crossing the boundary by value.
///
/// Exactly one union arm is meaningful, selected by `return_code`.  A result
/// whose arm carries engine-owned memory must be released exactly once with
/// `jitevm_destroy_result`.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct EvmResult {
    pub return_code: EvmReturnCode,
    pub data: EvmResultUnion,
}

/// The query callback key. The key decides which [`EvmVariant`] member the
/// argument and the result carry — see [`EvmQueryFn`].
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvmQueryKey {
    /// Address of the executing contract, for ADDRESS.
    Address = 0,
    /// Message sender address, for CALLER.
    Caller = 1,
    /// Transaction origin address, for ORIGIN.
    Origin = 2,
    /// Transaction gas price, for GASPRICE.
    GasPrice = 3,
    /// Current block miner address, for COINBASE.
    Coinbase = 4,
    /// Current block difficulty, for DIFFICULTY.
    Difficulty = 5,
    /// Current block gas limit, for GASLIMIT.
    GasLimit = 6,
    /// Current block number, for NUMBER.
    Number = 7,
    /// Current block timestamp, for TIMESTAMP.
    Timestamp = 8,
    /// Code of a given address, for EXTCODESIZE/EXTCODECOPY.
    CodeByAddress = 9,
    /// Balance of a given address, for BALANCE.
    Balance = 10,
    /// Storage value of a given key, for SLOAD.
    Storage = 11,
}

/// The kind of call-like instruction.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvmCallKind {
    /// CALL.
    Call = 0,
    /// DELEGATECALL. The `value` parameter is ignored by convention.
    DelegateCall = 1,
    /// CALLCODE.
    CallCode = 2,
    /// CREATE. The `address` parameter is ignored; the output buffer
    /// receives the created contract's address.
    Create = 3,
}

/// Address member of [`EvmVariant`], padded so the address occupies the low
/// 20 bytes of a full 32-byte big-endian hash slot.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct EvmVariantAddress {
    pub padding: [u8; 12],
    pub address: EvmHash160,
}

/// Untagged value slot used by the query callback.
///
/// The active member is implied by the query key; caller and callee agree
/// out-of-band.  The Rust-native side converts to and from the tagged
/// [`Variant`] enum at the boundary so type confusion cannot spread past the
/// adapter.
#[repr(C)]
#[derive(Clone, Copy)]
pub union EvmVariant {
    /// A host-endian 64-bit integer.
    pub int64: i64,
    /// A host-endian 256-bit integer.
    pub uint256: EvmUint256,
    /// An address in the low bytes of the slot.
    pub addr: EvmVariantAddress,
    /// A memory reference.
    pub bytes: EvmBytesView,
}

impl EvmVariant {
    pub const ZERO: Self = Self {
        uint256: EvmUint256 { words: [0; 4] },
    };
}

/// Opaque execution environment managed by the host. The engine never
/// dereferences it, only passes it back into callbacks.
#[repr(C)]
pub struct EvmEnv {
    _private: [u8; 0],
}

/// Query callback.
///
/// | Key             | Arg member | Result member |
/// |-----------------|------------|---------------|
/// | `Address`       |            | `addr`        |
/// | `Caller`        |            | `addr`        |
/// | `Origin`        |            | `addr`        |
/// | `GasPrice`      |            | `uint256`     |
/// | `Coinbase`      |            | `addr`        |
/// | `Difficulty`    |            | `uint256`     |
/// | `GasLimit`      |            | `int64`       |
/// | `Number`        |            | `int64`       |
/// | `Timestamp`     |            | `int64`       |
/// | `CodeByAddress` | `addr`     | `bytes`       |
/// | `Balance`       | `addr`     | `uint256`     |
/// | `Storage`       | `uint256`  | `uint256`     |
pub type EvmQueryFn =
    unsafe extern "C" fn(env: *mut EvmEnv, key: EvmQueryKey, arg: EvmVariant) -> EvmVariant;

/// Storage mutation callback. Host-endian on both sides. Fire-and-forget:
/// persistence failures are the host's concern and are never signalled back.
pub type EvmStoreFn =
    unsafe extern "C" fn(env: *mut EvmEnv, key: EvmUint256, value: EvmUint256);

/// Call/create callback.
///
/// Non-negative return = gas remaining after the call (success).  Negative =
/// an exception occurred and `output` must be treated as unwritten.  The
/// sign channel is deliberate: no exception ABI is shared across
/// independently compiled binaries.
///
/// For `Create` the output buffer is at least 160 bytes; the engine reads
/// the created contract's 160-bit address from its first 20 bytes.
pub type EvmCallFn = unsafe extern "C" fn(
    kind: EvmCallKind,
    gas: i64,
    address: EvmHash160,
    value: EvmUint256,
    input_data: EvmBytesView,
    output_data: EvmMutableBytesView,
) -> i64;

/// Log callback. `num_topics` is in `[0, 4]`. Purely observational.
pub type EvmLogFn = unsafe extern "C" fn(
    log_data: EvmBytesView,
    num_topics: usize,
    topics: *const EvmHash256,
);

// --- conversions between the wire types and the native types ---------------

impl From<EvmUint256> for Uint256 {
    fn from(v: EvmUint256) -> Self {
        Uint256 { words: v.words }
    }
}

impl From<Uint256> for EvmUint256 {
    fn from(v: Uint256) -> Self {
        EvmUint256 { words: v.words }
    }
}

impl From<EvmHash160> for Hash160 {
    fn from(v: EvmHash160) -> Self {
        Hash160 { bytes: v.bytes }
    }
}

impl From<Hash160> for EvmHash160 {
    fn from(v: Hash160) -> Self {
        EvmHash160 { bytes: v.bytes }
    }
}

impl From<EvmHash256> for Hash256 {
    fn from(v: EvmHash256) -> Self {
        Hash256 { bytes: v.bytes }
    }
}

impl From<Hash256> for EvmHash256 {
    fn from(v: Hash256) -> Self {
        EvmHash256 { bytes: v.bytes }
    }
}

impl EvmVariant {
    pub fn from_int64(v: i64) -> Self {
        Self { int64: v }
    }

    pub fn from_uint256(v: Uint256) -> Self {
        Self { uint256: v.into() }
    }

    pub fn from_address(a: Hash160) -> Self {
        Self {
            addr: EvmVariantAddress {
                padding: [0; 12],
                address: a.into(),
            },
        }
    }

    /// Encodes the argument member implied by the native query.
    pub fn encode_arg(query: &Query) -> Self {
        match query {
            Query::CodeByAddress(a) | Query::Balance(a) => Self::from_address(*a),
            Query::StorageLoad(slot) => Self::from_uint256(*slot),
            _ => Self::ZERO,
        }
    }

    /// Decodes the result member implied by the native query into a tagged
    /// [`Variant`].
    ///
    /// # Safety
    /// The host must have filled the member the key calls for; a `bytes`
    /// result must stay readable until the current execution finishes (the
    /// adapter copies it out immediately).
    pub unsafe fn decode_result(self, query: &Query) -> Variant {
        match query {
            Query::Address | Query::Caller | Query::Origin | Query::Coinbase => {
                Variant::Address(self.addr.address.into())
            }
            Query::GasPrice | Query::Difficulty | Query::Balance(_) | Query::StorageLoad(_) => {
                Variant::Uint256(self.uint256.into())
            }
            Query::GasLimit | Query::Number | Query::Timestamp => Variant::Int64(self.int64),
            Query::CodeByAddress(_) => Variant::Bytes(self.bytes.as_slice().to_vec()),
        }
    }
}

impl From<&CallKind> for EvmCallKind {
    fn from(kind: &CallKind) -> Self {
        match kind {
            CallKind::Call => EvmCallKind::Call,
            CallKind::DelegateCall => EvmCallKind::DelegateCall,
            CallKind::CallCode => EvmCallKind::CallCode,
            CallKind::Create => EvmCallKind::Create,
        }
    }
}

// ---------------------------------------------------------------------------
//  Compile-time layout assertions — these act as unit tests and prevent
//  silent ABI breakage.
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{align_of, offset_of, size_of};

    #[test]
    fn wire_layout_sizes() {
        assert_eq!(size_of::<EvmUint256>(), 32, "EvmUint256 must be 4x8 bytes");
        assert_eq!(size_of::<EvmHash160>(), 20, "EvmHash160 must be 20 bytes");
        assert_eq!(size_of::<EvmHash256>(), 32, "EvmHash256 must be 32 bytes");
        assert_eq!(align_of::<EvmHash256>(), 8, "EvmHash256 must be 8-aligned");
        assert_eq!(
            size_of::<EvmBytesView>(),
            2 * size_of::<usize>(),
            "EvmBytesView is pointer + length"
        );
    }

    #[test]
    fn variant_layout() {
        assert_eq!(size_of::<EvmVariant>(), 32, "largest member is uint256");
        assert_eq!(align_of::<EvmVariant>(), 8);
        // The address member must overlap the low 20 bytes of the 32-byte
        // hash slot, i.e. start at offset 12.
        assert_eq!(offset_of!(EvmVariantAddress, address), 12);
    }

    #[test]
    fn result_union_arms_overlap() {
        assert_eq!(offset_of!(EvmResult, data), 8);
        let success = EvmResultSuccess {
            output_data: EvmBytesView::EMPTY,
            gas_left: 77,
            internal_memory: core::ptr::null_mut(),
        };
        let r = EvmResult {
            return_code: EvmReturnCode::Return,
            data: EvmResultUnion { success },
        };
        unsafe {
            assert_eq!(r.data.success.gas_left, 77);
        }
    }

    #[test]
    fn variant_address_member_decodes_by_key() {
        let v = EvmVariant::from_address(Hash160 { bytes: [0xab; 20] });
        unsafe {
            let out = v.decode_result(&Query::Caller);
            assert_eq!(out, Variant::Address(Hash160 { bytes: [0xab; 20] }));
        }
    }

    #[test]
    fn return_code_values_match_header() {
        assert_eq!(EvmReturnCode::Return as i32, 0);
        assert_eq!(EvmReturnCode::SelfDestruct as i32, 1);
        assert_eq!(EvmReturnCode::Exception as i32, -1);
    }
}
