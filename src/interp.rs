//! Reference interpreter used by [`crate::backend::ReferenceBackend`].
//!
//! A deliberately small stack machine: enough of the instruction set to
//! exercise every host callback and every termination path of the boundary
//! protocol.  It is a stand-in for the out-of-scope native codegen pipeline,
//! not a complete EVM.
//!
//! Gas is charged per instruction from a flat schedule. STOP, RETURN and
//! SELFDESTRUCT are free, so trivial programs terminate with their full
//! budget intact.

use crate::backend::{ExecContext, Outcome};
use crate::error::{CompileError, VmError};
use crate::host::{call_succeeded, CallKind, CallRequest, Query, Variant, MAX_LOG_TOPICS};
use crate::value::{Hash160, Hash256, Uint256};

const STACK_LIMIT: usize = 1024;
/// Scratch memory per execution. Accesses past the end are a VM exception
/// rather than a growth event.
const MEMORY_SIZE: usize = 1024;
/// Output view handed to the host for CREATE. The host may write anywhere
/// in it; the engine reads the created address from the first 20 bytes.
const CREATE_OUTPUT_SIZE: usize = 160;

const G_BASE: i64 = 2;
const G_VERYLOW: i64 = 3;
const G_EXT: i64 = 20;
const G_SLOAD: i64 = 50;
const G_SSTORE: i64 = 100;
const G_CALL: i64 = 40;
const G_CREATE: i64 = 200;
const G_LOG: i64 = 375;
const G_LOGTOPIC: i64 = 375;

/// Static checks done at compile time, before the code is cached.
///
/// The only structural invariant of this instruction subset is that PUSH
/// immediates stay inside the code.
pub(crate) fn validate(code: &[u8]) -> Result<(), CompileError> {
    let mut pc = 0;
    while pc < code.len() {
        let op = code[pc];
        pc += 1;
        if (0x60..=0x7f).contains(&op) {
            let n = (op - 0x5f) as usize;
            if pc + n > code.len() {
                return Err(CompileError::deterministic(format!(
                    "truncated PUSH{} at offset {}",
                    n,
                    pc - 1
                )));
            }
            pc += n;
        }
    }
    Ok(())
}

struct Machine<'a, 'b> {
    ctx: &'a mut ExecContext<'b>,
    stack: Vec<Uint256>,
    memory: Vec<u8>,
}

pub(crate) fn run(code: &[u8], ctx: &mut ExecContext<'_>) -> Result<Outcome, VmError> {
    let mut m = Machine {
        ctx,
        stack: Vec::with_capacity(32),
        memory: vec![0u8; MEMORY_SIZE],
    };
    m.dispatch(code)
}

impl Machine<'_, '_> {
    fn dispatch(&mut self, code: &[u8]) -> Result<Outcome, VmError> {
        let mut pc = 0usize;
        while pc < code.len() {
            let op = code[pc];
            pc += 1;
            match op {
                // STOP
                0x00 => {
                    return Ok(Outcome::Return {
                        output: Vec::new(),
                        gas_left: self.ctx.gas,
                    })
                }
                // ADD
                0x01 => {
                    self.charge(G_VERYLOW)?;
                    let a = self.pop()?;
                    let b = self.pop()?;
                    self.push(a.wrapping_add(&b))?;
                }
                // ADDRESS
                0x30 => {
                    self.charge(G_BASE)?;
                    let a = self.query_address(Query::Address)?;
                    self.push(Uint256::from_address(a))?;
                }
                // BALANCE
                0x31 => {
                    self.charge(G_EXT)?;
                    let addr = self.pop()?.to_address();
                    let v = self.query_uint256(Query::Balance(addr))?;
                    self.push(v)?;
                }
                // ORIGIN
                0x32 => {
                    self.charge(G_BASE)?;
                    let a = self.query_address(Query::Origin)?;
                    self.push(Uint256::from_address(a))?;
                }
                // CALLER
                0x33 => {
                    self.charge(G_BASE)?;
                    let a = self.query_address(Query::Caller)?;
                    self.push(Uint256::from_address(a))?;
                }
                // CALLVALUE
                0x34 => {
                    self.charge(G_BASE)?;
                    let v = self.ctx.value;
                    self.push(v)?;
                }
                // CALLDATASIZE
                0x36 => {
                    self.charge(G_BASE)?;
                    let n = self.ctx.input.len() as u64;
                    self.push(Uint256::from_u64(n))?;
                }
                // GASPRICE
                0x3a => {
                    self.charge(G_BASE)?;
                    let v = self.query_uint256(Query::GasPrice)?;
                    self.push(v)?;
                }
                // EXTCODESIZE
                0x3b => {
                    self.charge(G_EXT)?;
                    let addr = self.pop()?.to_address();
                    let code = self.query_bytes(Query::CodeByAddress(addr))?;
                    self.push(Uint256::from_u64(code.len() as u64))?;
                }
                // COINBASE
                0x41 => {
                    self.charge(G_BASE)?;
                    let a = self.query_address(Query::Coinbase)?;
                    self.push(Uint256::from_address(a))?;
                }
                // TIMESTAMP
                0x42 => {
                    self.charge(G_BASE)?;
                    let v = self.query_int64(Query::Timestamp)?;
                    self.push(Uint256::from_u64(v as u64))?;
                }
                // NUMBER
                0x43 => {
                    self.charge(G_BASE)?;
                    let v = self.query_int64(Query::Number)?;
                    self.push(Uint256::from_u64(v as u64))?;
                }
                // DIFFICULTY
                0x44 => {
                    self.charge(G_BASE)?;
                    let v = self.query_uint256(Query::Difficulty)?;
                    self.push(v)?;
                }
                // GASLIMIT
                0x45 => {
                    self.charge(G_BASE)?;
                    let v = self.query_int64(Query::GasLimit)?;
                    self.push(Uint256::from_u64(v as u64))?;
                }
                // POP
                0x50 => {
                    self.charge(G_BASE)?;
                    self.pop()?;
                }
                // MLOAD
                0x51 => {
                    self.charge(G_VERYLOW)?;
                    let off = self.pop()?;
                    let (start, end) = self.mem_range(&off, &Uint256::from_u64(32))?;
                    let mut word = [0u8; 32];
                    word.copy_from_slice(&self.memory[start..end]);
                    self.push(Uint256::from_be_bytes(word))?;
                }
                // MSTORE
                0x52 => {
                    self.charge(G_VERYLOW)?;
                    let off = self.pop()?;
                    let v = self.pop()?;
                    let (start, end) = self.mem_range(&off, &Uint256::from_u64(32))?;
                    self.memory[start..end].copy_from_slice(&v.to_be_bytes());
                }
                // SLOAD
                0x54 => {
                    self.charge(G_SLOAD)?;
                    let slot = self.pop()?;
                    let v = self.query_uint256(Query::StorageLoad(slot))?;
                    self.push(v)?;
                }
                // SSTORE
                0x55 => {
                    self.charge(G_SSTORE)?;
                    let slot = self.pop()?;
                    let v = self.pop()?;
                    self.ctx.host.store_storage(slot, v);
                }
                // PUSH1..PUSH32
                0x60..=0x7f => {
                    self.charge(G_VERYLOW)?;
                    let n = (op - 0x5f) as usize;
                    // Immediate bounds were checked by validate().
                    let mut be = [0u8; 32];
                    be[32 - n..].copy_from_slice(&code[pc..pc + n]);
                    pc += n;
                    self.push(Uint256::from_be_bytes(be))?;
                }
                // LOG0..LOG4
                0xa0..=0xa4 => {
                    let n = (op - 0xa0) as usize;
                    debug_assert!(n <= MAX_LOG_TOPICS);
                    self.charge(G_LOG + n as i64 * G_LOGTOPIC)?;
                    let off = self.pop()?;
                    let len = self.pop()?;
                    let mut topics = Vec::with_capacity(n);
                    for _ in 0..n {
                        let t = self.pop()?;
                        topics.push(Hash256::from_uint256(&t));
                    }
                    let (start, end) = self.mem_range(&off, &len)?;
                    let data = self.memory[start..end].to_vec();
                    self.ctx.host.log(&data, &topics);
                }
                // CREATE
                0xf0 => {
                    self.charge(G_CREATE)?;
                    let value = self.pop()?;
                    let off = self.pop()?;
                    let len = self.pop()?;
                    let (start, end) = self.mem_range(&off, &len)?;
                    let init_code = self.memory[start..end].to_vec();
                    let forwarded = self.ctx.gas;
                    self.ctx.gas = 0;
                    let mut created = [0u8; CREATE_OUTPUT_SIZE];
                    let ret = self.ctx.host.call(
                        CallRequest {
                            kind: CallKind::Create,
                            gas: forwarded,
                            address: Hash160::ZERO,
                            value,
                            input: &init_code,
                        },
                        &mut created,
                    );
                    if call_succeeded(ret) {
                        self.ctx.gas += ret.min(forwarded);
                        let mut addr = Hash160::ZERO;
                        addr.bytes.copy_from_slice(&created[..20]);
                        self.push(Uint256::from_address(addr))?;
                    } else {
                        self.push(Uint256::ZERO)?;
                    }
                }
                // CALL / CALLCODE / DELEGATECALL
                0xf1 | 0xf2 | 0xf4 => {
                    self.charge(G_CALL)?;
                    let kind = match op {
                        0xf1 => CallKind::Call,
                        0xf2 => CallKind::CallCode,
                        _ => CallKind::DelegateCall,
                    };
                    let gas_req = self.pop_gas()?;
                    let to = self.pop()?.to_address();
                    let value = if kind == CallKind::DelegateCall {
                        // The apparent value passes through unchanged; the
                        // host must not transfer it for this kind.
                        self.ctx.value
                    } else {
                        self.pop()?
                    };
                    let in_off = self.pop()?;
                    let in_len = self.pop()?;
                    let out_off = self.pop()?;
                    let out_len = self.pop()?;
                    let (in_start, in_end) = self.mem_range(&in_off, &in_len)?;
                    let (out_start, out_end) = self.mem_range(&out_off, &out_len)?;
                    let input = self.memory[in_start..in_end].to_vec();
                    let forwarded = gas_req.min(self.ctx.gas);
                    self.ctx.gas -= forwarded;
                    let host = self.ctx.host;
                    let ret = host.call(
                        CallRequest {
                            kind,
                            gas: forwarded,
                            address: to,
                            value,
                            input: &input,
                        },
                        &mut self.memory[out_start..out_end],
                    );
                    if call_succeeded(ret) {
                        self.ctx.gas += ret.min(forwarded);
                        self.push(Uint256::from_u64(1))?;
                    } else {
                        self.push(Uint256::ZERO)?;
                    }
                }
                // RETURN
                0xf3 => {
                    let off = self.pop()?;
                    let len = self.pop()?;
                    let (start, end) = self.mem_range(&off, &len)?;
                    return Ok(Outcome::Return {
                        output: self.memory[start..end].to_vec(),
                        gas_left: self.ctx.gas,
                    });
                }
                // SELFDESTRUCT
                0xff => {
                    let beneficiary = self.pop()?.to_address();
                    return Ok(Outcome::SelfDestruct {
                        beneficiary,
                        gas_left: self.ctx.gas,
                    });
                }
                _ => return Err(VmError::InvalidInstruction(op)),
            }
        }
        // Running off the end of the code behaves like STOP.
        Ok(Outcome::Return {
            output: Vec::new(),
            gas_left: self.ctx.gas,
        })
    }

    fn charge(&mut self, amount: i64) -> Result<(), VmError> {
        self.ctx.gas -= amount;
        if self.ctx.gas < 0 {
            self.ctx.gas = 0;
            return Err(VmError::OutOfGas);
        }
        Ok(())
    }

    fn push(&mut self, v: Uint256) -> Result<(), VmError> {
        if self.stack.len() >= STACK_LIMIT {
            return Err(VmError::StackOverflow);
        }
        self.stack.push(v);
        Ok(())
    }

    fn pop(&mut self) -> Result<Uint256, VmError> {
        self.stack.pop().ok_or(VmError::StackUnderflow)
    }

    /// Pops a gas amount, clamping anything above `i64::MAX` down.
    fn pop_gas(&mut self) -> Result<i64, VmError> {
        let v = self.pop()?;
        if v.fits_u64() {
            Ok(i64::try_from(v.low_u64()).unwrap_or(i64::MAX))
        } else {
            Ok(i64::MAX)
        }
    }

    fn mem_range(&self, off: &Uint256, len: &Uint256) -> Result<(usize, usize), VmError> {
        let start = off.to_usize().ok_or(VmError::MemoryOutOfRange)?;
        let len = len.to_usize().ok_or(VmError::MemoryOutOfRange)?;
        let end = start.checked_add(len).ok_or(VmError::MemoryOutOfRange)?;
        if end > MEMORY_SIZE {
            return Err(VmError::MemoryOutOfRange);
        }
        Ok((start, end))
    }

    fn query_uint256(&self, q: Query) -> Result<Uint256, VmError> {
        match self.ctx.host.query(q) {
            Variant::Uint256(v) => Ok(v),
            _ => Err(VmError::QueryTypeMismatch(q)),
        }
    }

    fn query_int64(&self, q: Query) -> Result<i64, VmError> {
        match self.ctx.host.query(q) {
            Variant::Int64(v) => Ok(v),
            _ => Err(VmError::QueryTypeMismatch(q)),
        }
    }

    fn query_address(&self, q: Query) -> Result<Hash160, VmError> {
        match self.ctx.host.query(q) {
            Variant::Address(a) => Ok(a),
            _ => Err(VmError::QueryTypeMismatch(q)),
        }
    }

    fn query_bytes(&self, q: Query) -> Result<Vec<u8>, VmError> {
        match self.ctx.host.query(q) {
            Variant::Bytes(b) => Ok(b),
            _ => Err(VmError::QueryTypeMismatch(q)),
        }
    }
}
