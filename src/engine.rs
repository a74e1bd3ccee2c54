//! The execution engine instance.
//!
//! An [`Engine`] owns its configuration, its codegen backend and its
//! artifact cache.  `execute` is safe to call from many threads at once;
//! the cache is the only shared mutable state and serializes nothing but
//! the per-key claim protocol.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::backend::{CodegenBackend, ExecContext, Outcome, ReferenceBackend};
use crate::cache::{CacheMode, CodeCache};
use crate::error::EngineError;
use crate::host::Host;
use crate::value::{Hash256, Uint256};

/// Compatibility ruleset, selectable via the `compat` option.
///
/// The reference backend generates the same artifact for every ruleset; a
/// real codegen backend keys its lowering on it, which is why changing it
/// clears the cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompatRuleset {
    Frontier,
    #[default]
    Homestead,
    Metropolis,
}

impl CompatRuleset {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "frontier" => Some(Self::Frontier),
            "homestead" => Some(Self::Homestead),
            "metropolis" => Some(Self::Metropolis),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct EngineConfig {
    compat: CompatRuleset,
    cache_mode: CacheMode,
    opt_level: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            compat: CompatRuleset::default(),
            cache_mode: CacheMode::default(),
            opt_level: 2,
        }
    }
}

/// One configured execution engine.
pub struct Engine {
    config: RwLock<EngineConfig>,
    backend: Arc<dyn CodegenBackend>,
    cache: CodeCache,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Arc::new(ReferenceBackend))
    }
}

impl Engine {
    pub fn new(backend: Arc<dyn CodegenBackend>) -> Self {
        Self {
            config: RwLock::new(EngineConfig::default()),
            backend,
            cache: CodeCache::default(),
        }
    }

    /// The artifact cache. Exposed for test observability (compile counts).
    pub fn cache(&self) -> &CodeCache {
        &self.cache
    }

    /// Sets a named option. Returns false for an unknown name or an invalid
    /// value; prior configuration is left untouched in both cases — a value
    /// is parsed completely before anything is applied.
    pub fn set_option(&self, name: &str, value: &str) -> bool {
        match name {
            "compat" => match CompatRuleset::parse(value) {
                Some(ruleset) => {
                    let mut config = self.config.write();
                    if config.compat != ruleset {
                        config.compat = ruleset;
                        // Artifacts were lowered under the old ruleset.
                        self.cache.clear();
                    }
                    true
                }
                None => false,
            },
            "cache" => match CacheMode::parse(value) {
                Some(mode) => {
                    self.config.write().cache_mode = mode;
                    true
                }
                None => false,
            },
            "cache-limit" => match value.parse::<usize>() {
                // Zero would silently behave as a limit of one; reject it
                // like any other invalid value.
                Ok(limit) if limit > 0 => {
                    self.cache.set_limit(Some(limit));
                    true
                }
                _ => false,
            },
            "opt" => match value {
                "0" | "1" | "2" => {
                    let level = value.as_bytes()[0] - b'0';
                    let mut config = self.config.write();
                    if config.opt_level != level {
                        config.opt_level = level;
                        self.cache.clear();
                    }
                    true
                }
                _ => false,
            },
            _ => {
                log::warn!("unknown option {name:?} rejected");
                false
            }
        }
    }

    /// Runs `code` against `host` with the given budget.
    ///
    /// `gas` must be in `[0, 2^63-1]`; a negative value is a caller contract
    /// violation and is returned as a distinguished error rather than an
    /// execution outcome.  Every execution-time failure — including a
    /// compile failure from the backend — collapses into
    /// [`Outcome::Exception`].
    pub fn execute(
        &self,
        host: &dyn Host,
        code_hash: Hash256,
        code: &[u8],
        gas: i64,
        input: &[u8],
        value: Uint256,
    ) -> Result<Outcome, EngineError> {
        if gas < 0 {
            return Err(EngineError::GasOutOfRange(gas));
        }
        let cache_mode = self.config.read().cache_mode;
        log::trace!(
            "execute {code_hash:?}: {} code bytes, gas {gas}, cache {cache_mode:?}",
            code.len()
        );

        let artifact = match self.cache.lookup_or_compile(cache_mode, &code_hash, || {
            self.backend.compile(&code_hash, code)
        }) {
            Ok(artifact) => artifact,
            Err(err) => {
                log::debug!("{code_hash:?}: compile failed: {err}");
                return Ok(Outcome::Exception);
            }
        };

        let mut ctx = ExecContext {
            host,
            gas,
            input,
            value,
        };
        match artifact.run(&mut ctx) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                log::debug!("{code_hash:?}: vm exception: {err}");
                Ok(Outcome::Exception)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{CallRequest, Query, Variant};
    use crate::value::{Hash160, Uint256};
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Host that keeps balances so value-transfer behavior per call kind is
    /// observable.
    #[derive(Default)]
    struct LedgerHost {
        balances: RefCell<HashMap<Hash160, u64>>,
        storage: RefCell<HashMap<[u8; 32], Uint256>>,
    }

    impl Host for LedgerHost {
        fn query(&self, query: Query) -> Variant {
            match query {
                Query::Address | Query::Caller | Query::Origin | Query::Coinbase => {
                    Variant::Address(Hash160::ZERO)
                }
                Query::GasLimit | Query::Number | Query::Timestamp => Variant::Int64(1),
                Query::GasPrice | Query::Difficulty => Variant::Uint256(Uint256::ZERO),
                Query::Balance(addr) => Variant::Uint256(Uint256::from_u64(
                    self.balances.borrow().get(&addr).copied().unwrap_or(0),
                )),
                Query::CodeByAddress(_) => Variant::Bytes(Vec::new()),
                Query::StorageLoad(slot) => Variant::Uint256(
                    self.storage
                        .borrow()
                        .get(&slot.to_be_bytes())
                        .copied()
                        .unwrap_or(Uint256::ZERO),
                ),
            }
        }

        fn store_storage(&self, key: Uint256, value: Uint256) {
            self.storage.borrow_mut().insert(key.to_be_bytes(), value);
        }

        fn call(&self, request: CallRequest<'_>, _output: &mut [u8]) -> i64 {
            use crate::host::CallKind;
            // Value moves only for kinds that transfer it; DELEGATECALL by
            // convention never does, whatever value rides along.
            if matches!(request.kind, CallKind::Call | CallKind::CallCode) {
                *self
                    .balances
                    .borrow_mut()
                    .entry(request.address)
                    .or_insert(0) += request.value.low_u64();
            }
            request.gas
        }

        fn log(&self, _data: &[u8], _topics: &[Hash256]) {}
    }

    fn stop_scenario(engine: &Engine, host: &LedgerHost) -> Outcome {
        engine
            .execute(
                host,
                Hash256 { bytes: [1; 32] },
                &[0x00],
                200_000,
                b"Hello World!",
                Uint256::from_u64(1),
            )
            .unwrap()
    }

    #[test]
    fn stop_returns_full_budget_and_empty_output() {
        let engine = Engine::default();
        let host = LedgerHost::default();
        assert_eq!(
            stop_scenario(&engine, &host),
            Outcome::Return {
                output: Vec::new(),
                gas_left: 200_000
            }
        );
    }

    #[test]
    fn negative_gas_is_a_contract_violation() {
        let engine = Engine::default();
        let host = LedgerHost::default();
        let err = engine
            .execute(&host, Hash256::ZERO, &[0x00], -1, &[], Uint256::ZERO)
            .unwrap_err();
        assert_eq!(err, EngineError::GasOutOfRange(-1));
    }

    #[test]
    fn zero_gas_with_nontrivial_code_is_out_of_gas() {
        let engine = Engine::default();
        let host = LedgerHost::default();
        let outcome = engine
            .execute(
                &host,
                Hash256::ZERO,
                &[0x60, 0x01, 0x50, 0x00], // PUSH1 1, POP, STOP
                0,
                &[],
                Uint256::ZERO,
            )
            .unwrap();
        assert_eq!(outcome, Outcome::Exception);
    }

    #[test]
    fn compile_failure_is_an_exception_outcome() {
        let engine = Engine::default();
        let host = LedgerHost::default();
        let outcome = engine
            .execute(&host, Hash256::ZERO, &[0x7f], 1_000, &[], Uint256::ZERO)
            .unwrap();
        assert_eq!(outcome, Outcome::Exception);
    }

    #[test]
    fn sequential_executes_hit_the_cache() {
        let engine = Engine::default();
        let host = LedgerHost::default();
        let hash = Hash256 { bytes: [2; 32] };
        for _ in 0..2 {
            engine
                .execute(&host, hash, &[0x00], 1_000, &[], Uint256::ZERO)
                .unwrap();
        }
        assert_eq!(engine.cache().compile_count(), 1);
    }

    #[test]
    fn cache_hit_ignores_differing_code_bytes() {
        // Documented hazard: identity is the hash, not the bytes. The second
        // call's bytes are never inspected once the hash hits.
        let engine = Engine::default();
        let host = LedgerHost::default();
        let hash = Hash256 { bytes: [3; 32] };
        engine
            .execute(&host, hash, &[0x00], 1_000, &[], Uint256::ZERO)
            .unwrap();
        let outcome = engine
            .execute(&host, hash, &[0xfe, 0xfe], 1_000, &[], Uint256::ZERO)
            .unwrap();
        assert_eq!(engine.cache().compile_count(), 1);
        assert_eq!(
            outcome,
            Outcome::Return {
                output: Vec::new(),
                gas_left: 1_000
            }
        );
    }

    #[test]
    fn delegatecall_transfers_no_value() {
        let engine = Engine::default();
        let host = LedgerHost::default();
        // DELEGATECALL to 0x42 forwarding 100 gas, then STOP.
        let code = [
            0x60, 0x00, // outlen
            0x60, 0x00, // outoff
            0x60, 0x00, // inlen
            0x60, 0x00, // inoff
            0x60, 0x42, // to
            0x60, 0x64, // gas
            0xf4, // DELEGATECALL
            0x00, // STOP
        ];
        engine
            .execute(
                &host,
                Hash256::ZERO,
                &code,
                10_000,
                &[],
                Uint256::from_u64(55),
            )
            .unwrap();
        assert!(host.balances.borrow().is_empty());
    }

    #[test]
    fn call_transfers_value() {
        let engine = Engine::default();
        let host = LedgerHost::default();
        let code = [
            0x60, 0x00, // outlen
            0x60, 0x00, // outoff
            0x60, 0x00, // inlen
            0x60, 0x00, // inoff
            0x60, 0x37, // value = 55
            0x60, 0x42, // to
            0x60, 0x64, // gas
            0xf1, // CALL
            0x00, // STOP
        ];
        engine
            .execute(&host, Hash256::ZERO, &code, 10_000, &[], Uint256::ZERO)
            .unwrap();
        let mut to = Hash160::ZERO;
        to.bytes[19] = 0x42;
        assert_eq!(host.balances.borrow().get(&to), Some(&55));
    }

    #[test]
    fn unknown_option_rejected_known_accepted() {
        let engine = Engine::default();
        assert!(!engine.set_option("no-such-option", "1"));
        assert!(engine.set_option("compat", "frontier"));
        assert!(!engine.set_option("compat", "byzantium"));
        assert!(engine.set_option("cache", "read-only"));
        assert!(!engine.set_option("cache", "maybe"));
        assert!(engine.set_option("cache-limit", "16"));
        assert!(!engine.set_option("cache-limit", "lots"));
        assert!(!engine.set_option("cache-limit", "0"));
        assert!(engine.set_option("opt", "0"));
        assert!(!engine.set_option("opt", "3"));
    }

    #[test]
    fn cache_off_recompiles_every_call() {
        let engine = Engine::default();
        assert!(engine.set_option("cache", "off"));
        let host = LedgerHost::default();
        let hash = Hash256 { bytes: [4; 32] };
        for _ in 0..3 {
            engine
                .execute(&host, hash, &[0x00], 1_000, &[], Uint256::ZERO)
                .unwrap();
        }
        assert_eq!(engine.cache().compile_count(), 3);
    }
}
