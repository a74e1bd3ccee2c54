//! Content-addressed cache of compiled artifacts.
//!
//! Keyed strictly by the caller-supplied code hash; the bytes behind a hit
//! are never re-inspected.  The claim protocol guarantees at most one
//! compilation in flight per key: the first thread to miss installs a
//! pending slot and compiles outside the lock, later threads for the same
//! key wait on the condvar.  Resolved keys are served without blocking on
//! unrelated compilations.
//!
//! Deterministic compile failures are memoized so malformed bytecode is
//! rejected without recompiling; transient failures vacate the slot and are
//! retried on the next call.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::backend::CompiledCode;
use crate::error::CompileError;
use crate::value::Hash256;

/// Cache behavior, selectable per instance via the `cache` option.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CacheMode {
    /// Lookup and insert.
    #[default]
    On,
    /// Neither lookup nor insert.
    Off,
    /// Serve existing entries; never insert, never wait on a pending slot.
    ReadOnly,
}

impl CacheMode {
    /// Parses a `cache` option value. Unknown tokens are rejected.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "on" => Some(Self::On),
            "off" => Some(Self::Off),
            "read-only" => Some(Self::ReadOnly),
            _ => None,
        }
    }
}

enum Slot {
    /// A compilation for this key is in flight on some thread.
    Pending,
    Ready(CompiledCode),
    /// Deterministic failure, short-circuited on subsequent lookups.
    Failed(CompileError),
}

struct Inner {
    slots: HashMap<Hash256, Slot>,
    /// Bounded-cache option; `None` means unbounded.
    limit: Option<usize>,
}

/// Single-flight artifact cache. One per engine instance; independent
/// instances share nothing.
pub struct CodeCache {
    inner: Mutex<Inner>,
    resolved: Condvar,
    compiles: AtomicU64,
}

impl Default for CodeCache {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: HashMap::new(),
                limit: None,
            }),
            resolved: Condvar::new(),
            compiles: AtomicU64::new(0),
        }
    }
}

impl CodeCache {
    /// Number of backend invocations so far. Test observability hook for
    /// the hit/miss behavior; not part of the C surface.
    pub fn compile_count(&self) -> u64 {
        self.compiles.load(Ordering::SeqCst)
    }

    /// Caps the number of resolved entries. Applies on the next insert.
    pub fn set_limit(&self, limit: Option<usize>) {
        self.inner.lock().limit = limit;
    }

    /// Drops every resolved and failed entry. Pending slots are left for
    /// their owning thread to resolve.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner
            .slots
            .retain(|_, slot| matches!(slot, Slot::Pending));
    }

    /// Looks up `hash`, compiling via `compile` on a miss according to
    /// `mode`. This is the only entry point; every compilation in the
    /// engine funnels through here so the count stays meaningful.
    pub fn lookup_or_compile<F>(
        &self,
        mode: CacheMode,
        hash: &Hash256,
        compile: F,
    ) -> Result<CompiledCode, CompileError>
    where
        F: FnOnce() -> Result<CompiledCode, CompileError>,
    {
        match mode {
            CacheMode::Off => return self.compile_uncached(compile),
            CacheMode::ReadOnly => {
                {
                    let inner = self.inner.lock();
                    match inner.slots.get(hash) {
                        Some(Slot::Ready(code)) => return Ok(code.clone()),
                        Some(Slot::Failed(err)) => return Err(err.clone()),
                        // Pending or absent: fall through without touching
                        // the map.
                        Some(Slot::Pending) | None => {}
                    }
                }
                return self.compile_uncached(compile);
            }
            CacheMode::On => {}
        }

        // Check-or-claim.
        {
            let mut inner = self.inner.lock();
            loop {
                match inner.slots.get(hash) {
                    Some(Slot::Ready(code)) => return Ok(code.clone()),
                    Some(Slot::Failed(err)) => {
                        log::debug!("{hash:?}: serving memoized compile failure");
                        return Err(err.clone());
                    }
                    Some(Slot::Pending) => {
                        self.resolved.wait(&mut inner);
                    }
                    None => {
                        inner.slots.insert(*hash, Slot::Pending);
                        break;
                    }
                }
            }
        }

        // We own the pending slot; compile with the lock released so other
        // keys proceed in parallel.
        let result = self.compile_uncached(compile);

        let mut inner = self.inner.lock();
        match &result {
            Ok(code) => {
                if let Some(limit) = inner.limit {
                    evict_to_fit(&mut inner.slots, limit);
                }
                inner.slots.insert(*hash, Slot::Ready(code.clone()));
            }
            Err(err) if err.deterministic => {
                inner.slots.insert(*hash, Slot::Failed(err.clone()));
            }
            Err(_) => {
                // Transient: vacate so the next call retries.
                inner.slots.remove(hash);
            }
        }
        drop(inner);
        self.resolved.notify_all();
        result
    }

    fn compile_uncached<F>(&self, compile: F) -> Result<CompiledCode, CompileError>
    where
        F: FnOnce() -> Result<CompiledCode, CompileError>,
    {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        compile()
    }
}

/// Removes resolved entries until a new one fits under `limit`. Entries are
/// dropped in map order; pending slots are never evicted.
fn evict_to_fit(slots: &mut HashMap<Hash256, Slot>, limit: usize) {
    while slots
        .iter()
        .filter(|(_, s)| !matches!(s, Slot::Pending))
        .count()
        >= limit.max(1)
    {
        let victim = slots
            .iter()
            .find(|(_, s)| !matches!(s, Slot::Pending))
            .map(|(k, _)| *k);
        match victim {
            Some(k) => {
                log::trace!("evicting cached artifact {k:?}");
                slots.remove(&k);
            }
            None => break,
        }
    }
}
