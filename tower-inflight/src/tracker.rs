use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use inflight_gate::ActionKey;
use inflight_gate::ActionPolicy;
use inflight_gate::PendingSet;
use inflight_gate::should_suppress;
use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use tokio::time::Instant;

use crate::token::AbortHandle;
use crate::token::Settlement;
use crate::token::TokenId;

#[derive(Clone, Debug)]
struct TrackerMetrics {
    admitted: Counter<u64>,
    suppressed: Counter<u64>,
    aborted: Counter<u64>,
}

impl TrackerMetrics {
    fn new() -> Self {
        let meter = global::meter("request_tracker");
        Self {
            admitted: meter.u64_counter("inflight.admitted").build(),
            suppressed: meter.u64_counter("inflight.suppressed").build(),
            aborted: meter.u64_counter("inflight.aborted").build(),
        }
    }
}

/// One admitted call, from admission until its token settles.
#[derive(Clone, Debug)]
pub struct PendingEntry {
    key: ActionKey,
    token: AbortHandle,
    admitted_at: Instant,
}

impl PendingEntry {
    pub fn key(&self) -> &ActionKey {
        &self.key
    }

    pub fn token(&self) -> &AbortHandle {
        &self.token
    }

    pub fn id(&self) -> TokenId {
        self.token.id()
    }

    pub fn admitted_at(&self) -> Instant {
        self.admitted_at
    }
}

struct Shared {
    pending: Mutex<BTreeMap<ActionKey, PendingSet<PendingEntry>>>,
    // Written only while `pending` is locked.
    has_pending: AtomicBool,
    instruments: TrackerMetrics,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BTreeMap<ActionKey, PendingSet<PendingEntry>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, key: &ActionKey, id: TokenId, settlement: Settlement) {
        let mut pending = self.lock();
        let Some(set) = pending.get_mut(key) else {
            return;
        };
        if set.remove_where(|entry| entry.id() == id).is_none() {
            return;
        }
        let remaining = set.len();
        if set.is_empty() {
            pending.remove(key);
        }
        self.has_pending
            .store(!pending.is_empty(), Ordering::Release);
        drop(pending);

        tracing::debug!(action = %key, token = %id, %settlement, remaining, "request settled");
        if settlement == Settlement::Aborted {
            self.instruments
                .aborted
                .add(1, &[KeyValue::new("action", key.to_string())]);
        }
    }
}

/// Tracks every admitted call by action key until it settles.
///
/// The tracker is the single source of truth for "is anything pending". Each
/// resource owns its own tracker. Clones share the same state.
#[derive(Clone)]
pub struct RequestTracker {
    inner: Arc<Shared>,
}

impl Default for RequestTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestTracker")
            .field("pending", &self.snapshot())
            .finish()
    }
}

impl RequestTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Shared {
                pending: Mutex::new(BTreeMap::new()),
                has_pending: AtomicBool::new(false),
                instruments: TrackerMetrics::new(),
            }),
        }
    }

    /// Appends an entry for `token` under `key` and removes it again once the
    /// token settles, whatever the cause.
    ///
    /// Each token must be registered at most once.
    pub fn register(&self, key: ActionKey, token: AbortHandle) {
        let pending = self.inner.lock();
        self.insert(pending, key, token);
    }

    /// Runs the throttle gate for `key` and registers `token` in the same
    /// critical section, so concurrent callers cannot both be admitted under
    /// an exclusive policy.
    ///
    /// When `policy` suppresses the call, `token` is not registered and the
    /// oldest pending entry of `key` is returned instead.
    pub fn admit(
        &self,
        key: ActionKey,
        policy: &ActionPolicy,
        token: AbortHandle,
    ) -> Result<(), PendingEntry> {
        let pending = self.inner.lock();
        let serving = pending
            .get(&key)
            .filter(|set| should_suppress(policy, set.as_slice()))
            .and_then(PendingSet::oldest)
            .cloned();
        if let Some(serving) = serving {
            drop(pending);
            self.inner
                .instruments
                .suppressed
                .add(1, &[KeyValue::new("action", key.to_string())]);
            return Err(serving);
        }
        self.insert(pending, key, token);
        Ok(())
    }

    fn insert(
        &self,
        mut pending: MutexGuard<'_, BTreeMap<ActionKey, PendingSet<PendingEntry>>>,
        key: ActionKey,
        token: AbortHandle,
    ) {
        let id = token.id();
        pending.entry(key.clone()).or_default().push(PendingEntry {
            key: key.clone(),
            token: token.clone(),
            admitted_at: Instant::now(),
        });
        self.inner.has_pending.store(true, Ordering::Release);
        drop(pending);

        self.inner
            .instruments
            .admitted
            .add(1, &[KeyValue::new("action", key.to_string())]);

        // The hook must not keep the tracker alive through the token.
        let shared: Weak<Shared> = Arc::downgrade(&self.inner);
        token.on_settle(move |settlement| {
            if let Some(shared) = shared.upgrade() {
                shared.remove(&key, id, settlement);
            }
        });
    }

    /// A snapshot of the entries pending under `key`, oldest first.
    pub fn pending_for(&self, key: &ActionKey) -> Vec<PendingEntry> {
        self.inner
            .lock()
            .get(key)
            .map(|set| set.as_slice().to_vec())
            .unwrap_or_default()
    }

    /// Aborts the most recently registered, still pending call under `key`.
    ///
    /// Returns whether a call was actually settled by this abort.
    pub fn abort_one(&self, key: &ActionKey) -> bool {
        let newest = self.inner.lock().get(key).and_then(|set| {
            set.iter()
                .rev()
                .find(|entry| !entry.token.is_settled())
                .map(|entry| entry.token.clone())
        });
        newest.is_some_and(|token| token.abort())
    }

    /// Aborts every pending call and clears the tracker.
    ///
    /// The mapping is detached and `has_pending` cleared in one critical
    /// section. Calls registered after that point are unaffected.
    pub fn abort_all(&self) {
        let detached = {
            let mut pending = self.inner.lock();
            self.inner.has_pending.store(false, Ordering::Release);
            std::mem::take(&mut *pending)
        };

        let mut aborted = 0usize;
        for (key, set) in detached {
            for entry in set {
                if entry.token.abort() {
                    aborted += 1;
                    self.inner
                        .instruments
                        .aborted
                        .add(1, &[KeyValue::new("action", key.to_string())]);
                }
            }
        }
        tracing::info!(aborted, "aborted all pending requests");
    }

    pub fn has_pending(&self) -> bool {
        self.inner.has_pending.load(Ordering::Acquire)
    }

    pub fn is_pending(&self, key: &ActionKey) -> bool {
        self.inner.lock().contains_key(key)
    }

    /// Total number of pending calls across all keys.
    pub fn len(&self) -> usize {
        self.inner.lock().values().map(PendingSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Pending token ids per key, keys in order and entries oldest first.
    pub fn snapshot(&self) -> Vec<(ActionKey, Vec<TokenId>)> {
        self.inner
            .lock()
            .iter()
            .map(|(key, set)| (key.clone(), set.iter().map(PendingEntry::id).collect()))
            .collect()
    }
}
