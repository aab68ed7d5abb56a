//! Lease-counted real watchers, one per synthetic identity.
//!
//! An entry lives exactly as long as it holds at least one [`Reason`]. The
//! first acquisition for an identity creates the real watcher; releasing the
//! last reason disposes it synchronously.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::router::ChangeRouter;
use crate::error::WatcherError;
use crate::host::{HostFs, RealWatcher, WatchPattern};
use crate::scheme::{self, SyntheticIdentity};
use crate::Result;

/// Token issued for an explicit watch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LeaseId(u64);

impl LeaseId {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Why a watch entry is being kept alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reason {
    /// The document is open in an editor tab.
    Visible,
    /// An explicit `watch` request.
    Lease(LeaseId),
}

struct WatchEntry {
    changed_at: Option<i64>,
    watcher: Box<dyn RealWatcher>,
    reasons: HashSet<Reason>,
}

/// Identity-keyed watch entries plus the lease allocator.
#[derive(Default)]
pub(crate) struct WatchRegistry {
    entries: HashMap<SyntheticIdentity, WatchEntry>,
    next_lease: u64,
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("entries", &self.entries.len())
            .field("next_lease", &self.next_lease)
            .finish()
    }
}

impl WatchRegistry {
    fn mint_lease(&mut self) -> LeaseId {
        let id = LeaseId(self.next_lease);
        self.next_lease += 1;
        id
    }

    /// Remove `reason`; hands back the watcher if the entry just died.
    fn release(
        &mut self,
        identity: &SyntheticIdentity,
        reason: Reason,
    ) -> Option<Box<dyn RealWatcher>> {
        let entry = self.entries.get_mut(identity)?;
        if !entry.reasons.remove(&reason) || !entry.reasons.is_empty() {
            return None;
        }
        self.entries.remove(identity).map(|entry| entry.watcher)
    }

    /// Record a change at `now`. Timestamps never move backwards.
    pub(crate) fn touch(&mut self, identity: &SyntheticIdentity, now: i64) -> bool {
        match self.entries.get_mut(identity) {
            Some(entry) => {
                entry.changed_at = Some(entry.changed_at.map_or(now, |prev| prev.max(now)));
                true
            }
            None => false,
        }
    }
}

/// Owner of every live watch entry for one provider.
pub struct WatchTracker<H: HostFs> {
    host: Arc<H>,
    registry: Arc<Mutex<WatchRegistry>>,
    router: ChangeRouter,
}

impl<H: HostFs> WatchTracker<H> {
    pub(crate) fn new(
        host: Arc<H>,
        router: impl FnOnce(Weak<Mutex<WatchRegistry>>) -> ChangeRouter,
    ) -> Self {
        let registry = Arc::new(Mutex::new(WatchRegistry::default()));
        let router = router(Arc::downgrade(&registry));
        Self {
            host,
            registry,
            router,
        }
    }

    /// Add watch interest for `identity`.
    ///
    /// Creates the real watcher on first interest. With `reason` absent a
    /// fresh lease is minted. The returned guard releases that reason when
    /// dropped or disposed.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity cannot be decoded or the real
    /// watcher cannot be created. No state is left behind in either case.
    pub fn acquire(
        &self,
        identity: &SyntheticIdentity,
        reason: Option<Reason>,
    ) -> Result<WatchGuard> {
        let reason = reason.unwrap_or_else(|| Reason::Lease(self.registry.lock().mint_lease()));

        if !self.attach(identity, reason) {
            let watcher = self.start_watcher(identity)?;

            let redundant = {
                let mut registry = self.registry.lock();
                match registry.entries.get_mut(identity) {
                    Some(entry) => {
                        // Another acquisition won the race; ours is surplus.
                        entry.reasons.insert(reason);
                        Some(watcher)
                    }
                    None => {
                        registry.entries.insert(
                            identity.clone(),
                            WatchEntry {
                                changed_at: None,
                                watcher,
                                reasons: HashSet::from([reason]),
                            },
                        );
                        None
                    }
                }
            };

            if redundant.is_none() {
                tracing::debug!(%identity, "Created directory watch");
            }
        }

        tracing::trace!(%identity, ?reason, "Acquired watch reason");
        Ok(self.guard(identity, reason))
    }

    /// Add `reason` to an existing entry. False if there is none.
    fn attach(&self, identity: &SyntheticIdentity, reason: Reason) -> bool {
        match self.registry.lock().entries.get_mut(identity) {
            Some(entry) => {
                entry.reasons.insert(reason);
                true
            }
            None => false,
        }
    }

    fn start_watcher(&self, identity: &SyntheticIdentity) -> Result<Box<dyn RealWatcher>> {
        let root = scheme::decode(identity)?;
        let workspace = self.host.workspace_root(&root);
        let pattern = WatchPattern::subtree(&root, workspace.as_deref());
        let sink = self.router.sink(identity.clone(), root.clone());

        self.host.create_watcher(pattern, sink).map_err(|e| {
            WatcherError::WatchFailed {
                path: root.display().to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn guard(&self, identity: &SyntheticIdentity, reason: Reason) -> WatchGuard {
        WatchGuard {
            registry: Arc::downgrade(&self.registry),
            identity: identity.clone(),
            reason,
            armed: true,
        }
    }

    /// Drop `reason` from `identity`. Absent reasons and entries are ignored.
    pub fn release(&self, identity: &SyntheticIdentity, reason: Reason) {
        release_in(&self.registry, identity, reason);
    }

    /// Time of the last routed change, if any since the entry was created.
    #[must_use]
    pub fn current_timestamp(&self, identity: &SyntheticIdentity) -> Option<i64> {
        self.registry
            .lock()
            .entries
            .get(identity)
            .and_then(|entry| entry.changed_at)
    }

    /// Whether `identity` currently has a live watch entry.
    #[must_use]
    pub fn is_watched(&self, identity: &SyntheticIdentity) -> bool {
        self.registry.lock().entries.contains_key(identity)
    }

    /// Whether `identity` is held alive by `reason`.
    #[must_use]
    pub fn holds(&self, identity: &SyntheticIdentity, reason: Reason) -> bool {
        self.registry
            .lock()
            .entries
            .get(identity)
            .is_some_and(|entry| entry.reasons.contains(&reason))
    }

    /// Identities held by `reason`.
    #[must_use]
    pub fn held_by(&self, reason: Reason) -> Vec<SyntheticIdentity> {
        self.registry
            .lock()
            .entries
            .iter()
            .filter(|(_, entry)| entry.reasons.contains(&reason))
            .map(|(identity, _)| identity.clone())
            .collect()
    }

    /// Number of live watch entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.lock().entries.len()
    }

    /// Whether no watch entries are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dispose every remaining entry.
    pub fn shutdown(&self) {
        let drained: Vec<_> = self.registry.lock().entries.drain().collect();
        for (identity, entry) in drained {
            drop(entry.watcher);
            tracing::debug!(%identity, "Disposed directory watch on shutdown");
        }
    }
}

fn release_in(registry: &Mutex<WatchRegistry>, identity: &SyntheticIdentity, reason: Reason) {
    let disposed = registry.lock().release(identity, reason);
    tracing::trace!(%identity, ?reason, "Released watch reason");

    if let Some(watcher) = disposed {
        let path = watcher.pattern().base.clone();
        drop(watcher);
        tracing::debug!(%identity, path = %path.display(), "Disposed directory watch");
    }
}

/// Scoped hold on one watch reason.
///
/// Dropping the guard releases the reason; releasing twice is a no-op.
#[derive(Debug)]
#[must_use = "dropping the guard releases the watch immediately"]
pub struct WatchGuard {
    registry: Weak<Mutex<WatchRegistry>>,
    identity: SyntheticIdentity,
    reason: Reason,
    armed: bool,
}

impl WatchGuard {
    #[must_use]
    pub fn identity(&self) -> &SyntheticIdentity {
        &self.identity
    }

    #[must_use]
    pub fn reason(&self) -> Reason {
        self.reason
    }

    /// Release the reason now.
    pub fn dispose(mut self) {
        self.release();
    }

    /// Keep the reason registered without a guard; release it later
    /// through [`WatchTracker::release`].
    pub fn detach(mut self) -> Reason {
        self.armed = false;
        self.reason
    }

    fn release(&mut self) {
        if !std::mem::take(&mut self.armed) {
            return;
        }
        if let Some(registry) = self.registry.upgrade() {
            release_in(&registry, &self.identity, self.reason);
        }
    }
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use std::path::Path;
    use tokio::sync::broadcast;

    fn tracker(host: &MemoryHost) -> WatchTracker<MemoryHost> {
        let (events, _) = broadcast::channel(16);
        WatchTracker::new(Arc::new(host.clone()), |registry| {
            ChangeRouter::new(registry, events)
        })
    }

    fn host_with_proj() -> MemoryHost {
        let host = MemoryHost::new();
        host.add_file("/proj/a.txt", "A");
        host
    }

    #[test]
    fn test_first_acquire_creates_watcher() {
        let host = host_with_proj();
        let tracker = tracker(&host);
        let identity = scheme::encode(Path::new("/proj"));

        let guard = tracker.acquire(&identity, None).unwrap();
        assert!(tracker.is_watched(&identity));
        assert_eq!(host.watchers_created(), 1);
        assert_eq!(host.live_watchers()[0].base, Path::new("/proj"));
        assert!(matches!(guard.reason(), Reason::Lease(_)));
    }

    #[test]
    fn test_n_reasons_dispose_once() {
        let host = host_with_proj();
        let tracker = tracker(&host);
        let identity = scheme::encode(Path::new("/proj"));

        let guards: Vec<_> = (0..3)
            .map(|_| tracker.acquire(&identity, None).unwrap())
            .collect();
        assert_eq!(host.watchers_created(), 1);

        let mut guards = guards.into_iter();
        guards.next().unwrap().dispose();
        guards.next().unwrap().dispose();
        assert!(tracker.is_watched(&identity));
        assert_eq!(host.watchers_disposed(), 0);

        guards.next().unwrap().dispose();
        assert!(!tracker.is_watched(&identity));
        assert_eq!(host.watchers_disposed(), 1);
    }

    #[test]
    fn test_minted_leases_are_distinct() {
        let host = host_with_proj();
        let tracker = tracker(&host);
        let identity = scheme::encode(Path::new("/proj"));

        let a = tracker.acquire(&identity, None).unwrap();
        let b = tracker.acquire(&identity, None).unwrap();
        assert_ne!(a.reason(), b.reason());
    }

    #[test]
    fn test_release_is_idempotent() {
        let host = host_with_proj();
        let tracker = tracker(&host);
        let identity = scheme::encode(Path::new("/proj"));

        let keep = tracker.acquire(&identity, None).unwrap();
        let reason = tracker.acquire(&identity, None).unwrap().detach();

        tracker.release(&identity, reason);
        tracker.release(&identity, reason);
        tracker.release(&identity, Reason::Visible);
        assert!(tracker.is_watched(&identity));
        assert_eq!(host.watchers_disposed(), 0);

        drop(keep);
        tracker.release(&identity, reason);
        assert_eq!(host.watchers_disposed(), 1);
    }

    #[test]
    fn test_same_reason_twice_settles() {
        let host = host_with_proj();
        let tracker = tracker(&host);
        let identity = scheme::encode(Path::new("/proj"));

        let _ = tracker.acquire(&identity, Some(Reason::Visible)).unwrap().detach();
        let _ = tracker.acquire(&identity, Some(Reason::Visible)).unwrap().detach();
        assert_eq!(host.watchers_created(), 1);

        tracker.release(&identity, Reason::Visible);
        assert!(!tracker.is_watched(&identity));
    }

    #[test]
    fn test_distinct_identities_do_not_share_entries() {
        let host = host_with_proj();
        let tracker = tracker(&host);
        let first = scheme::encode(Path::new("/proj"));
        let second = scheme::encode(Path::new("/proj"));

        let a = tracker.acquire(&first, None).unwrap();
        let _b = tracker.acquire(&second, None).unwrap();
        assert_eq!(host.watchers_created(), 2);

        a.dispose();
        assert!(!tracker.is_watched(&first));
        assert!(tracker.is_watched(&second));
        assert_eq!(host.live_watchers().len(), 1);
    }

    #[test]
    fn test_malformed_identity_leaves_no_state() {
        let host = host_with_proj();
        let tracker = tracker(&host);
        let identity = SyntheticIdentity::from_parts("%2Fproj", 0);

        assert!(tracker.acquire(&identity, None).is_err());
        assert!(tracker.is_empty());
        assert_eq!(host.watchers_created(), 0);
    }

    #[test]
    fn test_watcher_failure_is_reported() {
        let host = MemoryHost::new();
        let tracker = tracker(&host);
        let identity = scheme::encode(Path::new("/missing"));

        let err = tracker.acquire(&identity, None).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Watcher(WatcherError::WatchFailed { .. })
        ));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_timestamp_absent_until_change() {
        let host = host_with_proj();
        let tracker = tracker(&host);
        let identity = scheme::encode(Path::new("/proj"));

        let _guard = tracker.acquire(&identity, None).unwrap();
        assert_eq!(tracker.current_timestamp(&identity), None);

        tracker.registry.lock().touch(&identity, 100);
        tracker.registry.lock().touch(&identity, 50);
        assert_eq!(tracker.current_timestamp(&identity), Some(100));
    }

    #[test]
    fn test_shutdown_disposes_everything() {
        let host = host_with_proj();
        let tracker = tracker(&host);
        let a = scheme::encode(Path::new("/proj"));
        let b = scheme::encode(Path::new("/proj"));

        let guard = tracker.acquire(&a, None).unwrap();
        let _ = tracker.acquire(&b, Some(Reason::Visible)).unwrap().detach();

        tracker.shutdown();
        assert!(tracker.is_empty());
        assert_eq!(host.watchers_disposed(), 2);

        // Late release after shutdown is harmless.
        drop(guard);
        assert_eq!(host.watchers_disposed(), 2);
    }

    #[test]
    fn test_guard_outliving_tracker() {
        let host = host_with_proj();
        let identity = scheme::encode(Path::new("/proj"));
        let guard = {
            let tracker = tracker(&host);
            tracker.acquire(&identity, None).unwrap()
        };

        assert_eq!(host.watchers_disposed(), 1);
        drop(guard);
        assert_eq!(host.watchers_disposed(), 1);
    }
}
