//! Translation of real change events into synthetic ones.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;

use super::registry::WatchRegistry;
use crate::host::{ChangeKind, ChangeSink, RealChange};
use crate::scheme::SyntheticIdentity;

/// A change to a synthetic document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntheticChange {
    #[serde(serialize_with = "serialize_display")]
    pub identity: SyntheticIdentity,
    pub kind: ChangeKind,
}

fn serialize_display<S: serde::Serializer>(
    identity: &SyntheticIdentity,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(identity)
}

/// Routes real changes to the identity whose subtree they fall under.
#[derive(Clone)]
pub struct ChangeRouter {
    registry: Weak<Mutex<WatchRegistry>>,
    events: broadcast::Sender<Vec<SyntheticChange>>,
}

impl ChangeRouter {
    pub(crate) fn new(
        registry: Weak<Mutex<WatchRegistry>>,
        events: broadcast::Sender<Vec<SyntheticChange>>,
    ) -> Self {
        Self { registry, events }
    }

    /// Route one real change observed by the watcher owned by `identity`.
    ///
    /// Changes outside `root` are dropped. Returns whether an event was
    /// emitted.
    pub fn route(&self, identity: &SyntheticIdentity, root: &Path, change: &RealChange) -> bool {
        if !change.path.starts_with(root) {
            return false;
        }

        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .touch(identity, Utc::now().timestamp_millis());
        }

        tracing::debug!(
            %identity,
            path = %change.path.display(),
            kind = ?change.kind,
            "Routing change"
        );

        // No subscribers is not an error.
        let _ = self.events.send(vec![SyntheticChange {
            identity: identity.clone(),
            kind: change.kind,
        }]);
        true
    }

    /// Sink to hand to the real watcher created for `identity`.
    pub(crate) fn sink(&self, identity: SyntheticIdentity, root: PathBuf) -> ChangeSink {
        let router = self.clone();
        Arc::new(move |change: RealChange| {
            router.route(&identity, &root, &change);
        })
    }
}
