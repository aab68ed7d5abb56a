//! Keeps `Visible` watch reasons in step with the editor's open documents.

use std::collections::HashSet;

use tokio::sync::watch;

use super::registry::{Reason, WatchTracker};
use crate::host::HostFs;
use crate::scheme::{self, SyntheticIdentity};

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub acquired: usize,
    pub released: usize,
}

/// Align `Visible` reasons with `open`, the identity strings of every open
/// document. Strings outside this scheme are ignored. Running it again with
/// the same input changes nothing.
pub fn reconcile<H, I, S>(tracker: &WatchTracker<H>, open: I) -> Reconciliation
where
    H: HostFs,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let open: HashSet<SyntheticIdentity> = open
        .into_iter()
        .filter(|uri| scheme::is_synthetic(uri.as_ref()))
        .filter_map(|uri| match uri.as_ref().parse::<SyntheticIdentity>() {
            Ok(identity) => Some(identity),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unparseable open document");
                None
            }
        })
        .collect();

    let mut outcome = Reconciliation::default();

    for identity in &open {
        if tracker.holds(identity, Reason::Visible) {
            continue;
        }
        match tracker.acquire(identity, Some(Reason::Visible)) {
            Ok(guard) => {
                guard.detach();
                outcome.acquired += 1;
            }
            Err(e) => {
                tracing::warn!(%identity, error = %e, "Failed to watch visible document");
            }
        }
    }

    for identity in tracker.held_by(Reason::Visible) {
        if !open.contains(&identity) {
            tracker.release(&identity, Reason::Visible);
            outcome.released += 1;
        }
    }

    tracing::debug!(
        open = open.len(),
        acquired = outcome.acquired,
        released = outcome.released,
        "Reconciled visible documents"
    );
    outcome
}

/// Reconcile on every update of `visible` until its sender goes away.
pub async fn run<H: HostFs>(tracker: &WatchTracker<H>, mut visible: watch::Receiver<Vec<String>>) {
    loop {
        let open = visible.borrow_and_update().clone();
        reconcile(tracker, &open);

        if visible.changed().await.is_err() {
            break;
        }
    }

    tracing::debug!("Visible document stream closed");
}
