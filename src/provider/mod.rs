//! Filesystem provider for the `directoryfile` scheme.
//!
//! This module provides:
//! - Synthesis of a directory's recursive contents as one document
//! - Lease-counted real watchers per synthetic identity
//! - Routing of real change events back to synthetic identities
//! - Reconciliation of watch interest with the editor's open documents
//!
//! Everything except `read_file` and `watch` is a passthrough to the real
//! location the identity decodes to.

mod collate;
mod registry;
mod router;
mod synth;
pub mod visibility;

pub use registry::{LeaseId, Reason, WatchGuard, WatchTracker};
pub use router::{ChangeRouter, SyntheticChange};
pub use synth::{relative_slash, synthesize, HEADER_PREFIX};
pub use visibility::Reconciliation;

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::Instrument;

use crate::config::Config;
use crate::error::WatcherError;
use crate::host::{DeleteOptions, DirEntry, FileKind, FileStat, HostFs, RenameOptions};
use crate::observability::spans;
use crate::scheme::{self, SyntheticIdentity};
use crate::Result;

/// Options accompanying a `watch` request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// The whole subtree is always watched; the flag is accepted either way.
    pub recursive: bool,
    /// Globs to leave out. The real watcher cannot express these.
    pub excludes: Vec<String>,
}

/// Provider serving synthetic directory documents from a host filesystem.
pub struct DirectoryFileProvider<H: HostFs> {
    host: Arc<H>,
    tracker: WatchTracker<H>,
    events: broadcast::Sender<Vec<SyntheticChange>>,
}

impl<H: HostFs> DirectoryFileProvider<H> {
    /// Create a provider over `host`.
    pub fn new(host: Arc<H>, config: &Config) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let router_events = events.clone();
        let tracker = WatchTracker::new(Arc::clone(&host), move |registry| {
            ChangeRouter::new(registry, router_events)
        });

        Self {
            host,
            tracker,
            events,
        }
    }

    #[must_use]
    pub fn host(&self) -> &Arc<H> {
        &self.host
    }

    #[must_use]
    pub fn tracker(&self) -> &WatchTracker<H> {
        &self.tracker
    }

    /// Subscribe to synthetic change events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<SyntheticChange>> {
        self.events.subscribe()
    }

    /// Stat the real directory, reported as a file.
    ///
    /// The modification time is the last routed change when one has been
    /// observed, otherwise the real directory's own.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity is malformed or the host stat fails.
    pub async fn stat(&self, identity: &SyntheticIdentity) -> Result<FileStat> {
        let real = scheme::decode(identity)?;
        let mut stat = self
            .host
            .stat(&real)
            .instrument(spans::provider_span("stat", identity))
            .await?;

        stat.kind = FileKind::File;
        if let Some(changed_at) = self.tracker.current_timestamp(identity) {
            stat.mtime = changed_at;
        }
        Ok(stat)
    }

    /// List the real directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity is malformed or the listing fails.
    pub async fn read_directory(&self, identity: &SyntheticIdentity) -> Result<Vec<DirEntry>> {
        let real = scheme::decode(identity)?;
        Ok(self.host.read_directory(&real).await?)
    }

    /// Synthesize the combined document.
    ///
    /// # Errors
    ///
    /// Returns an error only if the identity is malformed.
    pub async fn read_file(&self, identity: &SyntheticIdentity) -> Result<Vec<u8>> {
        let real = scheme::decode(identity)?;
        Ok(synthesize(self.host.as_ref(), &real)
            .instrument(spans::provider_span("read_file", identity))
            .await)
    }

    /// Write straight through to the real location.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity is malformed or the host write fails.
    pub async fn write_file(&self, identity: &SyntheticIdentity, content: &[u8]) -> Result<()> {
        let real = scheme::decode(identity)?;
        Ok(self.host.write_file(&real, content).await?)
    }

    /// Rename the real location.
    ///
    /// # Errors
    ///
    /// Returns an error if either identity is malformed or the host rename fails.
    pub async fn rename(
        &self,
        from: &SyntheticIdentity,
        to: &SyntheticIdentity,
        options: RenameOptions,
    ) -> Result<()> {
        let real_from = scheme::decode(from)?;
        let real_to = scheme::decode(to)?;
        Ok(self.host.rename(&real_from, &real_to, options).await?)
    }

    /// Delete the real location.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity is malformed or the host delete fails.
    pub async fn delete(&self, identity: &SyntheticIdentity, options: DeleteOptions) -> Result<()> {
        let real = scheme::decode(identity)?;
        Ok(self.host.delete(&real, options).await?)
    }

    /// Create the real directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity is malformed or the host call fails.
    pub async fn create_directory(&self, identity: &SyntheticIdentity) -> Result<()> {
        let real = scheme::decode(identity)?;
        Ok(self.host.create_directory(&real).await?)
    }

    /// Register explicit watch interest under a freshly minted lease.
    ///
    /// # Errors
    ///
    /// Fails with [`WatcherError::UnsupportedOption`] when `excludes` is
    /// non-empty, and otherwise as [`WatchTracker::acquire`] does.
    pub fn watch(&self, identity: &SyntheticIdentity, options: &WatchOptions) -> Result<WatchGuard> {
        if !options.excludes.is_empty() {
            return Err(WatcherError::UnsupportedOption(format!(
                "excludes [{}]",
                options.excludes.join(", ")
            ))
            .into());
        }

        self.tracker.acquire(identity, None)
    }

    /// Align visibility-held watches with the currently open documents.
    pub fn reconcile_visible<I, S>(&self, open: I) -> Reconciliation
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        visibility::reconcile(&self.tracker, open)
    }

    /// Dispose every remaining watch.
    pub fn shutdown(&self) {
        self.tracker.shutdown();
    }
}
