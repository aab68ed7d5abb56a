//! In-memory host for embedding and deterministic tests.
//!
//! Changes are never detected automatically; call [`MemoryHost::emit`] to
//! deliver one to every live watcher. Like a workspace-wide `**/*` watcher,
//! delivery ignores the watcher's base, so filtering is left to the sink.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{
    ChangeSink, DeleteOptions, DirEntry, FileKind, FileStat, HostFs, RealChange, RealWatcher,
    RenameOptions, WatchPattern,
};
use crate::error::{HostError, HostResult};

#[derive(Debug, Clone)]
enum Node {
    File { data: Vec<u8>, mtime: i64 },
    Directory { mtime: i64 },
}

impl Node {
    fn kind(&self) -> FileKind {
        match self {
            Self::File { .. } => FileKind::File,
            Self::Directory { .. } => FileKind::Directory,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    nodes: BTreeMap<PathBuf, Node>,
    clock: i64,
    unreadable: HashSet<PathBuf>,
    read_delays: HashMap<PathBuf, Duration>,
    workspace_roots: Vec<PathBuf>,
    watchers: BTreeMap<u64, (WatchPattern, ChangeSink)>,
    next_watcher: u64,
    watchers_created: usize,
    watchers_disposed: usize,
}

impl MemoryState {
    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }

    fn require_dir(&self, path: &Path) -> HostResult<()> {
        match self.nodes.get(path) {
            Some(Node::Directory { .. }) => Ok(()),
            Some(Node::File { .. }) => Err(HostError::NotDirectory(path.display().to_string())),
            None => Err(HostError::not_found(path)),
        }
    }

    fn require_parent(&self, path: &Path) -> HostResult<()> {
        match path.parent() {
            Some(parent) => self.require_dir(parent),
            None => Err(HostError::AlreadyExists(path.display().to_string())),
        }
    }

    fn has_children(&self, path: &Path) -> bool {
        self.nodes
            .keys()
            .any(|p| p.parent() == Some(path))
    }

    fn remove_subtree(&mut self, path: &Path) -> Vec<(PathBuf, Node)> {
        let doomed: Vec<PathBuf> = self
            .nodes
            .keys()
            .filter(|p| p.starts_with(path))
            .cloned()
            .collect();
        doomed
            .into_iter()
            .filter_map(|p| self.nodes.remove(&p).map(|n| (p, n)))
            .collect()
    }
}

/// Host filesystem held entirely in memory.
#[derive(Clone)]
pub struct MemoryHost {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryHost")
            .field("nodes", &state.nodes.len())
            .field("live_watchers", &state.watchers.len())
            .finish()
    }
}

impl MemoryHost {
    /// Create a host holding only the root directory `/`.
    #[must_use]
    pub fn new() -> Self {
        let mut state = MemoryState::default();
        state
            .nodes
            .insert(PathBuf::from("/"), Node::Directory { mtime: 0 });
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Register a workspace folder.
    #[must_use]
    pub fn with_workspace_root(self, root: impl Into<PathBuf>) -> Self {
        self.state.lock().workspace_roots.push(root.into());
        self
    }

    /// Create a directory and any missing ancestors.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut state = self.state.lock();
        let mtime = state.tick();
        for ancestor in path.as_ref().ancestors() {
            state
                .nodes
                .entry(ancestor.to_path_buf())
                .or_insert(Node::Directory { mtime });
        }
    }

    /// Create or replace a file, creating missing ancestors.
    pub fn add_file(&self, path: impl AsRef<Path>, data: impl Into<Vec<u8>>) {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            self.add_dir(parent);
        }
        let mut state = self.state.lock();
        let mtime = state.tick();
        state.nodes.insert(
            path.to_path_buf(),
            Node::File {
                data: data.into(),
                mtime,
            },
        );
    }

    /// Make both reads and listings of `path` fail with permission denied.
    pub fn set_unreadable(&self, path: impl AsRef<Path>) {
        self.state
            .lock()
            .unreadable
            .insert(path.as_ref().to_path_buf());
    }

    /// Delay reads and listings of `path`.
    pub fn set_read_delay(&self, path: impl AsRef<Path>, delay: Duration) {
        self.state
            .lock()
            .read_delays
            .insert(path.as_ref().to_path_buf(), delay);
    }

    /// Deliver a change to every live watcher.
    pub fn emit(&self, change: RealChange) {
        let sinks: Vec<ChangeSink> = self
            .state
            .lock()
            .watchers
            .values()
            .map(|(_, sink)| Arc::clone(sink))
            .collect();

        for sink in sinks {
            sink(change.clone());
        }
    }

    /// Number of watchers created so far.
    #[must_use]
    pub fn watchers_created(&self) -> usize {
        self.state.lock().watchers_created
    }

    /// Number of watchers disposed so far.
    #[must_use]
    pub fn watchers_disposed(&self) -> usize {
        self.state.lock().watchers_disposed
    }

    /// Patterns of the currently live watchers.
    #[must_use]
    pub fn live_watchers(&self) -> Vec<WatchPattern> {
        self.state
            .lock()
            .watchers
            .values()
            .map(|(pattern, _)| pattern.clone())
            .collect()
    }

    async fn access(&self, path: &Path) -> HostResult<()> {
        let delay = {
            let state = self.state.lock();
            if state.unreadable.contains(path) {
                return Err(HostError::PermissionDenied(path.display().to_string()));
            }
            state.read_delays.get(path).copied()
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

struct MemoryWatcher {
    id: u64,
    pattern: WatchPattern,
    state: Weak<Mutex<MemoryState>>,
}

impl RealWatcher for MemoryWatcher {
    fn pattern(&self) -> &WatchPattern {
        &self.pattern
    }
}

impl Drop for MemoryWatcher {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            let mut state = state.lock();
            if state.watchers.remove(&self.id).is_some() {
                state.watchers_disposed += 1;
            }
        }
    }
}

#[async_trait]
impl HostFs for MemoryHost {
    async fn stat(&self, path: &Path) -> HostResult<FileStat> {
        let state = self.state.lock();
        match state.nodes.get(path) {
            Some(Node::File { data, mtime }) => Ok(FileStat {
                kind: FileKind::File,
                ctime: *mtime,
                mtime: *mtime,
                size: data.len() as u64,
            }),
            Some(Node::Directory { mtime }) => Ok(FileStat {
                kind: FileKind::Directory,
                ctime: *mtime,
                mtime: *mtime,
                size: 0,
            }),
            None => Err(HostError::not_found(path)),
        }
    }

    async fn read_file(&self, path: &Path) -> HostResult<Vec<u8>> {
        self.access(path).await?;

        let state = self.state.lock();
        match state.nodes.get(path) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            Some(Node::Directory { .. }) => {
                Err(HostError::IsDirectory(path.display().to_string()))
            }
            None => Err(HostError::not_found(path)),
        }
    }

    async fn read_directory(&self, path: &Path) -> HostResult<Vec<DirEntry>> {
        self.access(path).await?;

        let state = self.state.lock();
        state.require_dir(path)?;

        Ok(state
            .nodes
            .iter()
            .filter(|(p, _)| p.parent() == Some(path))
            .filter_map(|(p, node)| {
                p.file_name()
                    .map(|name| DirEntry::new(name, node.kind()))
            })
            .collect())
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> HostResult<()> {
        let mut state = self.state.lock();
        state.require_parent(path)?;
        if let Some(Node::Directory { .. }) = state.nodes.get(path) {
            return Err(HostError::IsDirectory(path.display().to_string()));
        }

        let mtime = state.tick();
        state.nodes.insert(
            path.to_path_buf(),
            Node::File {
                data: content.to_vec(),
                mtime,
            },
        );
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path, options: RenameOptions) -> HostResult<()> {
        let mut state = self.state.lock();
        if !state.nodes.contains_key(from) {
            return Err(HostError::not_found(from));
        }
        state.require_parent(to)?;
        if state.nodes.contains_key(to) {
            if !options.overwrite {
                return Err(HostError::AlreadyExists(to.display().to_string()));
            }
            state.remove_subtree(to);
        }

        for (path, node) in state.remove_subtree(from) {
            let suffix = path.strip_prefix(from).unwrap_or(Path::new(""));
            let moved = if suffix.as_os_str().is_empty() {
                to.to_path_buf()
            } else {
                to.join(suffix)
            };
            state.nodes.insert(moved, node);
        }
        Ok(())
    }

    async fn delete(&self, path: &Path, options: DeleteOptions) -> HostResult<()> {
        let mut state = self.state.lock();
        match state.nodes.get(path) {
            None => return Err(HostError::not_found(path)),
            Some(Node::Directory { .. }) if !options.recursive && state.has_children(path) => {
                return Err(HostError::Io(format!(
                    "directory not empty: {}",
                    path.display()
                )));
            }
            Some(_) => {}
        }
        state.remove_subtree(path);
        Ok(())
    }

    async fn create_directory(&self, path: &Path) -> HostResult<()> {
        let mut state = self.state.lock();
        if state.nodes.contains_key(path) {
            return Err(HostError::AlreadyExists(path.display().to_string()));
        }
        state.require_parent(path)?;

        let mtime = state.tick();
        state
            .nodes
            .insert(path.to_path_buf(), Node::Directory { mtime });
        Ok(())
    }

    fn workspace_root(&self, path: &Path) -> Option<PathBuf> {
        self.state
            .lock()
            .workspace_roots
            .iter()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.components().count())
            .cloned()
    }

    fn create_watcher(
        &self,
        pattern: WatchPattern,
        sink: ChangeSink,
    ) -> HostResult<Box<dyn RealWatcher>> {
        let mut state = self.state.lock();
        if !state.nodes.contains_key(&pattern.base) {
            return Err(HostError::not_found(&pattern.base));
        }

        let id = state.next_watcher;
        state.next_watcher += 1;
        state.watchers_created += 1;
        state.watchers.insert(id, (pattern.clone(), sink));

        Ok(Box::new(MemoryWatcher {
            id,
            pattern,
            state: Arc::downgrade(&self.state),
        }))
    }
}
