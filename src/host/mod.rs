//! Host capabilities consumed by the provider.
//!
//! The provider never touches a filesystem or an editor directly. It goes
//! through two traits:
//! - [`HostFs`]: read/list/stat/write primitives plus real watchers
//! - [`EditorHost`]: the open-document set and document display
//!
//! [`LocalHost`] backs `HostFs` with the local disk and notify-rs;
//! [`MemoryHost`] is an in-memory tree whose change events are emitted by hand.
//! [`ConsoleEditor`] is an `EditorHost` that writes shown documents to a stream.

mod console;
mod local;
mod memory;

pub use console::ConsoleEditor;
pub use local::LocalHost;
pub use memory::MemoryHost;

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;

use crate::error::HostResult;
use crate::scheme::SyntheticIdentity;
use crate::Result;

/// Kind of a filesystem node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
    SymbolicLink,
    Unknown,
}

/// Metadata reported by `stat`. Times are milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub kind: FileKind,
    pub ctime: i64,
    pub mtime: i64,
    pub size: u64,
}

/// One entry of a directory listing. Names are kept as the host reports
/// them, so non-UTF-8 names still join back onto a readable path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: OsString,
    pub kind: FileKind,
}

impl DirEntry {
    pub fn new(name: impl Into<OsString>, kind: FileKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Kind of change observed by a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Changed,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Changed => "changed",
            Self::Deleted => "deleted",
        })
    }
}

/// A change to a real filesystem location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl RealChange {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Subtree a real watcher covers: `glob` is matched relative to `base`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchPattern {
    pub base: PathBuf,
    pub glob: String,
}

impl WatchPattern {
    /// Pattern covering everything under `dir`.
    ///
    /// The glob is spelled relative to `workspace_root` (or `/`) so hosts
    /// that match workspace-relative globs see the whole subtree.
    #[must_use]
    pub fn subtree(dir: &Path, workspace_root: Option<&Path>) -> Self {
        let root = workspace_root.unwrap_or_else(|| Path::new("/"));
        let relative = crate::provider::relative_slash(root, dir);
        let glob = if relative.is_empty() {
            "**/*".to_string()
        } else {
            format!("{relative}/**/*")
        };

        Self {
            base: dir.to_path_buf(),
            glob,
        }
    }
}

/// Callback invoked by a real watcher for every observed change.
pub type ChangeSink = Arc<dyn Fn(RealChange) + Send + Sync>;

/// Handle to a live real watcher. Dropping it stops the watch.
pub trait RealWatcher: Send {
    fn pattern(&self) -> &WatchPattern;
}

/// Options for `rename`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenameOptions {
    pub overwrite: bool,
}

/// Options for `delete`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    pub recursive: bool,
}

/// Filesystem primitives supplied by the host.
#[async_trait]
pub trait HostFs: Send + Sync + 'static {
    async fn stat(&self, path: &Path) -> HostResult<FileStat>;

    async fn read_file(&self, path: &Path) -> HostResult<Vec<u8>>;

    async fn read_directory(&self, path: &Path) -> HostResult<Vec<DirEntry>>;

    async fn write_file(&self, path: &Path, content: &[u8]) -> HostResult<()>;

    async fn rename(&self, from: &Path, to: &Path, options: RenameOptions) -> HostResult<()>;

    async fn delete(&self, path: &Path, options: DeleteOptions) -> HostResult<()>;

    async fn create_directory(&self, path: &Path) -> HostResult<()>;

    /// Workspace folder containing `path`, if any.
    fn workspace_root(&self, path: &Path) -> Option<PathBuf>;

    /// Start a real watcher delivering changes under `pattern` to `sink`.
    ///
    /// Implementations must not invoke `sink` before this call returns.
    fn create_watcher(
        &self,
        pattern: WatchPattern,
        sink: ChangeSink,
    ) -> HostResult<Box<dyn RealWatcher>>;
}

/// A document opened by the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub identity: SyntheticIdentity,
    pub content: Vec<u8>,
}

/// Editor surface supplied by the host.
#[async_trait]
pub trait EditorHost: Send + Sync {
    /// Identity strings of every document currently open in a tab.
    fn visible_documents(&self) -> Vec<String>;

    /// Stream of the open-document set, updated on every tab/editor change.
    fn watch_visible(&self) -> watch::Receiver<Vec<String>>;

    async fn open_document(&self, identity: &SyntheticIdentity) -> Result<Document>;

    async fn show_document(&self, document: &Document, preview: bool) -> Result<()>;
}
