//! Local-disk host backed by tokio::fs and notify-rs.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use super::{
    ChangeKind, ChangeSink, DeleteOptions, DirEntry, FileKind, FileStat, HostFs, RealChange,
    RealWatcher, RenameOptions, WatchPattern,
};
use crate::config::Config;
use crate::error::{HostError, HostResult};

/// Host filesystem backed by the local disk.
#[derive(Debug, Clone, Default)]
pub struct LocalHost {
    config: Config,
}

impl LocalHost {
    /// Create a host using the workspace roots from `config`.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

/// Live notify watcher.
struct LocalWatcher {
    _watcher: RecommendedWatcher,
    pattern: WatchPattern,
}

impl RealWatcher for LocalWatcher {
    fn pattern(&self) -> &WatchPattern {
        &self.pattern
    }
}

#[async_trait]
impl HostFs for LocalHost {
    async fn stat(&self, path: &Path) -> HostResult<FileStat> {
        let meta = tokio::fs::metadata(path).await?;

        Ok(FileStat {
            kind: kind_of(meta.file_type()),
            ctime: meta.created().map_or(0, to_millis),
            mtime: meta.modified().map_or(0, to_millis),
            size: meta.len(),
        })
    }

    async fn read_file(&self, path: &Path) -> HostResult<Vec<u8>> {
        Ok(tokio::fs::read(path).await?)
    }

    async fn read_directory(&self, path: &Path) -> HostResult<Vec<DirEntry>> {
        let mut dir = tokio::fs::read_dir(path).await?;
        let mut entries = Vec::new();

        while let Some(entry) = dir.next_entry().await? {
            let kind = entry
                .file_type()
                .await
                .map_or(FileKind::Unknown, kind_of);
            entries.push(DirEntry::new(entry.file_name(), kind));
        }

        Ok(entries)
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> HostResult<()> {
        Ok(tokio::fs::write(path, content).await?)
    }

    async fn rename(&self, from: &Path, to: &Path, options: RenameOptions) -> HostResult<()> {
        if !options.overwrite && tokio::fs::try_exists(to).await? {
            return Err(HostError::AlreadyExists(to.display().to_string()));
        }
        Ok(tokio::fs::rename(from, to).await?)
    }

    async fn delete(&self, path: &Path, options: DeleteOptions) -> HostResult<()> {
        let meta = tokio::fs::symlink_metadata(path).await?;

        if meta.is_dir() {
            if options.recursive {
                tokio::fs::remove_dir_all(path).await?;
            } else {
                tokio::fs::remove_dir(path).await?;
            }
        } else {
            tokio::fs::remove_file(path).await?;
        }

        Ok(())
    }

    async fn create_directory(&self, path: &Path) -> HostResult<()> {
        Ok(tokio::fs::create_dir(path).await?)
    }

    fn workspace_root(&self, path: &Path) -> Option<PathBuf> {
        self.config.workspace_root_for(path).map(Path::to_path_buf)
    }

    fn create_watcher(
        &self,
        pattern: WatchPattern,
        sink: ChangeSink,
    ) -> HostResult<Box<dyn RealWatcher>> {
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    for change in translate(event) {
                        sink(change);
                    }
                }
                Err(e) => {
                    tracing::error!("Watch error: {:?}", e);
                }
            }
        })
        .map_err(|e| HostError::Unavailable(e.to_string()))?;

        watcher
            .watch(&pattern.base, RecursiveMode::Recursive)
            .map_err(|e| match e.kind {
                notify::ErrorKind::PathNotFound => HostError::not_found(&pattern.base),
                _ => HostError::Io(e.to_string()),
            })?;

        tracing::info!(path = %pattern.base.display(), glob = %pattern.glob, "Watching directory");

        Ok(Box::new(LocalWatcher {
            _watcher: watcher,
            pattern,
        }))
    }
}

/// Map a notify event onto created/changed/deleted changes.
fn translate(event: Event) -> Vec<RealChange> {
    let kind = match event.kind {
        EventKind::Access(_) => return Vec::new(),
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Remove(_) => ChangeKind::Deleted,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Deleted,
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Created,
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = event.paths.into_iter();
            return paths
                .next()
                .map(|from| RealChange::new(from, ChangeKind::Deleted))
                .into_iter()
                .chain(paths.map(|to| RealChange::new(to, ChangeKind::Created)))
                .collect();
        }
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => ChangeKind::Changed,
    };

    event
        .paths
        .into_iter()
        .map(|path| RealChange::new(path, kind))
        .collect()
}

fn kind_of(file_type: std::fs::FileType) -> FileKind {
    if file_type.is_symlink() {
        FileKind::SymbolicLink
    } else if file_type.is_dir() {
        FileKind::Directory
    } else if file_type.is_file() {
        FileKind::File
    } else {
        FileKind::Unknown
    }
}

fn to_millis(time: SystemTime) -> i64 {
    DateTime::<Utc>::from(time).timestamp_millis()
}
