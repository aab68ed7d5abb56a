//! Recursive content synthesis.
//!
//! Walks a real directory and concatenates every file beneath it, each
//! preceded by a `===== <relative path> =====` separator. Siblings are read
//! concurrently but joined in sorted order, so output never depends on
//! which read finishes first.

use std::path::{Component, Path, PathBuf};

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;

use super::collate;
use crate::host::{FileKind, HostFs};

/// Prefix of the first line of every synthesized document.
pub const HEADER_PREFIX: &str = "Viewing directory as file: ";

/// Synthesize the combined document for `real`.
///
/// Never fails: unreadable nodes are treated as directories, and
/// unlistable directories contribute nothing.
pub async fn synthesize<H: HostFs + ?Sized>(host: &H, real: &Path) -> Vec<u8> {
    let workspace = host
        .workspace_root(real)
        .unwrap_or_else(|| PathBuf::from("/"));

    let mut out = format!("{HEADER_PREFIX}{}\n", relative_slash(&workspace, real)).into_bytes();
    out.extend(visit(host, real.to_path_buf(), real, None).await);

    tracing::debug!(path = %real.display(), bytes = out.len(), "Synthesized directory file");
    out
}

fn visit<'a, H: HostFs + ?Sized>(
    host: &'a H,
    node: PathBuf,
    root: &'a Path,
    hint: Option<FileKind>,
) -> BoxFuture<'a, Vec<u8>> {
    async move {
        if hint != Some(FileKind::Directory) {
            match host.read_file(&node).await {
                Ok(data) => {
                    let mut out =
                        format!("\n===== {} =====\n", relative_slash(root, &node)).into_bytes();
                    out.extend_from_slice(&data);
                    return out;
                }
                Err(e) => {
                    tracing::trace!(path = %node.display(), error = %e, "Not readable as file");
                }
            }
        }

        let mut entries = match host.read_directory(&node).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::trace!(path = %node.display(), error = %e, "Skipping unlistable node");
                return Vec::new();
            }
        };
        entries.sort_by(|a, b| {
            collate::compare(&a.name.to_string_lossy(), &b.name.to_string_lossy())
                .then_with(|| a.name.cmp(&b.name))
        });

        let children = entries
            .into_iter()
            .map(|entry| visit(host, node.join(&entry.name), root, Some(entry.kind)));

        join_all(children).await.concat()
    }
    .boxed()
}

/// Path of `to` relative to `from`, joined with `/`.
///
/// Mirrors `path.relative`: equal paths give an empty string, and paths
/// outside `from` climb with `..`.
#[must_use]
pub fn relative_slash(from: &Path, to: &Path) -> String {
    let from: Vec<Component<'_>> = from.components().collect();
    let to: Vec<Component<'_>> = to.components().collect();

    let shared = from
        .iter()
        .zip(&to)
        .take_while(|(a, b)| a == b)
        .count();

    let ups = from[shared..]
        .iter()
        .filter(|c| matches!(c, Component::Normal(_)))
        .map(|_| "..".to_string());
    let downs = to[shared..]
        .iter()
        .map(|c| c.as_os_str().to_string_lossy().into_owned());

    ups.chain(downs).collect::<Vec<_>>().join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;
    use std::time::Duration;

    #[test]
    fn test_relative_slash() {
        assert_eq!(relative_slash(Path::new("/"), Path::new("/proj")), "proj");
        assert_eq!(
            relative_slash(Path::new("/proj"), Path::new("/proj/sub/c.txt")),
            "sub/c.txt"
        );
        assert_eq!(relative_slash(Path::new("/proj"), Path::new("/proj")), "");
        assert_eq!(
            relative_slash(Path::new("/proj/a"), Path::new("/proj/b/c")),
            "../b/c"
        );
    }

    #[tokio::test]
    async fn test_sorted_concatenation() {
        let host = MemoryHost::new();
        host.add_file("/proj/b.txt", "B");
        host.add_file("/proj/a.txt", "A");

        let out = synthesize(&host, Path::new("/proj")).await;
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Viewing directory as file: proj\n\n===== a.txt =====\nA\n===== b.txt =====\nB"
        );
    }

    #[tokio::test]
    async fn test_empty_directory_is_header_only() {
        let host = MemoryHost::new();
        host.add_dir("/proj/empty");

        let out = synthesize(&host, Path::new("/proj/empty")).await;
        assert_eq!(out, b"Viewing directory as file: proj/empty\n");
    }

    #[tokio::test]
    async fn test_nested_paths_relative_to_viewed_dir() {
        let host = MemoryHost::new().with_workspace_root("/proj");
        host.add_file("/proj/src/z.rs", "Z");
        host.add_file("/proj/src/inner/a.rs", "A");
        host.add_file("/proj/src/B.rs", "b");

        let out = synthesize(&host, Path::new("/proj/src")).await;
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Viewing directory as file: src\n\
             \n===== B.rs =====\nb\
             \n===== inner/a.rs =====\nA\
             \n===== z.rs =====\nZ"
        );
    }

    #[tokio::test]
    async fn test_order_independent_of_completion() {
        let host = MemoryHost::new();
        host.add_file("/proj/a.txt", "A");
        host.add_file("/proj/b.txt", "B");
        host.set_read_delay("/proj/a.txt", Duration::from_millis(50));

        let out = synthesize(&host, Path::new("/proj")).await;
        assert!(String::from_utf8(out)
            .unwrap()
            .ends_with("\n===== a.txt =====\nA\n===== b.txt =====\nB"));
    }

    #[tokio::test]
    async fn test_unreadable_nodes_are_skipped() {
        let host = MemoryHost::new();
        host.add_file("/proj/ok.txt", "OK");
        host.add_file("/proj/locked/secret.txt", "S");
        host.set_unreadable("/proj/locked");

        let out = synthesize(&host, Path::new("/proj")).await;
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Viewing directory as file: proj\n\n===== ok.txt =====\nOK"
        );
    }

    #[tokio::test]
    async fn test_missing_location_is_header_only() {
        let host = MemoryHost::new();
        let out = synthesize(&host, Path::new("/gone")).await;
        assert_eq!(out, b"Viewing directory as file: gone\n");
    }

    #[tokio::test]
    async fn test_repeated_synthesis_is_identical() {
        let host = MemoryHost::new();
        for name in ["c", "A", "b", "_d", "10", "2"] {
            host.add_file(format!("/proj/{name}"), name);
        }

        let first = synthesize(&host, Path::new("/proj")).await;
        let second = synthesize(&host, Path::new("/proj")).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_binary_content_copied_verbatim() {
        let host = MemoryHost::new();
        host.add_file("/bin/blob", vec![0u8, 159, 146, 150, 255]);

        let out = synthesize(&host, Path::new("/bin")).await;
        assert!(out.ends_with(&[0u8, 159, 146, 150, 255]));
    }
}
