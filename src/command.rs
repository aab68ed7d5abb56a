//! The "view directory as file" action.

use std::path::Path;

use tracing::Instrument;

use crate::host::EditorHost;
use crate::observability::spans;
use crate::scheme::{self, SyntheticIdentity};
use crate::Result;

/// Mint a fresh identity for `directory`, open it, and show it as a
/// non-preview document.
///
/// # Errors
///
/// Returns an error if the editor fails to open or show the document.
pub async fn view_directory_as_file<E: EditorHost + ?Sized>(
    editor: &E,
    directory: &Path,
) -> Result<SyntheticIdentity> {
    let identity = scheme::encode(directory);

    async {
        let document = editor.open_document(&identity).await.map_err(|e| {
            tracing::error!(%identity, error = %e, "Failed to open directory file");
            e
        })?;

        editor.show_document(&document, false).await?;
        tracing::info!(%identity, bytes = document.content.len(), "Opened directory file");

        Ok(identity.clone())
    }
    .instrument(spans::command_span(directory))
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Document;
    use crate::Error;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use tokio::sync::watch;

    #[derive(Default)]
    struct RecordingEditor {
        fail_open: bool,
        shown: Mutex<Vec<(SyntheticIdentity, bool)>>,
    }

    #[async_trait]
    impl EditorHost for RecordingEditor {
        fn visible_documents(&self) -> Vec<String> {
            Vec::new()
        }

        fn watch_visible(&self) -> watch::Receiver<Vec<String>> {
            watch::channel(Vec::new()).1
        }

        async fn open_document(&self, identity: &SyntheticIdentity) -> Result<Document> {
            if self.fail_open {
                return Err(Error::internal("editor refused"));
            }
            Ok(Document {
                identity: identity.clone(),
                content: b"doc".to_vec(),
            })
        }

        async fn show_document(&self, document: &Document, preview: bool) -> Result<()> {
            self.shown.lock().push((document.identity.clone(), preview));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_opens_and_shows_non_preview() {
        let editor = RecordingEditor::default();
        let identity = view_directory_as_file(&editor, Path::new("/proj"))
            .await
            .unwrap();

        assert_eq!(scheme::decode(&identity).unwrap(), Path::new("/proj"));
        assert_eq!(*editor.shown.lock(), vec![(identity, false)]);
    }

    #[tokio::test]
    async fn test_repeat_views_get_distinct_identities() {
        let editor = RecordingEditor::default();
        let first = view_directory_as_file(&editor, Path::new("/proj"))
            .await
            .unwrap();
        let second = view_directory_as_file(&editor, Path::new("/proj"))
            .await
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(first.path(), second.path());
    }

    #[tokio::test]
    async fn test_open_failure_skips_show() {
        let editor = RecordingEditor {
            fail_open: true,
            ..Default::default()
        };

        assert!(view_directory_as_file(&editor, Path::new("/proj"))
            .await
            .is_err());
        assert!(editor.shown.lock().is_empty());
    }
}
