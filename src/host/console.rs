//! Editor host that "shows" documents by writing them to a stream.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;

use super::{Document, EditorHost, HostFs};
use crate::provider::DirectoryFileProvider;
use crate::scheme::SyntheticIdentity;
use crate::Result;

/// Minimal editor: documents open through the provider, showing one
/// writes its content to `out`, and every non-preview show keeps the
/// document in the open set until [`ConsoleEditor::close_document`].
pub struct ConsoleEditor<H: HostFs, W> {
    provider: Arc<DirectoryFileProvider<H>>,
    open: watch::Sender<Vec<String>>,
    out: Mutex<W>,
}

impl<H: HostFs, W: Write + Send> ConsoleEditor<H, W> {
    pub fn new(provider: Arc<DirectoryFileProvider<H>>, out: W) -> Self {
        let (open, _) = watch::channel(Vec::new());
        Self {
            provider,
            open,
            out: Mutex::new(out),
        }
    }

    /// Close the tab holding `identity`, if any.
    pub fn close_document(&self, identity: &SyntheticIdentity) {
        let uri = identity.to_string();
        self.open.send_modify(|open| open.retain(|u| *u != uri));
    }

    /// Consume the editor, returning the output stream.
    pub fn into_output(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<H: HostFs, W: Write + Send> EditorHost for ConsoleEditor<H, W> {
    fn visible_documents(&self) -> Vec<String> {
        self.open.borrow().clone()
    }

    fn watch_visible(&self) -> watch::Receiver<Vec<String>> {
        self.open.subscribe()
    }

    async fn open_document(&self, identity: &SyntheticIdentity) -> Result<Document> {
        let content = self.provider.read_file(identity).await?;
        Ok(Document {
            identity: identity.clone(),
            content,
        })
    }

    async fn show_document(&self, document: &Document, preview: bool) -> Result<()> {
        {
            let mut out = self.out.lock();
            out.write_all(&document.content)?;
            if !document.content.ends_with(b"\n") {
                out.write_all(b"\n")?;
            }
            out.flush()?;
        }

        if !preview {
            let uri = document.identity.to_string();
            self.open.send_modify(|open| {
                if !open.contains(&uri) {
                    open.push(uri);
                }
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::host::MemoryHost;
    use crate::scheme;
    use std::path::Path;

    fn editor() -> ConsoleEditor<MemoryHost, Vec<u8>> {
        let host = MemoryHost::new();
        host.add_file("/proj/a.txt", "A");
        let provider = Arc::new(DirectoryFileProvider::new(
            Arc::new(host),
            &Config::default(),
        ));
        ConsoleEditor::new(provider, Vec::new())
    }

    #[tokio::test]
    async fn test_show_writes_and_opens() {
        let editor = editor();
        let identity = scheme::encode(Path::new("/proj"));

        let document = editor.open_document(&identity).await.unwrap();
        editor.show_document(&document, false).await.unwrap();
        editor.show_document(&document, false).await.unwrap();

        assert_eq!(editor.visible_documents(), vec![identity.to_string()]);

        let out = String::from_utf8(editor.into_output()).unwrap();
        assert!(out.starts_with("Viewing directory as file: proj\n"));
        assert!(out.contains("===== a.txt =====\nA\n"));
    }

    #[tokio::test]
    async fn test_preview_does_not_open() {
        let editor = editor();
        let identity = scheme::encode(Path::new("/proj"));

        let document = editor.open_document(&identity).await.unwrap();
        editor.show_document(&document, true).await.unwrap();
        assert!(editor.visible_documents().is_empty());
    }

    #[tokio::test]
    async fn test_close_document_updates_stream() {
        let editor = editor();
        let identity = scheme::encode(Path::new("/proj"));
        let mut rx = editor.watch_visible();

        let document = editor.open_document(&identity).await.unwrap();
        editor.show_document(&document, false).await.unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), vec![identity.to_string()]);

        editor.close_document(&identity);
        assert!(rx.borrow_and_update().is_empty());
    }
}
