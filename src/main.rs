//! dirfile - view a directory as a single file
//!
//! Entry point for the command-line front end.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use dirfile::host::{ConsoleEditor, EditorHost, LocalHost};
use dirfile::observability::init_tracing;
use dirfile::provider::visibility;
use dirfile::{view_directory_as_file, Config, DirectoryFileProvider, Error, Result};
use tokio::sync::broadcast::error::RecvError;

/// dirfile - view a directory's contents concatenated into one document
#[derive(Parser, Debug)]
#[command(name = "dirfile")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DIRFILE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, env = "DIRFILE_LOG_JSON")]
    log_json: bool,

    /// Workspace folders that header paths are relative to
    #[arg(short, long, env = "DIRFILE_WORKSPACE", value_delimiter = ',')]
    workspace: Vec<PathBuf>,

    /// Capacity of the change-event channel
    #[arg(long, env = "DIRFILE_EVENT_CAPACITY", default_value = "256")]
    event_capacity: usize,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Validated configuration built from the global arguments.
    fn config(&self) -> Result<Config> {
        let config = Config {
            log_level: self.log_level.clone(),
            log_json: self.log_json,
            workspace_roots: self.workspace.clone(),
            event_capacity: self.event_capacity,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a directory as one combined document
    View {
        /// Directory to view
        directory: PathBuf,
    },
    /// View a directory, then report changes to it until interrupted
    Watch {
        /// Directory to view
        directory: PathBuf,

        /// Print change events as JSON lines
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = cli.config()?;
    init_tracing(&config.log_level, config.log_json);
    tracing::debug!(?config, "Configuration loaded");

    let host = Arc::new(LocalHost::new(&config));
    let provider = Arc::new(DirectoryFileProvider::new(host, &config));

    match cli.command {
        Command::View { directory } => {
            let directory = tokio::fs::canonicalize(&directory).await?;
            let editor = ConsoleEditor::new(Arc::clone(&provider), std::io::stdout());
            view_directory_as_file(&editor, &directory).await?;
        }
        Command::Watch { directory, json } => {
            let directory = tokio::fs::canonicalize(&directory).await?;
            watch(&provider, &directory, json).await?;
        }
    }

    provider.shutdown();
    Ok(())
}

async fn watch(
    provider: &Arc<DirectoryFileProvider<LocalHost>>,
    directory: &std::path::Path,
    json: bool,
) -> Result<()> {
    let editor = ConsoleEditor::new(Arc::clone(provider), std::io::stdout());

    let reconciler = {
        let provider = Arc::clone(provider);
        let visible = editor.watch_visible();
        tokio::spawn(async move { visibility::run(provider.tracker(), visible).await })
    };

    let mut events = provider.subscribe();
    let identity = view_directory_as_file(&editor, directory).await?;
    tracing::info!(%identity, "Watching for changes, press Ctrl-C to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            batch = events.recv() => match batch {
                Ok(batch) => {
                    for change in batch {
                        if json {
                            let line = serde_json::to_string(&change)
                                .map_err(|e| Error::internal(format!("encode event: {e}")))?;
                            println!("{line}");
                        } else {
                            println!("{} {}", change.kind, change.identity);
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Change events dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    editor.close_document(&identity);
    drop(editor);
    reconciler
        .await
        .map_err(|e| Error::internal(format!("visibility task failed: {e}")))?;

    tracing::info!(%identity, "Stopped watching");
    Ok(())
}
