//! dirfile library
//!
//! Presents a directory's recursive contents as one synthetic document,
//! keeps real watchers alive for as long as views need them, and maps real
//! change events back onto the synthetic documents they affect.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod command;
pub mod config;
pub mod error;
pub mod host;
pub mod observability;
pub mod provider;
pub mod scheme;

pub use command::view_directory_as_file;
pub use config::Config;
pub use error::{Error, HostError, Result, WatcherError};
pub use provider::{DirectoryFileProvider, SyntheticChange, WatchGuard, WatchOptions};
pub use scheme::SyntheticIdentity;
