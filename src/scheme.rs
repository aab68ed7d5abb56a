//! Synthetic document identities.
//!
//! An identity is the percent-encoded real directory path, followed by
//! [`MARKER`], plus a `#<seq>` fragment that keeps repeated views of the
//! same directory apart. Only the path participates in decoding.

use std::borrow::Cow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{Error, Result};

/// Scheme prefix distinguishing synthetic documents from real ones.
pub const SCHEME: &str = "directoryfile";

/// Suffix appended to every encoded path.
pub const MARKER: &str = ". (Directory)";

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Identity of one "directory viewed as file" document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SyntheticIdentity {
    path: String,
    seq: u64,
}

impl SyntheticIdentity {
    /// Build an identity from an already-encoded path and a sequence number.
    ///
    /// No validation happens here; [`decode`] reports a bad path.
    pub fn from_parts(path: impl Into<String>, seq: u64) -> Self {
        Self {
            path: path.into(),
            seq,
        }
    }

    /// Encoded path, marker included.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Disambiguating sequence number.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for SyntheticIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}:{}#{}", self.path, self.seq)
    }
}

impl FromStr for SyntheticIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let rest = s
            .strip_prefix(SCHEME)
            .and_then(|r| r.strip_prefix(':'))
            .ok_or_else(|| Error::malformed(s, format!("missing '{SCHEME}:' prefix")))?;

        let (path, fragment) = rest
            .rsplit_once('#')
            .ok_or_else(|| Error::malformed(s, "missing sequence fragment"))?;

        let seq = fragment
            .parse::<u64>()
            .map_err(|e| Error::malformed(s, format!("invalid sequence '{fragment}': {e}")))?;

        let identity = Self::from_parts(path, seq);
        decode(&identity)?;
        Ok(identity)
    }
}

/// Whether a document identity string belongs to this scheme.
#[must_use]
pub fn is_synthetic(uri: &str) -> bool {
    uri.strip_prefix(SCHEME)
        .is_some_and(|rest| rest.starts_with(':'))
}

/// Mint a fresh identity for a real directory.
///
/// Every call takes a new sequence number, so two views of the same
/// directory never share an identity.
#[must_use]
pub fn encode(real: &Path) -> SyntheticIdentity {
    let path = format!("{}{MARKER}", urlencoding::encode_binary(&path_bytes(real)));
    let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);

    SyntheticIdentity { path, seq }
}

#[cfg(unix)]
fn path_bytes(real: &Path) -> Cow<'_, [u8]> {
    use std::os::unix::ffi::OsStrExt;

    Cow::Borrowed(real.as_os_str().as_bytes())
}

#[cfg(not(unix))]
fn path_bytes(real: &Path) -> Cow<'_, [u8]> {
    match real.to_str() {
        Some(s) => Cow::Borrowed(s.as_bytes()),
        None => {
            tracing::warn!(path = %real.display(), "Non UTF-8 path, encoding lossily");
            Cow::Owned(real.to_string_lossy().into_owned().into_bytes())
        }
    }
}

/// Recover the real directory an identity was minted for.
///
/// # Errors
///
/// Returns [`Error::MalformedIdentity`] if the marker is missing or the
/// path is not valid percent-encoding. On Unix any byte sequence decodes;
/// elsewhere the bytes must be UTF-8.
pub fn decode(identity: &SyntheticIdentity) -> Result<PathBuf> {
    let encoded = identity
        .path
        .strip_suffix(MARKER)
        .ok_or_else(|| Error::malformed(identity.to_string(), "missing directory marker"))?;

    validate_encoding(encoded).map_err(|reason| Error::malformed(identity.to_string(), reason))?;

    let bytes = urlencoding::decode_binary(encoded.as_bytes()).into_owned();
    path_from_bytes(bytes).map_err(|reason| Error::malformed(identity.to_string(), reason))
}

#[cfg(unix)]
fn path_from_bytes(bytes: Vec<u8>) -> std::result::Result<PathBuf, String> {
    use std::os::unix::ffi::OsStringExt;

    Ok(PathBuf::from(std::ffi::OsString::from_vec(bytes)))
}

#[cfg(not(unix))]
fn path_from_bytes(bytes: Vec<u8>) -> std::result::Result<PathBuf, String> {
    String::from_utf8(bytes)
        .map(PathBuf::from)
        .map_err(|e| format!("invalid UTF-8: {e}"))
}

/// Accept exactly what the encoder emits: unreserved characters and `%XX`.
fn validate_encoding(encoded: &str) -> std::result::Result<(), String> {
    let bytes = encoded.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let escape = bytes.get(i + 1..i + 3);
                if !escape.is_some_and(|h| h.iter().all(u8::is_ascii_hexdigit)) {
                    return Err(format!("bad percent escape at byte {i}"));
                }
                i += 3;
            }
            b if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') => i += 1,
            b => return Err(format!("unencoded character {:?} at byte {i}", b as char)),
        }
    }

    Ok(())
}
