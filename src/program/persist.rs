//! On-disk kernel binaries.
//!
//! One file per build identity, `<root>/<prefix>.bin`, holding the raw
//! device binary with no header. The binary is trusted as-is on load; a
//! stale file is the caller's problem.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use super::identity::BuildIdentity;
use crate::error::{Result, RuntimeError};

pub const BINARY_EXTENSION: &str = "bin";

/// Replaces spaces, `-` and `=` with `_`. Nothing else is touched.
pub fn sanitize_identity(identity: &str) -> String {
    identity
        .chars()
        .map(|c| match c {
            ' ' | '-' | '=' => '_',
            other => other,
        })
        .collect()
}

/// Stable, opaque name for a symbol: first 16 bytes of its SHA-256 in hex.
pub fn obfuscate_symbol(symbol: &str) -> String {
    let digest = Sha256::digest(symbol.as_bytes());
    digest[..16].iter().map(|b| format!("{:02x}", b)).collect()
}

/// Writes freshly compiled program binaries next to each other under one root.
#[derive(Debug, Clone)]
pub struct BinaryPersister {
    root: PathBuf,
    obfuscate: bool,
    enabled: bool,
}

impl BinaryPersister {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            obfuscate: true,
            enabled: true,
        }
    }

    /// Keep sanitized identities readable instead of hashing them.
    pub fn with_obfuscation(mut self, obfuscate: bool) -> Self {
        self.obfuscate = obfuscate;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// File name stem for `identity`.
    pub fn filename_prefix(&self, identity: &BuildIdentity) -> String {
        let sanitized = sanitize_identity(&identity.key());
        if self.obfuscate {
            obfuscate_symbol(&sanitized)
        } else {
            sanitized
        }
    }

    pub fn binary_path(&self, prefix: &str) -> PathBuf {
        self.root.join(format!("{}.{}", prefix, BINARY_EXTENSION))
    }

    /// Writes `binary` for `prefix`, replacing any existing file.
    ///
    /// The bytes go to a temporary file in the same directory which is then
    /// renamed over the target, so readers never see a partial file.
    /// Returns `None` when persistence is disabled.
    pub fn persist(&self, prefix: &str, binary: &[u8]) -> Result<Option<PathBuf>> {
        if !self.enabled {
            return Ok(None);
        }

        let path = self.binary_path(prefix);
        let dir = if self.root.as_os_str().is_empty() {
            Path::new(".")
        } else {
            self.root.as_path()
        };
        let fail = |source| RuntimeError::PersistFailed {
            path: path.clone(),
            source,
        };

        fs::create_dir_all(dir).map_err(fail)?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(fail)?;
        tmp.write_all(binary).map_err(fail)?;
        tmp.as_file().sync_all().map_err(fail)?;
        tmp.persist(&path).map_err(|e| fail(e.error))?;

        log::debug!(
            "Kernel binary saved: {} ({} bytes)",
            path.display(),
            binary.len()
        );
        Ok(Some(path))
    }

    /// Reads the binary stored for `prefix`, if any.
    pub fn load(&self, prefix: &str) -> Result<Option<Vec<u8>>> {
        let path = self.binary_path(prefix);
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(RuntimeError::ReadFailed { path, source }),
        }
    }
}
