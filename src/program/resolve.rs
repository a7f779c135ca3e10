//! Source-or-binary program resolution.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;

use super::ProgramBackend;
use super::persist::BinaryPersister;
use crate::error::{Result, RuntimeError};

/// Where a resolved program came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgramOrigin {
    Source,
    Binary,
}

impl fmt::Display for ProgramOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgramOrigin::Source => write!(f, "source"),
            ProgramOrigin::Binary => write!(f, "binary"),
        }
    }
}

/// An unbuilt program plus the path it was created from.
pub struct ResolvedProgram<P> {
    pub program: P,
    pub origin: ProgramOrigin,
}

/// Decides whether a family is loaded from a stored binary or compiled from source.
pub trait ProgramResolver<B: ProgramBackend>: Send + Sync {
    fn resolve(
        &self,
        backend: &B,
        family: &str,
        binary_prefix: &str,
    ) -> Result<ResolvedProgram<B::Program>>;
}

/// Kernel sources keyed by family, plus the directory of stored binaries.
///
/// A stored binary that exists and is accepted by the driver wins. A binary
/// the driver rejects is skipped with a warning and the source is used.
#[derive(Clone)]
pub struct KernelLibrary {
    sources: FxHashMap<String, String>,
    binaries: BinaryPersister,
}

impl KernelLibrary {
    /// Creates an empty library reading binaries from `binary_root`.
    pub fn new(binary_root: impl Into<PathBuf>) -> Self {
        Self {
            sources: FxHashMap::default(),
            binaries: BinaryPersister::new(binary_root),
        }
    }

    /// Adds every `*.cl` file in `dir`, keyed by file stem.
    pub fn load_dir(mut self, dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let read_err = |source| RuntimeError::ReadFailed {
            path: dir.to_path_buf(),
            source,
        };

        for entry in fs::read_dir(dir).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("cl") {
                continue;
            }
            let Some(family) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let source = fs::read_to_string(&path).map_err(|source| RuntimeError::ReadFailed {
                path: path.clone(),
                source,
            })?;
            log::debug!("Loaded kernel source {} ({} bytes)", family, source.len());
            self.sources.insert(family.to_string(), source);
        }

        Ok(self)
    }

    pub fn with_source(mut self, family: &str, source: impl Into<String>) -> Self {
        self.register(family, source);
        self
    }

    pub fn register(&mut self, family: &str, source: impl Into<String>) {
        self.sources.insert(family.to_string(), source.into());
    }

    pub fn source(&self, family: &str) -> Option<&str> {
        self.sources.get(family).map(String::as_str)
    }

    pub fn binary_root(&self) -> &Path {
        self.binaries.root()
    }
}

impl<B: ProgramBackend> ProgramResolver<B> for KernelLibrary {
    fn resolve(
        &self,
        backend: &B,
        family: &str,
        binary_prefix: &str,
    ) -> Result<ResolvedProgram<B::Program>> {
        match self.binaries.load(binary_prefix) {
            Ok(Some(binary)) => match backend.program_from_binary(&binary) {
                Ok(program) => {
                    log::debug!("Using kernel binary {} for {}", binary_prefix, family);
                    return Ok(ResolvedProgram {
                        program,
                        origin: ProgramOrigin::Binary,
                    });
                }
                Err(e) => log::warn!(
                    "Kernel binary {} rejected ({}), compiling {} from source",
                    binary_prefix,
                    e,
                    family
                ),
            },
            Ok(None) => {}
            Err(e) => log::warn!("{}, compiling {} from source", e, family),
        }

        let source = self
            .sources
            .get(family)
            .ok_or_else(|| RuntimeError::ProgramNotFound {
                origin: ProgramOrigin::Source,
                identity: family.to_string(),
            })?;
        Ok(ResolvedProgram {
            program: backend.program_from_source(source)?,
            origin: ProgramOrigin::Source,
        })
    }
}
