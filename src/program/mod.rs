//! Kernel program building and caching.
//!
//! A kernel request names a program family, a kernel inside it, and a set
//! of build options. The family and options form a [`BuildIdentity`]; each
//! identity is resolved (stored binary or source), built once, and cached
//! for the life of the [`ProgramManager`]. Programs compiled from source are
//! written back to disk so the next process can load the binary instead.

mod cache;
mod identity;
mod persist;
mod resolve;

pub use cache::{CacheStats, ProgramCache};
pub use identity::{BuildIdentity, canonicalize_options};
pub use persist::{BINARY_EXTENSION, BinaryPersister, obfuscate_symbol, sanitize_identity};
pub use resolve::{KernelLibrary, ProgramOrigin, ProgramResolver, ResolvedProgram};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{CL_INVALID_KERNEL_NAME, DriverCode, Result, RuntimeError};

/// Flags appended to every build: `-Werror`, fused multiply-add, and fast
/// relaxed math.
pub const MANDATORY_BUILD_FLAGS: &str = " -Werror -cl-mad-enable -cl-fast-relaxed-math";

/// Driver operations on program objects.
pub trait ProgramBackend {
    type Program: Send + Sync;
    type Kernel;

    fn program_from_source(&self, source: &str) -> Result<Self::Program>;

    fn program_from_binary(&self, binary: &[u8]) -> Result<Self::Program>;

    /// Builds for the selected device. `Err` holds the driver status code.
    fn build_program(
        &self,
        program: &mut Self::Program,
        options: &str,
    ) -> std::result::Result<(), DriverCode>;

    /// Build log of the last failed build, if the driver has one.
    fn build_log(&self, program: &Self::Program) -> Option<String>;

    /// Device binary of a built program (single device).
    fn program_binary(&self, program: &Self::Program) -> Result<Vec<u8>>;

    fn create_kernel(
        &self,
        program: &Self::Program,
        kernel_name: &str,
    ) -> std::result::Result<Self::Kernel, DriverCode>;
}

/// Successful builds by where the program came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OriginCounts {
    pub source: usize,
    pub binary: usize,
}

/// Resolves, builds, caches and persists programs for one backend.
pub struct ProgramManager<B: ProgramBackend> {
    cache: ProgramCache<B::Program>,
    persister: BinaryPersister,
    resolver: Box<dyn ProgramResolver<B>>,
    from_source: AtomicUsize,
    from_binary: AtomicUsize,
}

impl<B: ProgramBackend> ProgramManager<B> {
    pub fn new(persister: BinaryPersister, resolver: Box<dyn ProgramResolver<B>>) -> Self {
        Self {
            cache: ProgramCache::new(),
            persister,
            resolver,
            from_source: AtomicUsize::new(0),
            from_binary: AtomicUsize::new(0),
        }
    }

    /// Returns kernel `kernel_name` from the program built for `family` and
    /// `build_options`, building the program on first use.
    pub fn build_kernel<I, S>(
        &self,
        backend: &B,
        family: &str,
        kernel_name: &str,
        build_options: I,
    ) -> Result<B::Kernel>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let identity = BuildIdentity::new(family, build_options);
        let program = self.program(backend, &identity)?;

        backend
            .create_kernel(&program, kernel_name)
            .map_err(|code| {
                if code == CL_INVALID_KERNEL_NAME {
                    RuntimeError::KernelNotFound {
                        kernel: kernel_name.to_string(),
                        identity: identity.key(),
                    }
                } else {
                    RuntimeError::driver("Create kernel", code)
                }
            })
    }

    /// Returns the cached program for `identity`, building it on a miss.
    pub fn program(&self, backend: &B, identity: &BuildIdentity) -> Result<Arc<B::Program>> {
        self.cache
            .get_or_build(identity, || self.build_program(backend, identity))
    }

    fn build_program(&self, backend: &B, identity: &BuildIdentity) -> Result<B::Program> {
        let prefix = self.persister.filename_prefix(identity);
        let ResolvedProgram {
            mut program,
            origin,
        } = self.resolver.resolve(backend, identity.family(), &prefix)?;

        let options = format!("{}{}", identity.options(), MANDATORY_BUILD_FLAGS);
        if let Err(code) = backend.build_program(&mut program, &options) {
            if let Some(build_log) = backend.build_log(&program) {
                log::info!("Program build log: {}", build_log);
            }
            let err = RuntimeError::BuildFailed {
                origin,
                identity: identity.key(),
                code,
            };
            log::error!("{}", err);
            return Err(err);
        }

        match origin {
            ProgramOrigin::Source => {
                let binary = backend.program_binary(&program)?;
                self.persister.persist(&prefix, &binary)?;
                self.from_source.fetch_add(1, Ordering::Relaxed);
            }
            ProgramOrigin::Binary => {
                self.from_binary.fetch_add(1, Ordering::Relaxed);
            }
        }

        Ok(program)
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn origin_counts(&self) -> OriginCounts {
        OriginCounts {
            source: self.from_source.load(Ordering::Relaxed),
            binary: self.from_binary.load(Ordering::Relaxed),
        }
    }

    pub fn persister(&self) -> &BinaryPersister {
        &self.persister
    }

    /// Releases every cached program.
    pub fn clear(&self) {
        self.cache.clear();
    }
}
