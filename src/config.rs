//! Runtime configuration.
//!
//! Values are fixed before the runtime is created and never change after.
//!
//! Environment variables read by [`RuntimeConfig::from_env`]:
//! - `HARP_GPU_PERF_HINT`, `HARP_GPU_PRIORITY_HINT`: `default|low|normal|high`
//! - `HARP_OPENCL_PROFILING=1`: enable queue profiling
//! - `HARP_KERNEL_PATH`: directory for stored kernel binaries
//! - `HARP_NO_KERNEL_BINARY_CACHE`: do not write kernel binaries

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::{Result, RuntimeError};
use crate::runtime::hint::{PerfHint, PriorityHint};

pub const ENV_PERF_HINT: &str = "HARP_GPU_PERF_HINT";
pub const ENV_PRIORITY_HINT: &str = "HARP_GPU_PRIORITY_HINT";
pub const ENV_PROFILING: &str = "HARP_OPENCL_PROFILING";
pub const ENV_KERNEL_PATH: &str = "HARP_KERNEL_PATH";
pub const ENV_NO_BINARY_CACHE: &str = "HARP_NO_KERNEL_BINARY_CACHE";

/// OpenCL runtime settings
///
/// # Example
///
/// ```
/// use harp_clrt::config::RuntimeConfig;
/// use harp_clrt::runtime::hint::PerfHint;
///
/// let config = RuntimeConfig::builder()
///     .perf_hint(PerfHint::High)
///     .kernel_path("/data/local/tmp/kernels")
///     .build();
/// assert!(!config.profiling);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    #[builder(default)]
    pub perf_hint: PerfHint,
    #[builder(default)]
    pub priority_hint: PriorityHint,
    /// Create the command queue with profiling enabled
    #[builder(default)]
    pub profiling: bool,
    /// Directory for kernel binaries; empty means the working directory.
    #[builder(default, setter(into))]
    pub kernel_path: PathBuf,
    #[builder(default = true)]
    pub persist_binaries: bool,
    /// Hash binary file names instead of using the sanitized identity
    #[builder(default = true)]
    pub obfuscate_binary_names: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RuntimeConfig {
    /// Reads the configuration from `HARP_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_PERF_HINT) {
            config.perf_hint = value.parse()?;
        }
        if let Some(value) = lookup(ENV_PRIORITY_HINT) {
            config.priority_hint = value.parse()?;
        }
        // Only an exact "1" turns profiling on.
        config.profiling = lookup(ENV_PROFILING).as_deref() == Some("1");
        if let Some(path) = lookup(ENV_KERNEL_PATH) {
            config.kernel_path = PathBuf::from(path);
        }
        if lookup(ENV_NO_BINARY_CACHE).is_some() {
            config.persist_binaries = false;
        }

        Ok(config)
    }

    /// Loads a JSON configuration file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RuntimeError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text)
            .map_err(|e| RuntimeError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Points `kernel_path` at the per-user cache directory.
    pub fn with_user_cache_dir(mut self) -> Result<Self> {
        let dirs = directories::ProjectDirs::from("", "", "harp").ok_or_else(|| {
            RuntimeError::Config("no home directory to place the kernel cache in".to_string())
        })?;
        self.kernel_path = dirs.cache_dir().join("opencl");
        Ok(self)
    }
}
