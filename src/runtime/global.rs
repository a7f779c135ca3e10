//! Process-wide OpenCL runtime.
//!
//! The runtime is created lazily by the first call to [`runtime`] and lives
//! until the process exits. Configuration and the kernel library must be set
//! before that first call.
//!
//! # Example
//! ```ignore
//! use harp_clrt::runtime::global;
//! use harp_clrt::runtime::hint::{PerfHint, PriorityHint};
//!
//! global::configure_hints(PerfHint::High, PriorityHint::Low)?;
//! let runtime = global::runtime()?;
//! let kernel = runtime.build_kernel("conv2d", "conv2d_3x3", ["-DFOO=1"])?;
//! ```

use std::sync::{Mutex, OnceLock, PoisonError};

use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::program::KernelLibrary;
use crate::runtime::hint::{PerfHint, PriorityHint};
use crate::runtime::opencl::OpenCLRuntime;
use crate::tuner::EnvTuning;

static CONFIG: Mutex<Option<RuntimeConfig>> = Mutex::new(None);
static LIBRARY: Mutex<Option<KernelLibrary>> = Mutex::new(None);
static INIT: Mutex<()> = Mutex::new(());
static RUNTIME: OnceLock<OpenCLRuntime> = OnceLock::new();

/// Sets the configuration used when the runtime is created.
///
/// Without a call the configuration is read from the environment.
pub fn configure(config: RuntimeConfig) -> Result<()> {
    let _init = INIT.lock().unwrap_or_else(PoisonError::into_inner);
    if RUNTIME.get().is_some() {
        return Err(RuntimeError::AlreadyInitialized);
    }
    *CONFIG.lock().unwrap_or_else(PoisonError::into_inner) = Some(config);
    Ok(())
}

/// Sets only the vendor hints, keeping the rest of the configuration.
pub fn configure_hints(perf: PerfHint, priority: PriorityHint) -> Result<()> {
    let _init = INIT.lock().unwrap_or_else(PoisonError::into_inner);
    if RUNTIME.get().is_some() {
        return Err(RuntimeError::AlreadyInitialized);
    }
    let mut config = CONFIG.lock().unwrap_or_else(PoisonError::into_inner);
    let config = match config.as_mut() {
        Some(config) => config,
        None => config.insert(RuntimeConfig::from_env()?),
    };
    config.perf_hint = perf;
    config.priority_hint = priority;
    Ok(())
}

/// Sets the kernel sources the runtime resolves programs from.
///
/// Without a call every `*.cl` file in the kernel path is used.
pub fn set_kernel_library(library: KernelLibrary) -> Result<()> {
    let _init = INIT.lock().unwrap_or_else(PoisonError::into_inner);
    if RUNTIME.get().is_some() {
        return Err(RuntimeError::AlreadyInitialized);
    }
    *LIBRARY.lock().unwrap_or_else(PoisonError::into_inner) = Some(library);
    Ok(())
}

/// Returns the process-wide runtime, creating it on first use.
///
/// A failed creation is returned to the caller and retried on the next call.
pub fn runtime() -> Result<&'static OpenCLRuntime> {
    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime);
    }

    let _init = INIT.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(runtime) = RUNTIME.get() {
        return Ok(runtime);
    }

    let config = match CONFIG.lock().unwrap_or_else(PoisonError::into_inner).clone() {
        Some(config) => config,
        None => RuntimeConfig::from_env()?,
    };
    let library = match LIBRARY.lock().unwrap_or_else(PoisonError::into_inner).clone() {
        Some(library) => library,
        None => default_library(&config)?,
    };

    let runtime = OpenCLRuntime::with_library(config, &EnvTuning, library).inspect_err(|e| {
        log::error!("Failed to create OpenCL runtime: {}", e);
    })?;
    log::info!(
        "OpenCL runtime ready on {} (OpenCL {})",
        runtime.selected_device().name,
        runtime.api_version()
    );
    Ok(RUNTIME.get_or_init(|| runtime))
}

pub fn is_initialized() -> bool {
    RUNTIME.get().is_some()
}

fn default_library(config: &RuntimeConfig) -> Result<KernelLibrary> {
    let library = KernelLibrary::new(config.kernel_path.clone());
    let dir = if config.kernel_path.as_os_str().is_empty() {
        std::path::Path::new(".")
    } else {
        config.kernel_path.as_path()
    };
    if dir.is_dir() {
        library.load_dir(dir)
    } else {
        Ok(library)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_after_init_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = RuntimeConfig::builder().kernel_path(dir.path()).build();
        configure(config.clone()).unwrap();
        set_kernel_library(KernelLibrary::new(dir.path())).unwrap();

        let Ok(runtime) = runtime() else {
            println!("No OpenCL GPU device available, skipping test");
            return;
        };
        assert!(is_initialized());
        assert!(std::ptr::eq(runtime, super::runtime().unwrap()));

        let err = configure(config).unwrap_err();
        assert!(matches!(err, RuntimeError::AlreadyInitialized));
        assert!(configure_hints(PerfHint::High, PriorityHint::High).is_err());
    }
}
