//! Harp OpenCL runtime
//!
//! GPU runtime layer for running inference kernels on mobile OpenCL devices.
//!
//! # Architecture
//!
//! - **runtime**: device selection, vendor context hints, profiling timer,
//!   and the OpenCL context/queue (feature: `opencl`)
//! - **program**: build identities, the per-identity program cache, and
//!   on-disk kernel binary storage
//! - **config**: runtime settings from the builder, environment, or JSON
//! - **tuner**: autotuner status that forces queue profiling
//!
//! # Feature Flags
//!
//! - `opencl`: link against the OpenCL driver and enable [`runtime::opencl`]

// ============================================================================
// Core Modules
// ============================================================================

pub mod config;
pub mod error;
pub mod program;
pub mod runtime;
pub mod tuner;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::RuntimeConfig;
pub use error::{ErrorKind, Result, RuntimeError};
pub use program::{
    BuildIdentity, CacheStats, KernelLibrary, OriginCounts, ProgramBackend, ProgramManager,
    ProgramResolver,
};
pub use runtime::{GpuVendor, PerfHint, PriorityHint, Timer};

#[cfg(feature = "opencl")]
pub use runtime::OpenCLRuntime;

// ============================================================================
// Prelude
// ============================================================================

/// Prelude module with commonly used types and traits
pub mod prelude {
    pub use crate::config::RuntimeConfig;
    pub use crate::error::{Result, RuntimeError};
    pub use crate::program::{BuildIdentity, KernelLibrary, ProgramBackend};
    pub use crate::runtime::{PerfHint, PriorityHint, Timer};

    #[cfg(feature = "opencl")]
    pub use crate::runtime::{OpenCLRuntime, global};
}
