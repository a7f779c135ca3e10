//! Error types for the OpenCL runtime and program cache.

use std::path::PathBuf;

use crate::program::ProgramOrigin;

/// Driver status code returned by a failing OpenCL call.
pub type DriverCode = i32;

/// `CL_INVALID_PROGRAM`
pub const CL_INVALID_PROGRAM: DriverCode = -44;
/// `CL_INVALID_KERNEL_NAME`
pub const CL_INVALID_KERNEL_NAME: DriverCode = -46;

/// Coarse classification of a [`RuntimeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No usable platform, device, or GPU.
    Environment,
    /// A driver call failed.
    Driver,
    /// Reading or writing a kernel binary failed.
    Persistence,
    /// The caller asked for something that does not exist.
    Usage,
    /// Invalid or late configuration.
    Config,
}

/// Errors raised while setting up the GPU context or building kernels.
///
/// None of these are retried internally. Inference cannot proceed past any
/// of them, so callers usually abort; embedding code may propagate instead.
#[derive(thiserror::Error, Debug)]
pub enum RuntimeError {
    #[error("No OpenCL platforms found")]
    NoPlatform,

    #[error("No OpenCL devices found")]
    NoDevice,

    #[error("No GPU device found")]
    NoGpu,

    /// A driver call failed outside of program building.
    #[error("{stage} failed, error code: {code}")]
    Driver {
        stage: &'static str,
        code: DriverCode,
    },

    /// The resolver had neither a usable binary nor source for a family.
    #[error("Program not found for {origin}: {identity}")]
    ProgramNotFound {
        origin: ProgramOrigin,
        identity: String,
    },

    /// Building a program failed. The driver build log has already been logged.
    #[error("Build program from {origin}: {identity} failed: {}", describe_build_failure(.code))]
    BuildFailed {
        origin: ProgramOrigin,
        identity: String,
        code: DriverCode,
    },

    #[error("Kernel `{kernel}` not found in program {identity}")]
    KernelNotFound { kernel: String, identity: String },

    #[error("Failed to write kernel binary {}: {source}", .path.display())]
    PersistFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("OpenCL runtime is already initialized")]
    AlreadyInitialized,
}

impl RuntimeError {
    /// Builds a [`RuntimeError::Driver`] for the given stage.
    pub fn driver(stage: &'static str, code: DriverCode) -> Self {
        RuntimeError::Driver { stage, code }
    }

    /// Returns the error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RuntimeError::NoPlatform | RuntimeError::NoDevice | RuntimeError::NoGpu => {
                ErrorKind::Environment
            }
            RuntimeError::Driver { .. }
            | RuntimeError::ProgramNotFound { .. }
            | RuntimeError::BuildFailed { .. } => ErrorKind::Driver,
            RuntimeError::PersistFailed { .. } | RuntimeError::ReadFailed { .. } => {
                ErrorKind::Persistence
            }
            RuntimeError::KernelNotFound { .. } => ErrorKind::Usage,
            RuntimeError::Config(_) | RuntimeError::AlreadyInitialized => ErrorKind::Config,
        }
    }

    /// Driver status code, when the error carries one.
    pub fn driver_code(&self) -> Option<DriverCode> {
        match self {
            RuntimeError::Driver { code, .. } | RuntimeError::BuildFailed { code, .. } => {
                Some(*code)
            }
            _ => None,
        }
    }
}

fn describe_build_failure(code: &DriverCode) -> String {
    if *code == CL_INVALID_PROGRAM {
        "CL_INVALID_PROGRAM, possible cause 1: the kernel binary was built for a \
         different SoC, possible cause 2: the program buffer is corrupted, make sure \
         there is no out-of-range memory writing"
            .to_string()
    } else {
        format!("error code {}", code)
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
