//! OpenCL implementation on top of `opencl3`.

mod backend;
mod context;

pub use backend::{ClProgram, ClProgramBackend};
pub use context::OpenCLRuntime;

use opencl3::error_codes::ClError;

use crate::error::RuntimeError;

/// `CL_KERNEL_WAVE_SIZE_QCOM` (`clGetKernelWorkGroupInfo`, Adreno only)
pub const CL_KERNEL_WAVE_SIZE_QCOM: u32 = 0xAA02;

pub(crate) fn cl_err(stage: &'static str) -> impl Fn(ClError) -> RuntimeError {
    move |e| RuntimeError::driver(stage, e.0)
}
