//! GPU runtime: device selection, context hints, timing, and the OpenCL
//! context itself (feature `opencl`).

pub mod device;
pub mod hint;
pub mod timer;

#[cfg(feature = "opencl")]
pub mod global;
#[cfg(feature = "opencl")]
pub mod opencl;

pub use device::{DeviceProbe, GpuVendor, SelectedDevice, select_gpu};
pub use hint::{PerfHint, PriorityHint, context_properties};
pub use timer::{CallStats, ProfilingEvent, ProfilingTimer, QueueSync, Timer};

#[cfg(feature = "opencl")]
pub use opencl::OpenCLRuntime;
