//! Program operations against the OpenCL driver.

use opencl3::context::Context;
use opencl3::device::{CL_DEVICE_TYPE_GPU, Device};
use opencl3::kernel::Kernel;
use opencl3::program::Program;

use super::cl_err;
use crate::error::{DriverCode, Result, RuntimeError};
use crate::program::ProgramBackend;
use crate::runtime::device::DeviceProbe;

const CL_INVALID_PROGRAM_EXECUTABLE: DriverCode = -45;

/// Built OpenCL program shared through the program cache.
pub struct ClProgram(Program);

impl ClProgram {
    pub fn inner(&self) -> &Program {
        &self.0
    }
}

// OpenCL program objects are thread-safe once built
unsafe impl Send for ClProgram {}
unsafe impl Sync for ClProgram {}

/// Context and device that programs are created for and built against.
pub struct ClProgramBackend {
    pub(crate) context: Context,
    pub(crate) device: Device,
}

impl ClProgramBackend {
    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn device(&self) -> &Device {
        &self.device
    }
}

impl ProgramBackend for ClProgramBackend {
    type Program = ClProgram;
    type Kernel = Kernel;

    fn program_from_source(&self, source: &str) -> Result<ClProgram> {
        let program = Program::create_from_source(&self.context, source)
            .map_err(cl_err("Create program from source"))?;
        Ok(ClProgram(program))
    }

    fn program_from_binary(&self, binary: &[u8]) -> Result<ClProgram> {
        // SAFETY: the driver validates the binary against the device and
        // reports CL_INVALID_BINARY on mismatch.
        let program = unsafe {
            Program::create_from_binary(&self.context, &[self.device.id()], &[binary])
        }
        .map_err(cl_err("Create program from binary"))?;
        Ok(ClProgram(program))
    }

    fn build_program(
        &self,
        program: &mut ClProgram,
        options: &str,
    ) -> std::result::Result<(), DriverCode> {
        program
            .0
            .build(&[self.device.id()], options)
            .map_err(|e| e.0)
    }

    fn build_log(&self, program: &ClProgram) -> Option<String> {
        program
            .0
            .get_build_log(self.device.id())
            .ok()
            .filter(|log| !log.trim().is_empty())
    }

    fn program_binary(&self, program: &ClProgram) -> Result<Vec<u8>> {
        let binaries = program
            .0
            .get_binaries()
            .map_err(cl_err("Query program binaries"))?;
        // Built for exactly one device.
        binaries
            .into_iter()
            .next()
            .ok_or_else(|| {
                RuntimeError::driver("Query program binaries", CL_INVALID_PROGRAM_EXECUTABLE)
            })
    }

    fn create_kernel(
        &self,
        program: &ClProgram,
        kernel_name: &str,
    ) -> std::result::Result<Kernel, DriverCode> {
        Kernel::create(&program.0, kernel_name).map_err(|e| e.0)
    }
}

impl DeviceProbe for Device {
    fn is_gpu(&self) -> Result<bool> {
        let device_type = self.dev_type().map_err(cl_err("Query device type"))?;
        Ok(device_type & CL_DEVICE_TYPE_GPU != 0)
    }

    fn name(&self) -> Result<String> {
        Device::name(self).map_err(cl_err("Query device name"))
    }

    fn version(&self) -> Result<String> {
        Device::version(self).map_err(cl_err("Query device version"))
    }

    fn max_work_group_size(&self) -> Result<usize> {
        Device::max_work_group_size(self).map_err(cl_err("Query device max work group size"))
    }
}
