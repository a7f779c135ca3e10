//! OpenCL runtime context.

use std::path::Path;
use std::ptr;

use cl3::info_type::InfoType;
use opencl3::command_queue::{CL_QUEUE_PROFILING_ENABLE, CommandQueue};
use opencl3::context::Context;
use opencl3::device::{CL_DEVICE_TYPE_ALL, Device};
use opencl3::event::Event;
use opencl3::kernel::Kernel;
use opencl3::platform::get_platforms;

use super::backend::ClProgramBackend;
use super::{CL_KERNEL_WAVE_SIZE_QCOM, cl_err};
use crate::config::RuntimeConfig;
use crate::error::{Result, RuntimeError};
use crate::program::{
    BinaryPersister, CacheStats, KernelLibrary, OriginCounts, ProgramManager, ProgramResolver,
};
use crate::runtime::device::{GpuVendor, SelectedDevice, select_gpu};
use crate::runtime::hint::{context_properties, supports_context_hints};
use crate::runtime::timer::{CallStats, ProfilingEvent, ProfilingTimer, QueueSync};
use crate::tuner::{TuningSession, profiling_required};

const CL_PLATFORM_NOT_FOUND_KHR: i32 = -1001;
const CL_DEVICE_NOT_FOUND: i32 = -1;
const CL_INVALID_VALUE: i32 = -30;

/// GPU context, command queue, and program cache for one selected device.
///
/// Fields drop in declaration order: cached programs first, then the queue,
/// then the context and device. Objects created later may reference the
/// ones created before them, so this order must not change.
pub struct OpenCLRuntime {
    programs: ProgramManager<ClProgramBackend>,
    queue: CommandQueue,
    backend: ClProgramBackend,
    selected: SelectedDevice,
    profiling: bool,
    config: RuntimeConfig,
}

impl OpenCLRuntime {
    /// Selects the first GPU of the first platform and sets up a context and
    /// queue for it.
    pub fn new(
        config: RuntimeConfig,
        tuner: &dyn TuningSession,
        resolver: Box<dyn ProgramResolver<ClProgramBackend>>,
    ) -> Result<Self> {
        let platforms = get_platforms().map_err(|e| match e.0 {
            CL_PLATFORM_NOT_FOUND_KHR => RuntimeError::NoPlatform,
            code => RuntimeError::driver("Get platforms", code),
        })?;
        let platform = platforms.first().ok_or(RuntimeError::NoPlatform)?;
        log::debug!(
            "Using platform: {}, {}, {}",
            platform.name().unwrap_or_default(),
            platform.profile().unwrap_or_default(),
            platform.version().unwrap_or_default()
        );

        let device_ids = platform
            .get_devices(CL_DEVICE_TYPE_ALL)
            .map_err(|e| match e.0 {
                CL_DEVICE_NOT_FOUND => RuntimeError::NoDevice,
                code => RuntimeError::driver("Get devices", code),
            })?;
        let devices: Vec<Device> = device_ids.iter().copied().map(Device::new).collect();
        let selected = select_gpu(&devices)?;
        let device = Device::new(device_ids[selected.index]);

        let context = if supports_context_hints(selected.vendor) {
            let properties =
                context_properties(selected.vendor, config.perf_hint, config.priority_hint);
            Context::from_devices(&[device.id()], &properties, None, ptr::null_mut())
        } else {
            Context::from_devices(&[device.id()], &[], None, ptr::null_mut())
        }
        .map_err(cl_err("Create context"))?;

        let profiling = profiling_required(tuner, config.profiling);
        let queue_properties = if profiling {
            CL_QUEUE_PROFILING_ENABLE
        } else {
            0
        };
        #[allow(deprecated)]
        let queue = CommandQueue::create_default(&context, queue_properties)
            .map_err(cl_err("Create command queue"))?;

        let persister = BinaryPersister::new(config.kernel_path.clone())
            .with_obfuscation(config.obfuscate_binary_names)
            .with_enabled(config.persist_binaries);

        Ok(Self {
            programs: ProgramManager::new(persister, resolver),
            queue,
            backend: ClProgramBackend { context, device },
            selected,
            profiling,
            config,
        })
    }

    /// Runtime resolving programs through `library`.
    pub fn with_library(
        config: RuntimeConfig,
        tuner: &dyn TuningSession,
        library: KernelLibrary,
    ) -> Result<Self> {
        Self::new(config, tuner, Box::new(library))
    }

    pub fn context(&self) -> &Context {
        self.backend.context()
    }

    pub fn device(&self) -> &Device {
        self.backend.device()
    }

    pub fn command_queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub fn selected_device(&self) -> &SelectedDevice {
        &self.selected
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Directory kernel binaries are written to.
    pub fn kernel_path(&self) -> &Path {
        self.programs.persister().root()
    }

    pub fn is_profiling_enabled(&self) -> bool {
        self.profiling
    }

    /// Returns kernel `kernel_name` of program `family` built with `build_options`.
    pub fn build_kernel<I, S>(
        &self,
        family: &str,
        kernel_name: &str,
        build_options: I,
    ) -> Result<Kernel>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.programs
            .build_kernel(&self.backend, family, kernel_name, build_options)
    }

    pub fn program_cache_stats(&self) -> CacheStats {
        self.programs.stats()
    }

    /// How many cached programs were loaded from stored binaries vs compiled.
    pub fn program_origin_counts(&self) -> OriginCounts {
        self.programs.origin_counts()
    }

    /// Start/end timestamps of a finished command. Needs a profiling queue.
    pub fn call_stats(&self, event: &Event) -> Result<CallStats> {
        CallStats::from_event(event)
    }

    /// Timer on this runtime's queue, starting with `event`. Later runs
    /// pass their events through [`ProfilingTimer::set_event`].
    pub fn profiling_timer(&self, event: Event) -> ProfilingTimer<'_, CommandQueue, Event> {
        ProfilingTimer::new(&self.queue, event)
    }

    pub fn device_max_work_group_size(&self) -> usize {
        self.selected.max_work_group_size
    }

    pub fn kernel_max_work_group_size(&self, kernel: &Kernel) -> Result<usize> {
        kernel
            .get_work_group_size(self.device().id())
            .map_err(cl_err("Query kernel work group size"))
    }

    /// Adreno wave size of `kernel`. Other vendors reject the query.
    pub fn kernel_wave_size(&self, kernel: &Kernel) -> Result<usize> {
        let info = cl3::kernel::get_kernel_work_group_info(
            kernel.get(),
            self.device().id(),
            CL_KERNEL_WAVE_SIZE_QCOM,
        )
        .map_err(|code| RuntimeError::driver("Query kernel wave size", code))?;

        match info {
            InfoType::Size(size) => Ok(size),
            InfoType::VecUchar(bytes) => {
                let mut raw = [0u8; size_of::<usize>()];
                let n = bytes.len().min(raw.len());
                raw[..n].copy_from_slice(&bytes[..n]);
                Ok(usize::from_ne_bytes(raw))
            }
            _ => Err(RuntimeError::driver("Query kernel wave size", CL_INVALID_VALUE)),
        }
    }

    pub fn vendor(&self) -> GpuVendor {
        self.selected.vendor
    }

    /// `<major>.<minor>` OpenCL version of the device, or `"unknown"`.
    pub fn api_version(&self) -> &str {
        &self.selected.api_version
    }

    /// Releases cached programs, the queue, the context, and the device, in
    /// that order.
    pub fn shutdown(self) {
        let Self {
            programs,
            queue,
            backend,
            selected,
            ..
        } = self;

        programs.clear();
        drop(programs);
        drop(queue);
        // Root devices hold no driver reference, only the context needs releasing.
        let ClProgramBackend { context, .. } = backend;
        drop(context);
        log::debug!("OpenCL runtime for {} shut down", selected.name);
    }
}

impl ProfilingEvent for Event {
    fn command_start(&self) -> Result<u64> {
        self.profiling_command_start()
            .map_err(cl_err("Query profiling command start"))
    }

    fn command_end(&self) -> Result<u64> {
        self.profiling_command_end()
            .map_err(cl_err("Query profiling command end"))
    }
}

impl QueueSync for CommandQueue {
    fn finish(&self) -> Result<()> {
        CommandQueue::finish(self).map_err(cl_err("Finish command queue"))
    }
}

// OpenCL handles thread safety internally
unsafe impl Send for OpenCLRuntime {}
unsafe impl Sync for OpenCLRuntime {}
