//! Common test utilities: an in-memory program backend with call counters

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use harp_clrt::error::{DriverCode, Result, RuntimeError};
use harp_clrt::program::ProgramBackend;

pub const CL_BUILD_PROGRAM_FAILURE: DriverCode = -11;
pub const CL_INVALID_BINARY: DriverCode = -42;
pub const CL_INVALID_KERNEL_NAME: DriverCode = -46;

const BINARY_MAGIC: &[u8] = b"FAKEBIN\0";

pub const CONV2D_SOURCE: &str = r#"
__kernel void conv2d_3x3(__global const float* input, __global float* output) {
    output[get_global_id(0)] = FOO * input[get_global_id(0)] + BAR;
}

__kernel void conv2d_1x1(__global const float* input, __global float* output) {
    output[get_global_id(0)] = input[get_global_id(0)];
}
"#;

pub const BROKEN_SOURCE: &str = r#"
#error this kernel does not compile
__kernel void broken(__global float* x) {}
"#;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug)]
pub struct FakeProgram {
    pub source: String,
    pub from_binary: bool,
    pub build_options: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeKernel {
    pub name: String,
    pub build_options: String,
}

/// Compiles nothing; tracks what the program layer asked of it.
#[derive(Default)]
pub struct FakeBackend {
    pub source_compiles: AtomicUsize,
    pub binary_loads: AtomicUsize,
    pub builds: AtomicUsize,
    pub binaries_read: AtomicUsize,
    pub fail_builds: AtomicBool,
    pub build_options_seen: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn source_compiles(&self) -> usize {
        self.source_compiles.load(Ordering::SeqCst)
    }

    pub fn binary_loads(&self) -> usize {
        self.binary_loads.load(Ordering::SeqCst)
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn set_fail_builds(&self, fail: bool) {
        self.fail_builds.store(fail, Ordering::SeqCst);
    }
}

impl ProgramBackend for FakeBackend {
    type Program = FakeProgram;
    type Kernel = FakeKernel;

    fn program_from_source(&self, source: &str) -> Result<FakeProgram> {
        self.source_compiles.fetch_add(1, Ordering::SeqCst);
        Ok(FakeProgram {
            source: source.to_string(),
            from_binary: false,
            build_options: None,
        })
    }

    fn program_from_binary(&self, binary: &[u8]) -> Result<FakeProgram> {
        let source = binary
            .strip_prefix(BINARY_MAGIC)
            .and_then(|rest| std::str::from_utf8(rest).ok())
            .ok_or(RuntimeError::Driver {
                stage: "Create program from binary",
                code: CL_INVALID_BINARY,
            })?;
        self.binary_loads.fetch_add(1, Ordering::SeqCst);
        Ok(FakeProgram {
            source: source.to_string(),
            from_binary: true,
            build_options: None,
        })
    }

    fn build_program(
        &self,
        program: &mut FakeProgram,
        options: &str,
    ) -> std::result::Result<(), DriverCode> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        self.build_options_seen
            .lock()
            .unwrap()
            .push(options.to_string());
        if self.fail_builds.load(Ordering::SeqCst) || program.source.contains("#error") {
            return Err(CL_BUILD_PROGRAM_FAILURE);
        }
        program.build_options = Some(options.to_string());
        Ok(())
    }

    fn build_log(&self, program: &FakeProgram) -> Option<String> {
        program
            .build_options
            .is_none()
            .then(|| "<kernel>:2:2: error: this kernel does not compile".to_string())
    }

    fn program_binary(&self, program: &FakeProgram) -> Result<Vec<u8>> {
        self.binaries_read.fetch_add(1, Ordering::SeqCst);
        let mut binary = BINARY_MAGIC.to_vec();
        binary.extend_from_slice(program.source.as_bytes());
        Ok(binary)
    }

    fn create_kernel(
        &self,
        program: &FakeProgram,
        kernel_name: &str,
    ) -> std::result::Result<FakeKernel, DriverCode> {
        let declaration = format!("__kernel void {}(", kernel_name);
        if !program.source.contains(&declaration) {
            return Err(CL_INVALID_KERNEL_NAME);
        }
        Ok(FakeKernel {
            name: kernel_name.to_string(),
            build_options: program.build_options.clone().unwrap_or_default(),
        })
    }
}
