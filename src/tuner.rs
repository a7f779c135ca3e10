//! Autotuner status query.
//!
//! The runtime only needs to know whether a tuning session is running, in
//! which case kernels are timed and the queue needs profiling enabled.

pub const ENV_TUNING: &str = "HARP_TUNING";

pub trait TuningSession: Send + Sync {
    fn is_tuning(&self) -> bool;
}

/// Never tuning.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTuning;

impl TuningSession for NoTuning {
    fn is_tuning(&self) -> bool {
        false
    }
}

/// Tuning when `HARP_TUNING=1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvTuning;

impl TuningSession for EnvTuning {
    fn is_tuning(&self) -> bool {
        std::env::var(ENV_TUNING).as_deref() == Ok("1")
    }
}

impl TuningSession for bool {
    fn is_tuning(&self) -> bool {
        *self
    }
}

/// Queue profiling is needed when tuning or when explicitly requested.
pub fn profiling_required(tuner: &dyn TuningSession, profiling_flag: bool) -> bool {
    tuner.is_tuning() || profiling_flag
}
