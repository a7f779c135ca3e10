//! GPU performance and priority hints.
//!
//! Hints are turned into vendor-specific context properties. Only Adreno
//! exposes the `cl_qcom_perf_hint` and `cl_qcom_priority_hint` extensions;
//! every other vendor gets a property list holding just the terminator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::device::GpuVendor;
use crate::error::RuntimeError;

/// Mirrors `cl_context_properties` (`intptr_t`).
pub type ContextProperty = isize;

// cl_qcom_perf_hint
pub const CL_CONTEXT_PERF_HINT_QCOM: ContextProperty = 0x40C2;
pub const CL_PERF_HINT_HIGH_QCOM: ContextProperty = 0x40C3;
pub const CL_PERF_HINT_NORMAL_QCOM: ContextProperty = 0x40C4;
pub const CL_PERF_HINT_LOW_QCOM: ContextProperty = 0x40C5;

// cl_qcom_priority_hint
pub const CL_CONTEXT_PRIORITY_HINT_QCOM: ContextProperty = 0x40C9;
pub const CL_PRIORITY_HINT_HIGH_QCOM: ContextProperty = 0x40CA;
pub const CL_PRIORITY_HINT_NORMAL_QCOM: ContextProperty = 0x40CB;
pub const CL_PRIORITY_HINT_LOW_QCOM: ContextProperty = 0x40CC;

/// GPU performance hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PerfHint {
    #[default]
    Default,
    Low,
    Normal,
    High,
}

/// GPU scheduling priority hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityHint {
    #[default]
    Default,
    Low,
    Normal,
    High,
}

fn parse_level(s: &str) -> Option<u8> {
    match s.trim().to_ascii_lowercase().as_str() {
        "" | "default" => Some(0),
        "low" => Some(1),
        "normal" => Some(2),
        "high" => Some(3),
        _ => None,
    }
}

impl FromStr for PerfHint {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match parse_level(s) {
            Some(0) => Ok(PerfHint::Default),
            Some(1) => Ok(PerfHint::Low),
            Some(2) => Ok(PerfHint::Normal),
            Some(3) => Ok(PerfHint::High),
            _ => Err(RuntimeError::Config(format!("unknown GPU perf hint `{}`", s))),
        }
    }
}

impl FromStr for PriorityHint {
    type Err = RuntimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match parse_level(s) {
            Some(0) => Ok(PriorityHint::Default),
            Some(1) => Ok(PriorityHint::Low),
            Some(2) => Ok(PriorityHint::Normal),
            Some(3) => Ok(PriorityHint::High),
            _ => Err(RuntimeError::Config(format!(
                "unknown GPU priority hint `{}`",
                s
            ))),
        }
    }
}

impl fmt::Display for PerfHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PerfHint::Default => write!(f, "default"),
            PerfHint::Low => write!(f, "low"),
            PerfHint::Normal => write!(f, "normal"),
            PerfHint::High => write!(f, "high"),
        }
    }
}

impl fmt::Display for PriorityHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorityHint::Default => write!(f, "default"),
            PriorityHint::Low => write!(f, "low"),
            PriorityHint::Normal => write!(f, "normal"),
            PriorityHint::High => write!(f, "high"),
        }
    }
}

/// Whether the vendor understands the Qualcomm hint extensions.
pub fn supports_context_hints(vendor: GpuVendor) -> bool {
    vendor == GpuVendor::Adreno
}

/// Builds the context property list for `vendor`.
///
/// The list is key/value pairs followed by a single `0`. Default hints add
/// no pair, and unsupported vendors always get `[0]`.
pub fn context_properties(
    vendor: GpuVendor,
    perf_hint: PerfHint,
    priority_hint: PriorityHint,
) -> Vec<ContextProperty> {
    let mut properties = Vec::with_capacity(5);

    if supports_context_hints(vendor) {
        match perf_hint {
            PerfHint::Low => {
                properties.extend([CL_CONTEXT_PERF_HINT_QCOM, CL_PERF_HINT_LOW_QCOM])
            }
            PerfHint::Normal => {
                properties.extend([CL_CONTEXT_PERF_HINT_QCOM, CL_PERF_HINT_NORMAL_QCOM])
            }
            PerfHint::High => {
                properties.extend([CL_CONTEXT_PERF_HINT_QCOM, CL_PERF_HINT_HIGH_QCOM])
            }
            PerfHint::Default => {}
        }
        match priority_hint {
            PriorityHint::Low => {
                properties.extend([CL_CONTEXT_PRIORITY_HINT_QCOM, CL_PRIORITY_HINT_LOW_QCOM])
            }
            PriorityHint::Normal => {
                properties.extend([CL_CONTEXT_PRIORITY_HINT_QCOM, CL_PRIORITY_HINT_NORMAL_QCOM])
            }
            PriorityHint::High => {
                properties.extend([CL_CONTEXT_PRIORITY_HINT_QCOM, CL_PRIORITY_HINT_HIGH_QCOM])
            }
            PriorityHint::Default => {}
        }
    }

    properties.push(0);
    properties
}
