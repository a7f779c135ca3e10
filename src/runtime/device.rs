//! GPU device selection and vendor classification.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RuntimeError};

const ADRENO_DEVICE_NAME: &str = "QUALCOMM Adreno(TM)";
const MALI_DEVICE_MARKER: &str = "Mali";

/// Placeholder returned when the device version string cannot be parsed.
pub const UNKNOWN_API_VERSION: &str = "unknown";

/// GPU vendor family, as far as this runtime cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GpuVendor {
    Adreno,
    Mali,
    Unknown,
}

impl GpuVendor {
    /// Classifies a device by its `CL_DEVICE_NAME`.
    ///
    /// Adreno requires an exact name match; Mali matches anywhere in the name.
    pub fn from_device_name(name: &str) -> Self {
        if name == ADRENO_DEVICE_NAME {
            GpuVendor::Adreno
        } else if name.contains(MALI_DEVICE_MARKER) {
            GpuVendor::Mali
        } else {
            GpuVendor::Unknown
        }
    }
}

impl fmt::Display for GpuVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuVendor::Adreno => write!(f, "Qualcomm Adreno"),
            GpuVendor::Mali => write!(f, "ARM Mali"),
            GpuVendor::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Extracts `<major>.<minor>` from a `CL_DEVICE_VERSION` string.
///
/// The driver reports `"OpenCL <major>.<minor> <vendor specific>"`, so the
/// version sits at byte offset 7. Anything else yields `None`.
pub fn parse_api_version(raw: &str) -> Option<&str> {
    let candidate = raw.strip_prefix("OpenCL ")?.get(..3)?;
    let bytes = candidate.as_bytes();
    if bytes[0].is_ascii_digit() && bytes[1] == b'.' && bytes[2].is_ascii_digit() {
        Some(candidate)
    } else {
        None
    }
}

/// Read access to the device attributes selection needs.
///
/// Implemented for the OpenCL device handle and for test doubles.
pub trait DeviceProbe {
    fn is_gpu(&self) -> Result<bool>;
    fn name(&self) -> Result<String>;
    fn version(&self) -> Result<String>;
    fn max_work_group_size(&self) -> Result<usize>;
}

/// The GPU picked for this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedDevice {
    /// Position in the platform's device list
    pub index: usize,
    pub name: String,
    pub vendor: GpuVendor,
    pub api_version: String,
    pub max_work_group_size: usize,
}

/// Picks the first GPU out of a platform's device list.
pub fn select_gpu<D: DeviceProbe>(devices: &[D]) -> Result<SelectedDevice> {
    if devices.is_empty() {
        return Err(RuntimeError::NoDevice);
    }

    for (index, device) in devices.iter().enumerate() {
        if !device.is_gpu()? {
            continue;
        }

        let name = device.name()?;
        let vendor = GpuVendor::from_device_name(&name);
        let raw_version = device.version()?;
        let api_version = match parse_api_version(&raw_version) {
            Some(v) => v.to_string(),
            None => {
                log::warn!(
                    "Unrecognized device version string {:?}, using \"{}\"",
                    raw_version,
                    UNKNOWN_API_VERSION
                );
                UNKNOWN_API_VERSION.to_string()
            }
        };
        let max_work_group_size = device.max_work_group_size()?;

        log::debug!("Using device: {} ({}, OpenCL {})", name, vendor, api_version);

        return Ok(SelectedDevice {
            index,
            name,
            vendor,
            api_version,
            max_work_group_size,
        });
    }

    Err(RuntimeError::NoGpu)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    struct FakeDevice {
        gpu: bool,
        name: &'static str,
        version: &'static str,
    }

    impl DeviceProbe for FakeDevice {
        fn is_gpu(&self) -> Result<bool> {
            Ok(self.gpu)
        }

        fn name(&self) -> Result<String> {
            Ok(self.name.to_string())
        }

        fn version(&self) -> Result<String> {
            Ok(self.version.to_string())
        }

        fn max_work_group_size(&self) -> Result<usize> {
            Ok(1024)
        }
    }

    #[rstest]
    #[case("QUALCOMM Adreno(TM)", GpuVendor::Adreno)]
    #[case("QUALCOMM Adreno(TM) 640", GpuVendor::Unknown)]
    #[case("Mali-G76", GpuVendor::Mali)]
    #[case("ARM Mali-T880", GpuVendor::Mali)]
    #[case("PowerVR Rogue", GpuVendor::Unknown)]
    fn test_vendor_classification(#[case] name: &str, #[case] expected: GpuVendor) {
        assert_eq!(GpuVendor::from_device_name(name), expected);
    }

    #[rstest]
    #[case("OpenCL 2.0 QUALCOMM build: commit #abc", Some("2.0"))]
    #[case("OpenCL 1.2 v1.r12p0", Some("1.2"))]
    #[case("OpenCL 3.0 ", Some("3.0"))]
    #[case("OpenCL C 1.2", None)]
    #[case("OpenCL 2", None)]
    #[case("Vulkan 1.1", None)]
    #[case("", None)]
    fn test_parse_api_version(#[case] raw: &str, #[case] expected: Option<&str>) {
        assert_eq!(parse_api_version(raw), expected);
    }

    #[test]
    fn test_select_first_gpu() {
        let devices = [
            FakeDevice {
                gpu: false,
                name: "Cortex-A76",
                version: "OpenCL 1.2",
            },
            FakeDevice {
                gpu: true,
                name: "Mali-G76",
                version: "OpenCL 2.0 v1.r16p0",
            },
            FakeDevice {
                gpu: true,
                name: "QUALCOMM Adreno(TM)",
                version: "OpenCL 2.0 QUALCOMM",
            },
        ];

        let selected = select_gpu(&devices).unwrap();
        assert_eq!(selected.index, 1);
        assert_eq!(selected.vendor, GpuVendor::Mali);
        assert_eq!(selected.api_version, "2.0");
        assert_eq!(selected.max_work_group_size, 1024);
    }

    #[test]
    fn test_select_without_gpu() {
        let devices = [FakeDevice {
            gpu: false,
            name: "cpu",
            version: "OpenCL 1.2",
        }];
        assert!(matches!(select_gpu(&devices), Err(RuntimeError::NoGpu)));

        let empty: [FakeDevice; 0] = [];
        assert!(matches!(select_gpu(&empty), Err(RuntimeError::NoDevice)));
    }

    #[test]
    fn test_malformed_version_falls_back() {
        let devices = [FakeDevice {
            gpu: true,
            name: "Some GPU",
            version: "garbage",
        }];
        let selected = select_gpu(&devices).unwrap();
        assert_eq!(selected.api_version, UNKNOWN_API_VERSION);
        assert_eq!(selected.vendor, GpuVendor::Unknown);
    }
}
