//! Device selection for model placement.
//!
//! Automatic selection probes accelerators in a fixed order:
//! CUDA (dedicated GPU) → Metal (Apple unified memory) → CPU

use candle_core::{Device, DeviceLocation};
use tracing::info;

use tts_core::{TtsError, TtsResult};

/// Device preference for model loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// Automatically select the best available device.
    #[default]
    Auto,
    /// Force CPU usage.
    Cpu,
    /// Force Metal GPU (Apple Silicon).
    Metal,
    /// Force CUDA GPU (NVIDIA).
    Cuda,
}

impl std::str::FromStr for DevicePreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "metal" | "mps" | "apple" => Ok(Self::Metal),
            "cuda" | "gpu" | "nvidia" => Ok(Self::Cuda),
            _ => Err(format!("unknown device: {s} (expected auto, cuda, metal or cpu)")),
        }
    }
}

impl std::fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Metal => write!(f, "metal"),
            Self::Cuda => write!(f, "cuda"),
        }
    }
}

/// Select a device according to preference and compiled features.
///
/// Forcing an accelerator that is missing is an error; `Auto` always
/// succeeds because it ends at the CPU.
pub fn select_device(preference: DevicePreference) -> TtsResult<Device> {
    match preference {
        DevicePreference::Cpu => {
            info!("Using CPU device (forced)");
            Ok(Device::Cpu)
        }
        DevicePreference::Metal => select_metal(),
        DevicePreference::Cuda => select_cuda(),
        DevicePreference::Auto => Ok(select_auto()),
    }
}

fn select_auto() -> Device {
    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                info!("Auto-selected CUDA GPU");
                return device;
            }
            Err(e) => tracing::warn!("CUDA GPU not available: {}", e),
        }
    }

    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                info!("Auto-selected Metal GPU");
                return device;
            }
            Err(e) => tracing::warn!("Metal GPU not available: {}", e),
        }
    }

    info!("Using CPU device (no accelerator available)");
    Device::Cpu
}

fn select_metal() -> TtsResult<Device> {
    #[cfg(feature = "metal")]
    {
        Device::new_metal(0)
            .map(|device| {
                info!("Using Metal GPU");
                device
            })
            .map_err(|e| TtsError::device(format!("Metal GPU requested but not available: {e}")))
    }

    #[cfg(not(feature = "metal"))]
    {
        Err(TtsError::device(
            "Metal GPU requested but the 'metal' feature is not enabled",
        ))
    }
}

fn select_cuda() -> TtsResult<Device> {
    #[cfg(feature = "cuda")]
    {
        Device::new_cuda(0)
            .map(|device| {
                info!("Using CUDA GPU");
                device
            })
            .map_err(|e| TtsError::device(format!("CUDA GPU requested but not available: {e}")))
    }

    #[cfg(not(feature = "cuda"))]
    {
        Err(TtsError::device(
            "CUDA GPU requested but the 'cuda' feature is not enabled",
        ))
    }
}

/// Identifier reported by `/health` for a device.
pub fn device_label(device: &Device) -> &'static str {
    location_label(device.location())
}

/// Identifier for a device location. Metal reports as `mps`, the name
/// clients of the health endpoint already expect for Apple GPUs.
pub fn location_label(location: DeviceLocation) -> &'static str {
    match location {
        DeviceLocation::Cpu => "cpu",
        DeviceLocation::Cuda { .. } => "cuda",
        DeviceLocation::Metal { .. } => "mps",
    }
}
