//! Compute device selection for tensors built by the text conditioning glue.

use candle_core::Device;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    Cuda,
    Metal,
    Cpu,
}

impl DeviceKind {
    pub fn is_cpu(&self) -> bool {
        matches!(self, DeviceKind::Cpu)
    }
}

#[derive(Debug, Clone)]
pub struct DeviceProfile {
    pub device: Device,
    pub kind: DeviceKind,
}

impl DeviceProfile {
    pub fn cpu() -> Self {
        Self {
            device: Device::Cpu,
            kind: DeviceKind::Cpu,
        }
    }
}

pub struct DeviceSelector;

impl DeviceSelector {
    fn try_metal() -> Option<DeviceProfile> {
        if !candle_core::utils::metal_is_available() {
            return None;
        }
        let device = std::panic::catch_unwind(|| Device::new_metal(0))
            .ok()?
            .ok()?;
        device.is_metal().then_some(DeviceProfile {
            device,
            kind: DeviceKind::Metal,
        })
    }

    fn try_cuda() -> Option<DeviceProfile> {
        let device = std::panic::catch_unwind(|| Device::cuda_if_available(0))
            .ok()?
            .ok()?;
        device.is_cuda().then_some(DeviceProfile {
            device,
            kind: DeviceKind::Cuda,
        })
    }

    pub fn detect() -> DeviceProfile {
        if cfg!(target_os = "macos") {
            if let Some(profile) = Self::try_metal() {
                info!("Using Metal device");
                return profile;
            }
        } else if let Some(profile) = Self::try_cuda() {
            info!("Using CUDA device");
            return profile;
        }

        info!("Falling back to CPU");
        DeviceProfile::cpu()
    }

    pub fn detect_with_preference(preference: Option<&str>) -> DeviceProfile {
        match preference.unwrap_or("") {
            "cuda" => Self::try_cuda().unwrap_or_else(Self::detect),
            "metal" | "mps" => Self::try_metal().unwrap_or_else(Self::detect),
            "cpu" => DeviceProfile::cpu(),
            _ => Self::detect(),
        }
    }
}
