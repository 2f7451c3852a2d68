use anyhow::{anyhow, Result};
use candle_core::Device;
use tracing::info;

use materia_core::config::DevicePreference;

/// `Auto` tries CUDA, then Metal, then falls back to CPU. An explicit choice
/// that is unavailable is an error.
pub fn select_device(pref: DevicePreference) -> Result<Device> {
    let device = match pref {
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Cuda => Device::new_cuda(0).map_err(|e| anyhow!("CUDA device unavailable: {}", e))?,
        DevicePreference::Metal => Device::new_metal(0).map_err(|e| anyhow!("Metal device unavailable: {}", e))?,
        DevicePreference::Auto => {
            if let Ok(dev) = Device::new_cuda(0) { dev }
            else if let Ok(dev) = Device::new_metal(0) { dev }
            else { Device::Cpu }
        }
    };
    info!(device = %device_label(&device), "selected compute device");
    Ok(device)
}

pub fn device_label(device: &Device) -> String {
    if device.is_cuda() { "cuda:0".to_string() }
    else if device.is_metal() { "metal:0".to_string() }
    else { "cpu".to_string() }
}
