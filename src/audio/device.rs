//! Audio device discovery
//!
//! Availability checks here are the engine's environment gate: a missing
//! output device is fatal before any session starts, while the input probe
//! lets the recording UI tell a missing microphone from a denied one.

use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

use crate::error::EngineError;

/// Device description for listings
#[derive(Debug, Clone, Serialize)]
pub struct AudioDeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}

/// Wrapper around cpal device
pub struct AudioDevice {
    inner: cpal::Device,
    pub name: String,
}

impl AudioDevice {
    pub fn from_cpal(device: cpal::Device) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Self { inner: device, name }
    }

    pub fn inner(&self) -> &cpal::Device {
        &self.inner
    }

    pub fn into_inner(self) -> cpal::Device {
        self.inner
    }

    /// Get default output config
    pub fn default_output_config(&self) -> Result<cpal::SupportedStreamConfig, EngineError> {
        self.inner
            .default_output_config()
            .map_err(|e| EngineError::DeviceNotFound(e.to_string()))
    }
}

/// Default output device of the default host
///
/// A host without any output device means there is no audio subsystem to
/// play through.
pub fn default_output_device() -> Result<AudioDevice, EngineError> {
    let host = cpal::default_host();
    host.default_output_device()
        .map(AudioDevice::from_cpal)
        .ok_or_else(|| {
            EngineError::UnsupportedEnvironment(format!(
                "host {:?} has no output device",
                host.id()
            ))
        })
}

/// Find an output device by name
pub fn output_device_by_name(name: &str) -> Result<AudioDevice, EngineError> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| EngineError::UnsupportedEnvironment(e.to_string()))?;

    for device in devices {
        if let Ok(device_name) = device.name() {
            if device_name == name {
                return Ok(AudioDevice::from_cpal(device));
            }
        }
    }

    Err(EngineError::DeviceNotFound(name.to_string()))
}

/// List output devices of the default host
pub fn list_output_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    if let Ok(outputs) = host.output_devices() {
        for device in outputs {
            if let Ok(name) = device.name() {
                let (sample_rates, channels) = output_capabilities(&device);
                devices.push(AudioDeviceInfo {
                    id: format!("output:{}", name),
                    is_default: default_name.as_ref() == Some(&name),
                    name,
                    sample_rates,
                    channels,
                });
            }
        }
    }
    devices
}

fn output_capabilities(device: &cpal::Device) -> (Vec<u32>, Vec<u16>) {
    let mut rates = Vec::new();
    let mut chans = Vec::new();

    if let Ok(configs) = device.supported_output_configs() {
        for config in configs {
            for rate_val in [44100u32, 48000, 88200, 96000] {
                let rate = cpal::SampleRate(rate_val);
                if rate >= config.min_sample_rate()
                    && rate <= config.max_sample_rate()
                    && !rates.contains(&rate_val)
                {
                    rates.push(rate_val);
                }
            }
            let ch = config.channels();
            if !chans.contains(&ch) {
                chans.push(ch);
            }
        }
    }

    rates.sort();
    chans.sort();
    (rates, chans)
}

/// Pre-flight check for the capture device
///
/// Returns the device name when capture can be opened. No device at all is
/// `DeviceNotFound`; a device the backend refuses to configure is reported as
/// `PermissionDenied`, which callers surface as a blocking error.
pub fn probe_input() -> Result<String, EngineError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| EngineError::DeviceNotFound("no default input device".to_string()))?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    match device.default_input_config() {
        Ok(_) => Ok(name),
        Err(cpal::DefaultStreamConfigError::DeviceNotAvailable) => {
            Err(EngineError::DeviceNotFound(name))
        }
        Err(e) => {
            tracing::warn!("Input device {} refused configuration: {}", name, e);
            Err(EngineError::PermissionDenied(format!("{}: {}", name, e)))
        }
    }
}
