//! Audio device enumeration
//!
//! Devices are collected from every available cpal host (ALSA, JACK,
//! PulseAudio, CoreAudio, WASAPI, ...) so a device can be picked from any of
//! them.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Human-readable name for a host ID
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

fn get_host_by_name(name: &str) -> Option<Host> {
    cpal::available_hosts()
        .into_iter()
        .find(|id| host_name(*id) == name)
        .and_then(|id| cpal::host_from_id(id).ok())
}

/// An audio output device
#[derive(Debug, Clone)]
pub struct AudioDevice {
    pub id: DeviceId,
    pub name: String,
    /// Host backend name (e.g., "ALSA", "JACK")
    pub host: String,
    /// Whether this is the default device of its host
    pub is_default: bool,
    /// Common sample rates within the supported ranges
    pub sample_rates: Vec<u32>,
    pub max_channels: u16,
}

impl std::fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.host, self.name)?;
        if self.is_default {
            write!(f, " (default)")?;
        }
        Ok(())
    }
}

/// List output devices from all hosts, defaults first
pub fn get_output_devices() -> AudioResult<Vec<AudioDevice>> {
    let mut all_devices: Vec<AudioDevice> = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };

        let host_name_str = host_name(host_id);
        let default_device_name = host
            .default_output_device()
            .and_then(|d: cpal::Device| d.name().ok());

        let devices_iter = match host.output_devices() {
            Ok(d) => d,
            Err(e) => {
                log::debug!("Could not enumerate devices for {:?}: {}", host_id, e);
                continue;
            }
        };

        for device in devices_iter {
            let Ok(name) = device.name() else {
                continue;
            };

            let configs: Vec<_> = match device.supported_output_configs() {
                Ok(c) => c.collect(),
                Err(_) => continue,
            };
            if configs.is_empty() {
                continue;
            }

            let mut sample_rates: Vec<u32> = Vec::new();
            let mut max_channels: u16 = 0;
            for config in &configs {
                max_channels = max_channels.max(config.channels());
                for rate in [22050, 44100, 48000, 88200, 96000] {
                    if rate >= config.min_sample_rate().0
                        && rate <= config.max_sample_rate().0
                        && !sample_rates.contains(&rate)
                    {
                        sample_rates.push(rate);
                    }
                }
            }
            sample_rates.sort_unstable();

            all_devices.push(AudioDevice {
                id: DeviceId::with_host(&name, &host_name_str),
                is_default: default_device_name.as_ref() == Some(&name),
                name,
                host: host_name_str.clone(),
                sample_rates,
                max_channels,
            });
        }
    }

    if all_devices.is_empty() {
        return Err(AudioError::NoDevices);
    }

    all_devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.host.cmp(&b.host))
            .then_with(|| a.name.cmp(&b.name))
    });

    log::info!("Enumerated {} audio output devices", all_devices.len());
    Ok(all_devices)
}

/// Find a device by its ID
///
/// Uses the host named in the ID when present, otherwise searches all hosts.
pub fn find_device_by_id(id: &DeviceId) -> AudioResult<cpal::Device> {
    let matches = |d: &cpal::Device| d.name().ok().as_ref() == Some(&id.name);

    if let Some(host) = id.host.as_deref().and_then(get_host_by_name) {
        return host
            .output_devices()
            .map_err(|e| AudioError::ConfigError(e.to_string()))?
            .find(matches)
            .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()));
    }

    for host_id in cpal::available_hosts() {
        let Ok(host) = cpal::host_from_id(host_id) else {
            continue;
        };
        if let Some(device) = host.output_devices().ok().and_then(|mut d| d.find(matches)) {
            return Ok(device);
        }
    }

    Err(AudioError::DeviceNotFound(id.display_label()))
}

/// Default output device of the default host
pub fn get_default_device() -> AudioResult<cpal::Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| AudioError::NoDefaultDevice("No default output device".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_names() {
        for host_id in cpal::available_hosts() {
            assert!(!host_name(host_id).is_empty());
        }
    }

    #[test]
    fn test_device_enumeration() {
        // Machines without sound hardware (CI) have no devices
        match get_output_devices() {
            Ok(devices) => {
                for device in &devices {
                    println!("  - {} ({} ch, {:?})", device, device.max_channels, device.sample_rates);
                }
            }
            Err(AudioError::NoDevices) => println!("No audio devices available"),
            Err(e) => println!("Error enumerating devices: {}", e),
        }
    }

    #[test]
    fn test_unknown_device_is_not_found() {
        let id = DeviceId::new("busmix-test-no-such-device");
        assert!(matches!(
            find_device_by_id(&id),
            Err(AudioError::DeviceNotFound(_)) | Err(AudioError::ConfigError(_))
        ));
    }
}
