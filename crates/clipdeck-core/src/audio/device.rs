//! Audio device enumeration and lookup
//!
//! Devices are listed from ALL available audio hosts (ALSA, JACK, PulseAudio,
//! WASAPI, CoreAudio...) so a capture interface and a monitor output can come
//! from different hosts.

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Which side of a device we're interested in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl Direction {
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

/// Get a human-readable name for a host ID
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

/// Get a host by its name string
fn get_host_by_name(name: &str) -> Option<Host> {
    cpal::available_hosts()
        .into_iter()
        .find(|&id| host_name(id) == name)
        .and_then(|id| cpal::host_from_id(id).ok())
}

fn host_devices(host: &Host, direction: Direction) -> Option<Vec<cpal::Device>> {
    let devices: Result<Vec<cpal::Device>, cpal::DevicesError> = match direction {
        Direction::Input => host.input_devices().map(|d| d.collect()),
        Direction::Output => host.output_devices().map(|d| d.collect()),
    };
    match devices {
        Ok(devices) => Some(devices),
        Err(e) => {
            log::debug!("Could not enumerate {} devices: {}", direction.label(), e);
            None
        }
    }
}

fn host_default(host: &Host, direction: Direction) -> Option<cpal::Device> {
    match direction {
        Direction::Input => host.default_input_device(),
        Direction::Output => host.default_output_device(),
    }
}

/// Information about an audio device
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Device identifier for configuration (includes host info)
    pub id: DeviceId,
    /// Human-readable device name
    pub name: String,
    /// Host backend name (e.g., "ALSA", "JACK")
    pub host: String,
    pub direction: Direction,
    /// Whether this is the system default device for its host
    pub is_default: bool,
    /// Supported sample rates (common ones)
    pub sample_rates: Vec<u32>,
    /// Maximum channels in this direction
    pub max_channels: u16,
}

impl std::fmt::Display for AudioDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.host, self.name)
    }
}

/// Summarize the supported configurations of a device
fn capabilities(device: &cpal::Device, direction: Direction) -> Option<(Vec<u32>, u16)> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = match direction {
        Direction::Input => device.supported_input_configs().ok()?.collect(),
        Direction::Output => device.supported_output_configs().ok()?.collect(),
    };
    if ranges.is_empty() {
        return None;
    }

    let mut sample_rates: Vec<u32> = Vec::new();
    let mut max_channels: u16 = 0;
    for range in &ranges {
        max_channels = max_channels.max(range.channels());
        for rate in [44100, 48000, 88200, 96000, 176400, 192000] {
            if rate >= range.min_sample_rate().0
                && rate <= range.max_sample_rate().0
                && !sample_rates.contains(&rate)
            {
                sample_rates.push(rate);
            }
        }
    }
    sample_rates.sort();
    Some((sample_rates, max_channels))
}

/// List devices of one direction from every host
///
/// Defaults come first, then devices are ordered by host and name.
pub fn list_devices(direction: Direction) -> AudioResult<Vec<AudioDevice>> {
    let mut all_devices: Vec<AudioDevice> = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let host_label = host_name(host_id);
        let default_name = host_default(&host, direction).and_then(|d| d.name().ok());

        for device in host_devices(&host, direction).unwrap_or_default() {
            let Ok(name) = device.name() else {
                continue;
            };
            let Some((sample_rates, max_channels)) = capabilities(&device, direction) else {
                continue;
            };
            all_devices.push(AudioDevice {
                id: DeviceId::with_host(&name, &host_label),
                is_default: default_name.as_ref() == Some(&name),
                name,
                host: host_label.clone(),
                direction,
                sample_rates,
                max_channels,
            });
        }
    }

    if all_devices.is_empty() {
        return Err(AudioError::NoDevices(direction.label()));
    }

    all_devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.host.cmp(&b.host))
            .then_with(|| a.name.cmp(&b.name))
    });

    log::info!(
        "Enumerated {} {} devices from {} hosts",
        all_devices.len(),
        direction.label(),
        cpal::available_hosts().len()
    );
    Ok(all_devices)
}

/// List capture devices, logging instead of failing
pub fn get_input_devices() -> Vec<AudioDevice> {
    list_devices(Direction::Input).unwrap_or_else(|e| {
        log::warn!("Failed to enumerate audio devices: {}", e);
        Vec::new()
    })
}

/// List monitor devices, logging instead of failing
pub fn get_output_devices() -> Vec<AudioDevice> {
    list_devices(Direction::Output).unwrap_or_else(|e| {
        log::warn!("Failed to enumerate audio devices: {}", e);
        Vec::new()
    })
}

/// Find a device by its ID
///
/// Uses the host specified in the DeviceId if available, otherwise
/// searches all available hosts.
pub fn find_device_by_id(id: &DeviceId, direction: Direction) -> AudioResult<cpal::Device> {
    let matches = |d: &cpal::Device| d.name().ok().as_ref() == Some(&id.name);

    if let Some(host) = id.host.as_deref().and_then(get_host_by_name) {
        return host_devices(&host, direction)
            .ok_or_else(|| AudioError::ConfigError(format!("{} devices unavailable", direction.label())))?
            .into_iter()
            .find(matches)
            .ok_or_else(|| AudioError::DeviceNotFound(id.name.clone()));
    }

    cpal::available_hosts()
        .into_iter()
        .filter_map(|host_id| cpal::host_from_id(host_id).ok())
        .filter_map(|host| host_devices(&host, direction))
        .flatten()
        .find(matches)
        .ok_or_else(|| AudioError::DeviceNotFound(id.name.clone()))
}

/// Get the CPAL default device of the default host
pub fn get_cpal_default_device(direction: Direction) -> AudioResult<cpal::Device> {
    host_default(&cpal::default_host(), direction).ok_or_else(|| {
        AudioError::NoDefaultDevice(format!("No default {} device", direction.label()))
    })
}

/// Resolve a configured device, falling back to the default
pub fn resolve_device(id: Option<&DeviceId>, direction: Direction) -> AudioResult<cpal::Device> {
    match id {
        Some(id) => find_device_by_id(id, direction),
        None => get_cpal_default_device(direction),
    }
}
