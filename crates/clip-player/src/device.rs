//! Output device discovery and selection.
//!
//! Thin wrappers around CPAL for:
//! - listing available output devices
//! - selecting either the default device or a device by substring match
//! - choosing a stream config for whole-buffer playback

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Pick the first output device whose name contains `needle` (case-insensitive),
/// or the host default when `needle` is `None` or blank.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let needle = needle.map(str::trim).filter(|n| !n.is_empty());
    let Some(needle) = needle else {
        return host
            .default_output_device()
            .ok_or_else(|| anyhow!("No default output device"));
    };

    let mut devices = host.output_devices().context("No output devices")?;
    devices
        .find(|d| {
            d.description()
                .ok()
                .map(|n| matches_device_name(&n.name(), needle))
                .unwrap_or(false)
        })
        .ok_or_else(|| anyhow!("No output device matched: {needle}"))
}

/// Choose the stream config: the device default rate, preferring `f32` samples.
///
/// Decoded clips are resampled to whatever rate this returns, so the default
/// rate wins over the highest supported one.
pub fn pick_output_config(device: &cpal::Device) -> Result<cpal::SupportedStreamConfig> {
    let default_cfg = device
        .default_output_config()
        .context("No default output config")?;
    if default_cfg.sample_format() == cpal::SampleFormat::F32 {
        return Ok(default_cfg);
    }

    let rate = default_cfg.sample_rate();
    let channels = default_cfg.channels();
    let f32_range = device
        .supported_output_configs()
        .ok()
        .into_iter()
        .flatten()
        .find(|r| {
            r.sample_format() == cpal::SampleFormat::F32
                && r.channels() == channels
                && r.min_sample_rate() <= rate
                && rate <= r.max_sample_rate()
        });
    Ok(match f32_range {
        Some(range) => range.with_sample_rate(rate),
        None => default_cfg,
    })
}

/// Print available output devices to stdout (`--list-devices`).
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        println!("#{i}: {}", d.description()?);
    }
    Ok(())
}

/// [`list_devices`] on the platform default host.
pub fn list_default_host_devices() -> Result<()> {
    list_devices(&cpal::default_host())
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
