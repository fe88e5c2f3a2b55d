use anyhow::Context;
use cpal::Device;
use cpal::traits::{DeviceTrait, HostTrait};

fn get_host() -> cpal::Host {
    cpal::default_host()
}

/// Finds the input device called `device_name`, or the host's default input.
pub fn get_or_default_input(device_name: Option<&str>) -> anyhow::Result<Device> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());
    match device_name {
        None => host
            .default_input_device()
            .context("No default input device"),
        Some(target) => host
            .input_devices()
            .context("Failed to enumerate input devices")?
            .find(|device| device.name().is_ok_and(|name| name == target))
            .with_context(|| format!("No input device named {:?}", target)),
    }
}

/// Finds the output device called `device_name`, or the host's default output.
pub fn get_or_default_output(device_name: Option<&str>) -> anyhow::Result<Device> {
    let host = get_host();
    match device_name {
        None => host
            .default_output_device()
            .context("No default output device"),
        Some(target) => host
            .output_devices()
            .context("Failed to enumerate output devices")?
            .find(|device| device.name().is_ok_and(|name| name == target))
            .with_context(|| format!("No output device named {:?}", target)),
    }
}

/// One line per input device: name, channels, sample rate, default marker.
pub fn get_available_inputs() -> anyhow::Result<String> {
    for host in cpal::available_hosts() {
        tracing::debug!("Available host: {:?}", host);
    }
    let host = get_host();
    let default_device = host.default_input_device().and_then(|d| d.name().ok());
    let mut device_names: Vec<String> = Vec::new();
    for in_device in host.input_devices().context("No input devices found")? {
        let d_name = in_device.name().unwrap_or_else(|_| "<unnamed>".to_string());
        let d = match in_device.default_input_config() {
            Ok(d_cfg) => describe(
                &d_name,
                d_cfg.channels(),
                d_cfg.sample_rate().0,
                &default_device,
            ),
            Err(e) => {
                tracing::debug!("Input device {} has no default config: {}", d_name, e);
                continue;
            }
        };
        device_names.push(d);
    }
    Ok(device_names.join("\n"))
}

/// One line per output device: name, channels, sample rate, default marker.
pub fn get_available_outputs() -> anyhow::Result<String> {
    let host = get_host();
    let default_device = host.default_output_device().and_then(|d| d.name().ok());
    let mut device_names: Vec<String> = Vec::new();
    for out_device in host.output_devices().context("No output devices found")? {
        let d_name = out_device.name().unwrap_or_else(|_| "<unnamed>".to_string());
        let d = match out_device.default_output_config() {
            Ok(d_cfg) => describe(
                &d_name,
                d_cfg.channels(),
                d_cfg.sample_rate().0,
                &default_device,
            ),
            Err(e) => {
                tracing::debug!("Output device {} has no default config: {}", d_name, e);
                continue;
            }
        };
        device_names.push(d);
    }
    Ok(device_names.join("\n"))
}

fn describe(
    name: &str,
    channels: u16,
    sampling_rate: u32,
    default_device: &Option<String>,
) -> String {
    let mut d = format!(" * {}({}ch, {}hz)", name, channels, sampling_rate);
    if default_device.as_deref() == Some(name) {
        d.push_str(" [default]");
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_marks_default() {
        let default = Some("Built-in Microphone".to_string());
        assert_eq!(
            describe("Built-in Microphone", 1, 48_000, &default),
            " * Built-in Microphone(1ch, 48000hz) [default]"
        );
        assert_eq!(describe("USB Headset", 2, 44_100, &default), " * USB Headset(2ch, 44100hz)");
    }
}
