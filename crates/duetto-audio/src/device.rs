use std::str::FromStr;

use cpal::{
    Device, Host,
    traits::{DeviceTrait, HostTrait},
};

/// Errors that can occur while configuring or opening the capture device.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Failed to enumerate audio input devices for the host.
    #[error("failed to read device's information: {0}")]
    ReadDevices(#[from] cpal::DevicesError),
    /// The backend rejected the requested stream configuration or failed to
    /// initialize the input stream (this includes denied mic permission).
    #[error("failed to build device input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    /// The device does not support input or its default configuration could
    /// not be queried.
    #[error("failed to build device config: {0}")]
    BuildStreamConfig(#[from] cpal::DefaultStreamConfigError),
    /// The provided device ID could not be parsed.
    #[error("failed to parse device id: {0}")]
    ReadDeviceId(#[from] cpal::DeviceIdError),
    /// The host has no default input device.
    #[error("no input device is available")]
    NoInputDevice,
}

/// A capture device belonging to a specific host, together with the format
/// the engine will receive from it.
#[derive(Clone)]
pub struct HostInputDevice {
    /// Unique identifier of the device within the host.
    pub id: String,
    /// Human-readable device description.
    pub description: String,

    device: Device,
}

impl std::fmt::Display for HostInputDevice {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{} ({})", self.description, self.id)
    }
}

impl HostInputDevice {
    fn from_device(device: Device) -> Self {
        let id = device
            .id()
            .map(|id| id.to_string())
            .unwrap_or_else(|_| String::from("unknown"));
        let description = device
            .description()
            .map(|description| description.to_string())
            .unwrap_or_else(|_| String::from("Unnamed input"));
        Self {
            id,
            description,
            device,
        }
    }

    /// Returns the default input sample rate and channel count for this device.
    pub fn sample_rate_and_channels(&self) -> Result<(cpal::SampleRate, u16), DeviceError> {
        let default_input_config = self.device.default_input_config()?;
        Ok((
            default_input_config.sample_rate(),
            default_input_config.channels(),
        ))
    }

    /// Returns a callback buffer size (in frames) close to `block_size`
    /// engine samples, expressed at the device's native rate.
    ///
    /// When the device rate differs from `engine_rate`, the result is rounded
    /// to a multiple of the reduced rate ratio so that resampled callbacks
    /// map onto whole engine samples.
    pub fn target_buffer_size(
        &self,
        engine_rate: u32,
        block_size: u32,
    ) -> Result<u32, DeviceError> {
        let default_input_config = self.device.default_input_config()?;
        let device_rate = default_input_config.sample_rate();

        let native_block = ((block_size as u64 * device_rate as u64) / engine_rate.max(1) as u64)
            .max(1) as u32;
        let native_block = match default_input_config.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max } => native_block.clamp(*min, *max),
            cpal::SupportedBufferSize::Unknown => native_block,
        };

        let rate_denominator = crate::gcd(device_rate, engine_rate);
        let step = (device_rate / rate_denominator).max(1);
        Ok(crate::find_nearest_to(native_block, step).max(step))
    }
}

/// Returns a list of all input audio devices available on the given host.
pub fn list_host_input_devices(host: &Host) -> Result<Vec<HostInputDevice>, DeviceError> {
    Ok(host
        .input_devices()?
        .map(HostInputDevice::from_device)
        .collect())
}

/// Returns the host's default input device.
pub fn default_input_device(host: &Host) -> Result<HostInputDevice, DeviceError> {
    host.default_input_device()
        .map(HostInputDevice::from_device)
        .ok_or(DeviceError::NoInputDevice)
}

/// Retrieves a specific input device by the string form of its
/// [`cpal::DeviceId`].
pub fn get_device_by_id(
    host: &Host,
    device_id: &str,
) -> Result<Option<HostInputDevice>, DeviceError> {
    let device_id = cpal::DeviceId::from_str(device_id)?;
    Ok(host.device_by_id(&device_id).map(HostInputDevice::from_device))
}

/// Opens an input stream on the device using its default configuration and a
/// fixed callback buffer of `buffer_frames` frames.
///
/// `callback` receives interleaved samples with the device's native channel
/// count; `error_callback` receives runtime stream errors.
///
/// # Threading
///
/// Both callbacks run on the real-time audio thread. They must not block,
/// lock, allocate or perform I/O.
pub fn open_cpal_input_stream<T>(
    input_device: &HostInputDevice,
    buffer_frames: u32,
    mut callback: impl FnMut(&[T]) + Send + 'static,
    error_callback: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, DeviceError>
where
    T: cpal::SizedSample + cpal::Sample,
{
    let mut input_config: cpal::StreamConfig = input_device.device.default_input_config()?.into();
    input_config.buffer_size = cpal::BufferSize::Fixed(buffer_frames);

    Ok(input_device.device.build_input_stream(
        &input_config,
        move |data: &[T], _| callback(data),
        error_callback,
        None,
    )?)
}
