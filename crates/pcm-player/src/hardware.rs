//! Sink configuration and scoped ownership of the open PCM handle.
//!
//! [`configure`] opens the device and applies the negotiated parameters in a fixed order:
//! access, sample format, channels, nearest rate, commit, then reads back the period size.
//! The first failing step ends configuration; there is no retry with other parameters.
//!
//! The returned [`Hardware`] guard is the only owner of the handle. Dropping it flushes
//! (unless already drained) and then closes the device, whichever path the worker takes.

use crate::error::{HwStep, PcmError, PlaybackError};
use crate::format::{AudioFormat, SampleFormat};
use crate::pcm::{Access, Pcm, PcmDevice};

/// Geometry derived from the committed hardware parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareConfig {
    pub sample_format: SampleFormat,
    pub channels: u32,
    pub requested_rate: u32,
    /// Rate the device settled on; may differ from `requested_rate`.
    pub sample_rate: u32,
    pub bytes_per_frame: usize,
    /// Hardware period in frames. Used to size write attempts only.
    pub period_frames: usize,
}

/// Owns an open PCM handle for the lifetime of one session.
pub struct Hardware<P: Pcm> {
    pcm: P,
    device: String,
    drained: bool,
}

impl<P: Pcm> Hardware<P> {
    fn new(pcm: P, device: &str) -> Self {
        Self {
            pcm,
            device: device.to_string(),
            drained: false,
        }
    }

    pub fn pcm_mut(&mut self) -> &mut P {
        &mut self.pcm
    }

    /// Block until everything written has been rendered.
    ///
    /// Marks the handle as flushed so the release path only closes it.
    pub fn drain(&mut self) -> Result<(), PcmError> {
        // Set before the call: a failed drain is not retried on release.
        self.drained = true;
        self.pcm.drain()
    }
}

impl<P: Pcm> Drop for Hardware<P> {
    fn drop(&mut self) {
        if !self.drained {
            if let Err(e) = self.pcm.drain() {
                tracing::warn!(device = %self.device, "drain on release failed: {e}");
            }
        }
        tracing::info!(device = %self.device, "PCM device closed");
    }
}

/// Open `device` and apply `format` using the negotiated `sample_format`.
pub fn configure<D: PcmDevice>(
    device: &D,
    format: &AudioFormat,
    sample_format: SampleFormat,
) -> Result<(Hardware<D::Pcm>, HardwareConfig), PlaybackError> {
    let pcm = device.open().map_err(|e| PlaybackError::DeviceOpen {
        device: device.name().to_string(),
        reason: e.to_string(),
    })?;
    let mut hw = Hardware::new(pcm, device.name());
    let pcm = hw.pcm_mut();

    pcm.set_access(Access::RwInterleaved)
        .map_err(|e| e.into_parameter(HwStep::Access))?;
    pcm.set_format(sample_format)
        .map_err(|e| e.into_parameter(HwStep::Format))?;
    pcm.set_channels(format.channels)
        .map_err(|e| e.into_parameter(HwStep::Channels))?;
    let actual_rate = pcm
        .set_rate_near(format.sample_rate)
        .map_err(|e| e.into_parameter(HwStep::Rate))?;
    if actual_rate != format.sample_rate {
        tracing::warn!(
            requested_hz = format.sample_rate,
            actual_hz = actual_rate,
            "device adjusted sample rate"
        );
    }
    pcm.commit().map_err(|e| e.into_parameter(HwStep::Commit))?;
    let period_frames = pcm
        .period_size()
        .map_err(|e| e.into_parameter(HwStep::PeriodSize))?
        .max(1);

    let config = HardwareConfig {
        sample_format,
        channels: format.channels,
        requested_rate: format.sample_rate,
        sample_rate: actual_rate,
        bytes_per_frame: format.bytes_per_frame(),
        period_frames,
    };
    tracing::info!(
        device = %device.name(),
        format = %sample_format,
        channels = format.channels,
        rate_hz = actual_rate,
        period_frames,
        "PCM device configured"
    );
    Ok((hw, config))
}
