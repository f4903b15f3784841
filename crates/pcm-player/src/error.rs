//! Error taxonomy for the player.
//!
//! Errors split by *where* they surface:
//! - [`ControlError`] is returned synchronously from `start`/`write`/`stop`.
//! - [`PlaybackError`] is delivered once, asynchronously, through the completion callback.
//! - [`PcmError`] is what a [`crate::pcm::Pcm`] backend reports; the worker absorbs
//!   [`PcmError::Xrun`] and converts the rest into a [`PlaybackError`].

use thiserror::Error;

use crate::format::SampleEncoding;

/// Caller-supplied format descriptor failed shape validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("channel count {0} out of range (1..=8)")]
    Channels(u32),
    #[error("sample rate {0} Hz below minimum of 8000 Hz")]
    SampleRate(u32),
    #[error("bit depth {0} is not a multiple of 8")]
    BitDepth(u32),
    #[error("unknown encoding tag {0} (expected 1 = integer PCM or 3 = IEEE float)")]
    Encoding(u32),
}

/// Errors reported synchronously by the controller.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("invalid audio format: {0}")]
    InvalidFormat(#[from] FormatError),
    #[error("playback already started; stop it first")]
    AlreadyRunning,
    #[error("playback not active")]
    NotRunning,
    #[error("failed to spawn playback worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Hardware parameter step that was rejected while configuring the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwStep {
    Access,
    Format,
    Channels,
    Rate,
    Commit,
    PeriodSize,
}

impl std::fmt::Display for HwStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HwStep::Access => "interleaved access",
            HwStep::Format => "sample format",
            HwStep::Channels => "channel count",
            HwStep::Rate => "sample rate",
            HwStep::Commit => "hardware parameters",
            HwStep::PeriodSize => "period size",
        };
        f.write_str(name)
    }
}

/// Terminal error of a playback session, delivered through the completion callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("unsupported {encoding} bit depth: {bit_depth}")]
    UnsupportedFormat {
        encoding: SampleEncoding,
        bit_depth: u32,
    },
    #[error("can't open PCM device {device}: {reason}")]
    DeviceOpen { device: String, reason: String },
    #[error("can't set {step}: {reason}")]
    Parameter { step: HwStep, reason: String },
    #[error("error writing to PCM device: {0}")]
    Write(String),
}

/// Error reported by a PCM backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PcmError {
    /// Stream discontinuity (underrun/overrun); cleared by `prepare`.
    #[error("xrun")]
    Xrun,
    #[error("no such device: {0}")]
    NotFound(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("{0}")]
    Io(String),
}

impl PcmError {
    pub(crate) fn into_parameter(self, step: HwStep) -> PlaybackError {
        PlaybackError::Parameter {
            step,
            reason: self.to_string(),
        }
    }
}
