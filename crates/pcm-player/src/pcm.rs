//! PCM device abstraction used by the playback worker.
//!
//! The worker only talks to the sink through these traits. They follow the shape of a
//! blocking PCM API: parameters are applied step by step and committed once, writes block
//! and may accept fewer frames than offered, and a stream discontinuity is reported as
//! [`PcmError::Xrun`] until the device is prepared again.
//!
//! Closing is `Drop`.

use crate::error::PcmError;
use crate::format::SampleFormat;

/// Name of the only sink the player ever opens.
pub const DEFAULT_DEVICE: &str = "default";

/// Sample layout in the write buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Samples of one frame are adjacent; the only layout the player writes.
    RwInterleaved,
}

/// Opens handles to a playback sink. Moved into the worker thread.
pub trait PcmDevice: Send + 'static {
    type Pcm: Pcm;

    fn name(&self) -> &str;

    /// Open the sink for playback.
    fn open(&self) -> Result<Self::Pcm, PcmError>;
}

/// An open playback handle. Lives on the worker thread only.
pub trait Pcm {
    fn set_access(&mut self, access: Access) -> Result<(), PcmError>;

    fn set_format(&mut self, format: SampleFormat) -> Result<(), PcmError>;

    fn set_channels(&mut self, channels: u32) -> Result<(), PcmError>;

    /// Request the supported rate nearest to `rate`; returns the rate actually chosen.
    fn set_rate_near(&mut self, rate: u32) -> Result<u32, PcmError>;

    /// Apply all parameters set so far.
    fn commit(&mut self) -> Result<(), PcmError>;

    /// Hardware period in frames. Only valid after [`Pcm::commit`].
    fn period_size(&self) -> Result<usize, PcmError>;

    /// Write up to `frames` interleaved frames from the front of `buf`.
    ///
    /// Blocks until at least one frame is accepted and returns the number accepted.
    fn write_interleaved(&mut self, buf: &[u8], frames: usize) -> Result<usize, PcmError>;

    /// Bring the stream back to the ready state after an xrun.
    fn prepare(&mut self) -> Result<(), PcmError>;

    /// Block until every frame already written has been rendered.
    fn drain(&mut self) -> Result<(), PcmError>;
}
