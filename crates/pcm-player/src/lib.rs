//! Streaming raw PCM playback to the default output device.
//!
//! Callers start a session with an [`AudioFormat`], push raw interleaved bytes with
//! [`Player::write`], and end it with [`Player::stop`]. A dedicated worker thread owns the
//! device and reports the outcome once through the completion callback.

pub mod config;
pub mod controller;
pub mod device;
pub mod error;
pub mod format;
pub mod hardware;
mod output;
pub mod pcm;
pub mod playback;
pub mod queue;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{PlayerConfig, RemainderPolicy};
pub use controller::{PlaybackResult, Player, SessionId};
pub use device::CpalDevice;
pub use error::{ControlError, FormatError, PlaybackError};
pub use format::{AudioFormat, SampleEncoding};
pub use queue::StreamChunk;
pub use status::{PlaybackStats, PlaybackSummary};

/// Player bound to the host's default cpal output device.
pub type DefaultPlayer = Player<CpalDevice>;
