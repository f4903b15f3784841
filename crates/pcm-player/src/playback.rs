//! Playback worker loop.
//!
//! Runs on the worker thread and owns the device for the whole session:
//!
//! `Configuring → Streaming → Draining → Terminated`
//!
//! - **Configuring**: negotiate the sample format, open and configure the sink.
//! - **Streaming**: pop chunks in order and write their whole frames. Xruns are recovered
//!   by re-preparing the device and writing the rest of the same chunk. Partial writes
//!   advance by the frames actually accepted.
//! - **Draining**: the queue is closed and empty; wait for the device to play out.
//! - **Terminated**: the [`Hardware`] guard is dropped on every exit path, which flushes
//!   (if not yet drained) and closes the device exactly once.

use std::sync::Arc;

use crate::config::{PlayerConfig, RemainderPolicy};
use crate::error::{PcmError, PlaybackError};
use crate::format::{AudioFormat, negotiate};
use crate::hardware::{self, Hardware, HardwareConfig};
use crate::pcm::{Pcm, PcmDevice};
use crate::queue::{StreamChunk, StreamQueue};
use crate::status::{PlaybackCounters, PlaybackSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Configuring,
    Streaming,
    Draining,
    Terminated,
}

/// One session's worth of playback: configure once, stream until closed, drain.
pub struct PlaybackLoop<D: PcmDevice> {
    device: D,
    format: AudioFormat,
    queue: Arc<StreamQueue>,
    config: PlayerConfig,
    counters: Arc<PlaybackCounters>,
    state: PlaybackState,
}

impl<D: PcmDevice> PlaybackLoop<D> {
    pub fn new(
        device: D,
        format: AudioFormat,
        queue: Arc<StreamQueue>,
        config: PlayerConfig,
        counters: Arc<PlaybackCounters>,
    ) -> Self {
        Self {
            device,
            format,
            queue,
            config,
            counters,
            state: PlaybackState::Configuring,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    /// Run the session to completion. Blocks the calling thread.
    ///
    /// Any terminal error closes the queue, so later pushes are refused.
    pub fn run(&mut self) -> Result<PlaybackSummary, PlaybackError> {
        let result = self.run_inner();
        if result.is_err() {
            self.queue.close();
        }
        self.transition(PlaybackState::Terminated);
        result
    }

    fn run_inner(&mut self) -> Result<PlaybackSummary, PlaybackError> {
        self.transition(PlaybackState::Configuring);
        let sample_format = negotiate(&self.format)?;
        let (mut hw, hw_config) = hardware::configure(&self.device, &self.format, sample_format)?;

        let result = self.stream(&mut hw, &hw_config);
        if result.is_err() {
            // Refuse new data before the release path flushes the device.
            self.queue.close();
        }
        drop(hw);
        result
    }

    fn stream<P: Pcm>(
        &mut self,
        hw: &mut Hardware<P>,
        hw_config: &HardwareConfig,
    ) -> Result<PlaybackSummary, PlaybackError> {
        self.transition(PlaybackState::Streaming);
        let mut writer = FrameWriter::new(hw_config, &self.config, self.counters.clone());
        while let Some(chunk) = self.queue.pop_blocking() {
            writer.write_chunk(hw, chunk)?;
        }

        self.transition(PlaybackState::Draining);
        writer.finish();
        hw.drain()
            .map_err(|e| PlaybackError::Write(format!("drain failed: {e}")))?;

        let summary = PlaybackSummary {
            sample_rate: hw_config.sample_rate,
            stats: self.counters.snapshot(),
        };
        tracing::info!(
            frames = summary.stats.frames_written,
            underruns = summary.stats.underruns,
            "playback drained"
        );
        Ok(summary)
    }

    fn transition(&mut self, next: PlaybackState) {
        tracing::debug!(from = ?self.state, to = ?next, "playback state");
        self.state = next;
    }
}

/// Turns byte chunks into device writes of whole frames.
struct FrameWriter {
    bytes_per_frame: usize,
    max_frames_per_write: usize,
    remainder: RemainderPolicy,
    carry: Vec<u8>,
    counters: Arc<PlaybackCounters>,
}

impl FrameWriter {
    fn new(hw: &HardwareConfig, config: &PlayerConfig, counters: Arc<PlaybackCounters>) -> Self {
        Self {
            bytes_per_frame: hw.bytes_per_frame.max(1),
            max_frames_per_write: hw.period_frames.saturating_mul(config.write_periods.max(1)),
            remainder: config.remainder,
            carry: Vec::new(),
            counters,
        }
    }

    fn write_chunk<P: Pcm>(
        &mut self,
        hw: &mut Hardware<P>,
        chunk: StreamChunk,
    ) -> Result<(), PlaybackError> {
        let bytes = if self.remainder == RemainderPolicy::Carry && !self.carry.is_empty() {
            let mut joined = std::mem::take(&mut self.carry);
            joined.extend_from_slice(chunk.as_bytes());
            joined
        } else {
            chunk.into_bytes()
        };

        let whole = bytes.len() - bytes.len() % self.bytes_per_frame;
        let tail = &bytes[whole..];
        if !tail.is_empty() {
            match self.remainder {
                RemainderPolicy::Carry => self.carry.extend_from_slice(tail),
                RemainderPolicy::Drop => {
                    tracing::debug!(bytes = tail.len(), "dropping partial frame at chunk end");
                    self.counters.add_discarded(tail.len());
                }
            }
        }

        self.write_frames(hw.pcm_mut(), &bytes[..whole])?;
        self.counters.add_chunk();
        Ok(())
    }

    /// Write whole frames, resuming after partial writes and recovered xruns.
    fn write_frames<P: Pcm>(&self, pcm: &mut P, data: &[u8]) -> Result<(), PlaybackError> {
        let mut offset = 0;
        while offset < data.len() {
            let pending = (data.len() - offset) / self.bytes_per_frame;
            let frames = pending.min(self.max_frames_per_write);
            match pcm.write_interleaved(&data[offset..], frames) {
                Ok(0) => {
                    return Err(PlaybackError::Write(
                        "device accepted no frames".to_string(),
                    ));
                }
                Ok(accepted) => {
                    let accepted = accepted.min(frames);
                    offset += accepted * self.bytes_per_frame;
                    self.counters.add_frames(accepted);
                }
                Err(PcmError::Xrun) => {
                    tracing::warn!(pending_frames = pending, "xrun, preparing PCM device");
                    self.counters.add_underrun();
                    pcm.prepare().map_err(|e| {
                        PlaybackError::Write(format!("can't recover from xrun: {e}"))
                    })?;
                }
                Err(e) => return Err(PlaybackError::Write(e.to_string())),
            }
        }
        Ok(())
    }

    /// Account for a carried partial frame that never got completed.
    fn finish(&mut self) {
        if !self.carry.is_empty() {
            tracing::warn!(
                bytes = self.carry.len(),
                "discarding incomplete frame at end of stream"
            );
            self.counters.add_discarded(self.carry.len());
            self.carry.clear();
        }
    }
}
