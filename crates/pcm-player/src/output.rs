//! Output stage of the cpal backend.
//!
//! Bridges the blocking PCM write model onto cpal's pull-based output callback:
//! - [`FrameRing`] holds raw interleaved frames in the negotiated sample format. Writers
//!   block while it is full; the callback drains it.
//! - The callback decodes frames to `f32`, applies basic channel mapping (mono↔stereo,
//!   best-effort otherwise) and converts to the device sample type.
//! - When the callback runs dry after data has started flowing, the ring enters the xrun
//!   state; the next write reports [`PcmError::Xrun`] until [`FrameRing::prepare`].
//!
//! ## Real-time constraints
//! The callback only takes the ring lock for the copy and never waits on the condition
//! variable. Missing frames are filled with silence.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use cpal::traits::DeviceTrait;

use crate::error::PcmError;
use crate::format::{MAX_CHANNELS, SampleFormat};

/// Largest frame the ring handles: 8 channels of 64-bit float.
const MAX_FRAME_BYTES: usize = MAX_CHANNELS as usize * 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RingState {
    /// Ready; an empty ring is not an underrun yet.
    Prepared,
    /// Data has been written since the last prepare.
    Running,
    /// The callback ran out of frames while running.
    Xrun,
}

struct RingInner {
    bytes: VecDeque<u8>,
    state: RingState,
    failure: Option<String>,
}

/// Bounded byte ring of whole interleaved frames shared with the output callback.
pub(crate) struct FrameRing {
    sample_format: SampleFormat,
    channels: usize,
    bytes_per_frame: usize,
    capacity_bytes: usize,
    inner: Mutex<RingInner>,
    cv: Condvar,
}

impl FrameRing {
    pub(crate) fn new(sample_format: SampleFormat, channels: usize, capacity_frames: usize) -> Self {
        let channels = channels.clamp(1, MAX_CHANNELS as usize);
        let bytes_per_frame = sample_format.bytes_per_sample() * channels;
        let capacity_bytes = capacity_frames.max(1) * bytes_per_frame;
        Self {
            sample_format,
            channels,
            bytes_per_frame,
            capacity_bytes,
            inner: Mutex::new(RingInner {
                bytes: VecDeque::with_capacity(capacity_bytes),
                state: RingState::Prepared,
                failure: None,
            }),
            cv: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RingInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn channels(&self) -> usize {
        self.channels
    }

    /// Queue up to `frames` whole frames from `buf`, blocking while the ring is full.
    ///
    /// Returns the number of frames accepted, which may be fewer than offered.
    pub(crate) fn write(&self, buf: &[u8], frames: usize) -> Result<usize, PcmError> {
        let want = frames.min(buf.len() / self.bytes_per_frame);
        if want == 0 {
            return Ok(0);
        }

        let mut g = self.lock();
        let free = loop {
            if let Some(reason) = &g.failure {
                return Err(PcmError::Io(reason.clone()));
            }
            if g.state == RingState::Xrun {
                return Err(PcmError::Xrun);
            }
            let free = (self.capacity_bytes - g.bytes.len()) / self.bytes_per_frame;
            if free > 0 {
                break free;
            }
            g = self.cv.wait(g).unwrap_or_else(|poisoned| poisoned.into_inner());
        };

        let accepted = want.min(free);
        g.bytes.extend(&buf[..accepted * self.bytes_per_frame]);
        g.state = RingState::Running;
        Ok(accepted)
    }

    /// Leave the xrun state so writes are accepted again.
    pub(crate) fn prepare(&self) {
        let mut g = self.lock();
        g.state = RingState::Prepared;
        drop(g);
        self.cv.notify_all();
    }

    /// Record a fatal stream error; pending and future writes fail with it.
    pub(crate) fn fail(&self, reason: String) {
        let mut g = self.lock();
        g.failure.get_or_insert(reason);
        drop(g);
        self.cv.notify_all();
    }

    /// Block until the callback has consumed every queued frame.
    pub(crate) fn drain(&self, timeout: Duration) -> Result<(), PcmError> {
        let deadline = Instant::now() + timeout;
        let mut g = self.lock();
        loop {
            if let Some(reason) = &g.failure {
                return Err(PcmError::Io(reason.clone()));
            }
            if g.bytes.is_empty() {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(PcmError::Io(format!(
                    "drain timed out with {} frames pending",
                    g.bytes.len() / self.bytes_per_frame
                )));
            }
            let wait = (deadline - now).min(Duration::from_millis(50));
            let (ng, _timeout) = self
                .cv
                .wait_timeout(g, wait)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            g = ng;
        }
    }

    /// Callback side: decode up to `max_frames` frames into `out` as interleaved `f32`.
    ///
    /// Returns the number of frames produced. Running dry while in the running state flips
    /// the ring into xrun.
    pub(crate) fn pop_frames(&self, max_frames: usize, out: &mut Vec<f32>) -> usize {
        out.clear();
        let bps = self.sample_format.bytes_per_sample();
        let mut frame = [0u8; MAX_FRAME_BYTES];
        let mut g = self.lock();

        let available = g.bytes.len() / self.bytes_per_frame;
        let take = available.min(max_frames);
        for _ in 0..take {
            for (slot, byte) in frame.iter_mut().zip(g.bytes.drain(..self.bytes_per_frame)) {
                *slot = byte;
            }
            for ch in 0..self.channels {
                out.push(self.sample_format.decode_f32(&frame[ch * bps..(ch + 1) * bps]));
            }
        }
        if take < max_frames && g.state == RingState::Running {
            g.state = RingState::Xrun;
        }
        drop(g);
        self.cv.notify_all();
        take
    }
}

/// Build and return a cpal output stream that renders from `ring`.
///
/// The device sample type is chosen from `sample_format`; frames in the ring are converted
/// on the fly.
pub(crate) fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    ring: &Arc<FrameRing>,
) -> Result<cpal::Stream, PcmError> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, ring),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, ring),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, ring),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, ring),
        other => Err(PcmError::Rejected(format!(
            "unsupported device sample format: {other:?}"
        ))),
    }
}

/// Type-specialized stream builder for cpal sample formats.
fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ring: &Arc<FrameRing>,
) -> Result<cpal::Stream, PcmError>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = (config.channels as usize).max(1);
    let src_channels = ring.channels();
    let ring_cb = ring.clone();
    let ring_err = ring.clone();
    let mut scratch: Vec<f32> = Vec::new();

    let err_fn = move |err: cpal::StreamError| {
        tracing::warn!("stream error: {err}");
        ring_err.fail(err.to_string());
    };

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                let frames = data.len() / channels_out;
                let got = ring_cb.pop_frames(frames, &mut scratch);
                for frame in 0..got {
                    let src = &scratch[frame * src_channels..(frame + 1) * src_channels];
                    for ch in 0..channels_out {
                        data[frame * channels_out + ch] =
                            <T as cpal::Sample>::from_sample::<f32>(map_channel(src, channels_out, ch));
                    }
                }
                for sample in &mut data[got * channels_out..] {
                    *sample = <T as cpal::Sample>::from_sample::<f32>(0.0);
                }
            },
            err_fn,
            None,
        )
        .map_err(|e| PcmError::Rejected(e.to_string()))?;

    Ok(stream)
}

/// Output sample for `dst_ch` from one source frame.
///
/// Mapping rules:
/// - mono → stereo: duplicate channel 0
/// - stereo → mono: average L/R
/// - other layouts: best-effort “clamp to available channels”
fn map_channel(src: &[f32], dst_channels: usize, dst_ch: usize) -> f32 {
    let get = |ch: usize| src.get(ch).copied().unwrap_or(0.0);
    match (src.len(), dst_channels) {
        (1, _) => get(0),
        (2, 1) => 0.5 * (get(0) + get(1)),
        (n, _) => get(dst_ch.min(n.saturating_sub(1))),
    }
}
