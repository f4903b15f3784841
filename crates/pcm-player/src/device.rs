//! cpal implementation of the PCM device traits.
//!
//! Thin wrapper around the host's default output device:
//! - parameters are collected step by step and turned into a cpal stream on `commit`
//! - the rate request picks the nearest rate the device supports
//! - writes go through a [`FrameRing`] drained by the output callback

use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::config::PlayerConfig;
use crate::error::PcmError;
use crate::format::{MAX_CHANNELS, SampleFormat};
use crate::output::{self, FrameRing};
use crate::pcm::{Access, DEFAULT_DEVICE, Pcm, PcmDevice};

/// Backend knobs taken from [`PlayerConfig`].
#[derive(Clone, Debug)]
struct CpalOptions {
    period_frames: u32,
    buffer_periods: usize,
    drain_timeout: Duration,
}

/// The host's default output device.
#[derive(Clone, Debug)]
pub struct CpalDevice {
    options: CpalOptions,
}

impl CpalDevice {
    pub fn new(config: &PlayerConfig) -> Self {
        Self {
            options: CpalOptions {
                period_frames: config.period_frames.max(1),
                buffer_periods: config.buffer_periods.max(2),
                drain_timeout: config.drain_timeout,
            },
        }
    }
}

impl Default for CpalDevice {
    fn default() -> Self {
        Self::new(&PlayerConfig::default())
    }
}

impl PcmDevice for CpalDevice {
    type Pcm = CpalPcm;

    fn name(&self) -> &str {
        DEFAULT_DEVICE
    }

    fn open(&self) -> Result<CpalPcm, PcmError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PcmError::NotFound("no default output device".to_string()))?;
        let ranges: Vec<cpal::SupportedStreamConfigRange> = device
            .supported_output_configs()
            .map_err(|e| PcmError::Io(e.to_string()))?
            .collect();
        let description = device
            .description()
            .map(|d| d.to_string())
            .unwrap_or_else(|_| DEFAULT_DEVICE.to_string());
        tracing::info!(device = %description, configs = ranges.len(), "output device opened");

        Ok(CpalPcm {
            device,
            ranges,
            options: self.options.clone(),
            format: None,
            channels: None,
            chosen: None,
            running: None,
        })
    }
}

/// Stream state that only exists after `commit`.
struct RunningStream {
    ring: Arc<FrameRing>,
    period_frames: usize,
    sample_rate: u32,
    _stream: cpal::Stream,
}

/// Open handle on the default cpal output device.
pub struct CpalPcm {
    device: cpal::Device,
    ranges: Vec<cpal::SupportedStreamConfigRange>,
    options: CpalOptions,
    format: Option<SampleFormat>,
    channels: Option<u32>,
    chosen: Option<cpal::SupportedStreamConfig>,
    running: Option<RunningStream>,
}

impl CpalPcm {
    fn running(&self) -> Result<&RunningStream, PcmError> {
        self.running
            .as_ref()
            .ok_or_else(|| PcmError::Io("stream not started".to_string()))
    }
}

impl Pcm for CpalPcm {
    fn set_access(&mut self, access: Access) -> Result<(), PcmError> {
        // cpal output buffers are always interleaved.
        let Access::RwInterleaved = access;
        Ok(())
    }

    fn set_format(&mut self, format: SampleFormat) -> Result<(), PcmError> {
        // Every negotiated format is converted in the output callback.
        self.format = Some(format);
        Ok(())
    }

    fn set_channels(&mut self, channels: u32) -> Result<(), PcmError> {
        if channels == 0 || channels > MAX_CHANNELS {
            return Err(PcmError::Rejected(format!("{channels} channels")));
        }
        self.channels = Some(channels);
        Ok(())
    }

    fn set_rate_near(&mut self, rate: u32) -> Result<u32, PcmError> {
        let channels = self
            .channels
            .ok_or_else(|| PcmError::Rejected("channels not set".to_string()))?;
        let chosen = match pick_output_config(&self.ranges, channels, rate) {
            Some(cfg) => cfg,
            None => self
                .device
                .default_output_config()
                .map_err(|e| PcmError::Rejected(e.to_string()))?,
        };
        let actual = chosen.sample_rate();
        self.chosen = Some(chosen);
        Ok(actual)
    }

    fn commit(&mut self) -> Result<(), PcmError> {
        let format = self
            .format
            .ok_or_else(|| PcmError::Rejected("sample format not set".to_string()))?;
        let channels = self
            .channels
            .ok_or_else(|| PcmError::Rejected("channels not set".to_string()))?;
        let chosen = self
            .chosen
            .clone()
            .ok_or_else(|| PcmError::Rejected("sample rate not set".to_string()))?;

        let mut stream_config: cpal::StreamConfig = chosen.clone().into();
        let (buffer_size, period_frames) =
            pick_buffer_size(chosen.buffer_size(), self.options.period_frames);
        if let Some(buf) = buffer_size {
            stream_config.buffer_size = buf;
        }

        let capacity = period_frames as usize * self.options.buffer_periods;
        let ring = Arc::new(FrameRing::new(format, channels as usize, capacity));
        let stream =
            output::build_output_stream(&self.device, &stream_config, chosen.sample_format(), &ring)?;
        stream.play().map_err(|e| PcmError::Io(e.to_string()))?;

        tracing::info!(
            source_channels = channels,
            device_channels = stream_config.channels,
            device_format = ?chosen.sample_format(),
            rate_hz = stream_config.sample_rate,
            buffer_size = ?stream_config.buffer_size,
            ring_frames = capacity,
            "output stream started"
        );

        self.running = Some(RunningStream {
            ring,
            period_frames: period_frames as usize,
            sample_rate: stream_config.sample_rate,
            _stream: stream,
        });
        Ok(())
    }

    fn period_size(&self) -> Result<usize, PcmError> {
        Ok(self.running()?.period_frames)
    }

    fn write_interleaved(&mut self, buf: &[u8], frames: usize) -> Result<usize, PcmError> {
        self.running()?.ring.write(buf, frames)
    }

    fn prepare(&mut self) -> Result<(), PcmError> {
        self.running()?.ring.prepare();
        Ok(())
    }

    fn drain(&mut self) -> Result<(), PcmError> {
        let Some(running) = self.running.as_ref() else {
            return Ok(());
        };
        running.ring.drain(self.options.drain_timeout)?;
        // The last callback buffer is still playing once the ring is empty.
        let tail = Duration::from_secs_f64(
            running.period_frames as f64 * 2.0 / running.sample_rate.max(1) as f64,
        );
        std::thread::sleep(tail);
        Ok(())
    }
}

/// Choose the output config closest to the requested channel count and rate.
///
/// Preference order: exact channel count, then stereo (mapped in the callback), then
/// anything; within that, the rate nearest to `target_rate`; then the sample format rank.
fn pick_output_config(
    ranges: &[cpal::SupportedStreamConfigRange],
    channels: u32,
    target_rate: u32,
) -> Option<cpal::SupportedStreamConfig> {
    let mut best: Option<(Candidate, cpal::SupportedStreamConfig)> = None;

    for range in ranges {
        let format_rank = sample_format_rank(range.sample_format());
        if format_rank >= UNSUPPORTED_RANK {
            continue;
        }
        let rate = pick_rate_for_range(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let candidate = Candidate {
            channel_score: channel_score(range.channels() as u32, channels),
            distance: rate.abs_diff(target_rate),
            format_rank,
        };
        let replace = match &best {
            None => true,
            Some((b, _)) => is_better_candidate(candidate, *b),
        };
        if replace {
            best = Some((candidate, range.clone().with_sample_rate(rate)));
        }
    }

    best.map(|(_, cfg)| cfg)
}

/// Prefer a fixed buffer of `preferred` frames, clamped to what the device advertises.
///
/// Returns the buffer size to request (`None` keeps the device default) and the period
/// in frames the rest of the backend should assume.
fn pick_buffer_size(
    supported: &cpal::SupportedBufferSize,
    preferred: u32,
) -> (Option<cpal::BufferSize>, u32) {
    match supported {
        cpal::SupportedBufferSize::Range { min, max } => {
            let chosen = preferred.clamp(*min, (*max).max(*min)).max(1);
            (Some(cpal::BufferSize::Fixed(chosen)), chosen)
        }
        cpal::SupportedBufferSize::Unknown => (None, preferred),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Candidate {
    channel_score: u8,
    distance: u32,
    format_rank: u8,
}

const UNSUPPORTED_RANK: u8 = 10;

fn channel_score(device: u32, wanted: u32) -> u8 {
    if device == wanted {
        0
    } else if device == 2 {
        1
    } else {
        2
    }
}

fn pick_rate_for_range(min: u32, max: u32, target: u32) -> u32 {
    if target >= min && target <= max {
        target
    } else if target < min {
        min
    } else {
        max
    }
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => UNSUPPORTED_RANK,
    }
}

fn is_better_candidate(candidate: Candidate, best: Candidate) -> bool {
    if candidate.channel_score != best.channel_score {
        candidate.channel_score < best.channel_score
    } else if candidate.distance != best.distance {
        candidate.distance < best.distance
    } else {
        candidate.format_rank < best.format_rank
    }
}
