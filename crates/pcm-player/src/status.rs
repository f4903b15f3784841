use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters updated by the playback worker and readable from the caller thread.
#[derive(Debug, Default)]
pub struct PlaybackCounters {
    /// Frames accepted by the device.
    frames_written: AtomicU64,
    /// Chunks fully handed to the device.
    chunks_rendered: AtomicU64,
    /// Xruns recovered by re-preparing the device.
    underruns: AtomicU64,
    /// Sub-frame bytes that never reached the device.
    bytes_discarded: AtomicU64,
}

impl PlaybackCounters {
    /// Create a counter set that can be shared between threads.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn add_frames(&self, frames: usize) {
        self.frames_written.fetch_add(frames as u64, Ordering::Relaxed);
    }

    pub(crate) fn add_chunk(&self) {
        self.chunks_rendered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_underrun(&self) {
        self.underruns.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_discarded(&self, bytes: usize) {
        if bytes > 0 {
            self.bytes_discarded.fetch_add(bytes as u64, Ordering::Relaxed);
        }
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> PlaybackStats {
        PlaybackStats {
            frames_written: self.frames_written.load(Ordering::Relaxed),
            chunks_rendered: self.chunks_rendered.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            bytes_discarded: self.bytes_discarded.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of [`PlaybackCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub frames_written: u64,
    pub chunks_rendered: u64,
    pub underruns: u64,
    pub bytes_discarded: u64,
}

/// Success payload of the completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackSummary {
    /// Rate the device actually ran at (may differ from the requested one).
    pub sample_rate: u32,
    pub stats: PlaybackStats,
}

impl PlaybackSummary {
    /// Rendered duration in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.stats.frames_written.saturating_mul(1000) / self.sample_rate as u64
    }
}

impl fmt::Display for PlaybackSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Playback finished: {} frames ({} ms) at {} Hz, {} underruns recovered",
            self.stats.frames_written,
            self.elapsed_ms(),
            self.sample_rate,
            self.stats.underruns
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_updates() {
        let counters = PlaybackCounters::shared();
        counters.add_frames(250);
        counters.add_frames(6);
        counters.add_chunk();
        counters.add_underrun();
        counters.add_discarded(0);
        counters.add_discarded(3);

        let snap = counters.snapshot();
        assert_eq!(snap.frames_written, 256);
        assert_eq!(snap.chunks_rendered, 1);
        assert_eq!(snap.underruns, 1);
        assert_eq!(snap.bytes_discarded, 3);
    }

    #[test]
    fn summary_reports_elapsed() {
        let summary = PlaybackSummary {
            sample_rate: 48_000,
            stats: PlaybackStats {
                frames_written: 96_000,
                ..PlaybackStats::default()
            },
        };
        assert_eq!(summary.elapsed_ms(), 2000);
        assert!(summary.to_string().starts_with("Playback finished"));
    }

    #[test]
    fn summary_handles_zero_rate() {
        let summary = PlaybackSummary {
            sample_rate: 0,
            stats: PlaybackStats::default(),
        };
        assert_eq!(summary.elapsed_ms(), 0);
    }
}
