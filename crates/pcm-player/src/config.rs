use std::time::Duration;

/// What to do with bytes at the end of a chunk that do not fill a whole frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RemainderPolicy {
    /// Prepend the leftover bytes to the next chunk, so frames may straddle writes.
    #[default]
    Carry,
    /// Discard the leftover bytes at every chunk boundary.
    Drop,
}

/// Player tuning parameters shared by the worker and the cpal backend.
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// Upper bound for a single device write, in hardware periods.
    pub write_periods: usize,
    /// Handling of sub-frame bytes at chunk boundaries.
    pub remainder: RemainderPolicy,
    /// Depth of the cpal backend's frame ring, in periods.
    pub buffer_periods: usize,
    /// Period size requested from the cpal backend when the device leaves it open.
    pub period_frames: u32,
    /// Give up waiting for the device to play out buffered audio after this long.
    pub drain_timeout: Duration,
}

impl Default for PlayerConfig {
    /// Defaults tuned for low-risk playback across common devices.
    fn default() -> Self {
        Self {
            write_periods: 4,
            remainder: RemainderPolicy::Carry,
            buffer_periods: 8,
            period_frames: 1024,
            drain_timeout: Duration::from_secs(10),
        }
    }
}
