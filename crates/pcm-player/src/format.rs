//! Caller format descriptors and hardware sample-format negotiation.
//!
//! [`AudioFormat`] is what a caller hands to `start`. [`negotiate`] is a pure mapping from it
//! to the [`SampleFormat`] the sink is configured with; it holds no state and touches nothing.

use std::fmt;

use crate::error::{FormatError, PlaybackError};

/// Lowest sample rate accepted from callers.
pub const MIN_SAMPLE_RATE: u32 = 8_000;
/// Highest channel count accepted from callers.
pub const MAX_CHANNELS: u32 = 8;

/// Sample encoding of the caller's byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleEncoding {
    /// Linear signed integer samples (WAVE tag 1).
    IntegerPcm,
    /// IEEE floating point samples (WAVE tag 3).
    IeeeFloat,
}

impl SampleEncoding {
    /// Map a WAVE format tag to an encoding.
    pub fn from_tag(tag: u32) -> Result<Self, FormatError> {
        match tag {
            1 => Ok(SampleEncoding::IntegerPcm),
            3 => Ok(SampleEncoding::IeeeFloat),
            other => Err(FormatError::Encoding(other)),
        }
    }

    pub fn tag(self) -> u32 {
        match self {
            SampleEncoding::IntegerPcm => 1,
            SampleEncoding::IeeeFloat => 3,
        }
    }
}

impl fmt::Display for SampleEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleEncoding::IntegerPcm => f.write_str("integer PCM"),
            SampleEncoding::IeeeFloat => f.write_str("IEEE float"),
        }
    }
}

/// Format descriptor supplied by the caller. Samples are little-endian and interleaved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub encoding: SampleEncoding,
    pub sample_rate: u32,
    pub channels: u32,
    pub bit_depth: u32,
}

impl AudioFormat {
    pub fn new(encoding: SampleEncoding, sample_rate: u32, channels: u32, bit_depth: u32) -> Self {
        Self {
            encoding,
            sample_rate,
            channels,
            bit_depth,
        }
    }

    /// Build a descriptor from the numeric boundary form `{tag, rate, channels, bits}`.
    pub fn from_wave_tag(
        tag: u32,
        sample_rate: u32,
        channels: u32,
        bit_depth: u32,
    ) -> Result<Self, FormatError> {
        Ok(Self::new(
            SampleEncoding::from_tag(tag)?,
            sample_rate,
            channels,
            bit_depth,
        ))
    }

    /// Shape validation done synchronously by `start`.
    ///
    /// This does not check the encoding/bit depth combination; that is [`negotiate`]'s job
    /// and fails the session asynchronously.
    pub fn validate(&self) -> Result<(), FormatError> {
        if self.channels < 1 || self.channels > MAX_CHANNELS {
            return Err(FormatError::Channels(self.channels));
        }
        if self.sample_rate < MIN_SAMPLE_RATE {
            return Err(FormatError::SampleRate(self.sample_rate));
        }
        if self.bit_depth == 0 || self.bit_depth % 8 != 0 {
            return Err(FormatError::BitDepth(self.bit_depth));
        }
        Ok(())
    }

    /// Bytes in one interleaved frame: `channels * bit_depth / 8`.
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * (self.bit_depth as usize / 8)
    }
}

/// Hardware sample format the sink is configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    S16Le,
    /// 24-bit signed integer packed in 3 bytes.
    S24Le3,
    S32Le,
    F32Le,
    F64Le,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16Le => 2,
            SampleFormat::S24Le3 => 3,
            SampleFormat::S32Le => 4,
            SampleFormat::F32Le => 4,
            SampleFormat::F64Le => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SampleFormat::S16Le => "S16_LE",
            SampleFormat::S24Le3 => "S24_3LE",
            SampleFormat::S32Le => "S32_LE",
            SampleFormat::F32Le => "FLOAT_LE",
            SampleFormat::F64Le => "FLOAT64_LE",
        }
    }

    /// Decode one sample from `bytes` (exactly [`Self::bytes_per_sample`] long) to `f32`
    /// in `[-1.0, 1.0]`.
    pub fn decode_f32(self, bytes: &[u8]) -> f32 {
        match self {
            SampleFormat::S16Le => i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32_768.0,
            SampleFormat::S24Le3 => {
                // Place the 3 bytes in the high end and shift back to sign-extend.
                let v = i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8;
                v as f32 / 8_388_608.0
            }
            SampleFormat::S32Le => {
                i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32
                    / 2_147_483_648.0
            }
            SampleFormat::F32Le => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            SampleFormat::F64Le => {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[..8]);
                f64::from_le_bytes(raw) as f32
            }
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Map a caller format to the hardware sample format.
///
/// Supported combinations: integer 16/24/32 and float 32/64. Integer 24-bit maps to the
/// 3-byte packed format, so callers must pre-pack 24-bit samples.
pub fn negotiate(format: &AudioFormat) -> Result<SampleFormat, PlaybackError> {
    let sample = match (format.encoding, format.bit_depth) {
        (SampleEncoding::IntegerPcm, 16) => SampleFormat::S16Le,
        (SampleEncoding::IntegerPcm, 24) => SampleFormat::S24Le3,
        (SampleEncoding::IntegerPcm, 32) => SampleFormat::S32Le,
        (SampleEncoding::IeeeFloat, 32) => SampleFormat::F32Le,
        (SampleEncoding::IeeeFloat, 64) => SampleFormat::F64Le,
        (encoding, bit_depth) => {
            return Err(PlaybackError::UnsupportedFormat {
                encoding,
                bit_depth,
            });
        }
    };
    Ok(sample)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm(channels: u32, rate: u32, bits: u32) -> AudioFormat {
        AudioFormat::new(SampleEncoding::IntegerPcm, rate, channels, bits)
    }

    #[test]
    fn validate_accepts_boundaries() {
        assert!(pcm(1, 8_000, 16).validate().is_ok());
        assert!(pcm(8, 192_000, 32).validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_shape() {
        assert_eq!(pcm(0, 44_100, 16).validate(), Err(FormatError::Channels(0)));
        assert_eq!(pcm(9, 44_100, 16).validate(), Err(FormatError::Channels(9)));
        assert_eq!(pcm(2, 7_999, 16).validate(), Err(FormatError::SampleRate(7_999)));
        assert_eq!(pcm(2, 44_100, 12).validate(), Err(FormatError::BitDepth(12)));
        assert_eq!(pcm(2, 44_100, 0).validate(), Err(FormatError::BitDepth(0)));
    }

    #[test]
    fn from_wave_tag_maps_known_tags() {
        let f = AudioFormat::from_wave_tag(3, 48_000, 2, 32).unwrap();
        assert_eq!(f.encoding, SampleEncoding::IeeeFloat);
        assert_eq!(f.encoding.tag(), 3);
        assert_eq!(
            AudioFormat::from_wave_tag(2, 48_000, 2, 16),
            Err(FormatError::Encoding(2))
        );
    }

    #[test]
    fn bytes_per_frame_uses_channels_and_depth() {
        assert_eq!(pcm(2, 44_100, 16).bytes_per_frame(), 4);
        assert_eq!(pcm(6, 48_000, 24).bytes_per_frame(), 18);
    }

    #[test]
    fn negotiate_supported_table() {
        let float = |bits| AudioFormat::new(SampleEncoding::IeeeFloat, 48_000, 2, bits);
        assert_eq!(negotiate(&pcm(2, 48_000, 16)), Ok(SampleFormat::S16Le));
        assert_eq!(negotiate(&pcm(2, 48_000, 24)), Ok(SampleFormat::S24Le3));
        assert_eq!(negotiate(&pcm(2, 48_000, 32)), Ok(SampleFormat::S32Le));
        assert_eq!(negotiate(&float(32)), Ok(SampleFormat::F32Le));
        assert_eq!(negotiate(&float(64)), Ok(SampleFormat::F64Le));
    }

    #[test]
    fn negotiate_rejects_unsupported_depths() {
        assert_eq!(
            negotiate(&pcm(2, 48_000, 8)),
            Err(PlaybackError::UnsupportedFormat {
                encoding: SampleEncoding::IntegerPcm,
                bit_depth: 8,
            })
        );
        let float16 = AudioFormat::new(SampleEncoding::IeeeFloat, 48_000, 2, 16);
        assert!(matches!(
            negotiate(&float16),
            Err(PlaybackError::UnsupportedFormat { bit_depth: 16, .. })
        ));
    }

    #[test]
    fn packed_24_bit_matches_frame_geometry() {
        let f = pcm(2, 48_000, 24);
        let sample = negotiate(&f).unwrap();
        assert_eq!(sample.bytes_per_sample() * 2, f.bytes_per_frame());
    }

    #[test]
    fn decode_f32_scales_integer_formats() {
        assert_eq!(SampleFormat::S16Le.decode_f32(&i16::MIN.to_le_bytes()), -1.0);
        assert_eq!(SampleFormat::S16Le.decode_f32(&[0, 0x40]), 0.5);
        assert_eq!(SampleFormat::S24Le3.decode_f32(&[0, 0, 0x80]), -1.0);
        assert_eq!(SampleFormat::S24Le3.decode_f32(&[0, 0, 0x40]), 0.5);
        assert_eq!(SampleFormat::S32Le.decode_f32(&i32::MIN.to_le_bytes()), -1.0);
    }

    #[test]
    fn decode_f32_passes_floats_through() {
        assert_eq!(SampleFormat::F32Le.decode_f32(&0.25f32.to_le_bytes()), 0.25);
        assert_eq!(SampleFormat::F64Le.decode_f32(&(-0.5f64).to_le_bytes()), -0.5);
    }
}
