//! Byte sources feeding the player.
//!
//! Raw input is read in fixed-size chunks with no alignment. WAV input is demuxed with
//! Symphonia and each packet's payload is forwarded untouched; nothing is decoded.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use pcm_player::{AudioFormat, SampleEncoding};
use symphonia::core::codecs::{
    CODEC_TYPE_PCM_F32LE, CODEC_TYPE_PCM_F64LE, CODEC_TYPE_PCM_S16LE, CODEC_TYPE_PCM_S24LE,
    CODEC_TYPE_PCM_S32LE, CODEC_TYPE_PCM_U8, CodecParameters,
};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Produces the next run of raw PCM bytes, or `None` at end of input.
pub trait ChunkSource {
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;
}

/// Fixed-size reads from any byte stream.
pub struct RawSource<R> {
    reader: R,
    chunk_bytes: usize,
}

impl<R: Read> RawSource<R> {
    pub fn new(reader: R, chunk_bytes: usize) -> Self {
        Self {
            reader,
            chunk_bytes: chunk_bytes.max(1),
        }
    }
}

impl<R: Read> ChunkSource for RawSource<R> {
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.chunk_bytes];
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("read input"),
            }
        }
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        Ok(Some(buf))
    }
}

/// Packet payloads of the default track of a WAV stream.
pub struct WavSource {
    reader: Box<dyn FormatReader>,
    track_id: u32,
}

impl WavSource {
    pub fn open(path: &Path) -> Result<(AudioFormat, Self)> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        let mut hint = Hint::new();
        hint.with_extension("wav");
        Self::from_media_source(Box::new(file), hint)
    }

    pub fn from_media_source(
        source: Box<dyn MediaSource>,
        hint: Hint,
    ) -> Result<(AudioFormat, Self)> {
        let mss = MediaSourceStream::new(source, Default::default());
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .context("probe input")?;
        let reader = probed.format;
        let track = reader
            .default_track()
            .ok_or_else(|| anyhow!("no default audio track"))?;
        let format = wav_format(&track.codec_params)?;
        let track_id = track.id;
        tracing::info!(
            encoding = %format.encoding,
            rate_hz = format.sample_rate,
            channels = format.channels,
            bit_depth = format.bit_depth,
            "source (wav)"
        );
        Ok((format, Self { reader, track_id }))
    }
}

impl ChunkSource for WavSource {
    fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(None),
                Err(e) => return Err(e).context("read wav packet"),
            };
            if packet.track_id() != self.track_id {
                continue;
            }
            return Ok(Some(packet.buf().to_vec()));
        }
    }
}

/// Describe a WAV track as a player format. Only PCM payloads can be forwarded as is.
fn wav_format(params: &CodecParameters) -> Result<AudioFormat> {
    let (encoding, bits) = match params.codec {
        CODEC_TYPE_PCM_U8 => (SampleEncoding::IntegerPcm, 8),
        CODEC_TYPE_PCM_S16LE => (SampleEncoding::IntegerPcm, 16),
        CODEC_TYPE_PCM_S24LE => (SampleEncoding::IntegerPcm, 24),
        CODEC_TYPE_PCM_S32LE => (SampleEncoding::IntegerPcm, 32),
        CODEC_TYPE_PCM_F32LE => (SampleEncoding::IeeeFloat, 32),
        CODEC_TYPE_PCM_F64LE => (SampleEncoding::IeeeFloat, 64),
        other => bail!("unsupported wav codec {other:?}; only PCM and IEEE float can be played"),
    };
    let channels = params
        .channels
        .ok_or_else(|| anyhow!("unknown channel count"))?
        .count() as u32;
    let rate = params
        .sample_rate
        .ok_or_else(|| anyhow!("unknown sample rate"))?;
    Ok(AudioFormat::new(encoding, rate, channels, bits))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn wav_bytes(tag: u16, channels: u16, rate: u32, bits: u16, data: &[u8]) -> Vec<u8> {
        let block_align = channels * bits / 8;
        let mut out = Vec::new();
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data.len() as u32).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&tag.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&rate.to_le_bytes());
        out.extend_from_slice(&(rate * block_align as u32).to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&bits.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(data);
        out
    }

    fn drain(source: &mut dyn ChunkSource) -> Vec<Vec<u8>> {
        let mut chunks = Vec::new();
        while let Some(chunk) = source.next_chunk().unwrap() {
            chunks.push(chunk);
        }
        chunks
    }

    #[test]
    fn raw_source_splits_without_alignment() {
        let data: Vec<u8> = (0..10u8).collect();
        let mut source = RawSource::new(Cursor::new(data.clone()), 3);
        let chunks = drain(&mut source);
        assert_eq!(chunks.iter().map(Vec::len).collect::<Vec<_>>(), vec![3, 3, 3, 1]);
        assert_eq!(chunks.concat(), data);
    }

    #[test]
    fn raw_source_empty_input() {
        let mut source = RawSource::new(Cursor::new(Vec::new()), 16);
        assert!(source.next_chunk().unwrap().is_none());
    }

    #[test]
    fn wav_source_forwards_payload_bytes() {
        let data: Vec<u8> = (0..4000u32).map(|i| (i * 7 % 256) as u8).collect();
        let bytes = wav_bytes(1, 2, 44_100, 16, &data);
        let (format, mut source) =
            WavSource::from_media_source(Box::new(Cursor::new(bytes)), Hint::new()).unwrap();

        assert_eq!(
            format,
            AudioFormat::new(SampleEncoding::IntegerPcm, 44_100, 2, 16)
        );
        assert_eq!(drain(&mut source).concat(), data);
    }

    #[test]
    fn wav_source_reports_float_format() {
        let data = 0.5f32
            .to_le_bytes()
            .iter()
            .copied()
            .cycle()
            .take(8 * 100)
            .collect::<Vec<u8>>();
        let bytes = wav_bytes(3, 1, 48_000, 32, &data);
        let (format, _source) =
            WavSource::from_media_source(Box::new(Cursor::new(bytes)), Hint::new()).unwrap();
        assert_eq!(
            format,
            AudioFormat::new(SampleEncoding::IeeeFloat, 48_000, 1, 32)
        );
    }

    #[test]
    fn garbage_is_not_a_wav() {
        let result =
            WavSource::from_media_source(Box::new(Cursor::new(vec![0u8; 64])), Hint::new());
        assert!(result.is_err());
    }
}
