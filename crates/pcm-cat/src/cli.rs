use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use pcm_player::{AudioFormat, PlayerConfig, RemainderPolicy, SampleEncoding};

use crate::config::{CatConfig, Input};

#[derive(Parser, Debug)]
#[command(name = "pcm-cat", version)]
pub struct Args {
    /// Input file, or `-` to read raw PCM from stdin
    pub input: PathBuf,

    /// How to interpret the input. `auto` treats `.wav` files as WAV and everything else as raw
    #[arg(long, value_enum, default_value_t = Container::Auto)]
    pub container: Container,

    /// Sample rate of raw input in Hz
    #[arg(long, default_value_t = 44_100)]
    pub rate: u32,

    /// Channel count of raw input
    #[arg(long, default_value_t = 2)]
    pub channels: u32,

    /// Bits per sample of raw input
    #[arg(long, default_value_t = 16)]
    pub bits: u32,

    /// Raw input holds IEEE float samples instead of signed integers
    #[arg(long)]
    pub float: bool,

    /// Bytes handed to the player per write
    #[arg(long, default_value_t = 4096)]
    pub chunk_bytes: usize,

    /// Discard sub-frame bytes at the end of each write instead of carrying them over
    #[arg(long)]
    pub drop_partial_frames: bool,

    /// Preferred device period in frames
    #[arg(long, default_value_t = 1024)]
    pub period_frames: u32,

    /// Device buffer depth in periods
    #[arg(long, default_value_t = 8)]
    pub buffer_periods: usize,

    /// Largest single device write in periods
    #[arg(long, default_value_t = 4)]
    pub write_periods: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Container {
    Auto,
    Raw,
    Wav,
}

impl Args {
    /// Resolve the command line into a run configuration.
    pub fn into_config(self) -> CatConfig {
        let is_stdin = self.input.as_os_str() == "-";
        let is_wav = match self.container {
            Container::Wav => true,
            Container::Raw => false,
            Container::Auto => {
                !is_stdin
                    && self
                        .input
                        .extension()
                        .and_then(|e| e.to_str())
                        .is_some_and(|e| e.eq_ignore_ascii_case("wav"))
            }
        };
        let input = if is_wav {
            Input::Wav(self.input)
        } else {
            let encoding = if self.float {
                SampleEncoding::IeeeFloat
            } else {
                SampleEncoding::IntegerPcm
            };
            Input::Raw {
                path: (!is_stdin).then_some(self.input),
                format: AudioFormat::new(encoding, self.rate, self.channels, self.bits),
            }
        };

        CatConfig {
            input,
            chunk_bytes: self.chunk_bytes.max(1),
            player: PlayerConfig {
                write_periods: self.write_periods.max(1),
                remainder: if self.drop_partial_frames {
                    RemainderPolicy::Drop
                } else {
                    RemainderPolicy::Carry
                },
                buffer_periods: self.buffer_periods,
                period_frames: self.period_frames,
                ..PlayerConfig::default()
            },
        }
    }
}
