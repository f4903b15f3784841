use std::path::PathBuf;

use pcm_player::{AudioFormat, PlayerConfig};

/// Where the bytes come from.
#[derive(Clone, Debug)]
pub enum Input {
    /// Headerless PCM from a file, or stdin when `path` is `None`.
    Raw {
        path: Option<PathBuf>,
        format: AudioFormat,
    },
    /// WAV file; the format comes from its header.
    Wav(PathBuf),
}

#[derive(Clone, Debug)]
pub struct CatConfig {
    pub input: Input,
    pub chunk_bytes: usize,
    pub player: PlayerConfig,
}
