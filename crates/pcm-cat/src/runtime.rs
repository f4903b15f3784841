//! Feed a byte source through the player and wait for the outcome.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use pcm_player::pcm::PcmDevice;
use pcm_player::{
    AudioFormat, ControlError, CpalDevice, DefaultPlayer, PlaybackResult, PlaybackSummary,
    Player,
};

use crate::config::{CatConfig, Input};
use crate::source::{ChunkSource, RawSource, WavSource};

/// Chunks allowed to wait in the player queue before the feeder backs off.
const MAX_PENDING_CHUNKS: usize = 32;
const BACKOFF: Duration = Duration::from_millis(5);

/// Open the configured input and play it to the end (or until Ctrl-C).
pub fn run(config: CatConfig) -> Result<PlaybackSummary> {
    let (format, mut source) = open_input(&config)?;
    let player: Arc<DefaultPlayer> = Arc::new(Player::new(
        CpalDevice::new(&config.player),
        config.player.clone(),
    ));

    let player_for_signal = player.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("interrupted, stopping playback");
        let _ = player_for_signal.stop();
    }) {
        tracing::warn!("could not install Ctrl-C handler: {e}");
    }

    play(&*player, format, source.as_mut(), config.chunk_bytes)
}

fn open_input(config: &CatConfig) -> Result<(AudioFormat, Box<dyn ChunkSource>)> {
    match &config.input {
        Input::Raw { path: Some(path), format } => {
            let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
            tracing::info!(path = %path.display(), "source (raw file)");
            let source: Box<dyn ChunkSource> =
                Box::new(RawSource::new(BufReader::new(file), config.chunk_bytes));
            Ok((*format, source))
        }
        Input::Raw { path: None, format } => {
            tracing::info!("source (stdin)");
            let source: Box<dyn ChunkSource> =
                Box::new(RawSource::new(std::io::stdin().lock(), config.chunk_bytes));
            Ok((*format, source))
        }
        Input::Wav(path) => {
            let (format, source) = WavSource::open(path)?;
            let source: Box<dyn ChunkSource> = Box::new(source);
            Ok((format, source))
        }
    }
}

/// Start a session, stream every chunk of `source`, stop, and wait for the callback.
pub fn play<D: PcmDevice + Clone>(
    player: &Player<D>,
    format: AudioFormat,
    source: &mut dyn ChunkSource,
    chunk_bytes: usize,
) -> Result<PlaybackSummary> {
    let (done_tx, done_rx) = crossbeam_channel::bounded::<PlaybackResult>(1);
    let session = player
        .start(format, move |result| {
            let _ = done_tx.send(result);
        })
        .context("start playback")?;
    tracing::debug!(session = %session, "session started");

    let max_pending = chunk_bytes.saturating_mul(MAX_PENDING_CHUNKS);
    let fed = feed(player, source, max_pending, &done_rx);

    match player.stop() {
        Ok(()) | Err(ControlError::NotRunning) => {}
        Err(e) => return Err(e).context("stop playback"),
    }
    let result = done_rx
        .recv()
        .context("playback worker exited without reporting")?;

    fed?;
    Ok(result?)
}

/// Push chunks until the source ends, the session goes away, or reading fails.
fn feed<D: PcmDevice + Clone>(
    player: &Player<D>,
    source: &mut dyn ChunkSource,
    max_pending: usize,
    done: &crossbeam_channel::Receiver<PlaybackResult>,
) -> Result<()> {
    loop {
        while player.pending_bytes().is_some_and(|p| p > max_pending) {
            if !done.is_empty() {
                return Ok(());
            }
            std::thread::sleep(BACKOFF);
        }
        let Some(chunk) = source.next_chunk()? else {
            return Ok(());
        };
        match player.write(chunk) {
            Ok(()) => {}
            Err(ControlError::NotRunning) => {
                tracing::debug!("session ended while feeding");
                return Ok(());
            }
            Err(e) => return Err(e).context("write playback data"),
        }
    }
}
