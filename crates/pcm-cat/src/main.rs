//! pcm-cat: play raw PCM bytes (or a WAV file's payload) on the default output device.
//!
//! Input is forwarded byte for byte to the player in fixed-size writes with no frame
//! alignment. Ctrl-C stops the session; whatever was already queued still plays out.

use anyhow::Result;
use clap::Parser;
use pcm_cat::{cli, runtime};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,pcm_cat=info,pcm_player=info")
        }))
        .init();

    let summary = runtime::run(args.into_config())?;
    tracing::info!(
        frames = summary.stats.frames_written,
        elapsed_ms = summary.elapsed_ms(),
        underruns = summary.stats.underruns,
        discarded_bytes = summary.stats.bytes_discarded,
        "done"
    );
    Ok(())
}
