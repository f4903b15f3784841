//! Caller-facing start/write/stop controller.
//!
//! [`Player`] owns at most one live session. `start` spawns the worker thread and returns
//! immediately; `write` only enqueues; `stop` only closes the queue. Everything that
//! involves the device happens on the worker, and the outcome is reported once through the
//! completion callback.
//!
//! A session that fails on its own (device error, write error) clears itself from the
//! controller before its callback runs, so `start` works again right away.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use crate::config::PlayerConfig;
use crate::error::{ControlError, PlaybackError};
use crate::format::AudioFormat;
use crate::pcm::PcmDevice;
use crate::playback::PlaybackLoop;
use crate::queue::{StreamChunk, StreamQueue};
use crate::status::{PlaybackCounters, PlaybackSummary};

/// Outcome delivered to the completion callback.
pub type PlaybackResult = Result<PlaybackSummary, PlaybackError>;

/// Opaque identifier of a session started by [`Player::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct ActiveSession {
    id: SessionId,
    queue: Arc<StreamQueue>,
    counters: Arc<PlaybackCounters>,
}

#[derive(Default)]
struct Slots {
    active: Option<ActiveSession>,
    /// Most recently spawned worker; joined by the next worker before it opens the device.
    worker: Option<JoinHandle<()>>,
}

thread_local! {
    /// Set on playback worker threads, which must never join other workers from `Drop`.
    static ON_WORKER: Cell<bool> = const { Cell::new(false) };
}

fn lock_slots(slots: &Mutex<Slots>) -> MutexGuard<'_, Slots> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Single-session playback controller over a [`PcmDevice`].
pub struct Player<D: PcmDevice + Clone> {
    device: D,
    config: PlayerConfig,
    slots: Arc<Mutex<Slots>>,
    next_id: AtomicU64,
}

impl<D: PcmDevice + Clone> Player<D> {
    pub fn new(device: D, config: PlayerConfig) -> Self {
        Self {
            device,
            config,
            slots: Arc::new(Mutex::new(Slots::default())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Start a session and return without waiting for the device.
    ///
    /// `on_complete` runs exactly once on the worker thread when the session ends, unless
    /// this call itself returns an error.
    pub fn start<F>(&self, format: AudioFormat, on_complete: F) -> Result<SessionId, ControlError>
    where
        F: FnOnce(PlaybackResult) + Send + 'static,
    {
        let mut slots = lock_slots(&self.slots);
        if slots.active.is_some() {
            return Err(ControlError::AlreadyRunning);
        }
        format.validate()?;

        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let queue = Arc::new(StreamQueue::new());
        let counters = PlaybackCounters::shared();
        let playback = PlaybackLoop::new(
            self.device.clone(),
            format,
            queue.clone(),
            self.config.clone(),
            counters.clone(),
        );
        let previous = slots.worker.take();
        let shared = self.slots.clone();

        let handle = std::thread::Builder::new()
            .name("pcm-playback".to_string())
            .spawn(move || run_session(id, previous, playback, shared, on_complete))
            .map_err(ControlError::Spawn)?;

        tracing::info!(
            session = %id,
            encoding = %format.encoding,
            rate_hz = format.sample_rate,
            channels = format.channels,
            bit_depth = format.bit_depth,
            "playback started"
        );
        slots.active = Some(ActiveSession {
            id,
            queue,
            counters,
        });
        slots.worker = Some(handle);
        Ok(id)
    }

    /// Queue raw bytes for playback. No frame alignment is required.
    pub fn write(&self, bytes: impl Into<StreamChunk>) -> Result<(), ControlError> {
        let chunk = bytes.into();
        let slots = lock_slots(&self.slots);
        let active = slots.active.as_ref().ok_or(ControlError::NotRunning)?;
        if !active.queue.push(chunk) {
            return Err(ControlError::NotRunning);
        }
        Ok(())
    }

    /// End the session: close the queue and return. Draining and release are reported
    /// through the completion callback.
    pub fn stop(&self) -> Result<(), ControlError> {
        let active = lock_slots(&self.slots)
            .active
            .take()
            .ok_or(ControlError::NotRunning)?;
        active.queue.close();
        tracing::info!(
            session = %active.id,
            pending_chunks = active.queue.len(),
            pending_bytes = active.queue.pending_bytes(),
            "playback stop requested"
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        lock_slots(&self.slots).active.is_some()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        lock_slots(&self.slots).active.as_ref().map(|a| a.id)
    }

    /// Bytes queued by `write` that the worker has not picked up yet.
    pub fn pending_bytes(&self) -> Option<usize> {
        lock_slots(&self.slots)
            .active
            .as_ref()
            .map(|a| a.queue.pending_bytes())
    }

    /// Counters of the live session.
    pub fn counters(&self) -> Option<Arc<PlaybackCounters>> {
        lock_slots(&self.slots)
            .active
            .as_ref()
            .map(|a| a.counters.clone())
    }
}

impl<D: PcmDevice + Clone> Drop for Player<D> {
    fn drop(&mut self) {
        let (active, worker) = {
            let mut slots = lock_slots(&self.slots);
            (slots.active.take(), slots.worker.take())
        };
        if let Some(active) = active {
            active.queue.close();
        }
        let Some(worker) = worker else {
            return;
        };
        if ON_WORKER.with(Cell::get) {
            // Dropped from a completion callback; the worker chain finishes on its own.
            tracing::debug!("player dropped on playback worker, not joining");
            return;
        }
        if worker.join().is_err() {
            tracing::warn!("playback worker panicked");
        }
    }
}

/// Worker thread body for one session.
fn run_session<D, F>(
    id: SessionId,
    previous: Option<JoinHandle<()>>,
    mut playback: PlaybackLoop<D>,
    slots: Arc<Mutex<Slots>>,
    on_complete: F,
) where
    D: PcmDevice,
    F: FnOnce(PlaybackResult),
{
    ON_WORKER.with(|flag| flag.set(true));
    if let Some(previous) = previous {
        if previous.join().is_err() {
            tracing::warn!("previous playback worker panicked");
        }
    }

    let result = playback.run();
    match &result {
        Ok(summary) => tracing::info!(session = %id, "{summary}"),
        Err(e) => {
            tracing::error!(session = %id, "playback failed: {e}");
            let mut slots = lock_slots(&slots);
            if slots.active.as_ref().is_some_and(|a| a.id == id) {
                if let Some(active) = slots.active.take() {
                    active.queue.close();
                }
            }
        }
    }
    on_complete(result);
}
