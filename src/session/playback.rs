//! Playback session: plays one buffer on a dedicated thread
//!
//! The playback state is a single atomic holding the id of the playing
//! session (0 when idle). Whichever of natural completion or `cancel` swaps
//! that id back to 0 owns the transition and its announcement.

use crate::audio::{AudioBuffer, AudioSink, HaltSignal};
use crate::error::{Activity, Result, VoicemailError};
use crate::models::PlaybackEvent;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

const IDLE: u64 = 0;

struct ActivePlayback {
    id: u64,
    halt: HaltSignal,
    task: JoinHandle<()>,
}

pub struct PlaybackSession {
    sink: Arc<dyn AudioSink>,
    state: Arc<AtomicU64>,
    next_id: u64,
    active: Option<ActivePlayback>,
    events: Sender<PlaybackEvent>,
}

impl PlaybackSession {
    pub fn new(sink: Arc<dyn AudioSink>, events: Sender<PlaybackEvent>) -> Self {
        Self {
            sink,
            state: Arc::new(AtomicU64::new(IDLE)),
            next_id: 0,
            active: None,
            events,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state.load(Ordering::SeqCst) != IDLE
    }

    /// Start playing `buffer` on a background thread and return immediately
    pub fn start(&mut self, buffer: AudioBuffer, file_name: String) -> Result<()> {
        if self.is_playing() {
            return Err(VoicemailError::AlreadyActive(Activity::Playback));
        }

        // A cancelled task may still be tearing down its stream
        self.reap();

        self.next_id += 1;
        let id = self.next_id;
        if self
            .state
            .compare_exchange(IDLE, id, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(VoicemailError::AlreadyActive(Activity::Playback));
        }

        let halt = HaltSignal::new();
        let sink = self.sink.clone();
        let state = self.state.clone();
        let events = self.events.clone();
        let task_halt = halt.clone();

        let spawned = thread::Builder::new()
            .name("voicemail-playback".to_string())
            .spawn(move || {
                debug!("Playback {} running ({:?})", id, buffer.duration());
                let outcome = sink.play(&buffer, &task_halt);

                let won = state
                    .compare_exchange(id, IDLE, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok();
                if !won {
                    debug!("Playback {} ended after cancellation", id);
                    return;
                }

                let event = match outcome {
                    Ok(()) => {
                        info!("Playback {} finished: {}", id, file_name);
                        PlaybackEvent::Finished { file_name }
                    }
                    Err(error) => {
                        warn!("Playback {} failed: {}", id, error);
                        PlaybackEvent::Failed { file_name, error }
                    }
                };
                let _ = events.send(event);
            });

        match spawned {
            Ok(task) => {
                self.active = Some(ActivePlayback { id, halt, task });
                Ok(())
            }
            Err(e) => {
                self.state.store(IDLE, Ordering::SeqCst);
                Err(VoicemailError::TaskSpawn(e))
            }
        }
    }

    /// Halt the current playback.
    ///
    /// Safe to race with natural completion: only one side performs the
    /// transition to idle.
    pub fn cancel(&mut self) -> Result<()> {
        let Some(active) = self.active.as_ref() else {
            return Err(VoicemailError::NotActive(Activity::Playback));
        };

        if self
            .state
            .compare_exchange(active.id, IDLE, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(VoicemailError::NotActive(Activity::Playback));
        }

        active.halt.raise();
        info!("Playback {} cancelled", active.id);
        Ok(())
    }

    /// Cancel any running playback and wait for its thread to exit
    pub fn shutdown(&mut self) {
        if self.is_playing() {
            let _ = self.cancel();
        }
        self.reap();
    }

    fn reap(&mut self) {
        if let Some(active) = self.active.take() {
            if active.task.join().is_err() {
                warn!("Playback {} thread panicked", active.id);
            }
        }
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
