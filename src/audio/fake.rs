//! In-memory capture source and sink for tests

use super::{
    AudioBuffer, AudioError, AudioSink, CaptureSource, CaptureStream, ChunkHandler, HaltSignal,
    StreamFormat,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Capture source whose "hardware callback" is driven by the test.
///
/// The handler stays registered after close so a test can deliver a chunk
/// that arrives after stop, the way a late device callback would.
#[derive(Clone, Default)]
pub struct FakeCapture {
    handler: Arc<Mutex<Option<ChunkHandler>>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
    fail_open: bool,
}

impl FakeCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    /// Deliver one chunk to the most recently registered handler
    pub fn deliver(&self, chunk: &[f32]) {
        if let Some(handler) = self.handler.lock().unwrap().as_mut() {
            handler(chunk);
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl CaptureSource for FakeCapture {
    fn open(
        &self,
        _format: StreamFormat,
        on_chunk: ChunkHandler,
    ) -> Result<Box<dyn CaptureStream>, AudioError> {
        if self.fail_open {
            return Err(AudioError::Backend("fake device unavailable".to_string()));
        }
        *self.handler.lock().unwrap() = Some(on_chunk);
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeStream {
            closed: self.closed.clone(),
        }))
    }
}

struct FakeStream {
    closed: Arc<AtomicUsize>,
}

impl CaptureStream for FakeStream {
    fn close(self: Box<Self>) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone, Copy)]
enum SinkBehavior {
    Play,
    Fail,
    Stall,
}

/// Sink that "plays" for the buffer's duration times `time_scale`
#[derive(Clone)]
pub struct FakeSink {
    time_scale: f64,
    behavior: SinkBehavior,
    played: Arc<Mutex<Vec<usize>>>,
}

impl FakeSink {
    pub fn new(time_scale: f64) -> Self {
        Self {
            time_scale,
            behavior: SinkBehavior::Play,
            played: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            behavior: SinkBehavior::Fail,
            ..Self::new(0.0)
        }
    }

    /// A device that never asks for data: it never polls the halt flag and
    /// only returns once a raise wakes it
    pub fn stalled() -> Self {
        Self {
            behavior: SinkBehavior::Stall,
            ..Self::new(0.0)
        }
    }

    /// Sample counts of every buffer handed to `play`
    pub fn played(&self) -> Vec<usize> {
        self.played.lock().unwrap().clone()
    }
}

impl AudioSink for FakeSink {
    fn play(&self, buffer: &AudioBuffer, halt: &HaltSignal) -> Result<(), AudioError> {
        self.played.lock().unwrap().push(buffer.len());
        match self.behavior {
            SinkBehavior::Play => {}
            SinkBehavior::Fail => {
                return Err(AudioError::Stream("fake sink failed".to_string()));
            }
            SinkBehavior::Stall => {
                let (wake_tx, wake_rx) = mpsc::channel();
                halt.on_raise(move || {
                    let _ = wake_tx.send(());
                });
                let _ = wake_rx.recv();
                return Ok(());
            }
        }

        let deadline = Instant::now() + buffer.duration().mul_f64(self.time_scale);
        while Instant::now() < deadline {
            if halt.is_raised() {
                return Ok(());
            }
            thread::sleep(Duration::from_millis(2));
        }
        Ok(())
    }
}
