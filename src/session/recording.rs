//! Recording session: one capture stream feeding the pending capture

use crate::audio::{AudioBuffer, CaptureSource, CaptureStream, StreamFormat};
use crate::error::{Activity, Result, VoicemailError};
use log::{debug, info};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Chunks of the current (or last stopped) recording.
///
/// The recording flag lives under the same lock as the chunks, so the chunk
/// handler's check-and-append is atomic with respect to `stop`.
#[derive(Debug, Default)]
struct PendingCapture {
    recording: bool,
    chunks: Vec<Vec<f32>>,
}

#[derive(Clone, Default)]
struct SharedCapture {
    inner: Arc<Mutex<PendingCapture>>,
}

impl SharedCapture {
    fn lock(&self) -> MutexGuard<'_, PendingCapture> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a delivered chunk, or drop it if recording has stopped
    fn push_chunk(&self, chunk: &[f32]) {
        let mut pending = self.lock();
        if pending.recording {
            pending.chunks.push(chunk.to_vec());
        }
    }
}

pub struct RecordingSession {
    source: Arc<dyn CaptureSource>,
    format: StreamFormat,
    shared: SharedCapture,
    stream: Option<Box<dyn CaptureStream>>,
}

impl RecordingSession {
    pub fn new(source: Arc<dyn CaptureSource>, format: StreamFormat) -> Self {
        Self {
            source,
            format,
            shared: SharedCapture::default(),
            stream: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.shared.lock().recording
    }

    /// Whether there is anything to save
    pub fn has_capture(&self) -> bool {
        self.shared.lock().chunks.iter().any(|chunk| !chunk.is_empty())
    }

    /// Begin a new recording, discarding the previous capture
    pub fn start(&mut self) -> Result<()> {
        {
            let mut pending = self.shared.lock();
            if pending.recording {
                return Err(VoicemailError::AlreadyActive(Activity::Recording));
            }
            pending.chunks.clear();
            pending.recording = true;
        }

        let shared = self.shared.clone();
        let opened = self
            .source
            .open(self.format, Box::new(move |chunk: &[f32]| shared.push_chunk(chunk)));

        match opened {
            Ok(stream) => {
                self.stream = Some(stream);
                info!(
                    "Recording started ({}Hz, {} channel)",
                    self.format.sample_rate, self.format.channels
                );
                Ok(())
            }
            Err(e) => {
                self.shared.lock().recording = false;
                Err(e.into())
            }
        }
    }

    /// End the recording and release the device, keeping the captured chunks.
    ///
    /// The flag flips before the stream is closed so a callback racing with
    /// teardown discards its chunk.
    pub fn stop(&mut self) -> Result<()> {
        {
            let mut pending = self.shared.lock();
            if !pending.recording {
                return Err(VoicemailError::NotActive(Activity::Recording));
            }
            pending.recording = false;
        }

        if let Some(stream) = self.stream.take() {
            stream.close();
        }

        let pending = self.shared.lock();
        let samples: usize = pending.chunks.iter().map(Vec::len).sum();
        info!(
            "Recording stopped ({} chunks, {} samples)",
            pending.chunks.len(),
            samples
        );
        Ok(())
    }

    /// Concatenate the captured chunks into a 16-bit buffer.
    ///
    /// Leaves the chunks in place, so saving twice yields the same audio.
    pub fn finalize(&self) -> Result<AudioBuffer> {
        let pending = self.shared.lock();
        let buffer = AudioBuffer::from_float_chunks(
            pending.chunks.iter().map(Vec::as_slice),
            self.format,
        );
        if buffer.is_empty() {
            return Err(VoicemailError::EmptyCapture);
        }
        debug!("Finalized {} samples", buffer.len());
        Ok(buffer)
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        if self.is_recording() {
            let _ = self.stop();
        }
    }
}
