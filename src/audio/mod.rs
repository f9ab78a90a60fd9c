//! Audio capture and playback module using PipeWire
//!
//! This module provides:
//! - The [`AudioBuffer`] a voicemail is stored as (16-bit mono PCM at 44.1kHz)
//! - The [`CaptureSource`] and [`AudioSink`] device seams
//! - PipeWire implementations of both, plus WAV file I/O via hound

mod capture;
mod device;
#[cfg(test)]
pub mod fake;
mod playback;
pub mod wav;

pub use capture::PipeWireCapture;
pub use device::{resolve_device, AudioDevice, Direction};
pub use playback::PipeWireSink;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Sample rate every voicemail is recorded at
pub const SAMPLE_RATE: u32 = 44100;

/// Voicemails are mono
pub const CHANNELS: u16 = 1;

/// Scale factor between float amplitude and 16-bit PCM
const PCM16_SCALE: f64 = 32767.0;

/// Errors raised by audio devices and the PipeWire back end
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AudioError {
    #[error("no {direction} device matches '{identifier}'")]
    DeviceNotFound {
        identifier: String,
        direction: Direction,
    },

    #[error("{0}")]
    Backend(String),

    #[error("stream failed: {0}")]
    Stream(String),
}

/// Sample layout of a stream or buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
        }
    }
}

/// Convert a float amplitude in [-1.0, 1.0] to signed 16-bit PCM.
///
/// Uses `round(x * 32767)` clamped to the i16 range, so out-of-range input
/// saturates instead of wrapping.
pub fn float_to_pcm16(sample: f32) -> i16 {
    (f64::from(sample) * PCM16_SCALE)
        .round()
        .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

/// Convert 16-bit PCM back to a float amplitude for device output
pub fn pcm16_to_float(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

/// A finalized block of 16-bit PCM frames in capture order
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioBuffer {
    samples: Vec<i16>,
    format: StreamFormat,
}

impl AudioBuffer {
    pub fn new(samples: Vec<i16>, format: StreamFormat) -> Self {
        Self { samples, format }
    }

    /// Concatenate float chunks in order and convert them to PCM
    pub fn from_float_chunks<'a>(
        chunks: impl IntoIterator<Item = &'a [f32]>,
        format: StreamFormat,
    ) -> Self {
        let samples = chunks
            .into_iter()
            .flat_map(|chunk| chunk.iter().copied().map(float_to_pcm16))
            .collect();
        Self { samples, format }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playing time of the buffer
    pub fn duration(&self) -> Duration {
        let frames = self.samples.len() / usize::from(self.format.channels.max(1));
        Duration::from_secs_f64(frames as f64 / f64::from(self.format.sample_rate.max(1)))
    }
}

/// Receives each captured chunk of float samples, in delivery order
pub type ChunkHandler = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// An input device that can deliver chunks to a handler until closed
pub trait CaptureSource: Send + Sync {
    /// Open the device and begin delivering chunks to `on_chunk`.
    ///
    /// Returns once the stream is connected, so device errors surface here.
    fn open(
        &self,
        format: StreamFormat,
        on_chunk: ChunkHandler,
    ) -> Result<Box<dyn CaptureStream>, AudioError>;
}

/// An open capture stream; closing halts the hardware and releases it
pub trait CaptureStream: Send {
    fn close(self: Box<Self>);
}

/// An output device that plays a whole buffer
pub trait AudioSink: Send + Sync {
    /// Play `buffer`, blocking until it drains or `halt` is raised.
    fn play(&self, buffer: &AudioBuffer, halt: &HaltSignal) -> Result<(), AudioError>;
}

type Waker = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct HaltState {
    raised: AtomicBool,
    wakers: Mutex<Vec<Waker>>,
}

/// One-shot cross-thread stop request for a running playback.
///
/// Sinks that block outside a polling loop register a waker with
/// [`HaltSignal::on_raise`] so a raise reaches them out of band.
#[derive(Clone, Default)]
pub struct HaltSignal {
    inner: Arc<HaltState>,
}

impl HaltSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        let wakers = {
            let mut wakers = self.wakers();
            self.inner.raised.store(true, Ordering::SeqCst);
            std::mem::take(&mut *wakers)
        };
        for wake in wakers {
            wake();
        }
    }

    pub fn is_raised(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    /// Run `wake` once the signal is raised, or right away if it already was
    pub fn on_raise<F>(&self, wake: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut wakers = self.wakers();
        if self.inner.raised.load(Ordering::SeqCst) {
            drop(wakers);
            wake();
            return;
        }
        wakers.push(Box::new(wake));
    }

    fn wakers(&self) -> MutexGuard<'_, Vec<Waker>> {
        self.inner
            .wakers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for HaltSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HaltSignal")
            .field("raised", &self.is_raised())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_to_pcm16_scaling() {
        assert_eq!(float_to_pcm16(0.0), 0);
        assert_eq!(float_to_pcm16(1.0), 32767);
        assert_eq!(float_to_pcm16(-1.0), -32767);
        assert_eq!(float_to_pcm16(0.5), 16384);
        assert_eq!(float_to_pcm16(-0.5), -16384);
    }

    #[test]
    fn test_float_to_pcm16_clamps() {
        assert_eq!(float_to_pcm16(2.0), 32767);
        assert_eq!(float_to_pcm16(-2.0), -32768);
    }

    #[test]
    fn test_chunks_concatenate_in_order() {
        let first = [0.0f32, 1.0];
        let second = [-1.0f32];
        let buffer = AudioBuffer::from_float_chunks(
            [&first[..], &second[..]],
            StreamFormat::default(),
        );
        assert_eq!(buffer.samples(), &[0, 32767, -32767]);
    }

    #[test]
    fn test_duration() {
        let buffer = AudioBuffer::new(vec![0; 22050], StreamFormat::default());
        assert_eq!(buffer.duration(), Duration::from_millis(500));
    }

    #[test]
    fn test_halt_signal_is_shared() {
        let halt = HaltSignal::new();
        let other = halt.clone();
        assert!(!other.is_raised());
        halt.raise();
        assert!(other.is_raised());
    }

    #[test]
    fn test_halt_signal_wakes_registered_waiters() {
        let halt = HaltSignal::new();
        let (tx, rx) = std::sync::mpsc::channel();

        let early = tx.clone();
        halt.on_raise(move || early.send("before").unwrap());
        assert!(rx.try_recv().is_err());

        halt.raise();
        assert_eq!(rx.try_recv(), Ok("before"));

        // Registering after the raise fires immediately
        halt.on_raise(move || tx.send("after").unwrap());
        assert_eq!(rx.try_recv(), Ok("after"));
        assert!(rx.try_recv().is_err());
    }
}
