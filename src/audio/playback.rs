//! Audio playback using PipeWire
//!
//! `play` runs a PipeWire main loop on the calling thread until the buffer
//! drains, the stream fails, or the halt signal posts a stop command.

use super::capture::{format_pod, PipeWireCommand};
use super::{pcm16_to_float, AudioBuffer, AudioDevice, AudioError, AudioSink, HaltSignal};
use log::{debug, error, warn};
use pipewire as pw;
use pw::spa;
use pw::spa::param::format::{MediaSubtype, MediaType};
use pw::spa::param::format_utils;
use pw::spa::pod::Pod;
use pw::stream::StreamState;
use std::cell::RefCell;
use std::rc::Rc;

/// Output sink bound to one PipeWire node (or the default sink)
pub struct PipeWireSink {
    target: Option<AudioDevice>,
}

impl PipeWireSink {
    pub fn new(target: Option<AudioDevice>) -> Self {
        Self { target }
    }
}

impl AudioSink for PipeWireSink {
    fn play(&self, buffer: &AudioBuffer, halt: &HaltSignal) -> Result<(), AudioError> {
        run_playback_loop(self.target.as_ref(), buffer, halt)
    }
}

/// Frames waiting to be written to the device
struct Cursor {
    samples: Vec<f32>,
    position: usize,
}

impl Cursor {
    /// Take up to `count` samples, or `None` once everything has been handed out
    fn take(&mut self, count: usize) -> Option<&[f32]> {
        if self.is_exhausted() {
            return None;
        }
        let start = self.position;
        let end = (start + count).min(self.samples.len());
        self.position = end;
        Some(&self.samples[start..end])
    }

    fn is_exhausted(&self) -> bool {
        self.position >= self.samples.len()
    }
}

fn run_playback_loop(
    target: Option<&AudioDevice>,
    buffer: &AudioBuffer,
    halt: &HaltSignal,
) -> Result<(), AudioError> {
    pw::init();

    let mainloop = pw::main_loop::MainLoopRc::new(None)
        .map_err(|e| AudioError::Backend(format!("Failed to create PipeWire main loop: {}", e)))?;

    let context = pw::context::ContextRc::new(&mainloop, None)
        .map_err(|e| AudioError::Backend(format!("Failed to create PipeWire context: {}", e)))?;

    let core = context
        .connect_rc(None)
        .map_err(|e| AudioError::Backend(format!("Failed to connect to PipeWire: {}", e)))?;

    // A raised halt posts Stop to the loop, independent of `process`
    let (sender, receiver) = pw::channel::channel::<PipeWireCommand>();
    let mainloop_weak = mainloop.downgrade();
    let _receiver = receiver.attach(mainloop.loop_(), move |cmd| match cmd {
        PipeWireCommand::Stop => {
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });
    halt.on_raise(move || {
        let _ = sender.send(PipeWireCommand::Stop);
    });

    let failure: Rc<RefCell<Option<AudioError>>> = Rc::new(RefCell::new(None));

    // User data for the stream callbacks
    struct UserData {
        format: spa::param::audio::AudioInfoRaw,
        cursor: Cursor,
        draining: bool,
        linked: bool,
        failure: Rc<RefCell<Option<AudioError>>>,
        mainloop_weak: pw::main_loop::MainLoopWeak,
    }

    impl UserData {
        fn quit(&self) {
            if let Some(mainloop) = self.mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    }

    let user_data = UserData {
        format: Default::default(),
        cursor: Cursor {
            samples: buffer.samples().iter().copied().map(pcm16_to_float).collect(),
            position: 0,
        },
        draining: false,
        linked: false,
        failure: failure.clone(),
        mainloop_weak: mainloop.downgrade(),
    };

    let mut props = pw::properties::properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Playback",
        *pw::keys::MEDIA_ROLE => "Communication",
        *pw::keys::APP_NAME => "Voicemail",
    };
    if let Some(device) = target {
        props.insert("target.object", device.name.as_str());
        props.insert("node.dont-fallback", "true");
    }

    let stream = pw::stream::StreamBox::new(&core, "voicemail-playback", props)
        .map_err(|e| AudioError::Stream(format!("Failed to create PipeWire stream: {}", e)))?;

    let _listener = stream
        .add_local_listener_with_user_data(user_data)
        .state_changed(|_, user_data, old, new| {
            debug!("Playback stream state: {:?} -> {:?}", old, new);
            match new {
                StreamState::Error(message) => {
                    error!("Playback stream failed: {}", message);
                    *user_data.failure.borrow_mut() = Some(AudioError::Stream(message));
                    user_data.quit();
                }
                StreamState::Paused | StreamState::Streaming => user_data.linked = true,
                StreamState::Unconnected if user_data.linked => {
                    warn!("Playback stream lost its device");
                    *user_data.failure.borrow_mut() =
                        Some(AudioError::Stream("Output device disconnected".to_string()));
                    user_data.quit();
                }
                _ => {}
            }
        })
        .param_changed(|_, user_data, id, param| {
            let Some(param) = param else { return };
            if id != spa::param::ParamType::Format.as_raw() {
                return;
            }

            let (media_type, media_subtype) = match format_utils::parse_format(param) {
                Ok(v) => v,
                Err(_) => return,
            };

            if media_type != MediaType::Audio || media_subtype != MediaSubtype::Raw {
                return;
            }

            if let Err(e) = user_data.format.parse(param) {
                error!("Failed to parse negotiated playback format: {:?}", e);
            }
        })
        .process(|stream, user_data| {
            if user_data.draining {
                return;
            }

            // Let queued buffers reach the device before quitting
            if user_data.cursor.is_exhausted() {
                user_data.draining = true;
                if let Err(e) = stream.flush(true) {
                    warn!("Failed to drain playback stream: {}", e);
                    user_data.quit();
                }
                return;
            }

            let Some(mut buffer) = stream.dequeue_buffer() else {
                return;
            };

            let datas = buffer.datas_mut();
            if datas.is_empty() {
                return;
            }

            let data = &mut datas[0];
            let n_channels = user_data.format.channels().max(1) as usize;
            let sample_size = std::mem::size_of::<f32>();
            let stride = sample_size * n_channels;

            let Some(slice) = data.data() else {
                return;
            };

            let n_frames = slice.len() / stride;

            if let Some(samples) = user_data.cursor.take(n_frames) {
                // Mono source: copy each sample into every output channel
                for (i, &sample) in samples.iter().enumerate() {
                    let bytes = sample.to_le_bytes();
                    for channel in 0..n_channels {
                        let offset = i * stride + channel * sample_size;
                        if offset + sample_size <= slice.len() {
                            slice[offset..offset + sample_size].copy_from_slice(&bytes);
                        }
                    }
                }
                let written = samples.len() * stride;
                if written < slice.len() {
                    slice[written..].fill(0);
                }

                let chunk = data.chunk_mut();
                *chunk.offset_mut() = 0;
                *chunk.stride_mut() = stride as i32;
                *chunk.size_mut() = written as u32;
            }
        })
        .drained(|_, user_data| {
            debug!("Playback stream drained");
            user_data.quit();
        })
        .register()
        .map_err(|e| AudioError::Stream(format!("Failed to register stream listener: {}", e)))?;

    let values = format_pod(buffer.format())?;
    let pod = Pod::from_bytes(&values)
        .ok_or_else(|| AudioError::Stream("Invalid audio format pod".to_string()))?;
    let mut params = [pod];

    // No RT_PROCESS: `process` shares the main loop thread with the drain
    // and state callbacks
    stream
        .connect(
            spa::utils::Direction::Output,
            None,
            pw::stream::StreamFlags::AUTOCONNECT | pw::stream::StreamFlags::MAP_BUFFERS,
            &mut params,
        )
        .map_err(|e| AudioError::Stream(format!("Failed to connect stream: {}", e)))?;

    debug!(
        "Playback stream connected ({} samples at {}Hz)",
        buffer.len(),
        buffer.format().sample_rate
    );

    // Run until drained, halted or failed
    mainloop.run();

    match failure.borrow_mut().take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_hands_out_in_order() {
        let mut cursor = Cursor {
            samples: vec![0.1, 0.2, 0.3],
            position: 0,
        };
        assert_eq!(cursor.take(2), Some(&[0.1, 0.2][..]));
        assert_eq!(cursor.take(2), Some(&[0.3][..]));
        assert_eq!(cursor.take(2), None);
        assert!(cursor.is_exhausted());
    }
}
