//! Audio capture using PipeWire
//!
//! Each opened stream runs its own PipeWire main loop on a background thread
//! and hands every dequeued buffer to the session's chunk handler. `open`
//! returns only once the stream has linked to a device, failed, or timed out.

use super::{
    AudioDevice, AudioError, CaptureSource, CaptureStream, ChunkHandler, StreamFormat,
};
use log::{debug, error, info, warn};
use pipewire as pw;
use pw::spa;
use pw::spa::param::format::{MediaSubtype, MediaType};
use pw::spa::param::format_utils;
use pw::spa::pod::Pod;
use pw::stream::StreamState;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long `open` waits for the stream to link before giving up
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

pub(super) enum PipeWireCommand {
    Stop,
}

/// Capture source bound to one PipeWire node (or the default source)
pub struct PipeWireCapture {
    target: Option<AudioDevice>,
}

impl PipeWireCapture {
    pub fn new(target: Option<AudioDevice>) -> Self {
        Self { target }
    }
}

impl CaptureSource for PipeWireCapture {
    fn open(
        &self,
        format: StreamFormat,
        on_chunk: ChunkHandler,
    ) -> Result<Box<dyn CaptureStream>, AudioError> {
        let (sender, receiver) = pw::channel::channel::<PipeWireCommand>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), AudioError>>();
        let target = self.target.clone();

        let handle = thread::Builder::new()
            .name("voicemail-capture".to_string())
            .spawn(move || {
                if let Err(e) =
                    run_capture_loop(target, format, on_chunk, receiver, ready_tx.clone())
                {
                    error!("Capture loop failed: {}", e);
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| AudioError::Backend(format!("Failed to spawn capture thread: {}", e)))?;

        match ready_rx.recv_timeout(CONNECT_TIMEOUT) {
            Ok(Ok(())) => {
                info!("Capture stream connected");
                Ok(Box::new(PipeWireCaptureStream {
                    sender,
                    handle: Some(handle),
                }))
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(RecvTimeoutError::Timeout) => {
                let _ = sender.send(PipeWireCommand::Stop);
                let _ = handle.join();
                Err(AudioError::Stream(format!(
                    "Capture stream did not start within {}s",
                    CONNECT_TIMEOUT.as_secs()
                )))
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                Err(AudioError::Backend(
                    "Capture thread exited before connecting".to_string(),
                ))
            }
        }
    }
}

/// A connected capture stream; closing quits its main loop and joins the thread
struct PipeWireCaptureStream {
    sender: pw::channel::Sender<PipeWireCommand>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureStream for PipeWireCaptureStream {
    fn close(mut self: Box<Self>) {
        let _ = self.sender.send(PipeWireCommand::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        debug!("Capture stream released");
    }
}

/// Run the PipeWire capture loop in a background thread
fn run_capture_loop(
    target: Option<AudioDevice>,
    format: StreamFormat,
    on_chunk: ChunkHandler,
    receiver: pw::channel::Receiver<PipeWireCommand>,
    ready: mpsc::Sender<Result<(), AudioError>>,
) -> Result<(), AudioError> {
    pw::init();

    let mainloop = pw::main_loop::MainLoopRc::new(None)
        .map_err(|e| AudioError::Backend(format!("Failed to create PipeWire main loop: {}", e)))?;

    let context = pw::context::ContextRc::new(&mainloop, None)
        .map_err(|e| AudioError::Backend(format!("Failed to create PipeWire context: {}", e)))?;

    let core = context
        .connect_rc(None)
        .map_err(|e| AudioError::Backend(format!("Failed to connect to PipeWire: {}", e)))?;

    // Set up channel receiver to stop the loop
    let mainloop_weak = mainloop.downgrade();
    let _receiver = receiver.attach(mainloop.loop_(), move |cmd| match cmd {
        PipeWireCommand::Stop => {
            if let Some(mainloop) = mainloop_weak.upgrade() {
                mainloop.quit();
            }
        }
    });

    // User data for the stream callbacks
    struct UserData {
        format: spa::param::audio::AudioInfoRaw,
        on_chunk: ChunkHandler,
        // Taken by the first state that settles the open handshake
        ready: Option<mpsc::Sender<Result<(), AudioError>>>,
        mainloop_weak: pw::main_loop::MainLoopWeak,
    }

    let user_data = UserData {
        format: Default::default(),
        on_chunk,
        ready: Some(ready),
        mainloop_weak: mainloop.downgrade(),
    };

    let mut props = pw::properties::properties! {
        *pw::keys::MEDIA_TYPE => "Audio",
        *pw::keys::MEDIA_CATEGORY => "Capture",
        *pw::keys::MEDIA_ROLE => "Communication",
        *pw::keys::APP_NAME => "Voicemail",
    };
    if let Some(device) = &target {
        props.insert("target.object", device.name.as_str());
        props.insert("node.dont-fallback", "true");
    }

    let stream = pw::stream::StreamBox::new(&core, "voicemail-capture", props)
        .map_err(|e| AudioError::Stream(format!("Failed to create PipeWire stream: {}", e)))?;

    let _listener = stream
        .add_local_listener_with_user_data(user_data)
        .state_changed(|_, user_data, old, new| {
            debug!("Capture stream state: {:?} -> {:?}", old, new);
            let failed = matches!(new, StreamState::Error(_));

            match (handshake_outcome(&new), user_data.ready.take()) {
                (Some(outcome), Some(ready)) => {
                    let _ = ready.send(outcome);
                }
                (None, pending) => user_data.ready = pending,
                (Some(_), None) => {
                    if let StreamState::Error(message) = &new {
                        error!("Capture stream failed: {}", message);
                    }
                }
            }

            if matches!(new, StreamState::Unconnected) && user_data.ready.is_none() {
                warn!("Capture stream lost its device");
            }
            if failed {
                if let Some(mainloop) = user_data.mainloop_weak.upgrade() {
                    mainloop.quit();
                }
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
                error!("Failed to parse negotiated capture format: {:?}", e);
            }
        })
        .process(|stream, user_data| {
            let Some(mut buffer) = stream.dequeue_buffer() else {
                return;
            };

            let datas = buffer.datas_mut();
            if datas.is_empty() {
                return;
            }

            let data = &mut datas[0];
            let n_channels = user_data.format.channels().max(1);
            let n_samples = data.chunk().size() / (std::mem::size_of::<f32>() as u32);

            if let Some(raw_samples) = data.data() {
                // Keep the first channel of each frame
                let mut mono_samples = Vec::with_capacity((n_samples / n_channels) as usize);

                for i in (0..n_samples).step_by(n_channels as usize) {
                    let start = i as usize * std::mem::size_of::<f32>();
                    let end = start + std::mem::size_of::<f32>();
                    if end <= raw_samples.len() {
                        let sample = f32::from_le_bytes(
                            raw_samples[start..end].try_into().unwrap_or([0; 4]),
                        );
                        mono_samples.push(sample);
                    }
                }

                (user_data.on_chunk)(&mono_samples);
            }
        })
        .register()
        .map_err(|e| AudioError::Stream(format!("Failed to register stream listener: {}", e)))?;

    let values = format_pod(format)?;
    let pod = Pod::from_bytes(&values)
        .ok_or_else(|| AudioError::Stream("Invalid audio format pod".to_string()))?;
    let mut params = [pod];

    // No RT_PROCESS: `process` shares the main loop thread with the state
    // callback that owns the handshake
    stream
        .connect(
            spa::utils::Direction::Input,
            None,
            pw::stream::StreamFlags::AUTOCONNECT | pw::stream::StreamFlags::MAP_BUFFERS,
            &mut params,
        )
        .map_err(|e| AudioError::Stream(format!("Failed to connect stream: {}", e)))?;

    // Run until stopped or failed
    mainloop.run();

    Ok(())
}

/// How a stream state settles the open handshake, or `None` while still linking
fn handshake_outcome(state: &StreamState) -> Option<Result<(), AudioError>> {
    match state {
        StreamState::Paused | StreamState::Streaming => Some(Ok(())),
        StreamState::Error(message) => Some(Err(AudioError::Stream(message.clone()))),
        _ => None,
    }
}

/// Serialize an F32LE EnumFormat pod for the requested rate and channel count
pub(super) fn format_pod(format: StreamFormat) -> Result<Vec<u8>, AudioError> {
    let mut audio_info = spa::param::audio::AudioInfoRaw::new();
    audio_info.set_format(spa::param::audio::AudioFormat::F32LE);
    audio_info.set_rate(format.sample_rate);
    audio_info.set_channels(u32::from(format.channels));

    let obj = spa::pod::Object {
        type_: spa::utils::SpaTypes::ObjectParamFormat.as_raw(),
        id: spa::param::ParamType::EnumFormat.as_raw(),
        properties: audio_info.into(),
    };

    let values: Vec<u8> = spa::pod::serialize::PodSerializer::serialize(
        std::io::Cursor::new(Vec::new()),
        &spa::pod::Value::Object(obj),
    )
    .map_err(|e| AudioError::Stream(format!("Failed to serialize audio format: {:?}", e)))?
    .0
    .into_inner();

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_waits_for_link() {
        assert_eq!(handshake_outcome(&StreamState::Connecting), None);
        assert_eq!(handshake_outcome(&StreamState::Unconnected), None);
        assert_eq!(handshake_outcome(&StreamState::Paused), Some(Ok(())));
        assert_eq!(handshake_outcome(&StreamState::Streaming), Some(Ok(())));
    }

    #[test]
    fn test_open_reports_stream_error() {
        let outcome = handshake_outcome(&StreamState::Error("no target node".to_string()));
        assert_eq!(
            outcome,
            Some(Err(AudioError::Stream("no target node".to_string())))
        );
    }
}
