//! Recording and playback sessions
//!
//! Each session owns the lifecycle of one device stream and enforces that at
//! most one of its kind is active.

mod playback;
mod recording;

pub use playback::PlaybackSession;
pub use recording::RecordingSession;
