//! The voicemail state machine
//!
//! Owns the recording and playback sessions, the catalog and the loaded
//! voicemail. Constructed once at startup and handed to the shell.

use super::Catalog;
use crate::audio::{wav, AudioSink, CaptureSource, StreamFormat};
use crate::error::{Activity, Result, VoicemailError};
use crate::models::{CatalogEntry, PlaybackEvent};
use crate::session::{PlaybackSession, RecordingSession};
use log::{debug, info};
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::mpsc::Sender;
use std::sync::Arc;

pub struct Controller {
    catalog: Catalog,
    recording: RecordingSession,
    playback: PlaybackSession,
    /// Path of the voicemail `play` will read; the file may have vanished since
    loaded: Option<PathBuf>,
    /// Most recent listing, which `load` indexes into
    listing: Vec<CatalogEntry>,
}

impl Controller {
    pub fn new(
        catalog: Catalog,
        capture: Arc<dyn CaptureSource>,
        sink: Arc<dyn AudioSink>,
        events: Sender<PlaybackEvent>,
    ) -> Self {
        Self {
            catalog,
            recording: RecordingSession::new(capture, StreamFormat::default()),
            playback: PlaybackSession::new(sink, events),
            loaded: None,
            listing: Vec::new(),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_recording()
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    pub fn start_recording(&mut self) -> Result<()> {
        self.recording.start()
    }

    pub fn stop_recording(&mut self) -> Result<()> {
        self.recording.stop()
    }

    /// Check there is a capture to save before asking for a name
    pub fn ensure_capture(&self) -> Result<()> {
        if self.recording.has_capture() {
            Ok(())
        } else {
            Err(VoicemailError::EmptyCapture)
        }
    }

    /// Write the last capture to a new file and make it the loaded voicemail
    pub fn save(&mut self, name: &str) -> Result<PathBuf> {
        self.ensure_capture()?;

        let file_name = Catalog::file_name_for(name)?;
        if self.catalog.contains(&file_name) {
            return Err(VoicemailError::FilenameInUse(file_name));
        }

        let buffer = self.recording.finalize()?;
        let path = self.catalog.path_for(&file_name);

        wav::write_new(&path, &buffer).map_err(|source| match source {
            hound::Error::IoError(ref e) if e.kind() == ErrorKind::AlreadyExists => {
                VoicemailError::FilenameInUse(file_name.clone())
            }
            source => VoicemailError::FileWrite {
                path: path.clone(),
                source,
            },
        })?;

        info!(
            "Saved {} ({} samples, {:.1}s)",
            file_name,
            buffer.len(),
            buffer.duration().as_secs_f64()
        );
        self.loaded = Some(path.clone());
        Ok(path)
    }

    /// Refresh the listing that `load` selects from
    pub fn list(&mut self) -> Result<&[CatalogEntry]> {
        self.listing = self.catalog.entries()?;
        debug!("Catalog lists {} voicemails", self.listing.len());
        Ok(&self.listing)
    }

    /// Load the entry at a 1-based index into the most recent listing
    pub fn load(&mut self, selection: &str) -> Result<&CatalogEntry> {
        if self.listing.is_empty() {
            return Err(VoicemailError::NoVoicemails);
        }

        let selection = selection.trim();
        let index = selection
            .parse::<usize>()
            .ok()
            .filter(|_| selection.chars().all(|c| c.is_ascii_digit()))
            .filter(|&n| (1..=self.listing.len()).contains(&n))
            .ok_or_else(|| VoicemailError::InvalidSelection(selection.to_string()))?;

        let entry = &self.listing[index - 1];
        info!("Loaded {}", entry.file_name);
        self.loaded = Some(entry.path.clone());
        Ok(entry)
    }

    /// Read the loaded voicemail and start playing it in the background.
    ///
    /// Returns the file name once playback has started.
    pub fn play(&mut self) -> Result<String> {
        let path = self.loaded.clone().ok_or(VoicemailError::NothingLoaded)?;
        if self.playback.is_playing() {
            return Err(VoicemailError::AlreadyActive(Activity::Playback));
        }

        let buffer = wav::read(&path).map_err(|source| VoicemailError::FileRead {
            path: path.clone(),
            source,
        })?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        self.playback.start(buffer, file_name.clone())?;
        Ok(file_name)
    }

    pub fn stop_playback(&mut self) -> Result<()> {
        self.playback.cancel()
    }

    /// Stop and release any active recording or playback
    pub fn shutdown(&mut self) {
        if self.recording.is_recording() {
            let _ = self.recording.stop();
        }
        self.playback.shutdown();
        debug!("Controller shut down");
    }
}
