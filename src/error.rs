//! Error taxonomy for voicemail operations
//!
//! Every variant's `Display` text is the status line the shell prints.

use crate::audio::AudioError;
use std::fmt;
use std::path::PathBuf;

/// Which kind of session an error refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Activity {
    Recording,
    Playback,
}

impl Activity {
    fn already_message(self) -> &'static str {
        match self {
            Activity::Recording => "Already recording",
            Activity::Playback => "Already playing a voicemail. Type 'x' to stop.",
        }
    }

    fn idle_message(self) -> &'static str {
        match self {
            Activity::Recording => "Not recording",
            Activity::Playback => "Nothing in playback",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Activity::Recording => write!(f, "recording"),
            Activity::Playback => write!(f, "playback"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VoicemailError {
    #[error("{}", .0.already_message())]
    AlreadyActive(Activity),

    #[error("{}", .0.idle_message())]
    NotActive(Activity),

    #[error("Nothing recorded to save. Record first")]
    EmptyCapture,

    #[error("Filename in use: {0}")]
    FilenameInUse(String),

    #[error("Invalid filename: '{0}'")]
    InvalidFileName(String),

    #[error("No voicemails found.")]
    NoVoicemails,

    #[error("Invalid selection: '{0}'")]
    InvalidSelection(String),

    #[error("No voicemail loaded or saved. Load ('l') or record ('r') and save ('v') first.")]
    NothingLoaded,

    #[error("Error reading file {}: {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("Error writing file {}: {source}", .path.display())]
    FileWrite {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("Audio device error: {0}")]
    DeviceOpen(#[from] AudioError),

    #[error("Voicemail directory error: {0}")]
    Catalog(#[source] std::io::Error),

    #[error("Failed to start playback task: {0}")]
    TaskSpawn(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VoicemailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_messages() {
        assert_eq!(
            VoicemailError::AlreadyActive(Activity::Recording).to_string(),
            "Already recording"
        );
        assert_eq!(
            VoicemailError::NotActive(Activity::Playback).to_string(),
            "Nothing in playback"
        );
        assert_eq!(
            VoicemailError::NotActive(Activity::Recording).to_string(),
            "Not recording"
        );
    }

    #[test]
    fn test_device_error_converts() {
        let err: VoicemailError = AudioError::Backend("no daemon".to_string()).into();
        assert!(matches!(err, VoicemailError::DeviceOpen(_)));
        assert!(err.to_string().contains("no daemon"));
    }
}
