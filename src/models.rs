use crate::audio::AudioError;
use chrono::{DateTime, Local};
use std::fmt;
use std::path::PathBuf;

/// A voicemail file found in the catalog directory
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub file_name: String,
    pub path: PathBuf,
    /// Derived from the WAV header; `None` if the header is unreadable
    pub duration_seconds: Option<f64>,
    pub modified: Option<DateTime<Local>>,
}

impl fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_name)?;
        match (self.duration_seconds, self.modified) {
            (Some(duration), Some(modified)) => write!(
                f,
                " ({:.1}s, {})",
                duration,
                modified.format("%Y-%m-%d %H:%M")
            ),
            (Some(duration), None) => write!(f, " ({:.1}s)", duration),
            (None, Some(modified)) => write!(f, " ({})", modified.format("%Y-%m-%d %H:%M")),
            (None, None) => Ok(()),
        }
    }
}

/// Reported by a background playback that ended on its own
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    Finished { file_name: String },
    Failed { file_name: String, error: AudioError },
}

impl fmt::Display for PlaybackEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackEvent::Finished { .. } => write!(f, "Playback finished"),
            PlaybackEvent::Failed { file_name, error } => {
                write!(f, "Playback of {} failed: {}", file_name, error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_display() {
        let entry = CatalogEntry {
            file_name: "mom.wav".to_string(),
            path: PathBuf::from("/tmp/mom.wav"),
            duration_seconds: Some(12.34),
            modified: None,
        };
        assert_eq!(entry.to_string(), "mom.wav (12.3s)");

        let bare = CatalogEntry {
            duration_seconds: None,
            ..entry
        };
        assert_eq!(bare.to_string(), "mom.wav");
    }
}
