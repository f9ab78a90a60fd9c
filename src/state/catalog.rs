//! Directory-backed catalog of voicemail files
//!
//! The catalog is the directory itself: no metadata is kept beyond the audio
//! files. Listings come back in directory enumeration order.

use crate::audio::wav;
use crate::error::{Result, VoicemailError};
use crate::models::CatalogEntry;
use chrono::{DateTime, Local};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix of every stored voicemail
pub const AUDIO_SUFFIX: &str = ".wav";

pub struct Catalog {
    dir: PathBuf,
}

impl Catalog {
    /// Open the catalog at `dir`, creating the directory if absent
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(VoicemailError::Catalog)?;
        debug!("Voicemail directory: {:?}", dir);
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List voicemail files in enumeration order
    pub fn entries(&self) -> Result<Vec<CatalogEntry>> {
        let read_dir = fs::read_dir(&self.dir).map_err(VoicemailError::Catalog)?;

        let entries = read_dir
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| {
                let file_name = entry.file_name().to_str()?.to_string();
                if !has_audio_suffix(&file_name) {
                    return None;
                }
                let path = entry.path();
                let modified = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .ok()
                    .map(DateTime::<Local>::from);
                Some(CatalogEntry {
                    duration_seconds: wav::duration_seconds(&path),
                    file_name,
                    path,
                    modified,
                })
            })
            .collect();

        Ok(entries)
    }

    /// Turn user input into a stored file name, appending the suffix if absent
    pub fn file_name_for(input: &str) -> Result<String> {
        let name = input.trim();
        if name.is_empty()
            || name == AUDIO_SUFFIX
            || name.contains(['/', '\\'])
            || name == "."
            || name == ".."
        {
            return Err(VoicemailError::InvalidFileName(name.to_string()));
        }
        if name.ends_with(AUDIO_SUFFIX) {
            Ok(name.to_string())
        } else {
            Ok(format!("{}{}", name, AUDIO_SUFFIX))
        }
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    /// Whether a file of this name already exists in the directory
    pub fn contains(&self, file_name: &str) -> bool {
        self.path_for(file_name).exists()
    }
}

fn has_audio_suffix(file_name: &str) -> bool {
    file_name.to_lowercase().ends_with(AUDIO_SUFFIX)
}
