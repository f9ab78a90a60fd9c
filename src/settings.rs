//! Application settings persistence using dconf
//!
//! Defaults are stored in dconf under `/com/voicemail/` and overridden by
//! command-line flags.

use crate::cli::Args;
use log::error;
use std::path::PathBuf;

const DCONF_PATH: &str = "/com/voicemail/";

/// Keys for dconf settings
mod keys {
    pub const INPUT_DEVICE: &str = "input-device";
    pub const OUTPUT_DEVICE: &str = "output-device";
    pub const VOICEMAIL_DIR: &str = "voicemail-dir";
}

fn get_string(key: &str) -> Option<String> {
    let key = format!("{}{}", DCONF_PATH, key);
    dconf_rs::get_string(&key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn set_string(key: &str, value: &str) {
    let key = format!("{}{}", DCONF_PATH, key);
    if let Err(e) = dconf_rs::set_string(&key, value) {
        error!("Failed to save {} to dconf: {}", key, e);
    }
}

/// Values read from dconf; `None` means unset
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoredSettings {
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub voicemail_dir: Option<PathBuf>,
}

impl StoredSettings {
    pub fn load() -> Self {
        Self {
            input_device: get_string(keys::INPUT_DEVICE),
            output_device: get_string(keys::OUTPUT_DEVICE),
            voicemail_dir: get_string(keys::VOICEMAIL_DIR).map(PathBuf::from),
        }
    }
}

/// Effective configuration for this run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    /// PipeWire node id or name; `None` uses the default source
    pub input_device: Option<String>,
    /// PipeWire node id or name; `None` uses the default sink
    pub output_device: Option<String>,
    pub voicemail_dir: PathBuf,
}

impl Settings {
    /// Merge CLI flags over stored defaults over built-in defaults
    pub fn resolve(args: &Args, stored: StoredSettings) -> Self {
        Self {
            input_device: args.input_device.clone().or(stored.input_device),
            output_device: args.output_device.clone().or(stored.output_device),
            voicemail_dir: args
                .dir
                .clone()
                .or(stored.voicemail_dir)
                .unwrap_or_else(default_voicemail_dir),
        }
    }

    /// Persist these settings as the defaults for future runs
    pub fn remember(&self) {
        if let Some(device) = &self.input_device {
            set_string(keys::INPUT_DEVICE, device);
        }
        if let Some(device) = &self.output_device {
            set_string(keys::OUTPUT_DEVICE, device);
        }
        set_string(keys::VOICEMAIL_DIR, &self.voicemail_dir.to_string_lossy());
    }
}

/// Default voicemail directory: ~/.local/share/voicemail/voicemails
pub fn default_voicemail_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("voicemail")
        .join("voicemails")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn args(argv: &[&str]) -> Args {
        Args::parse_from(std::iter::once("voicemail").chain(argv.iter().copied()))
    }

    #[test]
    fn test_cli_overrides_stored() {
        let stored = StoredSettings {
            input_device: Some("1".to_string()),
            output_device: Some("11".to_string()),
            voicemail_dir: Some(PathBuf::from("/srv/stored")),
        };
        let settings = Settings::resolve(&args(&["-i", "mic", "--dir", "/tmp/vm"]), stored);

        assert_eq!(settings.input_device.as_deref(), Some("mic"));
        assert_eq!(settings.output_device.as_deref(), Some("11"));
        assert_eq!(settings.voicemail_dir, PathBuf::from("/tmp/vm"));
    }

    #[test]
    fn test_defaults_when_unset() {
        let settings = Settings::resolve(&args(&[]), StoredSettings::default());
        assert_eq!(settings.input_device, None);
        assert_eq!(settings.output_device, None);
        assert_eq!(settings.voicemail_dir, default_voicemail_dir());
        assert!(settings.voicemail_dir.ends_with("voicemail/voicemails"));
    }
}
