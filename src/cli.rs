//! Command-line interface for Voicemail
//!
//! Handles argument parsing and logging configuration.

use clap::Parser;
use log::LevelFilter;
use std::path::PathBuf;

/// Voicemail - record, list and play back voice messages
#[derive(Parser, Debug)]
#[command(name = "voicemail")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Input device: PipeWire node id or node name
    #[arg(short, long, value_name = "DEVICE")]
    pub input_device: Option<String>,

    /// Output device: PipeWire node id or node name
    #[arg(short, long, value_name = "DEVICE")]
    pub output_device: Option<String>,

    /// Directory voicemails are stored in
    #[arg(short, long, value_name = "PATH")]
    pub dir: Option<PathBuf>,

    /// Store the effective devices and directory as defaults
    #[arg(long)]
    pub remember: bool,

    /// Increase logging verbosity
    /// -v = info, -vv = debug, -vvv = trace
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Get the log level filter based on verbosity flags
    pub fn log_level(&self) -> LevelFilter {
        if self.quiet {
            LevelFilter::Error
        } else {
            match self.verbose {
                0 => LevelFilter::Warn,
                1 => LevelFilter::Info,
                2 => LevelFilter::Debug,
                _ => LevelFilter::Trace,
            }
        }
    }
}

/// Initialize the logging system based on CLI arguments
pub fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::new();

    // Base level for all modules - keep at warn to suppress noisy deps
    builder.filter_level(LevelFilter::Warn);

    builder.filter_module("voicemail", args.log_level());

    builder.format_timestamp_millis().init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_levels() {
        assert_eq!(Args::parse_from(["voicemail"]).log_level(), LevelFilter::Warn);
        assert_eq!(Args::parse_from(["voicemail", "-vv"]).log_level(), LevelFilter::Debug);
        assert_eq!(
            Args::parse_from(["voicemail", "-vvvv"]).log_level(),
            LevelFilter::Trace
        );
        assert_eq!(
            Args::parse_from(["voicemail", "-q", "-v"]).log_level(),
            LevelFilter::Error
        );
    }

    #[test]
    fn test_device_flags() {
        let args = Args::parse_from(["voicemail", "-i", "1", "--output-device", "11"]);
        assert_eq!(args.input_device.as_deref(), Some("1"));
        assert_eq!(args.output_device.as_deref(), Some("11"));
        assert!(!args.remember);
    }
}
