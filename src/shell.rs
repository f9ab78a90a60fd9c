//! Line-oriented command shell
//!
//! Reads single-character commands, dispatches them to the controller and
//! prints one status line per outcome.

use crate::error::{Result, VoicemailError};
use crate::state::Controller;
use log::debug;
use std::io::{self, BufRead, Write};

const USAGE: &str = "Unknown command. usage: <-> r, s, v, l, p, x, q";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    StartRecording,
    StopRecording,
    Save,
    Load,
    Play,
    StopPlayback,
    Quit,
}

impl Command {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_lowercase().as_str() {
            "r" => Some(Command::StartRecording),
            "s" => Some(Command::StopRecording),
            "v" => Some(Command::Save),
            "l" => Some(Command::Load),
            "p" => Some(Command::Play),
            "x" => Some(Command::StopPlayback),
            "q" => Some(Command::Quit),
            _ => None,
        }
    }
}

pub struct Shell<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Shell<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Run until `q` or end of input
    pub fn run(&mut self, controller: &mut Controller) -> io::Result<()> {
        self.print_banner()?;

        loop {
            let Some(line) = self.prompt("Enter command: ")? else {
                writeln!(self.output)?;
                break;
            };

            match Command::parse(&line) {
                Some(Command::Quit) => break,
                Some(command) => {
                    debug!("Dispatching {:?}", command);
                    self.dispatch(command, controller)?;
                }
                None => writeln!(self.output, "{}", USAGE)?,
            }
        }

        if controller.is_recording() {
            writeln!(self.output, "Stopping recording")?;
        }
        if controller.is_playing() {
            writeln!(self.output, "Stopping playback")?;
        }
        writeln!(self.output, "Exiting")?;
        Ok(())
    }

    fn print_banner(&mut self) -> io::Result<()> {
        writeln!(self.output, "Voicemail recorder")?;
        writeln!(self.output, "Commands:")?;
        writeln!(self.output, "r - Start recording")?;
        writeln!(self.output, "s - Stop recording")?;
        writeln!(self.output, "v - Save voicemail")?;
        writeln!(self.output, "l - Load a voicemail")?;
        writeln!(self.output, "p - Play the loaded voicemail")?;
        writeln!(self.output, "x - Stop playback")?;
        writeln!(self.output, "q - Quit")
    }

    /// Print `message` and read one line; `None` at end of input
    fn prompt(&mut self, message: &str) -> io::Result<Option<String>> {
        write!(self.output, "{}", message)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn dispatch(&mut self, command: Command, controller: &mut Controller) -> io::Result<()> {
        let status = match command {
            Command::StartRecording => controller
                .start_recording()
                .map(|()| "Recording, press s to stop.".to_string()),
            Command::StopRecording => controller
                .stop_recording()
                .map(|()| "Recording stopped. Save voicemail by pressing v".to_string()),
            Command::Save => return self.save(controller),
            Command::Load => return self.load(controller),
            Command::Play => controller
                .play()
                .map(|name| format!("Playing voicemail: {}", name)),
            Command::StopPlayback => controller
                .stop_playback()
                .map(|()| "Playback cancelled".to_string()),
            Command::Quit => return Ok(()),
        };
        self.report(status)
    }

    fn save(&mut self, controller: &mut Controller) -> io::Result<()> {
        if let Err(e) = controller.ensure_capture() {
            return self.report(Err(e));
        }
        let Some(name) = self.prompt("Enter a filename (filename.wav): ")? else {
            return Ok(());
        };
        let status = controller
            .save(&name)
            .map(|_| "Voicemail saved".to_string());
        self.report(status)
    }

    fn load(&mut self, controller: &mut Controller) -> io::Result<()> {
        let listing = match controller.list() {
            Ok(listing) if listing.is_empty() => {
                return self.report(Err(VoicemailError::NoVoicemails))
            }
            Ok(listing) => listing,
            Err(e) => return self.report(Err(e)),
        };

        writeln!(self.output, "Available Voicemails:")?;
        for (i, entry) in listing.iter().enumerate() {
            writeln!(self.output, "{}. {}", i + 1, entry)?;
        }

        let Some(choice) = self.prompt("Enter the index of the voicemail: ")? else {
            return Ok(());
        };
        let status = controller
            .load(&choice)
            .map(|entry| format!("Loaded voicemail: {}", entry.file_name));
        self.report(status)
    }

    fn report(&mut self, status: Result<String>) -> io::Result<()> {
        match status {
            Ok(message) => writeln!(self.output, "{}", message),
            Err(e) => {
                debug!("Command failed: {:?}", e);
                writeln!(self.output, "{}", e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::fake::{FakeCapture, FakeSink};
    use crate::state::Catalog;
    use std::fs;
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::mpsc;
    use std::sync::Arc;

    fn controller(dir: &Path, capture: &FakeCapture) -> Controller {
        let (tx, _rx) = mpsc::channel();
        Controller::new(
            Catalog::open(dir).unwrap(),
            Arc::new(capture.clone()),
            Arc::new(FakeSink::new(0.0)),
            tx,
        )
    }

    fn run(script: &str, controller: &mut Controller) -> String {
        let mut output = Vec::new();
        Shell::new(Cursor::new(script.as_bytes()), &mut output)
            .run(controller)
            .unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("r"), Some(Command::StartRecording));
        assert_eq!(Command::parse(" X \n"), Some(Command::StopPlayback));
        assert_eq!(Command::parse("Q"), Some(Command::Quit));
        assert_eq!(Command::parse("rs"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn test_unknown_command_prints_usage() {
        let dir = tempfile::tempdir().unwrap();
        let capture = FakeCapture::new();
        let mut controller = controller(dir.path(), &capture);

        let output = run("z\nq\n", &mut controller);
        assert!(output.contains(USAGE));
        assert!(output.ends_with("Exiting\n"));
        assert!(!controller.is_recording());
    }

    #[test]
    fn test_status_lines_for_misuse() {
        let dir = tempfile::tempdir().unwrap();
        let capture = FakeCapture::new();
        let mut controller = controller(dir.path(), &capture);

        let output = run("s\nv\nl\np\nx\nq\n", &mut controller);
        assert!(output.contains("Not recording"));
        assert!(output.contains("Nothing recorded to save. Record first"));
        assert!(output.contains("No voicemails found."));
        assert!(output.contains("No voicemail loaded or saved."));
        assert!(output.contains("Nothing in playback"));
        assert!(!output.contains("Enter a filename"));
    }

    #[test]
    fn test_record_save_load_session() {
        let dir = tempfile::tempdir().unwrap();
        let capture = FakeCapture::new();
        let mut controller = controller(dir.path(), &capture);

        controller.start_recording().unwrap();
        capture.deliver(&[0.5, -0.5]);
        let output = run("r\ns\nv\nhello\nv\nhello\nl\n7\nl\n1\nq\n", &mut controller);

        assert!(output.contains("Already recording"));
        assert!(output.contains("Recording stopped."));
        assert!(output.contains("Voicemail saved"));
        assert!(output.contains("Filename in use: hello.wav"));
        assert!(output.contains("1. hello.wav"));
        assert!(output.contains("Invalid selection: '7'"));
        assert!(output.contains("Loaded voicemail: hello.wav"));
        assert!(fs::metadata(dir.path().join("hello.wav")).unwrap().len() > 44);
    }

    #[test]
    fn test_eof_quits_and_reports_active_recording() {
        let dir = tempfile::tempdir().unwrap();
        let capture = FakeCapture::new();
        let mut controller = controller(dir.path(), &capture);

        let output = run("r\n", &mut controller);
        assert!(output.contains("Recording, press s to stop."));
        assert!(output.ends_with("Stopping recording\nExiting\n"));

        controller.shutdown();
        assert_eq!(capture.closed(), 1);
    }
}
