//! Voicemail - a terminal voice message recorder for Linux
//!
//! This is the main entry point for the Voicemail application.

mod audio;
mod cli;
mod error;
mod models;
mod session;
mod settings;
mod shell;
mod state;

use anyhow::Context;
use audio::{resolve_device, Direction, PipeWireCapture, PipeWireSink};
use clap::Parser;
use log::info;
use models::PlaybackEvent;
use settings::{Settings, StoredSettings};
use shell::Shell;
use state::{Catalog, Controller};
use std::io;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

fn main() -> anyhow::Result<()> {
    // Parse command-line arguments and initialize logging
    let args = cli::Args::parse();
    cli::init_logging(&args);

    info!("Starting Voicemail");

    let settings = Settings::resolve(&args, StoredSettings::load());
    if args.remember {
        settings.remember();
    }

    // Bad device identifiers fail here rather than falling back to a default
    let input = settings
        .input_device
        .as_deref()
        .map(|id| resolve_device(id, Direction::Input))
        .transpose()
        .context("Failed to open input device")?;
    let output = settings
        .output_device
        .as_deref()
        .map(|id| resolve_device(id, Direction::Output))
        .transpose()
        .context("Failed to open output device")?;

    for (label, device) in [("Input", &input), ("Output", &output)] {
        match device {
            Some(device) => info!("{} device: {} (node {})", label, device.description, device.id),
            None => info!("{} device: system default", label),
        }
    }

    let catalog = Catalog::open(&settings.voicemail_dir).with_context(|| {
        format!(
            "Failed to open voicemail directory {}",
            settings.voicemail_dir.display()
        )
    })?;

    info!("Voicemails stored in {}", catalog.dir().display());

    let (events_tx, events_rx) = mpsc::channel::<PlaybackEvent>();
    let mut controller = Controller::new(
        catalog,
        Arc::new(PipeWireCapture::new(input)),
        Arc::new(PipeWireSink::new(output)),
        events_tx,
    );

    // Background playback announces completion without waiting for input
    thread::Builder::new()
        .name("voicemail-status".to_string())
        .spawn(move || {
            for event in events_rx {
                println!("{}", event);
            }
        })
        .context("Failed to start status thread")?;

    let stdin = io::stdin();
    let result = Shell::new(stdin.lock(), io::stdout()).run(&mut controller);

    controller.shutdown();
    result.context("Command shell failed")?;

    info!("Voicemail exited cleanly");
    Ok(())
}
