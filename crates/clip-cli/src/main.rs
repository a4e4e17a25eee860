//! `clip`: play one audio clip at a time and control it from stdin.
//!
//! Resources are fetched and decoded whole, resampled to the output device rate,
//! and played through CPAL. Each stdin line is one command (`help` lists them);
//! controller events and deferred seek resumes are serviced on the same thread.

mod cli;
mod commands;

use std::io::BufRead;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use clip_player::{
    CpalBackend, OutputConfig, PlaybackCallbacks, PlaybackController, PlayerConfig, PlayerError,
};
use commands::Command;
use crossbeam_channel::Sender;
use tracing_subscriber::EnvFilter;

/// Upper bound on how long the loop sleeps with nothing scheduled.
const IDLE_WAIT: Duration = Duration::from_millis(250);

enum Input {
    Line(String),
    StdinClosed,
    Interrupt,
}

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,clip_player=info")),
        )
        .init();

    if args.list_devices {
        clip_player::device::list_default_host_devices()?;
        return Ok(());
    }

    let output = OutputConfig {
        device: args.device.clone(),
        http_timeout: Duration::from_secs(args.http_timeout_secs),
        resample_chunk_frames: args.chunk_frames,
    };
    let player = PlayerConfig {
        initial_volume: args.volume,
        seek_resume_delay: Duration::from_millis(args.seek_resume_ms),
    };

    let backend = CpalBackend::open(&output)?;
    tracing::info!(
        device = backend.device_name(),
        rate_hz = backend.sample_rate(),
        channels = backend.channels(),
        "output device"
    );
    let mut controller = PlaybackController::new(backend, player, logging_callbacks());

    let (input_tx, input_rx) = crossbeam_channel::unbounded::<Input>();
    let ctrlc_tx = input_tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(Input::Interrupt);
    })?;
    spawn_stdin_reader(input_tx);

    if let Some(resource) = args.resource.as_deref() {
        if let Err(e) = controller.load_and_play(resource) {
            eprintln!("{}", error_line(&e));
        }
    }

    let events = controller.event_receiver();
    let mut stdin_open = true;
    loop {
        let wait = controller
            .next_wakeup()
            .map_or(IDLE_WAIT, |w| w.min(IDLE_WAIT));
        let mut quit = false;
        crossbeam_channel::select! {
            recv(input_rx) -> msg => match msg {
                Ok(Input::Line(line)) => quit = !run_line(&mut controller, &line),
                Ok(Input::StdinClosed) => stdin_open = false,
                Ok(Input::Interrupt) | Err(_) => {
                    tracing::info!("interrupted");
                    quit = true;
                }
            },
            recv(events) -> event => {
                if let Ok(event) = event {
                    controller.handle_event(event);
                }
            },
            default(wait) => {},
        }
        if quit {
            break;
        }
        controller.tick();

        let idle = !controller.is_playing()
            && !controller.is_loading()
            && controller.next_wakeup().is_none();
        if !stdin_open && idle {
            break;
        }
    }

    controller.stop();
    Ok(())
}

fn spawn_stdin_reader(tx: Sender<Input>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(Input::Line(line)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!("stdin read failed: {e}");
                    break;
                }
            }
        }
        let _ = tx.send(Input::StdinClosed);
    });
}

/// Execute one command line. Returns `false` when the loop should exit.
fn run_line(controller: &mut PlaybackController<CpalBackend>, line: &str) -> bool {
    let cmd = match commands::parse_line(line) {
        Ok(Some(cmd)) => cmd,
        Ok(None) => return true,
        Err(e) => {
            eprintln!("{e}");
            return true;
        }
    };

    let result = match cmd {
        Command::Load(resource) => controller.load_and_play(&resource),
        Command::Play => controller.play(),
        Command::Pause => {
            controller.pause();
            Ok(())
        }
        Command::Stop => {
            controller.stop();
            Ok(())
        }
        Command::Seek(secs) => controller.seek(secs),
        Command::SeekPercent(pct) => controller.seek_percentage(pct),
        Command::Volume(level) => controller.set_volume(level),
        Command::Mute => {
            controller.mute();
            Ok(())
        }
        Command::Unmute => {
            controller.unmute();
            Ok(())
        }
        Command::Time => controller.try_playback_time().map(|t| println!("{t:.3}")),
        Command::Duration => controller.try_current_duration().map(|d| println!("{d:.3}")),
        Command::Status => {
            match serde_json::to_string_pretty(&controller.status()) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("status encode failed: {e}"),
            }
            Ok(())
        }
        Command::Help => {
            println!("{}", commands::HELP);
            Ok(())
        }
        Command::Quit => return false,
    };

    if let Err(e) = result {
        eprintln!("{}", error_line(&e));
    }
    true
}

/// Text shown for a failed command; misuse gets a pointer to `help`.
fn error_line(err: &PlayerError) -> String {
    if err.is_invalid_argument() {
        format!("{err} (type `help` for usage)")
    } else {
        err.to_string()
    }
}

fn logging_callbacks() -> PlaybackCallbacks {
    PlaybackCallbacks::new()
        .on_buffer_loaded(|resource, duration| {
            tracing::info!(resource, duration_secs = duration, "loaded");
        })
        .on_playback_start(|| tracing::info!("playing"))
        .on_playback_pause(|| tracing::info!("paused"))
        .on_playback_stopped(|| tracing::info!("stopped"))
        .on_playback_end(|| tracing::info!("finished"))
        .on_playback_seek(|secs| tracing::info!(position_secs = secs, "seeked"))
        .on_volume_change(|level| tracing::info!(volume = level, "volume"))
        .on_error(|err| tracing::error!("{err}"))
}
