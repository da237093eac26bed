//! CAN Recorder CLI Application
//!
//! Command-line front end for the can-recorder library:
//! - Records from a CAN interface (or a virtual bus / replayed trace)
//! - Shows the live per-identifier table while recording
//! - Saves the session as a `.trc` trace and an optional JSON summary

use anyhow::{Context, Result};
use can_recorder::{
    IdentifierStats, InterfaceKind, LiveTable, Recorder, ReplaySource, VirtualNetwork,
};
use clap::Parser;
use crossbeam::channel::{after, never, tick};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

mod config;
mod simulate;
mod view;

use config::{AppConfig, Overrides};
use simulate::Simulator;

/// CAN Recorder - Capture CAN traffic and save it as PEAK trace files
#[derive(Parser, Debug)]
#[command(name = "can-recorder-cli")]
#[command(about = "Record CAN traffic with live statistics and .trc export", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Interface kind: pcan, kvaser, canalystii, virtual
    #[arg(long, value_name = "KIND")]
    interface: Option<InterfaceKind>,

    /// Channel to open (default depends on the interface)
    #[arg(long, value_name = "NAME")]
    channel: Option<String>,

    /// Bus bitrate in bit/s (125000, 250000, 500000, 1000000)
    #[arg(long, value_name = "BPS")]
    bitrate: Option<u32>,

    /// Stop recording after this many seconds (default: until the source stops)
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,

    /// Save the recorded session to this .trc file
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Replay a .trc file instead of opening an interface
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Replay as fast as possible instead of at recorded speed
    #[arg(long)]
    no_pacing: bool,

    /// Generate synthetic traffic on the virtual bus
    #[arg(long)]
    simulate: bool,

    /// Write per-identifier statistics as JSON
    #[arg(long, value_name = "FILE")]
    summary: Option<PathBuf>,

    /// Verbosity level (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            interface: self.interface,
            channel: self.channel.clone(),
            bitrate: self.bitrate,
            duration_secs: self.duration,
            trace: self.output.clone(),
            summary: self.summary.clone(),
            replay: self.replay.clone(),
            no_pacing: self.no_pacing,
            simulate: self.simulate,
        }
    }
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging
    init_logging(args.verbose, args.quiet);

    log::info!("CAN Recorder CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using recorder library v{}", can_recorder::VERSION);

    let base = match &args.config {
        Some(path) => {
            log::info!("Loading configuration from: {:?}", path);
            config::load_config(path)?
        }
        None => AppConfig::default(),
    };
    let config = base.apply(args.overrides())?;
    log::debug!("Effective configuration: {:?}", config);

    record(&config, args.quiet)
}

/// Run one recording session from start to export
fn record(config: &AppConfig, quiet: bool) -> Result<()> {
    let mut recorder = Recorder::new(config.recording.pipeline.clone());
    let mut table = LiveTable::new();

    match &config.replay {
        Some(replay) => {
            let source = ReplaySource::open(&replay.file, replay.paced)
                .with_context(|| format!("Failed to open replay file: {:?}", replay.file))?;
            recorder.start_with_source(Box::new(source), &mut table)?;
        }
        None => {
            log::info!("Opening {}", config.interface);
            recorder.start(&config.interface, &mut table)?;
        }
    }

    let mut simulator = if config.simulate {
        Some(Simulator::spawn(VirtualNetwork::global(), &config.interface)?)
    } else {
        None
    };

    let ticker = tick(config.recording.pipeline.refresh_interval());
    let deadline = match config.recording.duration() {
        Some(duration) => after(duration),
        None => never(),
    };

    loop {
        crossbeam::select! {
            recv(ticker) -> _ => {
                let running = recorder.tick(&mut table);
                if !quiet {
                    view::redraw(&table);
                }
                if !running {
                    break;
                }
            }
            recv(deadline) -> _ => {
                log::info!("Recording duration reached");
                break;
            }
        }
    }

    if let Some(sim) = simulator.as_mut() {
        sim.stop();
    }
    recorder.stop(&mut table);
    if !quiet {
        view::redraw(&table);
    }

    if let Some(path) = &config.output.trace {
        let written = recorder.export(path, &mut table)?;
        println!("Saved {} messages to {:?}", written, path);
    }

    if let (Some(path), Some(stats)) = (&config.output.summary, recorder.statistics()) {
        let total = recorder.session_log().map_or(0, |log| log.len());
        write_summary(path, &stats.snapshot(), total)?;
        println!("Summary written to {:?}", path);
    }

    Ok(())
}

#[derive(Serialize)]
struct Summary<'a> {
    generator: String,
    total_messages: usize,
    identifiers: &'a [IdentifierStats],
}

/// Write the per-identifier statistics of the finished session as JSON
fn write_summary(path: &Path, identifiers: &[IdentifierStats], total: usize) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create summary file: {:?}", path))?;
    let summary = Summary {
        generator: format!("can-recorder v{}", can_recorder::VERSION),
        total_messages: total,
        identifiers,
    };
    serde_json::to_writer_pretty(BufWriter::new(file), &summary)
        .with_context(|| format!("Failed to write summary file: {:?}", path))?;
    Ok(())
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
