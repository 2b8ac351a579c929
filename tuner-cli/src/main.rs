//! # String Tuner - Observation Replay CLI
//!
//! Feeds a recorded stream of pitch observations through a tuning session
//! and prints every tuning state the session publishes.
//!
//! ## Architecture
//! - **Main Thread**: reads JSON lines and pushes observations into the session
//! - **Session Worker**: runs the decision engine (inside the core crate)
//! - **Printer Thread**: receives published states and writes them to stdout
//! - **Communication**: Crossbeam channels between all three

mod render;

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use crossbeam_channel::Receiver;
use string_tuner_core::config::TunerConfig;
use string_tuner_core::{ObservationSender, PitchObservation, TuningSession, TuningState};

/// How long to wait for queued observations after the input ends.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Replays pitch observations through the guitar/ukulele tuning engine
#[derive(Parser, Debug)]
#[command(name = "string-tuner")]
#[command(about = "Replays recorded pitch observations through the tuning engine", long_about = None)]
struct Args {
    /// Configuration file (JSON)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Instrument id, overrides the configuration
    #[arg(short = 'i', long = "instrument")]
    instrument: Option<String>,

    /// Tune towards this string only (e.g. "E2")
    #[arg(short = 'p', long = "pin")]
    pin: Option<String>,

    /// Print states as JSON lines instead of a meter
    #[arg(long = "json")]
    json: bool,

    /// List available instruments and exit
    #[arg(short = 'l', long = "list")]
    list: bool,

    /// Observation stream, one JSON object per line ("-" or omitted for stdin)
    #[arg(long = "input")]
    input: Option<PathBuf>,
}

/// Counts of a finished replay.
#[derive(Debug, Default, PartialEq, Eq)]
struct ReplayStats {
    submitted: usize,
    skipped: usize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => TunerConfig::load(path)?,
        None => TunerConfig::default(),
    };

    if args.list {
        return list_instruments(&config);
    }

    let profile = match &args.instrument {
        Some(id) => config.find_instrument(id)?,
        None => config.resolve_instrument()?,
    };
    log::info!("[MAIN] Tuning {} ({} strings)", profile.name(), profile.strings().len());

    let mut session = TuningSession::new(profile, config.engine.clone())?;
    session.set_corrector(config.corrector());
    if let Some(name) = &args.pin {
        let target = session
            .pin_string(name)
            .with_context(|| format!("Cannot pin string '{}'", name))?;
        log::info!("[MAIN] Pinned to {} ({:.2} Hz)", target.name, target.frequency_hz);
    }

    let states = session.subscribe();
    let json = args.json;
    let printer = thread::spawn(move || print_states(states, json));

    session.start()?;
    let input = open_input(args.input.as_deref())?;
    let stats = replay(input, &session.observation_sender())?;

    if !session.wait_until_drained(DRAIN_TIMEOUT) {
        log::warn!("[MAIN] Timed out waiting for the session to drain");
    }
    session.stop();
    // Dropping the session closes the subscriber channel and ends the printer
    drop(session);

    let printed = printer
        .join()
        .map_err(|_| anyhow!("Printer thread panicked"))??;
    log::info!(
        "[MAIN] Replayed {} observations ({} lines skipped), {} states published",
        stats.submitted,
        stats.skipped,
        printed
    );
    Ok(())
}

fn list_instruments(config: &TunerConfig) -> Result<()> {
    let mut out = io::stdout().lock();
    for profile in config.instruments()? {
        let strings: Vec<String> = profile
            .strings()
            .iter()
            .map(|s| format!("{}={:.2}", s.name, s.frequency_hz))
            .collect();
        writeln!(out, "{:<10} {:<16} {}", profile.id(), profile.name(), strings.join(" "))?;
    }
    Ok(())
}

fn open_input(path: Option<&Path>) -> Result<Box<dyn BufRead>> {
    match path {
        Some(path) if path != Path::new("-") => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open input file: {}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        _ => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

/// Parses one input line. Blank lines and `#` comments yield `None`.
fn parse_line(line: &str) -> Option<serde_json::Result<PitchObservation>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(serde_json::from_str(line))
}

fn replay(input: impl BufRead, sender: &ObservationSender) -> Result<ReplayStats> {
    let mut stats = ReplayStats::default();
    for (index, line) in input.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read input line {}", index + 1))?;
        match parse_line(&line) {
            None => {}
            Some(Ok(observation)) => {
                sender.submit(observation)?;
                stats.submitted += 1;
            }
            Some(Err(e)) => {
                log::warn!("[MAIN] Skipping line {}: {}", index + 1, e);
                stats.skipped += 1;
            }
        }
    }
    Ok(stats)
}

fn print_states(states: Receiver<TuningState>, json: bool) -> Result<usize> {
    let mut out = io::stdout().lock();
    let mut printed = 0;
    for state in states.iter() {
        if json {
            serde_json::to_writer(&mut out, &state)?;
            writeln!(out)?;
        } else {
            writeln!(out, "{}", render::format_state(&state))?;
        }
        printed += 1;
    }
    out.flush()?;
    Ok(printed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use string_tuner_core::{EngineConfig, instrument::guitar_standard};

    #[test]
    fn test_parse_line() {
        assert!(parse_line("").is_none());
        assert!(parse_line("   # recorded on a Strat").is_none());

        let observation = parse_line(r#"{"frequency_hz": 110.0, "confidence": 0.9, "amplitude": 0.3}"#)
            .unwrap()
            .unwrap();
        assert_eq!(observation, PitchObservation::new(110.0, 0.9, 0.3));

        assert!(parse_line(r#"{"frequency_hz": 110.0}"#).unwrap().is_err());
    }

    #[test]
    fn test_replay_through_session() {
        let mut session = TuningSession::new(guitar_standard(), EngineConfig::default()).unwrap();
        let states = session.subscribe();
        session.start().unwrap();

        let input = Cursor::new(
            "# low E then A\n\
             {\"frequency_hz\": 82.41, \"confidence\": 0.95, \"amplitude\": 0.2}\n\
             \n\
             garbage\n\
             {\"frequency_hz\": 111.0, \"confidence\": 0.95, \"amplitude\": 0.2}\n",
        );
        let stats = replay(input, &session.observation_sender()).unwrap();
        assert_eq!(stats, ReplayStats { submitted: 2, skipped: 1 });

        assert!(session.wait_until_drained(Duration::from_secs(2)));
        let received: Vec<TuningState> = states.try_iter().collect();
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].matched_string.as_ref().unwrap().name, "E2");
        assert_eq!(received[1].matched_string.as_ref().unwrap().name, "A2");
    }
}
