//! CQC triggered event engine
//!
//! Loads the engine configuration, replays an event script through the
//! field store and event bus, and prints every triggered event that fires
//! as a JSON line on stdout. Logs go to stderr.

mod engine;
mod output;
mod script;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{Local, Timelike};
use clap::Parser;
use cqc_config::{EngineConfig, DEFAULT_CONFIG_FILE};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::engine::{Engine, RunningDispatcher};
use crate::output::OutputFormat;
use crate::script::ScriptLine;

/// Replay driver events through configured triggered events
#[derive(Parser)]
#[command(name = "cqc-events")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration directory
    #[arg(short, long, default_value = ".")]
    config_dir: PathBuf,

    /// Configuration file, relative to the configuration directory
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    file: PathBuf,

    /// JSON lines event script (default: stdin)
    #[arg(short, long)]
    script: Option<PathBuf>,

    /// Fix the night flag instead of following the local clock
    #[arg(long)]
    night: Option<bool>,

    /// Print each fired trigger as this text, with %(key) runtime values
    /// substituted, instead of JSON
    #[arg(short, long)]
    template: Option<String>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!(config_dir = ?cli.config_dir, file = ?cli.file, "Starting CQC event engine");

    let config = EngineConfig::load(&cli.config_dir, &cli.file)?;
    let engine = Engine::from_config(&config)?;

    let ticker = match cli.night {
        Some(is_night) => {
            engine.set_night(is_night);
            None
        }
        None => {
            engine.update_night(Local::now().hour());
            Some(engine.spawn_night_ticker())
        }
    };

    let format = match cli.template {
        Some(template) => OutputFormat::Template(template),
        None => OutputFormat::Json,
    };

    let (tx, mut rx) = mpsc::channel(config.engine.event_bus.capacity);
    let mut running = engine.start(tx);
    let printer = tokio::spawn(async move {
        while let Some(fired) = rx.recv().await {
            match format.render(&fired) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(id = %fired.id, error = %e, "Could not render fired trigger"),
            }
        }
    });

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &cli.script {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening script {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(tokio::io::stdin())),
    };
    let applied = replay(&engine, &mut running, reader).await?;

    let fired = running.shutdown().await?;
    printer.await.context("output task failed")?;
    if let Some(ticker) = ticker {
        ticker.abort();
    }

    info!(
        lines = applied,
        fired,
        fields = engine.store().field_count(),
        triggered_events = engine.manager().count(),
        "Script finished"
    );
    Ok(())
}

/// Apply every script line, returning how many were applied
///
/// Lines that fail to parse or apply are logged and skipped. Each line waits
/// for the dispatcher to handle the events it raised, so the bus never gets
/// more than one line ahead.
async fn replay(
    engine: &Engine,
    running: &mut RunningDispatcher,
    reader: impl AsyncBufRead + Unpin,
) -> Result<usize> {
    let mut lines = reader.lines();
    let mut line_no = 0;
    let mut applied = 0;

    while let Some(text) = lines.next_line().await.context("reading script")? {
        line_no += 1;
        let line = match ScriptLine::parse(&text) {
            Ok(Some(line)) => line,
            Ok(None) => continue,
            Err(e) => {
                warn!(line = line_no, error = %e, "Skipping malformed script line");
                continue;
            }
        };

        match engine.apply(line) {
            Ok(()) => applied += 1,
            Err(e) => warn!(line = line_no, error = %format!("{e:#}"), "Script line failed"),
        }
        running.caught_up(engine.bus().published()).await?;
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cqc_core::FieldValue;

    #[tokio::test]
    async fn test_replay_skips_bad_lines() {
        let yaml = "fields:\n  - field: Lights.Porch\n    type: boolean\n";
        let config = EngineConfig::from_yaml(serde_yaml::from_str(yaml).unwrap()).unwrap();
        let engine = Engine::from_config(&config).unwrap();
        let (tx, _rx) = mpsc::channel(8);
        let mut running = engine.start(tx);

        let script = br#"
# porch light on, then junk, then a write to an unknown field
{"write": {"field": "Lights.Porch", "value": true}}
{"write": 
{"write": {"field": "Lights.Hall", "value": true}}
{"driver": {"moniker": "Lights", "state": "connected"}}
"#;
        let applied = replay(&engine, &mut running, &script[..]).await.unwrap();
        running.shutdown().await.unwrap();

        assert_eq!(applied, 2);
        assert_eq!(
            engine.store().get(&"Lights.Porch".parse().unwrap()),
            Some(FieldValue::Boolean(true))
        );
    }

    #[tokio::test]
    async fn test_config_dir_to_fired_triggers() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            r#"
fields:
  - field: Garage.Door1
    type: string
    value: Closed
triggered_events:
  - id: garage_opened
    filters:
      - kind: IsNewFldValFor
        field: Garage.Door1
        comp: Open
"#,
        )
        .unwrap();

        let config = EngineConfig::load(dir.path(), DEFAULT_CONFIG_FILE).unwrap();
        let engine = Engine::from_config(&config).unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let mut running = engine.start(tx);

        let script = br#"{"write": {"field": "Garage.Door1", "value": "Open"}}"#;
        assert_eq!(replay(&engine, &mut running, &script[..]).await.unwrap(), 1);
        assert_eq!(running.shutdown().await.unwrap(), 1);

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.id, "garage_opened");
        assert_eq!(fired.event.value("FldValue"), "Open");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_replay_longer_than_bus_capacity() {
        let yaml = r#"
engine:
  event_bus:
    capacity: 16
fields:
  - field: Meter.Count
    type: int
triggered_events:
  - id: count_changed
    filters:
      - kind: IsFieldChange
"#;
        let config = EngineConfig::from_yaml(serde_yaml::from_str(yaml).unwrap()).unwrap();
        let engine = Engine::from_config(&config).unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        let mut running = engine.start(tx);
        let counter = tokio::spawn(async move {
            let mut count = 0;
            while rx.recv().await.is_some() {
                count += 1;
            }
            count
        });

        let script: String = (1..=500)
            .map(|i| format!("{{\"write\": {{\"field\": \"Meter.Count\", \"value\": {i}}}}}\n"))
            .collect();
        let applied = replay(&engine, &mut running, script.as_bytes()).await.unwrap();

        assert_eq!(applied, 500);
        assert_eq!(running.shutdown().await.unwrap(), 500);
        assert_eq!(counter.await.unwrap(), 500);
    }
}
