//! Engine wiring
//!
//! Builds the event bus, field store, triggered event manager and
//! dispatcher from configuration, and applies script lines to them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, Timelike};
use cqc_config::{EngineConfig, NightSettings};
use cqc_event_bus::EventBus;
use cqc_field_store::FieldStore;
use cqc_trigger::{Dispatcher, FiredTrigger, TriggeredEventManager};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::script::ScriptLine;

/// How often the night flag is recomputed
const NIGHT_TICK: Duration = Duration::from_secs(60);

/// The running trigger engine
pub struct Engine {
    bus: Arc<EventBus>,
    store: Arc<FieldStore>,
    manager: Arc<TriggeredEventManager>,
    dispatcher: Dispatcher,
    night: NightSettings,
}

impl Engine {
    /// Build an engine from loaded configuration
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let settings = &config.engine;
        let bus = Arc::new(EventBus::with_capacity(settings.event_bus.capacity));

        let store = Arc::new(FieldStore::new(bus.clone()));
        for def in &config.fields {
            store
                .define_field(def)
                .with_context(|| format!("defining field {}", def.field))?;
        }

        let manager = Arc::new(TriggeredEventManager::new());
        manager
            .load(&config.triggered_events)
            .context("loading triggered events")?;

        let dispatcher = Dispatcher::new(manager.clone())
            .with_remote(store.clone())
            .with_timeouts(settings.remote.timeouts());

        info!(
            fields = store.field_count(),
            triggered_events = manager.count(),
            "Engine initialized"
        );

        Ok(Self {
            bus,
            store,
            manager,
            dispatcher,
            night: settings.night,
        })
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn store(&self) -> &Arc<FieldStore> {
        &self.store
    }

    pub fn manager(&self) -> &Arc<TriggeredEventManager> {
        &self.manager
    }

    /// Fix the night flag
    pub fn set_night(&self, is_night: bool) {
        self.dispatcher.set_night(is_night);
    }

    /// Set the night flag from an hour of the day, returning the new value
    pub fn update_night(&self, hour: u32) -> bool {
        let is_night = self.night.is_night(hour);
        self.dispatcher.set_night(is_night);
        is_night
    }

    /// Keep the night flag in step with the local clock
    pub fn spawn_night_ticker(&self) -> JoinHandle<()> {
        let dispatcher = self.dispatcher.clone();
        let night = self.night;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(NIGHT_TICK);
            loop {
                interval.tick().await;
                let is_night = night.is_night(Local::now().hour());
                dispatcher.set_night(is_night);
                debug!(is_night, "Night flag updated");
            }
        })
    }

    /// Apply one script line
    pub fn apply(&self, line: ScriptLine) -> Result<()> {
        match line {
            ScriptLine::Event(event) => {
                debug!(class = %event.class(), source = %event.source(), "Firing scripted event");
                self.bus.fire(event);
            }
            ScriptLine::Write { field, value } => {
                let outcome = self
                    .store
                    .write(&field, value)
                    .with_context(|| format!("writing {field}"))?;
                debug!(field = %field, changed = outcome.changed, triggered = outcome.triggered, "Scripted write");
            }
            ScriptLine::Driver { moniker, state } => {
                self.store.set_driver_state(moniker, state);
            }
        }
        Ok(())
    }

    /// Start dispatching bus events, sending fired triggers to `tx`
    ///
    /// Subscribes before returning, so every event fired afterwards is seen.
    pub fn start(&self, tx: mpsc::Sender<FiredTrigger>) -> RunningDispatcher {
        let events = self.bus.subscribe_all();
        let baseline = self.bus.published();
        let dispatcher = self.dispatcher.clone();
        let (stop, stop_rx) = oneshot::channel();
        let (progress_tx, progress) = watch::channel(0);

        let task = tokio::spawn(async move {
            let shutdown = async {
                let _ = stop_rx.await;
            };
            dispatcher
                .run_with_progress(events, tx, shutdown, progress_tx)
                .await
        });

        RunningDispatcher {
            stop,
            task,
            progress,
            baseline,
        }
    }
}

/// Handle to a dispatcher started with [`Engine::start`]
pub struct RunningDispatcher {
    stop: oneshot::Sender<()>,
    task: JoinHandle<usize>,
    progress: watch::Receiver<u64>,
    /// Bus count when the dispatcher subscribed
    baseline: u64,
}

impl RunningDispatcher {
    /// Wait until the dispatcher has handled every event up to `published`
    ///
    /// `published` is a reading of [`EventBus::published`]. Fails if the
    /// dispatcher stopped first.
    pub async fn caught_up(&mut self, published: u64) -> Result<()> {
        let target = published.saturating_sub(self.baseline);
        self.progress
            .wait_for(|&handled| handled >= target)
            .await
            .map(|_| ())
            .context("dispatcher stopped before catching up")
    }

    /// Stop after the queued events, returning how many triggers fired
    pub async fn shutdown(self) -> Result<usize> {
        if self.stop.send(()).is_err() {
            warn!("Dispatcher already stopped");
        }
        self.task.await.context("dispatcher task failed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cqc_core::{DriverState, Event};

    const CONFIG: &str = r#"
engine:
  night:
    start_hour: 22
    end_hour: 6
fields:
  - field: Thermo.Temp
    type: int
    value: 68
    trigger:
      type: on_expression
      expression:
        statement: IsGreaterThan
        compare: "75"
      latch: unidirectional
triggered_events:
  - id: too_hot
    title: Too hot
    filters:
      - kind: IsOfClass
        comp: cqsl.fieldtrigger
  - id: motion_at_night
    filters:
      - kind: IsMotionStartEv
      - kind: IsNight
"#;

    fn engine() -> Engine {
        let yaml: cqc_config::Value = serde_yaml::from_str(CONFIG).unwrap();
        let config = EngineConfig::from_yaml(yaml).unwrap();
        config.validate().unwrap();
        Engine::from_config(&config).unwrap()
    }

    fn line(json: &str) -> ScriptLine {
        ScriptLine::parse(json).unwrap().unwrap()
    }

    #[test]
    fn test_from_config() {
        let engine = engine();
        assert_eq!(engine.store().field_count(), 1);
        assert_eq!(engine.manager().count(), 2);
        assert_eq!(engine.store().driver("Thermo"), Some(DriverState::Connected));
    }

    #[test]
    fn test_update_night() {
        let engine = engine();
        assert!(engine.update_night(23));
        assert!(!engine.update_night(12));
    }

    #[test]
    fn test_apply_write_and_driver() {
        let engine = engine();
        let result = engine.apply(line(r#"{"write": {"field": "Thermo.Mode", "value": 1}}"#));
        assert!(result.is_err());

        engine
            .apply(line(r#"{"driver": {"moniker": "Thermo", "state": "wait_connect"}}"#))
            .unwrap();
        assert_eq!(engine.store().driver("Thermo"), Some(DriverState::WaitConnect));
    }

    #[tokio::test]
    async fn test_script_replay() {
        let engine = engine();
        engine.update_night(12);

        let (tx, mut rx) = mpsc::channel(16);
        let running = engine.start(tx);

        for json in [
            // Baseline, then crossing the threshold fires the field trigger
            r#"{"write": {"field": "Thermo.Temp", "value": 70}}"#,
            r#"{"write": {"field": "Thermo.Temp", "value": 80}}"#,
            r#"{"event": {"class": "cqsl.motion", "source": "Hall", "payload": {"MotionType": "start"}}}"#,
        ] {
            engine.apply(line(json)).unwrap();
        }
        engine.bus().fire(Event::motion("Porch", true));

        let forwarded = running.shutdown().await.unwrap();
        let mut ids = Vec::new();
        while let Some(fired) = rx.recv().await {
            ids.push(fired.id);
        }

        // Daytime, so motion alone does not fire
        assert_eq!(ids, ["too_hot"]);
        assert_eq!(forwarded, 1);
    }
}
