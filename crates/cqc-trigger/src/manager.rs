//! Triggered event management
//!
//! The manager owns every configured triggered event. Entries are stored as
//! `Arc`s and replaced whole on change, so an evaluation that already holds
//! an entry keeps seeing a consistent configuration.

use std::sync::Arc;

use cqc_core::Event;
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::context::EvalContext;
use crate::error::{EvalError, FilterError};
use crate::rtv::EventRtvs;
use crate::triggered_event::{TriggeredEvent, TriggeredEventConfig};

/// Manager errors
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Triggered event not found: {0}")]
    NotFound(String),

    #[error("Triggered event already exists: {0}")]
    Duplicate(String),

    #[error("Invalid triggered event configuration: {0}")]
    Config(#[from] FilterError),

    #[error("Evaluation failed: {0}")]
    Eval(#[from] EvalError),
}

/// Result type for manager operations
pub type ManagerResult<T> = Result<T, ManagerError>;

/// A triggered event that matched an incoming event
#[derive(Debug, Clone, Serialize)]
pub struct FiredTrigger {
    pub id: String,
    pub title: String,
    pub serialized: bool,
    pub loggable: bool,
    pub event: Event,
}

impl FiredTrigger {
    fn new(trigger: &TriggeredEvent, event: &Event) -> Self {
        Self {
            id: trigger.id().to_string(),
            title: trigger.title().to_string(),
            serialized: trigger.serialized,
            loggable: trigger.loggable,
            event: event.clone(),
        }
    }

    /// Runtime values of the triggering event
    pub fn rtvs(&self) -> EventRtvs<'_> {
        EventRtvs::new(&self.event)
    }
}

/// Manages all triggered events
pub struct TriggeredEventManager {
    /// Triggered events by ID
    events: DashMap<String, Arc<TriggeredEvent>>,
}

impl TriggeredEventManager {
    /// Create a new manager
    pub fn new() -> Self {
        Self {
            events: DashMap::new(),
        }
    }

    /// Load triggered events from configs
    ///
    /// Nothing is loaded if any config is invalid.
    pub fn load(&self, configs: &[TriggeredEventConfig]) -> ManagerResult<usize> {
        let events = configs
            .iter()
            .map(TriggeredEvent::from_config)
            .collect::<Result<Vec<_>, _>>()?;

        let count = events.len();
        for event in events {
            info!(id = %event.id(), title = %event.title(), "Loaded triggered event");
            self.events.insert(event.id().to_string(), Arc::new(event));
        }
        Ok(count)
    }

    /// Add a new triggered event, returning its ID
    pub fn insert(&self, event: TriggeredEvent) -> ManagerResult<String> {
        let id = event.id().to_string();
        if self.events.contains_key(&id) {
            return Err(ManagerError::Duplicate(id));
        }
        info!(id = %id, title = %event.title(), "Added triggered event");
        self.events.insert(id.clone(), Arc::new(event));
        Ok(id)
    }

    /// Replace an existing triggered event
    pub fn replace(&self, event: TriggeredEvent) -> ManagerResult<()> {
        let mut entry = self
            .events
            .get_mut(event.id())
            .ok_or_else(|| ManagerError::NotFound(event.id().to_string()))?;
        debug!(id = %event.id(), "Replaced triggered event");
        *entry = Arc::new(event);
        Ok(())
    }

    /// Remove a triggered event
    pub fn remove(&self, id: &str) -> ManagerResult<Arc<TriggeredEvent>> {
        self.events
            .remove(id)
            .map(|(_, e)| e)
            .ok_or_else(|| ManagerError::NotFound(id.to_string()))
    }

    /// Get a triggered event by ID
    pub fn get(&self, id: &str) -> Option<Arc<TriggeredEvent>> {
        self.events.get(id).map(|e| Arc::clone(e.value()))
    }

    /// All triggered events, ordered by ID
    pub fn all(&self) -> Vec<Arc<TriggeredEvent>> {
        let mut all: Vec<_> = self.events.iter().map(|e| Arc::clone(e.value())).collect();
        all.sort_by(|a, b| a.id().cmp(b.id()));
        all
    }

    /// Number of triggered events
    pub fn count(&self) -> usize {
        self.events.len()
    }

    /// Change a triggered event by editing a copy and swapping it in
    pub fn modify<F>(&self, id: &str, f: F) -> ManagerResult<()>
    where
        F: FnOnce(&mut TriggeredEvent) -> Result<(), FilterError>,
    {
        let mut entry = self
            .events
            .get_mut(id)
            .ok_or_else(|| ManagerError::NotFound(id.to_string()))?;

        let mut updated = TriggeredEvent::clone(entry.value());
        f(&mut updated)?;
        *entry = Arc::new(updated);
        Ok(())
    }

    /// Pause a triggered event
    pub fn pause(&self, id: &str) -> ManagerResult<()> {
        self.modify(id, |e| {
            e.paused = true;
            Ok(())
        })?;
        info!(id = %id, "Paused triggered event");
        Ok(())
    }

    /// Resume a paused triggered event
    pub fn resume(&self, id: &str) -> ManagerResult<()> {
        self.modify(id, |e| {
            e.paused = false;
            Ok(())
        })?;
        info!(id = %id, "Resumed triggered event");
        Ok(())
    }

    /// Evaluate one triggered event, returning any error
    pub fn evaluate_one(
        &self,
        id: &str,
        event: &Event,
        ctx: &EvalContext,
    ) -> ManagerResult<Option<FiredTrigger>> {
        let trigger = self
            .get(id)
            .ok_or_else(|| ManagerError::NotFound(id.to_string()))?;
        let fired = trigger.evaluate(event, ctx)?;
        Ok(fired.then(|| FiredTrigger::new(&trigger, event)))
    }

    /// Evaluate every triggered event against an event
    ///
    /// Events are evaluated in ID order. A triggered event whose evaluation
    /// fails is logged and skipped for this event only.
    pub fn evaluate_all(&self, event: &Event, ctx: &EvalContext) -> Vec<FiredTrigger> {
        let mut fired = Vec::new();

        for trigger in self.all() {
            match trigger.evaluate(event, ctx) {
                Ok(true) => {
                    if trigger.loggable {
                        info!(
                            id = %trigger.id(),
                            title = %trigger.title(),
                            class = %event.class(),
                            source = %event.source(),
                            "Triggered event fired"
                        );
                    } else {
                        debug!(id = %trigger.id(), "Triggered event fired");
                    }
                    fired.push(FiredTrigger::new(&trigger, event));
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(id = %trigger.id(), error = %e, "Triggered event evaluation failed");
                }
            }
        }

        fired
    }
}

impl Default for TriggeredEventManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{EventFilter, FilterKind};
    use crate::rtv::{keys, RtvProvider};

    fn sample_configs() -> Vec<TriggeredEventConfig> {
        serde_json::from_str(
            r#"[
                {
                    "id": "porch",
                    "title": "Porch light on",
                    "filters": [{"kind": "IsLoadChangeOn", "field": "Porch.Light"}],
                    "loggable": true
                },
                {
                    "id": "motion",
                    "title": "Any motion",
                    "filters": [{"kind": "IsMotionEv"}]
                }
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_load_and_get() {
        let manager = TriggeredEventManager::new();
        assert_eq!(manager.load(&sample_configs()).unwrap(), 2);
        assert_eq!(manager.count(), 2);
        assert_eq!(manager.get("porch").unwrap().title(), "Porch light on");
        assert!(manager.get("missing").is_none());
    }

    #[test]
    fn test_load_is_all_or_nothing() {
        let manager = TriggeredEventManager::new();
        let mut configs = sample_configs();
        configs[1].filters[0].field = "Hall".into();
        configs[1].filters[0].kind = FilterKind::IsNight;
        assert!(matches!(
            manager.load(&configs),
            Err(ManagerError::Config(_))
        ));
        assert_eq!(manager.count(), 0);
    }

    #[test]
    fn test_evaluate_all() {
        let manager = TriggeredEventManager::new();
        manager.load(&sample_configs()).unwrap();

        let ctx = EvalContext::now();
        let fired = manager.evaluate_all(&Event::load_change("Porch.Light", true), &ctx);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].id, "porch");
        assert!(fired[0].loggable);
        assert_eq!(
            fired[0].rtvs().try_get(keys::SRC_FIELD).unwrap(),
            "Light"
        );

        let fired = manager.evaluate_all(&Event::motion("Hall", true), &ctx);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].id, "motion");
    }

    #[test]
    fn test_pause_and_resume() {
        let manager = TriggeredEventManager::new();
        manager.load(&sample_configs()).unwrap();
        let held = manager.get("motion").unwrap();

        manager.pause("motion").unwrap();
        assert!(manager.get("motion").unwrap().paused);
        // Copy-on-write: earlier handles are untouched
        assert!(!held.paused);

        let ctx = EvalContext::now();
        assert!(manager
            .evaluate_all(&Event::motion("Hall", true), &ctx)
            .is_empty());

        manager.resume("motion").unwrap();
        assert_eq!(manager.evaluate_all(&Event::motion("Hall", true), &ctx).len(), 1);
    }

    #[test]
    fn test_modify_failure_keeps_old_event() {
        let manager = TriggeredEventManager::new();
        manager.load(&sample_configs()).unwrap();

        let result = manager.modify("motion", |e| {
            e.paused = true;
            e.set_filter(
                1,
                EventFilter::with(FilterKind::IsOfClass, "", "(", false, true, false)?,
            )
        });
        assert!(matches!(result, Err(ManagerError::Config(_))));
        assert!(!manager.get("motion").unwrap().paused);
    }

    #[test]
    fn test_evaluation_error_is_skipped() {
        let manager = TriggeredEventManager::new();
        manager.load(&sample_configs()).unwrap();

        let mut remote = TriggeredEvent::new("remote", "Needs driver");
        remote
            .set_filter(
                0,
                EventFilter::with(FilterKind::IsDevReady, "Thermo", "", false, false, false)
                    .unwrap(),
            )
            .unwrap();
        manager.insert(remote).unwrap();

        let ctx = EvalContext::now();
        let fired = manager.evaluate_all(&Event::motion("Hall", true), &ctx);
        assert_eq!(fired.len(), 1);

        let err = manager.evaluate_one("remote", &Event::motion("Hall", true), &ctx);
        assert!(matches!(err, Err(ManagerError::Eval(_))));
    }

    #[test]
    fn test_insert_replace_remove() {
        let manager = TriggeredEventManager::new();
        manager
            .insert(TriggeredEvent::new("a", "First"))
            .unwrap();
        assert!(matches!(
            manager.insert(TriggeredEvent::new("a", "Again")),
            Err(ManagerError::Duplicate(_))
        ));

        manager.replace(TriggeredEvent::new("a", "Renamed")).unwrap();
        assert_eq!(manager.get("a").unwrap().title(), "Renamed");
        assert!(matches!(
            manager.replace(TriggeredEvent::new("b", "")),
            Err(ManagerError::NotFound(_))
        ));

        manager.remove("a").unwrap();
        assert_eq!(manager.count(), 0);
    }
}
