//! Rendering fired triggers for stdout

use std::collections::BTreeMap;

use cqc_trigger::rtv::keys;
use cqc_trigger::{FiredTrigger, RtvChain, RtvProvider};
use serde::Serialize;

/// How fired triggers are printed
#[derive(Debug, Clone)]
pub enum OutputFormat {
    /// One JSON object per line, runtime values included
    Json,
    /// Text with `%(key)` runtime values expanded
    Template(String),
}

#[derive(Serialize)]
struct FiredLine<'a> {
    #[serde(flatten)]
    trigger: &'a FiredTrigger,
    rtvs: BTreeMap<&'static str, String>,
}

impl OutputFormat {
    pub fn render(&self, fired: &FiredTrigger) -> serde_json::Result<String> {
        let rtvs = fired.rtvs();
        match self {
            OutputFormat::Json => {
                let rtvs = keys::ALL
                    .iter()
                    .filter_map(|&key| rtvs.try_get(key).map(|v| (key, v)))
                    .collect();
                serde_json::to_string(&FiredLine {
                    trigger: fired,
                    rtvs,
                })
            }
            OutputFormat::Template(text) => Ok(RtvChain::new().push(&rtvs).expand(text)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cqc_core::Event;
    use cqc_trigger::{TriggeredEvent, TriggeredEventConfig, TriggeredEventManager};
    use cqc_trigger::EvalContext;

    fn fired() -> FiredTrigger {
        let config: TriggeredEventConfig = serde_json::from_value(serde_json::json!({
            "id": "porch_light",
            "title": "Porch light changed",
            "filters": [{"kind": "IsFieldChangeFor", "field": "Lights.Porch"}]
        }))
        .unwrap();
        let manager = TriggeredEventManager::new();
        manager.insert(TriggeredEvent::from_config(&config).unwrap()).unwrap();

        let event = Event::field_change("Lights", "Porch", "True");
        let mut fired = manager.evaluate_all(&event, &EvalContext::now());
        assert_eq!(fired.len(), 1);
        fired.remove(0)
    }

    #[test]
    fn test_render_json() {
        let line = OutputFormat::Json.render(&fired()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();

        assert_eq!(value["id"], "porch_light");
        assert_eq!(value["title"], "Porch light changed");
        assert_eq!(value["event"]["source"], "Lights.Porch");
        assert_eq!(value["rtvs"][keys::NEW_FLD_VALUE], "True");
        assert_eq!(value["rtvs"][keys::SRC_FIELD], "Porch");
    }

    #[test]
    fn test_render_template() {
        let format =
            OutputFormat::Template("%(StdRTV:SrcMoniker) is now %(StdRTV:NewFldValue)".to_string());
        assert_eq!(format.render(&fired()).unwrap(), "Lights is now True");
    }
}
