//! Configuration parsing tests for triggered events and field triggers
//!
//! These use the YAML and JSON shapes that configuration files and the
//! event script carry.

use cqc_core::Event;
use cqc_trigger::{
    EvalContext, FieldTrigger, FieldTriggerConfig, FilterError, FilterKind, LatchMode, LogicalOp,
    Statement, TriggerType, TriggeredEvent, TriggeredEventConfig,
};
use serde_json::json;

#[test]
fn test_yaml_triggered_event() {
    let yaml = r#"
id: garage_open_at_night
title: Garage door opened at night
logical_op: and
loggable: true
filters:
  - kind: IsNewFldValFor
    field: 'Garage\.Door[0-9]'
    field_regex: true
    comp: Open
  - kind: IsNight
"#;
    let config: TriggeredEventConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.filters.len(), 2);
    assert_eq!(config.logical_op, LogicalOp::And);

    let ev = TriggeredEvent::from_config(&config).unwrap();
    assert_eq!(ev.id(), "garage_open_at_night");
    assert!(ev.loggable);
    assert!(!ev.serialized);
    assert!(ev.filter(0).unwrap().field_is_regex());

    let event = Event::field_change("Garage", "Door2", "Open");
    let ctx = EvalContext::now().with_night(true);
    assert!(ev.evaluate(&event, &ctx).unwrap());
    assert!(!ev.evaluate(&event, &ctx.clone().with_night(false)).unwrap());
}

#[test]
fn test_json_triggered_event_defaults() {
    let config: TriggeredEventConfig = serde_json::from_value(json!({
        "filters": [{"kind": "IsMotionEvFrom", "field": "Hall"}]
    }))
    .unwrap();

    assert!(config.id.is_none());
    assert_eq!(config.logical_op, LogicalOp::And);
    assert!(!config.paused);

    let ev = TriggeredEvent::from_config(&config).unwrap();
    assert!(!ev.id().is_empty());
    assert_eq!(ev.filter(0).unwrap().kind(), FilterKind::IsMotionEvFrom);
}

#[test]
fn test_xor_and_or_spelling() {
    for (text, op) in [("or", LogicalOp::Or), ("xor", LogicalOp::Xor)] {
        let config: TriggeredEventConfig =
            serde_json::from_value(json!({"id": "x", "logical_op": text})).unwrap();
        assert_eq!(config.logical_op, op);
    }
}

#[test]
fn test_invalid_filter_is_rejected() {
    let config: TriggeredEventConfig = serde_json::from_value(json!({
        "id": "bad",
        "filters": [{"kind": "IsOfClass", "comp": "cqsl.(", "comp_regex": true}]
    }))
    .unwrap();
    assert!(matches!(
        TriggeredEvent::from_config(&config),
        Err(FilterError::InvalidRegex { .. })
    ));
}

#[test]
fn test_unknown_kind_is_a_parse_error() {
    let result: Result<TriggeredEventConfig, _> = serde_json::from_value(json!({
        "filters": [{"kind": "IsRaining"}]
    }));
    assert!(result.is_err());
}

#[test]
fn test_config_round_trip_yaml() {
    let yaml = r#"
id: doorbell
title: Doorbell
logical_op: or
serialized: true
filters:
  - kind: IsUserActionFor
    field: FrontDoor
    comp: Press
  - kind: IsPresenceEnter
    field: Porch
"#;
    let config: TriggeredEventConfig = serde_yaml::from_str(yaml).unwrap();
    let ev = TriggeredEvent::from_config(&config).unwrap();
    let written = serde_yaml::to_string(&ev.to_config()).unwrap();
    let reread: TriggeredEventConfig = serde_yaml::from_str(&written).unwrap();
    assert_eq!(TriggeredEvent::from_config(&reread).unwrap(), ev);
}

#[test]
fn test_field_trigger_yaml() {
    let yaml = r#"
type: on_expression
latch: unidirectional
expression:
  statement: IsLessThanOrEqual
  compare: "15"
  negate: false
"#;
    let config: FieldTriggerConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.trigger_type, TriggerType::OnExpression);
    assert_eq!(config.latch, LatchMode::Unidirectional);
    assert_eq!(
        config.expression.as_ref().unwrap().statement,
        Statement::IsLessThanOrEqual
    );
    assert!(FieldTrigger::from_config(&config).is_ok());
}

#[test]
fn test_field_trigger_defaults() {
    let config: FieldTriggerConfig = serde_yaml::from_str("type: on_change").unwrap();
    assert_eq!(config.latch, LatchMode::Unlatched);
    assert!(config.expression.is_none());
}
