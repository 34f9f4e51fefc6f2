//! Runtime values
//!
//! When a triggered event fires, its action can refer to values taken from
//! the triggering event. Providers answer lookups by key and are chained in
//! priority order; the first one that knows a key wins.

use std::collections::HashMap;

use cqc_core::{field_of, moniker_of, paths, Event};

/// Keys served by [`EventRtvs`]
pub mod keys {
    pub const EV_CLASS: &str = "StdRTV:EvClass";
    pub const EV_SOURCE: &str = "StdRTV:EvSource";
    pub const NEW_FLD_VALUE: &str = "StdRTV:NewFldValue";
    pub const SRC_MONIKER: &str = "StdRTV:SrcMoniker";
    pub const SRC_FIELD: &str = "StdRTV:SrcField";

    pub const ALL: [&str; 5] = [EV_CLASS, EV_SOURCE, NEW_FLD_VALUE, SRC_MONIKER, SRC_FIELD];
}

/// A source of named runtime values
pub trait RtvProvider {
    /// Provider name, for diagnostics
    fn name(&self) -> &str;

    /// Value for `key`, or `None` if this provider does not have it
    fn try_get(&self, key: &str) -> Option<String>;
}

/// Runtime values of a triggering event
#[derive(Debug, Clone, Copy)]
pub struct EventRtvs<'a> {
    event: &'a Event,
}

impl<'a> EventRtvs<'a> {
    pub fn new(event: &'a Event) -> Self {
        Self { event }
    }
}

impl RtvProvider for EventRtvs<'_> {
    fn name(&self) -> &str {
        "event"
    }

    fn try_get(&self, key: &str) -> Option<String> {
        // Moniker and field come from the source as filters see it
        let src = self.event.query_source().unwrap_or("");
        match key {
            keys::EV_CLASS => Some(self.event.class().to_string()),
            keys::EV_SOURCE => Some(self.event.source().to_string()),
            keys::NEW_FLD_VALUE => Some(self.event.value(paths::FLD_VALUE).to_string()),
            keys::SRC_MONIKER => Some(moniker_of(src).to_string()),
            // A source without a field part has no field value at all
            keys::SRC_FIELD => field_of(src).map(str::to_string),
            _ => None,
        }
    }
}

/// Fixed values, for hosts that add their own keys
#[derive(Debug, Clone, Default)]
pub struct StaticRtvs {
    name: String,
    values: HashMap<String, String>,
}

impl StaticRtvs {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: HashMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }
}

impl RtvProvider for StaticRtvs {
    fn name(&self) -> &str {
        &self.name
    }

    fn try_get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Providers checked in order
#[derive(Default)]
pub struct RtvChain<'a> {
    providers: Vec<&'a dyn RtvProvider>,
}

impl<'a> RtvChain<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a lower priority provider
    pub fn push(mut self, provider: &'a dyn RtvProvider) -> Self {
        self.providers.push(provider);
        self
    }

    /// First provider's answer for `key`
    pub fn try_get(&self, key: &str) -> Option<String> {
        self.providers.iter().find_map(|p| p.try_get(key))
    }

    /// Replace `%(key)` references in `text`
    ///
    /// Unknown keys are left as written.
    pub fn expand(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("%(") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find(')') {
                Some(end) => {
                    let key = &after[..end];
                    match self.try_get(key) {
                        Some(value) => out.push_str(&value),
                        None => out.push_str(&rest[start..start + 2 + end + 1]),
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvalContext;
    use crate::filter::{EventFilter, FilterKind};

    #[test]
    fn test_field_change_values() {
        let ev = Event::field_change("Thermo", "Temp", "72");
        let rtvs = EventRtvs::new(&ev);
        assert_eq!(rtvs.try_get(keys::EV_CLASS).unwrap(), "cqsl.fieldchange");
        assert_eq!(rtvs.try_get(keys::EV_SOURCE).unwrap(), "Thermo.Temp");
        assert_eq!(rtvs.try_get(keys::NEW_FLD_VALUE).unwrap(), "72");
        assert_eq!(rtvs.try_get(keys::SRC_MONIKER).unwrap(), "Thermo");
        assert_eq!(rtvs.try_get(keys::SRC_FIELD).unwrap(), "Temp");
    }

    #[test]
    fn test_prefixed_source() {
        let ev = Event::new("cqsl.fieldchange", "cqsl.field:Thermo.Temp")
            .with_value(paths::FLD_VALUE, "80");
        let filter =
            EventFilter::with(FilterKind::IsFieldChangeFor, "Thermo.Temp", "", false, false, false)
                .unwrap();
        assert!(filter.evaluate(&ev, &EvalContext::now()).unwrap());

        let rtvs = EventRtvs::new(&ev);
        assert_eq!(rtvs.try_get(keys::EV_SOURCE).unwrap(), "cqsl.field:Thermo.Temp");
        assert_eq!(rtvs.try_get(keys::SRC_MONIKER).unwrap(), "Thermo");
        assert_eq!(rtvs.try_get(keys::SRC_FIELD).unwrap(), "Temp");

        let ev = Event::motion("cqsl.driver:Hall", true);
        let rtvs = EventRtvs::new(&ev);
        assert_eq!(rtvs.try_get(keys::SRC_MONIKER).unwrap(), "Hall");
        assert_eq!(rtvs.try_get(keys::SRC_FIELD), None);
    }

    #[test]
    fn test_bare_moniker_has_no_field() {
        let ev = Event::motion("Hall", true);
        let rtvs = EventRtvs::new(&ev);
        assert_eq!(rtvs.try_get(keys::SRC_MONIKER).unwrap(), "Hall");
        assert_eq!(rtvs.try_get(keys::SRC_FIELD), None);
        assert_eq!(rtvs.try_get(keys::NEW_FLD_VALUE).unwrap(), "");
    }

    #[test]
    fn test_unknown_key_falls_through_chain() {
        let ev = Event::motion("Hall", true);
        let rtvs = EventRtvs::new(&ev);
        let host = StaticRtvs::new("host").with("Host:User", "admin");
        let chain = RtvChain::new().push(&rtvs).push(&host);

        assert_eq!(chain.try_get("Host:User").unwrap(), "admin");
        assert_eq!(chain.try_get(keys::SRC_MONIKER).unwrap(), "Hall");
        assert_eq!(chain.try_get("Nope"), None);
    }

    #[test]
    fn test_expand() {
        let ev = Event::field_change("Thermo", "Temp", "72");
        let rtvs = EventRtvs::new(&ev);
        let chain = RtvChain::new().push(&rtvs);

        assert_eq!(
            chain.expand("%(StdRTV:SrcMoniker) is %(StdRTV:NewFldValue) %(Other) %(open"),
            "Thermo is 72 %(Other) %(open"
        );
    }
}
