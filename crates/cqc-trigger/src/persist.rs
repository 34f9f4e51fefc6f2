//! Binary persistence for triggered events
//!
//! Layout: the magic bytes `CQTE`, one format version byte, then a bincode
//! body. Older versions are still readable:
//!
//! - v1: no regex flags, no `serialized` flag, and `IsFromSource` /
//!   `IsOfClass` kept their value in the field operand
//! - v2: regex flags added
//! - v3: `serialized` added, operands moved to where `EventFilter` expects
//!
//! Everything loaded goes back through filter validation, so stored data
//! can never produce a filter that `set` would reject.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PersistError, PersistResult};
use crate::filter::{FilterConfig, FilterKind};
use crate::triggered_event::{LogicalOp, TriggeredEvent, TriggeredEventConfig};

/// Stream magic
pub const MAGIC: [u8; 4] = *b"CQTE";

/// Version written by [`encode`]
pub const CURRENT_VERSION: u8 = 3;

const HEADER_LEN: usize = MAGIC.len() + 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FilterV1 {
    kind: u8,
    negate: bool,
    field: String,
    comp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FilterV2 {
    kind: u8,
    negate: bool,
    field: String,
    comp: String,
    field_regex: bool,
    comp_regex: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrgEventV1 {
    id: String,
    title: String,
    filters: Vec<FilterV1>,
    logical_op: u8,
    paused: bool,
    loggable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrgEventV2 {
    id: String,
    title: String,
    filters: Vec<FilterV2>,
    logical_op: u8,
    paused: bool,
    loggable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TrgEventV3 {
    id: String,
    title: String,
    filters: Vec<FilterV2>,
    logical_op: u8,
    paused: bool,
    loggable: bool,
    serialized: bool,
}

impl From<FilterV1> for FilterV2 {
    fn from(f: FilterV1) -> Self {
        Self {
            kind: f.kind,
            negate: f.negate,
            field: f.field,
            comp: f.comp,
            field_regex: false,
            comp_regex: false,
        }
    }
}

impl From<TrgEventV1> for TrgEventV3 {
    fn from(e: TrgEventV1) -> Self {
        Self {
            id: e.id,
            title: e.title,
            filters: e.filters.into_iter().map(FilterV2::from).collect(),
            logical_op: e.logical_op,
            paused: e.paused,
            loggable: e.loggable,
            serialized: false,
        }
    }
}

impl From<TrgEventV2> for TrgEventV3 {
    fn from(e: TrgEventV2) -> Self {
        Self {
            id: e.id,
            title: e.title,
            filters: e.filters,
            logical_op: e.logical_op,
            paused: e.paused,
            loggable: e.loggable,
            serialized: false,
        }
    }
}

impl From<&TriggeredEvent> for TrgEventV3 {
    fn from(event: &TriggeredEvent) -> Self {
        Self {
            id: event.id().to_string(),
            title: event.title().to_string(),
            filters: event
                .filters()
                .iter()
                .map(|f| FilterV2 {
                    kind: f.kind().ordinal(),
                    negate: f.negate(),
                    field: f.field().to_string(),
                    comp: f.comp().to_string(),
                    field_regex: f.field_is_regex(),
                    comp_regex: f.comp_is_regex(),
                })
                .collect(),
            logical_op: event.logical_op.ordinal(),
            paused: event.paused,
            loggable: event.loggable,
            serialized: event.serialized,
        }
    }
}

/// Kinds whose single value moved from the field to the comparison operand
fn has_swapped_operands(kind: FilterKind) -> bool {
    matches!(kind, FilterKind::IsFromSource | FilterKind::IsOfClass)
}

fn filter_config(stored: FilterV2, version: u8) -> PersistResult<FilterConfig> {
    let kind =
        FilterKind::from_ordinal(stored.kind).ok_or(PersistError::UnknownFilterKind(stored.kind))?;

    let mut config = FilterConfig {
        kind,
        field: stored.field,
        comp: stored.comp,
        field_regex: stored.field_regex,
        comp_regex: stored.comp_regex,
        negate: stored.negate,
    };

    if version < 3 && has_swapped_operands(kind) {
        std::mem::swap(&mut config.field, &mut config.comp);
        std::mem::swap(&mut config.field_regex, &mut config.comp_regex);
    }
    Ok(config)
}

fn into_event(stored: TrgEventV3, version: u8) -> PersistResult<TriggeredEvent> {
    let logical_op = LogicalOp::from_ordinal(stored.logical_op)
        .ok_or(PersistError::UnknownLogicalOp(stored.logical_op))?;

    let filters = stored
        .filters
        .into_iter()
        .map(|f| filter_config(f, version))
        .collect::<PersistResult<Vec<_>>>()?;

    let config = TriggeredEventConfig {
        id: Some(stored.id),
        title: stored.title,
        filters,
        logical_op,
        paused: stored.paused,
        loggable: stored.loggable,
        serialized: stored.serialized,
    };
    Ok(TriggeredEvent::from_config(&config)?)
}

fn write_header(version: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(64);
    out.extend_from_slice(&MAGIC);
    out.push(version);
    out
}

fn read_header(bytes: &[u8]) -> PersistResult<(u8, &[u8])> {
    if bytes.len() < HEADER_LEN || bytes[..MAGIC.len()] != MAGIC {
        return Err(PersistError::BadMagic);
    }
    let version = bytes[MAGIC.len()];
    if version == 0 || version > CURRENT_VERSION {
        return Err(PersistError::UnsupportedVersion(version));
    }
    Ok((version, &bytes[HEADER_LEN..]))
}

fn decode_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> PersistResult<T> {
    let (value, _) = bincode::serde::decode_from_slice(body, bincode::config::standard())?;
    Ok(value)
}

fn decode_stored(version: u8, body: &[u8]) -> PersistResult<TrgEventV3> {
    Ok(match version {
        1 => decode_body::<TrgEventV1>(body)?.into(),
        2 => decode_body::<TrgEventV2>(body)?.into(),
        _ => decode_body::<TrgEventV3>(body)?,
    })
}

fn decode_stored_list(version: u8, body: &[u8]) -> PersistResult<Vec<TrgEventV3>> {
    Ok(match version {
        1 => decode_body::<Vec<TrgEventV1>>(body)?
            .into_iter()
            .map(Into::into)
            .collect(),
        2 => decode_body::<Vec<TrgEventV2>>(body)?
            .into_iter()
            .map(Into::into)
            .collect(),
        _ => decode_body::<Vec<TrgEventV3>>(body)?,
    })
}

/// Encode one triggered event at the current version
pub fn encode(event: &TriggeredEvent) -> PersistResult<Vec<u8>> {
    let mut out = write_header(CURRENT_VERSION);
    let body = bincode::serde::encode_to_vec(TrgEventV3::from(event), bincode::config::standard())?;
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode one triggered event written by any supported version
pub fn decode(bytes: &[u8]) -> PersistResult<TriggeredEvent> {
    let (version, body) = read_header(bytes)?;
    debug!(version, len = bytes.len(), "Decoding triggered event");
    into_event(decode_stored(version, body)?, version)
}

/// Encode a list of triggered events at the current version
pub fn encode_list<'a>(
    events: impl IntoIterator<Item = &'a TriggeredEvent>,
) -> PersistResult<Vec<u8>> {
    let stored: Vec<TrgEventV3> = events.into_iter().map(TrgEventV3::from).collect();
    let mut out = write_header(CURRENT_VERSION);
    let body = bincode::serde::encode_to_vec(&stored, bincode::config::standard())?;
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode a list of triggered events written by any supported version
pub fn decode_list(bytes: &[u8]) -> PersistResult<Vec<TriggeredEvent>> {
    let (version, body) = read_header(bytes)?;
    let stored = decode_stored_list(version, body)?;
    debug!(version, count = stored.len(), "Decoding triggered event list");
    stored
        .into_iter()
        .map(|e| into_event(e, version))
        .collect()
}
