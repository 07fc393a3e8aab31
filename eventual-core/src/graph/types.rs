//! Core types for the concept/event hypergraph.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// Reason recorded on the first history entry of every concept.
pub const INITIAL_STATE_REASON: &str = "Initial state";

/// Unique identifier for a concept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConceptId(String);

impl ConceptId {
    /// Generate a new random concept ID.
    pub fn new() -> Self {
        Self(format!("concept_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConceptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConceptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConceptId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConceptId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::borrow::Borrow<str> for ConceptId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Unique identifier for an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Generate a new random event ID.
    pub fn new() -> Self {
        Self(format!("event_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::borrow::Borrow<str> for EventId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// One entry in a concept's state history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(with = "crate::serde_float")]
    pub state: f64,
    /// Signed change from the previous state; `None` for the initial entry.
    #[serde(default, with = "crate::serde_float::option")]
    pub delta: Option<f64>,
    pub reason: Option<String>,
}

/// A named entity with a numeric state tracked over time.
///
/// Equality and hashing use the id only. The history is append-only and
/// always ends with the current state.
#[derive(Debug, Clone)]
pub struct Concept {
    id: ConceptId,
    name: String,
    state: f64,
    history: Vec<StateRecord>,
    metadata: HashMap<String, Value>,
    pub(crate) events: BTreeSet<EventId>,
}

impl Concept {
    /// Create a concept with a generated id.
    pub fn new(name: impl Into<String>, initial_state: f64) -> Self {
        Self::with_id(ConceptId::new(), name, initial_state)
    }

    /// Create a concept with a caller-supplied id.
    pub fn with_id(id: impl Into<ConceptId>, name: impl Into<String>, initial_state: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state: initial_state,
            history: vec![StateRecord {
                timestamp: Utc::now(),
                state: initial_state,
                delta: None,
                reason: Some(INITIAL_STATE_REASON.to_string()),
            }],
            metadata: HashMap::new(),
            events: BTreeSet::new(),
        }
    }

    /// Rebuild a concept from stored parts. The history must be non-empty.
    pub(crate) fn from_parts(
        id: ConceptId,
        name: String,
        history: Vec<StateRecord>,
        metadata: HashMap<String, Value>,
    ) -> Result<Self> {
        let state = history
            .last()
            .map(|r| r.state)
            .ok_or_else(|| Error::MalformedSnapshot(format!("concept {} has no history", id)))?;
        Ok(Self {
            id,
            name,
            state,
            history,
            metadata,
            events: BTreeSet::new(),
        })
    }

    /// Attach a metadata entry (builder form).
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &ConceptId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> f64 {
        self.state
    }

    pub fn history(&self) -> &[StateRecord] {
        &self.history
    }

    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    pub fn get_metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Ids of the events this concept participates in.
    pub fn events(&self) -> &BTreeSet<EventId> {
        &self.events
    }

    /// Move to a new state, appending a history record.
    ///
    /// Returns the signed delta, or `None` when `new_state` is bit-for-bit
    /// equal to the current state (nothing is recorded).
    pub fn update_state(&mut self, new_state: f64, reason: Option<&str>) -> Option<f64> {
        if new_state.to_bits() == self.state.to_bits() {
            return None;
        }
        let delta = new_state - self.state;
        self.state = new_state;
        self.history.push(StateRecord {
            timestamp: Utc::now(),
            state: new_state,
            delta: Some(delta),
            reason: reason.map(str::to_string),
        });
        Some(delta)
    }

    /// Insert or replace a metadata entry.
    pub fn add_metadata(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(key.into(), value.into());
    }
}

impl PartialEq for Concept {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Concept {}

impl std::hash::Hash for Concept {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Semantic tag carried by an event. The store never interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// A single concept crossed its change threshold.
    StateChange,
    /// A relation between concepts with no state semantics.
    Relationship,
    /// A regime change spanning several concepts.
    PhaseShift,
    Custom(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::StateChange => "state_change",
            Self::Relationship => "relationship",
            Self::PhaseShift => "phase_shift",
            Self::Custom(s) => s,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "state_change" => Self::StateChange,
            "relationship" => Self::Relationship,
            "phase_shift" => Self::PhaseShift,
            _ => Self::Custom(s),
        }
    }
}

impl From<&str> for EventKind {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Custom(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

/// A hyperedge connecting one or more concepts at a point in time.
///
/// Equality and hashing use the id only: two events with identical contents
/// but different ids are distinct.
#[derive(Debug, Clone)]
pub struct Event {
    id: EventId,
    concepts: BTreeSet<ConceptId>,
    delta: f64,
    timestamp: DateTime<Utc>,
    kind: Option<EventKind>,
    properties: HashMap<String, Value>,
}

impl Event {
    /// Create an event over the given concepts, timestamped now.
    ///
    /// Fails with [`Error::MalformedCandidate`] when `concepts` is empty.
    pub fn new<I, C>(concepts: I, delta: f64) -> Result<Self>
    where
        I: IntoIterator<Item = C>,
        C: Into<ConceptId>,
    {
        let concepts: BTreeSet<ConceptId> = concepts.into_iter().map(Into::into).collect();
        if concepts.is_empty() {
            return Err(Error::malformed(
                "an event must involve at least one concept",
            ));
        }
        Ok(Self {
            id: EventId::new(),
            concepts,
            delta,
            timestamp: Utc::now(),
            kind: None,
            properties: HashMap::new(),
        })
    }

    pub fn with_id(mut self, id: impl Into<EventId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_kind(mut self, kind: impl Into<EventKind>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_properties(mut self, properties: HashMap<String, Value>) -> Self {
        self.properties.extend(properties);
        self
    }

    pub fn id(&self) -> &EventId {
        &self.id
    }

    pub fn concepts(&self) -> &BTreeSet<ConceptId> {
        &self.concepts
    }

    pub fn involves(&self, concept_id: &ConceptId) -> bool {
        self.concepts.contains(concept_id)
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn kind(&self) -> Option<&EventKind> {
        self.kind.as_ref()
    }

    pub fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Event {}

impl std::hash::Hash for Event {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_new_concept_records_initial_state() {
        let concept = Concept::new("light", 1.0);

        assert_eq!(concept.history().len(), 1);
        let first = &concept.history()[0];
        assert_eq!(first.state, 1.0);
        assert_eq!(first.delta, None);
        assert_eq!(first.reason.as_deref(), Some(INITIAL_STATE_REASON));
        assert!(concept.id().as_str().starts_with("concept_"));
    }

    #[test]
    fn test_update_state_appends_history() {
        let mut concept = Concept::with_id("light_1", "light", 1.0);

        let delta = concept.update_state(0.5, Some("Light dimmed"));
        assert_eq!(delta, Some(-0.5));
        assert_eq!(concept.state(), 0.5);
        assert_eq!(concept.history().len(), 2);

        let last = concept.history().last().unwrap();
        assert_eq!(last.state, 0.5);
        assert_eq!(last.delta, Some(-0.5));
        assert_eq!(last.reason.as_deref(), Some("Light dimmed"));
    }

    #[test]
    fn test_update_state_same_value_is_noop() {
        let mut concept = Concept::new("light", 1.0);

        assert_eq!(concept.update_state(1.0, Some("unchanged")), None);
        assert_eq!(concept.history().len(), 1);
    }

    #[test]
    fn test_update_state_uses_exact_equality() {
        let mut concept = Concept::new("light", 1.0);

        assert!(concept.update_state(1.0 + f64::EPSILON, None).is_some());
        assert_eq!(concept.history().len(), 2);
    }

    #[test]
    fn test_metadata_upsert() {
        let mut concept = Concept::new("light", 0.0).with_metadata("source", "sensor_1");
        concept.add_metadata("source", "sensor_2");
        concept.add_metadata("units", "lux");

        assert_eq!(concept.get_metadata("source"), Some(&Value::from("sensor_2")));
        assert_eq!(concept.metadata().len(), 2);
        assert_eq!(concept.get_metadata("missing"), None);
    }

    #[test]
    fn test_concept_equality_by_id() {
        let a = Concept::with_id("c1", "light", 1.0);
        let b = Concept::with_id("c1", "darkness", 5.0);
        let c = Concept::with_id("c2", "light", 1.0);

        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<Concept> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_event_requires_concepts() {
        let err = Event::new(Vec::<ConceptId>::new(), 0.0).unwrap_err();
        assert!(matches!(err, Error::MalformedCandidate(_)));
    }

    #[test]
    fn test_event_concepts_are_a_set() {
        let event = Event::new(["a", "b", "a"], 0.0).unwrap();
        assert_eq!(event.concepts().len(), 2);
        assert!(event.involves(&ConceptId::from("a")));
    }

    #[test]
    fn test_event_equality_by_id() {
        let ts = Utc::now();
        let a = Event::new(["x"], 1.0).unwrap().with_timestamp(ts);
        let b = Event::new(["x"], 1.0).unwrap().with_timestamp(ts);
        assert_ne!(a, b);

        let c = b.clone().with_property("note", "copy");
        assert_eq!(b, c);
    }

    #[test]
    fn test_event_kind_round_trips_through_string() {
        assert_eq!(EventKind::from("state_change"), EventKind::StateChange);
        assert_eq!(EventKind::from("phase_shift"), EventKind::PhaseShift);
        assert_eq!(
            EventKind::from("mood"),
            EventKind::Custom("mood".to_string())
        );
        assert_eq!(String::from(EventKind::Relationship), "relationship");

        let json = serde_json::to_string(&EventKind::Custom("mood".into())).unwrap();
        assert_eq!(json, "\"mood\"");
    }

    #[test]
    fn test_ids_serialize_as_plain_strings() {
        let json = serde_json::to_string(&ConceptId::from("light_1")).unwrap();
        assert_eq!(json, "\"light_1\"");
        let id: EventId = serde_json::from_str("\"event_7\"").unwrap();
        assert_eq!(id.as_str(), "event_7");
    }
}
