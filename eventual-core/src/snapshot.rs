//! Full dump and reload of a [`Hypergraph`].
//!
//! A [`GraphSnapshot`] is the boundary format for persistence collaborators:
//!
//! ```json
//! {
//!   "concepts": {"light_1": {"id": "light_1", "name": "light", "state": 0.5,
//!                            "history": [...], "metadata": {}}},
//!   "events":   {"e1": {"id": "e1", "timestamp": "...", "concept_ids": ["light_1"],
//!                       "delta": 0.5, "metadata": {}}}
//! }
//! ```
//!
//! Restoring loads concepts first, then events, with the same policy as
//! [`Hypergraph::add_event`]: an event referencing concepts missing from the
//! snapshot is still loaded, linked to the concepts that do exist, and each
//! missing reference is reported as a warning. Non-finite states and deltas
//! are stored as the strings `"inf"`, `"-inf"` and `"NaN"`.

use crate::error::{Error, GraphWarning, Result};
use crate::graph::{Concept, ConceptId, Event, EventId, EventKind, Hypergraph, StateRecord};
use crate::normalize::{LowercaseNormalizer, TermNormalizer};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Serialized form of a whole graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub concepts: BTreeMap<ConceptId, ConceptRecord>,
    #[serde(default)]
    pub events: BTreeMap<EventId, EventRecord>,
}

/// Serialized concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptRecord {
    pub id: ConceptId,
    pub name: String,
    #[serde(with = "crate::serde_float")]
    pub state: f64,
    pub history: Vec<StateRecord>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Serialized event. Properties are stored under `metadata`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub concept_ids: Vec<ConceptId>,
    #[serde(with = "crate::serde_float")]
    pub delta: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<EventKind>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl From<&Concept> for ConceptRecord {
    fn from(concept: &Concept) -> Self {
        Self {
            id: concept.id().clone(),
            name: concept.name().to_string(),
            state: concept.state(),
            history: concept.history().to_vec(),
            metadata: concept
                .metadata()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

impl From<&Event> for EventRecord {
    fn from(event: &Event) -> Self {
        Self {
            id: event.id().clone(),
            timestamp: event.timestamp(),
            concept_ids: event.concepts().iter().cloned().collect(),
            delta: event.delta(),
            kind: event.kind().cloned(),
            metadata: event
                .properties()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

impl GraphSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A graph rebuilt from a snapshot, with any repairs made while loading.
#[derive(Debug)]
pub struct Restored {
    pub graph: Hypergraph,
    pub warnings: Vec<GraphWarning>,
}

impl Hypergraph {
    /// Capture the full contents of the graph.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            concepts: self
                .concepts()
                .into_iter()
                .map(|c| (c.id().clone(), ConceptRecord::from(c)))
                .collect(),
            events: self
                .events()
                .into_iter()
                .map(|e| (e.id().clone(), EventRecord::from(e)))
                .collect(),
        }
    }

    /// Rebuild a graph using the default name normalizer.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Restored> {
        Self::from_snapshot_with_normalizer(snapshot, Arc::new(LowercaseNormalizer))
    }

    /// Rebuild a graph, concepts first, then events.
    ///
    /// Fails on structural problems (key/id mismatch, empty history, state not
    /// matching the last history entry, duplicate names, an event with no
    /// concepts). Unresolvable event references only produce warnings.
    pub fn from_snapshot_with_normalizer(
        snapshot: GraphSnapshot,
        normalizer: Arc<dyn TermNormalizer>,
    ) -> Result<Restored> {
        let mut graph = Hypergraph::with_normalizer(normalizer);
        let mut warnings = Vec::new();

        for (key, record) in snapshot.concepts {
            if key != record.id {
                return Err(Error::MalformedSnapshot(format!(
                    "concept stored under key {} has id {}",
                    key, record.id
                )));
            }
            let state = record.state;
            let concept = Concept::from_parts(
                record.id,
                record.name,
                record.history,
                record.metadata.into_iter().collect(),
            )?;
            if concept.state().to_bits() != state.to_bits() {
                return Err(Error::MalformedSnapshot(format!(
                    "concept {} state {} does not match its last history entry {}",
                    concept.id(),
                    state,
                    concept.state()
                )));
            }
            graph.add_concept(concept)?;
        }

        for (key, record) in snapshot.events {
            if key != record.id {
                return Err(Error::MalformedSnapshot(format!(
                    "event stored under key {} has id {}",
                    key, record.id
                )));
            }

            let mut event = Event::new(record.concept_ids, record.delta)
                .map_err(|_| {
                    Error::MalformedSnapshot(format!("event {} has no concepts", record.id))
                })?
                .with_id(record.id)
                .with_timestamp(record.timestamp)
                .with_properties(record.metadata.into_iter().collect());
            if let Some(kind) = record.kind {
                event = event.with_kind(kind);
            }

            for warning in graph.add_event(event)? {
                if let GraphWarning::DanglingReference {
                    event_id,
                    concept_id,
                } = warning
                {
                    warnings.push(GraphWarning::ReferenceOutsideSnapshot {
                        event_id,
                        concept_id,
                    });
                }
            }
        }

        debug!(
            concepts = graph.concept_count(),
            events = graph.event_count(),
            warnings = warnings.len(),
            "restored hypergraph from snapshot"
        );
        Ok(Restored { graph, warnings })
    }

    /// Write a snapshot of this graph as JSON, creating parent directories.
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        write_snapshot(path, &self.snapshot())
    }

    /// Load a graph saved with [`Hypergraph::save_to_path`].
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Option<Restored>> {
        match read_snapshot(path)? {
            Some(snapshot) => Ok(Some(Self::from_snapshot(snapshot)?)),
            None => Ok(None),
        }
    }
}

/// Write a snapshot as pretty-printed JSON.
pub fn write_snapshot(path: impl AsRef<Path>, snapshot: &GraphSnapshot) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut writer = BufWriter::new(fs::File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, snapshot)?;
    writer.flush()?;
    info!(
        path = %path.display(),
        concepts = snapshot.concepts.len(),
        events = snapshot.events.len(),
        "saved hypergraph snapshot"
    );
    Ok(())
}

/// Read a snapshot file. Returns `Ok(None)` when it does not exist.
pub fn read_snapshot(path: impl AsRef<Path>) -> Result<Option<GraphSnapshot>> {
    let path = path.as_ref();
    if !path.exists() {
        warn!(path = %path.display(), "snapshot file not found");
        return Ok(None);
    }
    let json = fs::read_to_string(path)?;
    let snapshot = GraphSnapshot::from_json(&json)?;
    info!(path = %path.display(), "loaded hypergraph snapshot");
    Ok(Some(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn sample_graph() -> Hypergraph {
        let mut graph = Hypergraph::new();
        graph
            .add_concept(Concept::with_id("light_1", "light", 1.0).with_metadata("units", "lux"))
            .unwrap();
        graph
            .add_concept(Concept::with_id("room_1", "room", 0.0))
            .unwrap();
        graph
            .update_concept_state(&ConceptId::from("light_1"), 0.4, Some("dimmed"))
            .unwrap();
        graph
            .add_event(
                Event::new(["light_1"], 0.6)
                    .unwrap()
                    .with_id("e1")
                    .with_kind(EventKind::StateChange)
                    .with_property("new_state", 0.4),
            )
            .unwrap();
        graph
            .add_event(
                Event::new(["light_1", "room_1"], 0.0)
                    .unwrap()
                    .with_id("e2")
                    .with_timestamp(Utc::now() - Duration::hours(2)),
            )
            .unwrap();
        graph
    }

    #[test]
    fn test_round_trip_preserves_graph() {
        let graph = sample_graph();
        let json = graph.snapshot().to_json().unwrap();
        let restored = Hypergraph::from_snapshot(GraphSnapshot::from_json(&json).unwrap()).unwrap();

        assert!(restored.warnings.is_empty());
        assert_eq!(restored.graph.snapshot(), graph.snapshot());

        let light = restored.graph.get_concept("light_1").unwrap();
        assert_eq!(light.history(), graph.get_concept("light_1").unwrap().history());
        assert_eq!(
            light.events().iter().map(|e| e.as_str()).collect::<Vec<_>>(),
            vec!["e1", "e2"]
        );
        assert_eq!(
            restored.graph.get_event("e1").unwrap().kind(),
            Some(&EventKind::StateChange)
        );
        assert_eq!(
            restored.graph.get_concept_by_name("ROOM").unwrap().id().as_str(),
            "room_1"
        );
    }

    #[test]
    fn test_snapshot_json_shape() {
        let value: Value = serde_json::from_str(&sample_graph().snapshot().to_json().unwrap()).unwrap();

        let light = &value["concepts"]["light_1"];
        assert_eq!(light["name"], "light");
        assert_eq!(light["history"][0]["reason"], "Initial state");
        assert!(light["history"][0]["delta"].is_null());

        let e2 = &value["events"]["e2"];
        assert_eq!(e2["concept_ids"], serde_json::json!(["light_1", "room_1"]));
        assert!(e2.get("kind").is_none());
    }

    #[test]
    fn test_partial_references_are_linked_with_warning() {
        let mut snapshot = sample_graph().snapshot();
        snapshot
            .events
            .get_mut(&EventId::from("e2"))
            .unwrap()
            .concept_ids
            .push(ConceptId::from("ghost"));

        let restored = Hypergraph::from_snapshot(snapshot).unwrap();

        assert_eq!(
            restored.warnings,
            vec![GraphWarning::ReferenceOutsideSnapshot {
                event_id: EventId::from("e2"),
                concept_id: ConceptId::from("ghost"),
            }]
        );
        let e2 = restored.graph.get_event("e2").unwrap();
        assert_eq!(e2.concepts().len(), 3);
        assert_eq!(
            restored.graph.unresolved_concepts(e2),
            vec![&ConceptId::from("ghost")]
        );
        assert_eq!(restored.graph.get_events_for_concept("room_1").len(), 1);
    }

    #[test]
    fn test_fully_dangling_event_is_kept() {
        let mut snapshot = sample_graph().snapshot();
        snapshot.events.insert(
            EventId::from("orphan"),
            EventRecord {
                id: EventId::from("orphan"),
                timestamp: Utc::now(),
                concept_ids: vec![ConceptId::from("ghost")],
                delta: 1.0,
                kind: None,
                metadata: BTreeMap::new(),
            },
        );

        let restored = Hypergraph::from_snapshot(snapshot).unwrap();

        assert_eq!(restored.graph.event_count(), 3);
        assert!(restored
            .graph
            .get_event("orphan")
            .unwrap()
            .involves(&ConceptId::from("ghost")));
        assert_eq!(
            restored.warnings,
            vec![GraphWarning::ReferenceOutsideSnapshot {
                event_id: EventId::from("orphan"),
                concept_id: ConceptId::from("ghost"),
            }]
        );

        let again = Hypergraph::from_snapshot(restored.graph.snapshot()).unwrap();
        assert!(again.graph.get_event("orphan").is_some());
    }

    #[test]
    fn test_event_without_concepts_rejected() {
        let mut snapshot = sample_graph().snapshot();
        snapshot
            .events
            .get_mut(&EventId::from("e1"))
            .unwrap()
            .concept_ids
            .clear();
        assert!(matches!(
            Hypergraph::from_snapshot(snapshot),
            Err(Error::MalformedSnapshot(_))
        ));
    }

    #[test]
    fn test_non_finite_states_round_trip() {
        let mut graph = sample_graph();
        let room = ConceptId::from("room_1");
        graph
            .update_concept_state(&room, f64::INFINITY, Some("overflow"))
            .unwrap();
        graph
            .add_event(Event::new(["room_1"], f64::INFINITY).unwrap().with_id("e3"))
            .unwrap();

        let json = graph.snapshot().to_json().unwrap();
        assert!(json.contains("\"inf\""));
        let restored = Hypergraph::from_snapshot(GraphSnapshot::from_json(&json).unwrap()).unwrap();
        assert_eq!(restored.graph.snapshot(), graph.snapshot());

        graph
            .update_concept_state(&room, f64::NAN, None)
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        graph.save_to_path(&path).unwrap();
        let restored = Hypergraph::load_from_path(&path).unwrap().unwrap();

        let room = restored.graph.get_concept(&room).unwrap();
        assert!(room.state().is_nan());
        assert!(room.history().last().unwrap().delta.unwrap().is_nan());
        assert_eq!(room.history()[1].state, f64::INFINITY);
    }

    #[test]
    fn test_inconsistent_snapshot_rejected() {
        let mut snapshot = sample_graph().snapshot();
        snapshot
            .concepts
            .get_mut(&ConceptId::from("light_1"))
            .unwrap()
            .state = 9.0;
        assert!(matches!(
            Hypergraph::from_snapshot(snapshot),
            Err(Error::MalformedSnapshot(_))
        ));

        let mut snapshot = sample_graph().snapshot();
        snapshot
            .concepts
            .get_mut(&ConceptId::from("room_1"))
            .unwrap()
            .history
            .clear();
        assert!(matches!(
            Hypergraph::from_snapshot(snapshot),
            Err(Error::MalformedSnapshot(_))
        ));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("graph.json");
        let graph = sample_graph();

        graph.save_to_path(&path).unwrap();
        let restored = Hypergraph::load_from_path(&path).unwrap().unwrap();

        assert_eq!(restored.graph.snapshot(), graph.snapshot());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Hypergraph::load_from_path(dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Hypergraph::load_from_path(&path),
            Err(Error::Serialization(_))
        ));
    }
}
