//! Candidate extraction payloads and their integration into a [`Hypergraph`].
//!
//! Text processors, LLM calls and sensor adapters live outside this crate.
//! They hand the graph an [`ExtractionPayload`]: candidate concepts plus
//! candidate events that name their concepts by id or by name.
//! [`Hypergraph::integrate`] merges a payload idempotently and never aborts a
//! batch because of one bad candidate.

use crate::error::{GraphWarning, Result};
use crate::graph::{Concept, ConceptId, Event, EventId, EventKind, Hypergraph};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use tracing::{info, warn};

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*\n?(.*?)\n?```\s*$").expect("invalid regex")
});

/// A concept proposed by an extractor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedConcept {
    pub name: String,
    #[serde(default)]
    pub id: Option<ConceptId>,
    #[serde(default)]
    pub initial_state: f64,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

impl ExtractedConcept {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<ConceptId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_initial_state(mut self, state: f64) -> Self {
        self.initial_state = state;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    fn into_concept(self) -> Concept {
        let id = self.id.unwrap_or_default();
        let mut concept = Concept::with_id(id, self.name, self.initial_state);
        for (key, value) in self.properties {
            concept.add_metadata(key, value);
        }
        concept
    }
}

/// An event or relationship proposed by an extractor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEvent {
    /// Concept ids or names; resolved by id first, then by normalized name.
    pub concept_identifiers: Vec<String>,
    #[serde(default)]
    pub id: Option<EventId>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delta: f64,
    #[serde(default)]
    pub kind: Option<EventKind>,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

impl ExtractedEvent {
    pub fn new<I, S>(concept_identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            concept_identifiers: concept_identifiers.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// A zero-delta relationship between concepts.
    pub fn relationship<I, S>(concept_identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(concept_identifiers).with_kind(EventKind::Relationship)
    }

    pub fn with_id(mut self, id: impl Into<EventId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_delta(mut self, delta: f64) -> Self {
        self.delta = delta;
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

    fn label(&self) -> String {
        match self.id {
            Some(ref id) => format!("event {}", id),
            None => format!("event over [{}]", self.concept_identifiers.join(", ")),
        }
    }
}

/// Output of an extractor: candidate concepts and events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionPayload {
    #[serde(default)]
    pub concepts: Vec<ExtractedConcept>,
    #[serde(default)]
    pub events: Vec<ExtractedEvent>,
}

impl ExtractionPayload {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_concept(mut self, concept: ExtractedConcept) -> Self {
        self.concepts.push(concept);
        self
    }

    pub fn with_event(mut self, event: ExtractedEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty() && self.events.is_empty()
    }

    /// Append another payload's candidates.
    pub fn merge(&mut self, other: ExtractionPayload) {
        self.concepts.extend(other.concepts);
        self.events.extend(other.events);
    }
}

/// Anything that turns raw input into candidate concepts and events.
pub trait Extractor {
    fn extract(&self, input: &str) -> Result<ExtractionPayload>;
}

/// Parses the JSON shape an LLM is prompted to emit:
///
/// ```json
/// {"concepts": ["Gemini", "Google"], "relationships": [["Google", "Gemini"]]}
/// ```
///
/// Markdown code fences around the JSON are tolerated. Names appearing only in
/// relationships are added as concepts. Only exact repeats are collapsed;
/// spelling variants are left for the graph's normalizer to merge.
#[derive(Debug, Clone, Default)]
pub struct RelationshipJsonExtractor {
    initial_state: f64,
}

#[derive(Debug, Deserialize)]
struct RelationshipDocument {
    #[serde(default)]
    concepts: Vec<String>,
    #[serde(default)]
    relationships: Vec<Vec<String>>,
}

impl RelationshipJsonExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// State assigned to newly extracted concepts.
    pub fn with_initial_state(mut self, state: f64) -> Self {
        self.initial_state = state;
        self
    }
}

impl Extractor for RelationshipJsonExtractor {
    fn extract(&self, input: &str) -> Result<ExtractionPayload> {
        let body = CODE_FENCE
            .captures(input)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or(input);
        let doc: RelationshipDocument = serde_json::from_str(body.trim())?;

        let mut payload = ExtractionPayload::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut push_concept = |payload: &mut ExtractionPayload, name: &str| {
            let name = name.trim();
            if !name.is_empty() && seen.insert(name.to_string()) {
                payload.concepts.push(
                    ExtractedConcept::new(name).with_initial_state(self.initial_state),
                );
            }
        };

        for name in &doc.concepts {
            push_concept(&mut payload, name.as_str());
        }
        for relation in doc.relationships {
            if relation.len() < 2 {
                warn!(?relation, "ignoring relationship with fewer than two concepts");
                continue;
            }
            for name in &relation {
                push_concept(&mut payload, name.as_str());
            }
            payload.events.push(ExtractedEvent::relationship(relation));
        }

        Ok(payload)
    }
}

/// Outcome of integrating a payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegrationReport {
    /// Stored concepts the payload resolved to (new or pre-existing).
    pub concepts: Vec<ConceptId>,
    /// Events added by this payload.
    pub events: Vec<EventId>,
    pub warnings: Vec<GraphWarning>,
}

impl IntegrationReport {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

impl Hypergraph {
    /// Resolve a concept identifier by id, then by normalized name.
    pub fn resolve_identifier(&self, identifier: &str) -> Option<&Concept> {
        self.get_concept(identifier)
            .or_else(|| self.get_concept_by_name(identifier))
    }

    /// Merge an extraction payload into the graph.
    ///
    /// Concepts go through [`Hypergraph::add_concept_if_absent`]. An event is
    /// added only if every identifier resolves; otherwise it is skipped with a
    /// warning and the rest of the batch continues.
    pub fn integrate(&mut self, payload: ExtractionPayload) -> IntegrationReport {
        let mut report = IntegrationReport::default();

        for candidate in payload.concepts {
            let name = candidate.name.clone();
            match self.add_concept_if_absent(candidate.into_concept()) {
                Ok(concept) => {
                    if !report.concepts.contains(concept.id()) {
                        report.concepts.push(concept.id().clone());
                    }
                }
                Err(e) => {
                    warn!(concept = %name, error = %e, "skipping concept candidate");
                    report.warnings.push(GraphWarning::SkippedCandidate {
                        candidate: format!("concept '{}'", name),
                        reason: e.to_string(),
                    });
                }
            }
        }

        for candidate in payload.events {
            if let Some(event) = self.resolve_event(candidate, &mut report.warnings) {
                let label = event.id().clone();
                match self.add_event(event) {
                    Ok(warnings) => {
                        report.warnings.extend(warnings);
                        report.events.push(label);
                    }
                    Err(e) => {
                        warn!(event = %label, error = %e, "skipping event candidate");
                        report.warnings.push(GraphWarning::SkippedCandidate {
                            candidate: format!("event {}", label),
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            concepts = report.concepts.len(),
            events = report.events.len(),
            warnings = report.warnings.len(),
            "integrated extraction payload"
        );
        report
    }

    /// Run an extractor over raw input and integrate its output.
    pub fn ingest(&mut self, extractor: &dyn Extractor, input: &str) -> Result<IntegrationReport> {
        let payload = extractor.extract(input)?;
        Ok(self.integrate(payload))
    }

    fn resolve_event(
        &self,
        candidate: ExtractedEvent,
        warnings: &mut Vec<GraphWarning>,
    ) -> Option<Event> {
        let mut concept_ids = Vec::with_capacity(candidate.concept_identifiers.len());
        for identifier in &candidate.concept_identifiers {
            match self.resolve_identifier(identifier) {
                Some(concept) => concept_ids.push(concept.id().clone()),
                None => {
                    warn!(
                        identifier = %identifier,
                        candidate = %candidate.label(),
                        "unresolved concept identifier; skipping event"
                    );
                    warnings.push(GraphWarning::UnresolvedIdentifier {
                        identifier: identifier.clone(),
                        event_id: candidate.id.clone(),
                    });
                    return None;
                }
            }
        }

        let label = candidate.label();
        let mut event = match Event::new(concept_ids, candidate.delta) {
            Ok(event) => event.with_properties(candidate.properties),
            Err(e) => {
                warn!(candidate = %label, error = %e, "skipping event candidate");
                warnings.push(GraphWarning::SkippedCandidate {
                    candidate: label,
                    reason: e.to_string(),
                });
                return None;
            }
        };
        if let Some(id) = candidate.id {
            event = event.with_id(id);
        }
        if let Some(timestamp) = candidate.timestamp {
            event = event.with_timestamp(timestamp);
        }
        if let Some(kind) = candidate.kind {
            event = event.with_kind(kind);
        }
        Some(event)
    }
}
