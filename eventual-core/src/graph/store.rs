//! In-memory hypergraph store.

use crate::boundary::ChangeDetector;
use crate::error::{Error, GraphWarning, Result};
use crate::graph::types::*;
use crate::normalize::{LowercaseNormalizer, TermNormalizer};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::borrow::Borrow;
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, warn};

/// Owns every concept and event, plus the normalized-name index.
///
/// Concepts and events refer to each other by id only; the back-reference
/// set on each concept is maintained by [`Hypergraph::add_event`]. Events
/// naming a concept that is not stored yet are parked in `dangling` and
/// linked when that concept is added.
#[derive(Clone)]
pub struct Hypergraph {
    concepts: HashMap<ConceptId, Concept>,
    events: HashMap<EventId, Event>,
    names: HashMap<String, ConceptId>,
    dangling: HashMap<ConceptId, BTreeSet<EventId>>,
    normalizer: Arc<dyn TermNormalizer>,
}

impl Hypergraph {
    /// Create an empty graph using [`LowercaseNormalizer`] for names.
    pub fn new() -> Self {
        Self::with_normalizer(Arc::new(LowercaseNormalizer))
    }

    /// Create an empty graph with a custom name normalizer.
    pub fn with_normalizer(normalizer: Arc<dyn TermNormalizer>) -> Self {
        Self {
            concepts: HashMap::new(),
            events: HashMap::new(),
            names: HashMap::new(),
            dangling: HashMap::new(),
            normalizer,
        }
    }

    pub fn normalizer(&self) -> &dyn TermNormalizer {
        self.normalizer.as_ref()
    }

    /// Normalized form used by the name index.
    pub fn normalize_name(&self, name: &str) -> String {
        self.normalizer.normalize(name)
    }

    // ==================== Concept Operations ====================

    /// Add a concept.
    ///
    /// Fails with `DuplicateId` if the id is taken and `DuplicateName` if the
    /// normalized name belongs to another concept. The graph is unchanged on
    /// failure.
    pub fn add_concept(&mut self, mut concept: Concept) -> Result<&Concept> {
        if self.concepts.contains_key(concept.id()) {
            return Err(Error::duplicate_concept_id(concept.id()));
        }
        let key = self.normalize_name(concept.name());
        if let Some(existing) = self.names.get(&key) {
            return Err(Error::duplicate_name(concept.name(), existing.clone()));
        }

        // Events that named this id before it existed.
        concept.events = self.dangling.remove(concept.id()).unwrap_or_default();

        let id = concept.id().clone();
        debug!(
            concept = %id,
            name = concept.name(),
            pending_events = concept.events.len(),
            "adding concept"
        );
        self.names.insert(key, id.clone());
        let stored: &Concept = self.concepts.entry(id).or_insert(concept);
        Ok(stored)
    }

    /// Return the stored concept matching `concept` by id, else by normalized
    /// name, adding `concept` only when neither exists.
    pub fn add_concept_if_absent(&mut self, concept: Concept) -> Result<&Concept> {
        if self.concepts.contains_key(concept.id()) {
            return Ok(&self.concepts[concept.id()]);
        }
        let existing = self
            .names
            .get(&self.normalize_name(concept.name()))
            .cloned();
        match existing {
            Some(id) => Ok(&self.concepts[&id]),
            None => self.add_concept(concept),
        }
    }

    pub fn get_concept<Q>(&self, id: &Q) -> Option<&Concept>
    where
        ConceptId: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.concepts.get(id)
    }

    /// Look up a concept by name, comparing normalized forms.
    pub fn get_concept_by_name(&self, name: &str) -> Option<&Concept> {
        self.get_concept_by_key(&self.normalize_name(name))
    }

    /// Look up a concept by an already-normalized name key.
    pub(crate) fn get_concept_by_key(&self, key: &str) -> Option<&Concept> {
        self.names.get(key).and_then(|id| self.concepts.get(id))
    }

    pub fn contains_concept<Q>(&self, id: &Q) -> bool
    where
        ConceptId: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.concepts.contains_key(id)
    }

    /// Update a concept's state. Returns the applied delta, `None` for a no-op.
    pub fn update_concept_state(
        &mut self,
        id: &ConceptId,
        new_state: f64,
        reason: Option<&str>,
    ) -> Result<Option<f64>> {
        let concept = self
            .concepts
            .get_mut(id)
            .ok_or_else(|| Error::UnknownConcept(id.clone()))?;
        Ok(concept.update_state(new_state, reason))
    }

    /// Insert or replace a metadata entry on a stored concept.
    pub fn add_concept_metadata(
        &mut self,
        id: &ConceptId,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<()> {
        let concept = self
            .concepts
            .get_mut(id)
            .ok_or_else(|| Error::UnknownConcept(id.clone()))?;
        concept.add_metadata(key, value);
        Ok(())
    }

    /// Feed a new state through a change detector.
    ///
    /// The concept's state is always updated. When the detector reports a
    /// significant change, a [`EventKind::StateChange`] event carrying the
    /// magnitude is stored and its id returned. A no-op update (bit-equal
    /// state) is not an observation: the detector is not consulted.
    pub fn observe_state(
        &mut self,
        detector: &mut ChangeDetector,
        id: &ConceptId,
        new_state: f64,
        reason: Option<&str>,
    ) -> Result<Option<EventId>> {
        let concept = self
            .concepts
            .get_mut(id)
            .ok_or_else(|| Error::UnknownConcept(id.clone()))?;
        let previous = concept.state();
        if previous.to_bits() == new_state.to_bits() {
            return Ok(None);
        }
        let magnitude = detector.evaluate(id, previous, new_state);
        concept.update_state(new_state, reason);

        let Some(magnitude) = magnitude else {
            return Ok(None);
        };

        let mut event = Event::new([id.clone()], magnitude)?
            .with_kind(EventKind::StateChange)
            .with_property("previous_state", previous)
            .with_property("new_state", new_state);
        if let Some(reason) = reason {
            event = event.with_property("reason", reason);
        }
        let event_id = event.id().clone();
        self.add_event(event)?;
        Ok(Some(event_id))
    }

    // ==================== Event Operations ====================

    /// Add an event and link it into its concepts' back-reference sets.
    ///
    /// The event keeps its declared concept set. References to concepts not
    /// in the graph are not linked and are reported as
    /// [`GraphWarning::DanglingReference`]; they are linked if the concept is
    /// added later. Only a duplicate event id is an error.
    pub fn add_event(&mut self, event: Event) -> Result<Vec<GraphWarning>> {
        if self.events.contains_key(event.id()) {
            return Err(Error::duplicate_event_id(event.id()));
        }

        let event_id = event.id().clone();
        let mut warnings = Vec::new();
        for concept_id in event.concepts() {
            match self.concepts.get_mut(concept_id) {
                Some(concept) => {
                    concept.events.insert(event_id.clone());
                }
                None => {
                    warn!(
                        event = %event_id,
                        concept = %concept_id,
                        "event references a concept not in the graph; not linked"
                    );
                    self.dangling
                        .entry(concept_id.clone())
                        .or_default()
                        .insert(event_id.clone());
                    warnings.push(GraphWarning::DanglingReference {
                        event_id: event_id.clone(),
                        concept_id: concept_id.clone(),
                    });
                }
            }
        }

        debug!(
            event = %event_id,
            concepts = event.concepts().len(),
            dangling = warnings.len(),
            "added event"
        );
        self.events.insert(event_id, event);
        Ok(warnings)
    }

    /// Ids an event declares that are not stored in the graph.
    pub fn unresolved_concepts<'a>(&self, event: &'a Event) -> Vec<&'a ConceptId> {
        event
            .concepts()
            .iter()
            .filter(|id| !self.concepts.contains_key(*id))
            .collect()
    }

    pub fn get_event<Q>(&self, id: &Q) -> Option<&Event>
    where
        EventId: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.events.get(id)
    }

    /// Events a concept participates in, oldest first. Empty for an unknown id.
    pub fn get_events_for_concept<Q>(&self, id: &Q) -> Vec<&Event>
    where
        ConceptId: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(concept) = self.concepts.get(id) else {
            return Vec::new();
        };
        let mut events: Vec<&Event> = concept
            .events()
            .iter()
            .filter_map(|event_id| self.events.get(event_id))
            .collect();
        sort_chronological(&mut events);
        events
    }

    // ==================== Queries ====================

    /// Concepts sharing at least one event with `id`, excluding `id` itself.
    pub fn find_related_concepts<Q>(&self, id: &Q) -> Vec<&Concept>
    where
        ConceptId: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let Some(concept) = self.concepts.get(id) else {
            return Vec::new();
        };
        let related: BTreeSet<&ConceptId> = concept
            .events()
            .iter()
            .filter_map(|event_id| self.events.get(event_id))
            .flat_map(|event| event.concepts())
            .filter(|other| *other != concept.id())
            .collect();
        let mut concepts: Vec<&Concept> = related
            .into_iter()
            .filter_map(|other| self.concepts.get::<ConceptId>(other))
            .collect();
        sort_by_name(&mut concepts);
        concepts
    }

    /// Events whose concept set is exactly `ids`.
    ///
    /// Returns nothing if any id is unknown or the set is empty.
    pub fn find_events_by_exact_concept_set<I, C>(&self, ids: I) -> Vec<&Event>
    where
        I: IntoIterator<Item = C>,
        C: Into<ConceptId>,
    {
        let target: BTreeSet<ConceptId> = ids.into_iter().map(Into::into).collect();
        if target.is_empty() || !target.iter().all(|id| self.concepts.contains_key(id)) {
            return Vec::new();
        }

        // Any matching event is linked from every member; scan one member's links.
        let Some(anchor) = target.iter().next().and_then(|id| self.concepts.get(id)) else {
            return Vec::new();
        };
        let mut events: Vec<&Event> = anchor
            .events()
            .iter()
            .filter_map(|event_id| self.events.get(event_id))
            .filter(|event| event.concepts() == &target)
            .collect();
        sort_chronological(&mut events);
        events
    }

    /// Concepts whose name contains `keyword`, ignoring case.
    pub fn search_concepts_by_substring(&self, keyword: &str) -> Vec<&Concept> {
        let needle = keyword.to_lowercase();
        let mut concepts: Vec<&Concept> = self
            .concepts
            .values()
            .filter(|c| c.name().to_lowercase().contains(&needle))
            .collect();
        sort_by_name(&mut concepts);
        concepts
    }

    /// Events no older than `window`, most recent first.
    pub fn recent_events(&self, window: Duration) -> Vec<&Event> {
        self.recent_events_at(Utc::now(), window)
    }

    /// Events with `now - timestamp <= window`, most recent first.
    pub fn recent_events_at(&self, now: DateTime<Utc>, window: Duration) -> Vec<&Event> {
        let mut events: Vec<&Event> = self
            .events
            .values()
            .filter(|event| now - event.timestamp() <= window)
            .collect();
        sort_most_recent_first(&mut events);
        events
    }

    // ==================== Iteration & Stats ====================

    /// All concepts, ordered by id.
    pub fn concepts(&self) -> Vec<&Concept> {
        let mut concepts: Vec<&Concept> = self.concepts.values().collect();
        concepts.sort_by(|a, b| a.id().cmp(b.id()));
        concepts
    }

    /// All events, oldest first.
    pub fn events(&self) -> Vec<&Event> {
        let mut events: Vec<&Event> = self.events.values().collect();
        sort_chronological(&mut events);
        events
    }

    pub fn concept_count(&self) -> usize {
        self.concepts.len()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty() && self.events.is_empty()
    }

    /// Get statistics about the graph.
    pub fn stats(&self) -> GraphStats {
        let mut events_by_kind: HashMap<String, usize> = HashMap::new();
        for event in self.events.values() {
            let kind = event
                .kind()
                .map(|k| k.as_str().to_string())
                .unwrap_or_else(|| "untagged".to_string());
            *events_by_kind.entry(kind).or_insert(0) += 1;
        }

        GraphStats {
            total_concepts: self.concepts.len(),
            total_events: self.events.len(),
            isolated_concepts: self
                .concepts
                .values()
                .filter(|c| c.events().is_empty())
                .count(),
            history_records: self.concepts.values().map(|c| c.history().len()).sum(),
            events_by_kind,
        }
    }
}

impl Default for Hypergraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Hypergraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hypergraph")
            .field("concepts", &self.concepts.len())
            .field("events", &self.events.len())
            .finish()
    }
}

/// Statistics about the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphStats {
    pub total_concepts: usize,
    pub total_events: usize,
    /// Concepts not linked to any event
    pub isolated_concepts: usize,
    pub history_records: usize,
    pub events_by_kind: HashMap<String, usize>,
}

pub(crate) fn sort_chronological(events: &mut [&Event]) {
    events.sort_by(|a, b| {
        a.timestamp()
            .cmp(&b.timestamp())
            .then_with(|| a.id().cmp(b.id()))
    });
}

pub(crate) fn sort_most_recent_first(events: &mut [&Event]) {
    events.sort_by(|a, b| {
        b.timestamp()
            .cmp(&a.timestamp())
            .then_with(|| a.id().cmp(b.id()))
    });
}

pub(crate) fn sort_by_name(concepts: &mut [&Concept]) {
    concepts.sort_by(|a, b| a.name().cmp(b.name()).then_with(|| a.id().cmp(b.id())));
}
