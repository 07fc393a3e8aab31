//! Read-only knowledge retrieval over a [`Hypergraph`].
//!
//! A query is turned into a set of normalized terms; concepts whose
//! normalized name is one of those terms match, and every event touching a
//! matched concept is returned with them. A recent-activity window can be
//! unioned into the event set.

use crate::graph::{sort_by_name, sort_most_recent_first, Concept, Event, EventId, Hypergraph};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Query builder for retrieving concepts and events.
#[derive(Debug, Clone, Default)]
pub struct RetrievalQuery {
    /// Individual terms, each normalized on its own.
    pub terms: Vec<String>,

    /// Free text, split into terms by the graph's normalizer.
    pub text: Option<String>,

    /// Also include events no older than this window.
    pub recent_window: Option<Duration>,

    /// Reference time for the recent window (defaults to now).
    pub now: Option<DateTime<Utc>>,

    /// Maximum number of events returned.
    pub limit: Option<usize>,
}

impl RetrievalQuery {
    /// Create a new empty query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single term.
    pub fn term(mut self, term: impl Into<String>) -> Self {
        self.terms.push(term.into());
        self
    }

    /// Add several terms.
    pub fn terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.terms.extend(terms.into_iter().map(Into::into));
        self
    }

    /// Match terms mentioned in free text.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Union in events from a recent time window.
    pub fn recent(mut self, window: Duration) -> Self {
        self.recent_window = Some(window);
        self
    }

    /// Evaluate the recent window relative to a fixed time.
    pub fn as_of(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Limit the number of events.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Normalized comparison terms for this query.
    pub fn resolve_terms(&self, graph: &Hypergraph) -> HashSet<String> {
        let normalizer = graph.normalizer();
        let mut terms: HashSet<String> = self
            .terms
            .iter()
            .map(|t| normalizer.normalize(t))
            .filter(|t| !t.is_empty())
            .collect();
        if let Some(ref text) = self.text {
            terms.extend(normalizer.terms(text));
        }
        terms
    }

    /// Execute the query against a graph.
    pub fn execute<'a>(&self, graph: &'a Hypergraph) -> RetrievalResult<'a> {
        let terms = self.resolve_terms(graph);

        // Names are unique per normalized key, so each term matches at most one concept.
        let mut concepts: Vec<&Concept> = terms
            .iter()
            .filter_map(|term| graph.get_concept_by_key(term))
            .collect();
        sort_by_name(&mut concepts);

        let mut events: BTreeMap<&EventId, &Event> = BTreeMap::new();
        for concept in &concepts {
            for event in graph.get_events_for_concept(concept.id()) {
                events.insert(event.id(), event);
            }
        }
        if let Some(window) = self.recent_window {
            let now = self.now.unwrap_or_else(Utc::now);
            for event in graph.recent_events_at(now, window) {
                events.insert(event.id(), event);
            }
        }

        let mut events: Vec<&Event> = events.into_values().collect();
        sort_most_recent_first(&mut events);
        if let Some(limit) = self.limit {
            events.truncate(limit);
        }

        debug!(
            terms = terms.len(),
            concepts = concepts.len(),
            events = events.len(),
            "retrieval complete"
        );

        RetrievalResult { concepts, events }
    }
}

/// Concepts and events answering a retrieval query.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult<'a> {
    /// Matched concepts, ordered by name.
    pub concepts: Vec<&'a Concept>,
    /// Events touching a matched concept (or inside the recent window), most recent first.
    pub events: Vec<&'a Event>,
}

impl RetrievalResult<'_> {
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty() && self.events.is_empty()
    }

    pub fn concept_names(&self) -> Vec<&str> {
        self.concepts.iter().map(|c| c.name()).collect()
    }
}

impl Hypergraph {
    /// Retrieve concepts named by any of `terms`, with every event touching them.
    pub fn retrieve<I, S>(&self, terms: I) -> RetrievalResult<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RetrievalQuery::new().terms(terms).execute(self)
    }

    /// Retrieve using terms extracted from free text.
    pub fn retrieve_text(&self, text: &str) -> RetrievalResult<'_> {
        RetrievalQuery::new().text(text).execute(self)
    }
}
