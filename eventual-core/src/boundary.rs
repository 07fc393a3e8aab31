//! Temporal boundary: deciding when a state change is significant.
//!
//! A [`ChangeDetector`] compares a concept's previous and proposed state. In
//! static mode the change must reach `base_threshold`. In dynamic mode every
//! observed magnitude is remembered per concept and the threshold is raised
//! by a decay-weighted average of that history:
//!
//! ```text
//! avg       = sum(delta_i * decay^i) / n     (i = 0 is the most recent)
//! threshold = base_threshold * (1 + avg)
//! ```
//!
//! The detector never touches the hypergraph; callers turn a returned
//! magnitude into an [`Event`] (see [`ChangeDetector::detect_event`] and
//! `Hypergraph::observe_state`).

use crate::error::{Error, Result};
use crate::graph::{Concept, ConceptId, Event, EventKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Configuration for the change detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeDetectorConfig {
    /// Minimum change that counts as significant
    pub base_threshold: f64,
    /// Weight ratio between consecutive past deltas, in `[0, 1]`
    pub decay_factor: f64,
    /// Scale the threshold by the concept's change history
    pub dynamic: bool,
}

impl Default for ChangeDetectorConfig {
    fn default() -> Self {
        Self {
            base_threshold: 0.1,
            decay_factor: 0.9,
            dynamic: true,
        }
    }
}

impl ChangeDetectorConfig {
    /// Fixed threshold, no history.
    pub fn static_threshold(base_threshold: f64) -> Self {
        Self {
            base_threshold,
            dynamic: false,
            ..Self::default()
        }
    }

    /// History-weighted threshold.
    pub fn dynamic_threshold(base_threshold: f64, decay_factor: f64) -> Self {
        Self {
            base_threshold,
            decay_factor,
            dynamic: true,
        }
    }

    pub fn with_base_threshold(mut self, base_threshold: f64) -> Self {
        self.base_threshold = base_threshold;
        self
    }

    pub fn with_decay_factor(mut self, decay_factor: f64) -> Self {
        self.decay_factor = decay_factor;
        self
    }

    pub fn with_dynamic(mut self, dynamic: bool) -> Self {
        self.dynamic = dynamic;
        self
    }

    /// Check the configuration.
    ///
    /// A decay factor of exactly 0 is accepted: only the latest delta then
    /// carries weight.
    pub fn validate(&self) -> Result<()> {
        if !self.base_threshold.is_finite() || self.base_threshold < 0.0 {
            return Err(Error::config(format!(
                "base_threshold must be a finite non-negative number, got {}",
                self.base_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.decay_factor) {
            return Err(Error::config(format!(
                "decay_factor must lie in [0, 1], got {}",
                self.decay_factor
            )));
        }
        Ok(())
    }
}

/// Detects significant state transitions.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    config: ChangeDetectorConfig,
    history: HashMap<ConceptId, Vec<f64>>,
}

impl ChangeDetector {
    /// Create a detector, validating the configuration.
    pub fn new(config: ChangeDetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            history: HashMap::new(),
        })
    }

    pub fn config(&self) -> &ChangeDetectorConfig {
        &self.config
    }

    /// Evaluate a transition for a concept.
    ///
    /// Returns `Some(magnitude)` when `|new_state - previous_state|` reaches
    /// the effective threshold. In dynamic mode the magnitude is recorded in
    /// the concept's delta history before the threshold is computed.
    pub fn evaluate(
        &mut self,
        concept_id: &ConceptId,
        previous_state: f64,
        new_state: f64,
    ) -> Option<f64> {
        let magnitude = (new_state - previous_state).abs();

        let threshold = if self.config.dynamic {
            let deltas = self.history.entry(concept_id.clone()).or_default();
            deltas.push(magnitude);
            self.config.base_threshold
                * (1.0 + weighted_average(deltas, self.config.decay_factor))
        } else {
            self.config.base_threshold
        };

        let significant = magnitude >= threshold;
        debug!(
            concept = %concept_id,
            magnitude,
            threshold,
            significant,
            "evaluated state transition"
        );

        significant.then_some(magnitude)
    }

    /// Evaluate a concept's transition to `new_state` and build a single-concept
    /// state-change event when it is significant.
    pub fn detect_event(&mut self, concept: &Concept, new_state: f64) -> Option<Event> {
        let magnitude = self.evaluate(concept.id(), concept.state(), new_state)?;
        Event::new([concept.id().clone()], magnitude)
            .ok()
            .map(|event| {
                event
                    .with_kind(EventKind::StateChange)
                    .with_property("previous_state", concept.state())
                    .with_property("new_state", new_state)
            })
    }

    /// Threshold implied by the history recorded so far, without recording a
    /// new observation.
    pub fn current_threshold(&self, concept_id: &ConceptId) -> f64 {
        if !self.config.dynamic {
            return self.config.base_threshold;
        }
        let avg = self
            .history
            .get(concept_id)
            .map(|deltas| weighted_average(deltas, self.config.decay_factor))
            .unwrap_or(0.0);
        self.config.base_threshold * (1.0 + avg)
    }

    /// Magnitudes recorded for a concept, oldest first.
    pub fn delta_history(&self, concept_id: &ConceptId) -> &[f64] {
        self.history
            .get(concept_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Forget a concept's delta history.
    pub fn reset(&mut self, concept_id: &ConceptId) {
        self.history.remove(concept_id);
    }
}

/// Decay-weighted mean of `deltas`, with the last element weighted 1.
fn weighted_average(deltas: &[f64], decay_factor: f64) -> f64 {
    if deltas.is_empty() {
        return 0.0;
    }
    let weighted: f64 = deltas
        .iter()
        .rev()
        .enumerate()
        .map(|(i, delta)| delta * decay_factor.powi(i as i32))
        .sum();
    weighted / deltas.len() as f64
}
