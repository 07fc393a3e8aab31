//! Property-based tests for graph and change-detection invariants.
//!
//! These tests verify that:
//!
//! - Concept histories are never empty and always end at the current state
//! - Static detection fires exactly when the magnitude reaches the threshold
//! - Dynamic thresholds never fall below the base threshold
//! - Neighbour queries never return the queried concept
//! - Events with missing concepts are kept and linked once the concepts exist
//! - Snapshots restore an identical graph

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::boundary::{ChangeDetector, ChangeDetectorConfig};
    use crate::graph::{Concept, ConceptId, Event, Hypergraph};

    fn state() -> impl Strategy<Value = f64> {
        prop_oneof![
            Just(0.0),
            Just(1.0),
            -1000.0f64..1000.0f64,
        ]
    }

    fn threshold() -> impl Strategy<Value = f64> {
        0.0f64..10.0f64
    }

    fn decay() -> impl Strategy<Value = f64> {
        0.0f64..=1.0f64
    }

    // Small graphs: up to 6 concepts and a list of events over their indices.
    fn graph_shape() -> impl Strategy<Value = (usize, Vec<Vec<usize>>)> {
        (1usize..6).prop_flat_map(|n| {
            (
                Just(n),
                prop::collection::vec(prop::collection::vec(0..n, 1..4), 0..8),
            )
        })
    }

    fn build_graph(n: usize, events: &[Vec<usize>]) -> Hypergraph {
        let mut graph = Hypergraph::new();
        for i in 0..n {
            let id = format!("c{}", i);
            graph
                .add_concept(Concept::with_id(id.as_str(), id.as_str(), i as f64))
                .unwrap();
        }
        for (i, members) in events.iter().enumerate() {
            let ids: Vec<String> = members.iter().map(|m| format!("c{}", m)).collect();
            graph
                .add_event(Event::new(ids, i as f64).unwrap().with_id(format!("e{}", i)))
                .unwrap();
        }
        graph
    }

    // =========================================================================
    // Concept History
    // =========================================================================

    proptest! {
        /// The last history record always carries the current state.
        #[test]
        fn history_ends_at_current_state(
            initial in state(),
            updates in prop::collection::vec(state(), 0..20)
        ) {
            let mut concept = Concept::new("sensor", initial);
            let mut expected_len = 1;
            for value in updates {
                let before = concept.state();
                let delta = concept.update_state(value, None);
                if before.to_bits() == value.to_bits() {
                    prop_assert!(delta.is_none());
                } else {
                    expected_len += 1;
                    prop_assert_eq!(delta, Some(value - before));
                }
                let last = concept.history().last().unwrap();
                prop_assert_eq!(last.state.to_bits(), concept.state().to_bits());
            }
            prop_assert_eq!(concept.history().len(), expected_len);
        }
    }

    // =========================================================================
    // Change Detection
    // =========================================================================

    proptest! {
        /// Static mode reports a magnitude iff it reaches the base threshold.
        #[test]
        fn static_detection_matches_threshold(
            base in threshold(),
            previous in state(),
            next in state()
        ) {
            let mut detector = ChangeDetector::new(ChangeDetectorConfig::static_threshold(base)).unwrap();
            let id = ConceptId::from("sensor");
            let magnitude = (next - previous).abs();

            let result = detector.evaluate(&id, previous, next);
            if magnitude >= base {
                prop_assert_eq!(result, Some(magnitude));
            } else {
                prop_assert!(result.is_none());
            }
        }

        /// Dynamic thresholds are never below the base threshold.
        #[test]
        fn dynamic_threshold_at_least_base(
            base in threshold(),
            decay in decay(),
            transitions in prop::collection::vec((state(), state()), 1..15)
        ) {
            let mut detector =
                ChangeDetector::new(ChangeDetectorConfig::dynamic_threshold(base, decay)).unwrap();
            let id = ConceptId::from("sensor");
            for (previous, next) in transitions {
                detector.evaluate(&id, previous, next);
                prop_assert!(detector.current_threshold(&id) >= base);
            }
        }
    }

    // =========================================================================
    // Graph Structure
    // =========================================================================

    proptest! {
        /// Related concepts exclude the queried concept and share an event with it.
        #[test]
        fn related_concepts_exclude_self((n, events) in graph_shape()) {
            let graph = build_graph(n, &events);
            for concept in graph.concepts() {
                for related in graph.find_related_concepts(concept.id()) {
                    prop_assert_ne!(related.id(), concept.id());
                    let shares_event = graph
                        .get_events_for_concept(concept.id())
                        .iter()
                        .any(|e| e.involves(related.id()));
                    prop_assert!(shares_event);
                }
            }
        }

        /// Every event is linked from each of its concepts.
        #[test]
        fn back_references_are_consistent((n, events) in graph_shape()) {
            let graph = build_graph(n, &events);
            for event in graph.events() {
                for concept_id in event.concepts() {
                    let concept = graph.get_concept(concept_id).unwrap();
                    prop_assert!(concept.events().contains(event.id()));
                }
            }
        }

        /// Inserting an existing concept again never grows the graph.
        #[test]
        fn add_if_absent_is_idempotent((n, events) in graph_shape(), pick in 0usize..6) {
            let mut graph = build_graph(n, &events);
            let id = format!("c{}", pick % n);

            let stored_id = graph
                .add_concept_if_absent(Concept::new(id.to_uppercase(), 42.0))
                .unwrap()
                .id()
                .clone();

            prop_assert_eq!(stored_id.as_str(), id.as_str());
            prop_assert_eq!(graph.concept_count(), n);
            prop_assert!(graph.add_concept(Concept::with_id(id.as_str(), "fresh", 0.0)).is_err());
            prop_assert_eq!(graph.concept_count(), n);
        }

        /// Events are stored even when some or all of their concepts are
        /// missing, and become linked once those concepts are added.
        #[test]
        fn dangling_events_are_kept_and_linked_later(
            (n, events) in graph_shape(),
            missing in 1usize..3
        ) {
            // Concepts c{n}..c{n+missing} are referenced but not stored yet.
            let shifted: Vec<Vec<usize>> = events
                .iter()
                .map(|members| members.iter().map(|m| m + missing).collect())
                .collect();
            let mut graph = Hypergraph::new();
            for i in 0..n {
                let id = format!("c{}", i);
                graph
                    .add_concept(Concept::with_id(id.as_str(), id.as_str(), 0.0))
                    .unwrap();
            }
            for (i, members) in shifted.iter().enumerate() {
                let ids: Vec<String> = members.iter().map(|m| format!("c{}", m)).collect();
                graph.add_event(Event::new(ids, 0.0).unwrap().with_id(format!("e{}", i))).unwrap();
            }
            prop_assert_eq!(graph.event_count(), events.len());

            let snapshot = graph.snapshot();
            let restored = Hypergraph::from_snapshot(snapshot.clone()).unwrap();
            prop_assert_eq!(restored.graph.snapshot(), snapshot);

            for i in n..n + missing {
                let id = format!("c{}", i);
                graph.add_concept(Concept::with_id(id.as_str(), id.as_str(), 0.0)).unwrap();
            }
            for event in graph.events() {
                prop_assert!(graph.unresolved_concepts(event).is_empty());
                for concept_id in event.concepts() {
                    prop_assert!(graph.get_concept(concept_id).unwrap().events().contains(event.id()));
                }
            }
        }

        /// A snapshot reloads to the same graph.
        #[test]
        fn snapshot_round_trip((n, events) in graph_shape()) {
            let graph = build_graph(n, &events);
            let snapshot = graph.snapshot();
            let restored = Hypergraph::from_snapshot(snapshot.clone()).unwrap();

            prop_assert!(restored.warnings.is_empty());
            prop_assert_eq!(restored.graph.snapshot(), snapshot);
        }
    }
}
