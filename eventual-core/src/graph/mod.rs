//! Concept/event hypergraph.
//!
//! The graph stores two kinds of entities:
//!
//! - **Concept**: a named numeric state with an append-only history
//! - **Event**: a hyperedge joining one or more concepts at a point in time
//!
//! Both live in id-keyed maps owned by [`Hypergraph`]. Events hold the ids of
//! their concepts and each concept holds the ids of its events, so the cyclic
//! relation never becomes an ownership cycle.
//!
//! ## Example
//!
//! ```rust,ignore
//! use eventual_core::graph::{Concept, Event, EventKind, Hypergraph};
//!
//! let mut graph = Hypergraph::new();
//! graph.add_concept(Concept::with_id("light_1", "light", 1.0))?;
//! graph.add_concept(Concept::with_id("room_1", "room", 0.0))?;
//!
//! let event = Event::new(["light_1", "room_1"], 0.0)?.with_kind(EventKind::Relationship);
//! graph.add_event(event)?;
//!
//! let related = graph.find_related_concepts("light_1");
//! ```

mod shared;
mod store;
mod types;

pub(crate) use store::{sort_by_name, sort_most_recent_first};

pub use shared::SharedHypergraph;
pub use store::{GraphStats, Hypergraph};
pub use types::{
    Concept, ConceptId, Event, EventId, EventKind, StateRecord, INITIAL_STATE_REASON,
};
