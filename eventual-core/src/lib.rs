//! # eventual-core
//!
//! An in-memory knowledge hypergraph for event-centric reasoning.
//!
//! ## Core Components
//!
//! - **Graph**: Concepts with numeric state histories, joined by events (hyperedges)
//! - **Boundary**: Static or decay-weighted dynamic change detection
//! - **Retrieval**: Normalized-term lookup of concepts and their events
//! - **Extraction**: Merging externally extracted concept/event candidates
//! - **Snapshot**: JSON dump and reload of the whole graph
//!
//! ## Example
//!
//! ```rust,ignore
//! use eventual_core::{ChangeDetector, ChangeDetectorConfig, Concept, Hypergraph};
//!
//! let mut graph = Hypergraph::new();
//! let light = graph.add_concept(Concept::new("light", 1.0))?.id().clone();
//!
//! let mut detector = ChangeDetector::new(ChangeDetectorConfig::static_threshold(0.3))?;
//! if let Some(event_id) = graph.observe_state(&mut detector, &light, 0.2, Some("dimmed"))? {
//!     println!("significant change recorded as {}", event_id);
//! }
//!
//! let result = graph.retrieve(["light"]);
//! ```

pub mod boundary;
pub mod error;
pub mod extraction;
pub mod graph;
pub mod normalize;
pub mod retrieval;
pub mod snapshot;

mod proptest;
mod serde_float;

// Re-exports for convenience
pub use boundary::{ChangeDetector, ChangeDetectorConfig};
pub use error::{EntityKind, Error, GraphWarning, Result};
pub use extraction::{
    ExtractedConcept, ExtractedEvent, ExtractionPayload, Extractor, IntegrationReport,
    RelationshipJsonExtractor,
};
pub use graph::{
    Concept, ConceptId, Event, EventId, EventKind, GraphStats, Hypergraph, SharedHypergraph,
    StateRecord,
};
pub use normalize::{LowercaseNormalizer, TermNormalizer, TokenNormalizer};
pub use retrieval::{RetrievalQuery, RetrievalResult};
pub use snapshot::{ConceptRecord, EventRecord, GraphSnapshot, Restored};
