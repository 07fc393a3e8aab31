//! Error and warning types for eventual-core.

use crate::graph::{ConceptId, EventId};
use thiserror::Error;

/// Result type alias using eventual-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Which kind of graph entity an identity conflict refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Concept,
    Event,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Concept => write!(f, "concept"),
            Self::Event => write!(f, "event"),
        }
    }
}

/// Errors that can occur during hypergraph operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A concept or event with this id is already stored
    #[error("Duplicate {entity} id: {id}")]
    DuplicateId { entity: EntityKind, id: String },

    /// A concept with the same normalized name is already stored
    #[error("Duplicate concept name '{name}' (already used by {existing})")]
    DuplicateName { name: String, existing: ConceptId },

    /// Candidate rejected at construction
    #[error("Malformed candidate: {0}")]
    MalformedCandidate(String),

    /// Mutation addressed a concept that is not stored
    #[error("Unknown concept: {0}")]
    UnknownConcept(ConceptId),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Snapshot contents are internally inconsistent
    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error while saving or loading a snapshot
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a duplicate concept id error.
    pub fn duplicate_concept_id(id: &ConceptId) -> Self {
        Self::DuplicateId {
            entity: EntityKind::Concept,
            id: id.to_string(),
        }
    }

    /// Create a duplicate event id error.
    pub fn duplicate_event_id(id: &EventId) -> Self {
        Self::DuplicateId {
            entity: EntityKind::Event,
            id: id.to_string(),
        }
    }

    /// Create a duplicate name error.
    pub fn duplicate_name(name: impl Into<String>, existing: ConceptId) -> Self {
        Self::DuplicateName {
            name: name.into(),
            existing,
        }
    }

    /// Create a malformed candidate error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedCandidate(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error is a duplicate id or duplicate name conflict.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateId { .. } | Self::DuplicateName { .. })
    }
}

/// A recoverable condition reported alongside a successful (possibly partial) operation.
///
/// Warnings never abort a mutation; they are returned to the caller and also
/// logged through `tracing`.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphWarning {
    /// An event was stored without a link to a concept absent from the graph.
    DanglingReference {
        event_id: EventId,
        concept_id: ConceptId,
    },

    /// A candidate event named a concept that could not be resolved by id or name.
    UnresolvedIdentifier {
        identifier: String,
        event_id: Option<EventId>,
    },

    /// A candidate was dropped from an integration batch.
    SkippedCandidate { candidate: String, reason: String },

    /// A snapshot event referenced a concept missing from the same snapshot.
    ReferenceOutsideSnapshot {
        event_id: EventId,
        concept_id: ConceptId,
    },
}

impl std::fmt::Display for GraphWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DanglingReference {
                event_id,
                concept_id,
            } => write!(
                f,
                "event {} not linked to missing concept {}",
                event_id, concept_id
            ),
            Self::UnresolvedIdentifier {
                identifier,
                event_id,
            } => match event_id {
                Some(id) => write!(f, "identifier '{}' for event {} not found", identifier, id),
                None => write!(f, "identifier '{}' for new event not found", identifier),
            },
            Self::SkippedCandidate { candidate, reason } => {
                write!(f, "skipped candidate {}: {}", candidate, reason)
            }
            Self::ReferenceOutsideSnapshot {
                event_id,
                concept_id,
            } => write!(
                f,
                "snapshot event {} references unknown concept {}",
                event_id, concept_id
            ),
        }
    }
}
