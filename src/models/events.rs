//! Graph mutation and job lifecycle events for subscribers.

use super::entity::{EntityId, EntityType};
use super::job::{JobId, JobState};
use super::relationship::RelationType;
use crate::current_timestamp;
use uuid::Uuid;

/// Shared event metadata.
#[derive(Debug, Clone)]
pub struct EventMeta {
    /// Unique identifier for this event.
    pub event_id: String,
    /// Project the event belongs to.
    pub project_id: String,
    /// Timestamp (Unix epoch seconds).
    pub timestamp: u64,
}

impl EventMeta {
    /// Creates new event metadata using the current timestamp.
    #[must_use]
    pub fn new(project_id: impl Into<String>) -> Self {
        Self::with_timestamp(project_id, current_timestamp())
    }

    /// Creates new event metadata with a specified timestamp.
    #[must_use]
    pub fn with_timestamp(project_id: impl Into<String>, timestamp: u64) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            timestamp,
        }
    }
}

/// Events emitted after successful graph mutations and job transitions.
///
/// Delivery is best-effort, at-most-once; there is no ordering guarantee
/// across events from different concurrent jobs.
#[derive(Debug, Clone)]
pub enum GraphEvent {
    /// An entity was added to a graph.
    EntityAdded {
        /// Event metadata.
        meta: EventMeta,
        /// The new entity's id.
        entity_id: EntityId,
        /// The new entity's type.
        entity_type: EntityType,
    },
    /// An existing entity was merged or patched.
    EntityUpdated {
        /// Event metadata.
        meta: EventMeta,
        /// The updated entity's id.
        entity_id: EntityId,
    },
    /// An entity was deleted, cascading its relationships.
    EntityDeleted {
        /// Event metadata.
        meta: EventMeta,
        /// The deleted entity's id.
        entity_id: EntityId,
        /// Relationships removed by the cascade.
        cascaded_relationships: usize,
    },
    /// A relationship was added.
    RelationshipAdded {
        /// Event metadata.
        meta: EventMeta,
        /// Source entity id.
        source_id: EntityId,
        /// Target entity id.
        target_id: EntityId,
        /// Relation type.
        relation_type: RelationType,
    },
    /// Relationships matching a query were deleted.
    RelationshipDeleted {
        /// Event metadata.
        meta: EventMeta,
        /// How many relationships were removed.
        removed: usize,
    },
    /// The project graph was persisted.
    GraphSaved {
        /// Event metadata.
        meta: EventMeta,
        /// Entity count at save time.
        entity_count: usize,
        /// Relationship count at save time.
        relationship_count: usize,
    },
    /// An extraction job changed state.
    JobStateChanged {
        /// Event metadata.
        meta: EventMeta,
        /// The job that transitioned.
        job_id: JobId,
        /// The state entered.
        state: JobState,
        /// Error message when the state is `Failed`.
        error: Option<String>,
    },
}

impl GraphEvent {
    /// Returns the event kind name.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::EntityAdded { .. } => "entity.added",
            Self::EntityUpdated { .. } => "entity.updated",
            Self::EntityDeleted { .. } => "entity.deleted",
            Self::RelationshipAdded { .. } => "relationship.added",
            Self::RelationshipDeleted { .. } => "relationship.deleted",
            Self::GraphSaved { .. } => "graph.saved",
            Self::JobStateChanged { .. } => "job.state_changed",
        }
    }

    /// Returns the event metadata.
    #[must_use]
    pub const fn meta(&self) -> &EventMeta {
        match self {
            Self::EntityAdded { meta, .. }
            | Self::EntityUpdated { meta, .. }
            | Self::EntityDeleted { meta, .. }
            | Self::RelationshipAdded { meta, .. }
            | Self::RelationshipDeleted { meta, .. }
            | Self::GraphSaved { meta, .. }
            | Self::JobStateChanged { meta, .. } => meta,
        }
    }

    /// Returns the project the event belongs to.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.meta().project_id
    }
}
