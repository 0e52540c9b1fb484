//! Data models for fablegraph.
//!
//! This module contains the core data contracts used throughout the engine.

pub mod entity;
mod events;
mod job;
pub mod relationship;

pub use entity::{Entity, EntityId, EntityPatch, EntityQuery, EntityType, normalize_name};
pub use events::{EventMeta, GraphEvent};
pub use job::{BatchOutcome, CostEstimate, ExtractionJob, JobId, JobState, TokenUsage};
pub use relationship::{RelationCategory, RelationType, Relationship, RelationshipQuery};
