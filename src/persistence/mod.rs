//! Graph persistence.
//!
//! One durable JSON document per project. The document carries the full
//! entity and relationship records plus a flattened interchange copy, so
//! third-party tools can consume it without knowing the full schema.
//! Loads are validated in two stages: section presence first, then typed
//! deserialization and referential checks, so a corrupt document fails
//! closed instead of producing a partial graph.

mod filesystem;

pub use filesystem::FileGraphStore;

use crate::export::InterchangeGraph;
use crate::graph::{GraphMetadata, KnowledgeGraph};
use crate::models::{Entity, EntityId, Relationship};
use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Required top-level sections of a graph document.
const REQUIRED_SECTIONS: &[&str] = &["metadata", "graph", "entities", "relationships"];

/// The serialized persistence unit for one project's graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    /// Graph counters and bookkeeping.
    pub metadata: GraphMetadata,
    /// Flattened node/edge interchange copy.
    pub graph: InterchangeGraph,
    /// Full entity records, keyed by id.
    pub entities: HashMap<EntityId, Entity>,
    /// Full relationship records.
    pub relationships: Vec<Relationship>,
}

impl GraphDocument {
    /// Builds a document from a graph.
    #[must_use]
    pub fn from_graph(graph: &KnowledgeGraph) -> Self {
        Self {
            metadata: graph.metadata().clone(),
            graph: InterchangeGraph::from_graph(graph),
            entities: graph
                .entities()
                .map(|entity| (entity.id.clone(), entity.clone()))
                .collect(),
            relationships: graph.relationships().cloned().collect(),
        }
    }

    /// Parses and validates a serialized document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when the text is not JSON, a
    /// required section is missing, a section has the wrong shape, or a
    /// relationship references an entity absent from the document.
    pub fn parse(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| Error::Validation(format!("not valid JSON: {e}")))?;

        for section in REQUIRED_SECTIONS {
            if value.get(section).is_none() {
                return Err(Error::Validation(format!("missing section '{section}'")));
            }
        }

        let document: Self = serde_json::from_value(value)
            .map_err(|e| Error::Validation(format!("malformed section: {e}")))?;
        document.validate()?;
        Ok(document)
    }

    /// Checks referential consistency of the document.
    fn validate(&self) -> Result<()> {
        for relationship in &self.relationships {
            for endpoint in [&relationship.source_id, &relationship.target_id] {
                if !self.entities.contains_key(endpoint) {
                    return Err(Error::Validation(format!(
                        "relationship references unknown entity '{endpoint}'"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Serializes the document to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Storage {
            operation: "serialize_graph_document".to_string(),
            cause: e.to_string(),
        })
    }

    /// Rebuilds the in-memory graph from this document.
    #[must_use]
    pub fn into_graph(self) -> KnowledgeGraph {
        KnowledgeGraph::from_parts(self.metadata, self.entities, self.relationships)
    }
}

/// Trait for graph document stores.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Loads a project's graph. Returns `None` when the project has no
    /// persisted document yet.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for a corrupt document and
    /// [`Error::Storage`] for I/O failures.
    async fn load(&self, project_id: &str) -> Result<Option<KnowledgeGraph>>;

    /// Durably saves a project's graph, replacing any previous document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] for I/O or serialization failures.
    async fn save(&self, graph: &KnowledgeGraph) -> Result<()>;

    /// Deletes a project's document. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] for I/O failures.
    async fn delete(&self, project_id: &str) -> Result<bool>;

    /// Lists project ids with a persisted document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] for I/O failures.
    async fn list_projects(&self) -> Result<Vec<String>>;
}
