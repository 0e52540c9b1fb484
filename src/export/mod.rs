//! Graph export formats.
//!
//! Three surfaces:
//! - a generic node/edge interchange form for third-party graph tools,
//!   also embedded in the persisted document
//! - a narrative markdown summary grouped by entity type, written for
//!   external knowledge-ingestion tools
//! - the raw persisted document (see [`crate::persistence::GraphDocument`])

use crate::graph::KnowledgeGraph;
use crate::models::{Entity, EntityType};
use serde::{Deserialize, Serialize};

/// Node/edge interchange representation of a graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterchangeGraph {
    /// All entities as flat nodes.
    pub nodes: Vec<InterchangeNode>,
    /// All relationships as flat edges.
    pub edges: Vec<InterchangeEdge>,
}

/// A node in the interchange form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterchangeNode {
    /// Entity id.
    pub id: String,
    /// Display name.
    pub label: String,
    /// Entity type string.
    #[serde(rename = "type")]
    pub node_type: String,
    /// How often the entity was mentioned.
    pub mention_count: u32,
}

/// An edge in the interchange form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterchangeEdge {
    /// Source entity id.
    pub source: String,
    /// Target entity id.
    pub target: String,
    /// Relation type string.
    #[serde(rename = "type")]
    pub edge_type: String,
    /// Bond strength, 0.0 to 1.0.
    pub strength: f32,
    /// Emotional valence, -1.0 to 1.0.
    pub valence: f32,
}

impl InterchangeGraph {
    /// Flattens a graph into interchange nodes and edges.
    ///
    /// Output order is deterministic: nodes sorted by id, edges by
    /// (source, target, type).
    #[must_use]
    pub fn from_graph(graph: &KnowledgeGraph) -> Self {
        let mut nodes: Vec<InterchangeNode> = graph
            .entities()
            .map(|entity| InterchangeNode {
                id: entity.id.to_string(),
                label: entity.name.clone(),
                node_type: entity.entity_type.as_str().to_string(),
                mention_count: entity.mention_count,
            })
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));

        let mut edges: Vec<InterchangeEdge> = graph
            .relationships()
            .map(|rel| InterchangeEdge {
                source: rel.source_id.to_string(),
                target: rel.target_id.to_string(),
                edge_type: rel.relation_type.as_str().to_string(),
                strength: rel.strength,
                valence: rel.valence,
            })
            .collect();
        edges.sort_by(|a, b| {
            (&a.source, &a.target, &a.edge_type).cmp(&(&b.source, &b.target, &b.edge_type))
        });

        Self { nodes, edges }
    }
}

/// Renders a markdown summary of the graph, grouped by entity type.
///
/// Sections appear in the canonical type order; types with no entities
/// are omitted. Within a section, entities are ordered by mention count.
#[must_use]
pub fn markdown_summary(graph: &KnowledgeGraph) -> String {
    let metadata = graph.metadata();
    let mut out = String::new();

    out.push_str(&format!("# Knowledge Graph: {}\n\n", metadata.project_id));
    out.push_str(&format!(
        "{} entities, {} relationships across {} scenes.\n",
        metadata.entity_count, metadata.relationship_count, metadata.scene_count
    ));

    for entity_type in EntityType::all() {
        let mut members: Vec<&Entity> = graph
            .entities()
            .filter(|e| e.entity_type == *entity_type)
            .collect();
        if members.is_empty() {
            continue;
        }
        members.sort_by(|a, b| b.mention_count.cmp(&a.mention_count).then(a.id.cmp(&b.id)));

        out.push_str(&format!("\n## {}\n\n", plural_heading(*entity_type)));
        for entity in members {
            out.push_str(&format!("### {}\n\n", entity.name));
            if !entity.description.is_empty() {
                out.push_str(&format!("{}\n\n", entity.description));
            }
            if !entity.aliases.is_empty() {
                out.push_str(&format!("Also known as: {}\n\n", entity.aliases.join(", ")));
            }
            out.push_str(&format!(
                "Mentioned {} time(s).\n",
                entity.mention_count
            ));

            let outgoing: Vec<String> = graph
                .relationships()
                .filter(|rel| rel.source_id == entity.id)
                .map(|rel| {
                    let target = graph
                        .get_entity(&rel.target_id)
                        .map_or_else(|| rel.target_id.to_string(), |e| e.name.clone());
                    format!("- {} **{}** {}", entity.name, rel.relation_type, target)
                })
                .collect();
            if !outgoing.is_empty() {
                out.push('\n');
                for line in outgoing {
                    out.push_str(&line);
                    out.push('\n');
                }
            }
            out.push('\n');
        }
    }
    out
}

const fn plural_heading(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Character => "Characters",
        EntityType::Location => "Locations",
        EntityType::Object => "Objects",
        EntityType::Concept => "Concepts",
        EntityType::Event => "Events",
        EntityType::Organization => "Organizations",
        EntityType::Theme => "Themes",
    }
}
