//! In-memory knowledge graph for one project.
//!
//! The graph owns every entity and relationship for a project and keeps
//! its metadata counters consistent with each mutation. It is a plain
//! mutable structure, not internally synchronized: callers serialize
//! access behind the orchestrator's per-project lock.
//!
//! # Structure
//!
//! - Entities live in a map keyed by their deterministic id.
//! - Relationships form a directed multi-edge list: several relation
//!   types may connect the same ordered pair, but the same
//!   (source, target, type) triple merges instead of duplicating.
//! - A secondary index maps normalized names and aliases to entity ids
//!   for O(1) average lookup.

mod analytics;

pub use analytics::Community;

use crate::models::{
    Entity, EntityId, EntityPatch, EntityQuery, RelationType, Relationship, RelationshipQuery,
    normalize_name,
};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Counters and bookkeeping persisted alongside the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    /// Owning project.
    pub project_id: String,
    /// Number of entities.
    pub entity_count: usize,
    /// Number of relationships.
    pub relationship_count: usize,
    /// Number of distinct scenes referenced by entity appearances.
    pub scene_count: usize,
    /// Extraction attempts recorded against this graph.
    pub total_extractions: u64,
    /// Extractions that merged successfully.
    pub successful_extractions: u64,
    /// Extractions that failed.
    pub failed_extractions: u64,
    /// Last mutation timestamp.
    pub last_updated: DateTime<Utc>,
}

/// Whether an upsert created a new record or merged into an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// A new record was inserted.
    Created,
    /// An existing record absorbed the incoming one.
    Merged,
}

/// The in-memory knowledge graph for a single project.
#[derive(Debug, Clone)]
pub struct KnowledgeGraph {
    metadata: GraphMetadata,
    entities: HashMap<EntityId, Entity>,
    relationships: Vec<Relationship>,
    /// Normalized name/alias -> entity id.
    name_index: HashMap<String, EntityId>,
    scenes: BTreeSet<String>,
}

impl KnowledgeGraph {
    /// Creates an empty graph for a project.
    #[must_use]
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            metadata: GraphMetadata {
                project_id: project_id.into(),
                entity_count: 0,
                relationship_count: 0,
                scene_count: 0,
                total_extractions: 0,
                successful_extractions: 0,
                failed_extractions: 0,
                last_updated: Utc::now(),
            },
            entities: HashMap::new(),
            relationships: Vec::new(),
            name_index: HashMap::new(),
            scenes: BTreeSet::new(),
        }
    }

    /// Rebuilds a graph from its parts (used by the persistence adapter).
    pub(crate) fn from_parts(
        metadata: GraphMetadata,
        entities: HashMap<EntityId, Entity>,
        relationships: Vec<Relationship>,
    ) -> Self {
        let mut graph = Self {
            metadata,
            entities,
            relationships,
            name_index: HashMap::new(),
            scenes: BTreeSet::new(),
        };
        let index_entries: Vec<(String, EntityId)> = graph
            .entities
            .values()
            .flat_map(|e| {
                std::iter::once((normalize_name(&e.name), e.id.clone())).chain(
                    e.aliases
                        .iter()
                        .map(|a| (normalize_name(a), e.id.clone())),
                )
            })
            .collect();
        graph.name_index.extend(index_entries);
        graph.refresh_counts();
        graph
    }

    /// Returns the owning project id.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.metadata.project_id
    }

    /// Returns the graph metadata.
    #[must_use]
    pub const fn metadata(&self) -> &GraphMetadata {
        &self.metadata
    }

    /// Returns the number of entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Returns the number of relationships.
    #[must_use]
    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    /// Iterates over all entities in unspecified order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Iterates over all relationships.
    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.iter()
    }

    // =========================================================================
    // Entity operations
    // =========================================================================

    /// Adds an entity, merging if the id already exists.
    ///
    /// Merge policy:
    /// - attributes overwrite per key (last write wins)
    /// - aliases union, case-insensitive
    /// - appearances append de-duplicated; `mention_count` increments only
    ///   for newly appended scenes
    /// - confidence takes the maximum of both records
    /// - a non-empty incoming description replaces the stored one
    pub fn add_entity(&mut self, incoming: Entity) -> (EntityId, Upsert) {
        let id = incoming.id.clone();
        let outcome = if let Some(existing) = self.entities.get_mut(&id) {
            Self::merge_entity(existing, incoming);
            Upsert::Merged
        } else {
            self.entities.insert(id.clone(), incoming);
            Upsert::Created
        };

        // Index may gain new aliases either way.
        if let Some(entity) = self.entities.get(&id) {
            let entries: Vec<(String, EntityId)> =
                std::iter::once((normalize_name(&entity.name), id.clone()))
                    .chain(entity.aliases.iter().map(|a| (normalize_name(a), id.clone())))
                    .collect();
            self.name_index.extend(entries);
        }
        self.refresh_counts();
        (id, outcome)
    }

    fn merge_entity(existing: &mut Entity, incoming: Entity) {
        for (key, value) in incoming.attributes {
            existing.attributes.insert(key, value);
        }

        let known: HashSet<String> = existing
            .aliases
            .iter()
            .map(|a| normalize_name(a))
            .chain(std::iter::once(normalize_name(&existing.name)))
            .collect();
        for alias in incoming.aliases {
            if !known.contains(&normalize_name(&alias)) {
                existing.aliases.push(alias);
            }
        }

        for scene in &incoming.appearances {
            existing.record_appearance(scene);
        }

        if incoming.confidence > existing.confidence {
            existing.confidence = incoming.confidence;
        }
        if !incoming.description.is_empty() {
            existing.description = incoming.description;
        }
        existing.verified = existing.verified || incoming.verified;
        existing.updated_at = Utc::now();
    }

    /// Retrieves an entity by id.
    #[must_use]
    pub fn get_entity(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Finds entities by name.
    ///
    /// Exact lookup resolves through the normalized name/alias index in
    /// O(1) average. With `fuzzy`, falls back to character-bigram Jaccard
    /// similarity over all names, best matches first.
    #[must_use]
    pub fn find_by_name(&self, name: &str, fuzzy: bool) -> Vec<&Entity> {
        let normalized = normalize_name(name);
        if let Some(id) = self.name_index.get(&normalized) {
            if let Some(entity) = self.entities.get(id) {
                return vec![entity];
            }
        }
        if !fuzzy {
            // The index is the fast path; the scan keeps alias lookups
            // honest even when an index entry is missing or stale.
            return self
                .entities
                .values()
                .filter(|entity| entity.matches_name(name))
                .collect();
        }

        let mut scored: Vec<(f32, &Entity)> = self
            .entities
            .values()
            .filter_map(|entity| {
                let score = name_similarity(name, &entity.name);
                (score >= FUZZY_MATCH_THRESHOLD).then_some((score, entity))
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().map(|(_, entity)| entity).collect()
    }

    /// Queries entities matching all filters.
    #[must_use]
    pub fn query_entities(&self, query: &EntityQuery) -> Vec<&Entity> {
        let mut matches: Vec<&Entity> = self
            .entities
            .values()
            .filter(|entity| query.matches(entity))
            .collect();
        matches.sort_by(|a, b| b.mention_count.cmp(&a.mention_count).then(a.id.cmp(&b.id)));
        matches
    }

    /// Applies a partial update to an entity.
    ///
    /// The entity id never changes, even on rename; the new name is added
    /// to the lookup index alongside the old one.
    pub fn update_entity(&mut self, id: &EntityId, patch: &EntityPatch) -> Result<&Entity> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("entity '{id}'")))?;

        if let Some(name) = &patch.name {
            entity.name.clone_from(name);
        }
        if let Some(entity_type) = patch.entity_type {
            entity.entity_type = entity_type;
        }
        if let Some(description) = &patch.description {
            entity.description.clone_from(description);
        }
        if let Some(aliases) = &patch.aliases {
            let known: HashSet<String> = entity
                .aliases
                .iter()
                .map(|a| normalize_name(a))
                .chain(std::iter::once(normalize_name(&entity.name)))
                .collect();
            for alias in aliases {
                if !known.contains(&normalize_name(alias)) {
                    entity.aliases.push(alias.clone());
                }
            }
        }
        if let Some(attributes) = &patch.attributes {
            for (key, value) in attributes {
                entity.attributes.insert(key.clone(), value.clone());
            }
        }
        if let Some(confidence) = patch.confidence {
            entity.confidence = confidence.clamp(0.0, 1.0);
        }
        if let Some(verified) = patch.verified {
            entity.verified = verified;
        }
        entity.updated_at = Utc::now();

        let name_entry = (normalize_name(&entity.name), id.clone());
        let alias_entries: Vec<(String, EntityId)> = entity
            .aliases
            .iter()
            .map(|a| (normalize_name(a), id.clone()))
            .collect();
        self.name_index.insert(name_entry.0, name_entry.1);
        self.name_index.extend(alias_entries);
        self.refresh_counts();

        self.entities
            .get(id)
            .ok_or_else(|| Error::NotFound(format!("entity '{id}'")))
    }

    /// Deletes an entity, cascading every relationship that references it.
    ///
    /// Returns the number of relationships removed by the cascade.
    pub fn delete_entity(&mut self, id: &EntityId) -> Result<usize> {
        if self.entities.remove(id).is_none() {
            return Err(Error::NotFound(format!("entity '{id}'")));
        }

        let before = self.relationships.len();
        self.relationships
            .retain(|rel| rel.source_id != *id && rel.target_id != *id);
        let cascaded = before - self.relationships.len();

        self.name_index.retain(|_, indexed| indexed != id);
        self.refresh_counts();
        Ok(cascaded)
    }

    // =========================================================================
    // Relationship operations
    // =========================================================================

    /// Adds a relationship between two existing entities.
    ///
    /// Fails with [`Error::NotFound`] and performs no mutation when either
    /// endpoint is absent from the graph. Re-adding the same
    /// (source, target, type) triple merges context, scenes, and
    /// attributes into the existing edge.
    pub fn add_relationship(&mut self, incoming: Relationship) -> Result<Upsert> {
        if !self.entities.contains_key(&incoming.source_id) {
            return Err(Error::NotFound(format!(
                "relationship source entity '{}'",
                incoming.source_id
            )));
        }
        if !self.entities.contains_key(&incoming.target_id) {
            return Err(Error::NotFound(format!(
                "relationship target entity '{}'",
                incoming.target_id
            )));
        }

        let outcome = if let Some(existing) = self
            .relationships
            .iter_mut()
            .find(|rel| rel.identity() == incoming.identity())
        {
            Self::merge_relationship(existing, incoming);
            Upsert::Merged
        } else {
            self.relationships.push(incoming);
            Upsert::Created
        };
        self.refresh_counts();
        Ok(outcome)
    }

    fn merge_relationship(existing: &mut Relationship, incoming: Relationship) {
        for snippet in incoming.context {
            if !existing.context.contains(&snippet) {
                existing.context.push(snippet);
            }
        }
        for scene in &incoming.scenes {
            existing.record_scene(scene);
        }
        for (key, value) in incoming.attributes {
            existing.attributes.insert(key, value);
        }
        if !incoming.description.is_empty() {
            existing.description = incoming.description;
        }
        if incoming.confidence > existing.confidence {
            existing.confidence = incoming.confidence;
        }
        // Evidence accumulates: keep the stronger reading of the bond.
        if incoming.strength > existing.strength {
            existing.strength = incoming.strength;
        }
        existing.valence = incoming.valence;
        existing.verified = existing.verified || incoming.verified;
        existing.updated_at = Utc::now();
    }

    /// Queries relationships by source, target, and/or type.
    #[must_use]
    pub fn get_relationships(&self, query: &RelationshipQuery) -> Vec<&Relationship> {
        self.relationships
            .iter()
            .filter(|rel| query.matches(rel))
            .collect()
    }

    /// Deletes relationships matching the query. Returns how many were removed.
    pub fn delete_relationships(&mut self, query: &RelationshipQuery) -> usize {
        let before = self.relationships.len();
        self.relationships.retain(|rel| !query.matches(rel));
        let removed = before - self.relationships.len();
        if removed > 0 {
            self.refresh_counts();
        }
        removed
    }

    // =========================================================================
    // Traversal
    // =========================================================================

    /// Returns entities reachable from `origin` within `max_depth` hops,
    /// excluding the origin itself.
    ///
    /// Edges are treated as undirected for reachability; an optional
    /// relation-type filter restricts which edges are traversed.
    pub fn connected_entities(
        &self,
        origin: &EntityId,
        max_depth: u32,
        relation_filter: Option<RelationType>,
    ) -> Result<Vec<&Entity>> {
        if !self.entities.contains_key(origin) {
            return Err(Error::NotFound(format!("entity '{origin}'")));
        }

        let adjacency = self.adjacency(relation_filter);
        let mut visited: HashSet<&EntityId> = HashSet::from([origin]);
        let mut queue: VecDeque<(&EntityId, u32)> = VecDeque::from([(origin, 0)]);
        let mut found: Vec<&Entity> = Vec::new();

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            if let Some(neighbors) = adjacency.get(current) {
                for &neighbor in neighbors {
                    if visited.insert(neighbor) {
                        if let Some(entity) = self.entities.get(neighbor) {
                            found.push(entity);
                        }
                        queue.push_back((neighbor, depth + 1));
                    }
                }
            }
        }
        Ok(found)
    }

    /// Finds an unweighted shortest path between two entities.
    ///
    /// Returns `None` when either endpoint is missing or no path exists.
    /// A returned path starts at `from`, ends at `to`, and every
    /// consecutive pair is connected by an edge.
    #[must_use]
    pub fn find_path(&self, from: &EntityId, to: &EntityId) -> Option<Vec<EntityId>> {
        if !self.entities.contains_key(from) || !self.entities.contains_key(to) {
            return None;
        }
        if from == to {
            return Some(vec![from.clone()]);
        }

        let adjacency = self.adjacency(None);
        let mut predecessors: HashMap<&EntityId, &EntityId> = HashMap::new();
        let mut visited: HashSet<&EntityId> = HashSet::from([from]);
        let mut queue: VecDeque<&EntityId> = VecDeque::from([from]);

        while let Some(current) = queue.pop_front() {
            if let Some(neighbors) = adjacency.get(current) {
                for &neighbor in neighbors {
                    if visited.insert(neighbor) {
                        predecessors.insert(neighbor, current);
                        if neighbor == to {
                            return Some(Self::rebuild_path(&predecessors, from, to));
                        }
                        queue.push_back(neighbor);
                    }
                }
            }
        }
        None
    }

    fn rebuild_path(
        predecessors: &HashMap<&EntityId, &EntityId>,
        from: &EntityId,
        to: &EntityId,
    ) -> Vec<EntityId> {
        let mut path = vec![to.clone()];
        let mut current = to;
        while current != from {
            match predecessors.get(current) {
                Some(&prev) => {
                    path.push(prev.clone());
                    current = prev;
                },
                None => break,
            }
        }
        path.reverse();
        path
    }

    /// Undirected adjacency over current relationships.
    pub(crate) fn adjacency(
        &self,
        relation_filter: Option<RelationType>,
    ) -> HashMap<&EntityId, Vec<&EntityId>> {
        let mut adjacency: HashMap<&EntityId, Vec<&EntityId>> = HashMap::new();
        for rel in &self.relationships {
            if let Some(filter) = relation_filter {
                if rel.relation_type != filter {
                    continue;
                }
            }
            adjacency.entry(&rel.source_id).or_default().push(&rel.target_id);
            adjacency.entry(&rel.target_id).or_default().push(&rel.source_id);
        }
        adjacency
    }

    // =========================================================================
    // Extraction bookkeeping
    // =========================================================================

    /// Records an extraction attempt against this graph.
    pub fn record_extraction(&mut self, succeeded: bool) {
        self.metadata.total_extractions += 1;
        if succeeded {
            self.metadata.successful_extractions += 1;
        } else {
            self.metadata.failed_extractions += 1;
        }
        self.metadata.last_updated = Utc::now();
    }

    /// Recomputes metadata counters. Called by every mutation so counts
    /// never drift from the actual structures.
    fn refresh_counts(&mut self) {
        // Rebuilt, not accreted: deleting the last entity seen in a scene
        // must drop that scene from the count.
        self.scenes = self
            .entities
            .values()
            .flat_map(|entity| entity.appearances.iter().cloned())
            .collect();
        self.metadata.entity_count = self.entities.len();
        self.metadata.relationship_count = self.relationships.len();
        self.metadata.scene_count = self.scenes.len();
        self.metadata.last_updated = Utc::now();
    }
}

const FUZZY_MATCH_THRESHOLD: f32 = 0.4;

/// Name similarity via Jaccard index on character bigrams.
#[allow(clippy::cast_precision_loss)]
fn name_similarity(a: &str, b: &str) -> f32 {
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();

    if a_lower == b_lower {
        return 1.0;
    }

    let a_bigrams: HashSet<(char, char)> = a_lower
        .chars()
        .collect::<Vec<_>>()
        .windows(2)
        .map(|w| (w[0], w[1]))
        .collect();
    let b_bigrams: HashSet<(char, char)> = b_lower
        .chars()
        .collect::<Vec<_>>()
        .windows(2)
        .map(|w| (w[0], w[1]))
        .collect();

    if a_bigrams.is_empty() || b_bigrams.is_empty() {
        return 0.0;
    }

    let intersection = a_bigrams.intersection(&b_bigrams).count();
    let union = a_bigrams.union(&b_bigrams).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityType;

    fn character(name: &str) -> Entity {
        Entity::new(name, EntityType::Character)
    }

    fn graph_with(names: &[&str]) -> KnowledgeGraph {
        let mut graph = KnowledgeGraph::new("test-project");
        for name in names {
            graph.add_entity(character(name));
        }
        graph
    }

    fn relate(graph: &mut KnowledgeGraph, from: &str, to: &str, rel: RelationType) {
        graph
            .add_relationship(Relationship::new(
                EntityId::from_name(from),
                EntityId::from_name(to),
                rel,
            ))
            .expect("both endpoints exist");
    }

    #[test]
    fn test_add_and_get_entity() {
        let mut graph = KnowledgeGraph::new("p");
        let (id, outcome) = graph.add_entity(character("Mickey"));

        assert_eq!(outcome, Upsert::Created);
        let entity = graph.get_entity(&id).expect("stored");
        assert_eq!(entity.name, "Mickey");
        assert_eq!(entity.entity_type, EntityType::Character);
        assert_eq!(graph.metadata().entity_count, 1);
    }

    #[test]
    fn test_readd_merges_not_duplicates() {
        let mut graph = KnowledgeGraph::new("p");
        graph.add_entity(
            character("Mickey")
                .with_attribute("mood", serde_json::json!("wary"))
                .with_appearance("scene-1"),
        );
        let (_, outcome) = graph.add_entity(
            character("Mickey")
                .with_alias("the kid")
                .with_attribute("mood", serde_json::json!("angry"))
                .with_appearance("scene-2"),
        );

        assert_eq!(outcome, Upsert::Merged);
        assert_eq!(graph.metadata().entity_count, 1);

        let entity = graph.get_entity(&EntityId::from_name("Mickey")).expect("merged");
        assert_eq!(entity.attributes.get("mood"), Some(&serde_json::json!("angry")));
        assert!(entity.aliases.contains(&"the kid".to_string()));
        assert_eq!(entity.mention_count, 2);
        assert_eq!(entity.appearances, vec!["scene-1", "scene-2"]);
    }

    #[test]
    fn test_mention_count_idempotent_on_same_scene() {
        let mut graph = KnowledgeGraph::new("p");
        graph.add_entity(character("Mickey").with_appearance("scene-1"));
        graph.add_entity(character("Mickey").with_appearance("scene-1"));

        let entity = graph.get_entity(&EntityId::from_name("Mickey")).expect("entity");
        assert_eq!(entity.mention_count, 1);
    }

    #[test]
    fn test_find_by_name_exact_and_alias() {
        let mut graph = KnowledgeGraph::new("p");
        graph.add_entity(character("Sarah Voss").with_alias("The Controller"));

        assert_eq!(graph.find_by_name("sarah voss", false).len(), 1);
        assert_eq!(graph.find_by_name("The Controller", false).len(), 1);
        assert!(graph.find_by_name("Unknown", false).is_empty());
    }

    #[test]
    fn test_find_by_name_fuzzy() {
        let graph = graph_with(&["Alistair", "Bronwyn"]);

        let hits = graph.find_by_name("Alistar", true);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].name, "Alistair");
        assert!(graph.find_by_name("Zzz", true).is_empty());
    }

    #[test]
    fn test_add_relationship_missing_endpoint() {
        let mut graph = graph_with(&["Mickey"]);
        let result = graph.add_relationship(Relationship::new(
            EntityId::from_name("Mickey"),
            EntityId::from_name("Sarah"),
            RelationType::Knows,
        ));

        assert!(matches!(result, Err(Error::NotFound(_))));
        // No mutation happened.
        assert_eq!(graph.metadata().relationship_count, 0);
    }

    #[test]
    fn test_relationship_multi_edge_and_merge() {
        let mut graph = graph_with(&["Mickey", "Sarah"]);
        relate(&mut graph, "Mickey", "Sarah", RelationType::Knows);
        relate(&mut graph, "Mickey", "Sarah", RelationType::ConflictsWith);
        assert_eq!(graph.metadata().relationship_count, 2);

        // Same triple merges instead of duplicating.
        relate(&mut graph, "Mickey", "Sarah", RelationType::Knows);
        assert_eq!(graph.metadata().relationship_count, 2);
    }

    #[test]
    fn test_delete_entity_cascades() {
        let mut graph = graph_with(&["Mickey", "Sarah", "Warehouse"]);
        relate(&mut graph, "Mickey", "Sarah", RelationType::Knows);
        relate(&mut graph, "Sarah", "Warehouse", RelationType::Owns);

        let cascaded = graph.delete_entity(&EntityId::from_name("Sarah")).expect("delete");
        assert_eq!(cascaded, 2);
        assert_eq!(graph.metadata().entity_count, 2);
        assert_eq!(graph.metadata().relationship_count, 0);
        assert!(graph.find_by_name("Sarah", false).is_empty());
    }

    #[test]
    fn test_delete_entity_drops_orphaned_scenes() {
        let mut graph = KnowledgeGraph::new("p");
        graph.add_entity(character("Mickey").with_appearance("scene-1"));
        graph.add_entity(character("Sarah").with_appearance("scene-2"));
        assert_eq!(graph.metadata().scene_count, 2);

        graph
            .delete_entity(&EntityId::from_name("Sarah"))
            .expect("delete");
        // scene-2 had no other witness.
        assert_eq!(graph.metadata().scene_count, 1);

        // A scene shared with a surviving entity stays counted.
        graph.add_entity(character("Warehouse").with_appearance("scene-1"));
        graph
            .delete_entity(&EntityId::from_name("Warehouse"))
            .expect("delete");
        assert_eq!(graph.metadata().scene_count, 1);
    }

    #[test]
    fn test_delete_missing_entity() {
        let mut graph = KnowledgeGraph::new("p");
        assert!(matches!(
            graph.delete_entity(&EntityId::from_name("ghost")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_update_entity_patch() {
        let mut graph = graph_with(&["Mickey"]);
        let id = EntityId::from_name("Mickey");

        let patch = EntityPatch {
            description: Some("A wary smuggler".to_string()),
            verified: Some(true),
            confidence: Some(2.0),
            ..EntityPatch::default()
        };
        let entity = graph.update_entity(&id, &patch).expect("update");

        assert_eq!(entity.description, "A wary smuggler");
        assert!(entity.verified);
        assert!((entity.confidence - 1.0).abs() < f32::EPSILON);

        assert!(matches!(
            graph.update_entity(&EntityId::from_name("ghost"), &EntityPatch::default()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_query_entities_filters() {
        let mut graph = KnowledgeGraph::new("p");
        graph.add_entity(character("Mickey").with_appearance("s1").with_appearance("s2"));
        graph.add_entity(Entity::new("Warehouse", EntityType::Location).with_appearance("s1"));

        let locations = graph.query_entities(&EntityQuery::new().with_type(EntityType::Location));
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].name, "Warehouse");

        let frequent = graph.query_entities(&EntityQuery::new().with_min_mentions(2));
        assert_eq!(frequent.len(), 1);
        assert_eq!(frequent[0].name, "Mickey");
    }

    #[test]
    fn test_connected_entities_depth_one() {
        let mut graph = graph_with(&["A", "B", "C", "D"]);
        relate(&mut graph, "A", "B", RelationType::Knows);
        relate(&mut graph, "B", "C", RelationType::Knows);
        relate(&mut graph, "C", "D", RelationType::Knows);

        let depth1 = graph
            .connected_entities(&EntityId::from_name("A"), 1, None)
            .expect("origin exists");
        assert_eq!(depth1.len(), 1);
        assert_eq!(depth1[0].name, "B");

        let depth2 = graph
            .connected_entities(&EntityId::from_name("A"), 2, None)
            .expect("origin exists");
        assert_eq!(depth2.len(), 2);
    }

    #[test]
    fn test_connected_entities_respects_filter() {
        let mut graph = graph_with(&["A", "B", "C"]);
        relate(&mut graph, "A", "B", RelationType::Knows);
        relate(&mut graph, "A", "C", RelationType::Owns);

        let known = graph
            .connected_entities(&EntityId::from_name("A"), 1, Some(RelationType::Knows))
            .expect("origin exists");
        assert_eq!(known.len(), 1);
        assert_eq!(known[0].name, "B");
    }

    #[test]
    fn test_connected_entities_missing_origin() {
        let graph = KnowledgeGraph::new("p");
        assert!(matches!(
            graph.connected_entities(&EntityId::from_name("ghost"), 1, None),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_find_path() {
        let mut graph = graph_with(&["A", "B", "C", "D"]);
        relate(&mut graph, "A", "B", RelationType::Knows);
        relate(&mut graph, "B", "C", RelationType::Knows);

        let path = graph
            .find_path(&EntityId::from_name("A"), &EntityId::from_name("C"))
            .expect("path exists");
        assert_eq!(path.len(), 3);
        assert_eq!(path[0], EntityId::from_name("A"));
        assert_eq!(path[2], EntityId::from_name("C"));

        // D is disconnected.
        assert!(
            graph
                .find_path(&EntityId::from_name("A"), &EntityId::from_name("D"))
                .is_none()
        );
    }

    #[test]
    fn test_find_path_follows_reverse_edges() {
        let mut graph = graph_with(&["A", "B"]);
        relate(&mut graph, "B", "A", RelationType::Knows);

        let path = graph
            .find_path(&EntityId::from_name("A"), &EntityId::from_name("B"))
            .expect("undirected reachability");
        assert_eq!(path.len(), 2);
    }

    #[test]
    fn test_scene_count_tracks_distinct_scenes() {
        let mut graph = KnowledgeGraph::new("p");
        graph.add_entity(character("Mickey").with_appearance("s1").with_appearance("s2"));
        graph.add_entity(character("Sarah").with_appearance("s2"));

        assert_eq!(graph.metadata().scene_count, 2);
    }

    #[test]
    fn test_extraction_counters() {
        let mut graph = KnowledgeGraph::new("p");
        graph.record_extraction(true);
        graph.record_extraction(true);
        graph.record_extraction(false);

        assert_eq!(graph.metadata().total_extractions, 3);
        assert_eq!(graph.metadata().successful_extractions, 2);
        assert_eq!(graph.metadata().failed_extractions, 1);
    }

    #[test]
    fn test_name_similarity() {
        assert!((name_similarity("Alice", "alice") - 1.0).abs() < f32::EPSILON);
        assert!(name_similarity("Alistair", "Alistar") > 0.5);
        assert!(name_similarity("Alice", "Bob") < 0.2);
    }
}
