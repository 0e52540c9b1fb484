//! Scene extraction pipeline.
//!
//! An extractor turns raw scene text into a [`SceneExtraction`]: candidate
//! entities and relationships plus token accounting. Three strategies are
//! available:
//!
//! - [`SemanticExtractor`]: two model passes (entities, then
//!   relationships), highest quality, costs tokens
//! - [`PatternExtractor`]: local heuristics over capitalization and
//!   narrative cues, free, entities only
//! - hybrid: both, de-duplicated, preferring the semantic reading
//!
//! Extractors degrade rather than fail: a scene whose model output cannot
//! be parsed yields an empty extraction with a warning, so one bad scene
//! never aborts a batch.

mod pattern;
mod semantic;

pub use pattern::PatternExtractor;
pub use semantic::SemanticExtractor;

use crate::models::{
    Entity, EntityType, RelationType, Relationship, TokenUsage, normalize_name,
};
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// Available extraction strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStrategy {
    /// LLM-backed two-pass extraction.
    Semantic,
    /// Local heuristic extraction, no model calls.
    Pattern,
    /// Pattern plus semantic, merged.
    Hybrid,
}

impl ExtractionStrategy {
    /// All strategies.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Semantic, Self::Pattern, Self::Hybrid]
    }

    /// Canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Pattern => "pattern",
            Self::Hybrid => "hybrid",
        }
    }

    /// True when the strategy spends provider tokens and therefore
    /// participates in the batch cost gate.
    #[must_use]
    pub const fn is_paid(&self) -> bool {
        matches!(self, Self::Semantic | Self::Hybrid)
    }
}

impl std::fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ExtractionStrategy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "semantic" | "llm" => Ok(Self::Semantic),
            "pattern" | "local" => Ok(Self::Pattern),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(crate::Error::Validation(format!(
                "unknown extraction strategy '{other}'"
            ))),
        }
    }
}

/// A candidate entity produced by an extractor.
///
/// Types and relations arrive as free text from the model and are
/// resolved leniently: an unrecognized entity type falls back to
/// `concept`, an unrecognized relation to `related_to`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    /// Display name as it appeared in the scene.
    pub name: String,
    /// Entity type label.
    #[serde(rename = "type", default)]
    pub entity_type: String,
    /// Short description.
    #[serde(default)]
    pub description: String,
    /// Alternate names seen in the scene.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Free-form attributes.
    #[serde(default)]
    pub attributes: std::collections::HashMap<String, serde_json::Value>,
    /// Extractor confidence, 0.0 to 1.0.
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

/// A candidate relationship produced by an extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedRelationship {
    /// Source entity name.
    pub source: String,
    /// Target entity name.
    pub target: String,
    /// Relation type label.
    #[serde(rename = "relation", default)]
    pub relation_type: String,
    /// Short description of the bond.
    #[serde(default)]
    pub description: String,
    /// Supporting text snippet from the scene.
    #[serde(default)]
    pub context: Option<String>,
    /// Bond strength, 0.0 to 1.0.
    #[serde(default = "default_strength")]
    pub strength: f32,
    /// Emotional valence, -1.0 to 1.0.
    #[serde(default)]
    pub valence: f32,
    /// Extractor confidence, 0.0 to 1.0.
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

const fn default_confidence() -> f32 {
    0.9
}

const fn default_strength() -> f32 {
    0.5
}

/// The result of extracting one scene.
#[derive(Debug, Clone, Default)]
pub struct SceneExtraction {
    /// Candidate entities.
    pub entities: Vec<ExtractedEntity>,
    /// Candidate relationships.
    pub relationships: Vec<ExtractedRelationship>,
    /// Token usage across all model passes (zero for local strategies).
    pub usage: TokenUsage,
    /// Model that produced the extraction, when one was used.
    pub model: Option<String>,
}

impl SceneExtraction {
    /// Converts extracted entities into graph entities stamped with the
    /// scene they were seen in.
    #[must_use]
    pub fn to_entities(&self, scene_id: &str) -> Vec<Entity> {
        self.entities
            .iter()
            .filter(|candidate| !normalize_name(&candidate.name).is_empty())
            .map(|candidate| {
                let entity_type = EntityType::parse(&candidate.entity_type)
                    .unwrap_or(EntityType::Concept);
                let mut entity = Entity::new(candidate.name.clone(), entity_type)
                    .with_description(candidate.description.clone())
                    .with_aliases(candidate.aliases.iter().cloned())
                    .with_confidence(candidate.confidence)
                    .with_appearance(scene_id);
                for (key, value) in &candidate.attributes {
                    entity = entity.with_attribute(key.clone(), value.clone());
                }
                entity
            })
            .collect()
    }

    /// Converts extracted relationships into graph relationships.
    ///
    /// Endpoints are resolved by deterministic name slugs, so they line
    /// up with the entities produced by [`Self::to_entities`].
    #[must_use]
    pub fn to_relationships(&self, scene_id: &str) -> Vec<Relationship> {
        self.relationships
            .iter()
            .filter(|candidate| {
                !normalize_name(&candidate.source).is_empty()
                    && !normalize_name(&candidate.target).is_empty()
            })
            .map(|candidate| {
                let mut relationship = Relationship::new(
                    crate::models::EntityId::from_name(&candidate.source),
                    crate::models::EntityId::from_name(&candidate.target),
                    RelationType::parse_lossy(&candidate.relation_type),
                )
                .with_description(candidate.description.clone())
                .with_strength(candidate.strength)
                .with_valence(candidate.valence)
                .with_confidence(candidate.confidence);
                if let Some(snippet) = &candidate.context {
                    relationship = relationship.with_context(snippet.clone());
                }
                relationship.record_scene(scene_id);
                relationship
            })
            .collect()
    }

    /// Merges another extraction into this one, de-duplicating entities
    /// by normalized name. Entities already present win; this is used by
    /// the hybrid strategy with the semantic pass merged first.
    pub fn absorb(&mut self, other: Self) {
        let known: HashSet<String> = self
            .entities
            .iter()
            .map(|e| normalize_name(&e.name))
            .collect();
        for entity in other.entities {
            if !known.contains(&normalize_name(&entity.name)) {
                self.entities.push(entity);
            }
        }
        self.relationships.extend(other.relationships);
        self.usage = self.usage.add(other.usage);
        if self.model.is_none() {
            self.model = other.model;
        }
    }
}

/// Trait for scene extractors.
#[async_trait]
pub trait SceneExtractor: Send + Sync {
    /// The strategy this extractor implements.
    fn strategy(&self) -> ExtractionStrategy;

    /// Extracts entities and relationships from one scene.
    ///
    /// `known` carries entities the project graph already holds, so
    /// model-backed extractors can resolve pronouns and partial names
    /// back to established characters. Local extractors may ignore it.
    ///
    /// # Errors
    ///
    /// Returns an error only for failures that must reach the caller
    /// (provider outages, timeouts). Unparseable model output degrades
    /// to an empty extraction.
    async fn extract(
        &self,
        scene_id: &str,
        text: &str,
        known: &[Entity],
    ) -> Result<SceneExtraction>;
}

/// Runs pattern and semantic extraction and merges the results.
///
/// The semantic reading wins name collisions; pattern-only finds are
/// appended. Relationships come from the semantic pass alone, since the
/// pattern extractor never proposes any.
pub struct HybridExtractor {
    semantic: SemanticExtractor,
    pattern: PatternExtractor,
}

impl HybridExtractor {
    /// Creates a hybrid extractor over the given provider.
    #[must_use]
    pub fn new(provider: Arc<dyn crate::llm::LlmProvider>) -> Self {
        Self {
            semantic: SemanticExtractor::new(provider),
            pattern: PatternExtractor::new(),
        }
    }

    /// Sets the confidence floor for the semantic pass.
    #[must_use]
    pub fn with_min_confidence(mut self, threshold: f32) -> Self {
        self.semantic = self.semantic.with_min_confidence(threshold);
        self
    }
}

#[async_trait]
impl SceneExtractor for HybridExtractor {
    fn strategy(&self) -> ExtractionStrategy {
        ExtractionStrategy::Hybrid
    }

    async fn extract(
        &self,
        scene_id: &str,
        text: &str,
        known: &[Entity],
    ) -> Result<SceneExtraction> {
        let mut merged = self.semantic.extract(scene_id, text, known).await?;
        let local = self.pattern.extract(scene_id, text, known).await?;
        merged.absorb(local);
        Ok(merged)
    }
}

/// Builds the extractor for a strategy with the given confidence floor.
#[must_use]
pub fn extractor_for(
    strategy: ExtractionStrategy,
    provider: Arc<dyn crate::llm::LlmProvider>,
    min_confidence: f32,
) -> Box<dyn SceneExtractor> {
    match strategy {
        ExtractionStrategy::Semantic => {
            Box::new(SemanticExtractor::new(provider).with_min_confidence(min_confidence))
        }
        ExtractionStrategy::Pattern => Box::new(PatternExtractor::new()),
        ExtractionStrategy::Hybrid => {
            Box::new(HybridExtractor::new(provider).with_min_confidence(min_confidence))
        }
    }
}

/// Rough token estimate for cost projection: one token per four
/// characters of scene text.
#[must_use]
pub const fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64).div_ceil(4)
}
