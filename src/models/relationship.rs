// Allow non-const functions that use f32::clamp (not const-stable yet)
#![allow(clippy::missing_const_for_fn)]

//! Relationship types for the narrative knowledge graph.
//!
//! A relationship is a typed, directed, evidenced connection between two
//! entities. The relation vocabulary is a closed set of twenty values
//! spanning five categories:
//!
//! | Category | Relations |
//! |----------|-----------|
//! | social | `knows`, `loves`, `hates`, `family_of`, `allied_with`, `conflicts_with`, `mentors`, `serves` |
//! | spatial | `located_in`, `contains`, `near`, `travels_to` |
//! | possession | `owns` |
//! | temporal | `precedes`, `follows` |
//! | causal | `causes`, `motivates`, `prevents` |
//! | conceptual | `symbolizes`, `related_to` |
//!
//! Unknown relation strings from an extractor parse to `RelatedTo` rather
//! than being rejected; a single odd label must not sink a scene.

use super::entity::EntityId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Category of a relation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationCategory {
    /// Interpersonal connections.
    Social,
    /// Physical placement and movement.
    Spatial,
    /// Ownership.
    Possession,
    /// Ordering in story time.
    Temporal,
    /// Cause and effect.
    Causal,
    /// Abstract or symbolic association.
    Conceptual,
}

/// Type of relationship between entities. Closed set of twenty values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    /// Acquaintance between characters.
    Knows,
    /// Romantic or deep affection.
    Loves,
    /// Animosity.
    Hates,
    /// Kinship.
    FamilyOf,
    /// Alliance or partnership.
    AlliedWith,
    /// Active opposition.
    ConflictsWith,
    /// Guidance or teaching.
    Mentors,
    /// Service or employment.
    Serves,
    /// Containment within a place.
    LocatedIn,
    /// A place or thing containing another.
    Contains,
    /// Physical proximity.
    Near,
    /// Movement toward a place.
    TravelsTo,
    /// Possession of an object or place.
    Owns,
    /// Temporal ordering: source happens before target.
    Precedes,
    /// Temporal ordering: source happens after target.
    Follows,
    /// Source brings about target.
    Causes,
    /// Source drives target's actions.
    Motivates,
    /// Source stops target from happening.
    Prevents,
    /// Symbolic representation.
    Symbolizes,
    /// General association.
    RelatedTo,
}

impl RelationType {
    /// Returns all relation type variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Knows,
            Self::Loves,
            Self::Hates,
            Self::FamilyOf,
            Self::AlliedWith,
            Self::ConflictsWith,
            Self::Mentors,
            Self::Serves,
            Self::LocatedIn,
            Self::Contains,
            Self::Near,
            Self::TravelsTo,
            Self::Owns,
            Self::Precedes,
            Self::Follows,
            Self::Causes,
            Self::Motivates,
            Self::Prevents,
            Self::Symbolizes,
            Self::RelatedTo,
        ]
    }

    /// Returns the relation type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Knows => "knows",
            Self::Loves => "loves",
            Self::Hates => "hates",
            Self::FamilyOf => "family_of",
            Self::AlliedWith => "allied_with",
            Self::ConflictsWith => "conflicts_with",
            Self::Mentors => "mentors",
            Self::Serves => "serves",
            Self::LocatedIn => "located_in",
            Self::Contains => "contains",
            Self::Near => "near",
            Self::TravelsTo => "travels_to",
            Self::Owns => "owns",
            Self::Precedes => "precedes",
            Self::Follows => "follows",
            Self::Causes => "causes",
            Self::Motivates => "motivates",
            Self::Prevents => "prevents",
            Self::Symbolizes => "symbolizes",
            Self::RelatedTo => "related_to",
        }
    }

    /// Returns the category this relation belongs to.
    #[must_use]
    pub const fn category(&self) -> RelationCategory {
        match self {
            Self::Knows
            | Self::Loves
            | Self::Hates
            | Self::FamilyOf
            | Self::AlliedWith
            | Self::ConflictsWith
            | Self::Mentors
            | Self::Serves => RelationCategory::Social,
            Self::LocatedIn | Self::Contains | Self::Near | Self::TravelsTo => {
                RelationCategory::Spatial
            },
            Self::Owns => RelationCategory::Possession,
            Self::Precedes | Self::Follows => RelationCategory::Temporal,
            Self::Causes | Self::Motivates | Self::Prevents => RelationCategory::Causal,
            Self::Symbolizes | Self::RelatedTo => RelationCategory::Conceptual,
        }
    }

    /// Parses a relation type from a string, accepting common synonyms.
    ///
    /// Unknown strings return `None`; extractor paths use
    /// [`Self::parse_lossy`] instead.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "knows" | "acquainted_with" | "met" => Some(Self::Knows),
            "loves" | "in_love_with" | "adores" => Some(Self::Loves),
            "hates" | "despises" | "loathes" => Some(Self::Hates),
            "family_of" | "related_by_blood" | "sibling_of" | "parent_of" | "child_of" => {
                Some(Self::FamilyOf)
            },
            "allied_with" | "allies_with" | "partners_with" => Some(Self::AlliedWith),
            "conflicts_with" | "opposes" | "fights" | "enemies_with" => Some(Self::ConflictsWith),
            "mentors" | "teaches" | "trains" => Some(Self::Mentors),
            "serves" | "works_for" | "employed_by" => Some(Self::Serves),
            "located_in" | "inside" | "within" => Some(Self::LocatedIn),
            "contains" | "houses" | "holds" => Some(Self::Contains),
            "near" | "close_to" | "adjacent_to" => Some(Self::Near),
            "travels_to" | "goes_to" | "journeys_to" => Some(Self::TravelsTo),
            "owns" | "possesses" | "controls" => Some(Self::Owns),
            "precedes" | "before" => Some(Self::Precedes),
            "follows" | "after" => Some(Self::Follows),
            "causes" | "leads_to" | "triggers" => Some(Self::Causes),
            "motivates" | "drives" | "inspires" => Some(Self::Motivates),
            "prevents" | "blocks" | "stops" => Some(Self::Prevents),
            "symbolizes" | "represents" | "embodies" => Some(Self::Symbolizes),
            "related_to" | "associated_with" | "connected_to" => Some(Self::RelatedTo),
            _ => None,
        }
    }

    /// Parses a relation type, mapping unknown strings to `RelatedTo`.
    #[must_use]
    pub fn parse_lossy(s: &str) -> Self {
        Self::parse(s).unwrap_or(Self::RelatedTo)
    }
}

impl fmt::Display for RelationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RelationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown relation type: {s}"))
    }
}

/// A typed, directed, evidenced relationship between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Source entity ID.
    pub source_id: EntityId,
    /// Target entity ID.
    pub target_id: EntityId,
    /// Type of relationship.
    pub relation_type: RelationType,
    /// Description of the connection.
    #[serde(default)]
    pub description: String,
    /// Evidentiary text snippets supporting this relationship.
    #[serde(default)]
    pub context: Vec<String>,
    /// Scenes in which the relationship is evidenced.
    #[serde(default)]
    pub scenes: Vec<String>,
    /// Strength of the connection (0.0 to 1.0).
    pub strength: f32,
    /// Emotional valence (-1.0 hostile to 1.0 positive).
    pub valence: f32,
    /// Open string-keyed attribute map.
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    /// Scene where the relationship begins, if known.
    #[serde(default)]
    pub start_scene: Option<String>,
    /// Scene where the relationship ends, if known.
    #[serde(default)]
    pub end_scene: Option<String>,
    /// Confidence score (0.0 to 1.0).
    pub confidence: f32,
    /// Whether a human has verified this relationship.
    #[serde(default)]
    pub verified: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Relationship {
    /// Creates a new relationship with neutral defaults.
    #[must_use]
    pub fn new(source_id: EntityId, target_id: EntityId, relation_type: RelationType) -> Self {
        let now = Utc::now();
        Self {
            source_id,
            target_id,
            relation_type,
            description: String::new(),
            context: Vec::new(),
            scenes: Vec::new(),
            strength: 0.5,
            valence: 0.0,
            attributes: HashMap::new(),
            start_scene: None,
            end_scene: None,
            confidence: 1.0,
            verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Adds an evidence snippet.
    #[must_use]
    pub fn with_context(mut self, snippet: impl Into<String>) -> Self {
        self.context.push(snippet.into());
        self
    }

    /// Sets the strength, clamped to [0, 1].
    #[must_use]
    pub fn with_strength(mut self, strength: f32) -> Self {
        self.strength = strength.clamp(0.0, 1.0);
        self
    }

    /// Sets the valence, clamped to [-1, 1].
    #[must_use]
    pub fn with_valence(mut self, valence: f32) -> Self {
        self.valence = valence.clamp(-1.0, 1.0);
        self
    }

    /// Sets the confidence, clamped to [0, 1].
    #[must_use]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Records the relationship as evidenced in a scene (de-duplicated).
    pub fn record_scene(&mut self, scene_id: &str) {
        if !self.scenes.iter().any(|s| s == scene_id) {
            if self.start_scene.is_none() {
                self.start_scene = Some(scene_id.to_string());
            }
            self.scenes.push(scene_id.to_string());
        }
    }

    /// Identity tuple for multi-edge comparison: (source, target, type).
    #[must_use]
    pub fn identity(&self) -> (&EntityId, &EntityId, RelationType) {
        (&self.source_id, &self.target_id, self.relation_type)
    }
}

/// Query parameters for filtering relationships.
#[derive(Debug, Clone, Default)]
pub struct RelationshipQuery {
    /// Filter by source entity.
    pub source_id: Option<EntityId>,
    /// Filter by target entity.
    pub target_id: Option<EntityId>,
    /// Filter by relation type.
    pub relation_type: Option<RelationType>,
}

impl RelationshipQuery {
    /// Creates a new empty query.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            source_id: None,
            target_id: None,
            relation_type: None,
        }
    }

    /// Filters by source entity.
    #[must_use]
    pub fn source(mut self, id: EntityId) -> Self {
        self.source_id = Some(id);
        self
    }

    /// Filters by target entity.
    #[must_use]
    pub fn target(mut self, id: EntityId) -> Self {
        self.target_id = Some(id);
        self
    }

    /// Filters by relation type.
    #[must_use]
    pub const fn with_type(mut self, relation_type: RelationType) -> Self {
        self.relation_type = Some(relation_type);
        self
    }

    /// Returns true if the relationship satisfies every filter.
    #[must_use]
    pub fn matches(&self, relationship: &Relationship) -> bool {
        if let Some(source) = &self.source_id {
            if relationship.source_id != *source {
                return false;
            }
        }
        if let Some(target) = &self.target_id {
            if relationship.target_id != *target {
                return false;
            }
        }
        if let Some(relation_type) = self.relation_type {
            if relationship.relation_type != relation_type {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_closed_set_size() {
        assert_eq!(RelationType::all().len(), 20);
    }

    #[test_case("knows", RelationType::Knows)]
    #[test_case("conflicts-with", RelationType::ConflictsWith)]
    #[test_case("WORKS_FOR", RelationType::Serves)]
    #[test_case("located_in", RelationType::LocatedIn)]
    #[test_case("leads_to", RelationType::Causes)]
    #[test_case("represents", RelationType::Symbolizes)]
    fn test_parse_synonyms(input: &str, expected: RelationType) {
        assert_eq!(RelationType::parse(input), Some(expected));
    }

    #[test]
    fn test_parse_lossy_defaults_to_related() {
        assert_eq!(RelationType::parse("entangled_with"), None);
        assert_eq!(RelationType::parse_lossy("entangled_with"), RelationType::RelatedTo);
    }

    #[test]
    fn test_categories() {
        assert_eq!(RelationType::Knows.category(), RelationCategory::Social);
        assert_eq!(RelationType::LocatedIn.category(), RelationCategory::Spatial);
        assert_eq!(RelationType::Owns.category(), RelationCategory::Possession);
        assert_eq!(RelationType::Precedes.category(), RelationCategory::Temporal);
        assert_eq!(RelationType::Causes.category(), RelationCategory::Causal);
        assert_eq!(RelationType::Symbolizes.category(), RelationCategory::Conceptual);
    }

    #[test]
    fn test_relationship_creation() {
        let rel = Relationship::new(
            EntityId::from_name("Mickey"),
            EntityId::from_name("Sarah"),
            RelationType::Knows,
        )
        .with_strength(0.8)
        .with_valence(-0.3)
        .with_context("He was looking for Sarah");

        assert_eq!(rel.source_id.as_str(), "mickey");
        assert_eq!(rel.target_id.as_str(), "sarah");
        assert_eq!(rel.strength, 0.8);
        assert_eq!(rel.valence, -0.3);
        assert_eq!(rel.context.len(), 1);
    }

    #[test]
    fn test_valence_clamping() {
        let rel = Relationship::new(
            EntityId::new("a"),
            EntityId::new("b"),
            RelationType::Hates,
        )
        .with_valence(-3.0);
        assert_eq!(rel.valence, -1.0);
    }

    #[test]
    fn test_record_scene_dedup() {
        let mut rel = Relationship::new(
            EntityId::new("a"),
            EntityId::new("b"),
            RelationType::Knows,
        );
        rel.record_scene("scene-1");
        rel.record_scene("scene-1");
        rel.record_scene("scene-2");

        assert_eq!(rel.scenes, vec!["scene-1", "scene-2"]);
        assert_eq!(rel.start_scene.as_deref(), Some("scene-1"));
    }

    #[test]
    fn test_query_matches() {
        let rel = Relationship::new(
            EntityId::new("mickey"),
            EntityId::new("sarah"),
            RelationType::Knows,
        );

        assert!(RelationshipQuery::new().matches(&rel));
        assert!(RelationshipQuery::new().source(EntityId::new("mickey")).matches(&rel));
        assert!(!RelationshipQuery::new().source(EntityId::new("sarah")).matches(&rel));
        assert!(RelationshipQuery::new().with_type(RelationType::Knows).matches(&rel));
        assert!(!RelationshipQuery::new().with_type(RelationType::Owns).matches(&rel));
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&RelationType::ConflictsWith).expect("serialize");
        assert_eq!(json, "\"conflicts_with\"");
    }
}
