// Allow non-const functions that use f32::clamp (not const-stable yet)
#![allow(clippy::missing_const_for_fn)]

//! Entity types for the narrative knowledge graph.
//!
//! Entities are the named elements of a story tracked across scenes.
//!
//! # Entity Types
//!
//! | Type | Description | Examples |
//! |------|-------------|----------|
//! | `Character` | Named individuals | "Mickey", "the Countess" |
//! | `Location` | Places and settings | "the warehouse", "Vienna" |
//! | `Object` | Significant things | "the letter", "Excalibur" |
//! | `Concept` | Abstract ideas | "loyalty", "the prophecy" |
//! | `Event` | Named occurrences | "the siege", "the wedding" |
//! | `Organization` | Groups and factions | "the Guild", "Scotland Yard" |
//! | `Theme` | Recurring motifs | "betrayal", "redemption" |
//!
//! # Identity
//!
//! Entity ids are derived deterministically from the normalized name
//! (lowercased, punctuation stripped, whitespace collapsed to `_`), so a
//! character mentioned in scene 3 and scene 40 resolves to the same node.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Normalizes an entity name for identity derivation and index lookup.
///
/// Lowercases, strips non-alphanumeric characters (keeping word breaks),
/// and collapses whitespace runs to single underscores.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned.split_whitespace().collect::<Vec<_>>().join("_")
}

/// Unique identifier for a graph entity.
///
/// Stable across extractions: always derived from the normalized name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    /// Creates an entity ID from an already-normalized string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives the deterministic ID for an entity name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        Self(normalize_name(name))
    }

    /// Returns the entity ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Type of entity in the narrative knowledge graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    /// Named individual appearing in the story.
    Character,
    /// Place or setting.
    Location,
    /// Significant physical thing.
    Object,
    /// Abstract idea or notion.
    Concept,
    /// Named occurrence within the story.
    Event,
    /// Group, faction, or institution.
    Organization,
    /// Recurring motif or thematic thread.
    Theme,
}

impl EntityType {
    /// Returns all entity type variants.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Character,
            Self::Location,
            Self::Object,
            Self::Concept,
            Self::Event,
            Self::Organization,
            Self::Theme,
        ]
    }

    /// Returns the entity type as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Location => "location",
            Self::Object => "object",
            Self::Concept => "concept",
            Self::Event => "event",
            Self::Organization => "organization",
            Self::Theme => "theme",
        }
    }

    /// Parses an entity type from a string, accepting common synonyms.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "character" | "person" | "people" | "protagonist" => Some(Self::Character),
            "location" | "place" | "setting" => Some(Self::Location),
            "object" | "item" | "artifact" | "thing" => Some(Self::Object),
            "concept" | "idea" | "notion" => Some(Self::Concept),
            "event" | "occurrence" | "incident" => Some(Self::Event),
            "organization" | "org" | "group" | "faction" | "institution" => {
                Some(Self::Organization)
            },
            "theme" | "motif" => Some(Self::Theme),
            _ => None,
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown entity type: {s}"))
    }
}

/// An entity in the narrative knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Deterministic identifier derived from the normalized name.
    pub id: EntityId,
    /// Canonical name.
    pub name: String,
    /// Type of entity.
    pub entity_type: EntityType,
    /// Description accumulated from extractions or edits.
    #[serde(default)]
    pub description: String,
    /// Alternative names. Set semantics: case-insensitive union on merge.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Open string-keyed map of scalar or array values.
    ///
    /// A deliberate extensibility point: consumers must treat keys as
    /// optional and values as untyped.
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    /// Scene in which the entity first appeared.
    #[serde(default)]
    pub first_appearance: Option<String>,
    /// Ordered, de-duplicated scene references.
    #[serde(default)]
    pub appearances: Vec<String>,
    /// Number of distinct scene mentions. Monotonic.
    #[serde(default)]
    pub mention_count: u32,
    /// Confidence score from extraction (0.0 to 1.0).
    pub confidence: f32,
    /// Whether a human has verified this entity.
    #[serde(default)]
    pub verified: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Creates a new entity. The id is derived from the name.
    #[must_use]
    pub fn new(name: impl Into<String>, entity_type: EntityType) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: EntityId::from_name(&name),
            name,
            entity_type,
            description: String::new(),
            aliases: Vec::new(),
            attributes: HashMap::new(),
            first_appearance: None,
            appearances: Vec::new(),
            mention_count: 0,
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

    /// Sets the confidence score, clamped to [0, 1].
    #[must_use]
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Adds an alias.
    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Adds multiple aliases.
    #[must_use]
    pub fn with_aliases(mut self, aliases: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    /// Sets an attribute value.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Records an appearance in the given scene.
    #[must_use]
    pub fn with_appearance(mut self, scene_id: impl Into<String>) -> Self {
        self.record_appearance(&scene_id.into());
        self
    }

    /// Appends a scene reference if not already present.
    ///
    /// `mention_count` increments only when the scene is new; re-extracting
    /// an already-seen scene is idempotent.
    ///
    /// Returns `true` if the scene was newly appended.
    pub fn record_appearance(&mut self, scene_id: &str) -> bool {
        if self.appearances.iter().any(|s| s == scene_id) {
            return false;
        }
        if self.first_appearance.is_none() {
            self.first_appearance = Some(scene_id.to_string());
        }
        self.appearances.push(scene_id.to_string());
        self.mention_count = self.mention_count.saturating_add(1);
        true
    }

    /// Returns true if this entity matches a name (canonical or alias),
    /// compared on normalized form.
    #[must_use]
    pub fn matches_name(&self, name: &str) -> bool {
        let normalized = normalize_name(name);
        normalize_name(&self.name) == normalized
            || self.aliases.iter().any(|a| normalize_name(a) == normalized)
    }
}

/// Partial update for an entity. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntityPatch {
    /// New canonical name (the id does not change).
    pub name: Option<String>,
    /// New entity type.
    pub entity_type: Option<EntityType>,
    /// Replacement description.
    pub description: Option<String>,
    /// Aliases to union in.
    pub aliases: Option<Vec<String>>,
    /// Attribute entries to overwrite per key.
    pub attributes: Option<HashMap<String, serde_json::Value>>,
    /// New confidence (clamped on apply).
    pub confidence: Option<f32>,
    /// New verification state.
    pub verified: Option<bool>,
}

/// Query parameters for filtering entities.
#[derive(Debug, Clone, Default)]
pub struct EntityQuery {
    /// Filter by entity type.
    pub entity_type: Option<EntityType>,
    /// Minimum mention count.
    pub min_mentions: Option<u32>,
    /// Only verified entities.
    pub verified_only: bool,
    /// Attribute equality filters (all must match).
    pub attribute_filters: HashMap<String, serde_json::Value>,
}

impl EntityQuery {
    /// Creates a new empty query.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by entity type.
    #[must_use]
    pub const fn with_type(mut self, entity_type: EntityType) -> Self {
        self.entity_type = Some(entity_type);
        self
    }

    /// Requires a minimum mention count.
    #[must_use]
    pub const fn with_min_mentions(mut self, min: u32) -> Self {
        self.min_mentions = Some(min);
        self
    }

    /// Restricts results to verified entities.
    #[must_use]
    pub const fn verified_only(mut self) -> Self {
        self.verified_only = true;
        self
    }

    /// Adds an attribute equality filter.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attribute_filters.insert(key.into(), value);
        self
    }

    /// Returns true if the entity satisfies every filter.
    #[must_use]
    pub fn matches(&self, entity: &Entity) -> bool {
        if let Some(entity_type) = self.entity_type {
            if entity.entity_type != entity_type {
                return false;
            }
        }
        if let Some(min) = self.min_mentions {
            if entity.mention_count < min {
                return false;
            }
        }
        if self.verified_only && !entity.verified {
            return false;
        }
        self.attribute_filters
            .iter()
            .all(|(key, value)| entity.attributes.get(key) == Some(value))
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Mickey", "mickey")]
    #[test_case("The Abandoned Warehouse", "the_abandoned_warehouse")]
    #[test_case("  D'Artagnan!  ", "d_artagnan")]
    #[test_case("St. Mary's  Cathedral", "st_mary_s_cathedral")]
    fn test_normalize_name(input: &str, expected: &str) {
        assert_eq!(normalize_name(input), expected);
    }

    #[test]
    fn test_entity_id_deterministic() {
        assert_eq!(EntityId::from_name("Sarah"), EntityId::from_name("sarah"));
        assert_eq!(EntityId::from_name("Sarah").as_str(), "sarah");
    }

    #[test]
    fn test_entity_type_parse() {
        assert_eq!(EntityType::parse("character"), Some(EntityType::Character));
        assert_eq!(EntityType::parse("PERSON"), Some(EntityType::Character));
        assert_eq!(EntityType::parse("place"), Some(EntityType::Location));
        assert_eq!(EntityType::parse("faction"), Some(EntityType::Organization));
        assert_eq!(EntityType::parse("motif"), Some(EntityType::Theme));
        assert_eq!(EntityType::parse("unknown"), None);
    }

    #[test]
    fn test_entity_creation() {
        let entity = Entity::new("Mickey", EntityType::Character)
            .with_confidence(0.95)
            .with_alias("the kid")
            .with_attribute("occupation", serde_json::json!("smuggler"));

        assert_eq!(entity.id.as_str(), "mickey");
        assert_eq!(entity.entity_type, EntityType::Character);
        assert_eq!(entity.confidence, 0.95);
        assert!(!entity.verified);
        assert!(entity.aliases.contains(&"the kid".to_string()));
        assert_eq!(
            entity.attributes.get("occupation"),
            Some(&serde_json::json!("smuggler"))
        );
    }

    #[test]
    fn test_record_appearance_idempotent() {
        let mut entity = Entity::new("Mickey", EntityType::Character);

        assert!(entity.record_appearance("scene-1"));
        assert!(entity.record_appearance("scene-2"));
        assert!(!entity.record_appearance("scene-1"));

        assert_eq!(entity.mention_count, 2);
        assert_eq!(entity.first_appearance.as_deref(), Some("scene-1"));
        assert_eq!(entity.appearances, vec!["scene-1", "scene-2"]);
    }

    #[test]
    fn test_matches_name_via_alias() {
        let entity = Entity::new("Sarah Voss", EntityType::Character)
            .with_alias("The Controller")
            .with_alias("Sarah");

        assert!(entity.matches_name("sarah voss"));
        assert!(entity.matches_name("the controller"));
        assert!(entity.matches_name("Sarah"));
        assert!(!entity.matches_name("Mickey"));
    }

    #[test]
    fn test_confidence_clamping() {
        let entity = Entity::new("Test", EntityType::Concept).with_confidence(1.5);
        assert_eq!(entity.confidence, 1.0);

        let entity = Entity::new("Test", EntityType::Concept).with_confidence(-0.5);
        assert_eq!(entity.confidence, 0.0);
    }

    #[test]
    fn test_query_matches() {
        let mut entity = Entity::new("Warehouse", EntityType::Location)
            .with_attribute("condition", serde_json::json!("abandoned"));
        entity.record_appearance("scene-1");
        entity.record_appearance("scene-2");

        assert!(EntityQuery::new().with_type(EntityType::Location).matches(&entity));
        assert!(!EntityQuery::new().with_type(EntityType::Character).matches(&entity));
        assert!(EntityQuery::new().with_min_mentions(2).matches(&entity));
        assert!(!EntityQuery::new().with_min_mentions(3).matches(&entity));
        assert!(!EntityQuery::new().verified_only().matches(&entity));
        assert!(
            EntityQuery::new()
                .with_attribute("condition", serde_json::json!("abandoned"))
                .matches(&entity)
        );
        assert!(
            !EntityQuery::new()
                .with_attribute("condition", serde_json::json!("pristine"))
                .matches(&entity)
        );
    }

    #[test]
    fn test_entity_serde_iso8601() {
        let entity = Entity::new("Mickey", EntityType::Character);
        let json = serde_json::to_value(&entity).expect("serialize");
        let created = json
            .get("created_at")
            .and_then(serde_json::Value::as_str)
            .expect("created_at string");
        // chrono serializes DateTime<Utc> as RFC 3339 / ISO-8601
        assert!(created.contains('T'));

        let back: Entity = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.id, entity.id);
        assert_eq!(back.created_at, entity.created_at);
    }
}
