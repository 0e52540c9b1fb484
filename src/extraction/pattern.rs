//! Local heuristic extraction.
//!
//! Recognizes candidate entities from capitalization and narrative cue
//! words, without any model call. Free and fast, but types are guesses
//! and it never proposes relationships. Used directly as the `pattern`
//! strategy and as the cheap half of `hybrid`.

use super::{ExtractedEntity, ExtractionStrategy, SceneExtraction, SceneExtractor};
use crate::models::normalize_name;
use crate::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Confidence assigned to every heuristic find.
const PATTERN_CONFIDENCE: f32 = 0.7;

/// Consecutive capitalized words, allowing internal connectives
/// ("House of Varn", "Sarah van Dorn").
static CAPITALIZED_SPAN: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)] // pattern is a compile-time constant
    Regex::new(r"[A-Z][a-zA-Z'\-]*(?:\s+(?:of|the|de|van|von|du)\s+[A-Z][a-zA-Z'\-]*|\s+[A-Z][a-zA-Z'\-]*)*")
        .unwrap()
});

/// Words that start sentences without naming anything.
static STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "the", "and", "but", "or", "so", "yet", "then", "when", "while", "after",
        "before", "as", "if", "he", "she", "it", "they", "we", "you", "i", "his", "her", "its",
        "their", "our", "my", "your", "this", "that", "these", "those", "there", "here", "now",
        "once", "suddenly", "meanwhile", "inside", "outside", "later", "tonight", "yesterday",
        "tomorrow", "chapter", "scene", "no", "not", "what", "who", "where", "why", "how",
    ]
    .into_iter()
    .collect()
});

/// Phrases that mark the following span as a place.
static LOCATION_CUES: &[&str] = &[
    "at the", "in the", "to the", "near the", "inside the", "outside the", "toward the",
    "towards the", "from the", "beneath the", "arrived at", "arrived in", "entered",
];

/// Name suffixes that mark an organization.
static ORGANIZATION_SUFFIXES: &[&str] = &[
    "guild", "company", "corps", "order", "council", "house", "syndicate", "brotherhood",
    "legion", "ministry", "agency", "union", "clan",
];

/// Name prefixes that mark an event.
static EVENT_PREFIXES: &[&str] = &["battle of", "siege of", "festival of", "feast of", "war of"];

/// Heuristic extractor over capitalization and cue lexicons.
pub struct PatternExtractor;

impl PatternExtractor {
    /// Creates a pattern extractor.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Guesses an entity type from the span and the text preceding it.
    fn classify(span: &str, preceding: &str) -> &'static str {
        let lowered = span.to_lowercase();
        if EVENT_PREFIXES.iter().any(|p| lowered.starts_with(p)) {
            return "event";
        }
        if ORGANIZATION_SUFFIXES
            .iter()
            .any(|s| lowered.ends_with(s) || lowered.starts_with(&format!("{s} ")))
        {
            return "organization";
        }
        let preceding = preceding.to_lowercase();
        let preceding = preceding.trim_end();
        if LOCATION_CUES.iter().any(|cue| preceding.ends_with(cue.trim_end())) {
            return "location";
        }
        "character"
    }

    fn scan(text: &str) -> Vec<ExtractedEntity> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut entities = Vec::new();

        for found in CAPITALIZED_SPAN.find_iter(text) {
            let span = found.as_str().trim();
            // Drop leading sentence-starters ("The warehouse..." is not a name,
            // "The Gilded Crow" keeps its article because the rest is capitalized).
            let words: Vec<&str> = span.split_whitespace().collect();
            let span = if words.len() == 1 && STOPWORDS.contains(words[0].to_lowercase().as_str())
            {
                continue;
            } else if STOPWORDS.contains(words[0].to_lowercase().as_str())
                && words.len() == 2
                && words[0] != "The"
            {
                words[1..].join(" ")
            } else {
                span.to_string()
            };

            let key = normalize_name(&span);
            if key.is_empty() || !seen.insert(key) {
                continue;
            }

            let window_start = found.start().saturating_sub(16);
            let preceding = text
                .get(window_start..found.start())
                .unwrap_or_default();

            entities.push(ExtractedEntity {
                name: span.clone(),
                entity_type: Self::classify(&span, preceding).to_string(),
                description: String::new(),
                aliases: Vec::new(),
                attributes: std::collections::HashMap::new(),
                confidence: PATTERN_CONFIDENCE,
            });
        }
        entities
    }
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SceneExtractor for PatternExtractor {
    fn strategy(&self) -> ExtractionStrategy {
        ExtractionStrategy::Pattern
    }

    async fn extract(
        &self,
        scene_id: &str,
        text: &str,
        _known: &[crate::models::Entity],
    ) -> Result<SceneExtraction> {
        let entities = Self::scan(text);
        tracing::debug!(
            scene_id,
            entities = entities.len(),
            "Pattern extraction complete"
        );
        Ok(SceneExtraction {
            entities,
            relationships: Vec::new(),
            usage: crate::models::TokenUsage::default(),
            model: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn scan(text: &str) -> SceneExtraction {
        PatternExtractor::new()
            .extract("scene-1", text, &[])
            .await
            .expect("pattern extraction never fails")
    }

    #[tokio::test]
    async fn test_finds_capitalized_names() {
        let result = scan("Mickey crossed the street. Sarah watched from the corner.").await;

        let names: Vec<&str> = result.entities.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"Mickey"));
        assert!(names.contains(&"Sarah"));
    }

    #[tokio::test]
    async fn test_never_returns_relationships() {
        let result = scan("Mickey loves Sarah. Sarah hates Mickey.").await;
        assert!(result.relationships.is_empty());
    }

    #[tokio::test]
    async fn test_skips_sentence_initial_stopwords() {
        let result = scan("The rain fell. He waited. Suddenly it stopped.").await;
        assert!(result.entities.is_empty());
    }

    #[tokio::test]
    async fn test_multiword_names_kept_whole() {
        let result = scan("They reached the gates of Castle Varn Keep at dusk.").await;

        let names: Vec<&str> = result.entities.iter().map(|e| e.name.as_str()).collect();
        assert!(names.contains(&"Castle Varn Keep"));
    }

    #[tokio::test]
    async fn test_location_cue_classifies_location() {
        let result = scan("Mickey waited at the Warehouse until dark.").await;

        let warehouse = result
            .entities
            .iter()
            .find(|e| e.name == "Warehouse")
            .expect("found");
        assert_eq!(warehouse.entity_type, "location");
    }

    #[tokio::test]
    async fn test_organization_suffix() {
        let result = scan("Agents of the Merchant Guild arrived.").await;

        let guild = result
            .entities
            .iter()
            .find(|e| e.name.ends_with("Guild"))
            .expect("found");
        assert_eq!(guild.entity_type, "organization");
    }

    #[tokio::test]
    async fn test_deduplicates_repeated_mentions() {
        let result = scan("Mickey ran. Mickey fell. Mickey got up again.").await;

        let mickeys = result
            .entities
            .iter()
            .filter(|e| e.name == "Mickey")
            .count();
        assert_eq!(mickeys, 1);
    }

    #[tokio::test]
    async fn test_fixed_confidence() {
        let result = scan("Mickey stood still.").await;
        assert!(result.entities.iter().all(|e| (e.confidence - 0.7).abs() < f32::EPSILON));
    }
}
