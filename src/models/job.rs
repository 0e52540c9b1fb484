//! Extraction job records and lifecycle states.

use crate::extraction::ExtractionStrategy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an extraction job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Generates a new unique job ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("job_{}", Uuid::new_v4()))
    }

    /// Wraps an existing job ID string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the job ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an extraction job.
///
/// Transitions: `Pending → Running → {Completed, Failed, Cancelled}`.
/// The three right-hand states are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Registered, not yet running.
    Pending,
    /// Extraction in progress.
    Running,
    /// Finished and merged successfully.
    Completed,
    /// Finished with an error recorded on the job.
    Failed,
    /// Cancelled before completion; any result was discarded.
    Cancelled,
}

impl JobState {
    /// Returns true if the state admits no further transitions.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns the state as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Token accounting for a model-backed extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens sent to the model.
    pub input_tokens: u64,
    /// Tokens produced by the model.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Sums two usage records.
    #[must_use]
    pub const fn add(self, other: Self) -> Self {
        Self {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
        }
    }
}

/// Record of one asynchronous extraction invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionJob {
    /// Unique job identifier.
    pub id: JobId,
    /// Project whose graph this job mutates.
    pub project_id: String,
    /// Target scene.
    pub scene_id: String,
    /// Strategy used for extraction.
    pub strategy: ExtractionStrategy,
    /// Model identifier, when a model-backed strategy ran.
    pub model: Option<String>,
    /// Current lifecycle state.
    pub state: JobState,
    /// Entities produced by the extraction.
    pub entities_found: usize,
    /// Relationships produced by the extraction.
    pub relationships_found: usize,
    /// Token accounting (zero for free strategies).
    pub usage: TokenUsage,
    /// Estimated spend in USD (zero for free strategies).
    pub estimated_cost_usd: f64,
    /// When the job started running.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// Human-readable error message when `state == Failed`.
    pub error: Option<String>,
}

impl ExtractionJob {
    /// Creates a pending job record.
    #[must_use]
    pub fn pending(
        project_id: impl Into<String>,
        scene_id: impl Into<String>,
        strategy: ExtractionStrategy,
    ) -> Self {
        Self {
            id: JobId::generate(),
            project_id: project_id.into(),
            scene_id: scene_id.into(),
            strategy,
            model: None,
            state: JobState::Pending,
            entities_found: 0,
            relationships_found: 0,
            usage: TokenUsage::default(),
            estimated_cost_usd: 0.0,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }
}

/// Cost estimate for a proposed batch extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostEstimate {
    /// Scenes that would be processed (after the batch cap).
    pub scene_count: usize,
    /// Estimated input tokens across all scenes.
    pub estimated_input_tokens: u64,
    /// Estimated spend in USD.
    pub estimated_cost_usd: f64,
    /// Threshold that triggered the confirmation gate.
    pub confirmation_threshold_usd: f64,
}

/// Outcome of a whole-project batch extraction request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BatchOutcome {
    /// Jobs were created; ids are in submission order.
    Started {
        /// One job per accepted scene.
        job_ids: Vec<JobId>,
        /// Scenes skipped because the batch cap was reached.
        skipped: usize,
    },
    /// No jobs were created; the caller must confirm the estimated cost.
    CostConfirmationRequired {
        /// The estimate that exceeded the threshold.
        estimate: CostEstimate,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_unique() {
        assert_ne!(JobId::generate(), JobId::generate());
        assert!(JobId::generate().as_str().starts_with("job_"));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Running.is_terminal());
        assert!(JobState::Completed.is_terminal());
        assert!(JobState::Failed.is_terminal());
        assert!(JobState::Cancelled.is_terminal());
    }

    #[test]
    fn test_pending_job_defaults() {
        let job = ExtractionJob::pending("novel-1", "scene-3", ExtractionStrategy::Pattern);
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.entities_found, 0);
        assert!(job.started_at.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_token_usage_add() {
        let a = TokenUsage {
            input_tokens: 100,
            output_tokens: 20,
        };
        let b = TokenUsage {
            input_tokens: 50,
            output_tokens: 5,
        };
        let sum = a.add(b);
        assert_eq!(sum.input_tokens, 150);
        assert_eq!(sum.output_tokens, 25);
    }

    #[test]
    fn test_batch_outcome_serde_tag() {
        let outcome = BatchOutcome::Started {
            job_ids: vec![JobId::new("job_x")],
            skipped: 2,
        };
        let json = serde_json::to_value(&outcome).expect("serialize");
        assert_eq!(json["outcome"], "started");
        assert_eq!(json["skipped"], 2);
    }
}
