//! # Fablegraph
//!
//! A narrative knowledge-graph engine.
//!
//! Fablegraph turns free-text scene content into a structured graph of
//! entities (characters, locations, objects, concepts, events,
//! organizations, themes) and typed relationships between them, maintains
//! one graph per project, and exposes it for query, export, and real-time
//! observation.
//!
//! ## Features
//!
//! - Deterministic entity identity: repeated mentions across scenes
//!   resolve to the same node instead of duplicating
//! - Two interchangeable extraction strategies (LLM-backed semantic and a
//!   free local pattern recognizer) plus a hybrid of both
//! - Traversal and analytics: bounded BFS, shortest paths, centrality
//!   ranking, community detection
//! - One durable JSON document per project with validated loads
//! - Async job orchestration with per-project serialization, timeouts,
//!   cancellation, and a cost-confirmation gate for batch runs
//! - Broadcast change events for live subscribers
//!
//! ## Example
//!
//! ```rust,ignore
//! use fablegraph::{EngineConfig, ExtractionStrategy, JobOrchestrator};
//! use fablegraph::persistence::FileGraphStore;
//!
//! let store = std::sync::Arc::new(FileGraphStore::new("./graphs"));
//! let orchestrator = JobOrchestrator::new(EngineConfig::default(), store, None);
//! let job_id = orchestrator
//!     .start_extraction("novel-1", "scene-12", scene_text, ExtractionStrategy::Semantic)
//!     .await?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod export;
pub mod extraction;
pub mod graph;
pub mod jobs;
pub mod llm;
pub mod models;
pub mod notify;
pub mod persistence;

// Re-exports for convenience
pub use config::{EngineConfig, ExtractionConfig, LlmConfig};
pub use extraction::{ExtractionStrategy, SceneExtraction, SceneExtractor};
pub use graph::KnowledgeGraph;
pub use jobs::{JobOrchestrator, SceneInput};
pub use llm::LlmProvider;
pub use models::{
    BatchOutcome, CostEstimate, Entity, EntityId, EntityPatch, EntityQuery, EntityType,
    ExtractionJob, GraphEvent, JobId, JobState, RelationType, Relationship, RelationshipQuery,
};
pub use notify::ChangeNotifier;
pub use persistence::{FileGraphStore, GraphDocument, GraphStore};

/// Error type for fablegraph operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Validation` | Persisted document missing required sections or internally inconsistent |
/// | `NotFound` | Operation references an unknown entity, relationship endpoint, job, or project |
/// | `Extraction` | Model call failed, timed out, or returned unparseable output |
/// | `Concurrency` | Per-project lock not acquired within the configured bound |
/// | `Storage` | Filesystem I/O or serialization plumbing failed |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The persisted graph document is malformed.
    ///
    /// Raised when:
    /// - A required top-level section (`metadata`, `graph`, `entities`,
    ///   `relationships`) is missing
    /// - A section has the wrong shape for typed deserialization
    /// - A relationship references an entity id absent from the document
    #[error("invalid graph document: {0}")]
    Validation(String),

    /// An operation referenced something that does not exist.
    ///
    /// Raised when:
    /// - An entity id is not present in the graph
    /// - Relationship creation names a missing endpoint
    /// - A job id is unknown to the orchestrator
    #[error("not found: {0}")]
    NotFound(String),

    /// Extraction failed at the model or parse boundary.
    ///
    /// Scene-level parse failures are normally recovered (logged, empty
    /// result); this variant surfaces when the failure must reach the
    /// caller, e.g. a job-level timeout.
    #[error("extraction failed ({kind}): {detail}")]
    Extraction {
        /// What went wrong.
        kind: ExtractionErrorKind,
        /// Human-readable detail.
        detail: String,
    },

    /// A per-project lock could not be acquired within the bound.
    #[error(
        "concurrency limit: lock for project '{project_id}' not acquired within {waited_ms}ms"
    )]
    Concurrency {
        /// The contended project.
        project_id: String,
        /// How long acquisition was attempted.
        waited_ms: u64,
    },

    /// A storage operation failed.
    ///
    /// Raised when:
    /// - Filesystem I/O errors occur
    /// - A graph document cannot be serialized
    #[error("storage operation '{operation}' failed: {cause}")]
    Storage {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Classification of extraction failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionErrorKind {
    /// The model provider rejected or failed the call.
    Provider(LlmFailure),
    /// The model replied but no structured payload could be recovered.
    UnparseableOutput,
    /// The extraction call exceeded the per-job timeout.
    Timeout,
}

impl std::fmt::Display for ExtractionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Provider(failure) => write!(f, "provider/{failure}"),
            Self::UnparseableOutput => write!(f, "unparseable-output"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Distinguishable failure modes of the generative-model capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmFailure {
    /// The provider rate-limited the request.
    RateLimited,
    /// The request timed out at the transport layer.
    Timeout,
    /// Authentication with the provider failed.
    Auth,
    /// Any other provider-side failure.
    Other,
}

impl std::fmt::Display for LlmFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RateLimited => write!(f, "rate-limited"),
            Self::Timeout => write!(f, "timeout"),
            Self::Auth => write!(f, "auth"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// Result type alias for fablegraph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Returns the current Unix timestamp in seconds.
///
/// Centralized to avoid duplicate implementations across the codebase.
/// Falls back to 0 if the system clock is before the Unix epoch.
#[must_use]
pub fn current_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Installs the global `tracing` subscriber.
///
/// Filtering follows `RUST_LOG`, defaulting to `info`. `json` switches
/// to structured line output for log aggregation. Calling this more than
/// once is harmless; later calls are no-ops.
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
