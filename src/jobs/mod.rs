//! Asynchronous extraction job orchestration.
//!
//! The orchestrator is the service layer of the engine: it owns the job
//! registry, serializes all access to a project's graph behind a
//! per-project async lock, runs extraction jobs with a wall-clock
//! timeout and cooperative cancellation, and publishes change events
//! after every successful mutation.
//!
//! # Concurrency model
//!
//! Jobs for different projects run in parallel; jobs and direct
//! mutations for the same project are serialized. The project lock is
//! held across the whole load → extract → merge → save sequence, so a
//! reader never observes a half-merged graph. Lock acquisition is
//! bounded: waiting longer than the configured limit fails the
//! operation with a concurrency error instead of queueing forever.

use crate::config::EngineConfig;
use crate::export::InterchangeGraph;
use crate::extraction::{
    ExtractionStrategy, PatternExtractor, SceneExtractor, estimate_tokens, extractor_for,
};
use crate::graph::{KnowledgeGraph, Upsert};
use crate::llm::LlmProvider;
use crate::models::{
    BatchOutcome, CostEstimate, Entity, EntityId, EntityPatch, EventMeta, ExtractionJob,
    GraphEvent, JobId, JobState, RelationshipQuery, TokenUsage,
};
use crate::notify::ChangeNotifier;
use crate::persistence::{GraphDocument, GraphStore};
use crate::{Error, ExtractionErrorKind, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Assumed provider price per million input tokens, used for batch cost
/// estimates. Deliberately a single coarse number: the gate exists to
/// catch expensive batches, not to invoice them.
const COST_PER_MILLION_INPUT_TOKENS_USD: f64 = 3.0;

/// One scene submitted to a batch extraction.
#[derive(Debug, Clone)]
pub struct SceneInput {
    /// Scene identifier.
    pub scene_id: String,
    /// Raw scene text.
    pub text: String,
}

impl SceneInput {
    /// Creates a scene input.
    pub fn new(scene_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            scene_id: scene_id.into(),
            text: text.into(),
        }
    }
}

/// What a finished extraction run produced.
struct RunStats {
    entities_found: usize,
    relationships_found: usize,
    usage: TokenUsage,
    model: Option<String>,
}

/// Result of the guarded extraction sequence.
enum RunOutcome {
    Completed(RunStats),
    Cancelled,
}

struct Inner {
    config: EngineConfig,
    store: Arc<dyn GraphStore>,
    provider: Option<Arc<dyn LlmProvider>>,
    notifier: ChangeNotifier,
    jobs: RwLock<HashMap<JobId, ExtractionJob>>,
    cancel_flags: RwLock<HashMap<JobId, Arc<AtomicBool>>>,
    project_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

/// The engine's job orchestrator and mutation service.
#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Inner>,
}

impl JobOrchestrator {
    /// Creates an orchestrator.
    ///
    /// `provider` may be `None` when only the free pattern strategy will
    /// be used; paid strategies then fail fast at submission.
    #[must_use]
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn GraphStore>,
        provider: Option<Arc<dyn LlmProvider>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                provider,
                notifier: ChangeNotifier::default(),
                jobs: RwLock::new(HashMap::new()),
                cancel_flags: RwLock::new(HashMap::new()),
                project_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// The notifier this orchestrator publishes to.
    #[must_use]
    pub fn notifier(&self) -> &ChangeNotifier {
        &self.inner.notifier
    }

    // =========================================================================
    // Job lifecycle
    // =========================================================================

    /// Submits a single-scene extraction job and returns immediately.
    ///
    /// The job runs on a spawned task; poll [`Self::job`] or subscribe to
    /// `job.state_changed` events to observe completion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when a paid strategy is requested
    /// but no model provider is configured.
    pub async fn start_extraction(
        &self,
        project_id: impl Into<String>,
        scene_id: impl Into<String>,
        text: impl Into<String>,
        strategy: ExtractionStrategy,
    ) -> Result<JobId> {
        let project_id = project_id.into();
        let scene_id = scene_id.into();
        let text = text.into();

        let (job_id, cancel) = self
            .register(&project_id, &scene_id, &text, strategy)
            .await?;

        let orchestrator = self.clone();
        let spawned_id = job_id.clone();
        tokio::spawn(async move {
            orchestrator
                .run(spawned_id, project_id, scene_id, text, strategy, cancel)
                .await;
        });
        Ok(job_id)
    }

    /// Submits a single-scene extraction job and waits for it to reach a
    /// terminal state, returning the final job record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when a paid strategy is requested
    /// but no model provider is configured. Job failures are reported on
    /// the returned record, not as an error.
    pub async fn run_to_completion(
        &self,
        project_id: impl Into<String>,
        scene_id: impl Into<String>,
        text: impl Into<String>,
        strategy: ExtractionStrategy,
    ) -> Result<ExtractionJob> {
        let project_id = project_id.into();
        let scene_id = scene_id.into();
        let text = text.into();

        let (job_id, cancel) = self
            .register(&project_id, &scene_id, &text, strategy)
            .await?;
        self.run(job_id.clone(), project_id, scene_id, text, strategy, cancel)
            .await;
        self.job(&job_id).await
    }

    /// Creates the pending job record and its cancellation flag.
    async fn register(
        &self,
        project_id: &str,
        scene_id: &str,
        text: &str,
        strategy: ExtractionStrategy,
    ) -> Result<(JobId, Arc<AtomicBool>)> {
        if strategy.is_paid() && self.inner.provider.is_none() {
            return Err(Error::Validation(format!(
                "strategy '{strategy}' requires a model provider"
            )));
        }

        let mut job = ExtractionJob::pending(project_id, scene_id, strategy);
        if strategy.is_paid() {
            job.estimated_cost_usd = scene_cost_usd(text);
        }
        let job_id = job.id.clone();
        let cancel = Arc::new(AtomicBool::new(false));

        self.inner.jobs.write().await.insert(job_id.clone(), job);
        self.inner
            .cancel_flags
            .write()
            .await
            .insert(job_id.clone(), Arc::clone(&cancel));

        self.publish_job_state(project_id, &job_id, JobState::Pending, None);
        metrics::counter!("extraction_jobs_started_total").increment(1);
        tracing::info!(
            project_id,
            scene_id,
            job_id = %job_id,
            strategy = %strategy,
            "Extraction job submitted"
        );
        Ok((job_id, cancel))
    }

    /// Submits extraction jobs for many scenes of one project.
    ///
    /// Scenes beyond the configured batch cap are not processed and are
    /// reported back as skipped. For paid strategies, when the estimated
    /// cost of the accepted scenes exceeds the configured threshold and
    /// `cost_confirmed` is false, no job is created and the estimate is
    /// returned instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] when a paid strategy is requested
    /// but no model provider is configured.
    pub async fn extract_project(
        &self,
        project_id: &str,
        scenes: Vec<SceneInput>,
        strategy: ExtractionStrategy,
        cost_confirmed: bool,
    ) -> Result<BatchOutcome> {
        if strategy.is_paid() && self.inner.provider.is_none() {
            return Err(Error::Validation(format!(
                "strategy '{strategy}' requires a model provider"
            )));
        }

        let cap = self.inner.config.extraction.batch_cap;
        let accepted = scenes.len().min(cap);
        let skipped = scenes.len() - accepted;
        let scenes = &scenes[..accepted];

        if strategy.is_paid() {
            let estimated_input_tokens: u64 =
                scenes.iter().map(|s| estimate_tokens(&s.text)).sum();
            let estimated_cost_usd = tokens_cost_usd(estimated_input_tokens);
            let threshold = self.inner.config.extraction.cost_threshold_usd;

            if estimated_cost_usd > threshold && !cost_confirmed {
                tracing::info!(
                    project_id,
                    scenes = accepted,
                    estimated_cost_usd,
                    threshold,
                    "Batch extraction held for cost confirmation"
                );
                return Ok(BatchOutcome::CostConfirmationRequired {
                    estimate: CostEstimate {
                        scene_count: accepted,
                        estimated_input_tokens,
                        estimated_cost_usd,
                        confirmation_threshold_usd: threshold,
                    },
                });
            }
        }

        let mut job_ids = Vec::with_capacity(accepted);
        for scene in scenes {
            let job_id = self
                .start_extraction(
                    project_id,
                    scene.scene_id.clone(),
                    scene.text.clone(),
                    strategy,
                )
                .await?;
            job_ids.push(job_id);
        }
        Ok(BatchOutcome::Started { job_ids, skipped })
    }

    /// Returns a snapshot of a job record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown job id.
    pub async fn job(&self, job_id: &JobId) -> Result<ExtractionJob> {
        self.inner
            .jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("job '{job_id}'")))
    }

    /// Returns snapshots of all jobs for a project, newest submission last.
    pub async fn jobs_for_project(&self, project_id: &str) -> Vec<ExtractionJob> {
        self.inner
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.project_id == project_id)
            .cloned()
            .collect()
    }

    /// Requests cancellation of a job.
    ///
    /// Cancellation is cooperative: the running task observes the flag at
    /// its next suspension point. Returns false when the job is already
    /// terminal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown job id.
    pub async fn cancel(&self, job_id: &JobId) -> Result<bool> {
        let job = self.job(job_id).await?;
        if job.state.is_terminal() {
            return Ok(false);
        }
        if let Some(flag) = self.inner.cancel_flags.read().await.get(job_id) {
            flag.store(true, Ordering::SeqCst);
        }
        tracing::info!(job_id = %job_id, "Cancellation requested");
        Ok(true)
    }

    async fn run(
        &self,
        job_id: JobId,
        project_id: String,
        scene_id: String,
        text: String,
        strategy: ExtractionStrategy,
        cancel: Arc<AtomicBool>,
    ) {
        self.transition(&job_id, |job| {
            job.state = JobState::Running;
            job.started_at = Some(Utc::now());
        })
        .await;
        self.publish_job_state(&project_id, &job_id, JobState::Running, None);

        let budget = Duration::from_millis(self.inner.config.extraction.job_timeout_ms);
        let outcome = tokio::time::timeout(
            budget,
            self.execute(&project_id, &scene_id, &text, strategy, &cancel),
        )
        .await;

        let (state, error) = match outcome {
            Ok(Ok(RunOutcome::Completed(stats))) => {
                self.transition(&job_id, |job| {
                    job.entities_found = stats.entities_found;
                    job.relationships_found = stats.relationships_found;
                    job.usage = stats.usage;
                    job.model = stats.model.clone();
                })
                .await;
                metrics::counter!("extraction_jobs_completed_total").increment(1);
                (JobState::Completed, None)
            }
            Ok(Ok(RunOutcome::Cancelled)) => {
                metrics::counter!("extraction_jobs_cancelled_total").increment(1);
                (JobState::Cancelled, None)
            }
            Ok(Err(err)) => {
                tracing::warn!(job_id = %job_id, error = %err, "Extraction job failed");
                metrics::counter!("extraction_jobs_failed_total").increment(1);
                (JobState::Failed, Some(err.to_string()))
            }
            Err(_elapsed) => {
                let err = Error::Extraction {
                    kind: ExtractionErrorKind::Timeout,
                    detail: format!("exceeded {}ms", self.inner.config.extraction.job_timeout_ms),
                };
                tracing::warn!(job_id = %job_id, error = %err, "Extraction job timed out");
                metrics::counter!("extraction_jobs_failed_total").increment(1);
                (JobState::Failed, Some(err.to_string()))
            }
        };

        self.transition(&job_id, |job| {
            job.state = state;
            job.finished_at = Some(Utc::now());
            job.error.clone_from(&error);
        })
        .await;
        self.publish_job_state(&project_id, &job_id, state, error);
        self.inner.cancel_flags.write().await.remove(&job_id);
    }

    /// The guarded load → extract → merge → save sequence.
    async fn execute(
        &self,
        project_id: &str,
        scene_id: &str,
        text: &str,
        strategy: ExtractionStrategy,
        cancel: &AtomicBool,
    ) -> Result<RunOutcome> {
        let _guard = self.project_lock(project_id).await?;
        if cancel.load(Ordering::SeqCst) {
            return Ok(RunOutcome::Cancelled);
        }

        let mut graph = self
            .inner
            .store
            .load(project_id)
            .await?
            .unwrap_or_else(|| KnowledgeGraph::new(project_id));

        let extractor: Box<dyn SceneExtractor> = match (strategy, &self.inner.provider) {
            (ExtractionStrategy::Pattern, _) => Box::new(PatternExtractor::new()),
            (_, Some(provider)) => extractor_for(
                strategy,
                Arc::clone(provider),
                self.inner.config.extraction.min_confidence,
            ),
            (_, None) => {
                return Err(Error::Validation(format!(
                    "strategy '{strategy}' requires a model provider"
                )));
            }
        };

        let known: Vec<Entity> = graph.entities().cloned().collect();
        let extraction = match extractor.extract(scene_id, text, &known).await {
            Ok(extraction) => extraction,
            Err(err) => {
                // The attempt still counts against the graph's bookkeeping.
                graph.record_extraction(false);
                if let Err(save_err) = self.inner.store.save(&graph).await {
                    tracing::warn!(
                        project_id,
                        error = %save_err,
                        "Could not persist failed-extraction counter"
                    );
                }
                return Err(err);
            }
        };
        if cancel.load(Ordering::SeqCst) {
            return Ok(RunOutcome::Cancelled);
        }

        let entities = extraction.to_entities(scene_id);
        let relationships = extraction.to_relationships(scene_id);
        let entities_found = entities.len();

        for entity in entities {
            let entity_type = entity.entity_type;
            let (entity_id, upsert) = graph.add_entity(entity);
            self.inner.notifier.publish(match upsert {
                Upsert::Created => GraphEvent::EntityAdded {
                    meta: EventMeta::new(project_id),
                    entity_id,
                    entity_type,
                },
                Upsert::Merged => GraphEvent::EntityUpdated {
                    meta: EventMeta::new(project_id),
                    entity_id,
                },
            });
        }

        let mut relationships_found = 0;
        for relationship in relationships {
            let source_id = relationship.source_id.clone();
            let target_id = relationship.target_id.clone();
            let relation_type = relationship.relation_type;
            match graph.add_relationship(relationship) {
                Ok(Upsert::Created) => {
                    relationships_found += 1;
                    self.inner.notifier.publish(GraphEvent::RelationshipAdded {
                        meta: EventMeta::new(project_id),
                        source_id,
                        target_id,
                        relation_type,
                    });
                }
                Ok(Upsert::Merged) => {
                    relationships_found += 1;
                }
                Err(err) => {
                    // The model related an entity it never listed; skip the
                    // edge rather than failing the scene.
                    tracing::warn!(
                        project_id,
                        scene_id,
                        error = %err,
                        "Dropping relationship with unknown endpoint"
                    );
                }
            }
        }

        graph.record_extraction(true);
        self.inner.store.save(&graph).await?;
        self.inner.notifier.publish(GraphEvent::GraphSaved {
            meta: EventMeta::new(project_id),
            entity_count: graph.metadata().entity_count,
            relationship_count: graph.metadata().relationship_count,
        });

        Ok(RunOutcome::Completed(RunStats {
            entities_found,
            relationships_found,
            usage: extraction.usage,
            model: extraction.model,
        }))
    }

    // =========================================================================
    // Direct graph operations
    // =========================================================================

    /// Loads a project's graph for reading.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when the project has no persisted
    /// graph yet.
    pub async fn graph(&self, project_id: &str) -> Result<KnowledgeGraph> {
        self.inner
            .store
            .load(project_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("project '{project_id}'")))
    }

    /// Adds or merges an entity and persists the graph.
    ///
    /// Creates the project graph lazily when this is its first record.
    pub async fn add_entity(&self, project_id: &str, entity: Entity) -> Result<Entity> {
        let _guard = self.project_lock(project_id).await?;
        let mut graph = self.load_or_new(project_id).await?;

        let entity_type = entity.entity_type;
        let (entity_id, upsert) = graph.add_entity(entity);
        self.inner.store.save(&graph).await?;

        self.inner.notifier.publish(match upsert {
            Upsert::Created => GraphEvent::EntityAdded {
                meta: EventMeta::new(project_id),
                entity_id: entity_id.clone(),
                entity_type,
            },
            Upsert::Merged => GraphEvent::EntityUpdated {
                meta: EventMeta::new(project_id),
                entity_id: entity_id.clone(),
            },
        });

        graph
            .get_entity(&entity_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("entity '{entity_id}'")))
    }

    /// Applies a partial update to an entity and persists the graph.
    pub async fn update_entity(
        &self,
        project_id: &str,
        entity_id: &EntityId,
        patch: &EntityPatch,
    ) -> Result<Entity> {
        let _guard = self.project_lock(project_id).await?;
        let mut graph = self.graph_for_update(project_id).await?;

        let updated = graph.update_entity(entity_id, patch)?.clone();
        self.inner.store.save(&graph).await?;

        self.inner.notifier.publish(GraphEvent::EntityUpdated {
            meta: EventMeta::new(project_id),
            entity_id: entity_id.clone(),
        });
        Ok(updated)
    }

    /// Deletes an entity, cascading its relationships, and persists the
    /// graph. Returns the number of cascaded relationships.
    pub async fn delete_entity(&self, project_id: &str, entity_id: &EntityId) -> Result<usize> {
        let _guard = self.project_lock(project_id).await?;
        let mut graph = self.graph_for_update(project_id).await?;

        let cascaded = graph.delete_entity(entity_id)?;
        self.inner.store.save(&graph).await?;

        self.inner.notifier.publish(GraphEvent::EntityDeleted {
            meta: EventMeta::new(project_id),
            entity_id: entity_id.clone(),
            cascaded_relationships: cascaded,
        });
        Ok(cascaded)
    }

    /// Adds a relationship between existing entities and persists the graph.
    pub async fn add_relationship(
        &self,
        project_id: &str,
        relationship: crate::models::Relationship,
    ) -> Result<()> {
        let _guard = self.project_lock(project_id).await?;
        let mut graph = self.graph_for_update(project_id).await?;

        let source_id = relationship.source_id.clone();
        let target_id = relationship.target_id.clone();
        let relation_type = relationship.relation_type;
        let upsert = graph.add_relationship(relationship)?;
        self.inner.store.save(&graph).await?;

        if upsert == Upsert::Created {
            self.inner.notifier.publish(GraphEvent::RelationshipAdded {
                meta: EventMeta::new(project_id),
                source_id,
                target_id,
                relation_type,
            });
        }
        Ok(())
    }

    /// Deletes relationships matching the query and persists the graph.
    /// Returns how many were removed.
    pub async fn delete_relationships(
        &self,
        project_id: &str,
        query: &RelationshipQuery,
    ) -> Result<usize> {
        let _guard = self.project_lock(project_id).await?;
        let mut graph = self.graph_for_update(project_id).await?;

        let removed = graph.delete_relationships(query);
        if removed > 0 {
            self.inner.store.save(&graph).await?;
            self.inner.notifier.publish(GraphEvent::RelationshipDeleted {
                meta: EventMeta::new(project_id),
                removed,
            });
        }
        Ok(removed)
    }

    /// Deletes a project's persisted graph. Returns false when no graph
    /// existed.
    pub async fn delete_project(&self, project_id: &str) -> Result<bool> {
        let _guard = self.project_lock(project_id).await?;
        let removed = self.inner.store.delete(project_id).await?;
        if removed {
            tracing::info!(project_id, "Project graph deleted");
        }
        Ok(removed)
    }

    // =========================================================================
    // Exports
    // =========================================================================

    /// Exports a project's graph in node/edge interchange form.
    pub async fn export_interchange(&self, project_id: &str) -> Result<InterchangeGraph> {
        Ok(InterchangeGraph::from_graph(&self.graph(project_id).await?))
    }

    /// Exports a project's graph as a markdown summary.
    pub async fn export_markdown(&self, project_id: &str) -> Result<String> {
        Ok(crate::export::markdown_summary(&self.graph(project_id).await?))
    }

    /// Exports a project's raw graph document.
    pub async fn export_document(&self, project_id: &str) -> Result<GraphDocument> {
        Ok(GraphDocument::from_graph(&self.graph(project_id).await?))
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn load_or_new(&self, project_id: &str) -> Result<KnowledgeGraph> {
        Ok(self
            .inner
            .store
            .load(project_id)
            .await?
            .unwrap_or_else(|| KnowledgeGraph::new(project_id)))
    }

    async fn graph_for_update(&self, project_id: &str) -> Result<KnowledgeGraph> {
        self.inner
            .store
            .load(project_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("project '{project_id}'")))
    }

    /// Acquires the per-project lock within the configured bound.
    async fn project_lock(&self, project_id: &str) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.inner.project_locks.lock().await;
            Arc::clone(locks.entry(project_id.to_string()).or_default())
        };

        let waited_ms = self.inner.config.extraction.lock_timeout_ms;
        tokio::time::timeout(Duration::from_millis(waited_ms), lock.lock_owned())
            .await
            .map_err(|_| {
                metrics::counter!("project_lock_timeouts_total").increment(1);
                Error::Concurrency {
                    project_id: project_id.to_string(),
                    waited_ms,
                }
            })
    }

    async fn transition(&self, job_id: &JobId, apply: impl FnOnce(&mut ExtractionJob)) {
        if let Some(job) = self.inner.jobs.write().await.get_mut(job_id) {
            apply(job);
        }
    }

    fn publish_job_state(
        &self,
        project_id: &str,
        job_id: &JobId,
        state: JobState,
        error: Option<String>,
    ) {
        self.inner.notifier.publish(GraphEvent::JobStateChanged {
            meta: EventMeta::new(project_id),
            job_id: job_id.clone(),
            state,
            error,
        });
    }
}

fn tokens_cost_usd(tokens: u64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let tokens = tokens as f64;
    tokens / 1_000_000.0 * COST_PER_MILLION_INPUT_TOKENS_USD
}

fn scene_cost_usd(text: &str) -> f64 {
    tokens_cost_usd(estimate_tokens(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmResponse;
    use async_trait::async_trait;

    struct FixedProvider {
        response: String,
    }

    #[async_trait]
    impl LlmProvider for FixedProvider {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn complete(&self, _system: &str, _user: &str) -> Result<LlmResponse> {
            Ok(LlmResponse {
                text: self.response.clone(),
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 10,
                },
                model: "fixed".to_string(),
            })
        }
    }

    fn orchestrator(config: EngineConfig) -> (tempfile::TempDir, JobOrchestrator) {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(crate::persistence::FileGraphStore::new(dir.path()));
        (dir, JobOrchestrator::new(config, store, None))
    }

    async fn wait_terminal(orchestrator: &JobOrchestrator, job_id: &JobId) -> ExtractionJob {
        for _ in 0..400 {
            let job = orchestrator.job(job_id).await.expect("job exists");
            if job.state.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job never reached a terminal state");
    }

    #[tokio::test]
    async fn test_pattern_job_runs_to_completion() {
        let (_dir, orchestrator) = orchestrator(EngineConfig::default());

        let job_id = orchestrator
            .start_extraction(
                "novel-1",
                "scene-1",
                "Mickey met Sarah at the Warehouse.",
                ExtractionStrategy::Pattern,
            )
            .await
            .expect("submit");

        let job = wait_terminal(&orchestrator, &job_id).await;
        assert_eq!(job.state, JobState::Completed);
        assert!(job.entities_found > 0);
        assert!(job.started_at.is_some());
        assert!(job.finished_at.is_some());

        let graph = orchestrator.graph("novel-1").await.expect("persisted");
        assert!(graph.metadata().entity_count > 0);
        assert_eq!(graph.metadata().successful_extractions, 1);
    }

    #[tokio::test]
    async fn test_run_to_completion_returns_final_record() {
        let (_dir, orchestrator) = orchestrator(EngineConfig::default());

        let job = orchestrator
            .run_to_completion(
                "novel-1",
                "scene-1",
                "Mickey crossed the Dockside Market.",
                ExtractionStrategy::Pattern,
            )
            .await
            .expect("run");

        assert_eq!(job.state, JobState::Completed);
        assert!(job.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_paid_strategy_without_provider_fails_fast() {
        let (_dir, orchestrator) = orchestrator(EngineConfig::default());

        let err = orchestrator
            .start_extraction("p", "s", "text", ExtractionStrategy::Semantic)
            .await
            .expect_err("no provider");
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let (_dir, orchestrator) = orchestrator(EngineConfig::default());
        let err = orchestrator
            .job(&JobId::new("job_ghost"))
            .await
            .expect_err("unknown");
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_batch_cap_and_cost_gate() {
        let config = EngineConfig::default()
            .with_batch_cap(500)
            .with_cost_threshold_usd(0.0);
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(crate::persistence::FileGraphStore::new(dir.path()));
        let provider = Arc::new(FixedProvider {
            response: r#"{"entities": []}"#.to_string(),
        });
        let orchestrator = JobOrchestrator::new(config, store, Some(provider));

        let scenes: Vec<SceneInput> = (0..600)
            .map(|i| SceneInput::new(format!("scene-{i}"), "Some scene text here."))
            .collect();

        let outcome = orchestrator
            .extract_project("novel-1", scenes, ExtractionStrategy::Semantic, false)
            .await
            .expect("batch request");

        match outcome {
            BatchOutcome::CostConfirmationRequired { estimate } => {
                // The cap applies before the estimate.
                assert_eq!(estimate.scene_count, 500);
                assert!(estimate.estimated_cost_usd > 0.0);
                assert!(estimate.estimated_input_tokens > 0);
            }
            BatchOutcome::Started { .. } => panic!("expected cost confirmation gate"),
        }
        // No jobs were created.
        assert!(orchestrator.jobs_for_project("novel-1").await.is_empty());
    }

    #[tokio::test]
    async fn test_configured_confidence_floor_filters_candidates() {
        let config = EngineConfig::default().with_min_confidence(0.95);
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(crate::persistence::FileGraphStore::new(dir.path()));
        let provider = Arc::new(FixedProvider {
            response: r#"{"entities": [
                {"name": "Sarah", "type": "character", "confidence": 0.97},
                {"name": "Alley", "type": "location", "confidence": 0.6}
            ]}"#
            .to_string(),
        });
        let orchestrator = JobOrchestrator::new(config, store, Some(provider));

        let job = orchestrator
            .run_to_completion(
                "novel-1",
                "scene-1",
                "Sarah slipped into the alley.",
                ExtractionStrategy::Semantic,
            )
            .await
            .expect("run");
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.entities_found, 1);

        let graph = orchestrator.graph("novel-1").await.expect("persisted");
        assert_eq!(graph.find_by_name("Sarah", false).len(), 1);
        assert!(graph.find_by_name("Alley", false).is_empty());
    }

    #[tokio::test]
    async fn test_batch_free_strategy_skips_cost_gate() {
        let config = EngineConfig::default()
            .with_batch_cap(3)
            .with_cost_threshold_usd(0.0);
        let (_dir, orchestrator) = orchestrator(config);

        let scenes: Vec<SceneInput> = (0..5)
            .map(|i| SceneInput::new(format!("scene-{i}"), "Mickey stood still."))
            .collect();

        let outcome = orchestrator
            .extract_project("novel-1", scenes, ExtractionStrategy::Pattern, false)
            .await
            .expect("batch request");

        match outcome {
            BatchOutcome::Started { job_ids, skipped } => {
                assert_eq!(job_ids.len(), 3);
                assert_eq!(skipped, 2);
                for job_id in &job_ids {
                    wait_terminal(&orchestrator, job_id).await;
                }
            }
            BatchOutcome::CostConfirmationRequired { .. } => {
                panic!("free strategy must not hit the cost gate")
            }
        }
    }

    #[tokio::test]
    async fn test_cancel_before_run_marks_cancelled() {
        // A tiny lock timeout is irrelevant here; we grab the project lock
        // ourselves so the job cannot start until we release it.
        let (_dir, orchestrator) = orchestrator(EngineConfig::default());
        let guard = orchestrator.project_lock("novel-1").await.expect("lock");

        let job_id = orchestrator
            .start_extraction("novel-1", "scene-1", "Mickey ran.", ExtractionStrategy::Pattern)
            .await
            .expect("submit");

        assert!(orchestrator.cancel(&job_id).await.expect("cancel"));
        drop(guard);

        let job = wait_terminal(&orchestrator, &job_id).await;
        assert_eq!(job.state, JobState::Cancelled);
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn test_cancel_terminal_job_returns_false() {
        let (_dir, orchestrator) = orchestrator(EngineConfig::default());
        let job_id = orchestrator
            .start_extraction("novel-1", "scene-1", "Mickey ran.", ExtractionStrategy::Pattern)
            .await
            .expect("submit");
        wait_terminal(&orchestrator, &job_id).await;

        assert!(!orchestrator.cancel(&job_id).await.expect("cancel"));
    }

    #[tokio::test]
    async fn test_job_timeout_fails_with_timeout_error() {
        struct StalledProvider;

        #[async_trait]
        impl LlmProvider for StalledProvider {
            fn name(&self) -> &'static str {
                "stalled"
            }

            async fn complete(&self, _system: &str, _user: &str) -> Result<LlmResponse> {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(LlmResponse {
                    text: "{}".to_string(),
                    usage: TokenUsage::default(),
                    model: "stalled".to_string(),
                })
            }
        }

        let config = EngineConfig::default().with_job_timeout_ms(20);
        let dir = tempfile::tempdir().expect("temp dir");
        let store = Arc::new(crate::persistence::FileGraphStore::new(dir.path()));
        let orchestrator = JobOrchestrator::new(config, store, Some(Arc::new(StalledProvider)));

        let job = orchestrator
            .run_to_completion("novel-1", "scene-1", "Mickey waited.", ExtractionStrategy::Semantic)
            .await
            .expect("submission succeeds");

        assert_eq!(job.state, JobState::Failed);
        let message = job.error.expect("failure message recorded");
        assert!(message.contains("timeout"), "got: {message}");
        assert!(message.contains("exceeded 20ms"), "got: {message}");
    }

    #[tokio::test]
    async fn test_lock_timeout_surfaces_concurrency_error() {
        let mut config = EngineConfig::default();
        config.extraction.lock_timeout_ms = 20;
        let (_dir, orchestrator) = orchestrator(config);

        let _guard = orchestrator.project_lock("novel-1").await.expect("lock");
        let err = orchestrator
            .add_entity(
                "novel-1",
                Entity::new("Mickey", crate::models::EntityType::Character),
            )
            .await
            .expect_err("lock held");
        assert!(matches!(err, Error::Concurrency { .. }));
    }

    #[tokio::test]
    async fn test_direct_crud_round_trip() {
        let (_dir, orchestrator) = orchestrator(EngineConfig::default());
        let mut events = orchestrator.notifier().subscribe();

        let entity = orchestrator
            .add_entity(
                "novel-1",
                Entity::new("Mickey", crate::models::EntityType::Character),
            )
            .await
            .expect("add");
        assert_eq!(entity.name, "Mickey");

        let event = events.recv().await.expect("event");
        assert_eq!(event.event_type(), "entity.added");

        let patch = EntityPatch {
            verified: Some(true),
            ..EntityPatch::default()
        };
        let updated = orchestrator
            .update_entity("novel-1", &entity.id, &patch)
            .await
            .expect("update");
        assert!(updated.verified);

        let cascaded = orchestrator
            .delete_entity("novel-1", &entity.id)
            .await
            .expect("delete");
        assert_eq!(cascaded, 0);

        // Mutating a never-seen project via update fails.
        let err = orchestrator
            .update_entity("ghost-project", &entity.id, &patch)
            .await
            .expect_err("missing project");
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_project() {
        let (_dir, orchestrator) = orchestrator(EngineConfig::default());

        assert!(!orchestrator.delete_project("novel-1").await.expect("delete"));

        orchestrator
            .add_entity(
                "novel-1",
                Entity::new("Mickey", crate::models::EntityType::Character),
            )
            .await
            .expect("add");
        assert!(orchestrator.delete_project("novel-1").await.expect("delete"));
        assert!(matches!(
            orchestrator.graph("novel-1").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_job_events_published() {
        let (_dir, orchestrator) = orchestrator(EngineConfig::default());
        let mut events = orchestrator.notifier().subscribe_event_type("job.state_changed");

        let job_id = orchestrator
            .start_extraction("novel-1", "scene-1", "Mickey ran.", ExtractionStrategy::Pattern)
            .await
            .expect("submit");
        wait_terminal(&orchestrator, &job_id).await;

        // Pending, Running, then a terminal state.
        let mut states = Vec::new();
        for _ in 0..3 {
            if let GraphEvent::JobStateChanged { state, .. } =
                events.recv().await.expect("event")
            {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![JobState::Pending, JobState::Running, JobState::Completed]
        );
    }
}
