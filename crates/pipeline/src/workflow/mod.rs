//! WorkflowRunner: the fixed linear pipelines.
//!
//! Every run goes through [`WorkflowRunner::run`], which claims the run's
//! scope, wraps the body in a tracing span, and writes the execution log
//! row whatever the outcome. The bodies live in one submodule per workflow.

mod architecture;
mod pain_points;
mod personas;
mod problem;
mod solutions;
mod user_stories;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use goldi_storage::{
    AtomicComponentRecord, CoreProblemRecord, DataFlowRecord, DataFlowStepRecord,
    DatabaseColumnRecord, DatabaseRelationshipRecord, DatabaseTableRecord, DesignTokenRecord,
    GoldiStorage, PainPointRecord, PersonaRecord, ProjectRecord, SolutionPainPointMappingRecord,
    SolutionRecord, TechStackRecord, UiComponentRecord, UiScreenRecord, UserStoryRecord,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, info_span, warn, Instrument};

use crate::config::PipelineConfig;
use crate::error::WorkflowError;
use crate::events::ExecutionLogger;
use crate::llm::LlmClient;
use crate::scope::ScopeLocks;
use crate::stage::Generator;

// ── Requests ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateProblemRequest {
    /// Creates a new project when absent or unknown.
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub project_name: Option<String>,
    pub problem_input: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonasRequest {
    pub project_id: String,
    #[serde(default)]
    pub locked_persona_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PainPointsRequest {
    pub project_id: String,
    pub persona_id: String,
    #[serde(default)]
    pub locked_pain_point_ids: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionsRequest {
    pub project_id: String,
    pub persona_id: String,
    #[serde(default)]
    pub locked_solution_ids: Vec<String>,
}

/// Body of the project-scoped workflows (user stories, architecture).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRequest {
    pub project_id: String,
}

// ── Outcomes ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemOutcome {
    pub project: ProjectRecord,
    pub core_problem: CoreProblemRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersonasOutcome {
    pub personas: Vec<PersonaRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PainPointsOutcome {
    pub pain_points: Vec<PainPointRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SolutionsOutcome {
    pub solutions: Vec<SolutionRecord>,
    pub mappings: Vec<SolutionPainPointMappingRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserStoryWithFlow {
    #[serde(flatten)]
    pub story: UserStoryRecord,
    #[serde(rename = "dataFlow")]
    pub data_flow: Option<DataFlowRecord>,
    pub steps: Vec<DataFlowStepRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStoriesOutcome {
    pub user_stories: Vec<UserStoryWithFlow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableWithColumns {
    #[serde(flatten)]
    pub table: DatabaseTableRecord,
    pub columns: Vec<DatabaseColumnRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseSchema {
    pub tables: Vec<TableWithColumns>,
    pub relationships: Vec<DatabaseRelationshipRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScreenWithComponents {
    #[serde(flatten)]
    pub screen: UiScreenRecord,
    pub components: Vec<UiComponentRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DesignSystem {
    pub tokens: Vec<DesignTokenRecord>,
    pub components: Vec<AtomicComponentRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchitectureOutcome {
    pub tech_stack: Vec<TechStackRecord>,
    pub database_schema: DatabaseSchema,
    pub ui_screens: Vec<ScreenWithComponents>,
    pub design_system: DesignSystem,
}

// ── Runner ──────────────────────────────────────────────────────────────────

/// Composes context loading, generation, reconciliation and persistence
/// into the six workflows. Cheap to clone; clones share storage and the
/// scope registry.
pub struct WorkflowRunner<S> {
    storage: Arc<S>,
    generator: Generator,
    config: PipelineConfig,
    scopes: ScopeLocks,
}

impl<S> Clone for WorkflowRunner<S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            generator: self.generator.clone(),
            config: self.config.clone(),
            scopes: self.scopes.clone(),
        }
    }
}

impl<S: GoldiStorage> WorkflowRunner<S> {
    pub fn new(storage: Arc<S>, client: Arc<dyn LlmClient>, config: PipelineConfig) -> Self {
        let generator = Generator::new(client, config.model.clone(), config.max_tokens);
        Self {
            storage,
            generator,
            config,
            scopes: ScopeLocks::new(),
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn scopes(&self) -> &ScopeLocks {
        &self.scopes
    }

    /// Run `body` under `scope`, then write the execution log row.
    ///
    /// `body` is not polled until the scope is claimed, so a busy scope
    /// rejects the run before any read or generation happens.
    async fn run<T, Fut>(
        &self,
        workflow: &'static str,
        project_id: &str,
        scope: String,
        input_state: Value,
        summarize: impl FnOnce(&T) -> Value,
        body: Fut,
    ) -> Result<T, WorkflowError>
    where
        Fut: Future<Output = Result<T, WorkflowError>>,
    {
        let span = info_span!("workflow", workflow, project_id);
        let started = Instant::now();
        let outcome = async {
            let _guard = self.scopes.try_acquire(scope)?;
            info!("run started");
            body.await
        }
        .instrument(span.clone())
        .await;

        let elapsed = started.elapsed();
        span.in_scope(|| match &outcome {
            Ok(_) => info!(elapsed_ms = elapsed.as_millis() as u64, "run finished"),
            Err(e) => warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                code = e.code(),
                error = %e,
                "run failed"
            ),
        });

        ExecutionLogger::new(self.storage.as_ref())
            .log(project_id, workflow, input_state, &outcome, summarize, elapsed)
            .await;
        outcome
    }
}

/// The problem statement prompts should use: the validated text when there
/// is one, the raw input otherwise.
fn problem_text(core_problem: &CoreProblemRecord) -> &str {
    core_problem
        .validated_problem
        .as_deref()
        .unwrap_or(&core_problem.original_input)
}
