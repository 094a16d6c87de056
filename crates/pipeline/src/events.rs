//! EventRecorder and the execution log.
//!
//! [`record_transition`] is the only code that appends state events. It runs
//! inside the workflow's persistence snapshot, so the project phase, the
//! sequence counter and the event row commit together with the data.

use std::time::Duration;

use goldi_storage::{
    ExecutionLogRecord, GoldiStorage, ProjectRecord, StateEventRecord, StorageError,
};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::error::WorkflowError;

/// RFC 3339 timestamp of the current instant.
pub fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Audit event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    ProblemValidated,
    PersonasGenerated,
    PainPointsGenerated,
    SolutionsGenerated,
    UserStoriesGenerated,
    ArchitectureGenerated,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::ProblemValidated => "problem_validated",
            EventKind::PersonasGenerated => "personas_generated",
            EventKind::PainPointsGenerated => "pain_points_generated",
            EventKind::SolutionsGenerated => "solutions_generated",
            EventKind::UserStoriesGenerated => "user_stories_generated",
            EventKind::ArchitectureGenerated => "architecture_generated",
        }
    }
}

/// Project phase written after a workflow completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    ProblemInput,
    ProblemValidated,
    PersonaDiscovery,
    PainPointDiscovery,
    SolutionDiscovery,
    UserStories,
    ArchitectureComplete,
}

impl Phase {
    pub fn status(self) -> &'static str {
        match self {
            Phase::ProblemInput => "problem_input",
            Phase::ProblemValidated => "problem_validated",
            Phase::PersonaDiscovery => "persona_discovery",
            Phase::PainPointDiscovery => "pain_point_discovery",
            Phase::SolutionDiscovery => "solution_discovery",
            Phase::UserStories => "user_stories",
            Phase::ArchitectureComplete => "architecture_complete",
        }
    }

    pub fn current_step(self) -> &'static str {
        match self {
            Phase::ArchitectureComplete => "architecture",
            other => other.status(),
        }
    }
}

/// Set the project's phase. Idempotent.
pub async fn set_phase<S: GoldiStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    project: &ProjectRecord,
    phase: Phase,
) -> Result<(), StorageError> {
    let mut project = project.clone();
    project.status = phase.status().to_string();
    project.current_step = phase.current_step().to_string();
    storage.update(snapshot, project).await
}

/// Advance the project phase and append the next sequence-numbered event.
pub async fn record_transition<S: GoldiStorage>(
    storage: &S,
    snapshot: &mut S::Snapshot,
    project: &ProjectRecord,
    phase: Phase,
    kind: EventKind,
    data: Value,
) -> Result<StateEventRecord, StorageError> {
    set_phase(storage, snapshot, project, phase).await?;
    let sequence_number = storage.next_sequence_number(snapshot, &project.id).await?;
    let event = StateEventRecord {
        id: crate::new_id(),
        project_id: project.id.clone(),
        event_type: kind.as_str().to_string(),
        event_data: data,
        sequence_number,
        created_at: timestamp(),
    };
    storage.insert(snapshot, vec![event.clone()]).await?;
    debug!(
        project_id = %project.id,
        event = kind.as_str(),
        sequence_number,
        "state event recorded"
    );
    Ok(event)
}

/// One diagnostic row per workflow run.
pub struct ExecutionLogger<'a, S> {
    storage: &'a S,
}

impl<'a, S: GoldiStorage> ExecutionLogger<'a, S> {
    pub fn new(storage: &'a S) -> Self {
        Self { storage }
    }

    /// Write the run's log row in its own snapshot. Failures are logged and
    /// swallowed; they never change the run's outcome.
    pub async fn log<T>(
        &self,
        project_id: &str,
        workflow: &str,
        input_state: Value,
        outcome: &Result<T, WorkflowError>,
        output_state: impl FnOnce(&T) -> Value,
        elapsed: Duration,
    ) {
        let (status, output_state, error_message) = match outcome {
            Ok(out) => ("success", Some(output_state(out)), None),
            Err(e) => ("error", None, Some(e.to_string())),
        };
        let record = ExecutionLogRecord {
            id: crate::new_id(),
            project_id: project_id.to_string(),
            workflow: workflow.to_string(),
            input_state,
            output_state,
            status: status.to_string(),
            error_message,
            execution_time_ms: elapsed.as_millis() as u64,
            created_at: timestamp(),
        };
        if let Err(e) = self.write(record).await {
            warn!(project_id, workflow, error = %e, "failed to write execution log");
        }
    }

    async fn write(&self, record: ExecutionLogRecord) -> Result<(), StorageError> {
        let mut snap = self.storage.begin_snapshot().await?;
        if let Err(e) = self.storage.insert(&mut snap, vec![record]).await {
            if let Err(abort_err) = self.storage.abort_snapshot(snap).await {
                warn!(error = %abort_err, "execution log abort failed");
            }
            return Err(e);
        }
        self.storage.commit_snapshot(snap).await
    }
}
