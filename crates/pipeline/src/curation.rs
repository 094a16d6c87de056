//! User-side writes that set the flags workflows consume: locked, selected
//! and edited. No generation and no state events.

use goldi_storage::{
    ExecutionLogRecord, Filter, GoldiStorage, PainPointRecord, PersonaRecord, SolutionRecord,
    StateEventRecord, StorageError, UserStoryRecord,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::WorkflowError;

pub const UNKNOWN_SOLUTION: &str = "UNKNOWN_SOLUTION";
pub const RECORD_NOT_FOUND: &str = "RECORD_NOT_FOUND";

/// Entities that carry a lock flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockTarget {
    Persona,
    PainPoint,
    Solution,
}

/// A partial user-story edit. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStoryPatch {
    pub title: Option<String>,
    pub as_a: Option<String>,
    pub i_want: Option<String>,
    pub so_that: Option<String>,
    pub acceptance_criteria: Option<Vec<String>>,
    pub priority: Option<String>,
    pub complexity_points: Option<u32>,
}

impl UserStoryPatch {
    fn apply(self, story: &mut UserStoryRecord) {
        if let Some(v) = self.title {
            story.title = v;
        }
        if let Some(v) = self.as_a {
            story.as_a = v;
        }
        if let Some(v) = self.i_want {
            story.i_want = v;
        }
        if let Some(v) = self.so_that {
            story.so_that = v;
        }
        if let Some(v) = self.acceptance_criteria {
            story.acceptance_criteria = v;
        }
        if let Some(v) = self.priority {
            story.priority = v;
        }
        if let Some(v) = self.complexity_points {
            story.complexity_points = v;
        }
        story.is_edited = true;
    }
}

fn not_found(e: StorageError) -> WorkflowError {
    match e {
        StorageError::RecordNotFound { table, id } => {
            WorkflowError::invalid(RECORD_NOT_FOUND, format!("no {table} row with id {id}"))
        }
        other => other.into(),
    }
}

/// Commit `result`'s snapshot on success, abort it otherwise.
async fn finish<S: GoldiStorage, T>(
    storage: &S,
    snapshot: S::Snapshot,
    result: Result<T, WorkflowError>,
) -> Result<T, WorkflowError> {
    match result {
        Ok(value) => {
            storage.commit_snapshot(snapshot).await?;
            Ok(value)
        }
        Err(e) => {
            storage.abort_snapshot(snapshot).await?;
            Err(e)
        }
    }
}

/// Set or clear the lock flag on one persona, pain point or solution.
pub async fn set_locked<S: GoldiStorage>(
    storage: &S,
    target: LockTarget,
    id: &str,
    locked: bool,
) -> Result<(), WorkflowError> {
    let mut snap = storage.begin_snapshot().await?;
    let result = async {
        match target {
            LockTarget::Persona => {
                let mut row = fetch::<S, PersonaRecord>(storage, &mut snap, id).await?;
                row.is_locked = locked;
                storage.update(&mut snap, row).await?;
            }
            LockTarget::PainPoint => {
                let mut row = fetch::<S, PainPointRecord>(storage, &mut snap, id).await?;
                row.is_locked = locked;
                storage.update(&mut snap, row).await?;
            }
            LockTarget::Solution => {
                let mut row = fetch::<S, SolutionRecord>(storage, &mut snap, id).await?;
                row.is_locked = locked;
                storage.update(&mut snap, row).await?;
            }
        }
        Ok::<_, WorkflowError>(())
    }
    .await;
    let out = finish(storage, snap, result).await;
    if out.is_ok() {
        info!(?target, id, locked, "lock flag updated");
    }
    out
}

async fn fetch<S, R>(storage: &S, snap: &mut S::Snapshot, id: &str) -> Result<R, WorkflowError>
where
    S: GoldiStorage,
    R: goldi_storage::Record,
{
    storage
        .select_in::<R>(snap, &Filter::new().eq("id", id))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| {
            not_found(StorageError::RecordNotFound {
                table: R::TABLE.as_str(),
                id: id.to_string(),
            })
        })
}

/// Make `solution_ids` the project's selected set, deselecting the rest.
/// Returns the project's solutions after the change, by persona then
/// position.
pub async fn select_solutions<S: GoldiStorage>(
    storage: &S,
    project_id: &str,
    solution_ids: &[String],
) -> Result<Vec<SolutionRecord>, WorkflowError> {
    let mut snap = storage.begin_snapshot().await?;
    let result = async {
        let solutions: Vec<SolutionRecord> = storage
            .select_in(&mut snap, &Filter::new().eq("project_id", project_id))
            .await?;
        let unknown: Vec<&str> = solution_ids
            .iter()
            .map(String::as_str)
            .filter(|id| !solutions.iter().any(|s| s.id == *id))
            .collect();
        if !unknown.is_empty() {
            return Err(WorkflowError::invalid(
                UNKNOWN_SOLUTION,
                format!("solutions not in project {project_id}: {}", unknown.join(", ")),
            ));
        }
        for mut solution in solutions {
            let selected = solution_ids.contains(&solution.id);
            if solution.is_selected != selected {
                solution.is_selected = selected;
                storage.update(&mut snap, solution).await?;
            }
        }
        Ok::<_, WorkflowError>(())
    }
    .await;
    finish(storage, snap, result).await?;
    info!(project_id, selected = solution_ids.len(), "solution selection updated");

    let mut solutions: Vec<SolutionRecord> = storage
        .select(&Filter::new().eq("project_id", project_id).order_by("position"))
        .await?;
    solutions.sort_by(|a, b| a.persona_id.cmp(&b.persona_id).then(a.position.cmp(&b.position)));
    Ok(solutions)
}

/// Apply a partial edit to a user story and mark it edited, so the next
/// user-story run keeps it.
pub async fn edit_user_story<S: GoldiStorage>(
    storage: &S,
    id: &str,
    patch: UserStoryPatch,
) -> Result<UserStoryRecord, WorkflowError> {
    let mut snap = storage.begin_snapshot().await?;
    let result = async {
        let mut story = fetch::<S, UserStoryRecord>(storage, &mut snap, id).await?;
        patch.apply(&mut story);
        storage.update(&mut snap, story.clone()).await?;
        Ok::<_, WorkflowError>(story)
    }
    .await;
    finish(storage, snap, result).await
}

/// A project's state events by sequence number.
pub async fn list_events<S: GoldiStorage>(
    storage: &S,
    project_id: &str,
) -> Result<Vec<StateEventRecord>, WorkflowError> {
    Ok(storage
        .select(&Filter::new().eq("project_id", project_id).order_by("sequence_number"))
        .await?)
}

/// A project's execution log rows, oldest first.
pub async fn list_executions<S: GoldiStorage>(
    storage: &S,
    project_id: &str,
) -> Result<Vec<ExecutionLogRecord>, WorkflowError> {
    Ok(storage
        .select(&Filter::new().eq("project_id", project_id).order_by("created_at"))
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use goldi_storage::InMemoryStorage;

    fn solution(id: &str, position: u32) -> SolutionRecord {
        SolutionRecord {
            id: id.into(),
            project_id: "proj-1".into(),
            persona_id: "per-1".into(),
            title: format!("Solution {id}"),
            description: "d".into(),
            solution_type: "feature".into(),
            complexity: "medium".into(),
            position,
            is_locked: false,
            is_selected: false,
            generation_batch: None,
        }
    }

    async fn seeded() -> InMemoryStorage {
        let storage = InMemoryStorage::new();
        let mut snap = storage.begin_snapshot().await.unwrap();
        storage
            .insert(&mut snap, vec![solution("s1", 0), solution("s2", 1), solution("s3", 2)])
            .await
            .unwrap();
        storage.commit_snapshot(snap).await.unwrap();
        storage
    }

    #[tokio::test]
    async fn lock_then_unlock() {
        let storage = seeded().await;
        set_locked(&storage, LockTarget::Solution, "s2", true).await.unwrap();
        assert!(storage.get::<SolutionRecord>("s2").await.unwrap().is_locked);
        set_locked(&storage, LockTarget::Solution, "s2", false).await.unwrap();
        assert!(!storage.get::<SolutionRecord>("s2").await.unwrap().is_locked);
    }

    #[tokio::test]
    async fn locking_missing_row_is_invalid() {
        let storage = seeded().await;
        let err = set_locked(&storage, LockTarget::Persona, "nope", true)
            .await
            .unwrap_err();
        assert_eq!(err.code(), RECORD_NOT_FOUND);
        assert_eq!(err.status(), 400);
    }

    #[tokio::test]
    async fn selection_replaces_previous_set() {
        let storage = seeded().await;
        select_solutions(&storage, "proj-1", &["s1".into(), "s3".into()])
            .await
            .unwrap();
        let out = select_solutions(&storage, "proj-1", &["s2".into()]).await.unwrap();
        let selected: Vec<&str> = out
            .iter()
            .filter(|s| s.is_selected)
            .map(|s| s.id.as_str())
            .collect();
        assert_eq!(selected, vec!["s2"]);
    }

    #[tokio::test]
    async fn unknown_solution_changes_nothing() {
        let storage = seeded().await;
        let err = select_solutions(&storage, "proj-1", &["s1".into(), "ghost".into()])
            .await
            .unwrap_err();
        assert_eq!(err.code(), UNKNOWN_SOLUTION);
        assert!(!storage.get::<SolutionRecord>("s1").await.unwrap().is_selected);
    }

    #[tokio::test]
    async fn edit_marks_story_edited() {
        let storage = InMemoryStorage::new();
        let mut snap = storage.begin_snapshot().await.unwrap();
        storage
            .insert(
                &mut snap,
                vec![UserStoryRecord {
                    id: "us-1".into(),
                    project_id: "proj-1".into(),
                    title: "Old".into(),
                    as_a: "planner".into(),
                    i_want: "x".into(),
                    so_that: "y".into(),
                    acceptance_criteria: vec![],
                    priority: "high".into(),
                    complexity_points: 3,
                    position: 0,
                    is_edited: false,
                    solution_ids: vec![],
                    generation_batch: None,
                }],
            )
            .await
            .unwrap();
        storage.commit_snapshot(snap).await.unwrap();

        let patch: UserStoryPatch =
            serde_json::from_value(serde_json::json!({"title": "New", "complexityPoints": 5}))
                .unwrap();
        let story = edit_user_story(&storage, "us-1", patch).await.unwrap();
        assert_eq!(story.title, "New");
        assert_eq!(story.complexity_points, 5);
        assert_eq!(story.as_a, "planner");
        assert!(story.is_edited);
    }
}
