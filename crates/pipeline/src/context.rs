//! ContextLoader: read the upstream rows a workflow needs, or fail with a
//! precondition code before anything is generated.

use std::collections::HashMap;

use goldi_storage::{
    CoreProblemRecord, Filter, GoldiStorage, PainPointRecord, PersonaRecord, ProjectRecord,
    SolutionPainPointMappingRecord, SolutionRecord, StorageError, UserStoryRecord,
};

use crate::error::WorkflowError;

pub const PROJECT_NOT_FOUND: &str = "PROJECT_NOT_FOUND";
pub const NO_VALIDATED_PROBLEM: &str = "NO_VALIDATED_PROBLEM";
pub const PERSONA_NOT_FOUND: &str = "PERSONA_NOT_FOUND";
pub const NO_PAIN_POINTS: &str = "NO_PAIN_POINTS";
pub const NO_SELECTED_SOLUTIONS: &str = "NO_SELECTED_SOLUTIONS";
pub const NO_USER_STORIES: &str = "NO_USER_STORIES";

#[derive(Debug, Clone)]
pub struct PersonaContext {
    pub project: ProjectRecord,
    pub core_problem: CoreProblemRecord,
    /// Current personas, by position.
    pub existing: Vec<PersonaRecord>,
}

#[derive(Debug, Clone)]
pub struct PainPointContext {
    pub project: ProjectRecord,
    pub persona: PersonaRecord,
    pub core_problem: CoreProblemRecord,
    pub existing: Vec<PainPointRecord>,
}

#[derive(Debug, Clone)]
pub struct SolutionContext {
    pub project: ProjectRecord,
    pub persona: PersonaRecord,
    pub core_problem: CoreProblemRecord,
    /// By position; prompt indices refer to this order.
    pub pain_points: Vec<PainPointRecord>,
    pub existing: Vec<SolutionRecord>,
}

#[derive(Debug, Clone)]
pub struct UserStoryContext {
    pub project: ProjectRecord,
    pub core_problem: CoreProblemRecord,
    /// Owner of the first selected solution.
    pub persona: Option<PersonaRecord>,
    /// By position; prompt indices refer to this order.
    pub selected_solutions: Vec<SolutionRecord>,
    /// Pain points each selected solution addresses, keyed by solution id.
    pub pain_points_by_solution: HashMap<String, Vec<PainPointRecord>>,
    pub existing: Vec<UserStoryRecord>,
}

#[derive(Debug, Clone)]
pub struct ArchitectureContext {
    pub project: ProjectRecord,
    pub core_problem: Option<CoreProblemRecord>,
    pub user_stories: Vec<UserStoryRecord>,
    pub selected_solutions: Vec<SolutionRecord>,
}

/// Pure reads against committed state.
pub struct ContextLoader<'a, S> {
    storage: &'a S,
}

impl<'a, S: GoldiStorage> ContextLoader<'a, S> {
    pub fn new(storage: &'a S) -> Self {
        Self { storage }
    }

    async fn project(&self, project_id: &str) -> Result<ProjectRecord, WorkflowError> {
        match self.storage.get::<ProjectRecord>(project_id).await {
            Ok(project) => Ok(project),
            Err(StorageError::RecordNotFound { .. }) => Err(WorkflowError::missing(
                PROJECT_NOT_FOUND,
                format!("project {project_id} does not exist"),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// The project's validated core problem, if any.
    pub async fn validated_problem(
        &self,
        project_id: &str,
    ) -> Result<Option<CoreProblemRecord>, WorkflowError> {
        let rows: Vec<CoreProblemRecord> = self
            .storage
            .select(&Filter::new().eq("project_id", project_id).eq("is_valid", true))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn require_problem(&self, project_id: &str) -> Result<CoreProblemRecord, WorkflowError> {
        self.validated_problem(project_id).await?.ok_or_else(|| {
            WorkflowError::missing(
                NO_VALIDATED_PROBLEM,
                format!("project {project_id} has no validated core problem"),
            )
        })
    }

    async fn persona(&self, project_id: &str, persona_id: &str) -> Result<PersonaRecord, WorkflowError> {
        let rows: Vec<PersonaRecord> = self
            .storage
            .select(&Filter::new().eq("id", persona_id).eq("project_id", project_id))
            .await?;
        rows.into_iter().next().ok_or_else(|| {
            WorkflowError::missing(
                PERSONA_NOT_FOUND,
                format!("persona {persona_id} not found in project {project_id}"),
            )
        })
    }

    pub async fn personas(&self, project_id: &str) -> Result<PersonaContext, WorkflowError> {
        let project = self.project(project_id).await?;
        let core_problem = self.require_problem(project_id).await?;
        let existing = self
            .storage
            .select(&Filter::new().eq("project_id", project_id).order_by("position"))
            .await?;
        Ok(PersonaContext {
            project,
            core_problem,
            existing,
        })
    }

    pub async fn pain_points(
        &self,
        project_id: &str,
        persona_id: &str,
    ) -> Result<PainPointContext, WorkflowError> {
        let project = self.project(project_id).await?;
        let persona = self.persona(project_id, persona_id).await?;
        let core_problem = self.require_problem(project_id).await?;
        let existing = self
            .storage
            .select(&Filter::new().eq("persona_id", persona_id).order_by("position"))
            .await?;
        Ok(PainPointContext {
            project,
            persona,
            core_problem,
            existing,
        })
    }

    pub async fn solutions(
        &self,
        project_id: &str,
        persona_id: &str,
    ) -> Result<SolutionContext, WorkflowError> {
        let project = self.project(project_id).await?;
        let persona = self.persona(project_id, persona_id).await?;
        let core_problem = self.require_problem(project_id).await?;
        let pain_points: Vec<PainPointRecord> = self
            .storage
            .select(&Filter::new().eq("persona_id", persona_id).order_by("position"))
            .await?;
        if pain_points.is_empty() {
            return Err(WorkflowError::missing(
                NO_PAIN_POINTS,
                format!("persona {persona_id} has no pain points"),
            ));
        }
        let existing = self
            .storage
            .select(&Filter::new().eq("persona_id", persona_id).order_by("position"))
            .await?;
        Ok(SolutionContext {
            project,
            persona,
            core_problem,
            pain_points,
            existing,
        })
    }

    async fn selected_solutions(&self, project_id: &str) -> Result<Vec<SolutionRecord>, WorkflowError> {
        let selected: Vec<SolutionRecord> = self
            .storage
            .select(
                &Filter::new()
                    .eq("project_id", project_id)
                    .eq("is_selected", true)
                    .order_by("position"),
            )
            .await?;
        if selected.is_empty() {
            return Err(WorkflowError::missing(
                NO_SELECTED_SOLUTIONS,
                format!("project {project_id} has no selected solutions"),
            ));
        }
        Ok(selected)
    }

    pub async fn user_stories(&self, project_id: &str) -> Result<UserStoryContext, WorkflowError> {
        let project = self.project(project_id).await?;
        let selected_solutions = self.selected_solutions(project_id).await?;
        let core_problem = self.require_problem(project_id).await?;

        let solution_ids: Vec<&str> = selected_solutions.iter().map(|s| s.id.as_str()).collect();
        let mappings: Vec<SolutionPainPointMappingRecord> = self
            .storage
            .select(&Filter::new().is_in("solution_id", solution_ids))
            .await?;
        let pain_point_ids: Vec<&str> = mappings.iter().map(|m| m.pain_point_id.as_str()).collect();
        let pain_points: Vec<PainPointRecord> = self
            .storage
            .select(&Filter::new().is_in("id", pain_point_ids).order_by("position"))
            .await?;
        let mut pain_points_by_solution: HashMap<String, Vec<PainPointRecord>> = HashMap::new();
        for mapping in &mappings {
            if let Some(pp) = pain_points.iter().find(|p| p.id == mapping.pain_point_id) {
                pain_points_by_solution
                    .entry(mapping.solution_id.clone())
                    .or_default()
                    .push(pp.clone());
            }
        }

        let persona = match selected_solutions.first() {
            Some(first) => self
                .storage
                .select::<PersonaRecord>(&Filter::new().eq("id", first.persona_id.as_str()))
                .await?
                .into_iter()
                .next(),
            None => None,
        };

        let existing = self
            .storage
            .select(&Filter::new().eq("project_id", project_id).order_by("position"))
            .await?;

        Ok(UserStoryContext {
            project,
            core_problem,
            persona,
            selected_solutions,
            pain_points_by_solution,
            existing,
        })
    }

    pub async fn architecture(&self, project_id: &str) -> Result<ArchitectureContext, WorkflowError> {
        let project = self.project(project_id).await?;
        let user_stories: Vec<UserStoryRecord> = self
            .storage
            .select(&Filter::new().eq("project_id", project_id).order_by("position"))
            .await?;
        if user_stories.is_empty() {
            return Err(WorkflowError::missing(
                NO_USER_STORIES,
                format!("project {project_id} has no user stories"),
            ));
        }
        let selected_solutions = self.selected_solutions(project_id).await?;
        let core_problem = self.validated_problem(project_id).await?;
        Ok(ArchitectureContext {
            project,
            core_problem,
            user_stories,
            selected_solutions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use goldi_storage::{InMemoryStorage, Record};

    async fn seed<R: Record>(storage: &InMemoryStorage, rows: Vec<R>) {
        let mut snap = storage.begin_snapshot().await.unwrap();
        storage.insert(&mut snap, rows).await.unwrap();
        storage.commit_snapshot(snap).await.unwrap();
    }

    fn project(id: &str) -> ProjectRecord {
        ProjectRecord {
            id: id.into(),
            name: "Clinic".into(),
            status: "problem_validated".into(),
            current_step: "problem_validated".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    fn problem(project_id: &str, is_valid: bool) -> CoreProblemRecord {
        CoreProblemRecord {
            id: format!("cp-{project_id}-{is_valid}"),
            project_id: project_id.into(),
            original_input: "double booking".into(),
            validated_problem: is_valid.then(|| "Clinics double-book".to_string()),
            is_valid,
            validation_feedback: "ok".into(),
            key_terms: vec![],
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    fn persona(id: &str, project_id: &str) -> PersonaRecord {
        PersonaRecord {
            id: id.into(),
            project_id: project_id.into(),
            core_problem_id: format!("cp-{project_id}-true"),
            name: "Nora".into(),
            industry: "Healthcare".into(),
            role: "Nurse".into(),
            description: "d".into(),
            pain_degree: 4,
            position: 0,
            is_locked: false,
            is_active: true,
            generation_batch: None,
        }
    }

    #[tokio::test]
    async fn missing_project_is_reported_first() {
        let storage = InMemoryStorage::new();
        let err = ContextLoader::new(&storage).personas("ghost").await.unwrap_err();
        assert_eq!(err.code(), PROJECT_NOT_FOUND);
    }

    #[tokio::test]
    async fn invalid_problem_does_not_count() {
        let storage = InMemoryStorage::new();
        seed(&storage, vec![project("p1")]).await;
        seed(&storage, vec![problem("p1", false)]).await;

        let loader = ContextLoader::new(&storage);
        assert!(loader.validated_problem("p1").await.unwrap().is_none());
        let err = loader.personas("p1").await.unwrap_err();
        assert_eq!(err.code(), NO_VALIDATED_PROBLEM);
    }

    #[tokio::test]
    async fn persona_must_belong_to_the_project() {
        let storage = InMemoryStorage::new();
        seed(&storage, vec![project("p1"), project("p2")]).await;
        seed(&storage, vec![problem("p1", true), problem("p2", true)]).await;
        seed(&storage, vec![persona("per-1", "p1")]).await;

        let loader = ContextLoader::new(&storage);
        let err = loader.pain_points("p2", "per-1").await.unwrap_err();
        assert_eq!(err.code(), PERSONA_NOT_FOUND);

        let ctx = loader.pain_points("p1", "per-1").await.unwrap();
        assert_eq!(ctx.persona.id, "per-1");
        assert!(ctx.existing.is_empty());

        let err = loader.solutions("p1", "per-1").await.unwrap_err();
        assert_eq!(err.code(), NO_PAIN_POINTS);
    }

    #[tokio::test]
    async fn user_stories_need_a_selection() {
        let storage = InMemoryStorage::new();
        seed(&storage, vec![project("p1")]).await;
        seed(&storage, vec![problem("p1", true)]).await;

        let err = ContextLoader::new(&storage).user_stories("p1").await.unwrap_err();
        assert_eq!(err.code(), NO_SELECTED_SOLUTIONS);
        assert_eq!(err.status(), 422);
    }
}
