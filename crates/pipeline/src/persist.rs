//! PersistenceWriter: replace the non-locked rows of a scope in one
//! snapshot, together with the phase update and the state event.
//!
//! Every write follows the same order: delete replaced rows and their
//! dependents, rewrite preserved rows' positions, insert the fresh rows,
//! insert mappings, then record the transition. Any failure aborts the
//! snapshot.

use std::collections::HashSet;

use goldi_storage::{
    AtomicComponentRecord, CoreProblemRecord, DataFlowRecord, DataFlowStepRecord,
    DatabaseColumnRecord, DatabaseRelationshipRecord, DatabaseTableRecord, DesignTokenRecord,
    Filter, GoldiStorage, PainPointRecord, PersonaRecord, ProjectRecord,
    SolutionPainPointMappingRecord, SolutionRecord, StateEventRecord, StorageError,
    TechStackRecord, UiComponentRecord, UiScreenRecord, UserStoryRecord,
};
use serde_json::json;
use tracing::{error, info, warn};

use crate::error::WorkflowError;
use crate::events::{record_transition, set_phase, EventKind, Phase};

#[derive(Debug, Clone)]
pub struct PersonaPlan {
    pub locked: Vec<PersonaRecord>,
    pub fresh: Vec<PersonaRecord>,
    /// Ids the run is about to delete, for failure diagnostics.
    pub replaced_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PainPointPlan {
    pub persona_id: String,
    pub locked: Vec<PainPointRecord>,
    pub fresh: Vec<PainPointRecord>,
    pub replaced_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SolutionPlan {
    pub persona_id: String,
    pub locked: Vec<SolutionRecord>,
    pub fresh: Vec<SolutionRecord>,
    pub mappings: Vec<SolutionPainPointMappingRecord>,
    pub replaced_ids: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UserStoryPlan {
    /// Edited stories kept from the prior run; their data flows stay too.
    pub preserved: Vec<UserStoryRecord>,
    pub fresh: Vec<UserStoryRecord>,
    pub data_flows: Vec<DataFlowRecord>,
    pub steps: Vec<DataFlowStepRecord>,
    pub replaced_ids: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ArchitecturePlan {
    pub tech_stack: Vec<TechStackRecord>,
    pub tables: Vec<DatabaseTableRecord>,
    pub columns: Vec<DatabaseColumnRecord>,
    pub relationships: Vec<DatabaseRelationshipRecord>,
    pub screens: Vec<UiScreenRecord>,
    pub components: Vec<UiComponentRecord>,
    pub tokens: Vec<DesignTokenRecord>,
    pub atomic_components: Vec<AtomicComponentRecord>,
}

#[derive(Debug, Clone)]
pub struct ProblemPlan {
    pub project: ProjectRecord,
    /// Whether `project` has to be inserted rather than updated.
    pub new_project: bool,
    pub core_problem: CoreProblemRecord,
}

pub struct PersistenceWriter<'a, S> {
    storage: &'a S,
}

impl<'a, S: GoldiStorage> PersistenceWriter<'a, S> {
    pub fn new(storage: &'a S) -> Self {
        Self { storage }
    }

    /// Commit on success, abort and log the intended change on failure.
    async fn finish<T>(
        &self,
        snapshot: S::Snapshot,
        result: Result<T, StorageError>,
        scope: &str,
        replaced_ids: &[String],
        inserting: usize,
    ) -> Result<T, WorkflowError> {
        match result {
            Ok(value) => match self.storage.commit_snapshot(snapshot).await {
                Ok(()) => {
                    info!(scope, deleted = replaced_ids.len(), inserted = inserting, "scope replaced");
                    Ok(value)
                }
                Err(e) => {
                    error!(scope, ?replaced_ids, inserting, error = %e, "commit failed");
                    Err(e.into())
                }
            },
            Err(e) => {
                error!(scope, ?replaced_ids, inserting, error = %e, "write failed, aborting snapshot");
                if let Err(abort_err) = self.storage.abort_snapshot(snapshot).await {
                    error!(scope, error = %abort_err, "abort failed");
                }
                Err(e.into())
            }
        }
    }

    pub async fn problem(&self, plan: ProblemPlan) -> Result<Option<StateEventRecord>, WorkflowError> {
        let mut snap = self.storage.begin_snapshot().await?;
        let result = self.write_problem(&mut snap, &plan).await;
        self.finish(snap, result, &format!("problem:{}", plan.project.id), &[], 1)
            .await
    }

    async fn write_problem(
        &self,
        snap: &mut S::Snapshot,
        plan: &ProblemPlan,
    ) -> Result<Option<StateEventRecord>, StorageError> {
        let s = self.storage;
        if plan.new_project {
            s.insert(snap, vec![plan.project.clone()]).await?;
        }
        // Earlier rejected inputs are superseded; a validated one never is.
        s.delete::<CoreProblemRecord>(
            snap,
            &Filter::new()
                .eq("project_id", plan.project.id.as_str())
                .eq("is_valid", false),
        )
        .await?;
        s.insert(snap, vec![plan.core_problem.clone()]).await?;

        if plan.core_problem.is_valid {
            let event = record_transition(
                s,
                snap,
                &plan.project,
                Phase::ProblemValidated,
                EventKind::ProblemValidated,
                json!({ "keyTermCount": plan.core_problem.key_terms.len() }),
            )
            .await?;
            Ok(Some(event))
        } else {
            set_phase(s, snap, &plan.project, Phase::ProblemInput).await?;
            Ok(None)
        }
    }

    pub async fn personas(
        &self,
        project: &ProjectRecord,
        plan: PersonaPlan,
    ) -> Result<StateEventRecord, WorkflowError> {
        let mut snap = self.storage.begin_snapshot().await?;
        let result = self.write_personas(&mut snap, project, &plan).await;
        self.finish(
            snap,
            result,
            &format!("personas:{}", project.id),
            &plan.replaced_ids,
            plan.fresh.len(),
        )
        .await
    }

    async fn write_personas(
        &self,
        snap: &mut S::Snapshot,
        project: &ProjectRecord,
        plan: &PersonaPlan,
    ) -> Result<StateEventRecord, StorageError> {
        let s = self.storage;
        let locked_ids: Vec<&str> = plan.locked.iter().map(|p| p.id.as_str()).collect();
        let deleted = s
            .delete::<PersonaRecord>(
                snap,
                &Filter::new()
                    .eq("project_id", project.id.as_str())
                    .not_in("id", locked_ids),
            )
            .await?;

        // A removed persona takes its pain points, solutions and their mappings.
        let pain_points = s
            .delete::<PainPointRecord>(snap, &Filter::new().is_in("persona_id", deleted.clone()))
            .await?;
        let solutions = s
            .delete::<SolutionRecord>(snap, &Filter::new().is_in("persona_id", deleted))
            .await?;
        s.delete::<SolutionPainPointMappingRecord>(
            snap,
            &Filter::new().is_in("solution_id", solutions.clone()),
        )
        .await?;
        s.delete::<SolutionPainPointMappingRecord>(
            snap,
            &Filter::new().is_in("pain_point_id", pain_points),
        )
        .await?;
        prune_story_solutions(s, snap, &project.id, &solutions).await?;

        for persona in &plan.locked {
            s.update(snap, persona.clone()).await?;
        }
        s.insert(snap, plan.fresh.clone()).await?;

        record_transition(
            s,
            snap,
            project,
            Phase::PersonaDiscovery,
            EventKind::PersonasGenerated,
            json!({
                "personaCount": plan.locked.len() + plan.fresh.len(),
                "lockedCount": plan.locked.len(),
            }),
        )
        .await
    }

    pub async fn pain_points(
        &self,
        project: &ProjectRecord,
        plan: PainPointPlan,
    ) -> Result<StateEventRecord, WorkflowError> {
        let mut snap = self.storage.begin_snapshot().await?;
        let result = self.write_pain_points(&mut snap, project, &plan).await;
        self.finish(
            snap,
            result,
            &format!("pain_points:{}", plan.persona_id),
            &plan.replaced_ids,
            plan.fresh.len(),
        )
        .await
    }

    async fn write_pain_points(
        &self,
        snap: &mut S::Snapshot,
        project: &ProjectRecord,
        plan: &PainPointPlan,
    ) -> Result<StateEventRecord, StorageError> {
        let s = self.storage;
        let locked_ids: Vec<&str> = plan.locked.iter().map(|p| p.id.as_str()).collect();
        let deleted = s
            .delete::<PainPointRecord>(
                snap,
                &Filter::new()
                    .eq("persona_id", plan.persona_id.as_str())
                    .not_in("id", locked_ids),
            )
            .await?;
        s.delete::<SolutionPainPointMappingRecord>(snap, &Filter::new().is_in("pain_point_id", deleted))
            .await?;

        for pain_point in &plan.locked {
            s.update(snap, pain_point.clone()).await?;
        }
        s.insert(snap, plan.fresh.clone()).await?;

        // The persona being worked on becomes the project's active one.
        let personas: Vec<PersonaRecord> = s
            .select_in(snap, &Filter::new().eq("project_id", project.id.as_str()))
            .await?;
        for mut persona in personas {
            let active = persona.id == plan.persona_id;
            if persona.is_active != active {
                persona.is_active = active;
                s.update(snap, persona).await?;
            }
        }

        record_transition(
            s,
            snap,
            project,
            Phase::PainPointDiscovery,
            EventKind::PainPointsGenerated,
            json!({
                "personaId": plan.persona_id,
                "painPointCount": plan.locked.len() + plan.fresh.len(),
                "lockedCount": plan.locked.len(),
            }),
        )
        .await
    }

    pub async fn solutions(
        &self,
        project: &ProjectRecord,
        plan: SolutionPlan,
    ) -> Result<StateEventRecord, WorkflowError> {
        let mut snap = self.storage.begin_snapshot().await?;
        let result = self.write_solutions(&mut snap, project, &plan).await;
        self.finish(
            snap,
            result,
            &format!("solutions:{}", plan.persona_id),
            &plan.replaced_ids,
            plan.fresh.len() + plan.mappings.len(),
        )
        .await
    }

    async fn write_solutions(
        &self,
        snap: &mut S::Snapshot,
        project: &ProjectRecord,
        plan: &SolutionPlan,
    ) -> Result<StateEventRecord, StorageError> {
        let s = self.storage;
        let locked_ids: Vec<&str> = plan.locked.iter().map(|p| p.id.as_str()).collect();
        let deleted = s
            .delete::<SolutionRecord>(
                snap,
                &Filter::new()
                    .eq("persona_id", plan.persona_id.as_str())
                    .not_in("id", locked_ids),
            )
            .await?;
        s.delete::<SolutionPainPointMappingRecord>(
            snap,
            &Filter::new().is_in("solution_id", deleted.clone()),
        )
        .await?;
        prune_story_solutions(s, snap, &project.id, &deleted).await?;

        // Pain points are re-read here; a mapping never outlives its pain point.
        let live: HashSet<String> = s
            .select_in::<PainPointRecord>(
                snap,
                &Filter::new().eq("persona_id", plan.persona_id.as_str()),
            )
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();
        let (mappings, stale): (Vec<_>, Vec<_>) = plan
            .mappings
            .iter()
            .cloned()
            .partition(|m| live.contains(&m.pain_point_id));
        if !stale.is_empty() {
            let missing: Vec<&str> = stale.iter().map(|m| m.pain_point_id.as_str()).collect();
            warn!(
                persona_id = %plan.persona_id,
                ?missing,
                "dropping mappings to pain points that no longer exist"
            );
        }

        for solution in &plan.locked {
            s.update(snap, solution.clone()).await?;
        }
        s.insert(snap, plan.fresh.clone()).await?;
        let mapping_count = mappings.len();
        s.insert(snap, mappings).await?;

        record_transition(
            s,
            snap,
            project,
            Phase::SolutionDiscovery,
            EventKind::SolutionsGenerated,
            json!({
                "personaId": plan.persona_id,
                "solutionCount": plan.locked.len() + plan.fresh.len(),
                "mappingCount": mapping_count,
                "lockedCount": plan.locked.len(),
            }),
        )
        .await
    }

    pub async fn user_stories(
        &self,
        project: &ProjectRecord,
        plan: UserStoryPlan,
    ) -> Result<StateEventRecord, WorkflowError> {
        let mut snap = self.storage.begin_snapshot().await?;
        let result = self.write_user_stories(&mut snap, project, &plan).await;
        self.finish(
            snap,
            result,
            &format!("user_stories:{}", project.id),
            &plan.replaced_ids,
            plan.fresh.len() + plan.data_flows.len() + plan.steps.len(),
        )
        .await
    }

    async fn write_user_stories(
        &self,
        snap: &mut S::Snapshot,
        project: &ProjectRecord,
        plan: &UserStoryPlan,
    ) -> Result<StateEventRecord, StorageError> {
        let s = self.storage;
        let preserved_ids: Vec<&str> = plan.preserved.iter().map(|p| p.id.as_str()).collect();
        let deleted = s
            .delete::<UserStoryRecord>(
                snap,
                &Filter::new()
                    .eq("project_id", project.id.as_str())
                    .not_in("id", preserved_ids),
            )
            .await?;
        let flows = s
            .delete::<DataFlowRecord>(snap, &Filter::new().is_in("user_story_id", deleted))
            .await?;
        s.delete::<DataFlowStepRecord>(snap, &Filter::new().is_in("data_flow_id", flows))
            .await?;

        let solutions: HashSet<String> = s
            .select_in::<SolutionRecord>(snap, &Filter::new().eq("project_id", project.id.as_str()))
            .await?
            .into_iter()
            .map(|sol| sol.id)
            .collect();
        let live_only = |story: &UserStoryRecord| {
            let mut story = story.clone();
            story.solution_ids.retain(|id| solutions.contains(id));
            story
        };

        for story in &plan.preserved {
            s.update(snap, live_only(story)).await?;
        }
        s.insert(snap, plan.fresh.iter().map(live_only).collect()).await?;
        s.insert(snap, plan.data_flows.clone()).await?;
        s.insert(snap, plan.steps.clone()).await?;

        record_transition(
            s,
            snap,
            project,
            Phase::UserStories,
            EventKind::UserStoriesGenerated,
            json!({
                "storyCount": plan.preserved.len() + plan.fresh.len(),
                "dataFlowCount": plan.data_flows.len(),
                "preservedCount": plan.preserved.len(),
            }),
        )
        .await
    }

    pub async fn architecture(
        &self,
        project: &ProjectRecord,
        plan: ArchitecturePlan,
    ) -> Result<StateEventRecord, WorkflowError> {
        let inserting = plan.tech_stack.len()
            + plan.tables.len()
            + plan.columns.len()
            + plan.relationships.len()
            + plan.screens.len()
            + plan.components.len()
            + plan.tokens.len()
            + plan.atomic_components.len();
        let mut snap = self.storage.begin_snapshot().await?;
        let result = self.write_architecture(&mut snap, project, plan).await;
        self.finish(
            snap,
            result,
            &format!("architecture:{}", project.id),
            &[],
            inserting,
        )
        .await
    }

    async fn write_architecture(
        &self,
        snap: &mut S::Snapshot,
        project: &ProjectRecord,
        plan: ArchitecturePlan,
    ) -> Result<StateEventRecord, StorageError> {
        let s = self.storage;
        let in_project = Filter::new().eq("project_id", project.id.as_str());

        s.delete::<TechStackRecord>(snap, &in_project).await?;
        let tables = s.delete::<DatabaseTableRecord>(snap, &in_project).await?;
        s.delete::<DatabaseColumnRecord>(snap, &Filter::new().is_in("table_id", tables))
            .await?;
        s.delete::<DatabaseRelationshipRecord>(snap, &in_project).await?;
        let screens = s.delete::<UiScreenRecord>(snap, &in_project).await?;
        s.delete::<UiComponentRecord>(snap, &Filter::new().is_in("screen_id", screens))
            .await?;
        s.delete::<DesignTokenRecord>(snap, &in_project).await?;
        s.delete::<AtomicComponentRecord>(snap, &in_project).await?;

        let data = json!({
            "techStackCount": plan.tech_stack.len(),
            "tableCount": plan.tables.len(),
            "screenCount": plan.screens.len(),
            "designTokenCount": plan.tokens.len(),
        });

        s.insert(snap, plan.tech_stack).await?;
        s.insert(snap, plan.tables).await?;
        s.insert(snap, plan.columns).await?;
        s.insert(snap, plan.relationships).await?;
        s.insert(snap, plan.screens).await?;
        s.insert(snap, plan.components).await?;
        s.insert(snap, plan.tokens).await?;
        s.insert(snap, plan.atomic_components).await?;

        record_transition(
            s,
            snap,
            project,
            Phase::ArchitectureComplete,
            EventKind::ArchitectureGenerated,
            data,
        )
        .await
    }
}

/// Remove deleted solution ids from the project's user stories.
async fn prune_story_solutions<S: GoldiStorage>(
    s: &S,
    snap: &mut S::Snapshot,
    project_id: &str,
    removed: &[String],
) -> Result<(), StorageError> {
    if removed.is_empty() {
        return Ok(());
    }
    let stories: Vec<UserStoryRecord> = s
        .select_in(snap, &Filter::new().eq("project_id", project_id))
        .await?;
    for mut story in stories {
        let before = story.solution_ids.len();
        story.solution_ids.retain(|id| !removed.contains(id));
        if story.solution_ids.len() != before {
            s.update(snap, story).await?;
        }
    }
    Ok(())
}
