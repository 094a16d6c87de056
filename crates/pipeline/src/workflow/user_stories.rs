use std::collections::HashMap;

use goldi_storage::{
    DataFlowRecord, DataFlowStepRecord, Filter, GoldiStorage, SolutionRecord, UserStoryRecord,
};
use serde_json::json;
use tracing::{info, warn};

use super::{problem_text, ProjectRequest, UserStoriesOutcome, UserStoryWithFlow, WorkflowRunner};
use crate::candidates::{DataFlowCandidate, UserStoriesEnvelope, UserStoryCandidate};
use crate::context::ContextLoader;
use crate::coverage::{find_gaps, remap_to_full};
use crate::error::WorkflowError;
use crate::fanout::fan_out;
use crate::persist::{PersistenceWriter, UserStoryPlan};
use crate::reconcile::{partition_locked, reconcile, OrdinalResolver, Reconciliation};
use crate::stage::{clean_indices, fit_to_count, Stage};
use crate::{prompts, scope};

/// Selected-solution indices nothing covers yet.
fn coverage_gaps(
    solution_count: usize,
    stories: &[UserStoryCandidate],
    preserved: &[Vec<usize>],
) -> Vec<usize> {
    find_gaps(
        solution_count,
        stories
            .iter()
            .map(|s| s.related_solution_indices.as_slice())
            .chain(preserved.iter().map(Vec::as_slice)),
    )
}

fn flow_records(
    story_id: &str,
    flow: DataFlowCandidate,
) -> (DataFlowRecord, Vec<DataFlowStepRecord>) {
    let record = DataFlowRecord {
        id: crate::new_id(),
        user_story_id: story_id.to_string(),
        description: flow.description,
    };
    let steps = flow
        .steps
        .into_iter()
        .enumerate()
        .map(|(i, step)| DataFlowStepRecord {
            id: crate::new_id(),
            data_flow_id: record.id.clone(),
            sequence: step.step_number.unwrap_or(i as u32 + 1),
            actor: step.actor.unwrap_or_else(|| step.source.clone()),
            action: step.action,
            source: step.source,
            target: step.target,
            data_payload: step.data_payload,
        })
        .collect();
    (record, steps)
}

impl<S: GoldiStorage> WorkflowRunner<S> {
    /// Regenerate a project's user stories from its selected solutions.
    ///
    /// Edited stories survive. Every new story gets a data flow; selected
    /// solutions no story covers get one supplemental round of stories.
    pub async fn generate_user_stories(
        &self,
        request: ProjectRequest,
    ) -> Result<UserStoriesOutcome, WorkflowError> {
        let project_id = request.project_id.clone();
        self.run(
            "user_stories",
            &project_id,
            scope::user_stories(&project_id),
            json!({ "projectId": project_id }),
            |out: &UserStoriesOutcome| json!({ "storyCount": out.user_stories.len() }),
            self.generate_user_stories_inner(&project_id),
        )
        .await
    }

    /// One data flow per story, generated concurrently. Fails on the first
    /// failed call.
    fn data_flows<'a>(
        &'a self,
        stories: &'a [UserStoryCandidate],
    ) -> impl std::future::Future<Output = Result<Vec<DataFlowCandidate>, WorkflowError>> + Send + 'a
    {
        fan_out(stories, self.config.fanout_concurrency, |story| {
            let generator = self.generator.clone();
            let prompt = prompts::data_flow(&story.title, &story.as_a, &story.i_want, &story.so_that);
            async move { generator.generate(Stage::DataFlow, prompt).await }
        })
    }

    async fn generate_user_stories_inner(
        &self,
        project_id: &str,
    ) -> Result<UserStoriesOutcome, WorkflowError> {
        let storage = self.storage.as_ref();
        let ctx = ContextLoader::new(storage).user_stories(project_id).await?;
        let problem = problem_text(&ctx.core_problem);
        let solutions: &[SolutionRecord] = &ctx.selected_solutions;
        let resolver = OrdinalResolver::from_rows(solutions);

        let (preserved, replaced) = partition_locked(ctx.existing, &[]);
        let n = self.config.user_story_count.saturating_sub(preserved.len());

        let mut stories = if n == 0 {
            Vec::new()
        } else {
            let envelope: UserStoriesEnvelope = self
                .generator
                .generate(
                    Stage::UserStories,
                    prompts::user_stories(
                        problem,
                        ctx.persona.as_ref(),
                        solutions,
                        &ctx.pain_points_by_solution,
                        &preserved,
                        n,
                    ),
                )
                .await?;
            fit_to_count(Stage::UserStories, envelope.user_stories, n)?
        };
        for story in &mut stories {
            clean_indices(
                Stage::UserStories,
                &mut story.related_solution_indices,
                solutions.len(),
            );
        }
        let mut flows = self.data_flows(&stories).await?;

        let preserved_refs: Vec<Vec<usize>> = preserved
            .iter()
            .map(|s| {
                s.solution_ids
                    .iter()
                    .filter_map(|id| resolver.index_of(id))
                    .collect()
            })
            .collect();
        let gaps = coverage_gaps(solutions.len(), &stories, &preserved_refs);
        if !gaps.is_empty() {
            info!(gaps = gaps.len(), "selected solutions without a story, generating supplemental stories");
            let gapped: Vec<&SolutionRecord> = gaps.iter().filter_map(|&i| solutions.get(i)).collect();
            let envelope: UserStoriesEnvelope = self
                .generator
                .generate(
                    Stage::UserStoryCoverage,
                    prompts::user_story_coverage(problem, &gapped, gaps.len()),
                )
                .await?;
            let mut extra = fit_to_count(Stage::UserStoryCoverage, envelope.user_stories, gaps.len())?;
            for story in &mut extra {
                clean_indices(
                    Stage::UserStoryCoverage,
                    &mut story.related_solution_indices,
                    gaps.len(),
                );
                story.related_solution_indices = remap_to_full(&story.related_solution_indices, &gaps);
            }
            let extra_flows = self.data_flows(&extra).await?;
            stories.extend(extra);
            flows.extend(extra_flows);

            let remaining = coverage_gaps(solutions.len(), &stories, &preserved_refs);
            if !remaining.is_empty() {
                let ids = resolver.resolve_all(&remaining);
                warn!(solution_ids = ?ids, "selected solutions still lack a user story");
            }
        }

        let Reconciliation { locked, fresh } = reconcile(preserved, stories);
        let batch = crate::new_id();
        let mut records = Vec::with_capacity(fresh.len());
        let mut data_flows = Vec::with_capacity(fresh.len());
        let mut steps = Vec::new();
        for ((position, c), flow) in fresh.into_iter().zip(flows) {
            let story = UserStoryRecord {
                id: crate::new_id(),
                project_id: project_id.to_string(),
                title: c.title,
                as_a: c.as_a,
                i_want: c.i_want,
                so_that: c.so_that,
                acceptance_criteria: c.acceptance_criteria,
                priority: c.priority,
                complexity_points: c.complexity_points,
                position,
                is_edited: false,
                solution_ids: resolver.resolve_all(&c.related_solution_indices),
                generation_batch: Some(batch.clone()),
            };
            let (flow, flow_steps) = flow_records(&story.id, flow);
            data_flows.push(flow);
            steps.extend(flow_steps);
            records.push(story);
        }

        PersistenceWriter::new(storage)
            .user_stories(
                &ctx.project,
                UserStoryPlan {
                    preserved: locked,
                    fresh: records,
                    data_flows,
                    steps,
                    replaced_ids: replaced.into_iter().map(|s| s.id).collect(),
                },
            )
            .await?;

        let user_stories = self.load_user_stories(project_id).await?;
        info!(user_stories = user_stories.len(), "user stories generated");
        Ok(UserStoriesOutcome { user_stories })
    }

    /// A project's stories by position, each with its data flow and steps.
    async fn load_user_stories(&self, project_id: &str) -> Result<Vec<UserStoryWithFlow>, WorkflowError> {
        let storage = self.storage.as_ref();
        let stories: Vec<UserStoryRecord> = storage
            .select(&Filter::new().eq("project_id", project_id).order_by("position"))
            .await?;
        let story_ids: Vec<&str> = stories.iter().map(|s| s.id.as_str()).collect();
        let flows: Vec<DataFlowRecord> = storage
            .select(&Filter::new().is_in("user_story_id", story_ids))
            .await?;
        let flow_ids: Vec<&str> = flows.iter().map(|f| f.id.as_str()).collect();
        let all_steps: Vec<DataFlowStepRecord> = storage
            .select(&Filter::new().is_in("data_flow_id", flow_ids).order_by("sequence"))
            .await?;

        let mut flow_by_story: HashMap<String, DataFlowRecord> = flows
            .into_iter()
            .map(|f| (f.user_story_id.clone(), f))
            .collect();
        let mut steps_by_flow: HashMap<String, Vec<DataFlowStepRecord>> = HashMap::new();
        for step in all_steps {
            steps_by_flow
                .entry(step.data_flow_id.clone())
                .or_default()
                .push(step);
        }

        Ok(stories
            .into_iter()
            .map(|story| {
                let data_flow = flow_by_story.remove(&story.id);
                let steps = data_flow
                    .as_ref()
                    .and_then(|f| steps_by_flow.remove(&f.id))
                    .unwrap_or_default();
                UserStoryWithFlow {
                    story,
                    data_flow,
                    steps,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::DataFlowStepCandidate;

    #[test]
    fn steps_fall_back_to_source_and_ordinal() {
        let flow = DataFlowCandidate {
            description: "Submit form".into(),
            steps: vec![
                DataFlowStepCandidate {
                    step_number: None,
                    actor: None,
                    action: "submit".into(),
                    source: "Browser".into(),
                    target: "API".into(),
                    data_payload: "form".into(),
                },
                DataFlowStepCandidate {
                    step_number: Some(7),
                    actor: Some("Service".into()),
                    action: "store".into(),
                    source: "API".into(),
                    target: "DB".into(),
                    data_payload: String::new(),
                },
            ],
        };
        let (record, steps) = flow_records("us-1", flow);
        assert_eq!(record.user_story_id, "us-1");
        assert_eq!(steps[0].sequence, 1);
        assert_eq!(steps[0].actor, "Browser");
        assert_eq!(steps[1].sequence, 7);
        assert_eq!(steps[1].actor, "Service");
        assert!(steps.iter().all(|s| s.data_flow_id == record.id));
    }

    #[test]
    fn preserved_references_count_as_coverage() {
        let gaps = coverage_gaps(3, &[], &[vec![0, 2]]);
        assert_eq!(gaps, vec![1]);
    }
}
