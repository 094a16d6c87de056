use goldi_storage::{
    Filter, GoldiStorage, PainPointRecord, PersonaRecord, SolutionPainPointMappingRecord,
    SolutionRecord,
};
use serde_json::json;
use tracing::{info, warn};

use super::{problem_text, SolutionsOutcome, SolutionsRequest, WorkflowRunner};
use crate::candidates::{SolutionCandidate, SolutionsEnvelope};
use crate::context::ContextLoader;
use crate::coverage::find_gaps;
use crate::error::WorkflowError;
use crate::persist::{PersistenceWriter, SolutionPlan};
use crate::reconcile::{partition_locked, reconcile, OrdinalResolver, Reconciliation};
use crate::stage::{clean_indices, fit_to_count, Stage};
use crate::{prompts, scope};

impl<S: GoldiStorage> WorkflowRunner<S> {
    /// Regenerate one persona's non-locked solutions and rebuild their
    /// pain-point mappings.
    pub async fn generate_solutions(
        &self,
        request: SolutionsRequest,
    ) -> Result<SolutionsOutcome, WorkflowError> {
        let project_id = request.project_id.clone();
        let input = json!({
            "projectId": request.project_id,
            "personaId": request.persona_id,
            "lockedSolutionIds": request.locked_solution_ids,
        });
        self.run(
            "solutions",
            &project_id,
            scope::persona(&project_id, &request.persona_id),
            input,
            |out: &SolutionsOutcome| {
                json!({
                    "solutionCount": out.solutions.len(),
                    "mappingCount": out.mappings.len(),
                })
            },
            self.generate_solutions_inner(request),
        )
        .await
    }

    async fn generate_solutions_inner(
        &self,
        request: SolutionsRequest,
    ) -> Result<SolutionsOutcome, WorkflowError> {
        let storage = self.storage.as_ref();
        let ctx = ContextLoader::new(storage)
            .solutions(&request.project_id, &request.persona_id)
            .await?;
        let problem = problem_text(&ctx.core_problem);

        let (locked, replaced) = partition_locked(ctx.existing, &request.locked_solution_ids);
        let n = self.config.solution_count.saturating_sub(locked.len());

        let mut candidates = if n == 0 {
            Vec::new()
        } else {
            let envelope: SolutionsEnvelope = self
                .generator
                .generate(
                    Stage::Solutions,
                    prompts::solutions(problem, &ctx.persona, &ctx.pain_points, &locked, n),
                )
                .await?;
            fit_to_count(Stage::Solutions, envelope.solutions, n)?
        };
        for candidate in &mut candidates {
            clean_indices(
                Stage::Solutions,
                &mut candidate.addressed_pain_points,
                ctx.pain_points.len(),
            );
        }
        // Only a run that generated something owes the persona full coverage.
        if n > 0 {
            let extra = self
                .cover_pain_points(problem, &ctx.persona, &ctx.pain_points, &locked, &candidates)
                .await?;
            candidates.extend(extra);
        }

        let Reconciliation { mut locked, fresh } = reconcile(locked, candidates);
        for solution in &mut locked {
            solution.is_locked = true;
        }

        let pain_points = OrdinalResolver::from_rows(&ctx.pain_points);
        let batch = crate::new_id();
        let mut solutions = Vec::with_capacity(fresh.len());
        let mut mappings = Vec::new();
        for (position, c) in fresh {
            let solution = SolutionRecord {
                id: crate::new_id(),
                project_id: ctx.project.id.clone(),
                persona_id: ctx.persona.id.clone(),
                title: c.title,
                description: c.description,
                solution_type: c.solution_type,
                complexity: c.complexity,
                position,
                is_locked: false,
                is_selected: false,
                generation_batch: Some(batch.clone()),
            };
            for pain_point_id in pain_points.resolve_all(&c.addressed_pain_points) {
                mappings.push(SolutionPainPointMappingRecord {
                    id: crate::new_id(),
                    solution_id: solution.id.clone(),
                    pain_point_id,
                    relevance_score: self.config.relevance_score,
                });
            }
            solutions.push(solution);
        }

        PersistenceWriter::new(storage)
            .solutions(
                &ctx.project,
                SolutionPlan {
                    persona_id: ctx.persona.id.clone(),
                    locked,
                    fresh: solutions,
                    mappings,
                    replaced_ids: replaced.into_iter().map(|s| s.id).collect(),
                },
            )
            .await?;

        let solutions: Vec<SolutionRecord> = storage
            .select(
                &Filter::new()
                    .eq("persona_id", request.persona_id.as_str())
                    .order_by("position"),
            )
            .await?;
        let ids: Vec<&str> = solutions.iter().map(|s| s.id.as_str()).collect();
        let mappings: Vec<SolutionPainPointMappingRecord> = storage
            .select(&Filter::new().is_in("solution_id", ids))
            .await?;
        info!(
            solutions = solutions.len(),
            mappings = mappings.len(),
            "solutions generated"
        );
        Ok(SolutionsOutcome {
            solutions,
            mappings,
        })
    }

    /// One supplemental solution mapped to every pain point that neither the
    /// candidates nor the locked solutions address.
    async fn cover_pain_points(
        &self,
        problem: &str,
        persona: &PersonaRecord,
        pain_points: &[PainPointRecord],
        locked: &[SolutionRecord],
        candidates: &[SolutionCandidate],
    ) -> Result<Option<SolutionCandidate>, WorkflowError> {
        let resolver = OrdinalResolver::from_rows(pain_points);
        let locked_ids: Vec<&str> = locked.iter().map(|s| s.id.as_str()).collect();
        let locked_refs: Vec<usize> = if locked_ids.is_empty() {
            Vec::new()
        } else {
            self.storage
                .select::<SolutionPainPointMappingRecord>(
                    &Filter::new().is_in("solution_id", locked_ids),
                )
                .await?
                .iter()
                .filter_map(|m| resolver.index_of(&m.pain_point_id))
                .collect()
        };

        let gaps = find_gaps(
            pain_points.len(),
            candidates
                .iter()
                .map(|c| c.addressed_pain_points.as_slice())
                .chain(std::iter::once(locked_refs.as_slice())),
        );
        if gaps.is_empty() {
            return Ok(None);
        }
        info!(gaps = gaps.len(), "pain points without a solution, generating a supplemental one");

        let gapped: Vec<&PainPointRecord> = gaps.iter().filter_map(|&i| pain_points.get(i)).collect();
        let existing: Vec<&str> = locked
            .iter()
            .map(|s| s.title.as_str())
            .chain(candidates.iter().map(|c| c.title.as_str()))
            .collect();
        let envelope: SolutionsEnvelope = self
            .generator
            .generate(
                Stage::SolutionCoverage,
                prompts::solution_coverage(problem, persona, &gapped, &existing),
            )
            .await?;
        let mut extra = fit_to_count(Stage::SolutionCoverage, envelope.solutions, 1)?;
        let Some(mut supplemental) = extra.pop() else {
            return Ok(None);
        };
        supplemental.addressed_pain_points = gaps;
        warn!(
            pain_point_ids = ?resolver.resolve_all(&supplemental.addressed_pain_points),
            title = %supplemental.title,
            "added a supplemental solution for uncovered pain points"
        );
        Ok(Some(supplemental))
    }
}
