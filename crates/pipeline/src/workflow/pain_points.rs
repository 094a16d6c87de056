use goldi_storage::{Filter, GoldiStorage, PainPointRecord};
use serde_json::json;
use tracing::info;

use super::{problem_text, PainPointsOutcome, PainPointsRequest, WorkflowRunner};
use crate::candidates::PainPointsEnvelope;
use crate::context::ContextLoader;
use crate::error::WorkflowError;
use crate::persist::{PainPointPlan, PersistenceWriter};
use crate::reconcile::{partition_locked, reconcile, Reconciliation};
use crate::stage::{fit_to_count, Stage};
use crate::{prompts, scope};

impl<S: GoldiStorage> WorkflowRunner<S> {
    /// Regenerate one persona's non-locked pain points and make that persona
    /// the project's active one.
    pub async fn generate_pain_points(
        &self,
        request: PainPointsRequest,
    ) -> Result<PainPointsOutcome, WorkflowError> {
        let project_id = request.project_id.clone();
        let input = json!({
            "projectId": request.project_id,
            "personaId": request.persona_id,
            "lockedPainPointIds": request.locked_pain_point_ids,
        });
        self.run(
            "pain_points",
            &project_id,
            scope::persona(&project_id, &request.persona_id),
            input,
            |out: &PainPointsOutcome| json!({ "painPointCount": out.pain_points.len() }),
            self.generate_pain_points_inner(request),
        )
        .await
    }

    async fn generate_pain_points_inner(
        &self,
        request: PainPointsRequest,
    ) -> Result<PainPointsOutcome, WorkflowError> {
        let storage = self.storage.as_ref();
        let ctx = ContextLoader::new(storage)
            .pain_points(&request.project_id, &request.persona_id)
            .await?;
        let problem = problem_text(&ctx.core_problem);

        let (locked, replaced) = partition_locked(ctx.existing, &request.locked_pain_point_ids);
        let n = self.config.pain_point_count.saturating_sub(locked.len());

        let candidates = if n == 0 {
            Vec::new()
        } else {
            let envelope: PainPointsEnvelope = self
                .generator
                .generate(
                    Stage::PainPoints,
                    prompts::pain_points(problem, &ctx.persona, &locked, n),
                )
                .await?;
            fit_to_count(Stage::PainPoints, envelope.pain_points, n)?
        };

        let Reconciliation { mut locked, fresh } = reconcile(locked, candidates);
        for pain_point in &mut locked {
            pain_point.is_locked = true;
        }
        let batch = crate::new_id();
        let fresh: Vec<PainPointRecord> = fresh
            .into_iter()
            .map(|(position, c)| PainPointRecord {
                id: crate::new_id(),
                project_id: ctx.project.id.clone(),
                persona_id: ctx.persona.id.clone(),
                description: c.description,
                severity: c.severity,
                impact_area: c.impact_area,
                position,
                is_locked: false,
                generation_batch: Some(batch.clone()),
            })
            .collect();

        PersistenceWriter::new(storage)
            .pain_points(
                &ctx.project,
                PainPointPlan {
                    persona_id: ctx.persona.id.clone(),
                    locked,
                    fresh,
                    replaced_ids: replaced.into_iter().map(|p| p.id).collect(),
                },
            )
            .await?;

        let pain_points: Vec<PainPointRecord> = storage
            .select(
                &Filter::new()
                    .eq("persona_id", request.persona_id.as_str())
                    .order_by("position"),
            )
            .await?;
        info!(pain_points = pain_points.len(), "pain points generated");
        Ok(PainPointsOutcome { pain_points })
    }
}
