use goldi_storage::{Filter, GoldiStorage, PersonaRecord};
use serde_json::json;
use tracing::{info, warn};

use super::{problem_text, PersonasOutcome, PersonasRequest, WorkflowRunner};
use crate::candidates::{PersonaCandidate, PersonasEnvelope};
use crate::context::ContextLoader;
use crate::coverage::lacks_diversity;
use crate::error::WorkflowError;
use crate::persist::{PersistenceWriter, PersonaPlan};
use crate::reconcile::{partition_locked, reconcile, Reconciliation};
use crate::stage::{fit_to_count, Stage};
use crate::{prompts, scope};

fn is_uniform(locked: &[PersonaRecord], fresh: &[PersonaCandidate], target: usize) -> bool {
    let pairs = locked
        .iter()
        .map(|p| (p.industry.as_str(), p.role.as_str()))
        .chain(fresh.iter().map(|c| (c.industry.as_str(), c.role.as_str())));
    lacks_diversity(pairs, target)
}

impl<S: GoldiStorage> WorkflowRunner<S> {
    /// Regenerate a project's non-locked personas.
    pub async fn generate_personas(
        &self,
        request: PersonasRequest,
    ) -> Result<PersonasOutcome, WorkflowError> {
        let project_id = request.project_id.clone();
        let input = json!({
            "projectId": request.project_id,
            "lockedPersonaIds": request.locked_persona_ids,
        });
        self.run(
            "personas",
            &project_id,
            scope::personas(&project_id),
            input,
            |out: &PersonasOutcome| json!({ "personaCount": out.personas.len() }),
            self.generate_personas_inner(request),
        )
        .await
    }

    async fn generate_personas_inner(
        &self,
        request: PersonasRequest,
    ) -> Result<PersonasOutcome, WorkflowError> {
        let storage = self.storage.as_ref();
        let ctx = ContextLoader::new(storage).personas(&request.project_id).await?;
        let problem = problem_text(&ctx.core_problem);

        let (locked, replaced) = partition_locked(ctx.existing, &request.locked_persona_ids);
        let target = self.config.persona_count;
        let n = target.saturating_sub(locked.len());

        let mut candidates = Vec::new();
        if n > 0 {
            let envelope: PersonasEnvelope = self
                .generator
                .generate(Stage::Personas, prompts::personas(problem, &locked, n))
                .await?;
            candidates = fit_to_count(Stage::Personas, envelope.personas, n)?;

            if is_uniform(&locked, &candidates, target) {
                info!("persona set lacks variety, regenerating once");
                let envelope: PersonasEnvelope = self
                    .generator
                    .generate(
                        Stage::PersonaDiversity,
                        prompts::persona_diversity(problem, &locked, n),
                    )
                    .await?;
                candidates = fit_to_count(Stage::PersonaDiversity, envelope.personas, n)?;
                if is_uniform(&locked, &candidates, target) {
                    warn!("persona set still lacks variety after regeneration");
                }
            }
        }

        let Reconciliation { mut locked, fresh } = reconcile(locked, candidates);
        for persona in &mut locked {
            persona.is_locked = true;
        }
        let batch = crate::new_id();
        let fresh: Vec<PersonaRecord> = fresh
            .into_iter()
            .map(|(position, c)| PersonaRecord {
                id: crate::new_id(),
                project_id: ctx.project.id.clone(),
                core_problem_id: ctx.core_problem.id.clone(),
                name: c.name,
                industry: c.industry,
                role: c.role,
                description: c.description,
                pain_degree: c.pain_degree,
                position,
                is_locked: false,
                is_active: false,
                generation_batch: Some(batch.clone()),
            })
            .collect();

        PersistenceWriter::new(storage)
            .personas(
                &ctx.project,
                PersonaPlan {
                    locked,
                    fresh,
                    replaced_ids: replaced.into_iter().map(|p| p.id).collect(),
                },
            )
            .await?;

        let personas: Vec<PersonaRecord> = storage
            .select(
                &Filter::new()
                    .eq("project_id", request.project_id.as_str())
                    .order_by("position"),
            )
            .await?;
        info!(personas = personas.len(), "personas generated");
        Ok(PersonasOutcome { personas })
    }
}
