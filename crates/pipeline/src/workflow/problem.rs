use goldi_storage::{CoreProblemRecord, GoldiStorage, ProjectRecord, StorageError};
use serde_json::json;
use tracing::info;

use super::{ProblemOutcome, ValidateProblemRequest, WorkflowRunner};
use crate::candidates::ProblemAnalysis;
use crate::context::ContextLoader;
use crate::error::WorkflowError;
use crate::events::{timestamp, Phase};
use crate::persist::{PersistenceWriter, ProblemPlan};
use crate::stage::Stage;
use crate::{prompts, scope};

pub const MISSING_INPUT: &str = "MISSING_INPUT";
pub const PROBLEM_ALREADY_VALIDATED: &str = "PROBLEM_ALREADY_VALIDATED";

const NAME_LIMIT: usize = 60;

/// Project name derived from the problem statement's first line.
fn derive_name(input: &str) -> String {
    let first = input.lines().next().unwrap_or_default().trim();
    if first.chars().count() <= NAME_LIMIT {
        return first.to_string();
    }
    let mut name: String = first.chars().take(NAME_LIMIT).collect();
    name.push_str("...");
    name
}

impl<S: GoldiStorage> WorkflowRunner<S> {
    /// Validate a raw problem statement, creating the project if needed.
    ///
    /// A project keeps at most one validated core problem; a second
    /// validation is a conflict. Rejected inputs replace one another.
    pub async fn validate_problem(
        &self,
        request: ValidateProblemRequest,
    ) -> Result<ProblemOutcome, WorkflowError> {
        let project_id = request.project_id.clone().unwrap_or_else(crate::new_id);
        let input = json!({
            "projectId": project_id,
            "problemInput": request.problem_input,
        });
        self.run(
            "problem_validation",
            &project_id,
            scope::problem(&project_id),
            input,
            |out: &ProblemOutcome| {
                json!({
                    "isValid": out.core_problem.is_valid,
                    "keyTerms": out.core_problem.key_terms.len(),
                })
            },
            self.validate_problem_inner(&project_id, request),
        )
        .await
    }

    async fn validate_problem_inner(
        &self,
        project_id: &str,
        request: ValidateProblemRequest,
    ) -> Result<ProblemOutcome, WorkflowError> {
        let storage = self.storage.as_ref();
        let text = request.problem_input.trim();
        if text.is_empty() {
            return Err(WorkflowError::invalid(
                MISSING_INPUT,
                "problemInput must not be blank",
            ));
        }

        if ContextLoader::new(storage)
            .validated_problem(project_id)
            .await?
            .is_some()
        {
            return Err(WorkflowError::Conflict {
                code: PROBLEM_ALREADY_VALIDATED,
                message: format!("project {project_id} already has a validated core problem"),
            });
        }

        let (project, new_project) = match storage.get::<ProjectRecord>(project_id).await {
            Ok(project) => (project, false),
            Err(StorageError::RecordNotFound { .. }) => {
                let phase = Phase::ProblemInput;
                let project = ProjectRecord {
                    id: project_id.to_string(),
                    name: request
                        .project_name
                        .clone()
                        .filter(|n| !n.trim().is_empty())
                        .unwrap_or_else(|| derive_name(text)),
                    status: phase.status().to_string(),
                    current_step: phase.current_step().to_string(),
                    created_at: timestamp(),
                };
                (project, true)
            }
            Err(e) => return Err(e.into()),
        };

        let analysis: ProblemAnalysis = self
            .generator
            .generate(Stage::ProblemValidation, prompts::problem_validation(text))
            .await?;

        let validated_problem = analysis.is_valid.then(|| {
            analysis
                .refined_problem
                .clone()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| text.to_string())
        });
        let core_problem = CoreProblemRecord {
            id: crate::new_id(),
            project_id: project_id.to_string(),
            original_input: text.to_string(),
            validated_problem,
            is_valid: analysis.is_valid,
            validation_feedback: analysis.feedback,
            key_terms: analysis.key_terms,
            created_at: timestamp(),
        };
        let core_problem_id = core_problem.id.clone();

        PersistenceWriter::new(storage)
            .problem(ProblemPlan {
                project,
                new_project,
                core_problem,
            })
            .await?;

        let project = storage.get::<ProjectRecord>(project_id).await?;
        let core_problem = storage.get::<CoreProblemRecord>(&core_problem_id).await?;
        info!(is_valid = core_problem.is_valid, "core problem recorded");
        Ok(ProblemOutcome {
            project,
            core_problem,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::derive_name;

    #[test]
    fn name_comes_from_first_line() {
        assert_eq!(derive_name("Clinics lose paperwork\nmore detail"), "Clinics lose paperwork");
        let long = "x".repeat(80);
        let name = derive_name(&long);
        assert!(name.ends_with("..."));
        assert_eq!(name.chars().count(), 63);
    }
}
