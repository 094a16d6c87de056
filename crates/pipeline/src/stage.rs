//! Generation stages: one prompt in, typed candidates out.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::candidates::ShapeCheck;
use crate::error::WorkflowError;
use crate::llm::{CompletionRequest, LlmClient, Message};
use crate::prompts::Prompt;

/// Identifies one generation step of one workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ProblemValidation,
    Personas,
    PersonaDiversity,
    PainPoints,
    Solutions,
    SolutionCoverage,
    UserStories,
    UserStoryCoverage,
    DataFlow,
    TechStack,
    DatabaseSchema,
    UiScreens,
    DesignSystem,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::ProblemValidation => "problem_validation",
            Stage::Personas => "personas",
            Stage::PersonaDiversity => "persona_diversity",
            Stage::PainPoints => "pain_points",
            Stage::Solutions => "solutions",
            Stage::SolutionCoverage => "solution_coverage",
            Stage::UserStories => "user_stories",
            Stage::UserStoryCoverage => "user_story_coverage",
            Stage::DataFlow => "data_flow",
            Stage::TechStack => "tech_stack",
            Stage::DatabaseSchema => "database_schema",
            Stage::UiScreens => "ui_screens",
            Stage::DesignSystem => "design_system",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strip markdown code fences some models wrap around JSON.
pub fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();

    if let Some(stripped) = trimmed.strip_prefix("```json") {
        if let Some(inner) = stripped.strip_suffix("```") {
            return inner.trim();
        }
    }
    if let Some(stripped) = trimmed.strip_prefix("```") {
        if let Some(inner) = stripped.strip_suffix("```") {
            return inner.trim();
        }
    }
    trimmed
}

/// Parse a completion into `T` and run its shape checks.
pub fn parse_response<T>(stage: Stage, raw: &str) -> Result<T, WorkflowError>
where
    T: DeserializeOwned + ShapeCheck,
{
    let parsed: T = serde_json::from_str(strip_code_fences(raw))
        .map_err(|e| WorkflowError::malformed(stage, format!("invalid JSON: {e}")))?;
    parsed
        .check()
        .map_err(|message| WorkflowError::malformed(stage, message))?;
    Ok(parsed)
}

/// Fit a generated list to the requested count.
///
/// Extra items are truncated and a short list is accepted, both with a
/// warning. An empty list when `n > 0` is a malformed response.
pub fn fit_to_count<T>(stage: Stage, mut items: Vec<T>, n: usize) -> Result<Vec<T>, WorkflowError> {
    if n > 0 && items.is_empty() {
        return Err(WorkflowError::malformed(
            stage,
            format!("expected {n} items, got none"),
        ));
    }
    if items.len() > n {
        warn!(stage = %stage, requested = n, received = items.len(), "truncating surplus items");
        items.truncate(n);
    } else if items.len() < n {
        warn!(stage = %stage, requested = n, received = items.len(), "fewer items than requested");
    }
    Ok(items)
}

/// Drop index references outside `0..upper` and duplicates, keeping order.
pub fn clean_indices(stage: Stage, indices: &mut Vec<usize>, upper: usize) {
    let before = indices.len();
    let mut seen = std::collections::BTreeSet::new();
    indices.retain(|&i| i < upper && seen.insert(i));
    if indices.len() != before {
        warn!(
            stage = %stage,
            dropped = before - indices.len(),
            upper,
            "dropped out-of-range or repeated index references"
        );
    }
}

/// Calls the generation capability for one stage at a time.
#[derive(Clone)]
pub struct Generator {
    client: Arc<dyn LlmClient>,
    model: String,
    max_tokens: u32,
}

impl Generator {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens,
        }
    }

    /// Run one stage: send the prompt, parse and shape-check the answer.
    pub async fn generate<T>(&self, stage: Stage, prompt: Prompt) -> Result<T, WorkflowError>
    where
        T: DeserializeOwned + ShapeCheck,
    {
        debug!(stage = %stage, "calling generation capability");
        let request = CompletionRequest {
            stage,
            messages: vec![Message::system(prompt.system), Message::user(prompt.user)],
            model: self.model.clone(),
            max_tokens: self.max_tokens,
        };
        let raw = self
            .client
            .complete(request)
            .await
            .map_err(|e| WorkflowError::GenerationFailure {
                stage,
                message: e.to_string(),
            })?;
        parse_response(stage, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::SolutionsEnvelope;

    #[test]
    fn strips_json_fences() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n[]\n```"), "[]");
        assert_eq!(strip_code_fences("  {}  "), "{}");
    }

    #[test]
    fn stage_serializes_snake_case() {
        let json = serde_json::to_string(&Stage::UserStoryCoverage).unwrap();
        assert_eq!(json, "\"user_story_coverage\"");
        assert_eq!(Stage::DataFlow.to_string(), "data_flow");
    }

    #[test]
    fn parse_rejects_non_json() {
        let err = parse_response::<SolutionsEnvelope>(Stage::Solutions, "not json").unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::MalformedResponse {
                stage: Stage::Solutions,
                ..
            }
        ));
    }

    #[test]
    fn parse_runs_shape_checks() {
        let raw = r#"{"solutions":[{"title":"","description":"d","solutionType":"Feature","complexity":"Low"}]}"#;
        let err = parse_response::<SolutionsEnvelope>(Stage::Solutions, raw).unwrap_err();
        assert!(err.to_string().contains("title"), "{err}");
    }

    #[test]
    fn fit_truncates_and_accepts_short() {
        let items = fit_to_count(Stage::Personas, vec![1, 2, 3, 4], 2).unwrap();
        assert_eq!(items, vec![1, 2]);
        let items = fit_to_count(Stage::Personas, vec![1], 3).unwrap();
        assert_eq!(items, vec![1]);
    }

    #[test]
    fn fit_rejects_empty_when_items_expected() {
        assert!(fit_to_count::<u8>(Stage::Personas, vec![], 3).is_err());
        assert!(fit_to_count::<u8>(Stage::Personas, vec![], 0).is_ok());
    }

    #[test]
    fn clean_indices_drops_out_of_range_and_repeats() {
        let mut indices = vec![0, 7, 2, 2, 1];
        clean_indices(Stage::Solutions, &mut indices, 3);
        assert_eq!(indices, vec![0, 2, 1]);
    }
}
