//! Typed shapes of what the generation capability returns.
//!
//! Field names are camelCase on the wire. Index lists (`addressedPainPoints`,
//! `relatedSolutionIndices`) are zero-based positions into the upstream list
//! that was shown in the prompt.

use serde::Deserialize;
use serde_json::Value;

/// Post-parse validation of required content.
pub trait ShapeCheck {
    fn check(&self) -> Result<(), String>;
}

fn require(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("`{field}` must not be empty"))
    } else {
        Ok(())
    }
}

fn check_all<T: ShapeCheck>(list: &str, items: &[T]) -> Result<(), String> {
    for (i, item) in items.iter().enumerate() {
        item.check().map_err(|e| format!("{list}[{i}]: {e}"))?;
    }
    Ok(())
}

fn require_non_empty<T>(list: &str, items: &[T]) -> Result<(), String> {
    if items.is_empty() {
        Err(format!("`{list}` must not be empty"))
    } else {
        Ok(())
    }
}

// ── Problem validation ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemAnalysis {
    pub is_valid: bool,
    pub feedback: String,
    #[serde(default)]
    pub key_terms: Vec<String>,
    /// A tightened restatement of the problem; the raw input is used if absent.
    #[serde(default)]
    pub refined_problem: Option<String>,
}

impl ShapeCheck for ProblemAnalysis {
    fn check(&self) -> Result<(), String> {
        require("feedback", &self.feedback)
    }
}

// ── Personas ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaCandidate {
    pub name: String,
    pub industry: String,
    pub role: String,
    pub pain_degree: u8,
    #[serde(default)]
    pub description: String,
}

impl ShapeCheck for PersonaCandidate {
    fn check(&self) -> Result<(), String> {
        require("name", &self.name)?;
        require("industry", &self.industry)?;
        require("role", &self.role)?;
        if !(1..=5).contains(&self.pain_degree) {
            return Err(format!("`painDegree` must be 1..=5, got {}", self.pain_degree));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonasEnvelope {
    pub personas: Vec<PersonaCandidate>,
}

impl ShapeCheck for PersonasEnvelope {
    fn check(&self) -> Result<(), String> {
        check_all("personas", &self.personas)
    }
}

// ── Pain points ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PainPointCandidate {
    pub description: String,
    pub severity: String,
    #[serde(default)]
    pub impact_area: String,
}

impl ShapeCheck for PainPointCandidate {
    fn check(&self) -> Result<(), String> {
        require("description", &self.description)?;
        require("severity", &self.severity)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PainPointsEnvelope {
    pub pain_points: Vec<PainPointCandidate>,
}

impl ShapeCheck for PainPointsEnvelope {
    fn check(&self) -> Result<(), String> {
        check_all("painPoints", &self.pain_points)
    }
}

// ── Solutions ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolutionCandidate {
    pub title: String,
    pub description: String,
    pub solution_type: String,
    pub complexity: String,
    #[serde(default)]
    pub addressed_pain_points: Vec<usize>,
}

impl ShapeCheck for SolutionCandidate {
    fn check(&self) -> Result<(), String> {
        require("title", &self.title)?;
        require("description", &self.description)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolutionsEnvelope {
    pub solutions: Vec<SolutionCandidate>,
}

impl ShapeCheck for SolutionsEnvelope {
    fn check(&self) -> Result<(), String> {
        check_all("solutions", &self.solutions)
    }
}

// ── User stories and data flows ─────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStoryCandidate {
    pub title: String,
    pub as_a: String,
    pub i_want: String,
    pub so_that: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
    pub priority: String,
    #[serde(default)]
    pub complexity_points: u32,
    #[serde(default)]
    pub related_solution_indices: Vec<usize>,
}

impl ShapeCheck for UserStoryCandidate {
    fn check(&self) -> Result<(), String> {
        require("title", &self.title)?;
        require("asA", &self.as_a)?;
        require("iWant", &self.i_want)?;
        require("soThat", &self.so_that)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStoriesEnvelope {
    pub user_stories: Vec<UserStoryCandidate>,
}

impl ShapeCheck for UserStoriesEnvelope {
    fn check(&self) -> Result<(), String> {
        check_all("userStories", &self.user_stories)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFlowStepCandidate {
    #[serde(default)]
    pub step_number: Option<u32>,
    /// Falls back to `source` when the model omits it.
    #[serde(default)]
    pub actor: Option<String>,
    pub action: String,
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub data_payload: String,
}

impl ShapeCheck for DataFlowStepCandidate {
    fn check(&self) -> Result<(), String> {
        require("action", &self.action)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataFlowCandidate {
    pub description: String,
    pub steps: Vec<DataFlowStepCandidate>,
}

impl ShapeCheck for DataFlowCandidate {
    fn check(&self) -> Result<(), String> {
        require("description", &self.description)?;
        require_non_empty("steps", &self.steps)?;
        check_all("steps", &self.steps)
    }
}

// ── Architecture ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct TechStackCandidate {
    pub layer: String,
    pub technology: String,
    #[serde(default)]
    pub justification: String,
}

impl ShapeCheck for TechStackCandidate {
    fn check(&self) -> Result<(), String> {
        require("layer", &self.layer)?;
        require("technology", &self.technology)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TechStackEnvelope {
    pub tech_stack: Vec<TechStackCandidate>,
}

impl ShapeCheck for TechStackEnvelope {
    fn check(&self) -> Result<(), String> {
        require_non_empty("techStack", &self.tech_stack)?;
        check_all("techStack", &self.tech_stack)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnCandidate {
    pub column_name: String,
    pub data_type: String,
    #[serde(default)]
    pub is_primary_key: bool,
    #[serde(default)]
    pub is_foreign_key: bool,
    #[serde(default)]
    pub references_table: Option<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
}

impl ShapeCheck for ColumnCandidate {
    fn check(&self) -> Result<(), String> {
        require("columnName", &self.column_name)?;
        require("dataType", &self.data_type)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCandidate {
    pub table_name: String,
    pub columns: Vec<ColumnCandidate>,
}

impl ShapeCheck for TableCandidate {
    fn check(&self) -> Result<(), String> {
        require("tableName", &self.table_name)?;
        require_non_empty("columns", &self.columns)?;
        check_all("columns", &self.columns)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipCandidate {
    pub from_table: String,
    pub to_table: String,
    pub relationship_type: String,
}

impl ShapeCheck for RelationshipCandidate {
    fn check(&self) -> Result<(), String> {
        require("fromTable", &self.from_table)?;
        require("toTable", &self.to_table)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaCandidate {
    pub tables: Vec<TableCandidate>,
    #[serde(default)]
    pub relationships: Vec<RelationshipCandidate>,
}

impl ShapeCheck for SchemaCandidate {
    fn check(&self) -> Result<(), String> {
        require_non_empty("tables", &self.tables)?;
        check_all("tables", &self.tables)?;
        check_all("relationships", &self.relationships)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentCandidate {
    pub component_name: String,
    pub component_type: String,
    #[serde(default)]
    pub data_displayed: String,
    #[serde(default)]
    pub props: Value,
}

impl ShapeCheck for ComponentCandidate {
    fn check(&self) -> Result<(), String> {
        require("componentName", &self.component_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenCandidate {
    pub screen_name: String,
    #[serde(default)]
    pub description: String,
    pub route_path: String,
    #[serde(default)]
    pub components: Vec<ComponentCandidate>,
}

impl ShapeCheck for ScreenCandidate {
    fn check(&self) -> Result<(), String> {
        require("screenName", &self.screen_name)?;
        require("routePath", &self.route_path)?;
        check_all("components", &self.components)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScreensEnvelope {
    pub screens: Vec<ScreenCandidate>,
}

impl ShapeCheck for ScreensEnvelope {
    fn check(&self) -> Result<(), String> {
        require_non_empty("screens", &self.screens)?;
        check_all("screens", &self.screens)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignTokenCandidate {
    pub category: String,
    pub token_name: String,
    pub token_value: String,
}

impl ShapeCheck for DesignTokenCandidate {
    fn check(&self) -> Result<(), String> {
        require("tokenName", &self.token_name)?;
        require("tokenValue", &self.token_value)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtomicComponentCandidate {
    pub component_level: String,
    pub component_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub props: Value,
    #[serde(default)]
    pub composed_of: Vec<String>,
}

impl ShapeCheck for AtomicComponentCandidate {
    fn check(&self) -> Result<(), String> {
        require("componentLevel", &self.component_level)?;
        require("componentName", &self.component_name)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignSystemCandidate {
    pub design_tokens: Vec<DesignTokenCandidate>,
    #[serde(default)]
    pub atomic_components: Vec<AtomicComponentCandidate>,
}

impl ShapeCheck for DesignSystemCandidate {
    fn check(&self) -> Result<(), String> {
        require_non_empty("designTokens", &self.design_tokens)?;
        check_all("designTokens", &self.design_tokens)?;
        check_all("atomicComponents", &self.atomic_components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solution_indices_default_to_empty() {
        let env: SolutionsEnvelope = serde_json::from_str(
            r#"{"solutions":[{"title":"t","description":"d","solutionType":"Feature","complexity":"Low"}]}"#,
        )
        .unwrap();
        assert!(env.solutions[0].addressed_pain_points.is_empty());
        assert!(env.check().is_ok());
    }

    #[test]
    fn pain_degree_out_of_range_fails_check() {
        let env: PersonasEnvelope = serde_json::from_str(
            r#"{"personas":[{"name":"Ana","industry":"Retail","role":"Buyer","painDegree":9}]}"#,
        )
        .unwrap();
        let err = env.check().unwrap_err();
        assert!(err.starts_with("personas[0]"), "{err}");
    }

    #[test]
    fn data_flow_requires_steps() {
        let flow: DataFlowCandidate =
            serde_json::from_str(r#"{"description":"login","steps":[]}"#).unwrap();
        assert!(flow.check().is_err());
    }

    #[test]
    fn schema_nested_column_checked() {
        let schema: SchemaCandidate = serde_json::from_str(
            r#"{"tables":[{"tableName":"users","columns":[{"columnName":"","dataType":"UUID"}]}]}"#,
        )
        .unwrap();
        let err = schema.check().unwrap_err();
        assert!(err.contains("columns[0]"), "{err}");
    }

    #[test]
    fn user_story_missing_field_is_parse_error() {
        let parsed: Result<UserStoriesEnvelope, _> =
            serde_json::from_str(r#"{"userStories":[{"title":"t"}]}"#);
        assert!(parsed.is_err());
    }
}
