use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Every table the pipeline reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    Projects,
    CoreProblems,
    Personas,
    PainPoints,
    Solutions,
    SolutionPainPointMappings,
    UserStories,
    DataFlows,
    DataFlowSteps,
    TechStack,
    DatabaseTables,
    DatabaseColumns,
    DatabaseRelationships,
    UiScreens,
    UiComponents,
    DesignTokens,
    AtomicComponents,
    StateEvents,
    ExecutionLogs,
}

impl Table {
    pub fn as_str(self) -> &'static str {
        match self {
            Table::Projects => "projects",
            Table::CoreProblems => "core_problems",
            Table::Personas => "personas",
            Table::PainPoints => "pain_points",
            Table::Solutions => "key_solutions",
            Table::SolutionPainPointMappings => "solution_pain_point_mappings",
            Table::UserStories => "user_stories",
            Table::DataFlows => "data_flows",
            Table::DataFlowSteps => "data_flow_steps",
            Table::TechStack => "system_architecture",
            Table::DatabaseTables => "database_tables",
            Table::DatabaseColumns => "database_columns",
            Table::DatabaseRelationships => "database_relationships",
            Table::UiScreens => "ui_screens",
            Table::UiComponents => "ui_components",
            Table::DesignTokens => "design_tokens",
            Table::AtomicComponents => "atomic_components",
            Table::StateEvents => "state_events",
            Table::ExecutionLogs => "execution_logs",
        }
    }
}

/// A row type stored in one table.
///
/// Rows are addressed by their string `id`. Column names used in a
/// [`Filter`](crate::Filter) are the serde field names of the record.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TABLE: Table;

    /// Append-only tables reject `update` and `delete`.
    const APPEND_ONLY: bool = false;

    fn id(&self) -> &str;
}

macro_rules! impl_record {
    ($ty:ty, $table:expr) => {
        impl Record for $ty {
            const TABLE: Table = $table;

            fn id(&self) -> &str {
                &self.id
            }
        }
    };
}

/// A project and its workflow phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub name: String,
    pub status: String,
    pub current_step: String,
    /// RFC 3339 timestamp string.
    pub created_at: String,
}

/// The problem statement a project is built around.
///
/// `validated_problem` is only set when the input passed validation. Once a
/// project has a validated core problem it is never replaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreProblemRecord {
    pub id: String,
    pub project_id: String,
    pub original_input: String,
    pub validated_problem: Option<String>,
    pub is_valid: bool,
    pub validation_feedback: String,
    pub key_terms: Vec<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaRecord {
    pub id: String,
    pub project_id: String,
    pub core_problem_id: String,
    pub name: String,
    pub industry: String,
    pub role: String,
    pub description: String,
    /// 1 (barely affected) to 5 (severely affected).
    pub pain_degree: u8,
    pub position: u32,
    pub is_locked: bool,
    pub is_active: bool,
    pub generation_batch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PainPointRecord {
    pub id: String,
    pub project_id: String,
    pub persona_id: String,
    pub description: String,
    pub severity: String,
    pub impact_area: String,
    pub position: u32,
    pub is_locked: bool,
    pub generation_batch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionRecord {
    pub id: String,
    pub project_id: String,
    pub persona_id: String,
    pub title: String,
    pub description: String,
    pub solution_type: String,
    pub complexity: String,
    pub position: u32,
    pub is_locked: bool,
    pub is_selected: bool,
    /// Tag shared by every row produced in the same workflow run.
    pub generation_batch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolutionPainPointMappingRecord {
    pub id: String,
    pub solution_id: String,
    pub pain_point_id: String,
    /// In `[0, 1]`.
    pub relevance_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStoryRecord {
    pub id: String,
    pub project_id: String,
    pub title: String,
    pub as_a: String,
    pub i_want: String,
    pub so_that: String,
    pub acceptance_criteria: Vec<String>,
    pub priority: String,
    pub complexity_points: u32,
    pub position: u32,
    /// Set once a human changes generated content.
    pub is_edited: bool,
    /// Selected solutions this story implements.
    pub solution_ids: Vec<String>,
    pub generation_batch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFlowRecord {
    pub id: String,
    pub user_story_id: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFlowStepRecord {
    pub id: String,
    pub data_flow_id: String,
    /// 1-based order within the flow.
    pub sequence: u32,
    pub actor: String,
    pub action: String,
    pub source: String,
    pub target: String,
    pub data_payload: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechStackRecord {
    pub id: String,
    pub project_id: String,
    pub layer: String,
    pub technology: String,
    pub justification: String,
    pub version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseTableRecord {
    pub id: String,
    pub project_id: String,
    pub table_name: String,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseColumnRecord {
    pub id: String,
    pub table_id: String,
    pub column_name: String,
    pub data_type: String,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub references_table: Option<String>,
    pub constraints: Vec<String>,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseRelationshipRecord {
    pub id: String,
    pub project_id: String,
    pub from_table: String,
    pub to_table: String,
    pub relationship_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiScreenRecord {
    pub id: String,
    pub project_id: String,
    pub screen_name: String,
    pub description: String,
    pub route_path: String,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiComponentRecord {
    pub id: String,
    pub screen_id: String,
    pub component_name: String,
    pub component_type: String,
    pub data_displayed: String,
    pub props: serde_json::Value,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignTokenRecord {
    pub id: String,
    pub project_id: String,
    pub category: String,
    pub token_name: String,
    pub token_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicComponentRecord {
    pub id: String,
    pub project_id: String,
    pub component_level: String,
    pub component_name: String,
    pub description: String,
    pub props: serde_json::Value,
    pub composed_of: Vec<String>,
}

/// An append-only audit record of a completed workflow.
///
/// `sequence_number` is strictly increasing per project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEventRecord {
    pub id: String,
    pub project_id: String,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub sequence_number: i64,
    pub created_at: String,
}

/// Diagnostic record of one workflow run. Not read by any workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogRecord {
    pub id: String,
    pub project_id: String,
    pub workflow: String,
    pub input_state: serde_json::Value,
    pub output_state: Option<serde_json::Value>,
    pub status: String,
    pub error_message: Option<String>,
    pub execution_time_ms: u64,
    pub created_at: String,
}

impl_record!(ProjectRecord, Table::Projects);
impl_record!(CoreProblemRecord, Table::CoreProblems);
impl_record!(PersonaRecord, Table::Personas);
impl_record!(PainPointRecord, Table::PainPoints);
impl_record!(SolutionRecord, Table::Solutions);
impl_record!(
    SolutionPainPointMappingRecord,
    Table::SolutionPainPointMappings
);
impl_record!(UserStoryRecord, Table::UserStories);
impl_record!(DataFlowRecord, Table::DataFlows);
impl_record!(DataFlowStepRecord, Table::DataFlowSteps);
impl_record!(TechStackRecord, Table::TechStack);
impl_record!(DatabaseTableRecord, Table::DatabaseTables);
impl_record!(DatabaseColumnRecord, Table::DatabaseColumns);
impl_record!(DatabaseRelationshipRecord, Table::DatabaseRelationships);
impl_record!(UiScreenRecord, Table::UiScreens);
impl_record!(UiComponentRecord, Table::UiComponents);
impl_record!(DesignTokenRecord, Table::DesignTokens);
impl_record!(AtomicComponentRecord, Table::AtomicComponents);
impl_record!(ExecutionLogRecord, Table::ExecutionLogs);

impl Record for StateEventRecord {
    const TABLE: Table = Table::StateEvents;
    const APPEND_ONLY: bool = true;

    fn id(&self) -> &str {
        &self.id
    }
}
