use std::collections::HashMap;

use goldi_storage::{
    AtomicComponentRecord, DatabaseColumnRecord, DatabaseRelationshipRecord, DatabaseTableRecord,
    DesignTokenRecord, Filter, GoldiStorage, TechStackRecord, UiComponentRecord, UiScreenRecord,
};
use serde_json::json;
use tracing::info;

use super::{
    problem_text, ArchitectureOutcome, DatabaseSchema, DesignSystem, ProjectRequest,
    ScreenWithComponents, TableWithColumns, WorkflowRunner,
};
use crate::candidates::{
    DesignSystemCandidate, SchemaCandidate, ScreensEnvelope, TechStackEnvelope,
};
use crate::context::ContextLoader;
use crate::error::WorkflowError;
use crate::persist::{ArchitecturePlan, PersistenceWriter};
use crate::stage::Stage;
use crate::{prompts, scope};

impl<S: GoldiStorage> WorkflowRunner<S> {
    /// Replace a project's architecture sketch: tech stack, database schema,
    /// UI screens and design system, each generated from the previous one.
    pub async fn generate_architecture(
        &self,
        request: ProjectRequest,
    ) -> Result<ArchitectureOutcome, WorkflowError> {
        let project_id = request.project_id.clone();
        self.run(
            "architecture",
            &project_id,
            scope::architecture(&project_id),
            json!({ "projectId": project_id }),
            |out: &ArchitectureOutcome| {
                json!({
                    "techStackCount": out.tech_stack.len(),
                    "tableCount": out.database_schema.tables.len(),
                    "screenCount": out.ui_screens.len(),
                    "designTokenCount": out.design_system.tokens.len(),
                })
            },
            self.generate_architecture_inner(&project_id),
        )
        .await
    }

    async fn generate_architecture_inner(
        &self,
        project_id: &str,
    ) -> Result<ArchitectureOutcome, WorkflowError> {
        let storage = self.storage.as_ref();
        let ctx = ContextLoader::new(storage).architecture(project_id).await?;
        let problem = ctx.core_problem.as_ref().map(problem_text).unwrap_or_default();

        let stack: TechStackEnvelope = self
            .generator
            .generate(
                Stage::TechStack,
                prompts::tech_stack(problem, &ctx.user_stories, &ctx.selected_solutions),
            )
            .await?;
        let schema: SchemaCandidate = self
            .generator
            .generate(
                Stage::DatabaseSchema,
                prompts::database_schema(&ctx.user_stories, &stack.tech_stack),
            )
            .await?;
        let screens: ScreensEnvelope = self
            .generator
            .generate(
                Stage::UiScreens,
                prompts::ui_screens(&ctx.user_stories, &stack.tech_stack, &schema),
            )
            .await?;
        let design: DesignSystemCandidate = self
            .generator
            .generate(Stage::DesignSystem, prompts::design_system(&screens.screens))
            .await?;

        let prior: Vec<TechStackRecord> = storage
            .select(&Filter::new().eq("project_id", project_id))
            .await?;
        let version = prior.iter().map(|t| t.version).max().unwrap_or(0) + 1;

        let plan = build_plan(project_id, version, stack, schema, screens, design);
        PersistenceWriter::new(storage)
            .architecture(&ctx.project, plan)
            .await?;

        let outcome = self.load_architecture(project_id).await?;
        info!(
            tech_stack = outcome.tech_stack.len(),
            tables = outcome.database_schema.tables.len(),
            screens = outcome.ui_screens.len(),
            version,
            "architecture generated"
        );
        Ok(outcome)
    }

    async fn load_architecture(&self, project_id: &str) -> Result<ArchitectureOutcome, WorkflowError> {
        let storage = self.storage.as_ref();
        let in_project = Filter::new().eq("project_id", project_id);

        let tech_stack: Vec<TechStackRecord> = storage.select(&in_project).await?;

        let tables: Vec<DatabaseTableRecord> =
            storage.select(&in_project.clone().order_by("position")).await?;
        let table_ids: Vec<&str> = tables.iter().map(|t| t.id.as_str()).collect();
        let columns: Vec<DatabaseColumnRecord> = storage
            .select(&Filter::new().is_in("table_id", table_ids).order_by("position"))
            .await?;
        let mut columns_by_table: HashMap<String, Vec<DatabaseColumnRecord>> = HashMap::new();
        for column in columns {
            columns_by_table
                .entry(column.table_id.clone())
                .or_default()
                .push(column);
        }
        let relationships: Vec<DatabaseRelationshipRecord> = storage.select(&in_project).await?;

        let screens: Vec<UiScreenRecord> =
            storage.select(&in_project.clone().order_by("position")).await?;
        let screen_ids: Vec<&str> = screens.iter().map(|s| s.id.as_str()).collect();
        let components: Vec<UiComponentRecord> = storage
            .select(&Filter::new().is_in("screen_id", screen_ids).order_by("position"))
            .await?;
        let mut components_by_screen: HashMap<String, Vec<UiComponentRecord>> = HashMap::new();
        for component in components {
            components_by_screen
                .entry(component.screen_id.clone())
                .or_default()
                .push(component);
        }

        let tokens: Vec<DesignTokenRecord> = storage.select(&in_project).await?;
        let atomic: Vec<AtomicComponentRecord> = storage.select(&in_project).await?;

        Ok(ArchitectureOutcome {
            tech_stack,
            database_schema: DatabaseSchema {
                tables: tables
                    .into_iter()
                    .map(|table| TableWithColumns {
                        columns: columns_by_table.remove(&table.id).unwrap_or_default(),
                        table,
                    })
                    .collect(),
                relationships,
            },
            ui_screens: screens
                .into_iter()
                .map(|screen| ScreenWithComponents {
                    components: components_by_screen.remove(&screen.id).unwrap_or_default(),
                    screen,
                })
                .collect(),
            design_system: DesignSystem {
                tokens,
                components: atomic,
            },
        })
    }
}

/// Stamp ids and positions on the generated architecture.
fn build_plan(
    project_id: &str,
    version: u32,
    stack: TechStackEnvelope,
    schema: SchemaCandidate,
    screens: ScreensEnvelope,
    design: DesignSystemCandidate,
) -> ArchitecturePlan {
    let mut plan = ArchitecturePlan::default();

    plan.tech_stack = stack
        .tech_stack
        .into_iter()
        .map(|t| TechStackRecord {
            id: crate::new_id(),
            project_id: project_id.to_string(),
            layer: t.layer,
            technology: t.technology,
            justification: t.justification,
            version,
        })
        .collect();

    for (position, table) in schema.tables.into_iter().enumerate() {
        let table_id = crate::new_id();
        for (i, column) in table.columns.into_iter().enumerate() {
            plan.columns.push(DatabaseColumnRecord {
                id: crate::new_id(),
                table_id: table_id.clone(),
                column_name: column.column_name,
                data_type: column.data_type,
                is_primary_key: column.is_primary_key,
                is_foreign_key: column.is_foreign_key,
                references_table: column.references_table,
                constraints: column.constraints,
                position: i as u32,
            });
        }
        plan.tables.push(DatabaseTableRecord {
            id: table_id,
            project_id: project_id.to_string(),
            table_name: table.table_name,
            position: position as u32,
        });
    }
    plan.relationships = schema
        .relationships
        .into_iter()
        .map(|r| DatabaseRelationshipRecord {
            id: crate::new_id(),
            project_id: project_id.to_string(),
            from_table: r.from_table,
            to_table: r.to_table,
            relationship_type: r.relationship_type,
        })
        .collect();

    for (position, screen) in screens.screens.into_iter().enumerate() {
        let screen_id = crate::new_id();
        for (i, component) in screen.components.into_iter().enumerate() {
            plan.components.push(UiComponentRecord {
                id: crate::new_id(),
                screen_id: screen_id.clone(),
                component_name: component.component_name,
                component_type: component.component_type,
                data_displayed: component.data_displayed,
                props: component.props,
                position: i as u32,
            });
        }
        plan.screens.push(UiScreenRecord {
            id: screen_id,
            project_id: project_id.to_string(),
            screen_name: screen.screen_name,
            description: screen.description,
            route_path: screen.route_path,
            position: position as u32,
        });
    }

    plan.tokens = design
        .design_tokens
        .into_iter()
        .map(|t| DesignTokenRecord {
            id: crate::new_id(),
            project_id: project_id.to_string(),
            category: t.category,
            token_name: t.token_name,
            token_value: t.token_value,
        })
        .collect();
    plan.atomic_components = design
        .atomic_components
        .into_iter()
        .map(|c| AtomicComponentRecord {
            id: crate::new_id(),
            project_id: project_id.to_string(),
            component_level: c.component_level,
            component_name: c.component_name,
            description: c.description,
            props: c.props,
            composed_of: c.composed_of,
        })
        .collect();

    plan
}
