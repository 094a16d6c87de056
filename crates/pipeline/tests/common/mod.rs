//! Shared fixtures: a scripted generation capability, a storage wrapper that
//! fails writes on demand, and seeding helpers.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use goldi_pipeline::{CompletionRequest, LlmClient, LlmError, PipelineConfig, Stage, WorkflowRunner};
use goldi_storage::{
    CoreProblemRecord, Filter, GoldiStorage, InMemoryStorage, MemorySnapshot, PainPointRecord,
    PersonaRecord, ProjectRecord, Record, SolutionRecord, StorageError, Table, UserStoryRecord,
};
use serde_json::{json, Value};
use tokio::sync::Notify;

// ── Scripted LLM ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Reply {
    Body(String),
    Fail(String),
}

/// Answers each stage from its own queue. The last reply of a queue is
/// repeated once the others are used up.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<HashMap<Stage, VecDeque<Reply>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    gates: Mutex<HashMap<Stage, Arc<Notify>>>,
}

impl ScriptedLlm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, stage: Stage, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(stage)
            .or_default()
            .push_back(reply);
    }

    pub fn reply(&self, stage: Stage, body: Value) -> &Self {
        self.push(stage, Reply::Body(body.to_string()));
        self
    }

    pub fn reply_raw(&self, stage: Stage, body: &str) -> &Self {
        self.push(stage, Reply::Body(body.to_string()));
        self
    }

    pub fn fail(&self, stage: Stage, message: &str) -> &Self {
        self.push(stage, Reply::Fail(message.to_string()));
        self
    }

    /// Hold the next call for `stage` until the returned handle is notified.
    pub fn gate(&self, stage: Stage) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().unwrap().insert(stage, gate.clone());
        gate
    }

    /// Yield until `stage` has been called `count` times.
    pub async fn wait_for_calls(&self, stage: Stage, count: usize) {
        while self.calls(stage) < count {
            tokio::task::yield_now().await;
        }
    }

    pub fn calls(&self, stage: Stage) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.stage == stage)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// User-message text of every call made for `stage`.
    pub fn prompts(&self, stage: Stage) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.stage == stage)
            .filter_map(|r| r.messages.iter().find(|m| m.role == "user"))
            .map(|m| m.content.clone())
            .collect()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let stage = request.stage;
        self.requests.lock().unwrap().push(request);
        let reply = {
            let mut replies = self.replies.lock().unwrap();
            let queue = replies.entry(stage).or_default();
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        };
        let gate = self.gates.lock().unwrap().remove(&stage);
        if let Some(gate) = gate {
            gate.notified().await;
        }
        // Yield so fan-out calls interleave.
        tokio::task::yield_now().await;
        match reply {
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::Fail(message)) => Err(LlmError::Network(message)),
            None => Err(LlmError::Api {
                status: 500,
                message: format!("no scripted reply for {stage}"),
            }),
        }
    }
}

// ── Failing storage ─────────────────────────────────────────────────────────

/// In-memory storage whose inserts into one table can be made to fail.
#[derive(Clone, Default)]
pub struct FailingStorage {
    inner: InMemoryStorage,
    fail_table: Arc<Mutex<Option<Table>>>,
    armed: Arc<AtomicBool>,
    fail_aborts: Arc<AtomicBool>,
}

impl FailingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_inserts_into(&self, table: Table) {
        *self.fail_table.lock().unwrap() = Some(table);
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Make every abort report an error. The snapshot is still dropped.
    pub fn fail_aborts(&self) {
        self.fail_aborts.store(true, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &InMemoryStorage {
        &self.inner
    }

    fn should_fail(&self, table: Table) -> bool {
        self.armed.load(Ordering::SeqCst) && *self.fail_table.lock().unwrap() == Some(table)
    }
}

#[async_trait]
impl GoldiStorage for FailingStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        self.inner.begin_snapshot().await
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        self.inner.commit_snapshot(snapshot).await
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        if self.fail_aborts.load(Ordering::SeqCst) {
            drop(snapshot);
            return Err(StorageError::Backend("injected abort failure".into()));
        }
        self.inner.abort_snapshot(snapshot).await
    }

    async fn insert<R: Record>(
        &self,
        snapshot: &mut MemorySnapshot,
        records: Vec<R>,
    ) -> Result<(), StorageError> {
        if self.should_fail(R::TABLE) {
            return Err(StorageError::Backend(format!(
                "injected failure on {}",
                R::TABLE.as_str()
            )));
        }
        self.inner.insert(snapshot, records).await
    }

    async fn update<R: Record>(
        &self,
        snapshot: &mut MemorySnapshot,
        record: R,
    ) -> Result<(), StorageError> {
        self.inner.update(snapshot, record).await
    }

    async fn delete<R: Record>(
        &self,
        snapshot: &mut MemorySnapshot,
        filter: &Filter,
    ) -> Result<Vec<String>, StorageError> {
        self.inner.delete::<R>(snapshot, filter).await
    }

    async fn select_in<R: Record>(
        &self,
        snapshot: &mut MemorySnapshot,
        filter: &Filter,
    ) -> Result<Vec<R>, StorageError> {
        self.inner.select_in(snapshot, filter).await
    }

    async fn next_sequence_number(
        &self,
        snapshot: &mut MemorySnapshot,
        project_id: &str,
    ) -> Result<i64, StorageError> {
        self.inner.next_sequence_number(snapshot, project_id).await
    }

    async fn select<R: Record>(&self, filter: &Filter) -> Result<Vec<R>, StorageError> {
        self.inner.select(filter).await
    }

    async fn max_sequence_number(&self, project_id: &str) -> Result<i64, StorageError> {
        self.inner.max_sequence_number(project_id).await
    }
}

// ── Runner and seeding ──────────────────────────────────────────────────────

pub const PROJECT: &str = "proj-1";
pub const PERSONA: &str = "per-1";

pub fn runner<S: GoldiStorage>(storage: S, llm: &Arc<ScriptedLlm>) -> WorkflowRunner<S> {
    WorkflowRunner::new(Arc::new(storage), llm.clone(), PipelineConfig::default())
}

pub fn runner_with<S: GoldiStorage>(
    storage: S,
    llm: &Arc<ScriptedLlm>,
    config: PipelineConfig,
) -> WorkflowRunner<S> {
    WorkflowRunner::new(Arc::new(storage), llm.clone(), config)
}

pub async fn insert_all<S: GoldiStorage, R: Record>(storage: &S, rows: Vec<R>) {
    let mut snap = storage.begin_snapshot().await.unwrap();
    storage.insert(&mut snap, rows).await.unwrap();
    storage.commit_snapshot(snap).await.unwrap();
}

pub fn project(id: &str) -> ProjectRecord {
    ProjectRecord {
        id: id.into(),
        name: "Clinic scheduling".into(),
        status: "problem_validated".into(),
        current_step: "problem_validated".into(),
        created_at: "2026-01-01T00:00:00Z".into(),
    }
}

pub fn validated_problem(project_id: &str) -> CoreProblemRecord {
    CoreProblemRecord {
        id: format!("cp-{project_id}"),
        project_id: project_id.into(),
        original_input: "Small clinics double-book appointments".into(),
        validated_problem: Some("Small clinics double-book appointments".into()),
        is_valid: true,
        validation_feedback: "Clear and specific".into(),
        key_terms: vec!["clinic".into(), "scheduling".into()],
        created_at: "2026-01-01T00:00:00Z".into(),
    }
}

pub fn persona(id: &str, position: u32) -> PersonaRecord {
    PersonaRecord {
        id: id.into(),
        project_id: PROJECT.into(),
        core_problem_id: format!("cp-{PROJECT}"),
        name: format!("Persona {id}"),
        industry: format!("Industry {position}"),
        role: format!("Role {position}"),
        description: String::new(),
        pain_degree: 3,
        position,
        is_locked: false,
        is_active: false,
        generation_batch: None,
    }
}

pub fn pain_point(id: &str, persona_id: &str, position: u32) -> PainPointRecord {
    PainPointRecord {
        id: id.into(),
        project_id: PROJECT.into(),
        persona_id: persona_id.into(),
        description: format!("Pain {id}"),
        severity: "high".into(),
        impact_area: "operations".into(),
        position,
        is_locked: false,
        generation_batch: None,
    }
}

pub fn solution(id: &str, position: u32, selected: bool) -> SolutionRecord {
    SolutionRecord {
        id: id.into(),
        project_id: PROJECT.into(),
        persona_id: PERSONA.into(),
        title: format!("Solution {id}"),
        description: "Does a thing".into(),
        solution_type: "feature".into(),
        complexity: "medium".into(),
        position,
        is_locked: false,
        is_selected: selected,
        generation_batch: None,
    }
}

pub fn user_story(id: &str, position: u32, solution_ids: &[&str]) -> UserStoryRecord {
    UserStoryRecord {
        id: id.into(),
        project_id: PROJECT.into(),
        title: format!("Story {id}"),
        as_a: "patient".into(),
        i_want: "to book".into(),
        so_that: "I am seen".into(),
        acceptance_criteria: vec![],
        priority: "high".into(),
        complexity_points: 3,
        position,
        is_edited: true,
        solution_ids: solution_ids.iter().map(|s| s.to_string()).collect(),
        generation_batch: None,
    }
}

/// Project, validated problem, one persona.
pub async fn seed_persona<S: GoldiStorage>(storage: &S) {
    insert_all(storage, vec![project(PROJECT)]).await;
    insert_all(storage, vec![validated_problem(PROJECT)]).await;
    insert_all(storage, vec![persona(PERSONA, 0)]).await;
}

/// `seed_persona` plus three pain points `pp0..pp2`.
pub async fn seed_pain_points<S: GoldiStorage>(storage: &S) {
    seed_persona(storage).await;
    insert_all(
        storage,
        (0..3)
            .map(|i| pain_point(&format!("pp{i}"), PERSONA, i))
            .collect::<Vec<_>>(),
    )
    .await;
}

/// `seed_pain_points` plus `count` selected solutions `sel0..`.
pub async fn seed_selected_solutions<S: GoldiStorage>(storage: &S, count: u32) {
    seed_pain_points(storage).await;
    insert_all(
        storage,
        (0..count)
            .map(|i| solution(&format!("sel{i}"), i, true))
            .collect::<Vec<_>>(),
    )
    .await;
}

// ── Canned replies ──────────────────────────────────────────────────────────

pub fn personas_reply(n: usize) -> Value {
    let personas: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "name": format!("Generated {i}"),
                "industry": format!("Industry {i}"),
                "role": format!("Role {i}"),
                "painDegree": 4,
                "description": "Busy",
            })
        })
        .collect();
    json!({ "personas": personas })
}

pub fn pain_points_reply(n: usize) -> Value {
    let pain_points: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "description": format!("Generated pain {i}"),
                "severity": "medium",
                "impactArea": "time",
            })
        })
        .collect();
    json!({ "painPoints": pain_points })
}

/// `n` solutions; solution `i` addresses pain point `i % pain_points`.
pub fn solutions_reply(n: usize, pain_points: usize) -> Value {
    let solutions: Vec<Value> = (0..n)
        .map(|i| {
            json!({
                "title": format!("Generated solution {i}"),
                "description": "Helps",
                "solutionType": "feature",
                "complexity": "low",
                "addressedPainPoints": [i % pain_points.max(1)],
            })
        })
        .collect();
    json!({ "solutions": solutions })
}

/// One story per entry in `related`, each referencing those solution indices.
pub fn stories_reply(related: &[&[usize]]) -> Value {
    let stories: Vec<Value> = related
        .iter()
        .enumerate()
        .map(|(i, indices)| {
            json!({
                "title": format!("Story {i}"),
                "asA": "receptionist",
                "iWant": format!("to do thing {i}"),
                "soThat": "patients are seen",
                "acceptanceCriteria": ["it works"],
                "priority": "high",
                "complexityPoints": 3,
                "relatedSolutionIndices": indices,
            })
        })
        .collect();
    json!({ "userStories": stories })
}

pub fn data_flow_reply() -> Value {
    json!({
        "description": "Booking request travels to storage",
        "steps": [
            {"stepNumber": 1, "actor": "User", "action": "submit", "source": "Browser", "target": "API", "dataPayload": "booking"},
            {"stepNumber": 2, "action": "persist", "source": "API", "target": "Database", "dataPayload": "row"}
        ]
    })
}

pub fn tech_stack_reply() -> Value {
    json!({
        "techStack": [
            {"layer": "frontend", "technology": "React", "justification": "Familiar"},
            {"layer": "backend", "technology": "Rust", "justification": "Fast"}
        ]
    })
}

pub fn schema_reply() -> Value {
    json!({
        "tables": [
            {"tableName": "appointments", "columns": [
                {"columnName": "id", "dataType": "uuid", "isPrimaryKey": true},
                {"columnName": "patient_id", "dataType": "uuid", "isForeignKey": true, "referencesTable": "patients"}
            ]},
            {"tableName": "patients", "columns": [
                {"columnName": "id", "dataType": "uuid", "isPrimaryKey": true}
            ]}
        ],
        "relationships": [
            {"fromTable": "appointments", "toTable": "patients", "relationshipType": "many_to_one"}
        ]
    })
}

pub fn screens_reply() -> Value {
    json!({
        "screens": [
            {"screenName": "Calendar", "description": "Day view", "routePath": "/calendar", "components": [
                {"componentName": "DayGrid", "componentType": "organism", "dataDisplayed": "appointments", "props": {"days": 1}}
            ]}
        ]
    })
}

pub fn design_system_reply() -> Value {
    json!({
        "designTokens": [
            {"category": "color", "tokenName": "primary", "tokenValue": "#0055ff"}
        ],
        "atomicComponents": [
            {"componentLevel": "atom", "componentName": "Button", "description": "Clickable", "props": {}, "composedOf": []}
        ]
    })
}
