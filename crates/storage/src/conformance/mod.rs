//! Conformance test suite for `GoldiStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any `GoldiStorage`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Snapshot isolation**: uncommitted writes invisible, committed writes visible
//! - **Atomic commit**: all-or-nothing semantics for multi-table snapshots
//! - **Filters**: equality, `IN`, `NOT IN`, ordering, delete-by-filter
//! - **Events**: append-only state events, per-project sequence counters
//! - **Error handling**: correct error variants for invalid operations
//! - **Concurrency**: concurrent snapshots never hand out the same sequence number
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty storage instance for each test:
//!
//! ```ignore
//! use goldi_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn postgres_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_postgres_storage().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod commit;
mod concurrent;
mod error;
mod events;
mod filter;
mod snapshot;

use std::fmt;
use std::future::Future;

use crate::record::{ProjectRecord, SolutionRecord, StateEventRecord};
use crate::GoldiStorage;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "snapshot", "commit", "events").
    pub category: String,
    /// Test name (e.g. "uncommitted_insert_invisible").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(error::run_error_tests(&factory).await);
    results.extend(snapshot::run_snapshot_tests(&factory).await);
    results.extend(commit::run_commit_tests(&factory).await);
    results.extend(filter::run_filter_tests(&factory).await);
    results.extend(events::run_event_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: record constructors with sensible defaults ──────────────────────

fn make_project(id: &str) -> ProjectRecord {
    ProjectRecord {
        id: id.to_string(),
        name: "Test project".to_string(),
        status: "problem_input".to_string(),
        current_step: "problem_input".to_string(),
        created_at: "2026-01-01T00:00:00Z".to_string(),
    }
}

fn make_solution(id: &str, persona_id: &str, position: u32) -> SolutionRecord {
    SolutionRecord {
        id: id.to_string(),
        project_id: "proj-1".to_string(),
        persona_id: persona_id.to_string(),
        title: format!("Solution {id}"),
        description: "Does the thing".to_string(),
        solution_type: "Feature".to_string(),
        complexity: "Low".to_string(),
        position,
        is_locked: false,
        is_selected: false,
        generation_batch: None,
    }
}

fn make_event(id: &str, project_id: &str, sequence_number: i64) -> StateEventRecord {
    StateEventRecord {
        id: id.to_string(),
        project_id: project_id.to_string(),
        event_type: "solutions_generated".to_string(),
        event_data: serde_json::json!({"solutionCount": 5}),
        sequence_number,
        created_at: "2026-01-01T00:00:00Z".to_string(),
    }
}
