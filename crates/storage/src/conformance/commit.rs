use std::future::Future;

use super::{make_event, make_project, make_solution, TestResult};
use crate::record::{ProjectRecord, SolutionRecord, StateEventRecord};
use crate::{Filter, GoldiStorage};

pub(super) async fn run_commit_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "commit",
            "multi_table_commit_all_visible",
            multi_table_commit_all_visible(factory).await,
        ),
        TestResult::from_result(
            "commit",
            "abort_discards_every_table",
            abort_discards_every_table(factory).await,
        ),
        TestResult::from_result(
            "commit",
            "abort_after_failed_write_keeps_prior_state",
            abort_after_failed_write_keeps_prior_state(factory).await,
        ),
    ]
}

/// Rows, an event and the sequence counter written in one snapshot all land.
async fn multi_table_commit_all_visible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert(&mut snap, vec![make_project("proj-1")])
        .await
        .map_err(|e| format!("insert project: {e}"))?;
    s.insert(
        &mut snap,
        vec![make_solution("s1", "per-1", 0), make_solution("s2", "per-1", 1)],
    )
    .await
    .map_err(|e| format!("insert solutions: {e}"))?;
    let seq = s
        .next_sequence_number(&mut snap, "proj-1")
        .await
        .map_err(|e| format!("next_sequence_number: {e}"))?;
    s.insert(&mut snap, vec![make_event("e1", "proj-1", seq)])
        .await
        .map_err(|e| format!("insert event: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let solutions: Vec<SolutionRecord> = s
        .select(&Filter::new())
        .await
        .map_err(|e| format!("select solutions: {e}"))?;
    let events: Vec<StateEventRecord> = s
        .select(&Filter::new().eq("project_id", "proj-1"))
        .await
        .map_err(|e| format!("select events: {e}"))?;
    let max = s
        .max_sequence_number("proj-1")
        .await
        .map_err(|e| format!("max_sequence_number: {e}"))?;

    if solutions.len() != 2 {
        return Err(format!("expected 2 solutions, got {}", solutions.len()));
    }
    if events.len() != 1 || events[0].sequence_number != 1 {
        return Err(format!("expected one event with sequence 1, got {events:?}"));
    }
    if max != 1 {
        return Err(format!("expected max sequence 1, got {max}"));
    }
    Ok(())
}

async fn abort_discards_every_table<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert(&mut snap, vec![make_project("proj-1")])
        .await
        .map_err(|e| format!("insert project: {e}"))?;
    s.insert(&mut snap, vec![make_solution("s1", "per-1", 0)])
        .await
        .map_err(|e| format!("insert solution: {e}"))?;
    s.next_sequence_number(&mut snap, "proj-1")
        .await
        .map_err(|e| format!("next_sequence_number: {e}"))?;
    s.abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    let projects: Vec<ProjectRecord> = s
        .select(&Filter::new())
        .await
        .map_err(|e| format!("select: {e}"))?;
    let solutions: Vec<SolutionRecord> = s
        .select(&Filter::new())
        .await
        .map_err(|e| format!("select: {e}"))?;
    let max = s
        .max_sequence_number("proj-1")
        .await
        .map_err(|e| format!("max_sequence_number: {e}"))?;

    if !projects.is_empty() || !solutions.is_empty() {
        return Err("aborted rows became visible".to_string());
    }
    if max != 0 {
        return Err(format!("aborted sequence increment persisted: {max}"));
    }
    Ok(())
}

/// A write that fails mid-snapshot followed by abort leaves the previously
/// committed state untouched.
async fn abort_after_failed_write_keeps_prior_state<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert(&mut snap, vec![make_solution("s1", "per-1", 0)])
        .await
        .map_err(|e| format!("seed: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit seed: {e}"))?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin 2: {e}"))?;
    let deleted = s
        .delete::<SolutionRecord>(&mut snap, &Filter::new().eq("persona_id", "per-1"))
        .await
        .map_err(|e| format!("delete: {e}"))?;
    if deleted != vec!["s1".to_string()] {
        let _ = s.abort_snapshot(snap).await;
        return Err(format!("expected [s1] deleted, got {deleted:?}"));
    }
    let failed = s.update(&mut snap, make_project("missing")).await;
    if failed.is_ok() {
        let _ = s.abort_snapshot(snap).await;
        return Err("update of missing project succeeded".to_string());
    }
    s.abort_snapshot(snap)
        .await
        .map_err(|e| format!("abort: {e}"))?;

    let remaining: Vec<SolutionRecord> = s
        .select(&Filter::new())
        .await
        .map_err(|e| format!("select: {e}"))?;
    if remaining.len() != 1 {
        return Err(format!(
            "expected the seeded solution to survive, got {}",
            remaining.len()
        ));
    }
    Ok(())
}
