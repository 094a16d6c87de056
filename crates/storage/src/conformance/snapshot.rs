use std::future::Future;

use super::{make_project, make_solution, TestResult};
use crate::record::{ProjectRecord, SolutionRecord};
use crate::{Filter, GoldiStorage};

pub(super) async fn run_snapshot_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "snapshot",
            "uncommitted_insert_invisible",
            uncommitted_insert_invisible(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "committed_insert_visible",
            committed_insert_visible(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "snapshot_sees_own_writes",
            snapshot_sees_own_writes(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "uncommitted_update_invisible",
            uncommitted_update_invisible(factory).await,
        ),
        TestResult::from_result(
            "snapshot",
            "dropped_snapshot_rolls_back",
            dropped_snapshot_rolls_back(factory).await,
        ),
    ]
}

/// Rows inserted in an open snapshot are not visible to `select`.
async fn uncommitted_insert_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert(&mut snap, vec![make_project("p1")])
        .await
        .map_err(|e| format!("insert: {e}"))?;

    let outside: Vec<ProjectRecord> = s
        .select(&Filter::new())
        .await
        .map_err(|e| format!("select: {e}"))?;
    let _ = s.abort_snapshot(snap).await;

    if !outside.is_empty() {
        return Err(format!(
            "uncommitted row visible outside snapshot ({} rows)",
            outside.len()
        ));
    }
    Ok(())
}

async fn committed_insert_visible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert(&mut snap, vec![make_project("p1")])
        .await
        .map_err(|e| format!("insert: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let got = s
        .get::<ProjectRecord>("p1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    if got != make_project("p1") {
        return Err(format!("read back differs: {got:?}"));
    }
    Ok(())
}

async fn snapshot_sees_own_writes<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert(&mut snap, vec![make_solution("s1", "per-1", 0)])
        .await
        .map_err(|e| format!("insert: {e}"))?;
    let inside: Vec<SolutionRecord> = s
        .select_in(&mut snap, &Filter::new().eq("persona_id", "per-1"))
        .await
        .map_err(|e| format!("select_in: {e}"))?;
    let _ = s.abort_snapshot(snap).await;

    if inside.len() != 1 || inside[0].id != "s1" {
        return Err(format!("expected [s1] inside snapshot, got {inside:?}"));
    }
    Ok(())
}

async fn uncommitted_update_invisible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert(&mut snap, vec![make_solution("s1", "per-1", 0)])
        .await
        .map_err(|e| format!("insert: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;

    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin 2: {e}"))?;
    let mut changed = make_solution("s1", "per-1", 0);
    changed.is_locked = true;
    s.update(&mut snap, changed)
        .await
        .map_err(|e| format!("update: {e}"))?;

    let outside = s
        .get::<SolutionRecord>("s1")
        .await
        .map_err(|e| format!("get: {e}"))?;
    let _ = s.abort_snapshot(snap).await;

    if outside.is_locked {
        return Err("uncommitted update visible outside snapshot".to_string());
    }
    Ok(())
}

async fn dropped_snapshot_rolls_back<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    {
        let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
        s.insert(&mut snap, vec![make_project("p1")])
            .await
            .map_err(|e| format!("insert: {e}"))?;
    }

    // A dropped snapshot must also release the writer so this can begin.
    let snap = s.begin_snapshot().await.map_err(|e| format!("begin 2: {e}"))?;
    let _ = s.abort_snapshot(snap).await;

    let rows: Vec<ProjectRecord> = s
        .select(&Filter::new())
        .await
        .map_err(|e| format!("select: {e}"))?;
    if !rows.is_empty() {
        return Err("dropped snapshot was committed".to_string());
    }
    Ok(())
}
