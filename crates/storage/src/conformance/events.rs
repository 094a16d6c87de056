use std::future::Future;

use super::{make_event, TestResult};
use crate::record::StateEventRecord;
use crate::{Filter, GoldiStorage, StorageError};

pub(super) async fn run_event_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "events",
            "sequence_starts_at_one",
            sequence_starts_at_one(factory).await,
        ),
        TestResult::from_result(
            "events",
            "sequence_is_per_project",
            sequence_is_per_project(factory).await,
        ),
        TestResult::from_result(
            "events",
            "sequence_continues_across_snapshots",
            sequence_continues_across_snapshots(factory).await,
        ),
        TestResult::from_result(
            "events",
            "events_reject_update",
            events_reject_update(factory).await,
        ),
        TestResult::from_result(
            "events",
            "events_reject_delete",
            events_reject_delete(factory).await,
        ),
    ]
}

async fn append_event<S: GoldiStorage>(s: &S, id: &str, project_id: &str) -> Result<i64, String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let seq = s
        .next_sequence_number(&mut snap, project_id)
        .await
        .map_err(|e| format!("next_sequence_number: {e}"))?;
    s.insert(&mut snap, vec![make_event(id, project_id, seq)])
        .await
        .map_err(|e| format!("insert event: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;
    Ok(seq)
}

async fn sequence_starts_at_one<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let max = s
        .max_sequence_number("proj-1")
        .await
        .map_err(|e| format!("max_sequence_number: {e}"))?;
    if max != 0 {
        return Err(format!("expected 0 before any event, got {max}"));
    }
    let seq = append_event(&s, "e1", "proj-1").await?;
    if seq != 1 {
        return Err(format!("expected first sequence 1, got {seq}"));
    }
    Ok(())
}

async fn sequence_is_per_project<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    append_event(&s, "e1", "proj-1").await?;
    append_event(&s, "e2", "proj-1").await?;
    let other = append_event(&s, "e3", "proj-2").await?;
    if other != 1 {
        return Err(format!("expected proj-2 to start at 1, got {other}"));
    }
    Ok(())
}

async fn sequence_continues_across_snapshots<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut seen = Vec::new();
    for i in 0..4 {
        seen.push(append_event(&s, &format!("e{i}"), "proj-1").await?);
    }
    if seen != [1, 2, 3, 4] {
        return Err(format!("expected [1, 2, 3, 4], got {seen:?}"));
    }
    let stored: Vec<StateEventRecord> = s
        .select(&Filter::new().eq("project_id", "proj-1").order_by("sequence_number"))
        .await
        .map_err(|e| format!("select: {e}"))?;
    let stored: Vec<i64> = stored.iter().map(|e| e.sequence_number).collect();
    if stored != seen {
        return Err(format!("stored sequences {stored:?} differ from issued {seen:?}"));
    }
    Ok(())
}

async fn events_reject_update<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    append_event(&s, "e1", "proj-1").await?;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let result = s.update(&mut snap, make_event("e1", "proj-1", 99)).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::AppendOnly { operation, .. }) if operation == "update" => Ok(()),
        other => Err(format!("expected AppendOnly(update), got {:?}", other)),
    }
}

async fn events_reject_delete<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    append_event(&s, "e1", "proj-1").await?;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let result = s
        .delete::<StateEventRecord>(&mut snap, &Filter::new())
        .await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::AppendOnly { operation, .. }) if operation == "delete" => Ok(()),
        other => Err(format!("expected AppendOnly(delete), got {:?}", other)),
    }
}
