use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use super::{make_event, make_solution, TestResult};
use crate::record::{SolutionRecord, StateEventRecord};
use crate::{Filter, GoldiStorage, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "concurrent_sequence_numbers_distinct",
            concurrent_sequence_numbers_distinct(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_inserts_all_land",
            concurrent_inserts_all_land(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "reader_not_blocked_by_open_snapshot",
            reader_not_blocked_by_open_snapshot(factory).await,
        ),
    ]
}

// ── Concurrent events: no duplicate sequence numbers ────────────────────────

/// N tasks each append one event for the same project in their own snapshot.
/// Every commit succeeds and the issued numbers are exactly `1..=N`.
async fn concurrent_sequence_numbers_distinct<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            let seq = match s.next_sequence_number(&mut snap, "proj-1").await {
                Ok(seq) => seq,
                Err(e) => {
                    let _ = s.abort_snapshot(snap).await;
                    return Err(e);
                }
            };
            if let Err(e) = s
                .insert(&mut snap, vec![make_event(&format!("e{i}"), "proj-1", seq)])
                .await
            {
                let _ = s.abort_snapshot(snap).await;
                return Err(e);
            }
            s.commit_snapshot(snap).await?;
            Ok::<i64, StorageError>(seq)
        }));
    }

    let mut issued = BTreeSet::new();
    for handle in handles {
        let seq = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if !issued.insert(seq) {
            return Err(format!("sequence number {seq} issued twice"));
        }
    }

    let expected: BTreeSet<i64> = (1..=N as i64).collect();
    if issued != expected {
        return Err(format!("expected 1..={N}, got {issued:?}"));
    }

    let stored: Vec<StateEventRecord> = storage
        .select(&Filter::new().eq("project_id", "proj-1"))
        .await
        .map_err(|e| format!("select: {e}"))?;
    if stored.len() != N {
        return Err(format!("expected {N} events stored, got {}", stored.len()));
    }
    Ok(())
}

// ── Concurrent inserts to different rows: all land ──────────────────────────

async fn concurrent_inserts_all_land<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let mut snap = s.begin_snapshot().await?;
            if let Err(e) = s
                .insert(&mut snap, vec![make_solution(&format!("s{i}"), "per-1", i as u32)])
                .await
            {
                let _ = s.abort_snapshot(snap).await;
                return Err(e);
            }
            s.commit_snapshot(snap).await
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
    }

    let rows: Vec<SolutionRecord> = storage
        .select(&Filter::new())
        .await
        .map_err(|e| format!("select: {e}"))?;
    if rows.len() != N {
        return Err(format!("expected {N} rows, got {}", rows.len()));
    }
    Ok(())
}

// ── Reads while a snapshot is open ──────────────────────────────────────────

/// `select` outside a snapshot returns committed data while another task
/// holds an open snapshot.
async fn reader_not_blocked_by_open_snapshot<S, F, Fut>(factory: &F) -> Result<(), String>
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

    let read = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        s.select::<SolutionRecord>(&Filter::new()),
    )
    .await;
    let _ = s.abort_snapshot(snap).await;

    match read {
        Ok(Ok(rows)) if rows.is_empty() => Ok(()),
        Ok(Ok(rows)) => Err(format!("saw {} uncommitted rows", rows.len())),
        Ok(Err(e)) => Err(format!("select: {e}")),
        Err(_) => Err("select blocked behind an open snapshot".to_string()),
    }
}
