use std::future::Future;

use super::{make_solution, TestResult};
use crate::record::SolutionRecord;
use crate::{Filter, GoldiStorage};

pub(super) async fn run_filter_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result("filter", "eq_and_in", eq_and_in(factory).await),
        TestResult::from_result(
            "filter",
            "not_in_excludes_listed_ids",
            not_in_excludes_listed_ids(factory).await,
        ),
        TestResult::from_result(
            "filter",
            "order_by_is_numeric_ascending",
            order_by_is_numeric_ascending(factory).await,
        ),
        TestResult::from_result(
            "filter",
            "delete_returns_deleted_ids",
            delete_returns_deleted_ids(factory).await,
        ),
    ]
}

/// Seed five solutions: three for `per-1`, two for `per-2`, positions
/// deliberately out of insertion order.
async fn seed<S: GoldiStorage>(s: &S) -> Result<(), String> {
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert(
        &mut snap,
        vec![
            make_solution("a", "per-1", 10),
            make_solution("b", "per-1", 2),
            make_solution("c", "per-1", 0),
            make_solution("d", "per-2", 1),
            make_solution("e", "per-2", 0),
        ],
    )
    .await
    .map_err(|e| format!("seed insert: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("seed commit: {e}"))
}

fn ids(rows: &[SolutionRecord]) -> Vec<&str> {
    rows.iter().map(|r| r.id.as_str()).collect()
}

async fn eq_and_in<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s).await?;
    let rows: Vec<SolutionRecord> = s
        .select(&Filter::new().eq("persona_id", "per-1").is_in("id", ["a", "d", "c"]))
        .await
        .map_err(|e| format!("select: {e}"))?;
    if ids(&rows) != ["a", "c"] {
        return Err(format!("expected [a, c], got {:?}", ids(&rows)));
    }
    Ok(())
}

async fn not_in_excludes_listed_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s).await?;
    let rows: Vec<SolutionRecord> = s
        .select(&Filter::new().eq("persona_id", "per-1").not_in("id", ["b"]))
        .await
        .map_err(|e| format!("select: {e}"))?;
    if ids(&rows) != ["a", "c"] {
        return Err(format!("expected [a, c], got {:?}", ids(&rows)));
    }
    Ok(())
}

async fn order_by_is_numeric_ascending<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s).await?;
    let rows: Vec<SolutionRecord> = s
        .select(&Filter::new().eq("persona_id", "per-1").order_by("position"))
        .await
        .map_err(|e| format!("select: {e}"))?;
    if ids(&rows) != ["c", "b", "a"] {
        return Err(format!("expected [c, b, a], got {:?}", ids(&rows)));
    }
    Ok(())
}

async fn delete_returns_deleted_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed(&s).await?;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let mut deleted = s
        .delete::<SolutionRecord>(
            &mut snap,
            &Filter::new().eq("persona_id", "per-2").not_in("id", ["e"]),
        )
        .await
        .map_err(|e| format!("delete: {e}"))?;
    s.commit_snapshot(snap)
        .await
        .map_err(|e| format!("commit: {e}"))?;
    deleted.sort();
    if deleted != ["d"] {
        return Err(format!("expected [d] deleted, got {deleted:?}"));
    }
    let left: Vec<SolutionRecord> = s
        .select(&Filter::new().order_by("id"))
        .await
        .map_err(|e| format!("select: {e}"))?;
    if ids(&left) != ["a", "b", "c", "e"] {
        return Err(format!("expected [a, b, c, e] left, got {:?}", ids(&left)));
    }
    Ok(())
}
