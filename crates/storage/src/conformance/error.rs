use std::future::Future;

use super::{make_project, TestResult};
use crate::record::ProjectRecord;
use crate::{GoldiStorage, StorageError};

pub(super) async fn run_error_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "error",
            "get_nonexistent_is_record_not_found",
            get_nonexistent_is_record_not_found(factory).await,
        ),
        TestResult::from_result(
            "error",
            "update_nonexistent_is_record_not_found",
            update_nonexistent_is_record_not_found(factory).await,
        ),
        TestResult::from_result(
            "error",
            "duplicate_insert_rejected",
            duplicate_insert_rejected(factory).await,
        ),
        TestResult::from_result(
            "error",
            "duplicate_within_batch_inserts_nothing",
            duplicate_within_batch_inserts_nothing(factory).await,
        ),
        TestResult::from_result(
            "error",
            "select_on_empty_table_is_empty",
            select_on_empty_table_is_empty(factory).await,
        ),
    ]
}

async fn get_nonexistent_is_record_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get::<ProjectRecord>("nope").await {
        Err(StorageError::RecordNotFound { table, id }) => {
            if table != "projects" || id != "nope" {
                return Err(format!("wrong fields: table={table}, id={id}"));
            }
            Ok(())
        }
        other => Err(format!("expected RecordNotFound, got {:?}", other)),
    }
}

async fn update_nonexistent_is_record_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let result = s.update(&mut snap, make_project("ghost")).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::RecordNotFound { .. }) => Ok(()),
        other => Err(format!("expected RecordNotFound, got {:?}", other)),
    }
}

async fn duplicate_insert_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    s.insert(&mut snap, vec![make_project("p1")])
        .await
        .map_err(|e| format!("first insert: {e}"))?;
    let result = s.insert(&mut snap, vec![make_project("p1")]).await;
    let _ = s.abort_snapshot(snap).await;
    match result {
        Err(StorageError::DuplicateId { id, .. }) if id == "p1" => Ok(()),
        other => Err(format!("expected DuplicateId(p1), got {:?}", other)),
    }
}

async fn duplicate_within_batch_inserts_nothing<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut snap = s.begin_snapshot().await.map_err(|e| format!("begin: {e}"))?;
    let result = s
        .insert(
            &mut snap,
            vec![make_project("a"), make_project("b"), make_project("a")],
        )
        .await;
    if result.is_ok() {
        let _ = s.abort_snapshot(snap).await;
        return Err("batch with duplicate id was accepted".to_string());
    }
    let seen: Vec<ProjectRecord> = s
        .select_in(&mut snap, &crate::Filter::new())
        .await
        .map_err(|e| format!("select_in: {e}"))?;
    let _ = s.abort_snapshot(snap).await;
    if !seen.is_empty() {
        return Err(format!("expected no rows after failed batch, got {}", seen.len()));
    }
    Ok(())
}

async fn select_on_empty_table_is_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: GoldiStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let rows: Vec<ProjectRecord> = s
        .select(&crate::Filter::new())
        .await
        .map_err(|e| format!("select: {e}"))?;
    if !rows.is_empty() {
        return Err(format!("expected empty, got {}", rows.len()));
    }
    Ok(())
}
