//! In-memory `GoldiStorage` backend.
//!
//! Rows are kept as serialized JSON objects per table. A snapshot holds the
//! single writer lock for its lifetime and works on a private copy of the
//! committed tables, which replaces them on commit. Snapshots are therefore
//! serializable (one writer at a time, like SQLite) and rollback is dropping
//! the copy. Readers outside a snapshot only see committed tables and never
//! wait for an open snapshot.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::error::StorageError;
use crate::filter::Filter;
use crate::record::{Record, StateEventRecord, Table};
use crate::traits::GoldiStorage;

#[derive(Debug, Clone, Default)]
struct Tables {
    rows: BTreeMap<Table, Vec<Value>>,
    sequence_counters: HashMap<String, i64>,
}

impl Tables {
    fn select<R: Record>(&self, filter: &Filter) -> Result<Vec<R>, StorageError> {
        let mut matched: Vec<&Value> = self
            .rows
            .get(&R::TABLE)
            .map(|rows| rows.iter().filter(|row| filter.matches(row)).collect())
            .unwrap_or_default();
        matched.sort_by(|a, b| filter.compare(a, b));
        matched
            .into_iter()
            .map(|row| serde_json::from_value(row.clone()).map_err(StorageError::from))
            .collect()
    }

    fn insert<R: Record>(&mut self, records: Vec<R>) -> Result<(), StorageError> {
        let table = self.rows.entry(R::TABLE).or_default();
        let mut staged = Vec::with_capacity(records.len());
        for record in records {
            let id = record.id().to_string();
            let duplicate = table.iter().chain(staged.iter()).any(|row: &Value| {
                row.get("id").and_then(Value::as_str) == Some(id.as_str())
            });
            if duplicate {
                return Err(StorageError::DuplicateId {
                    table: R::TABLE.as_str(),
                    id,
                });
            }
            staged.push(serde_json::to_value(&record)?);
        }
        table.extend(staged);
        Ok(())
    }

    fn update<R: Record>(&mut self, record: R) -> Result<(), StorageError> {
        if R::APPEND_ONLY {
            return Err(StorageError::AppendOnly {
                table: R::TABLE.as_str(),
                operation: "update",
            });
        }
        let value = serde_json::to_value(&record)?;
        let slot = self
            .rows
            .get_mut(&R::TABLE)
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|row| row.get("id").and_then(Value::as_str) == Some(record.id()))
            })
            .ok_or_else(|| StorageError::RecordNotFound {
                table: R::TABLE.as_str(),
                id: record.id().to_string(),
            })?;
        *slot = value;
        Ok(())
    }

    fn delete<R: Record>(&mut self, filter: &Filter) -> Result<Vec<String>, StorageError> {
        if R::APPEND_ONLY {
            return Err(StorageError::AppendOnly {
                table: R::TABLE.as_str(),
                operation: "delete",
            });
        }
        let Some(rows) = self.rows.get_mut(&R::TABLE) else {
            return Ok(Vec::new());
        };
        let mut deleted = Vec::new();
        rows.retain(|row| {
            if filter.matches(row) {
                if let Some(id) = row.get("id").and_then(Value::as_str) {
                    deleted.push(id.to_string());
                }
                false
            } else {
                true
            }
        });
        Ok(deleted)
    }

    fn max_sequence_number(&self, project_id: &str) -> i64 {
        let from_events = self
            .rows
            .get(&StateEventRecord::TABLE)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row.get("project_id").and_then(Value::as_str) == Some(project_id))
                    .filter_map(|row| row.get("sequence_number").and_then(Value::as_i64))
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0);
        let from_counter = self
            .sequence_counters
            .get(project_id)
            .copied()
            .unwrap_or(0);
        from_events.max(from_counter)
    }
}

/// An in-memory snapshot: the writer lock plus the working copy.
pub struct MemorySnapshot {
    _writer: OwnedMutexGuard<()>,
    working: Tables,
}

/// A process-local `GoldiStorage` backend.
///
/// Cloning shares the underlying database.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    committed: Arc<RwLock<Tables>>,
    writer: Arc<Mutex<()>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GoldiStorage for InMemoryStorage {
    type Snapshot = MemorySnapshot;

    async fn begin_snapshot(&self) -> Result<MemorySnapshot, StorageError> {
        let writer = self.writer.clone().lock_owned().await;
        let working = self.committed.read().await.clone();
        Ok(MemorySnapshot {
            _writer: writer,
            working,
        })
    }

    async fn commit_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        let MemorySnapshot { _writer, working } = snapshot;
        *self.committed.write().await = working;
        Ok(())
    }

    async fn abort_snapshot(&self, snapshot: MemorySnapshot) -> Result<(), StorageError> {
        drop(snapshot);
        Ok(())
    }

    async fn insert<R: Record>(
        &self,
        snapshot: &mut MemorySnapshot,
        records: Vec<R>,
    ) -> Result<(), StorageError> {
        snapshot.working.insert(records)
    }

    async fn update<R: Record>(
        &self,
        snapshot: &mut MemorySnapshot,
        record: R,
    ) -> Result<(), StorageError> {
        snapshot.working.update(record)
    }

    async fn delete<R: Record>(
        &self,
        snapshot: &mut MemorySnapshot,
        filter: &Filter,
    ) -> Result<Vec<String>, StorageError> {
        snapshot.working.delete::<R>(filter)
    }

    async fn select_in<R: Record>(
        &self,
        snapshot: &mut MemorySnapshot,
        filter: &Filter,
    ) -> Result<Vec<R>, StorageError> {
        snapshot.working.select(filter)
    }

    async fn next_sequence_number(
        &self,
        snapshot: &mut MemorySnapshot,
        project_id: &str,
    ) -> Result<i64, StorageError> {
        let next = snapshot.working.max_sequence_number(project_id) + 1;
        snapshot
            .working
            .sequence_counters
            .insert(project_id.to_string(), next);
        Ok(next)
    }

    async fn select<R: Record>(&self, filter: &Filter) -> Result<Vec<R>, StorageError> {
        self.committed.read().await.select(filter)
    }

    async fn max_sequence_number(&self, project_id: &str) -> Result<i64, StorageError> {
        Ok(self.committed.read().await.max_sequence_number(project_id))
    }
}
