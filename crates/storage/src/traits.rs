use async_trait::async_trait;

use crate::error::StorageError;
use crate::filter::Filter;
use crate::record::Record;

/// The storage trait for Goldi pipeline backends.
///
/// A `GoldiStorage` implementation is a small relational store: typed rows
/// addressed by id, read and written through [`Filter`]s with equality,
/// `IN` and `NOT IN` conditions.
///
/// ## Snapshot Semantics
///
/// All mutating operations take `&mut Self::Snapshot`, a type representing an
/// in-progress transaction. The lifecycle is:
///
/// 1. `begin_snapshot()` — start a transaction, returns a `Snapshot`
/// 2. Call mutating methods (and `select_in` for reads that must see them)
/// 3. `commit_snapshot(snapshot)` — commit and consume the transaction
///    OR `abort_snapshot(snapshot)` — roll back and consume the transaction
///
/// If a `Snapshot` is dropped without committing, the transaction MUST be
/// rolled back. Writes made in a snapshot are invisible to `select` until
/// the snapshot commits.
///
/// ## Sequence Counters
///
/// `next_sequence_number` increments a per-project counter inside the
/// snapshot. The increment becomes durable only together with the rest of
/// the snapshot, so the counter and the event row that uses it are written
/// atomically.
///
/// ## Append-only Tables
///
/// Records whose `APPEND_ONLY` is true (state events) reject `update` and
/// `delete` with `StorageError::AppendOnly`.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be used in axum
/// application state and across async task boundaries.
#[async_trait]
pub trait GoldiStorage: Send + Sync + 'static {
    /// The snapshot (transaction) type used by this storage backend.
    type Snapshot: Send;

    // ── Snapshot lifecycle ────────────────────────────────────────────────────

    /// Begin a new snapshot (transaction).
    async fn begin_snapshot(&self) -> Result<Self::Snapshot, StorageError>;

    /// Commit a snapshot, making all mutations durable.
    async fn commit_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    /// Abort (roll back) a snapshot, discarding all mutations.
    async fn abort_snapshot(&self, snapshot: Self::Snapshot) -> Result<(), StorageError>;

    // ── Row operations (within snapshot) ──────────────────────────────────────

    /// Insert rows. Fails with `DuplicateId` if any id already exists; in that
    /// case none of the rows are inserted.
    async fn insert<R: Record>(
        &self,
        snapshot: &mut Self::Snapshot,
        records: Vec<R>,
    ) -> Result<(), StorageError>;

    /// Replace the row with the same id.
    ///
    /// Returns `Err(StorageError::RecordNotFound)` if no such row exists.
    async fn update<R: Record>(
        &self,
        snapshot: &mut Self::Snapshot,
        record: R,
    ) -> Result<(), StorageError>;

    /// Delete every row matching `filter`, returning the deleted ids.
    async fn delete<R: Record>(
        &self,
        snapshot: &mut Self::Snapshot,
        filter: &Filter,
    ) -> Result<Vec<String>, StorageError>;

    /// Read rows as seen from inside the snapshot (including its own writes).
    async fn select_in<R: Record>(
        &self,
        snapshot: &mut Self::Snapshot,
        filter: &Filter,
    ) -> Result<Vec<R>, StorageError>;

    /// Increment and return the project's event sequence counter.
    ///
    /// The first call for a project returns `max_sequence_number + 1`.
    async fn next_sequence_number(
        &self,
        snapshot: &mut Self::Snapshot,
        project_id: &str,
    ) -> Result<i64, StorageError>;

    // ── Query operations (outside snapshot, committed data only) ──────────────

    /// Read committed rows matching `filter`.
    async fn select<R: Record>(&self, filter: &Filter) -> Result<Vec<R>, StorageError>;

    /// Read the single committed row with this id.
    ///
    /// Returns `Err(StorageError::RecordNotFound)` if it does not exist.
    async fn get<R: Record>(&self, id: &str) -> Result<R, StorageError> {
        self.select::<R>(&Filter::new().eq("id", id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::RecordNotFound {
                table: R::TABLE.as_str(),
                id: id.to_string(),
            })
    }

    /// Highest committed sequence number for the project, 0 if none.
    async fn max_sequence_number(&self, project_id: &str) -> Result<i64, StorageError>;
}
