/// All errors that can be returned by a GoldiStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No row with the given id exists in the table.
    #[error("record not found: {table}/{id}")]
    RecordNotFound { table: &'static str, id: String },

    /// A row with this id already exists in the table.
    #[error("duplicate id in {table}: {id}")]
    DuplicateId { table: &'static str, id: String },

    /// The table only accepts inserts (state events).
    #[error("table {table} is append-only; {operation} rejected")]
    AppendOnly {
        table: &'static str,
        operation: &'static str,
    },

    /// A backend-specific storage error (connection, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Backend(format!("row serialization: {e}"))
    }
}
