//! Storage layer for the Goldi ideation pipeline.
//!
//! [`GoldiStorage`] is the snapshot-transaction trait every backend
//! implements; [`InMemoryStorage`] is the process-local backend used by the
//! server and the tests. The [`conformance`] module holds the backend-agnostic
//! test suite.

pub mod conformance;
mod error;
mod filter;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use filter::{Condition, Filter};
pub use memory::{InMemoryStorage, MemorySnapshot};
pub use record::{
    AtomicComponentRecord, CoreProblemRecord, DataFlowRecord, DataFlowStepRecord,
    DatabaseColumnRecord, DatabaseRelationshipRecord, DatabaseTableRecord, DesignTokenRecord,
    ExecutionLogRecord, PainPointRecord, PersonaRecord, ProjectRecord, Record,
    SolutionPainPointMappingRecord, SolutionRecord, StateEventRecord, Table, TechStackRecord,
    UiComponentRecord, UiScreenRecord, UserStoryRecord,
};
pub use traits::GoldiStorage;
