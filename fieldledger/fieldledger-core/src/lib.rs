pub mod collections;
pub mod error;
pub mod ids;
pub mod queue;
pub mod records;
pub mod storage;

pub use collections::DataStore;
pub use error::{QueueError, Result, StoreError};
pub use queue::MutationQueue;
pub use storage::{Document, JsonFileStore, Record, ShapePolicy};
