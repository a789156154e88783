pub mod memory;
pub mod qdrant;
pub mod records;

pub use memory::MemorySearchEngine;
pub use qdrant::QdrantEngine;
pub use records::{JsonFileRecordStore, MemoryRecordStore};
