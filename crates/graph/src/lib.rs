//! Graph persistence: the store boundary, the Neo4j-backed store, an
//! in-memory store for tests, and the batched document-graph writer.

pub mod memory;
pub mod store;
pub mod writer;

pub use memory::MemoryGraph;
pub use store::{params, GraphStore, Neo4jStore, Params, Row};
pub use writer::GraphWriter;
