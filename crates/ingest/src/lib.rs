pub mod chunk;
pub mod chunker;
pub mod normalizer;

pub use chunk::Chunk;
pub use chunker::{Chunker, ChunkerConfig};
pub use normalizer::normalize;
