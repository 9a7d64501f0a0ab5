use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A bounded slice of a document's text: the unit of extraction and of
/// graph provenance. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub doc_id: String,
    pub text: String,
}

impl Chunk {
    /// Ids are freshly generated per call; chunking is not restartable.
    pub fn new(doc_id: &str, text: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            doc_id: doc_id.to_string(),
            text,
        }
    }
}
