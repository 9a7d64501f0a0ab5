pub mod canonical;
pub mod llm;
pub mod prompt;
pub mod schema;
pub mod validate;

pub use canonical::canonicalize;
pub use llm::{LanguageModel, OllamaClient};
pub use schema::{
    ChunkExtraction, EntityMention, ExtractionResult, RelationMention, DEFAULT_ENTITY_TYPE,
    DEFAULT_RELATION_TYPE, ENTITY_TYPES, RELATION_TYPES, SOURCE_SPAN_KEY,
};
pub use validate::validate;

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::warn;

use kgrag_ingest::Chunk;

/// Default number of in-flight model calls in `extract_many`.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Invokes the language model once per chunk to obtain typed entities and
/// relations. Per-chunk failures degrade to empty results; extraction never
/// aborts a batch.
pub struct Extractor {
    model: Arc<dyn LanguageModel>,
    concurrency: usize,
}

impl Extractor {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self {
            model,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Extract entities and relations from one chunk of text.
    ///
    /// Never fails: a model error or an unparseable response is logged and
    /// degrades to the empty result.
    pub async fn extract(&self, text: &str) -> ExtractionResult {
        let prompt = prompt::build_extraction_prompt(text);

        let raw = match self.model.complete(&prompt).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!("model call failed, degrading to empty extraction: {err:#}");
                return ExtractionResult::default();
            }
        };

        match serde_json::from_str(strip_code_fence(&raw)) {
            Ok(result) => result,
            Err(err) => {
                warn!("unparseable extraction response, degrading to empty extraction: {err}");
                ExtractionResult::default()
            }
        }
    }

    /// Extract from every chunk with a bounded worker pool.
    ///
    /// Results come back in input order, one slot per chunk, each tagged
    /// with its chunk id. A failed chunk yields an empty slot rather than a
    /// missing one, so downstream merge logic can index by chunk.
    pub async fn extract_many(&self, chunks: &[Chunk]) -> Vec<ChunkExtraction> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));

        let tasks = chunks.iter().map(|chunk| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                let extraction = self.extract(&chunk.text).await;
                ChunkExtraction {
                    chunk_id: chunk.id.clone(),
                    extraction,
                }
            }
        });

        join_all(tasks).await
    }
}

/// Strip a leading/trailing markdown code fence (with an optional `json`
/// language tag) the model may wrap its output in.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;

    /// Scripted model: answers with a fixed body, or fails when the prompt
    /// contains the failure marker.
    struct ScriptedModel {
        body: String,
        fail_on: Option<String>,
    }

    impl ScriptedModel {
        fn answering(body: &str) -> Self {
            Self {
                body: body.to_string(),
                fail_on: None,
            }
        }

        fn failing_on(body: &str, marker: &str) -> Self {
            Self {
                body: body.to_string(),
                fail_on: Some(marker.to_string()),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete(&self, prompt: &str) -> Result<String> {
            if let Some(marker) = &self.fail_on {
                if prompt.contains(marker.as_str()) {
                    return Err(anyhow!("scripted model failure"));
                }
            }
            Ok(self.body.clone())
        }
    }

    const VALID_BODY: &str = r#"{
        "entities": [
            {"name": "Alice", "type": "PERSON", "properties": {"source_span": "Alice"}},
            {"name": "Acme Corp", "type": "ORGANIZATION", "properties": {"source_span": "Acme Corp"}}
        ],
        "relations": [
            {"source": "Alice", "target": "Acme Corp", "type": "WORKS_FOR"}
        ]
    }"#;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            doc_id: "doc-1".to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn strips_plain_and_tagged_fences() {
        assert_eq!(strip_code_fence("{\"a\": 1}"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("  ```json\n{}\n```  "), "{}");
    }

    #[tokio::test]
    async fn parses_fenced_model_output() {
        let fenced = format!("```json\n{VALID_BODY}\n```");
        let extractor = Extractor::new(Arc::new(ScriptedModel::answering(&fenced)));

        let result = extractor.extract("Alice works for Acme Corp.").await;
        assert_eq!(result.entities.len(), 2);
        assert_eq!(result.relations.len(), 1);
        assert_eq!(result.relations[0].rel_type, "WORKS_FOR");
    }

    #[tokio::test]
    async fn malformed_json_degrades_to_empty() {
        let extractor = Extractor::new(Arc::new(ScriptedModel::answering("not json at all")));
        let result = extractor.extract("anything").await;
        assert!(result.entities.is_empty());
        assert!(result.relations.is_empty());
    }

    #[tokio::test]
    async fn model_failure_degrades_to_empty() {
        let extractor = Extractor::new(Arc::new(ScriptedModel::failing_on(VALID_BODY, "anything")));
        let result = extractor.extract("anything").await;
        assert!(result.entities.is_empty());
    }

    #[tokio::test]
    async fn one_failed_chunk_does_not_abort_the_batch() {
        let model = ScriptedModel::failing_on(VALID_BODY, "chunk three");
        let extractor = Extractor::new(Arc::new(model)).with_concurrency(2);

        let chunks = vec![
            chunk("c1", "chunk one"),
            chunk("c2", "chunk two"),
            chunk("c3", "chunk three"),
            chunk("c4", "chunk four"),
            chunk("c5", "chunk five"),
        ];

        let results = extractor.extract_many(&chunks).await;

        assert_eq!(results.len(), 5);
        for (result, chunk) in results.iter().zip(&chunks) {
            assert_eq!(result.chunk_id, chunk.id);
        }
        assert!(results[2].extraction.entities.is_empty());
        assert!(results[2].extraction.relations.is_empty());
        for index in [0, 1, 3, 4] {
            assert_eq!(results[index].extraction.entities.len(), 2);
        }
    }
}
