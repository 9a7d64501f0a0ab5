//! Per-document ingestion orchestration: clean, chunk, extract,
//! canonicalize, validate, build.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};
use uuid::Uuid;

use kgrag_extract::{canonicalize, validate, Extractor, LanguageModel};
use kgrag_graph::store::GraphStore;
use kgrag_graph::writer::GraphWriter;
use kgrag_ingest::{normalize, Chunker, ChunkerConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionStatus {
    Pending,
    Completed,
    Failed,
}

/// Outcome for one document's pipeline run. Terminal once the status is
/// completed or failed.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentOutcome {
    pub doc_id: String,
    pub chunks: usize,
    pub status: IngestionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Batch-level outcome. Documents are independent units of work: a failed
/// document marks the batch failed, but writes already committed for other
/// documents stay committed, and per-document outcomes let callers retry
/// only what failed.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub status: IngestionStatus,
    pub total_documents: usize,
    pub total_chunks: usize,
    pub doc_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub documents: Vec<DocumentOutcome>,
}

/// Sequences the ingestion stages per document and across a batch.
pub struct IngestionPipeline {
    chunker: Chunker,
    extractor: Extractor,
    writer: GraphWriter,
}

impl IngestionPipeline {
    pub fn new(model: Arc<dyn LanguageModel>, store: Arc<dyn GraphStore>) -> Self {
        Self {
            chunker: Chunker::new(ChunkerConfig::default()),
            extractor: Extractor::new(model),
            writer: GraphWriter::new(store),
        }
    }

    pub fn with_chunker(mut self, chunker: Chunker) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Ingest a batch of raw document texts. Never returns an error: stage
    /// failures are translated into the structured report.
    pub async fn ingest_documents(&self, documents: &[String]) -> IngestionReport {
        let mut report = IngestionReport {
            status: IngestionStatus::Pending,
            total_documents: documents.len(),
            total_chunks: 0,
            doc_ids: Vec::new(),
            error: None,
            documents: Vec::new(),
        };

        for text in documents {
            let outcome = self.ingest_document(text).await;
            report.total_chunks += outcome.chunks;
            report.doc_ids.push(outcome.doc_id.clone());
            if outcome.status == IngestionStatus::Failed {
                report.status = IngestionStatus::Failed;
                if report.error.is_none() {
                    report.error = outcome.error.clone();
                }
            }
            report.documents.push(outcome);
        }

        if report.status == IngestionStatus::Pending {
            report.status = IngestionStatus::Completed;
        }
        report
    }

    async fn ingest_document(&self, raw: &str) -> DocumentOutcome {
        let doc_id = Uuid::new_v4().to_string();
        match self.run_stages(&doc_id, raw).await {
            Ok(chunks) => DocumentOutcome {
                doc_id,
                chunks,
                status: IngestionStatus::Completed,
                error: None,
            },
            Err(err) => {
                error!("ingestion of document {doc_id} failed: {err:#}");
                DocumentOutcome {
                    doc_id,
                    chunks: 0,
                    status: IngestionStatus::Failed,
                    error: Some(format!("{err:#}")),
                }
            }
        }
    }

    async fn run_stages(&self, doc_id: &str, raw: &str) -> anyhow::Result<usize> {
        let cleaned = normalize(raw);

        let chunks = self.chunker.chunk_text(doc_id, &cleaned);
        info!("document {doc_id}: {} chunks", chunks.len());

        let mut results = self.extractor.extract_many(&chunks).await;

        canonicalize(&mut results);
        validate(&mut results);

        self.writer
            .write_document_graph(doc_id, &chunks, &results)
            .await?;

        Ok(chunks.len())
    }
}
