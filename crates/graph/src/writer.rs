use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use kgrag_extract::schema::{entity_label, relation_label, ChunkExtraction};
use kgrag_ingest::Chunk;

use crate::store::{params, GraphStore};

/// Rows per provenance-link batch; bounds the size of one transaction.
const MENTIONS_PAGE_SIZE: usize = 1000;

/// Persists a document's canonical entities and validated relations into
/// the graph store as batched, idempotent upserts.
///
/// Document and Section creation (steps 1-2) is load-bearing and propagates
/// failure; entity, relation and provenance batches (steps 3-5) degrade per
/// batch, so one bad batch never blocks its siblings.
pub struct GraphWriter {
    store: Arc<dyn GraphStore>,
}

impl GraphWriter {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    pub async fn write_document_graph(
        &self,
        doc_id: &str,
        chunks: &[Chunk],
        results: &[ChunkExtraction],
    ) -> Result<()> {
        self.upsert_document(doc_id).await?;
        self.upsert_sections(doc_id, chunks).await?;

        let entities = merge_entities(results);
        let entity_count = entities.len();
        self.upsert_entities(entities).await;
        self.upsert_relations(results).await;
        self.link_mentions(results).await;

        info!(
            "wrote document graph for {doc_id}: {} sections, {} entities",
            chunks.len(),
            entity_count
        );
        Ok(())
    }

    async fn upsert_document(&self, doc_id: &str) -> Result<()> {
        self.store
            .run(
                "MERGE (d:Document {id: $doc_id})",
                params(json!({ "doc_id": doc_id })),
            )
            .await
    }

    /// One multi-row upsert for all sections, each linked to the document.
    async fn upsert_sections(&self, doc_id: &str, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let rows: Vec<Value> = chunks
            .iter()
            .map(|chunk| json!({ "id": chunk.id, "text": chunk.text }))
            .collect();

        self.store
            .run(
                "UNWIND $rows AS row \
                 MERGE (s:Section {id: row.id}) \
                 SET s.text = row.text \
                 WITH s \
                 MATCH (d:Document {id: $doc_id}) \
                 MERGE (d)-[:HAS_SECTION]->(s)",
                params(json!({ "rows": rows, "doc_id": doc_id })),
            )
            .await
    }

    /// Upsert the document's deduplicated entities, one batched query per
    /// type label. A failed label batch is logged and skipped.
    async fn upsert_entities(&self, entities: HashMap<(String, &'static str), Map<String, Value>>) {
        let mut by_label: HashMap<&'static str, Vec<Value>> = HashMap::new();
        for ((name, label), props) in entities {
            by_label
                .entry(label)
                .or_default()
                .push(json!({ "name": name, "props": props }));
        }

        for (label, rows) in by_label {
            let statement = format!(
                "UNWIND $rows AS row \
                 MERGE (e:{label} {{name: row.name}}) \
                 SET e += row.props"
            );
            if let Err(err) = self.store.run(&statement, params(json!({ "rows": rows }))).await {
                warn!("entity batch for label {label} failed, skipping: {err:#}");
            }
        }
    }

    /// Upsert relations grouped by type, matching both endpoints by name.
    ///
    /// Endpoints use MATCH, not MERGE: a relation naming an entity that was
    /// never extracted writes nothing instead of creating an orphan node.
    async fn upsert_relations(&self, results: &[ChunkExtraction]) {
        let mut by_type: HashMap<&'static str, Vec<Value>> = HashMap::new();
        for result in results {
            for relation in &result.extraction.relations {
                let label = relation_label(&relation.rel_type);
                by_type.entry(label).or_default().push(json!({
                    "source": relation.source,
                    "target": relation.target,
                    "props": relation.properties,
                }));
            }
        }

        for (label, rows) in by_type {
            let statement = format!(
                "UNWIND $rows AS row \
                 MATCH (a {{name: row.source}}) \
                 MATCH (b {{name: row.target}}) \
                 MERGE (a)-[r:{label}]->(b) \
                 SET r += row.props"
            );
            if let Err(err) = self.store.run(&statement, params(json!({ "rows": rows }))).await {
                warn!("relation batch for type {label} failed, skipping: {err:#}");
            }
        }
    }

    /// Section-to-entity provenance links, written in fixed-size pages.
    async fn link_mentions(&self, results: &[ChunkExtraction]) {
        let mut rows = Vec::new();
        for result in results {
            for entity in &result.extraction.entities {
                if entity.name.is_empty() {
                    continue;
                }
                rows.push(json!({ "chunk_id": result.chunk_id, "name": entity.name }));
            }
        }

        for page in rows.chunks(MENTIONS_PAGE_SIZE) {
            let outcome = self
                .store
                .run(
                    "UNWIND $rows AS row \
                     MATCH (s:Section {id: row.chunk_id}) \
                     MATCH (e {name: row.name}) \
                     MERGE (s)-[:MENTIONS]->(e)",
                    params(json!({ "rows": page })),
                )
                .await;
            if let Err(err) = outcome {
                warn!("mentions batch of {} rows failed, skipping: {err:#}", page.len());
            }
        }
    }
}

/// Merge the document-wide entity map: deduplicate by `(name, type label)`,
/// with later property values overwriting earlier ones on key collision.
fn merge_entities(
    results: &[ChunkExtraction],
) -> HashMap<(String, &'static str), Map<String, Value>> {
    let mut merged: HashMap<(String, &'static str), Map<String, Value>> = HashMap::new();
    for result in results {
        for entity in &result.extraction.entities {
            if entity.name.is_empty() {
                continue;
            }
            let label = entity_label(&entity.entity_type);
            let props = merged.entry((entity.name.clone(), label)).or_default();
            for (key, value) in &entity.properties {
                props.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryGraph;
    use kgrag_extract::schema::{EntityMention, ExtractionResult, RelationMention};

    fn chunk(id: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            doc_id: "doc-1".to_string(),
            text: format!("text of {id}"),
        }
    }

    fn entity(name: &str, entity_type: &str) -> EntityMention {
        let mut properties = Map::new();
        properties.insert("source_span".to_string(), json!(name));
        EntityMention {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            properties,
        }
    }

    fn relation(source: &str, target: &str, rel_type: &str) -> RelationMention {
        RelationMention {
            source: source.to_string(),
            target: target.to_string(),
            rel_type: rel_type.to_string(),
            properties: Map::new(),
        }
    }

    fn alice_at_acme(chunk_id: &str) -> ChunkExtraction {
        ChunkExtraction {
            chunk_id: chunk_id.to_string(),
            extraction: ExtractionResult {
                entities: vec![entity("Alice", "PERSON"), entity("Acme Corp", "ORGANIZATION")],
                relations: vec![relation("Alice", "Acme Corp", "WORKS_FOR")],
            },
        }
    }

    #[tokio::test]
    async fn writing_twice_creates_no_duplicates() {
        let store = Arc::new(MemoryGraph::new());
        let writer = GraphWriter::new(store.clone());
        let chunks = vec![chunk("c1")];
        let results = vec![alice_at_acme("c1")];

        writer.write_document_graph("doc-1", &chunks, &results).await.unwrap();
        let first = store.counts().await;
        writer.write_document_graph("doc-1", &chunks, &results).await.unwrap();
        let second = store.counts().await;

        assert_eq!(first, second);
        assert_eq!(second.entities, 2);
        assert_eq!(second.edges, 1);
        assert_eq!(second.sections, 1);
        assert_eq!(second.mentions, 2);
    }

    #[tokio::test]
    async fn entities_merge_across_chunks_with_later_properties_winning() {
        let mut early = entity("Rust", "TECHNOLOGY");
        early.properties.insert("origin".to_string(), json!("chunk one"));
        let mut late = entity("Rust", "TECHNOLOGY");
        late.properties.insert("origin".to_string(), json!("chunk two"));

        let results = vec![
            ChunkExtraction {
                chunk_id: "c1".to_string(),
                extraction: ExtractionResult {
                    entities: vec![early],
                    relations: Vec::new(),
                },
            },
            ChunkExtraction {
                chunk_id: "c2".to_string(),
                extraction: ExtractionResult {
                    entities: vec![late],
                    relations: Vec::new(),
                },
            },
        ];

        let merged = merge_entities(&results);
        assert_eq!(merged.len(), 1);
        let props = &merged[&("Rust".to_string(), "TECHNOLOGY")];
        assert_eq!(props["origin"], json!("chunk two"));
    }

    #[tokio::test]
    async fn section_write_failure_propagates() {
        let store = Arc::new(MemoryGraph::new().failing_on(":Section"));
        let writer = GraphWriter::new(store);

        let outcome = writer
            .write_document_graph("doc-1", &[chunk("c1")], &[alice_at_acme("c1")])
            .await;
        assert!(outcome.is_err());
    }

    #[tokio::test]
    async fn failed_entity_batch_does_not_block_sibling_batches() {
        // PERSON batch fails; the ORGANIZATION batch and its mention link
        // must still land. The relation is skipped only because one of its
        // endpoints never materialized.
        let store = Arc::new(MemoryGraph::new().failing_on("(e:PERSON"));
        let writer = GraphWriter::new(store.clone());

        writer
            .write_document_graph("doc-1", &[chunk("c1")], &[alice_at_acme("c1")])
            .await
            .unwrap();

        let counts = store.counts().await;
        assert_eq!(counts.entities, 1);
        assert!(store.has_entity("Acme Corp").await);
        assert!(!store.has_entity("Alice").await);
        assert_eq!(counts.edges, 0);
        assert_eq!(counts.mentions, 1);
    }

    #[tokio::test]
    async fn relation_to_unextracted_endpoint_is_a_no_op() {
        let store = Arc::new(MemoryGraph::new());
        let writer = GraphWriter::new(store.clone());

        let results = vec![ChunkExtraction {
            chunk_id: "c1".to_string(),
            extraction: ExtractionResult {
                entities: vec![entity("Alice", "PERSON")],
                relations: vec![relation("Alice", "Ghost Corp", "WORKS_FOR")],
            },
        }];

        writer.write_document_graph("doc-1", &[chunk("c1")], &results).await.unwrap();

        let counts = store.counts().await;
        assert_eq!(counts.entities, 1);
        assert_eq!(counts.edges, 0);
    }

    #[tokio::test]
    async fn provenance_links_are_paged() {
        let store = Arc::new(MemoryGraph::new());
        let writer = GraphWriter::new(store.clone());

        // 1200 entities in one chunk forces two MENTIONS pages.
        let entities: Vec<EntityMention> = (0..1200)
            .map(|i| entity(&format!("entity-{i}"), "CONCEPT"))
            .collect();
        let results = vec![ChunkExtraction {
            chunk_id: "c1".to_string(),
            extraction: ExtractionResult {
                entities,
                relations: Vec::new(),
            },
        }];

        writer.write_document_graph("doc-1", &[chunk("c1")], &results).await.unwrap();

        let mention_batches = store
            .recorded_statements()
            .await
            .iter()
            .filter(|s| s.contains(":MENTIONS"))
            .count();
        assert_eq!(mention_batches, 2);
        assert_eq!(store.counts().await.mentions, 1200);
    }
}
