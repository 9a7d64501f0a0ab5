use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tracing::warn;

use kgrag_graph::store::{params, GraphStore, Row};

/// Cap on one-hop neighborhood rows fetched per query.
const NEIGHBOR_ROW_CAP: i64 = 20;
/// Source excerpts are truncated to this many characters.
const EXCERPT_PREVIEW_CHARS: usize = 300;

/// Graph-traversal retrieval: substring entity matching, one-hop
/// neighborhood expansion, and the provenance-linked section texts.
pub struct Retriever {
    store: Arc<dyn GraphStore>,
}

/// One row of the matched entities' one-hop neighborhood.
#[derive(Debug, Clone)]
pub struct GraphConnection {
    pub entity: String,
    pub relation: String,
    pub neighbor: String,
    pub neighbor_type: String,
}

/// Bounded, structured context for a generation step.
#[derive(Debug, Clone, Default)]
pub struct RetrievedContext {
    pub connections: Vec<GraphConnection>,
    pub excerpts: Vec<String>,
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty() && self.excerpts.is_empty()
    }

    /// Human-readable structured listing: a graph-connections block plus a
    /// source-excerpts block.
    pub fn to_listing(&self) -> String {
        let mut listing = String::new();

        if !self.connections.is_empty() {
            listing.push_str("GRAPH CONNECTIONS:\n");
            for connection in &self.connections {
                listing.push_str(&format!(
                    "- {} -[{}]-> {} ({})\n",
                    connection.entity,
                    connection.relation,
                    connection.neighbor,
                    connection.neighbor_type
                ));
            }
        }

        if !self.excerpts.is_empty() {
            if !listing.is_empty() {
                listing.push('\n');
            }
            listing.push_str("SOURCE TEXT:\n");
            for (index, excerpt) in self.excerpts.iter().enumerate() {
                listing.push_str(&format!("[{}] {}\n", index + 1, excerpt));
            }
        }

        listing
    }
}

impl Retriever {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self { store }
    }

    /// Graph-grounded context for a natural-language query.
    ///
    /// Never fails: an unreachable store or an empty match both come back
    /// as the empty context so the caller can degrade gracefully.
    pub async fn retrieve(&self, query: &str, limit: usize) -> RetrievedContext {
        match self.try_retrieve(query, limit).await {
            Ok(context) => context,
            Err(err) => {
                warn!("retrieval failed, returning empty context: {err:#}");
                RetrievedContext::default()
            }
        }
    }

    async fn try_retrieve(&self, query: &str, limit: usize) -> Result<RetrievedContext> {
        let matches = self
            .store
            .fetch(
                "MATCH (e) \
                 WHERE e.name IS NOT NULL AND toLower(e.name) CONTAINS toLower($q) \
                 RETURN e.name AS name \
                 LIMIT $limit",
                params(json!({ "q": query, "limit": limit as i64 })),
                &["name"],
            )
            .await?;

        let names: Vec<String> = matches
            .into_iter()
            .filter_map(|mut row| row.remove("name"))
            .collect();
        if names.is_empty() {
            return Ok(RetrievedContext::default());
        }

        let connections = self
            .store
            .fetch(
                "MATCH (e)-[r]-(n) \
                 WHERE e.name IN $names AND n.name IS NOT NULL \
                 RETURN e.name AS entity, type(r) AS relation, \
                        n.name AS neighbor, labels(n)[0] AS neighbor_type \
                 LIMIT $cap",
                params(json!({ "names": names, "cap": NEIGHBOR_ROW_CAP })),
                &["entity", "relation", "neighbor", "neighbor_type"],
            )
            .await?
            .into_iter()
            .map(|row| GraphConnection {
                entity: column(&row, "entity"),
                relation: column(&row, "relation"),
                neighbor: column(&row, "neighbor"),
                neighbor_type: column(&row, "neighbor_type"),
            })
            .collect();

        let excerpts = self
            .store
            .fetch(
                "MATCH (s:Section)-[:MENTIONS]->(e) \
                 WHERE e.name IN $names \
                 RETURN DISTINCT s.text AS text \
                 LIMIT $limit",
                params(json!({ "names": names, "limit": limit as i64 })),
                &["text"],
            )
            .await?
            .into_iter()
            .filter_map(|mut row| row.remove("text"))
            .map(|text| truncate_excerpt(&text, EXCERPT_PREVIEW_CHARS))
            .collect();

        Ok(RetrievedContext {
            connections,
            excerpts,
        })
    }
}

fn column(row: &Row, name: &str) -> String {
    row.get(name).cloned().unwrap_or_default()
}

fn truncate_excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let preview: String = text.chars().take(max_chars).collect();
    format!("{preview}...")
}
