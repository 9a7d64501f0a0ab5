use std::collections::{BTreeMap, BTreeSet, HashMap};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::store::{GraphStore, Params, Row};

/// In-memory [`GraphStore`] for tests and offline runs.
///
/// It understands exactly the merge/match statement shapes the writer and
/// retriever issue — enough to give upsert semantics without a running
/// Neo4j — and rejects anything else so statement drift shows up in tests.
pub struct MemoryGraph {
    state: Mutex<State>,
    fail_marker: Option<String>,
}

#[derive(Default)]
struct State {
    documents: BTreeSet<String>,
    sections: BTreeMap<String, SectionNode>,
    entities: BTreeMap<String, EntityNode>,
    /// (source, type, target)
    edges: BTreeSet<(String, String, String)>,
    /// (section id, entity name)
    mentions: BTreeSet<(String, String)>,
    statements: Vec<String>,
}

struct SectionNode {
    #[allow(dead_code)]
    doc_id: String,
    text: String,
}

struct EntityNode {
    label: String,
    props: Map<String, Value>,
}

/// Node and edge totals, used to assert idempotence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub documents: usize,
    pub sections: usize,
    pub entities: usize,
    pub edges: usize,
    pub mentions: usize,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            fail_marker: None,
        }
    }

    /// Fail every statement containing `marker` (empty marker fails all),
    /// for partial-failure tests.
    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_string());
        self
    }

    pub async fn counts(&self) -> Counts {
        let state = self.state.lock().await;
        Counts {
            documents: state.documents.len(),
            sections: state.sections.len(),
            entities: state.entities.len(),
            edges: state.edges.len(),
            mentions: state.mentions.len(),
        }
    }

    pub async fn has_entity(&self, name: &str) -> bool {
        self.state.lock().await.entities.contains_key(name)
    }

    pub async fn entity_property(&self, name: &str, key: &str) -> Option<Value> {
        let state = self.state.lock().await;
        state.entities.get(name).and_then(|node| node.props.get(key).cloned())
    }

    pub async fn recorded_statements(&self) -> Vec<String> {
        self.state.lock().await.statements.clone()
    }

    fn check_failure(&self, statement: &str) -> Result<()> {
        if let Some(marker) = &self.fail_marker {
            if marker.is_empty() || statement.contains(marker.as_str()) {
                bail!("injected store failure on: {statement}");
            }
        }
        Ok(())
    }
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn run(&self, statement: &str, params: Params) -> Result<()> {
        self.check_failure(statement)?;
        let mut state = self.state.lock().await;
        state.statements.push(statement.to_string());

        if statement.starts_with("CREATE CONSTRAINT") || statement.trim() == "RETURN 1" {
            return Ok(());
        }

        if statement.contains("DETACH DELETE") {
            let recorded = std::mem::take(&mut state.statements);
            *state = State {
                statements: recorded,
                ..State::default()
            };
            return Ok(());
        }

        if statement.contains("MERGE (d:Document") {
            state.documents.insert(string_param(&params, "doc_id")?);
            return Ok(());
        }

        if statement.contains("MERGE (s:Section") {
            let doc_id = string_param(&params, "doc_id")?;
            for row in rows_param(&params)? {
                let id = row_string(&row, "id")?;
                let text = row_string(&row, "text")?;
                state.sections.insert(
                    id,
                    SectionNode {
                        doc_id: doc_id.clone(),
                        text,
                    },
                );
            }
            return Ok(());
        }

        if let Some(label) = capture(statement, "MERGE (e:", " {name:") {
            for row in rows_param(&params)? {
                let name = row_string(&row, "name")?;
                let props = row
                    .get("props")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                let node = state.entities.entry(name).or_insert_with(|| EntityNode {
                    label: label.clone(),
                    props: Map::new(),
                });
                node.label = label.clone();
                for (key, value) in props {
                    node.props.insert(key, value);
                }
            }
            return Ok(());
        }

        if let Some(rel_type) = capture(statement, "MERGE (a)-[r:", "]->") {
            for row in rows_param(&params)? {
                let source = row_string(&row, "source")?;
                let target = row_string(&row, "target")?;
                // MATCH semantics: both endpoints must already exist.
                if state.entities.contains_key(&source) && state.entities.contains_key(&target) {
                    state.edges.insert((source, rel_type.clone(), target));
                }
            }
            return Ok(());
        }

        if statement.contains(":MENTIONS") {
            for row in rows_param(&params)? {
                let chunk_id = row_string(&row, "chunk_id")?;
                let name = row_string(&row, "name")?;
                if state.sections.contains_key(&chunk_id) && state.entities.contains_key(&name) {
                    state.mentions.insert((chunk_id, name));
                }
            }
            return Ok(());
        }

        bail!("memory store does not understand statement: {statement}");
    }

    async fn fetch(&self, statement: &str, params: Params, _columns: &[&str]) -> Result<Vec<Row>> {
        self.check_failure(statement)?;
        let state = self.state.lock().await;

        if statement.contains("CONTAINS toLower($q)") {
            let needle = string_param(&params, "q")?.to_lowercase();
            let limit = int_param(&params, "limit")?;
            return Ok(state
                .entities
                .keys()
                .filter(|name| name.to_lowercase().contains(&needle))
                .take(limit)
                .map(|name| single_column("name", name))
                .collect());
        }

        if statement.contains("AS neighbor") {
            let names = names_param(&params)?;
            let cap = int_param(&params, "cap")?;
            let mut rows = Vec::new();
            for (source, rel_type, target) in &state.edges {
                if names.contains(source) {
                    rows.push(connection_row(source, rel_type, target, &state));
                }
                if names.contains(target) {
                    rows.push(connection_row(target, rel_type, source, &state));
                }
            }
            rows.truncate(cap);
            return Ok(rows);
        }

        if statement.contains("s.text") {
            let names = names_param(&params)?;
            let limit = int_param(&params, "limit")?;
            let mut texts = BTreeSet::new();
            for (section_id, name) in &state.mentions {
                if names.contains(name) {
                    if let Some(section) = state.sections.get(section_id) {
                        texts.insert(section.text.clone());
                    }
                }
            }
            return Ok(texts
                .into_iter()
                .take(limit)
                .map(|text| single_column("text", &text))
                .collect());
        }

        bail!("memory store does not understand statement: {statement}");
    }
}

fn connection_row(entity: &str, rel_type: &str, neighbor: &str, state: &State) -> Row {
    let neighbor_type = state
        .entities
        .get(neighbor)
        .map(|node| node.label.clone())
        .unwrap_or_default();
    Row::from([
        ("entity".to_string(), entity.to_string()),
        ("relation".to_string(), rel_type.to_string()),
        ("neighbor".to_string(), neighbor.to_string()),
        ("neighbor_type".to_string(), neighbor_type),
    ])
}

fn single_column(column: &str, value: &str) -> Row {
    HashMap::from([(column.to_string(), value.to_string())])
}

/// The text between `prefix` and `suffix`, e.g. the label in a
/// `MERGE (e:PERSON {name: ...})` statement.
fn capture(statement: &str, prefix: &str, suffix: &str) -> Option<String> {
    let start = statement.find(prefix)? + prefix.len();
    let end = statement[start..].find(suffix)? + start;
    Some(statement[start..end].to_string())
}

fn string_param(params: &Params, key: &str) -> Result<String> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("missing string parameter ${key}"))
}

fn int_param(params: &Params, key: &str) -> Result<usize> {
    params
        .get(key)
        .and_then(Value::as_i64)
        .map(|n| n.max(0) as usize)
        .ok_or_else(|| anyhow!("missing integer parameter ${key}"))
}

fn names_param(params: &Params) -> Result<Vec<String>> {
    let values = params
        .get("names")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("missing list parameter $names"))?;
    Ok(values
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect())
}

fn rows_param(params: &Params) -> Result<Vec<Map<String, Value>>> {
    let values = params
        .get("rows")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("missing list parameter $rows"))?;
    Ok(values
        .iter()
        .filter_map(Value::as_object)
        .cloned()
        .collect())
}

fn row_string(row: &Map<String, Value>, key: &str) -> Result<String> {
    row.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("missing row field {key}"))
}
