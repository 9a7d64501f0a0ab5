use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use neo4rs::{
    BoltBoolean, BoltFloat, BoltInteger, BoltList, BoltMap, BoltString, BoltType, Graph, Query,
};
use serde_json::{Map, Value};

/// Statement parameters as an open JSON object.
pub type Params = Map<String, Value>;

/// One result row: the requested RETURN aliases mapped to string values.
pub type Row = HashMap<String, String>;

/// Build a [`Params`] map from a `json!({...})` literal.
pub fn params(value: Value) -> Params {
    value.as_object().cloned().unwrap_or_default()
}

/// Query-execution boundary to the graph store.
///
/// The pipeline relies only on pattern matching, merge-by-key upserts and
/// multi-row UNWIND input, so tests substitute the in-memory
/// [`crate::memory::MemoryGraph`] for the Neo4j-backed implementation.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Execute a write statement.
    async fn run(&self, statement: &str, params: Params) -> Result<()>;

    /// Execute a read statement, collecting the named string columns of
    /// every returned row.
    async fn fetch(&self, statement: &str, params: Params, columns: &[&str]) -> Result<Vec<Row>>;
}

/// Neo4j-backed store.
pub struct Neo4jStore {
    graph: Graph,
}

impl Neo4jStore {
    /// Connect to Neo4j. A connection failure here is fatal to the caller:
    /// no pipeline work is possible without the store.
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .context("failed to connect to Neo4j")?;
        Ok(Self { graph })
    }

    /// Uniqueness constraints for Document and Section ids, created once at
    /// startup.
    pub async fn init_schema(&self) -> Result<()> {
        let statements = [
            "CREATE CONSTRAINT document_id IF NOT EXISTS \
             FOR (d:Document) REQUIRE d.id IS UNIQUE",
            "CREATE CONSTRAINT section_id IF NOT EXISTS \
             FOR (s:Section) REQUIRE s.id IS UNIQUE",
        ];
        for statement in statements {
            self.graph
                .run(Query::new(statement.to_string()))
                .await
                .context("failed to create graph schema")?;
        }
        Ok(())
    }

    fn build_query(statement: &str, params: Params) -> Query {
        let mut query = Query::new(statement.to_string());
        for (key, value) in &params {
            query = query.param(key, json_to_bolt(value));
        }
        query
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn run(&self, statement: &str, params: Params) -> Result<()> {
        self.graph
            .run(Self::build_query(statement, params))
            .await
            .context("graph write failed")?;
        Ok(())
    }

    async fn fetch(&self, statement: &str, params: Params, columns: &[&str]) -> Result<Vec<Row>> {
        let mut stream = self
            .graph
            .execute(Self::build_query(statement, params))
            .await
            .context("graph read failed")?;

        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            let mut out = Row::new();
            for column in columns {
                if let Ok(value) = row.get::<String>(column) {
                    out.insert((*column).to_string(), value);
                }
            }
            rows.push(out);
        }
        Ok(rows)
    }
}

/// Convert an open JSON value into its Bolt representation. Null object
/// entries are omitted; Neo4j treats an absent property the same way.
fn json_to_bolt(value: &Value) -> BoltType {
    match value {
        Value::Null => BoltType::String(BoltString::new("")),
        Value::Bool(flag) => BoltType::Boolean(BoltBoolean::new(*flag)),
        Value::Number(number) => match number.as_i64() {
            Some(int) => BoltType::Integer(BoltInteger::new(int)),
            None => BoltType::Float(BoltFloat::new(number.as_f64().unwrap_or(0.0))),
        },
        Value::String(text) => BoltType::String(BoltString::new(text)),
        Value::Array(items) => {
            let mut list = BoltList::new();
            for item in items {
                list.push(json_to_bolt(item));
            }
            BoltType::List(list)
        }
        Value::Object(map) => {
            let mut bolt = BoltMap::new();
            for (key, item) in map {
                if item.is_null() {
                    continue;
                }
                bolt.put(BoltString::new(key), json_to_bolt(item));
            }
            BoltType::Map(bolt)
        }
    }
}
