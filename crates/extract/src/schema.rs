use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Fixed entity-type vocabulary the extraction prompt constrains the model
/// to. Types double as node labels, so anything outside this list falls
/// back to [`DEFAULT_ENTITY_TYPE`].
pub const ENTITY_TYPES: [&str; 12] = [
    "DOCUMENT",
    "SECTION",
    "PERSON",
    "ORGANIZATION",
    "CONCEPT",
    "TECHNOLOGY",
    "COMPONENT",
    "PROCESS",
    "ATTRIBUTE",
    "EVENT",
    "LOCATION",
    "OUTCOME",
];

/// Fixed relation-type vocabulary; relation types double as edge labels.
pub const RELATION_TYPES: [&str; 12] = [
    "HAS_SECTION",
    "MENTIONS",
    "AUTHORED_BY",
    "WORKS_FOR",
    "USES",
    "IMPLEMENTS",
    "HAS_ATTRIBUTE",
    "PRODUCES",
    "INTERACTS_WITH",
    "LOCATED_AT",
    "PART_OF",
    "DEFINES",
];

pub const DEFAULT_ENTITY_TYPE: &str = "CONCEPT";
pub const DEFAULT_RELATION_TYPE: &str = "RELATED_TO";

/// The one required key in an entity's property map: the verbatim phrase
/// the entity was extracted from.
pub const SOURCE_SPAN_KEY: &str = "source_span";

/// An entity as extracted from a single chunk. Never persisted directly;
/// always canonicalized first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityMention {
    pub name: String,
    #[serde(rename = "type", default)]
    pub entity_type: String,
    /// Open key/value map; `source_span` is the documented required key,
    /// everything else is an extension.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// A relation as extracted from a single chunk, endpoints named by entity
/// name. Validated before persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationMention {
    pub source: String,
    pub target: String,
    #[serde(rename = "type", default)]
    pub rel_type: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(default)]
    pub entities: Vec<EntityMention>,
    #[serde(default)]
    pub relations: Vec<RelationMention>,
}

/// Extraction output tied back to the chunk it came from, so downstream
/// merge logic never depends on completion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkExtraction {
    pub chunk_id: String,
    pub extraction: ExtractionResult,
}

impl ChunkExtraction {
    pub fn empty(chunk_id: String) -> Self {
        Self {
            chunk_id,
            extraction: ExtractionResult::default(),
        }
    }
}

/// Map an extracted entity type onto a node label from the fixed
/// vocabulary, defaulting anything unknown to CONCEPT.
pub fn entity_label(entity_type: &str) -> &'static str {
    ENTITY_TYPES
        .iter()
        .find(|t| t.eq_ignore_ascii_case(entity_type.trim()))
        .copied()
        .unwrap_or(DEFAULT_ENTITY_TYPE)
}

/// Map an extracted relation type onto an edge label, defaulting anything
/// outside the vocabulary to the generic fallback.
pub fn relation_label(rel_type: &str) -> &'static str {
    RELATION_TYPES
        .iter()
        .find(|t| t.eq_ignore_ascii_case(rel_type.trim()))
        .copied()
        .unwrap_or(DEFAULT_RELATION_TYPE)
}
