use crate::schema::{ChunkExtraction, DEFAULT_RELATION_TYPE};

/// Drop structurally invalid relations before persistence: empty endpoints
/// and self-loops are removed, a missing relation type is defaulted to the
/// generic fallback. Entities pass through untouched.
pub fn validate(results: &mut [ChunkExtraction]) {
    for result in results.iter_mut() {
        let relations = &mut result.extraction.relations;
        relations.retain(|r| !r.source.is_empty() && !r.target.is_empty() && r.source != r.target);
        for relation in relations.iter_mut() {
            if relation.rel_type.trim().is_empty() {
                relation.rel_type = DEFAULT_RELATION_TYPE.to_string();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ExtractionResult, RelationMention};
    use serde_json::Map;

    fn relation(source: &str, target: &str, rel_type: &str) -> RelationMention {
        RelationMention {
            source: source.to_string(),
            target: target.to_string(),
            rel_type: rel_type.to_string(),
            properties: Map::new(),
        }
    }

    fn wrap(relations: Vec<RelationMention>) -> Vec<ChunkExtraction> {
        vec![ChunkExtraction {
            chunk_id: "c1".to_string(),
            extraction: ExtractionResult {
                entities: Vec::new(),
                relations,
            },
        }]
    }

    #[test]
    fn drops_self_loops() {
        let mut results = wrap(vec![relation("A", "A", "USES")]);
        validate(&mut results);
        assert!(results[0].extraction.relations.is_empty());
    }

    #[test]
    fn drops_empty_endpoints() {
        let mut results = wrap(vec![
            relation("", "B", "USES"),
            relation("A", "", "USES"),
            relation("A", "B", "USES"),
        ]);
        validate(&mut results);
        assert_eq!(results[0].extraction.relations.len(), 1);
        assert_eq!(results[0].extraction.relations[0].source, "A");
    }

    #[test]
    fn defaults_missing_type_instead_of_dropping() {
        let mut results = wrap(vec![relation("A", "B", "")]);
        validate(&mut results);
        assert_eq!(results[0].extraction.relations.len(), 1);
        assert_eq!(results[0].extraction.relations[0].rel_type, DEFAULT_RELATION_TYPE);
    }
}
