use std::collections::HashMap;

use crate::schema::ChunkExtraction;

/// Merge entity mentions that denote the same real-world entity across a
/// document's extraction results.
///
/// One canonical spelling is chosen per `lowercase(trim(name))` key: the
/// first literal name seen in result-iteration order. Every entity name is
/// rewritten to its canonical spelling; relation endpoints are rewritten
/// only when their name was also extracted as an entity, otherwise they are
/// left untouched.
pub fn canonicalize(results: &mut [ChunkExtraction]) {
    let mut canonical: HashMap<String, String> = HashMap::new();

    for result in results.iter() {
        for entity in &result.extraction.entities {
            canonical
                .entry(normalized_key(&entity.name))
                .or_insert_with(|| entity.name.trim().to_string());
        }
    }

    for result in results.iter_mut() {
        for entity in &mut result.extraction.entities {
            if let Some(name) = canonical.get(&normalized_key(&entity.name)) {
                entity.name = name.clone();
            }
        }
        for relation in &mut result.extraction.relations {
            if let Some(name) = canonical.get(&normalized_key(&relation.source)) {
                relation.source = name.clone();
            }
            if let Some(name) = canonical.get(&normalized_key(&relation.target)) {
                relation.target = name.clone();
            }
        }
    }
}

fn normalized_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{EntityMention, ExtractionResult, RelationMention};
    use serde_json::Map;

    fn entity(name: &str, entity_type: &str) -> EntityMention {
        EntityMention {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            properties: Map::new(),
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

    fn result(chunk_id: &str, entities: Vec<EntityMention>, relations: Vec<RelationMention>) -> ChunkExtraction {
        ChunkExtraction {
            chunk_id: chunk_id.to_string(),
            extraction: ExtractionResult { entities, relations },
        }
    }

    #[test]
    fn first_seen_spelling_wins() {
        let mut results = vec![
            result("c1", vec![entity("Google Inc.", "ORGANIZATION")], vec![]),
            result("c2", vec![entity("google inc.", "ORGANIZATION")], vec![]),
        ];

        canonicalize(&mut results);

        assert_eq!(results[0].extraction.entities[0].name, "Google Inc.");
        assert_eq!(results[1].extraction.entities[0].name, "Google Inc.");
    }

    #[test]
    fn relation_endpoints_follow_the_canonical_name() {
        let mut results = vec![
            result(
                "c1",
                vec![entity("Alice", "PERSON"), entity("Acme Corp", "ORGANIZATION")],
                vec![relation("alice", "ACME CORP", "WORKS_FOR")],
            ),
        ];

        canonicalize(&mut results);

        let rel = &results[0].extraction.relations[0];
        assert_eq!(rel.source, "Alice");
        assert_eq!(rel.target, "Acme Corp");
    }

    #[test]
    fn unknown_endpoints_are_left_as_written() {
        let mut results = vec![result(
            "c1",
            vec![entity("Alice", "PERSON")],
            vec![relation("Alice", "Never Extracted", "MENTIONS")],
        )];

        canonicalize(&mut results);

        assert_eq!(results[0].extraction.relations[0].target, "Never Extracted");
    }

    #[test]
    fn canonical_choice_follows_result_order() {
        let mut results = vec![
            result("c1", vec![entity("  rust  ", "TECHNOLOGY")], vec![]),
            result("c2", vec![entity("Rust", "TECHNOLOGY")], vec![]),
        ];

        canonicalize(&mut results);

        // The first-seen mention (trimmed) is the canonical spelling.
        assert_eq!(results[1].extraction.entities[0].name, "rust");
    }
}
