//! Rewrites a stored pipeline into the shape of the rendered one.

use tracing::{debug, warn};

use crate::index::{IdentifierMap, MappedRef};
use crate::pipeline::{PipelineDocument, PipelineRef, Side};
use crate::{PipelineId, Result};

/// Normalize a stored document for comparison against a desired one.
///
/// Bookkeeping fields are stripped at every depth, then each nested
/// identifier is replaced with whatever the identifier map holds for it: a
/// pipeline name, or the stored nested pipeline (itself normalized). An
/// identifier missing from the map stays as-is so the diff shows it.
pub fn normalize(current: PipelineDocument, identifiers: &IdentifierMap) -> Result<PipelineDocument> {
    normalize_inner(current, identifiers, &mut Vec::new())
}

fn normalize_inner(
    mut current: PipelineDocument,
    identifiers: &IdentifierMap,
    ancestors: &mut Vec<PipelineId>,
) -> Result<PipelineDocument> {
    current.strip_bookkeeping();

    for nested in current.nested_references(Side::Current)? {
        let PipelineRef::Identifier(id) = nested.reference else {
            continue;
        };

        match identifiers.get(&id) {
            Some(MappedRef::Name(name)) => {
                current.set_stage_pipeline(nested.stage, serde_json::Value::String(name.clone()));
            }
            Some(MappedRef::Pipeline(stored)) => {
                if ancestors.contains(&id) {
                    warn!(id = %id, "Nested pipeline references itself; leaving identifier");
                    continue;
                }
                ancestors.push(id.clone());
                let inlined = normalize_inner((**stored).clone(), identifiers, ancestors)?;
                ancestors.pop();
                current.set_stage_pipeline(nested.stage, inlined.into_value());
            }
            None => {
                debug!(id = %id, stage = nested.stage, "No desired reference for nested identifier");
            }
        }
    }

    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::BOOKKEEPING_FIELDS;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    fn doc(value: Value) -> PipelineDocument {
        PipelineDocument::from_value(value).unwrap()
    }

    fn contains_key(value: &Value, key: &str) -> bool {
        match value {
            Value::Object(fields) => {
                fields.contains_key(key) || fields.values().any(|v| contains_key(v, key))
            }
            Value::Array(items) => items.iter().any(|v| contains_key(v, key)),
            _ => false,
        }
    }

    #[test]
    fn test_strips_bookkeeping_and_keeps_other_fields() {
        let current = doc(json!({
            "id": "m1",
            "schema": "1",
            "application": "app",
            "name": "main",
            "keepWaitingPipelines": false,
            "stages": [{"index": 0, "refId": "1", "type": "wait", "waitTime": 5}]
        }));

        let normalized = normalize(current, &IdentifierMap::new()).unwrap().into_value();

        for key in BOOKKEEPING_FIELDS {
            assert!(!contains_key(&normalized, key), "{} survived", key);
        }
        assert_eq!(
            normalized,
            json!({
                "application": "app",
                "name": "main",
                "keepWaitingPipelines": false,
                "stages": [{"refId": "1", "type": "wait", "waitTime": 5}]
            })
        );
    }

    #[test]
    fn test_identifier_replaced_with_name() {
        let mut map = IdentifierMap::new();
        map.insert(PipelineId::from("1234"), MappedRef::Name("B".to_string()));

        let current = doc(json!({
            "application": "A",
            "name": "main",
            "stages": [{"application": "A", "pipeline": "1234"}]
        }));

        let normalized = normalize(current, &map).unwrap();
        assert_eq!(normalized.stages().unwrap()[0]["pipeline"], json!("B"));
    }

    #[test]
    fn test_identifier_replaced_with_normalized_document() {
        let mut map = IdentifierMap::new();
        map.insert(
            PipelineId::from("1234"),
            MappedRef::Pipeline(Box::new(doc(json!({
                "id": "1234",
                "updateTs": "99",
                "application": "A",
                "name": "B",
                "stages": [{"application": "A", "pipeline": "5678"}]
            })))),
        );
        map.insert(PipelineId::from("5678"), MappedRef::Name("C".to_string()));

        let current = doc(json!({
            "application": "A",
            "name": "main",
            "stages": [{"application": "A", "pipeline": "1234"}]
        }));

        let normalized = normalize(current, &map).unwrap();
        assert_eq!(
            normalized.stages().unwrap()[0]["pipeline"],
            json!({
                "application": "A",
                "name": "B",
                "stages": [{"application": "A", "pipeline": "C"}]
            })
        );
    }

    #[test]
    fn test_unknown_identifier_left_in_place() {
        let current = doc(json!({
            "application": "A",
            "name": "main",
            "stages": [{"application": "A", "pipeline": "dangling"}]
        }));

        let normalized = normalize(current, &IdentifierMap::new()).unwrap();
        assert_eq!(normalized.stages().unwrap()[0]["pipeline"], json!("dangling"));
    }

    #[test]
    fn test_self_reference_does_not_loop() {
        let mut map = IdentifierMap::new();
        map.insert(
            PipelineId::from("loop"),
            MappedRef::Pipeline(Box::new(doc(json!({
                "id": "loop",
                "application": "A",
                "name": "L",
                "stages": [{"application": "A", "pipeline": "loop"}]
            })))),
        );

        let current = doc(json!({
            "application": "A",
            "name": "main",
            "stages": [{"application": "A", "pipeline": "loop"}]
        }));

        let normalized = normalize(current, &map).unwrap();
        let inner = &normalized.stages().unwrap()[0]["pipeline"];
        assert_eq!(inner["name"], json!("L"));
        assert_eq!(inner["stages"][0]["pipeline"], json!("loop"));
    }
}
