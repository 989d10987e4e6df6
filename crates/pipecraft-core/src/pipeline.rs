//! Pipeline documents and nested-pipeline references.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, PipelineId, Result};

/// Fields the backend adds to stored documents. Removed by name at any depth
/// before comparing, including inside stage parameter maps.
pub const BOOKKEEPING_FIELDS: [&str; 5] = ["id", "index", "lastModifiedBy", "updateTs", "schema"];

/// A pipeline document as rendered from templates or stored by the backend.
///
/// The document is kept as a free-form JSON object: only `application`,
/// `name`, `id` and `stages` carry meaning here, everything else is compared
/// verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineDocument(Map<String, Value>);

impl PipelineDocument {
    /// Wrap a JSON value. The value must be an object with string
    /// `application` and `name` fields.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(fields) = value else {
            return Err(Error::InvalidDocument(format!(
                "expected a JSON object, got {}",
                type_name(&value)
            )));
        };
        let doc = Self(fields);
        doc.application()?;
        doc.name()?;
        Ok(doc)
    }

    /// Parse a serialized document.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        Self::from_value(serde_json::from_slice(bytes)?)
    }

    pub fn application(&self) -> Result<&str> {
        self.string_field("application")
    }

    pub fn name(&self) -> Result<&str> {
        self.string_field("name")
    }

    /// The backend identifier, if present and non-empty.
    pub fn id(&self) -> Option<PipelineId> {
        self.0
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(PipelineId::from)
    }

    pub fn set_id(&mut self, id: &PipelineId) {
        self.0
            .insert("id".to_string(), Value::String(id.to_string()));
    }

    pub fn stages(&self) -> Option<&Vec<Value>> {
        self.0.get("stages").and_then(Value::as_array)
    }

    pub fn stages_mut(&mut self) -> Option<&mut Vec<Value>> {
        self.0.get_mut("stages").and_then(Value::as_array_mut)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Remove every bookkeeping field, recursively.
    pub fn strip_bookkeeping(&mut self) {
        strip_fields(&mut self.0);
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// A short `application/name` label for log lines and errors.
    pub fn label(&self) -> String {
        format!(
            "{}/{}",
            self.application().unwrap_or("?"),
            self.name().unwrap_or("?")
        )
    }

    fn string_field(&self, field: &str) -> Result<&str> {
        match self.0.get(field) {
            Some(Value::String(s)) => Ok(s),
            Some(other) => Err(Error::InvalidDocument(format!(
                "field '{}' must be a string, got {}",
                field,
                type_name(other)
            ))),
            None => Err(Error::InvalidDocument(format!(
                "missing required field '{}'",
                field
            ))),
        }
    }
}

fn strip_fields(fields: &mut Map<String, Value>) {
    for key in BOOKKEEPING_FIELDS {
        fields.remove(key);
    }
    for value in fields.values_mut() {
        strip_value(value);
    }
}

fn strip_value(value: &mut Value) {
    match value {
        Value::Object(fields) => strip_fields(fields),
        Value::Array(items) => items.iter_mut().for_each(strip_value),
        _ => {}
    }
}

/// Which side of a reconciliation a document came from. The same JSON string
/// means a pipeline name on the desired side and a backend identifier on the
/// current side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Desired,
    Current,
}

/// The value of a stage's `pipeline` field.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineRef {
    /// Name of a pipeline in the stage's application.
    Name(String),
    /// A fully inlined nested pipeline definition.
    Embedded(Box<PipelineDocument>),
    /// Backend-assigned identifier. Only found on the current side.
    Identifier(PipelineId),
}

impl PipelineRef {
    pub fn parse(value: &Value, side: Side) -> Result<Self> {
        match (value, side) {
            (Value::String(s), Side::Desired) => Ok(Self::Name(s.clone())),
            (Value::String(s), Side::Current) => Ok(Self::Identifier(PipelineId::from(s.as_str()))),
            (Value::Object(_), _) => Ok(Self::Embedded(Box::new(PipelineDocument::from_value(
                value.clone(),
            )?))),
            (other, _) => Err(Error::InvalidDocument(format!(
                "stage 'pipeline' must be a string or an object, got {}",
                type_name(other)
            ))),
        }
    }
}

/// A stage that points at another pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct NestedReference {
    /// Position of the stage in `stages`.
    pub stage: usize,
    /// The stage's `application` field, naming the nested pipeline's owner.
    pub application: Option<String>,
    pub reference: PipelineRef,
}

impl NestedReference {
    /// The owning application, or `MissingOwningApplication` for the given
    /// parent pipeline.
    pub fn owning_application(&self, parent: &PipelineDocument) -> Result<&str> {
        self.application
            .as_deref()
            .ok_or_else(|| Error::MissingOwningApplication {
                pipeline: parent.label(),
                stage: self.stage,
            })
    }
}

impl PipelineDocument {
    /// Every stage carrying a `pipeline` field, parsed for the given side.
    pub fn nested_references(&self, side: Side) -> Result<Vec<NestedReference>> {
        let Some(stages) = self.stages() else {
            return Ok(Vec::new());
        };

        let mut refs = Vec::new();
        for (index, stage) in stages.iter().enumerate() {
            let Some(value) = stage.get("pipeline") else {
                continue;
            };
            refs.push(NestedReference {
                stage: index,
                application: stage
                    .get("application")
                    .and_then(Value::as_str)
                    .map(String::from),
                reference: PipelineRef::parse(value, side)?,
            });
        }
        Ok(refs)
    }

    /// Replace the `pipeline` field of the stage at `index`.
    pub fn set_stage_pipeline(&mut self, index: usize, value: Value) {
        if let Some(Value::Object(stage)) = self.stages_mut().and_then(|s| s.get_mut(index)) {
            stage.insert("pipeline".to_string(), value);
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_requires_identity_fields() {
        let result = PipelineDocument::from_value(json!({"name": "main"}));
        assert!(matches!(result, Err(Error::InvalidDocument(_))));

        let result = PipelineDocument::from_value(json!({"application": "app", "name": 42}));
        assert!(matches!(result, Err(Error::InvalidDocument(_))));

        let result = PipelineDocument::from_value(json!(["not", "an", "object"]));
        assert!(matches!(result, Err(Error::InvalidDocument(_))));
    }

    #[test]
    fn test_id_ignores_empty_strings() {
        let doc =
            PipelineDocument::from_value(json!({"application": "a", "name": "n", "id": ""}))
                .unwrap();
        assert_eq!(doc.id(), None);

        let doc =
            PipelineDocument::from_value(json!({"application": "a", "name": "n", "id": "42"}))
                .unwrap();
        assert_eq!(doc.id(), Some(PipelineId::from("42")));
    }

    #[test]
    fn test_strip_bookkeeping_at_every_depth() {
        let mut doc = PipelineDocument::from_value(json!({
            "application": "app",
            "name": "main",
            "id": "m1",
            "schema": "1",
            "updateTs": "1700000000",
            "lastModifiedBy": "someone",
            "stages": [
                {"type": "wait", "index": 0, "waitTime": 30},
                {"type": "webhook", "parameters": {"id": "user-param", "url": "http://x"}}
            ]
        }))
        .unwrap();

        doc.strip_bookkeeping();

        assert_eq!(
            doc.into_value(),
            json!({
                "application": "app",
                "name": "main",
                "stages": [
                    {"type": "wait", "waitTime": 30},
                    {"type": "webhook", "parameters": {"url": "http://x"}}
                ]
            })
        );
    }

    #[test]
    fn test_parse_reference_depends_on_side() {
        let value = json!("sub");
        assert_eq!(
            PipelineRef::parse(&value, Side::Desired).unwrap(),
            PipelineRef::Name("sub".to_string())
        );
        assert_eq!(
            PipelineRef::parse(&value, Side::Current).unwrap(),
            PipelineRef::Identifier(PipelineId::from("sub"))
        );

        let embedded = json!({"application": "a", "name": "sub"});
        assert!(matches!(
            PipelineRef::parse(&embedded, Side::Desired).unwrap(),
            PipelineRef::Embedded(_)
        ));

        assert!(PipelineRef::parse(&json!(7), Side::Desired).is_err());
    }

    #[test]
    fn test_embedded_reference_without_name_is_invalid() {
        let result = PipelineRef::parse(&json!({"application": "a"}), Side::Desired);
        assert!(matches!(result, Err(Error::InvalidDocument(_))));
    }

    #[test]
    fn test_nested_references_skip_plain_stages() {
        let doc = PipelineDocument::from_value(json!({
            "application": "app",
            "name": "main",
            "stages": [
                {"type": "wait"},
                {"type": "pipeline", "application": "app", "pipeline": "sub"},
                {"type": "pipeline", "pipeline": "orphan"}
            ]
        }))
        .unwrap();

        let refs = doc.nested_references(Side::Desired).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].stage, 1);
        assert_eq!(refs[0].application.as_deref(), Some("app"));
        assert_eq!(refs[1].stage, 2);
        assert!(matches!(
            refs[1].owning_application(&doc),
            Err(Error::MissingOwningApplication { stage: 2, .. })
        ));
    }
}
