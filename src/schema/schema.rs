use serde_json::{Map, Value};

use super::{json_type_name, Issue, SchemaField};

/// The shape of the value a task must produce: an ordered set of named
/// field descriptors.
///
/// The JSON-Schema form is used twice — rendered into the prompt so the
/// agent knows what to build, and serialized into the cache key so a
/// schema change invalidates cached transcripts. `serde_json` keeps
/// object keys sorted, so the serialized form is stable across runs.
pub struct Schema {
    fields: Vec<Box<dyn SchemaField>>,
}

impl Clone for Schema {
    fn clone(&self) -> Self {
        Self {
            fields: self.fields.iter().map(|f| f.clone_box()).collect(),
        }
    }
}

impl Schema {
    pub fn new(fields: impl IntoIterator<Item = Box<dyn SchemaField>>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    pub fn fields(&self) -> &[Box<dyn SchemaField>] {
        &self.fields
    }

    /// JSON-Schema for the whole result object. The result shape is
    /// closed: fields not named in the schema are rejected.
    pub fn to_json_schema(&self) -> Value {
        let mut fields = Map::<String, Value>::new();

        fields.insert("type".into(), "object".into());
        fields.insert(
            "properties".into(),
            Map::from_iter(
                self.fields
                    .iter()
                    .map(|field| (field.name().into(), field.to_json_schema())),
            )
            .into(),
        );
        let mut required = self
            .fields
            .iter()
            .filter(|field| field.required())
            .map(|field| field.name())
            .collect::<Vec<_>>();
        required.sort_unstable();
        fields.insert("required".into(), required.into());
        fields.insert("additionalProperties".into(), false.into());

        Value::Object(fields)
    }

    /// The stable serialization hashed into the cache key.
    pub fn canonical_json(&self) -> String {
        self.to_json_schema().to_string()
    }

    /// Plain-text field listing for the prompt.
    pub fn properties_description(&self) -> String {
        self.fields
            .iter()
            .map(|field| field.to_plain_description())
            .collect::<Vec<_>>()
            .join(",\n")
    }

    pub fn validate(&self, value: &Value) -> Result<(), Vec<Issue>> {
        let mut issues = Vec::new();

        let Value::Object(object) = value else {
            issues.push(Issue::new(
                "",
                format!("expected object, got {}", json_type_name(value)),
            ));
            return Err(issues);
        };

        for field in &self.fields {
            match object.get(field.name()) {
                Some(value) => field.check(field.name(), value, &mut issues),
                None => {
                    if field.required() {
                        issues.push(Issue::new(field.name(), "missing required field"));
                    }
                }
            }
        }

        for key in object.keys() {
            if !self.fields.iter().any(|f| f.name() == key) {
                issues.push(Issue::new(key.clone(), "unexpected field"));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}
