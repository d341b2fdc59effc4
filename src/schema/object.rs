use std::cmp::Ordering;

use serde_json::{Map, Value};

use super::{child_path, indent, json_type_name, Issue, SchemaField};

pub struct ObjectField {
    name: String,
    description: Option<String>,
    required: bool,
    properties: Vec<Box<dyn SchemaField>>,
    additional_properties: Option<bool>,
}

impl Clone for ObjectField {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            required: self.required,
            properties: self.properties.iter().map(|p| p.clone_box()).collect(),
            additional_properties: self.additional_properties,
        }
    }
}

impl ObjectField {
    pub fn new_full(
        name: impl Into<String>,
        description: Option<String>,
        required: bool,
        mut properties: Vec<Box<dyn SchemaField>>,
        additional_properties: Option<bool>,
    ) -> Self {
        properties.sort_by(|a, b| match (a.required(), b.required()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => Ordering::Equal,
        });

        Self {
            name: name.into(),
            description,
            required,
            properties,
            additional_properties,
        }
    }

    pub fn new(
        name: impl Into<String>,
        properties: impl IntoIterator<Item = Box<dyn SchemaField>>,
    ) -> Self {
        Self::new_full(name, None, true, properties.into_iter().collect(), None)
    }

    pub fn description(self, description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..self
        }
    }

    pub fn required(self) -> Self {
        Self {
            required: true,
            ..self
        }
    }

    pub fn optional(self) -> Self {
        Self {
            required: false,
            ..self
        }
    }

    pub fn additional_properties(self, additional_properties: bool) -> Self {
        Self {
            additional_properties: Some(additional_properties),
            ..self
        }
    }

    pub fn properties(&self) -> &[Box<dyn SchemaField>] {
        &self.properties
    }

    pub fn properties_description(&self) -> String {
        let properties = self
            .properties
            .iter()
            .map(|property| property.to_plain_description())
            .collect::<Vec<_>>()
            .join(",\n");

        let properties = indent(&properties, 4);

        if properties.is_empty() {
            "{}".into()
        } else {
            format!("{{\n{}\n}}", properties)
        }
    }

    pub(crate) fn check_properties(&self, path: &str, object: &Map<String, Value>, issues: &mut Vec<Issue>) {
        for property in &self.properties {
            match object.get(property.name()) {
                Some(value) => {
                    property.check(&child_path(path, property.name()), value, issues);
                }
                None => {
                    if property.required() {
                        issues.push(Issue::new(
                            child_path(path, property.name()),
                            "missing required field",
                        ));
                    }
                }
            }
        }

        if self.additional_properties == Some(false) {
            for key in object.keys() {
                if !self.properties.iter().any(|p| p.name() == key) {
                    issues.push(Issue::new(child_path(path, key), "unexpected field"));
                }
            }
        }
    }
}

impl SchemaField for ObjectField {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn required(&self) -> bool {
        self.required
    }

    fn type_name(&self) -> &str {
        "object"
    }

    fn to_json_schema(&self) -> Value {
        let mut fields = Map::<String, Value>::new();

        fields.insert("type".into(), "object".into());
        fields.insert(
            "properties".into(),
            Map::from_iter(
                self.properties
                    .iter()
                    .map(|property| (property.name().into(), property.to_json_schema())),
            )
            .into(),
        );
        fields.insert(
            "required".into(),
            self.properties
                .iter()
                .filter(|property| property.required())
                .map(|property| property.name())
                .collect::<Vec<_>>()
                .into(),
        );
        if let Some(description) = self.description() {
            fields.insert("description".into(), description.into());
        }

        let additional_properties = self.additional_properties.unwrap_or(true);
        fields.insert("additionalProperties".into(), additional_properties.into());

        Value::Object(fields)
    }

    fn to_plain_description(&self) -> String {
        let type_info = if self.required {
            "object"
        } else {
            "object, optional"
        };

        format!(
            "{} ({}): {}",
            self.name,
            type_info,
            self.properties_description()
        )
    }

    fn check(&self, path: &str, value: &Value, issues: &mut Vec<Issue>) {
        let Value::Object(object) = value else {
            issues.push(Issue::new(
                path,
                format!("expected object, got {}", json_type_name(value)),
            ));
            return;
        };

        self.check_properties(path, object, issues);
    }

    fn clone_box(&self) -> Box<dyn SchemaField> {
        Box::new(self.clone())
    }
}

impl From<ObjectField> for Box<dyn SchemaField> {
    fn from(value: ObjectField) -> Self {
        Box::new(value)
    }
}
