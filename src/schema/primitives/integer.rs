use serde_json::{Map, Value};

use crate::schema::{Issue, SchemaField};

use super::PrimitiveSchemaField;

#[derive(Clone)]
pub struct IntegerField {
    name: String,
    description: Option<String>,
    required: bool,
    r#enum: Option<Vec<i64>>,
    min: Option<i64>,
    max: Option<i64>,
}

impl IntegerField {
    pub fn new_full(
        name: impl Into<String>,
        description: Option<impl Into<String>>,
        required: bool,
        r#enum: Option<Vec<i64>>,
    ) -> Self {
        IntegerField {
            name: name.into(),
            description: description.map(Into::into),
            required,
            r#enum: r#enum.map(|options| {
                let mut options = options.clone();
                options.dedup();
                options
            }),
            min: None,
            max: None,
        }
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self::new_full(name, None::<&str>, true, None)
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

    pub fn r#enum(self, r#enum: impl IntoIterator<Item = i64>) -> Self {
        Self {
            r#enum: Some(r#enum.into_iter().collect()),
            ..self
        }
    }

    pub fn min(self, min: i64) -> Self {
        Self {
            min: Some(min),
            ..self
        }
    }

    pub fn max(self, max: i64) -> Self {
        Self {
            max: Some(max),
            ..self
        }
    }
}

impl PrimitiveSchemaField for IntegerField {
    type FieldType = i64;

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn required(&self) -> bool {
        self.required
    }

    fn type_name(&self) -> &'static str {
        "integer"
    }

    fn r#enum(&self) -> Option<&Vec<i64>> {
        self.r#enum.as_ref()
    }

    fn coerce(value: &Value) -> Option<i64> {
        value.as_i64()
    }

    fn constraint_schema(&self, fields: &mut Map<String, Value>) {
        if let Some(min) = self.min {
            fields.insert("minimum".into(), min.into());
        }
        if let Some(max) = self.max {
            fields.insert("maximum".into(), max.into());
        }
    }

    fn constraint_check(&self, path: &str, value: &i64, issues: &mut Vec<Issue>) {
        if let Some(min) = self.min {
            if *value < min {
                issues.push(Issue::new(path, format!("must be at least {}", min)));
            }
        }
        if let Some(max) = self.max {
            if *value > max {
                issues.push(Issue::new(path, format!("must be at most {}", max)));
            }
        }
    }

    fn clone_box(&self) -> Box<dyn SchemaField> {
        Box::new(self.clone())
    }
}

impl From<IntegerField> for Box<dyn SchemaField> {
    fn from(value: IntegerField) -> Self {
        Box::new(value)
    }
}
