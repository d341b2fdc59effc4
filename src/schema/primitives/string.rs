use regex::Regex;
use serde_json::{Map, Value};

use crate::schema::{Issue, SchemaField};

use super::PrimitiveSchemaField;

#[derive(Clone)]
pub struct StringField {
    name: String,
    description: Option<String>,
    required: bool,
    r#enum: Option<Vec<String>>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<Regex>,
}

impl StringField {
    pub fn new_full(
        name: impl Into<String>,
        description: Option<impl Into<String>>,
        required: bool,
        r#enum: Option<impl IntoIterator<Item = impl Into<String>>>,
    ) -> Self {
        StringField {
            name: name.into(),
            description: description.map(Into::into),
            required,
            r#enum: r#enum.map(|options| {
                let mut options = options.into_iter().map(Into::into).collect::<Vec<_>>();
                options.dedup();
                options
            }),
            min_length: None,
            max_length: None,
            pattern: None,
        }
    }

    pub fn new(name: impl Into<String>) -> Self {
        Self::new_full(name, None::<&str>, true, None::<Vec<&str>>)
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

    pub fn r#enum(self, r#enum: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            r#enum: Some(r#enum.into_iter().map(Into::into).collect()),
            ..self
        }
    }

    pub fn min_length(self, min_length: usize) -> Self {
        Self {
            min_length: Some(min_length),
            ..self
        }
    }

    pub fn max_length(self, max_length: usize) -> Self {
        Self {
            max_length: Some(max_length),
            ..self
        }
    }

    pub fn pattern(self, pattern: Regex) -> Self {
        Self {
            pattern: Some(pattern),
            ..self
        }
    }
}

impl PrimitiveSchemaField for StringField {
    type FieldType = String;

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
        "string"
    }

    fn r#enum(&self) -> Option<&Vec<String>> {
        self.r#enum.as_ref()
    }

    fn coerce(value: &Value) -> Option<String> {
        value.as_str().map(str::to_string)
    }

    fn constraint_schema(&self, fields: &mut Map<String, Value>) {
        if let Some(min_length) = self.min_length {
            fields.insert("minLength".into(), min_length.into());
        }
        if let Some(max_length) = self.max_length {
            fields.insert("maxLength".into(), max_length.into());
        }
        if let Some(pattern) = &self.pattern {
            fields.insert("pattern".into(), pattern.as_str().into());
        }
    }

    fn constraint_check(&self, path: &str, value: &String, issues: &mut Vec<Issue>) {
        let length = value.chars().count();
        if let Some(min_length) = self.min_length {
            if length < min_length {
                issues.push(Issue::new(
                    path,
                    format!("must have at least {} characters", min_length),
                ));
            }
        }
        if let Some(max_length) = self.max_length {
            if length > max_length {
                issues.push(Issue::new(
                    path,
                    format!("must have at most {} characters", max_length),
                ));
            }
        }
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(value) {
                issues.push(Issue::new(
                    path,
                    format!("does not match pattern {}", pattern.as_str()),
                ));
            }
        }
    }

    fn clone_box(&self) -> Box<dyn SchemaField> {
        Box::new(self.clone())
    }
}

impl From<StringField> for Box<dyn SchemaField> {
    fn from(value: StringField) -> Self {
        Box::new(value)
    }
}
