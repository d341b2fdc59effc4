use serde_json::Value;

use crate::schema::SchemaField;

use super::PrimitiveSchemaField;

#[derive(Clone)]
pub struct BooleanField {
    name: String,
    description: Option<String>,
    required: bool,
    r#enum: Option<Vec<bool>>,
}

impl BooleanField {
    pub fn new_full(
        name: impl Into<String>,
        description: Option<impl Into<String>>,
        required: bool,
        r#enum: Option<Vec<bool>>,
    ) -> Self {
        BooleanField {
            name: name.into(),
            description: description.map(Into::into),
            required,
            r#enum: r#enum.map(|options| {
                let mut options = options.clone();
                options.dedup();
                options
            }),
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

    pub fn r#enum(self, r#enum: impl IntoIterator<Item = bool>) -> Self {
        Self {
            r#enum: Some(r#enum.into_iter().collect()),
            ..self
        }
    }
}

impl PrimitiveSchemaField for BooleanField {
    type FieldType = bool;

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
        "boolean"
    }

    fn r#enum(&self) -> Option<&Vec<bool>> {
        self.r#enum.as_ref()
    }

    fn coerce(value: &Value) -> Option<bool> {
        value.as_bool()
    }

    fn clone_box(&self) -> Box<dyn SchemaField> {
        Box::new(self.clone())
    }
}

impl From<BooleanField> for Box<dyn SchemaField> {
    fn from(value: BooleanField) -> Self {
        Box::new(value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::{Issue, SchemaField};

    #[test]
    fn test_boolean_field_plain_description() {
        let field = BooleanField::new("test").description("test description");
        assert_eq!(
            field.to_plain_description(),
            "test (boolean): test description"
        );

        let field_without_description = BooleanField::new("test").optional();
        assert_eq!(
            field_without_description.to_plain_description(),
            "test (boolean, optional)"
        );
    }

    #[test]
    fn test_boolean_field_check() {
        let field = BooleanField::new("ok");

        let mut issues = Vec::new();
        field.check("ok", &json!(true), &mut issues);
        assert!(issues.is_empty());

        field.check("ok", &json!(1), &mut issues);
        assert_eq!(issues, vec![Issue::new("ok", "expected boolean, got number")]);
    }
}
