use serde_json::{Map, Value};

use crate::schema::{Issue, SchemaField};

use super::PrimitiveSchemaField;

#[derive(Clone)]
pub struct NumberField {
    name: String,
    description: Option<String>,
    required: bool,
    r#enum: Option<Vec<f64>>,
    min: Option<f64>,
    max: Option<f64>,
}

impl NumberField {
    pub fn new_full(
        name: impl Into<String>,
        description: Option<impl Into<String>>,
        required: bool,
        r#enum: Option<Vec<f64>>,
    ) -> Self {
        NumberField {
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

    pub fn r#enum(self, r#enum: impl IntoIterator<Item = f64>) -> Self {
        Self {
            r#enum: Some(r#enum.into_iter().collect()),
            ..self
        }
    }

    pub fn min(self, min: f64) -> Self {
        Self {
            min: Some(min),
            ..self
        }
    }

    pub fn max(self, max: f64) -> Self {
        Self {
            max: Some(max),
            ..self
        }
    }
}

impl PrimitiveSchemaField for NumberField {
    type FieldType = f64;

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
        "number"
    }

    fn r#enum(&self) -> Option<&Vec<f64>> {
        self.r#enum.as_ref()
    }

    fn coerce(value: &Value) -> Option<f64> {
        value.as_f64()
    }

    fn constraint_schema(&self, fields: &mut Map<String, Value>) {
        if let Some(min) = self.min {
            fields.insert("minimum".into(), min.into());
        }
        if let Some(max) = self.max {
            fields.insert("maximum".into(), max.into());
        }
    }

    fn constraint_check(&self, path: &str, value: &f64, issues: &mut Vec<Issue>) {
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

impl From<NumberField> for Box<dyn SchemaField> {
    fn from(value: NumberField) -> Self {
        Box::new(value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::schema::SchemaField;

    #[test]
    fn test_number_field_plain_description() {
        let field = NumberField::new("test").description("test description");
        assert_eq!(
            field.to_plain_description(),
            "test (number): test description"
        );

        let optional_field = NumberField::new("test")
            .description("test description")
            .optional();
        assert_eq!(
            optional_field.to_plain_description(),
            "test (number, optional): test description"
        );

        let enum_field = NumberField::new("test")
            .description("test description")
            .r#enum([0.1, 3f64]);
        assert_eq!(
            enum_field.to_plain_description(),
            "test (number): test description, should be one of [0.1, 3]"
        );
    }

    #[test]
    fn test_number_field_json_schema() {
        let field = NumberField::new("test").description("test description");
        assert_eq!(
            field.to_json_schema(),
            json!({
                "type": "number",
                "description": "test description"
            })
        );

        let bounded = NumberField::new("test").min(0.0).max(10.5);
        assert_eq!(
            bounded.to_json_schema(),
            json!({
                "type": "number",
                "minimum": 0.0,
                "maximum": 10.5
            })
        );
    }

    #[test]
    fn test_number_field_check() {
        let field = NumberField::new("n").min(0.0);

        let mut issues = Vec::new();
        field.check("n", &json!(3.5), &mut issues);
        assert!(issues.is_empty());

        field.check("n", &json!(-1), &mut issues);
        assert_eq!(issues, vec![Issue::new("n", "must be at least 0")]);

        issues.clear();
        field.check("n", &json!("3"), &mut issues);
        assert_eq!(issues, vec![Issue::new("n", "expected number, got string")]);
    }

    #[test]
    fn test_number_field_enum_check() {
        let field = NumberField::new("n").r#enum([1.0, 2.0]);

        let mut issues = Vec::new();
        field.check("n", &json!(2), &mut issues);
        assert!(issues.is_empty());

        field.check("n", &json!(3), &mut issues);
        assert_eq!(issues, vec![Issue::new("n", "should be one of [1, 2]")]);
    }
}
