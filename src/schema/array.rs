use serde_json::{Map, Value};

use super::{
    indent, json_type_name, BooleanField, IntegerField, Issue, NumberField, SchemaField,
    StringField,
};

pub struct ArrayField {
    name: String,
    description: Option<String>,
    required: bool,
    field: Box<dyn SchemaField>,
}

impl Clone for ArrayField {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            description: self.description.clone(),
            required: self.required,
            field: self.field.clone_box(),
        }
    }
}

impl ArrayField {
    pub fn new_full(
        name: impl Into<String>,
        description: Option<impl Into<String>>,
        required: bool,
        field: Box<dyn SchemaField>,
    ) -> Self {
        ArrayField {
            name: name.into(),
            description: description.map(Into::into),
            required,
            field,
        }
    }

    pub fn new_string_array(name: impl Into<String>) -> Self {
        ArrayField::new_full(name, None::<&str>, true, StringField::new("items").into())
    }

    pub fn new_integer_array(name: impl Into<String>) -> Self {
        ArrayField::new_full(name, None::<&str>, true, IntegerField::new("items").into())
    }

    pub fn new_number_array(name: impl Into<String>) -> Self {
        ArrayField::new_full(name, None::<&str>, true, NumberField::new("items").into())
    }

    pub fn new_boolean_array(name: impl Into<String>) -> Self {
        ArrayField::new_full(name, None::<&str>, true, BooleanField::new("items").into())
    }

    pub fn new_items_array(name: impl Into<String>, field: Box<dyn SchemaField>) -> Self {
        ArrayField::new_full(name, None::<&str>, true, field)
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
}

impl SchemaField for ArrayField {
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
        "array"
    }

    fn to_json_schema(&self) -> Value {
        let mut fields = Map::<String, Value>::new();

        fields.insert("type".into(), "array".into());
        fields.insert("items".into(), self.field.to_json_schema());
        if let Some(description) = self.description() {
            fields.insert("description".into(), description.into());
        }

        Value::Object(fields)
    }

    fn to_plain_description(&self) -> String {
        let type_info = if self.required {
            "array"
        } else {
            "array, optional"
        };

        let items_description = indent(&self.field.to_plain_description(), 4);

        match &self.description {
            Some(description) => format!(
                "{} ({}): {}\n{}",
                self.name, type_info, description, items_description
            ),
            None => format!("{} ({})\n{}", self.name, type_info, items_description),
        }
    }

    fn check(&self, path: &str, value: &Value, issues: &mut Vec<Issue>) {
        let Value::Array(items) = value else {
            issues.push(Issue::new(
                path,
                format!("expected array, got {}", json_type_name(value)),
            ));
            return;
        };

        for (i, item) in items.iter().enumerate() {
            self.field.check(&format!("{}[{}]", path, i), item, issues);
        }
    }

    fn clone_box(&self) -> Box<dyn SchemaField> {
        Box::new(self.clone())
    }
}

impl From<ArrayField> for Box<dyn SchemaField> {
    fn from(value: ArrayField) -> Self {
        Box::new(value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_array_field_plain_description() {
        let field = ArrayField::new_integer_array("test").description("test description");

        assert_eq!(
            field.to_plain_description(),
            "test (array): test description\n    items (integer)"
        );

        let field_optional = ArrayField::new_string_array("test")
            .description("test description")
            .optional();
        assert_eq!(
            field_optional.to_plain_description(),
            "test (array, optional): test description\n    items (string)"
        );
    }

    #[test]
    fn test_array_field_json_schema() {
        let field = ArrayField::new_number_array("test").description("test description");
        assert_eq!(
            field.to_json_schema(),
            json!({
                "type": "array",
                "description": "test description",
                "items": {
                    "type": "number"
                }
            })
        );
    }

    #[test]
    fn test_array_field_check() {
        let field = ArrayField::new_number_array("doubled");

        let mut issues = Vec::new();
        field.check("doubled", &json!([2, 4, 6]), &mut issues);
        assert!(issues.is_empty());

        field.check("doubled", &json!([2, "x"]), &mut issues);
        assert_eq!(
            issues,
            vec![Issue::new("doubled[1]", "expected number, got string")]
        );

        issues.clear();
        field.check("doubled", &json!({}), &mut issues);
        assert_eq!(
            issues,
            vec![Issue::new("doubled", "expected array, got object")]
        );
    }
}
