mod boolean;
pub use boolean::*;

mod integer;
pub use integer::*;

mod number;
pub use number::*;

mod string;
pub use string::*;

use std::fmt::Display;

use serde_json::{Map, Value};

use super::{json_type_name, Issue, SchemaField};

/// Shared behaviour of the primitive field descriptors. The blanket
/// [`SchemaField`] impl below derives the JSON-Schema form, the plain
/// description and the type/enum checks from it.
pub(super) trait PrimitiveSchemaField: Clone + Send + Sync + 'static {
    type FieldType: PartialEq + Display + Clone + Into<Value>;

    fn name(&self) -> &str;
    fn description(&self) -> Option<&str>;
    fn required(&self) -> bool;
    fn type_name(&self) -> &'static str;
    fn r#enum(&self) -> Option<&Vec<Self::FieldType>>;

    /// Pull the native value out of a JSON value, or `None` on a type
    /// mismatch.
    fn coerce(value: &Value) -> Option<Self::FieldType>;

    /// Constraint keywords beyond `type`/`enum` (e.g. `minimum`).
    fn constraint_schema(&self, _fields: &mut Map<String, Value>) {}

    /// Constraint checks beyond the type/enum check.
    fn constraint_check(&self, _path: &str, _value: &Self::FieldType, _issues: &mut Vec<Issue>) {}

    fn clone_box(&self) -> Box<dyn SchemaField>;
}

fn join_options<T: Display>(options: &[T]) -> String {
    options
        .iter()
        .map(|option| option.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl<T: PrimitiveSchemaField> SchemaField for T {
    fn name(&self) -> &str {
        PrimitiveSchemaField::name(self)
    }

    fn description(&self) -> Option<&str> {
        PrimitiveSchemaField::description(self)
    }

    fn required(&self) -> bool {
        PrimitiveSchemaField::required(self)
    }

    fn type_name(&self) -> &str {
        PrimitiveSchemaField::type_name(self)
    }

    fn to_json_schema(&self) -> Value {
        let mut fields = Map::<String, Value>::new();

        fields.insert("type".into(), PrimitiveSchemaField::type_name(self).into());
        if let Some(description) = PrimitiveSchemaField::description(self) {
            fields.insert("description".into(), description.into());
        }
        if let Some(options) = self.r#enum() {
            fields.insert(
                "enum".into(),
                options
                    .iter()
                    .cloned()
                    .map(Into::into)
                    .collect::<Vec<Value>>()
                    .into(),
            );
        }
        self.constraint_schema(&mut fields);

        Value::Object(fields)
    }

    fn to_plain_description(&self) -> String {
        let type_info = if PrimitiveSchemaField::required(self) {
            PrimitiveSchemaField::type_name(self).to_string()
        } else {
            format!("{}, optional", PrimitiveSchemaField::type_name(self))
        };

        let options = self
            .r#enum()
            .map(|options| format!("should be one of [{}]", join_options(options)));

        match (PrimitiveSchemaField::description(self), options) {
            (Some(description), Some(options)) => format!(
                "{} ({}): {}, {}",
                PrimitiveSchemaField::name(self),
                type_info,
                description,
                options
            ),
            (Some(description), None) => format!(
                "{} ({}): {}",
                PrimitiveSchemaField::name(self),
                type_info,
                description
            ),
            (None, Some(options)) => format!(
                "{} ({}): {}",
                PrimitiveSchemaField::name(self),
                type_info,
                options
            ),
            (None, None) => format!("{} ({})", PrimitiveSchemaField::name(self), type_info),
        }
    }

    fn check(&self, path: &str, value: &Value, issues: &mut Vec<Issue>) {
        let Some(native) = Self::coerce(value) else {
            issues.push(Issue::new(
                path,
                format!(
                    "expected {}, got {}",
                    PrimitiveSchemaField::type_name(self),
                    json_type_name(value)
                ),
            ));
            return;
        };

        if let Some(options) = self.r#enum() {
            if !options.contains(&native) {
                issues.push(Issue::new(
                    path,
                    format!("should be one of [{}]", join_options(options)),
                ));
                return;
            }
        }

        self.constraint_check(path, &native, issues);
    }

    fn clone_box(&self) -> Box<dyn SchemaField> {
        PrimitiveSchemaField::clone_box(self)
    }
}
