use serde_json::{Map, Value};

use super::{Field, expect_object, flag, optional, optional_number, optional_string, required_string};
use crate::error::ValidationError;

/// Interaction state of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldState {
    #[default]
    Editable,
    Hidden,
    Readonly,
    Disabled,
}

impl FieldState {
    fn parse(value: Option<&Value>) -> Field<Self> {
        match value {
            None | Some(Value::Null) => Ok(Self::Editable),
            Some(Value::String(state)) => match state.as_str() {
                "editable" => Ok(Self::Editable),
                "hidden" => Ok(Self::Hidden),
                "readonly" => Ok(Self::Readonly),
                "disabled" => Ok(Self::Disabled),
                _ => Err(ValidationError::InvalidFieldState {
                    found: format!("{state:?}"),
                }),
            },
            Some(other) => Err(ValidationError::InvalidFieldState {
                found: other.to_string(),
            }),
        }
    }

    pub fn is_visible(self) -> bool {
        self != Self::Hidden
    }

    pub fn accepts_input(self) -> bool {
        self == Self::Editable
    }
}

/// A field or column descriptor.
#[derive(Debug, Clone)]
pub struct Schema {
    name: Field<String>,
    label: Field<Option<String>>,
    kind: Field<Option<String>>,
    options: Field<Option<Vec<Value>>>,
    bind: Field<Option<String>>,
    slot: Field<Option<String>>,
    pattern: Field<Option<String>>,
    min: Field<Option<f64>>,
    max: Field<Option<f64>>,
    revalidate: Field<bool>,
    state: Field<FieldState>,
}

impl Schema {
    pub fn parse(value: &Value) -> Result<Self, ValidationError> {
        let schema = expect_object(value, "schema")?;
        Ok(Self::from_object(schema))
    }

    fn from_object(schema: &Map<String, Value>) -> Self {
        let options = match schema.get("options") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Array(options)) => Ok(Some(options.clone())),
            Some(_) => Err(ValidationError::unexpected("schema.options", "an array or null")),
        };
        Self {
            name: required_string(schema, "schema", "name"),
            label: optional_string(schema, "schema", "label"),
            kind: optional_string(schema, "schema", "type"),
            options,
            bind: optional_string(schema, "schema", "bind"),
            slot: optional_string(schema, "schema", "slot"),
            pattern: optional_string(schema, "schema", "pattern"),
            min: optional_number(schema, "schema", "min"),
            max: optional_number(schema, "schema", "max"),
            revalidate: flag(schema, "schema", "revalidate"),
            state: FieldState::parse(schema.get("state")),
        }
    }

    pub fn name(&self) -> Result<&str, ValidationError> {
        self.name.as_deref().map_err(Clone::clone)
    }

    pub fn label(&self) -> Result<Option<&str>, ValidationError> {
        optional(&self.label)
    }

    /// The `type` of the field (`int`, `string`, ...).
    pub fn kind(&self) -> Result<Option<&str>, ValidationError> {
        optional(&self.kind)
    }

    pub fn options(&self) -> Result<Option<&[Value]>, ValidationError> {
        self.options
            .as_ref()
            .map(|options| options.as_deref())
            .map_err(Clone::clone)
    }

    /// Name of the link this field contributes its value to.
    pub fn bind(&self) -> Result<Option<&str>, ValidationError> {
        optional(&self.bind)
    }

    pub fn slot(&self) -> Result<Option<&str>, ValidationError> {
        optional(&self.slot)
    }

    pub fn pattern(&self) -> Result<Option<&str>, ValidationError> {
        optional(&self.pattern)
    }

    pub fn min(&self) -> Result<Option<f64>, ValidationError> {
        self.min.clone()
    }

    pub fn max(&self) -> Result<Option<f64>, ValidationError> {
        self.max.clone()
    }

    pub fn revalidate(&self) -> Result<bool, ValidationError> {
        self.revalidate.clone()
    }

    pub fn state(&self) -> Result<FieldState, ValidationError> {
        self.state.clone()
    }
}
