//! Typed views over the raw JSON descriptors sent by the backend.
//!
//! A raw descriptor has the shape
//!
//! ```text
//! { head, parameters?, schema?, parameterSchema?, data, links? }
//! ```
//!
//! Wrapping only rejects what cannot be served at all (a descriptor or head
//! that is not an object). Every other field is checked once at wrap time
//! and its [`ValidationError`] is returned the first time the field is read.

mod head;
mod link;
mod schema;

pub use head::{DEFAULT_LAYER, DEFAULT_SLOT, DEFAULT_THEME, Head, HistoryMode};
pub use link::Link;
pub use schema::{FieldState, Schema};

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::{BindingError, ValidationError};
use crate::link_manager::{Discriminator, FieldScope, FieldSource, LinkManager, LinkValues};

/// Symbolic references understood by the backend.
pub mod reference {
    pub const DEFAULT: &str = "@default";
    pub const CURRENT: &str = "@current";
    pub const MENU: &str = "@menu";
    pub const NOT_FOUND: &str = "@not-found";
}

/// Outcome of checking one field at wrap time.
pub(crate) type Field<T> = Result<T, ValidationError>;

/// Component models grouped by layer, in first-seen layer order.
pub type Layers = IndexMap<String, Vec<Rc<ComponentModel>>>;

/// One parsed descriptor plus the link bindings registered while it is
/// rendered.
///
/// A model lives for exactly one update cycle. The next update builds new
/// models (and with them new link managers) instead of patching these.
#[derive(Debug)]
pub struct ComponentModel {
    head: Head,
    parameters: Field<Map<String, Value>>,
    schema: Field<Vec<Schema>>,
    parameter_schema: Field<Vec<Schema>>,
    data: Value,
    links: Field<Vec<Link>>,
    link_manager: RefCell<LinkManager>,
}

impl ComponentModel {
    pub fn parse(raw: &Value) -> Result<Self, ValidationError> {
        let descriptor = expect_object(raw, "descriptor")?;
        let head = match descriptor.get("head") {
            Some(head) => Head::parse(head)?,
            None => {
                return Err(ValidationError::Missing {
                    field: "head".to_owned(),
                });
            }
        };
        let parameters = match descriptor.get("parameters") {
            None | Some(Value::Null) => Ok(Map::new()),
            Some(Value::Object(parameters)) => Ok(parameters.clone()),
            Some(_) => Err(ValidationError::unexpected("parameters", "an object or null")),
        };
        Ok(Self {
            head,
            parameters,
            schema: list(descriptor, "schema", Schema::parse),
            parameter_schema: list(descriptor, "parameterSchema", Schema::parse),
            data: descriptor.get("data").cloned().unwrap_or(Value::Null),
            links: list(descriptor, "links", Link::parse),
            link_manager: RefCell::new(LinkManager::new()),
        })
    }

    /// Wraps a whole response. Element 0 is the main model.
    pub fn parse_response(raw: &Value) -> Result<Vec<Rc<Self>>, ValidationError> {
        let descriptors = match raw {
            Value::Array(descriptors) if !descriptors.is_empty() => descriptors,
            Value::Array(_) => return Err(ValidationError::UnexpectedResponse { found: "an empty array" }),
            other => {
                return Err(ValidationError::UnexpectedResponse {
                    found: json_kind(other),
                });
            }
        };
        descriptors
            .iter()
            .map(|descriptor| Self::parse(descriptor).map(Rc::new))
            .collect()
    }

    pub fn head(&self) -> &Head {
        &self.head
    }

    pub fn parameters(&self) -> Result<&Map<String, Value>, ValidationError> {
        self.parameters.as_ref().map_err(Clone::clone)
    }

    pub fn parameter(&self, name: &str) -> Result<Option<&Value>, ValidationError> {
        Ok(self.parameters()?.get(name))
    }

    pub fn schema(&self) -> Result<&[Schema], ValidationError> {
        self.schema.as_deref().map_err(Clone::clone)
    }

    pub fn parameter_schema(&self) -> Result<&[Schema], ValidationError> {
        self.parameter_schema.as_deref().map_err(Clone::clone)
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    /// `data` as an ordered list of records. A missing `data` is an empty list.
    pub fn records(&self) -> Result<&[Value], ValidationError> {
        match &self.data {
            Value::Array(records) => Ok(records),
            Value::Null => Ok(&[]),
            _ => Err(ValidationError::unexpected("data", "an array of records")),
        }
    }

    /// `data` as a single record. A missing `data` is `None`.
    pub fn record(&self) -> Result<Option<&Map<String, Value>>, ValidationError> {
        match &self.data {
            Value::Object(record) => Ok(Some(record)),
            Value::Null => Ok(None),
            _ => Err(ValidationError::unexpected("data", "an object")),
        }
    }

    pub fn links(&self) -> Result<&[Link], ValidationError> {
        self.links.as_deref().map_err(Clone::clone)
    }

    pub fn link(&self, name: &str) -> Result<Option<&Link>, ValidationError> {
        for link in self.links()? {
            if link.name()? == name {
                return Ok(Some(link));
            }
        }
        Ok(None)
    }

    /// Registers a rendered field with this model's link manager.
    pub fn bind_field(
        &self,
        schema: &Schema,
        source: impl Into<FieldSource>,
        discriminator: Option<Discriminator>,
        scope: FieldScope,
    ) -> Result<(), ValidationError> {
        self.link_manager
            .borrow_mut()
            .add_field(schema, source, discriminator, scope)
    }

    pub fn link_values(
        &self,
        link: &str,
        discriminator: Option<&Discriminator>,
    ) -> Result<LinkValues, BindingError> {
        self.link_manager.borrow().values(link, discriminator)
    }

    pub fn bound_links(&self) -> usize {
        self.link_manager.borrow().len()
    }

    pub fn bound_fields(&self, link: &str, discriminator: Option<&Discriminator>) -> usize {
        self.link_manager.borrow().field_count(link, discriminator)
    }

    /// Reads every field and returns the errors found, in field order.
    pub fn problems(&self) -> Vec<ValidationError> {
        let mut problems = Vec::new();
        let head = &self.head;
        note(&mut problems, head.history());
        note(&mut problems, head.title());
        note(&mut problems, head.language());
        note(&mut problems, head.description());
        note(&mut problems, head.icon());
        note(&mut problems, head.design());
        note(&mut problems, head.theme());
        note(&mut problems, head.layer());
        note(&mut problems, head.slot());
        note(&mut problems, head.layout());
        note(&mut problems, head.component_type(None));
        note(&mut problems, self.parameters());

        for schemas in [self.schema(), self.parameter_schema()] {
            match schemas {
                Ok(schemas) => {
                    for schema in schemas {
                        note(&mut problems, schema.name());
                        note(&mut problems, schema.label());
                        note(&mut problems, schema.kind());
                        note(&mut problems, schema.options());
                        note(&mut problems, schema.bind());
                        note(&mut problems, schema.slot());
                        note(&mut problems, schema.pattern());
                        note(&mut problems, schema.min());
                        note(&mut problems, schema.max());
                        note(&mut problems, schema.revalidate());
                        note(&mut problems, schema.state());
                    }
                }
                Err(error) => problems.push(error),
            }
        }

        match self.links() {
            Ok(links) => {
                for link in links {
                    note(&mut problems, link.name());
                    note(&mut problems, link.title());
                    note(&mut problems, link.reference());
                    note(&mut problems, link.slot());
                    note(&mut problems, link.selected());
                }
            }
            Err(error) => problems.push(error),
        }
        problems
    }
}

fn note<T>(problems: &mut Vec<ValidationError>, result: Result<T, ValidationError>) {
    if let Err(error) = result {
        problems.push(error);
    }
}

/// Groups models by `head.layer`, keeping first-seen layer order and the
/// order of models inside each layer.
pub fn group_by_layer(models: &[Rc<ComponentModel>]) -> Result<Layers, ValidationError> {
    let mut layers = Layers::new();
    for model in models {
        layers
            .entry(model.head().layer()?.to_owned())
            .or_default()
            .push(Rc::clone(model));
    }
    Ok(layers)
}

pub(crate) fn expect_object<'a>(
    value: &'a Value,
    field: &str,
) -> Result<&'a Map<String, Value>, ValidationError> {
    value
        .as_object()
        .ok_or_else(|| ValidationError::unexpected(field, "an object"))
}

pub(crate) fn optional_string(object: &Map<String, Value>, scope: &str, key: &str) -> Field<Option<String>> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(ValidationError::unexpected(format!("{scope}.{key}"), "a string or null")),
    }
}

/// Reads a checked optional string field.
pub(crate) fn optional(field: &Field<Option<String>>) -> Result<Option<&str>, ValidationError> {
    field
        .as_ref()
        .map(|value| value.as_deref())
        .map_err(Clone::clone)
}

pub(crate) fn string_or(object: &Map<String, Value>, scope: &str, key: &str, default: &str) -> Field<String> {
    Ok(optional_string(object, scope, key)?.unwrap_or_else(|| default.to_owned()))
}

pub(crate) fn required_string(object: &Map<String, Value>, scope: &str, key: &str) -> Field<String> {
    optional_string(object, scope, key)?.ok_or_else(|| ValidationError::Missing {
        field: format!("{scope}.{key}"),
    })
}

pub(crate) fn optional_number(object: &Map<String, Value>, scope: &str, key: &str) -> Field<Option<f64>> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(number)) => Ok(number.as_f64()),
        Some(_) => Err(ValidationError::unexpected(format!("{scope}.{key}"), "a number or null")),
    }
}

pub(crate) fn flag(object: &Map<String, Value>, scope: &str, key: &str) -> Field<bool> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(flag)) => Ok(*flag),
        Some(_) => Err(ValidationError::unexpected(format!("{scope}.{key}"), "a boolean or null")),
    }
}

fn list<T>(
    object: &Map<String, Value>,
    key: &str,
    parse: impl Fn(&Value) -> Result<T, ValidationError>,
) -> Field<Vec<T>> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().map(parse).collect(),
        Some(_) => Err(ValidationError::unexpected(key, "an array or null")),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
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
    fn full_descriptor() {
        let model = ComponentModel::parse(&json!({
            "head": {"component": "table", "title": "Books"},
            "parameters": {"page": 1, "pageSize": 10},
            "schema": [{"name": "title", "label": "Title"}, {"name": "author"}],
            "parameterSchema": [{"name": "page", "type": "int", "slot": "table-bottom-left-bar"}],
            "data": [{"title": "Dune", "author": "Herbert"}],
            "links": [{"name": "next", "ref": "books"}],
        }))
        .unwrap();

        assert_eq!(model.head().title().unwrap(), Some("Books"));
        assert_eq!(model.parameter("pageSize").unwrap(), Some(&json!(10)));
        assert_eq!(model.schema().unwrap().len(), 2);
        assert_eq!(
            model.parameter_schema().unwrap()[0].slot().unwrap(),
            Some("table-bottom-left-bar")
        );
        assert_eq!(model.records().unwrap().len(), 1);
        assert!(model.link("next").unwrap().is_some());
        assert!(model.link("prev").unwrap().is_none());
    }

    #[test]
    fn optional_sections_default_to_empty() {
        let model = ComponentModel::parse(&json!({"head": {"component": "text"}})).unwrap();

        assert!(model.parameters().unwrap().is_empty());
        assert!(model.schema().unwrap().is_empty());
        assert!(model.links().unwrap().is_empty());
        assert!(model.records().unwrap().is_empty());
        assert_eq!(model.record().unwrap(), None);
    }

    #[test]
    fn broken_sections_fail_lazily() {
        let model = ComponentModel::parse(&json!({
            "head": {"component": "text"},
            "parameters": [1, 2],
            "schema": [{"name": "ok"}, "not-a-schema"],
            "data": {"text": "hello"},
        }))
        .unwrap();

        assert!(model.parameters().is_err());
        assert!(model.schema().is_err());
        assert!(model.records().is_err());
        assert_eq!(model.record().unwrap().unwrap()["text"], json!("hello"));
    }

    #[test]
    fn problems_lists_every_broken_field() {
        let model = ComponentModel::parse(&json!({
            "head": {"component": "form", "title": 5, "history": "sideways"},
            "schema": [{"name": "title"}, {"label": "no name"}],
            "links": [{"name": "save", "selected": "yes"}],
        }))
        .unwrap();

        let problems = model.problems();
        assert_eq!(problems.len(), 4);
        assert!(matches!(problems[0], ValidationError::InvalidHistory { .. }));
        assert!(matches!(problems[2], ValidationError::Missing { ref field } if field == "schema.name"));

        let clean = ComponentModel::parse(&json!({"head": {"component": "text"}, "data": {}})).unwrap();
        assert!(clean.problems().is_empty());
    }

    #[test]
    fn descriptor_without_head_is_rejected() {
        assert!(matches!(
            ComponentModel::parse(&json!({"data": {}})),
            Err(ValidationError::Missing { .. })
        ));
        assert!(ComponentModel::parse(&json!([])).is_err());
    }

    #[test]
    fn response_must_be_a_non_empty_array() {
        assert!(ComponentModel::parse_response(&json!([])).is_err());
        assert!(ComponentModel::parse_response(&json!({"head": {}})).is_err());
        assert_eq!(
            ComponentModel::parse_response(&json!([{"head": {"component": "a"}}]))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn layers_keep_first_seen_order() {
        let models = ComponentModel::parse_response(&json!([
            {"head": {"component": "a"}},
            {"head": {"component": "b", "layer": "dialog"}},
            {"head": {"component": "c", "slot": "nav"}},
        ]))
        .unwrap();
        let layers = group_by_layer(&models).unwrap();

        assert_eq!(layers.keys().collect::<Vec<_>>(), ["main", "dialog"]);
        assert_eq!(layers["main"].len(), 2);
        assert_eq!(layers["main"][1].head().component().unwrap(), "c");
        assert_eq!(layers["dialog"].len(), 1);
    }
}
