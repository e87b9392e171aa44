//! Collects the values rendered fields contribute to links.
//!
//! While a component renders, every field whose schema has `bind` registers
//! either a plain value or a handle to its live value under the bound link
//! name (plus a discriminator such as a row index). Following a link reads the
//! registered entries back into `parameters` and `data` maps for the next
//! navigation.
//!
//! A manager belongs to one component model and is dropped with it on the next
//! update, so handles of rows that no longer exist are never read.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use smallvec::SmallVec;

use crate::descriptor::Schema;
use crate::error::{BindingError, ValidationError};

/// A field adapter that can report what the user currently entered.
pub trait CurrentValue {
    /// `None` when the field has no readable value.
    fn current_value(&self) -> Option<Value>;
}

/// A value cell for field adapters that keep their value outside the DOM.
#[derive(Debug, Default)]
pub struct ValueCell {
    value: RefCell<Option<Value>>,
}

impl ValueCell {
    pub fn new(value: Value) -> Rc<Self> {
        Rc::new(Self {
            value: RefCell::new(Some(value)),
        })
    }

    pub fn empty() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn set(&self, value: Value) {
        *self.value.borrow_mut() = Some(value);
    }

    pub fn clear(&self) {
        self.value.borrow_mut().take();
    }
}

impl CurrentValue for ValueCell {
    fn current_value(&self) -> Option<Value> {
        self.value.borrow().clone()
    }
}

/// What a field registers: a value known at render time or a live handle.
#[derive(Clone)]
pub enum FieldSource {
    Value(Value),
    Handle(Rc<dyn CurrentValue>),
}

impl fmt::Debug for FieldSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Handle(handle) => f
                .debug_tuple("Handle")
                .field(&handle.current_value())
                .finish(),
        }
    }
}

impl From<Value> for FieldSource {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl<T: CurrentValue + 'static> From<Rc<T>> for FieldSource {
    fn from(handle: Rc<T>) -> Self {
        Self::Handle(handle)
    }
}

/// Disambiguates repeated contexts of the same link, e.g. table rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Discriminator {
    Index(usize),
    Key(String),
}

impl From<usize> for Discriminator {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for Discriminator {
    fn from(key: &str) -> Self {
        Self::Key(key.to_owned())
    }
}

impl From<String> for Discriminator {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

/// Which bucket of the next request a field feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldScope {
    Parameter,
    Data,
}

type Bucket = SmallVec<[(String, FieldSource); 4]>;

#[derive(Debug, Default)]
struct Linkage {
    parameters: Bucket,
    data: Bucket,
}

/// Values read back for one link.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkValues {
    pub parameters: Map<String, Value>,
    pub data: Map<String, Value>,
}

type LinkKey = (String, Option<Discriminator>);

#[derive(Debug, Default)]
pub struct LinkManager {
    linkages: IndexMap<LinkKey, Linkage>,
}

impl LinkManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `(schema.name, source)` for the link named by `schema.bind`.
    /// Fields without `bind` are ignored. Registering a name again replaces
    /// its source, so re-rendering a reused instance does not grow the link.
    pub fn add_field(
        &mut self,
        schema: &Schema,
        source: impl Into<FieldSource>,
        discriminator: Option<Discriminator>,
        scope: FieldScope,
    ) -> Result<(), ValidationError> {
        let Some(link) = schema.bind()? else {
            return Ok(());
        };
        let name = schema.name()?.to_owned();
        let linkage = self
            .linkages
            .entry((link.to_owned(), discriminator))
            .or_default();
        let bucket = match scope {
            FieldScope::Parameter => &mut linkage.parameters,
            FieldScope::Data => &mut linkage.data,
        };
        let source = source.into();
        match bucket.iter_mut().find(|(registered, _)| *registered == name) {
            Some(entry) => entry.1 = source,
            None => bucket.push((name, source)),
        }
        Ok(())
    }

    /// Resolves every value registered for `link`. An unbound link yields
    /// empty maps.
    pub fn values(
        &self,
        link: &str,
        discriminator: Option<&Discriminator>,
    ) -> Result<LinkValues, BindingError> {
        let key = (link.to_owned(), discriminator.cloned());
        let Some(linkage) = self.linkages.get(&key) else {
            return Ok(LinkValues::default());
        };
        Ok(LinkValues {
            parameters: resolve_bucket(link, &linkage.parameters)?,
            data: resolve_bucket(link, &linkage.data)?,
        })
    }

    pub fn is_bound(&self, link: &str, discriminator: Option<&Discriminator>) -> bool {
        self.linkages
            .contains_key(&(link.to_owned(), discriminator.cloned()))
    }

    /// Number of fields registered for `link` across both buckets.
    pub fn field_count(&self, link: &str, discriminator: Option<&Discriminator>) -> usize {
        self.linkages
            .get(&(link.to_owned(), discriminator.cloned()))
            .map_or(0, |linkage| linkage.parameters.len() + linkage.data.len())
    }

    /// Number of distinct `(link, discriminator)` entries.
    pub fn len(&self) -> usize {
        self.linkages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.linkages.is_empty()
    }
}

fn resolve_bucket(link: &str, bucket: &Bucket) -> Result<Map<String, Value>, BindingError> {
    let mut values = Map::new();
    for (name, source) in bucket {
        let value = match source {
            FieldSource::Value(value) if is_primitive(value) => Some(value.clone()),
            FieldSource::Value(_) => None,
            FieldSource::Handle(handle) => handle.current_value(),
        };
        let value = value.ok_or_else(|| BindingError {
            link: link.to_owned(),
            field: name.clone(),
        })?;
        values.insert(name.clone(), value);
    }
    Ok(values)
}

fn is_primitive(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema(value: Value) -> Schema {
        Schema::parse(&value).unwrap()
    }

    #[test]
    fn unbound_link_yields_empty_values() {
        let manager = LinkManager::new();
        let values = manager.values("save", None).unwrap();

        assert!(values.parameters.is_empty());
        assert!(values.data.is_empty());
    }

    #[test]
    fn field_without_bind_creates_no_linkage() {
        let mut manager = LinkManager::new();
        manager
            .add_field(&schema(json!({"name": "title"})), json!("Dune"), None, FieldScope::Data)
            .unwrap();

        assert!(manager.is_empty());
    }

    #[test]
    fn fields_land_in_their_bucket() {
        let mut manager = LinkManager::new();
        let page = schema(json!({"name": "page", "bind": "search"}));
        let query = schema(json!({"name": "query", "bind": "search"}));
        manager.add_field(&page, json!(2), None, FieldScope::Parameter).unwrap();
        manager.add_field(&query, json!("dune"), None, FieldScope::Data).unwrap();

        let values = manager.values("search", None).unwrap();
        assert_eq!(values.parameters, json!({"page": 2}).as_object().unwrap().clone());
        assert_eq!(values.data, json!({"query": "dune"}).as_object().unwrap().clone());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn discriminators_keep_rows_apart() {
        let mut manager = LinkManager::new();
        let id = schema(json!({"name": "id", "bind": "save"}));
        manager.add_field(&id, json!(20), Some(Discriminator::Index(2)), FieldScope::Data).unwrap();
        manager.add_field(&id, json!(30), Some(Discriminator::Index(3)), FieldScope::Data).unwrap();

        let row_2 = manager.values("save", Some(&Discriminator::Index(2))).unwrap();
        let row_3 = manager.values("save", Some(&Discriminator::Index(3))).unwrap();
        assert_eq!(row_2.data["id"], json!(20));
        assert_eq!(row_3.data["id"], json!(30));
        assert!(manager.values("save", None).unwrap().data.is_empty());
    }

    #[test]
    fn registering_a_field_again_replaces_it() {
        let mut manager = LinkManager::new();
        let id = schema(json!({"name": "id", "bind": "save"}));
        let page = schema(json!({"name": "page", "bind": "save"}));
        for round in 0..3 {
            manager.add_field(&id, json!(round), None, FieldScope::Data).unwrap();
            manager.add_field(&page, json!(1), None, FieldScope::Parameter).unwrap();
        }

        assert_eq!(manager.field_count("save", None), 2);
        assert_eq!(manager.values("save", None).unwrap().data["id"], json!(2));
    }

    #[test]
    fn handles_are_read_when_the_link_is_followed() {
        let mut manager = LinkManager::new();
        let cell = ValueCell::new(json!("draft"));
        let title = schema(json!({"name": "title", "bind": "save"}));
        manager.add_field(&title, Rc::clone(&cell), None, FieldScope::Data).unwrap();

        cell.set(json!("final"));
        assert_eq!(manager.values("save", None).unwrap().data["title"], json!("final"));
    }

    #[test]
    fn unreadable_values_are_binding_errors() {
        let mut manager = LinkManager::new();
        let cell = ValueCell::empty();
        let title = schema(json!({"name": "title", "bind": "save"}));
        manager.add_field(&title, cell, None, FieldScope::Data).unwrap();
        assert_eq!(
            manager.values("save", None),
            Err(BindingError {
                link: "save".to_owned(),
                field: "title".to_owned()
            })
        );

        let mut manager = LinkManager::new();
        let tags = schema(json!({"name": "tags", "bind": "save"}));
        manager.add_field(&tags, json!(["a", "b"]), None, FieldScope::Data).unwrap();
        assert!(manager.values("save", None).is_err());
    }

    #[test]
    fn bad_bind_surfaces_as_validation_error() {
        let mut manager = LinkManager::new();
        let broken = schema(json!({"name": "x", "bind": 7}));
        assert!(manager.add_field(&broken, json!(1), None, FieldScope::Data).is_err());
        assert!(manager.is_empty());
    }
}
