use serde_json::{Map, Value};

use super::{Field, expect_object, flag, optional, optional_string, reference};
use crate::error::ValidationError;

/// A named navigation action.
#[derive(Debug, Clone)]
pub struct Link {
    name: Field<String>,
    title: Field<Option<String>>,
    reference: Field<Option<String>>,
    slot: Field<Option<String>>,
    selected: Field<bool>,
}

impl Link {
    pub fn parse(value: &Value) -> Result<Self, ValidationError> {
        let link = expect_object(value, "link")?;
        Ok(Self::from_object(link))
    }

    fn from_object(link: &Map<String, Value>) -> Self {
        // Numeric names are accepted, links are often keyed by record id.
        let name = match link.get("name") {
            Some(Value::String(name)) => Ok(name.clone()),
            Some(Value::Number(number)) => Ok(number.to_string()),
            None | Some(Value::Null) => Err(ValidationError::Missing {
                field: "link.name".to_owned(),
            }),
            Some(_) => Err(ValidationError::unexpected("link.name", "a string or number")),
        };
        Self {
            name,
            title: optional_string(link, "link", "title"),
            reference: optional_string(link, "link", "ref"),
            slot: optional_string(link, "link", "slot"),
            selected: flag(link, "link", "selected"),
        }
    }

    pub fn name(&self) -> Result<&str, ValidationError> {
        self.name.as_deref().map_err(Clone::clone)
    }

    pub fn title(&self) -> Result<Option<&str>, ValidationError> {
        optional(&self.title)
    }

    pub fn reference(&self) -> Result<Option<&str>, ValidationError> {
        optional(&self.reference)
    }

    /// Where following the link navigates to. Without a `ref` the backend
    /// falls back to the default document.
    pub fn target(&self) -> Result<&str, ValidationError> {
        Ok(self.reference()?.unwrap_or(reference::DEFAULT))
    }

    pub fn slot(&self) -> Result<Option<&str>, ValidationError> {
        optional(&self.slot)
    }

    pub fn selected(&self) -> Result<bool, ValidationError> {
        self.selected.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn link_fields() {
        let link = Link::parse(&json!({"name": "save", "title": "Save", "ref": "books"})).unwrap();

        assert_eq!(link.name().unwrap(), "save");
        assert_eq!(link.title().unwrap(), Some("Save"));
        assert_eq!(link.target().unwrap(), "books");
        assert!(!link.selected().unwrap());
    }

    #[test]
    fn numeric_name_and_missing_ref() {
        let link = Link::parse(&json!({"name": 42, "selected": true})).unwrap();

        assert_eq!(link.name().unwrap(), "42");
        assert_eq!(link.reference().unwrap(), None);
        assert_eq!(link.target().unwrap(), "@default");
        assert!(link.selected().unwrap());
    }

    #[test]
    fn bad_ref_fails_on_read() {
        let link = Link::parse(&json!({"name": "x", "ref": ["a"]})).unwrap();
        assert!(link.target().is_err());
        assert_eq!(link.name().unwrap(), "x");
    }
}
