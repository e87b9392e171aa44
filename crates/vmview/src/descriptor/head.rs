use serde_json::{Map, Value};

use super::{Field, expect_object, optional, optional_string, string_or};
use crate::error::ValidationError;
use crate::reconcile::InstanceType;

pub const DEFAULT_THEME: &str = "default";
pub const DEFAULT_LAYER: &str = "main";
pub const DEFAULT_SLOT: &str = "main";

/// What the coordinator does with browser history after an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryMode {
    #[default]
    Push,
    Replace,
    Back,
    Ignore,
}

impl HistoryMode {
    fn parse(value: Option<&Value>) -> Field<Self> {
        match value {
            None | Some(Value::Null) => Ok(Self::Push),
            Some(Value::String(mode)) => match mode.as_str() {
                "push" => Ok(Self::Push),
                "replace" => Ok(Self::Replace),
                "back" => Ok(Self::Back),
                "ignore" => Ok(Self::Ignore),
                _ => Err(ValidationError::InvalidHistory {
                    found: format!("{mode:?}"),
                }),
            },
            Some(other) => Err(ValidationError::InvalidHistory {
                found: other.to_string(),
            }),
        }
    }
}

/// Metadata of one descriptor.
///
/// Every field is checked once when the head is wrapped and the outcome is
/// kept. A malformed field only fails when it is read, so a head with a broken
/// `icon` can still tell which layer and slot it belongs to.
#[derive(Debug, Clone)]
pub struct Head {
    history: Field<HistoryMode>,
    title: Field<Option<String>>,
    language: Field<Option<String>>,
    description: Field<Option<String>>,
    icon: Field<Option<String>>,
    design: Field<Option<String>>,
    theme: Field<String>,
    layer: Field<String>,
    layout: Field<Option<String>>,
    slot: Field<String>,
    component: Field<Option<String>>,
}

impl Head {
    pub fn parse(value: &Value) -> Result<Self, ValidationError> {
        let head = expect_object(value, "head")?;
        Ok(Self::from_object(head))
    }

    fn from_object(head: &Map<String, Value>) -> Self {
        Self {
            history: HistoryMode::parse(head.get("history")),
            title: optional_string(head, "head", "title"),
            language: optional_string(head, "head", "language"),
            description: optional_string(head, "head", "description"),
            icon: optional_string(head, "head", "icon"),
            design: optional_string(head, "head", "design"),
            theme: string_or(head, "head", "theme", DEFAULT_THEME),
            layer: string_or(head, "head", "layer", DEFAULT_LAYER),
            layout: optional_string(head, "head", "layout"),
            slot: string_or(head, "head", "slot", DEFAULT_SLOT),
            component: optional_string(head, "head", "component"),
        }
    }

    pub fn history(&self) -> Result<HistoryMode, ValidationError> {
        self.history.clone()
    }

    pub fn title(&self) -> Result<Option<&str>, ValidationError> {
        optional(&self.title)
    }

    pub fn language(&self) -> Result<Option<&str>, ValidationError> {
        optional(&self.language)
    }

    pub fn description(&self) -> Result<Option<&str>, ValidationError> {
        optional(&self.description)
    }

    pub fn icon(&self) -> Result<Option<&str>, ValidationError> {
        optional(&self.icon)
    }

    pub fn design(&self) -> Result<Option<&str>, ValidationError> {
        optional(&self.design)
    }

    pub fn theme(&self) -> Result<&str, ValidationError> {
        read(&self.theme)
    }

    pub fn layer(&self) -> Result<&str, ValidationError> {
        read(&self.layer)
    }

    pub fn slot(&self) -> Result<&str, ValidationError> {
        read(&self.slot)
    }

    /// Layout name, `None` for a dynamic layout.
    pub fn layout(&self) -> Result<Option<&str>, ValidationError> {
        optional(&self.layout)
    }

    pub fn is_dynamic_layout(&self) -> Result<bool, ValidationError> {
        Ok(self.layout()?.is_none())
    }

    /// The leaf component name. Mandatory for leaf descriptors.
    pub fn component(&self) -> Result<&str, ValidationError> {
        optional(&self.component)?.ok_or_else(|| ValidationError::Missing {
            field: "head.component".to_owned(),
        })
    }

    /// Type the mounted leaf instance must have. A descriptor without a
    /// component is mounted as a generic container.
    pub fn component_type(&self, design: Option<&str>) -> Result<InstanceType, ValidationError> {
        Ok(match optional(&self.component)? {
            Some(component) => InstanceType::named(design, component),
            None => InstanceType::Container,
        })
    }

    /// Type of the layout container for the layer this head leads.
    pub fn layout_type(&self, design: Option<&str>) -> Result<InstanceType, ValidationError> {
        Ok(match self.layout()? {
            Some(layout) => InstanceType::named(design, layout),
            None => InstanceType::Container,
        })
    }
}

fn read(field: &Field<String>) -> Result<&str, ValidationError> {
    field.as_deref().map_err(Clone::clone)
}
