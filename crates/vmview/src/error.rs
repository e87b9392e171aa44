//! Error taxonomy of the engine.
//!
//! Descriptor problems are [`ValidationError`]s and surface when the offending
//! field is read. Link values that cannot be read back are [`BindingError`]s.
//! Transport failures are [`NetworkError`]s and are never recovered locally.
//! Everything that can fail during navigation or rendering is folded into
//! [`ViewError`].

use thiserror::Error;

use crate::registry::ImplementationKind;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("expected `{field}` to be {expected}")]
    UnexpectedType {
        field: String,
        expected: &'static str,
    },

    #[error("missing required field `{field}`")]
    Missing { field: String },

    #[error("expected `head.history` to be 'push', 'ignore', 'replace', 'back' or null, got {found}")]
    InvalidHistory { found: String },

    #[error("expected `schema.state` to be 'editable', 'hidden', 'readonly' or 'disabled', got {found}")]
    InvalidFieldState { found: String },

    #[error("layout `{layout}` has no slot `{slot}`")]
    UnknownSlot { layout: String, slot: String },

    #[error("expected the response to be a non-empty array of descriptors, got {found}")]
    UnexpectedResponse { found: &'static str },
}

impl ValidationError {
    pub(crate) fn unexpected(field: impl Into<String>, expected: &'static str) -> Self {
        Self::UnexpectedType {
            field: field.into(),
            expected,
        }
    }
}

/// A bound field whose value cannot be read back when its link is followed.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("field `{field}` bound to link `{link}` has no retrievable value")]
pub struct BindingError {
    pub link: String,
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("request failed: {0}")]
pub struct NetworkError(pub String);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    #[error("no implementation registered for `{tag}`")]
    Unregistered { tag: String },

    #[error("implementation `{tag}` was used before it was loaded")]
    NotLoaded { tag: String },

    #[error("`{tag}` is a {found}, expected a {expected}")]
    WrongKind {
        tag: String,
        expected: ImplementationKind,
        found: ImplementationKind,
    },

    #[error("loading `{tag}` failed: {reason}")]
    Failed { tag: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ViewError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Binding(#[from] BindingError),

    /// The backend answered with `{"error": ...}`. Nothing was changed.
    #[error("server error: {message}")]
    Server { message: String },

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

pub type Result<T, E = ViewError> = std::result::Result<T, E>;
