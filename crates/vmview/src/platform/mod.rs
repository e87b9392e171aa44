//! The seam between the engine and its host.
//!
//! [`Transport`] carries navigation requests to the backend. [`Platform`]
//! owns browser history, the pop-state listener, document metadata and
//! user-visible error reporting.

#[cfg(target_arch = "wasm32")]
pub mod browser;
pub mod memory;

use futures_util::future::LocalBoxFuture;
use serde_json::Value;

use crate::error::NetworkError;
use crate::view_model::{HistoryEntry, NavigationRequest, Navigator};

pub trait Transport {
    /// Posts `request` and resolves to the decoded JSON response.
    fn post(&self, request: &NavigationRequest) -> LocalBoxFuture<'static, Result<Value, NetworkError>>;
}

pub trait Platform {
    /// Called once by the coordinator so pop-state events can reach it.
    fn attach(&self, _navigator: Navigator) {}

    fn push_state(&self, entry: &HistoryEntry);
    fn replace_state(&self, entry: &HistoryEntry);
    /// One step back in history.
    fn back(&self);

    /// Registers the pop-state listener.
    fn listen(&self);
    /// Unregisters the pop-state listener.
    fn unlisten(&self);

    fn set_title(&self, title: &str);
    fn set_description(&self, description: &str);
    fn set_language(&self, language: &str);
    /// Replaces the class list of the document element.
    fn set_theme_class(&self, class: &str);
    fn set_icon(&self, href: &str);
    fn set_stylesheet(&self, href: &str);

    /// Shows a server-reported error to the user.
    fn notify_error(&self, message: &str);
}
