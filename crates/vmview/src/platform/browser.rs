//! Browser transport and platform built on `zoon`.

use std::cell::RefCell;
use std::rc::Rc;

use futures_util::FutureExt;
use futures_util::future::{self, LocalBoxFuture};
use js_sys::JSON;
use serde_json::Value;
use wasm_bindgen_futures::JsFuture;
use web_sys::{Element, PopStateEvent, Request, RequestInit, Response};
use zoon::{Closure, JsCast, JsValue, Task, document, eprintln, history, window};

use super::{Platform, Transport};
use crate::config::Config;
use crate::error::NetworkError;
use crate::registry::Registry;
use crate::view_model::{HistoryEntry, NavigationRequest, Navigator, ViewModel};

/// Posts navigation requests with `fetch`.
pub struct FetchTransport {
    endpoint: String,
}

impl FetchTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl Transport for FetchTransport {
    fn post(&self, request: &NavigationRequest) -> LocalBoxFuture<'static, Result<Value, NetworkError>> {
        let endpoint = self.endpoint.clone();
        match serde_json::to_string(request) {
            Ok(body) => fetch_json(endpoint, body).boxed_local(),
            Err(error) => future::ready(Err(NetworkError(error.to_string()))).boxed_local(),
        }
    }
}

async fn fetch_json(endpoint: String, body: String) -> Result<Value, NetworkError> {
    let init = RequestInit::new();
    init.set_method("POST");
    init.set_body(&JsValue::from_str(&body));
    let request = Request::new_with_str_and_init(&endpoint, &init).map_err(js_error)?;
    request
        .headers()
        .set("Content-Type", "application/json")
        .map_err(js_error)?;

    let response = JsFuture::from(window().fetch_with_request(&request))
        .await
        .map_err(js_error)?;
    let response: Response = response.dyn_into().map_err(js_error)?;
    if !response.ok() {
        return Err(NetworkError(format!("`{endpoint}` answered {}", response.status())));
    }
    let text = JsFuture::from(response.text().map_err(js_error)?)
        .await
        .map_err(js_error)?
        .as_string()
        .ok_or_else(|| NetworkError("response body is not text".to_owned()))?;
    serde_json::from_str(&text).map_err(|error| NetworkError(error.to_string()))
}

fn js_error(error: JsValue) -> NetworkError {
    NetworkError(format!("{error:?}"))
}

/// `window.history`, `popstate` and the document head.
#[derive(Default)]
pub struct BrowserPlatform {
    navigator: RefCell<Option<Navigator>>,
    listener: RefCell<Option<Closure<dyn Fn(PopStateEvent)>>>,
}

impl BrowserPlatform {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Platform for BrowserPlatform {
    fn attach(&self, navigator: Navigator) {
        *self.navigator.borrow_mut() = Some(navigator);
        self.listen();
    }

    fn push_state(&self, entry: &HistoryEntry) {
        report(
            "history.pushState",
            history().push_state(&to_js(&entry.to_state()), ""),
        );
    }

    fn replace_state(&self, entry: &HistoryEntry) {
        report(
            "history.replaceState",
            history().replace_state(&to_js(&entry.to_state()), ""),
        );
    }

    fn back(&self) {
        report("history.back", history().back());
    }

    fn listen(&self) {
        if self.listener.borrow().is_some() {
            return;
        }
        let Some(navigator) = self.navigator.borrow().clone() else {
            return;
        };
        let listener: Closure<dyn Fn(PopStateEvent)> = Closure::new(move |event: PopStateEvent| {
            let navigator = navigator.clone();
            let state = from_js(&event.state());
            Task::start(async move {
                let Some(view_model) = navigator.view_model() else {
                    return;
                };
                if let Err(error) = view_model.on_pop_state(state).await {
                    eprintln!("Failed to restore history entry: {error}");
                }
            });
        });
        report(
            "addEventListener(popstate)",
            window().add_event_listener_with_callback("popstate", listener.as_ref().unchecked_ref()),
        );
        *self.listener.borrow_mut() = Some(listener);
    }

    fn unlisten(&self) {
        if let Some(listener) = self.listener.borrow_mut().take() {
            report(
                "removeEventListener(popstate)",
                window().remove_event_listener_with_callback("popstate", listener.as_ref().unchecked_ref()),
            );
        }
    }

    fn set_title(&self, title: &str) {
        document().set_title(title);
    }

    fn set_description(&self, description: &str) {
        upsert_head_element("head>meta[name=description]", "meta", &[("name", "description"), ("content", description)]);
    }

    fn set_language(&self, language: &str) {
        if let Some(root) = document().document_element() {
            report("set lang", root.set_attribute("lang", language));
        }
    }

    fn set_theme_class(&self, class: &str) {
        if let Some(root) = document().document_element() {
            root.set_class_name(class);
        }
    }

    fn set_icon(&self, href: &str) {
        upsert_head_element("head>link[rel=icon]", "link", &[("rel", "icon"), ("href", href)]);
    }

    fn set_stylesheet(&self, href: &str) {
        upsert_head_element("head>link[rel=stylesheet]", "link", &[("rel", "stylesheet"), ("href", href)]);
    }

    fn notify_error(&self, message: &str) {
        eprintln!("{message}");
        report("alert", window().alert_with_message(message));
    }
}

/// Sets `attributes` on the element matching `selector`, creating it in
/// `<head>` first when there is none.
fn upsert_head_element(selector: &str, tag: &str, attributes: &[(&str, &str)]) {
    let document = document();
    let element = match document.query_selector(selector) {
        Ok(Some(element)) => element,
        Ok(None) => match create_in_head(&document, tag) {
            Ok(element) => element,
            Err(error) => {
                eprintln!("Failed to create <{tag}>: {error:?}");
                return;
            }
        },
        Err(error) => {
            eprintln!("Invalid selector `{selector}`: {error:?}");
            return;
        }
    };
    for (name, value) in attributes {
        report("setAttribute", element.set_attribute(name, value));
    }
}

fn create_in_head(document: &web_sys::Document, tag: &str) -> Result<Element, JsValue> {
    let element = document.create_element(tag)?;
    if let Some(head) = document.head() {
        head.append_child(&element)?;
    }
    Ok(element)
}

fn report(action: &str, result: Result<(), JsValue>) {
    if let Err(error) = result {
        eprintln!("{action} failed: {error:?}");
    }
}

fn to_js(value: &Value) -> JsValue {
    JSON::parse(&value.to_string()).unwrap_or(JsValue::NULL)
}

fn from_js(value: &JsValue) -> Value {
    JSON::stringify(value)
        .ok()
        .and_then(|json| String::from(json).parse().ok())
        .unwrap_or(Value::Null)
}

/// A coordinator wired to `fetch` and the browser history.
pub fn view_model(config: Config, registry: Rc<Registry>) -> ViewModel {
    let transport = Rc::new(FetchTransport::new(config.endpoint.clone()));
    ViewModel::new(config, transport, Rc::new(BrowserPlatform::new()), registry)
}

/// Starts the coordinator on the browser event loop.
pub fn start(view_model: ViewModel) {
    Task::start(async move {
        if let Err(error) = view_model.start().await {
            eprintln!("Failed to load the entry view: {error}");
        }
    });
}
