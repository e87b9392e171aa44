//! The navigation coordinator.
//!
//! A [`ViewModel`] owns the current reference and the model tree of the last
//! response. `navigate` posts a request, `update` turns the response into
//! models, applies its history directive and page metadata, and `render`
//! reconciles the mounted tree against the models.
//!
//! Navigations are not queued. Every `navigate`, `update` and pop-state replay
//! takes a sequence number when issued; a response that arrives after a later
//! one was issued is dropped without touching any state.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use ulid::Ulid;

use crate::config::{self, Config};
use crate::descriptor::{ComponentModel, Head, HistoryMode, Layers, Schema, group_by_layer, reference};
use crate::error::{Result, ValidationError, ViewError};
use crate::instance::{RenderContext, RootMount};
use crate::link_manager::{Discriminator, FieldScope};
use crate::platform::{Platform, Transport};
use crate::reconcile::{InstanceType, ReconcileReport, Typed};
use crate::registry::{ImplementationKind, Registry};

/// Type name of the root view every design provides.
pub const VIEW: &str = "view";

/// Body of a navigation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationRequest {
    #[serde(rename = "ref")]
    pub reference: String,
    pub current: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    #[serde(default = "empty_object")]
    pub data: Value,
}

impl NavigationRequest {
    pub fn new(reference: impl Into<String>, current: Option<String>) -> Self {
        Self {
            reference: reference.into(),
            current,
            parameters: Map::new(),
            data: empty_object(),
        }
    }
}

/// What is stored as the state of a browser history entry: the resolved
/// reference and the raw response, enough to replay it without a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "ref")]
    pub reference: Option<String>,
    pub descriptors: Value,
}

impl HistoryEntry {
    pub fn to_state(&self) -> Value {
        json!({"ref": self.reference, "descriptors": self.descriptors})
    }

    /// `None` for entries the engine did not create, like the initial one.
    pub fn from_state(state: &Value) -> Result<Option<Self>, ValidationError> {
        if state.is_null() {
            return Ok(None);
        }
        serde_json::from_value(state.clone())
            .map(Some)
            .map_err(|_| ValidationError::unexpected("history state", "an object with `ref` and `descriptors`"))
    }
}

/// Page metadata of a main head, read in full before anything is applied.
struct PageMetadata {
    title: Option<String>,
    description: Option<String>,
    language: Option<String>,
    theme: String,
    icon: Option<String>,
    design: Option<String>,
}

impl PageMetadata {
    fn read(head: &Head) -> Result<Self, ValidationError> {
        Ok(Self {
            title: head.title()?.map(str::to_owned),
            description: head.description()?.map(str::to_owned),
            language: head.language()?.map(str::to_owned),
            theme: head.theme()?.to_owned(),
            icon: head.icon()?.map(str::to_owned),
            design: head.design()?.map(str::to_owned),
        })
    }
}

/// Metadata values last written to the platform.
#[derive(Debug, Default)]
struct Applied {
    title: Option<String>,
    description: Option<String>,
    language: Option<String>,
    theme_class: Option<String>,
    icon: Option<String>,
    stylesheet: Option<String>,
}

/// How applying a response ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    /// A later navigation was issued while this one was loading.
    Superseded,
    /// `mounted` when a design change mounted and rendered a new root.
    Applied { mounted: bool },
}

#[derive(Debug, Default)]
struct State {
    current: Option<String>,
    models: Vec<Rc<ComponentModel>>,
    layers: Layers,
    design: Option<String>,
    applied: Applied,
}

struct Inner {
    config: Config,
    transport: Rc<dyn Transport>,
    platform: Rc<dyn Platform>,
    registry: Rc<Registry>,
    state: RefCell<State>,
    root: RefCell<Option<RootMount>>,
    issued: Cell<u64>,
    suspended: Cell<bool>,
}

/// Handle to the coordinator. Cloning is cheap and shares the coordinator.
#[derive(Clone)]
pub struct ViewModel {
    inner: Rc<Inner>,
}

/// Non-owning handle given to mounted instances.
#[derive(Clone, Default)]
pub struct Navigator {
    inner: Weak<Inner>,
}

impl Navigator {
    /// A navigator that reaches no coordinator.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn view_model(&self) -> Option<ViewModel> {
        self.inner.upgrade().map(|inner| ViewModel { inner })
    }

    /// Follows `link` of `model` if the coordinator is still alive.
    pub async fn follow(
        &self,
        model: &ComponentModel,
        link: &str,
        discriminator: Option<&Discriminator>,
    ) -> Result<()> {
        match self.view_model() {
            Some(view_model) => view_model.follow(model, link, discriminator).await,
            None => {
                log::debug!("link `{link}` followed after the view model was dropped");
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Navigator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Navigator")
            .field("attached", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl ViewModel {
    pub fn new(
        config: Config,
        transport: Rc<dyn Transport>,
        platform: Rc<dyn Platform>,
        registry: Rc<Registry>,
    ) -> Self {
        let view_model = Self {
            inner: Rc::new(Inner {
                config,
                transport,
                platform,
                registry,
                state: RefCell::default(),
                root: RefCell::new(None),
                issued: Cell::new(0),
                suspended: Cell::new(false),
            }),
        };
        view_model.inner.platform.attach(view_model.navigator());
        view_model
    }

    pub fn navigator(&self) -> Navigator {
        Navigator {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn registry(&self) -> &Rc<Registry> {
        &self.inner.registry
    }

    pub fn current(&self) -> Option<String> {
        self.inner.state.borrow().current.clone()
    }

    pub fn design(&self) -> Option<String> {
        self.inner.state.borrow().design.clone()
    }

    pub fn models(&self) -> Vec<Rc<ComponentModel>> {
        self.inner.state.borrow().models.clone()
    }

    /// The first model of the last response.
    pub fn main(&self) -> Option<Rc<ComponentModel>> {
        self.inner.state.borrow().models.first().cloned()
    }

    pub fn layers(&self) -> Layers {
        self.inner.state.borrow().layers.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.root.borrow().is_some()
    }

    pub fn root_id(&self) -> Option<Ulid> {
        self.inner.root.borrow().as_ref().map(RootMount::id)
    }

    pub fn root_type(&self) -> Option<InstanceType> {
        self.inner
            .root
            .borrow()
            .as_ref()
            .map(|root| root.instance_type().clone())
    }

    /// The mounted tree as JSON, `null` while no view is connected.
    pub fn snapshot(&self) -> Value {
        self.inner
            .root
            .borrow()
            .as_ref()
            .map_or(Value::Null, RootMount::snapshot)
    }

    /// Navigates to the configured entry reference.
    pub async fn start(&self) -> Result<()> {
        let entry = self.inner.config.entry.clone();
        self.navigate(&entry, None, None).await
    }

    /// Requests `reference` and applies the response.
    ///
    /// `@current` resolves to the current reference. When the request targets
    /// the current reference, `parameters` and `data` are merged onto those of
    /// the current main model, supplied keys winning.
    ///
    /// A response carrying `error` is reported to the user and returned as
    /// [`ViewError::Server`] without changing anything.
    pub async fn navigate(
        &self,
        reference: &str,
        parameters: Option<Map<String, Value>>,
        data: Option<Value>,
    ) -> Result<()> {
        let request = self.request(reference, parameters, data)?;
        let sequence = self.issue();
        log::debug!("navigation #{sequence} to `{}`", request.reference);

        let response = self.inner.transport.post(&request).await?;
        if self.is_stale(sequence) {
            log::warn!(
                "dropping response #{sequence} for `{}`, a later navigation was issued",
                request.reference
            );
            return Ok(());
        }
        if let Some(message) = server_error(&response) {
            log::warn!("server error for `{}`: {message}", request.reference);
            self.inner.platform.notify_error(&message);
            return Err(ViewError::Server { message });
        }

        let outcome = self.apply(&response, Some(request.reference), sequence, true).await?;
        self.render_after(outcome).await
    }

    /// Replaces the model tree with `raw`, an array of raw descriptors.
    ///
    /// Everything is validated before anything is applied: on error neither
    /// history, metadata nor the model tree has changed.
    pub async fn update(&self, raw: &Value) -> Result<()> {
        let sequence = self.issue();
        self.apply(raw, None, sequence, true).await.map(drop)
    }

    /// The pop-state listener. Replays a stored entry without touching
    /// history. Ignored while a back transition is in progress.
    pub async fn on_pop_state(&self, state: Value) -> Result<()> {
        if self.inner.suspended.get() {
            log::debug!("pop-state ignored during a back transition");
            return Ok(());
        }
        let Some(entry) = HistoryEntry::from_state(&state)? else {
            log::debug!("pop-state to an entry without view model");
            return Ok(());
        };
        let sequence = self.issue();
        let outcome = self.apply(&entry.descriptors, entry.reference, sequence, false).await?;
        self.render_after(outcome).await
    }

    /// Follows `link` of `model` with the values its bound fields registered
    /// under `discriminator`.
    pub async fn follow(
        &self,
        model: &ComponentModel,
        link: &str,
        discriminator: Option<&Discriminator>,
    ) -> Result<()> {
        let target = model
            .link(link)?
            .ok_or_else(|| ValidationError::Missing {
                field: format!("links.{link}"),
            })?
            .target()?
            .to_owned();
        let values = model.link_values(link, discriminator)?;
        let parameters = (!values.parameters.is_empty()).then_some(values.parameters);
        let data = (!values.data.is_empty()).then_some(Value::Object(values.data));
        self.navigate(&target, parameters, data).await
    }

    /// Re-requests the current reference with the new value of one field.
    /// Returns `false` when the field does not ask for revalidation.
    pub async fn revalidate(&self, schema: &Schema, value: Value, scope: FieldScope) -> Result<bool> {
        if !schema.revalidate()? {
            return Ok(false);
        }
        let mut field = Map::new();
        field.insert(schema.name()?.to_owned(), value);
        match scope {
            FieldScope::Parameter => self.navigate(reference::CURRENT, Some(field), None).await?,
            FieldScope::Data => self.navigate(reference::CURRENT, None, Some(Value::Object(field))).await?,
        }
        Ok(true)
    }

    /// Mounts a view of `view_type` as the root and renders into it.
    pub async fn connect(&self, view_type: InstanceType) -> Result<()> {
        self.inner
            .registry
            .load(&view_type, ImplementationKind::View)
            .await?;
        let view = self.inner.registry.create_view(&view_type)?;
        self.mount_root(RootMount::new(view_type, view)).await
    }

    /// Unmounts the root view and every layer layout.
    pub fn disconnect(&self) {
        if let Some(mut root) = self.inner.root.borrow_mut().take() {
            let removed = root.clear();
            log::debug!("view disconnected, {removed} layers removed");
        }
    }

    /// Reconciles the mounted tree against the current models.
    pub async fn render(&self) -> Result<ReconcileReport> {
        let (layers, design) = {
            let state = self.inner.state.borrow();
            (state.layers.clone(), state.design.clone())
        };
        let declared = match self.inner.root.borrow().as_ref() {
            Some(root) => root.declared_layers(),
            None => return Ok(ReconcileReport::default()),
        };
        self.preload(&layers, &declared, design.as_deref()).await?;

        let context = RenderContext::new(self.navigator(), Rc::clone(&self.inner.registry), design);
        let mut root = self.inner.root.borrow_mut();
        let Some(root) = root.as_mut() else {
            return Ok(ReconcileReport::default());
        };
        let report = root.render(&layers, &context)?;
        log::debug!(
            "rendered: {} reused, {} replaced, {} appended, {} removed",
            report.reused,
            report.replaced,
            report.appended,
            report.removed
        );
        Ok(report)
    }

    fn request(
        &self,
        reference: &str,
        parameters: Option<Map<String, Value>>,
        data: Option<Value>,
    ) -> Result<NavigationRequest> {
        let state = self.inner.state.borrow();
        let targets_current = reference == reference::CURRENT;
        let resolved = match (&state.current, targets_current) {
            (Some(current), true) => current.clone(),
            _ => reference.to_owned(),
        };
        let previous = if targets_current || state.current.as_deref() == Some(resolved.as_str()) {
            state.models.first()
        } else {
            None
        };
        let (parameters, data) = match previous {
            Some(main) => (
                merge_parameters(main.parameters()?, parameters),
                merge_data(main.data(), data),
            ),
            None => (parameters.unwrap_or_default(), data.unwrap_or_else(empty_object)),
        };
        Ok(NavigationRequest {
            reference: resolved,
            current: state.current.clone(),
            parameters,
            data,
        })
    }

    /// Renders the connected view unless `outcome` already did.
    async fn render_after(&self, outcome: Outcome) -> Result<()> {
        match outcome {
            Outcome::Applied { mounted: false } if self.is_connected() => self.render().await.map(drop),
            _ => Ok(()),
        }
    }

    /// Validates and applies `raw`.
    async fn apply(
        &self,
        raw: &Value,
        reference: Option<String>,
        sequence: u64,
        record_history: bool,
    ) -> Result<Outcome> {
        let models = ComponentModel::parse_response(raw)?;
        let main = models
            .first()
            .ok_or(ValidationError::UnexpectedResponse { found: "an empty array" })?;
        let history = main.head().history()?;
        let metadata = PageMetadata::read(main.head())?;
        let layers = group_by_layer(&models)?;

        let view_type = metadata
            .design
            .as_deref()
            .map(|design| InstanceType::named(Some(design), VIEW));
        if let Some(view_type) = &view_type {
            self.inner
                .registry
                .load(view_type, ImplementationKind::View)
                .await?;
        }
        if self.is_stale(sequence) {
            log::warn!("dropping update #{sequence}, a later navigation was issued");
            return Ok(Outcome::Superseded);
        }

        let reference = reference.or_else(|| self.current());
        if record_history {
            self.record_history(
                history,
                &HistoryEntry {
                    reference: reference.clone(),
                    descriptors: raw.clone(),
                },
            );
        }
        {
            let mut state = self.inner.state.borrow_mut();
            state.current = reference;
            state.models = models;
            state.layers = layers;
        }
        self.apply_metadata(&metadata);

        let mounted = match view_type {
            Some(view_type) => self.swap_root(view_type).await?,
            None => false,
        };
        Ok(Outcome::Applied { mounted })
    }

    fn record_history(&self, mode: HistoryMode, entry: &HistoryEntry) {
        let platform = &self.inner.platform;
        match mode {
            HistoryMode::Push => platform.push_state(entry),
            HistoryMode::Replace => platform.replace_state(entry),
            HistoryMode::Back => {
                self.inner.suspended.set(true);
                platform.unlisten();
                platform.back();
                platform.replace_state(entry);
                platform.listen();
                self.inner.suspended.set(false);
            }
            HistoryMode::Ignore => {}
        }
    }

    fn apply_metadata(&self, metadata: &PageMetadata) {
        let platform = &self.inner.platform;
        let mut state = self.inner.state.borrow_mut();
        let state = &mut *state;
        let design = metadata.design.clone().or_else(|| state.design.clone());
        let applied = &mut state.applied;

        if let Some(title) = &metadata.title {
            write_changed(&mut applied.title, title, |title| platform.set_title(title));
        }
        if let Some(description) = &metadata.description {
            write_changed(&mut applied.description, description, |description| {
                platform.set_description(description)
            });
        }
        if let Some(language) = &metadata.language {
            write_changed(&mut applied.language, language, |language| platform.set_language(language));
        }
        write_changed(&mut applied.theme_class, &config::theme_class(&metadata.theme), |class| {
            platform.set_theme_class(class)
        });
        if let Some(icon) = &metadata.icon {
            let href = self.inner.config.icon_href(design.as_deref(), icon);
            write_changed(&mut applied.icon, &href, |href| platform.set_icon(href));
        }
        if let Some(design) = &metadata.design {
            let href = self.inner.config.stylesheet_href(design);
            write_changed(&mut applied.stylesheet, &href, |href| platform.set_stylesheet(href));
            state.design = Some(design.clone());
        }
    }

    /// Mounts a view of `view_type` unless the root already has that type.
    /// Returns whether a new root was mounted and rendered.
    async fn swap_root(&self, view_type: InstanceType) -> Result<bool> {
        let unchanged = self
            .inner
            .root
            .borrow()
            .as_ref()
            .is_some_and(|root| root.instance_type().matches(&view_type));
        if unchanged {
            return Ok(false);
        }
        let view = self.inner.registry.create_view(&view_type)?;
        log::debug!("mounting view `{view_type}`");
        self.mount_root(RootMount::new(view_type, view)).await?;
        Ok(true)
    }

    async fn mount_root(&self, root: RootMount) -> Result<()> {
        *self.inner.root.borrow_mut() = Some(root);
        self.render().await.map(drop)
    }

    async fn preload(&self, layers: &Layers, declared: &[String], design: Option<&str>) -> Result<()> {
        let registry = &self.inner.registry;
        for name in declared {
            let Some(models) = layers.get(name) else {
                continue;
            };
            if let Some(main) = models.first() {
                let layout = main.head().layout_type(design)?;
                registry.load(&layout, ImplementationKind::Layout).await?;
            }
            for model in models {
                let component = model.head().component_type(design)?;
                registry.load(&component, ImplementationKind::Component).await?;
            }
        }
        Ok(())
    }

    fn issue(&self) -> u64 {
        let sequence = self.inner.issued.get() + 1;
        self.inner.issued.set(sequence);
        sequence
    }

    fn is_stale(&self, sequence: u64) -> bool {
        sequence != self.inner.issued.get()
    }
}

impl fmt::Debug for ViewModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewModel")
            .field("state", &self.inner.state)
            .field("root", &self.inner.root)
            .field("issued", &self.inner.issued)
            .finish_non_exhaustive()
    }
}

fn write_changed(applied: &mut Option<String>, value: &str, write: impl FnOnce(&str)) {
    if applied.as_deref() != Some(value) {
        write(value);
        *applied = Some(value.to_owned());
    }
}

fn server_error(response: &Value) -> Option<String> {
    match response.as_object()?.get("error")? {
        Value::String(message) => Some(message.clone()),
        other => Some(other.to_string()),
    }
}

fn merge_parameters(previous: &Map<String, Value>, supplied: Option<Map<String, Value>>) -> Map<String, Value> {
    let mut merged = previous.clone();
    merged.extend(supplied.unwrap_or_default());
    merged
}

/// Object data merges key by key. Anything else is replaced by the supplied
/// data, or kept when nothing was supplied.
fn merge_data(previous: &Value, supplied: Option<Value>) -> Value {
    match (previous, supplied) {
        (Value::Object(previous), Some(Value::Object(supplied))) => {
            let mut merged = previous.clone();
            merged.extend(supplied);
            Value::Object(merged)
        }
        (_, Some(supplied)) => supplied,
        (Value::Null, None) => empty_object(),
        (previous, None) => previous.clone(),
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(object) => object,
            _ => unreachable!("test helper expects an object"),
        }
    }

    #[test]
    fn request_serializes_with_ref_key() {
        let mut request = NavigationRequest::new("books", Some("@default".to_owned()));
        request.parameters.insert("page".to_owned(), json!(2));

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"ref": "books", "current": "@default", "parameters": {"page": 2}, "data": {}})
        );
    }

    #[test]
    fn supplied_parameters_win() {
        let merged = merge_parameters(
            &object(json!({"page": 1, "pageSize": 10})),
            Some(object(json!({"page": 2}))),
        );
        assert_eq!(Value::Object(merged), json!({"page": 2, "pageSize": 10}));
    }

    #[test]
    fn data_merging_depends_on_shape() {
        let previous = json!({"title": "Dune", "year": 1965});
        assert_eq!(
            merge_data(&previous, Some(json!({"year": 1966}))),
            json!({"title": "Dune", "year": 1966})
        );
        assert_eq!(merge_data(&previous, None), previous);

        let rows = json!([{"id": 1}, {"id": 2}]);
        assert_eq!(merge_data(&rows, None), rows);
        assert_eq!(merge_data(&rows, Some(json!({"id": 3}))), json!({"id": 3}));
        assert_eq!(merge_data(&Value::Null, None), json!({}));
    }

    #[test]
    fn server_error_is_detected_only_on_objects() {
        assert_eq!(server_error(&json!({"error": "boom"})), Some("boom".to_owned()));
        assert_eq!(server_error(&json!({"error": {"code": 7}})), Some(r#"{"code":7}"#.to_owned()));
        assert_eq!(server_error(&json!([{"error": "not at top level"}])), None);
        assert_eq!(server_error(&json!({"head": {}})), None);
    }

    #[test]
    fn history_entry_round_trips_through_state() {
        let entry = HistoryEntry {
            reference: Some("books".to_owned()),
            descriptors: json!([{"head": {"component": "table"}}]),
        };

        assert_eq!(HistoryEntry::from_state(&entry.to_state()).unwrap(), Some(entry));
        assert_eq!(HistoryEntry::from_state(&Value::Null).unwrap(), None);
        assert!(HistoryEntry::from_state(&json!("books")).is_err());
    }

    #[test]
    fn detached_navigator_has_no_view_model() {
        assert!(Navigator::detached().view_model().is_none());
    }
}
