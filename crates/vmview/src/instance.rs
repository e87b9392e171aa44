//! Mounted instances and the contracts renderers implement.
//!
//! The tree is `RootMount` (one [`View`]) → one [`LayoutMount`] per layer →
//! leaf [`Mount`]s holding [`Component`]s. Layouts with a name own a
//! [`SlotManager`]; layers without a layout mount their models as a positional
//! list of children.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::{Map, Value, json};
use ulid::Ulid;

use crate::descriptor::{ComponentModel, Layers};
use crate::error::{ValidationError, ViewError};
use crate::reconcile::{self, InstanceType, ReconcileReport, Typed};
use crate::registry::Registry;
use crate::view_model::Navigator;

/// A leaf renderer.
///
/// `render` is called for the first model after construction and again for
/// every later model while the instance is reused. It must be safe to call
/// repeatedly.
pub trait Component {
    fn render(&mut self, model: &Rc<ComponentModel>, context: &RenderContext) -> Result<(), ViewError>;

    /// Observable state, used by tooling and tests.
    fn snapshot(&self) -> Value {
        Value::Null
    }
}

/// Slots a layout accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotSet {
    Declared(Vec<String>),
    /// Any slot name is accepted.
    Open,
}

impl SlotSet {
    pub fn declared<I, S>(slots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Declared(slots.into_iter().map(Into::into).collect())
    }

    pub fn accepts(&self, slot: &str) -> bool {
        match self {
            Self::Declared(slots) => slots.iter().any(|declared| declared == slot),
            Self::Open => true,
        }
    }
}

/// A container that places the models of one layer into named slots.
pub trait Layout {
    fn slots(&self) -> SlotSet;

    /// Layouts that need more than slot placement override this. The default
    /// mounts every model into the slot its head names.
    fn render_layout(
        &mut self,
        models: &[Rc<ComponentModel>],
        slots: &mut SlotManager,
        context: &RenderContext,
    ) -> Result<ReconcileReport, ViewError> {
        slots.render_slots(models, context)
    }

    fn snapshot(&self) -> Value {
        Value::Null
    }
}

/// The root of the mounted tree.
pub trait View {
    /// Layers rendered by this view, in rendering order.
    fn layers(&self) -> Vec<String>;
}

/// Everything a renderer may need besides its model.
#[derive(Clone)]
pub struct RenderContext {
    navigator: Navigator,
    registry: Rc<Registry>,
    design: Option<String>,
}

impl RenderContext {
    pub fn new(navigator: Navigator, registry: Rc<Registry>, design: Option<String>) -> Self {
        Self {
            navigator,
            registry,
            design,
        }
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn registry(&self) -> &Rc<Registry> {
        &self.registry
    }

    pub fn design(&self) -> Option<&str> {
        self.design.as_deref()
    }

    /// Type the leaf instance for `model` must have in the current design.
    pub fn component_type(&self, model: &ComponentModel) -> Result<InstanceType, ValidationError> {
        model.head().component_type(self.design())
    }

    /// Constructs a leaf instance. The type must have been loaded.
    pub fn mount(&self, instance_type: &InstanceType) -> Result<Mount, ViewError> {
        let component: Box<dyn Component> = match instance_type {
            InstanceType::Container => Box::new(Container::default()),
            named => self.registry.create_component(named)?,
        };
        Ok(Mount::new(instance_type.clone(), component))
    }
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("design", &self.design)
            .finish_non_exhaustive()
    }
}

/// A mounted leaf instance.
pub struct Mount {
    id: Ulid,
    instance_type: InstanceType,
    component: Box<dyn Component>,
}

impl Mount {
    pub fn new(instance_type: InstanceType, component: Box<dyn Component>) -> Self {
        Self {
            id: Ulid::new(),
            instance_type,
            component,
        }
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn render(&mut self, model: &Rc<ComponentModel>, context: &RenderContext) -> Result<(), ViewError> {
        self.component.render(model, context)
    }

    pub fn snapshot(&self) -> Value {
        json!({
            "type": self.instance_type.tag(),
            "id": self.id.to_string(),
            "state": self.component.snapshot(),
        })
    }
}

impl Typed for Mount {
    fn instance_type(&self) -> &InstanceType {
        &self.instance_type
    }
}

impl fmt::Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount")
            .field("id", &self.id)
            .field("instance_type", &self.instance_type)
            .finish_non_exhaustive()
    }
}

/// Leaf mounted for descriptors that name no component. Keeps the data it was
/// given so it can be inspected.
#[derive(Debug, Default)]
pub struct Container {
    data: Value,
    renders: usize,
}

impl Component for Container {
    fn render(&mut self, model: &Rc<ComponentModel>, _context: &RenderContext) -> Result<(), ViewError> {
        self.data = model.data().clone();
        self.renders += 1;
        Ok(())
    }

    fn snapshot(&self) -> Value {
        json!({"renders": self.renders, "data": self.data})
    }
}

/// Named mount points of a layout instance.
#[derive(Debug)]
pub struct SlotManager {
    owner: InstanceType,
    accepted: SlotSet,
    slots: IndexMap<String, Option<Mount>>,
}

impl SlotManager {
    pub fn new(owner: InstanceType, accepted: SlotSet) -> Self {
        let slots = match &accepted {
            SlotSet::Declared(declared) => declared.iter().map(|slot| (slot.clone(), None)).collect(),
            SlotSet::Open => IndexMap::new(),
        };
        Self { owner, accepted, slots }
    }

    pub fn get(&self, slot: &str) -> Option<&Mount> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Names of slots with a mounted instance, in slot order.
    pub fn occupied(&self) -> Vec<&str> {
        self.slots
            .iter()
            .filter(|(_, mount)| mount.is_some())
            .map(|(slot, _)| slot.as_str())
            .collect()
    }

    /// Every known slot name, occupied or not.
    pub fn names(&self) -> Vec<&str> {
        self.slots.keys().map(String::as_str).collect()
    }

    /// Mounts one model into the slot its head names.
    pub fn render_slot(
        &mut self,
        model: &Rc<ComponentModel>,
        context: &RenderContext,
    ) -> Result<reconcile::Outcome, ViewError> {
        let slot = model.head().slot()?;
        if !self.accepted.accepts(slot) {
            return Err(ValidationError::UnknownSlot {
                layout: self.owner.tag(),
                slot: slot.to_owned(),
            }
            .into());
        }
        let expected = context.component_type(model)?;
        let mount = self.slots.entry(slot.to_owned()).or_default();
        reconcile::reconcile_one(
            mount,
            &expected,
            |instance_type| context.mount(instance_type),
            |mount| mount.render(model, context),
        )
    }

    /// Mounts every model and empties the slots no model targeted.
    pub fn render_slots(
        &mut self,
        models: &[Rc<ComponentModel>],
        context: &RenderContext,
    ) -> Result<ReconcileReport, ViewError> {
        let mut report = ReconcileReport::default();
        let mut targeted = Vec::with_capacity(models.len());
        for model in models {
            report.record(self.render_slot(model, context)?);
            targeted.push(model.head().slot()?.to_owned());
        }
        if matches!(self.accepted, SlotSet::Open) {
            let before = self.occupied().len();
            self.slots.retain(|slot, _| targeted.contains(slot));
            report.removed += before - self.occupied().len();
        } else {
            for (slot, mount) in &mut self.slots {
                if !targeted.contains(slot) && mount.take().is_some() {
                    report.removed += 1;
                }
            }
        }
        Ok(report)
    }

    fn snapshot(&self) -> Value {
        let slots: Map<String, Value> = self
            .slots
            .iter()
            .filter_map(|(slot, mount)| Some((slot.clone(), mount.as_ref()?.snapshot())))
            .collect();
        Value::Object(slots)
    }
}

enum LayoutBody {
    /// No layout named: models map to children by position.
    Dynamic(Vec<Mount>),
    Slotted {
        layout: Box<dyn Layout>,
        slots: SlotManager,
    },
}

/// The layout instance mounted for one layer.
pub struct LayoutMount {
    id: Ulid,
    instance_type: InstanceType,
    body: LayoutBody,
}

impl LayoutMount {
    pub fn create(instance_type: &InstanceType, registry: &Registry) -> Result<Self, ViewError> {
        let body = match instance_type {
            InstanceType::Container => LayoutBody::Dynamic(Vec::new()),
            named => {
                let layout = registry.create_layout(named)?;
                let slots = SlotManager::new(named.clone(), layout.slots());
                LayoutBody::Slotted { layout, slots }
            }
        };
        Ok(Self {
            id: Ulid::new(),
            instance_type: instance_type.clone(),
            body,
        })
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self.body, LayoutBody::Dynamic(_))
    }

    pub fn slots(&self) -> Option<&SlotManager> {
        match &self.body {
            LayoutBody::Slotted { slots, .. } => Some(slots),
            LayoutBody::Dynamic(_) => None,
        }
    }

    /// Children of a dynamic layout.
    pub fn children(&self) -> &[Mount] {
        match &self.body {
            LayoutBody::Dynamic(children) => children,
            LayoutBody::Slotted { .. } => &[],
        }
    }

    pub fn render(
        &mut self,
        models: &[Rc<ComponentModel>],
        context: &RenderContext,
    ) -> Result<ReconcileReport, ViewError> {
        match &mut self.body {
            LayoutBody::Dynamic(children) => reconcile::reconcile_children(
                children,
                models,
                |model| context.component_type(model).map_err(ViewError::from),
                |instance_type, _, _| context.mount(instance_type),
                |mount, model, _| mount.render(model, context),
            ),
            LayoutBody::Slotted { layout, slots } => layout.render_layout(models, slots, context),
        }
    }

    pub fn snapshot(&self) -> Value {
        let mut snapshot = json!({
            "type": self.instance_type.tag(),
            "id": self.id.to_string(),
        });
        match &self.body {
            LayoutBody::Dynamic(children) => {
                snapshot["children"] = children.iter().map(Mount::snapshot).collect();
            }
            LayoutBody::Slotted { layout, slots } => {
                snapshot["slots"] = slots.snapshot();
                let state = layout.snapshot();
                if !state.is_null() {
                    snapshot["state"] = state;
                }
            }
        }
        snapshot
    }
}

impl Typed for LayoutMount {
    fn instance_type(&self) -> &InstanceType {
        &self.instance_type
    }
}

impl fmt::Debug for LayoutMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutMount")
            .field("id", &self.id)
            .field("instance_type", &self.instance_type)
            .field("dynamic", &self.is_dynamic())
            .finish()
    }
}

/// The mounted view with its layer layouts.
pub struct RootMount {
    id: Ulid,
    instance_type: InstanceType,
    view: Box<dyn View>,
    layers: IndexMap<String, Option<LayoutMount>>,
}

impl RootMount {
    pub fn new(instance_type: InstanceType, view: Box<dyn View>) -> Self {
        Self {
            id: Ulid::new(),
            instance_type,
            view,
            layers: IndexMap::new(),
        }
    }

    pub fn id(&self) -> Ulid {
        self.id
    }

    pub fn declared_layers(&self) -> Vec<String> {
        self.view.layers()
    }

    pub fn layer(&self, name: &str) -> Option<&LayoutMount> {
        self.layers.get(name).and_then(Option::as_ref)
    }

    /// Reconciles every declared layer. Declared layers without models lose
    /// their layout.
    pub fn render(&mut self, layers: &Layers, context: &RenderContext) -> Result<ReconcileReport, ViewError> {
        let mut report = ReconcileReport::default();
        for name in self.view.layers() {
            let mount = self.layers.entry(name.clone()).or_default();
            let models = match layers.get(&name) {
                Some(models) if !models.is_empty() => models,
                _ => {
                    if mount.take().is_some() {
                        log::debug!("layer `{name}` removed");
                        report.removed += 1;
                    }
                    continue;
                }
            };
            let expected = models[0].head().layout_type(context.design())?;
            let mut layer_report = ReconcileReport::default();
            let outcome = reconcile::reconcile_one(
                mount,
                &expected,
                |instance_type| LayoutMount::create(instance_type, context.registry()),
                |layout| {
                    layout
                        .render(models, context)
                        .map(|rendered| layer_report = rendered)
                },
            )?;
            report.record(outcome);
            report.merge(layer_report);
        }
        Ok(report)
    }

    /// Drops every mounted layer layout.
    pub fn clear(&mut self) -> usize {
        let removed = self.layers.values().filter(|mount| mount.is_some()).count();
        self.layers.clear();
        removed
    }

    pub fn snapshot(&self) -> Value {
        let layers: Map<String, Value> = self
            .layers
            .iter()
            .filter_map(|(name, mount)| Some((name.clone(), mount.as_ref()?.snapshot())))
            .collect();
        json!({
            "type": self.instance_type.tag(),
            "id": self.id.to_string(),
            "layers": layers,
        })
    }
}

impl Typed for RootMount {
    fn instance_type(&self) -> &InstanceType {
        &self.instance_type
    }
}

impl fmt::Debug for RootMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootMount")
            .field("id", &self.id)
            .field("instance_type", &self.instance_type)
            .field("layers", &self.layers)
            .finish_non_exhaustive()
    }
}
