//! Implementation registry.
//!
//! Maps an [`InstanceType`] (design namespace + type name) to the
//! implementation that mounts it. Implementations come from loaders, which
//! may suspend (fetching a module, compiling a theme). A loaded implementation
//! is kept for the lifetime of the registry, so reconciliation, which runs
//! after every needed type was loaded, only ever creates instances
//! synchronously.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use futures_util::future::LocalBoxFuture;

use crate::error::LoadError;
use crate::instance::{Component, Layout, View};
use crate::reconcile::InstanceType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImplementationKind {
    View,
    Layout,
    Component,
}

impl fmt::Display for ImplementationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::View => "view",
            Self::Layout => "layout",
            Self::Component => "component",
        })
    }
}

pub type ViewFactory = Rc<dyn Fn() -> Box<dyn View>>;
pub type LayoutFactory = Rc<dyn Fn() -> Box<dyn Layout>>;
pub type ComponentFactory = Rc<dyn Fn() -> Box<dyn Component>>;

/// A loaded implementation: a factory for fresh instances of one type.
#[derive(Clone)]
pub enum Implementation {
    View(ViewFactory),
    Layout(LayoutFactory),
    Component(ComponentFactory),
}

impl Implementation {
    pub fn view<V: View + Default + 'static>() -> Self {
        Self::View(Rc::new(|| Box::new(V::default())))
    }

    pub fn layout<L: Layout + Default + 'static>() -> Self {
        Self::Layout(Rc::new(|| Box::new(L::default())))
    }

    pub fn component<C: Component + Default + 'static>() -> Self {
        Self::Component(Rc::new(|| Box::new(C::default())))
    }

    pub fn kind(&self) -> ImplementationKind {
        match self {
            Self::View(_) => ImplementationKind::View,
            Self::Layout(_) => ImplementationKind::Layout,
            Self::Component(_) => ImplementationKind::Component,
        }
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Implementation::{:?}", self.kind())
    }
}

/// Produces the implementation of one type. Called at most once per type
/// unless it fails.
pub type Loader =
    Rc<dyn Fn(InstanceType, ImplementationKind) -> LocalBoxFuture<'static, Result<Implementation, LoadError>>>;

#[derive(Default)]
pub struct Registry {
    loaded: RefCell<HashMap<String, Implementation>>,
    loaders: RefCell<HashMap<String, Loader>>,
    fallback: RefCell<Option<Loader>>,
    load_count: Cell<usize>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("loaded", &self.loaded.borrow().keys().collect::<Vec<_>>())
            .field("namespaces", &self.loaders.borrow().keys().collect::<Vec<_>>())
            .field("load_count", &self.load_count.get())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an already available implementation.
    pub fn register(&self, instance_type: &InstanceType, implementation: Implementation) {
        self.loaded
            .borrow_mut()
            .insert(instance_type.key(), implementation);
    }

    /// Registers the loader for every type of a design namespace.
    pub fn register_loader(&self, namespace: &str, loader: Loader) {
        self.loaders
            .borrow_mut()
            .insert(namespace.to_ascii_lowercase(), loader);
    }

    /// Loader used for types whose namespace has no loader of its own.
    pub fn set_fallback(&self, loader: Loader) {
        *self.fallback.borrow_mut() = Some(loader);
    }

    pub fn is_loaded(&self, instance_type: &InstanceType) -> bool {
        self.loaded.borrow().contains_key(&instance_type.key())
    }

    /// How many times a loader actually ran to completion.
    pub fn load_count(&self) -> usize {
        self.load_count.get()
    }

    /// Makes sure the implementation of `instance_type` is available.
    ///
    /// The generic container is built in and never loaded.
    pub async fn load(&self, instance_type: &InstanceType, kind: ImplementationKind) -> Result<(), LoadError> {
        if *instance_type == InstanceType::Container {
            return Ok(());
        }
        let key = instance_type.key();
        if let Some(found) = self.loaded.borrow().get(&key).map(Implementation::kind) {
            return check_kind(&key, kind, found);
        }

        let loader = self.loader_for(instance_type).ok_or_else(|| LoadError::Unregistered { tag: key.clone() })?;
        log::debug!("loading {kind} `{key}`");
        let implementation = loader(instance_type.clone(), kind).await?;
        check_kind(&key, kind, implementation.kind())?;

        // Another load of the same type may have finished while this one was
        // suspended. The first one wins.
        let mut loaded = self.loaded.borrow_mut();
        if !loaded.contains_key(&key) {
            loaded.insert(key, implementation);
            self.load_count.set(self.load_count.get() + 1);
        }
        Ok(())
    }

    pub fn create_view(&self, instance_type: &InstanceType) -> Result<Box<dyn View>, LoadError> {
        match self.get(instance_type)? {
            Implementation::View(factory) => Ok(factory()),
            other => Err(wrong_kind(instance_type, ImplementationKind::View, &other)),
        }
    }

    pub fn create_layout(&self, instance_type: &InstanceType) -> Result<Box<dyn Layout>, LoadError> {
        match self.get(instance_type)? {
            Implementation::Layout(factory) => Ok(factory()),
            other => Err(wrong_kind(instance_type, ImplementationKind::Layout, &other)),
        }
    }

    pub fn create_component(&self, instance_type: &InstanceType) -> Result<Box<dyn Component>, LoadError> {
        match self.get(instance_type)? {
            Implementation::Component(factory) => Ok(factory()),
            other => Err(wrong_kind(instance_type, ImplementationKind::Component, &other)),
        }
    }

    fn get(&self, instance_type: &InstanceType) -> Result<Implementation, LoadError> {
        let key = instance_type.key();
        self.loaded
            .borrow()
            .get(&key)
            .cloned()
            .ok_or(LoadError::NotLoaded { tag: key })
    }

    fn loader_for(&self, instance_type: &InstanceType) -> Option<Loader> {
        let namespace = instance_type.namespace().unwrap_or_default().to_ascii_lowercase();
        self.loaders
            .borrow()
            .get(&namespace)
            .cloned()
            .or_else(|| self.fallback.borrow().clone())
    }
}

fn check_kind(tag: &str, expected: ImplementationKind, found: ImplementationKind) -> Result<(), LoadError> {
    if expected == found {
        Ok(())
    } else {
        Err(LoadError::WrongKind {
            tag: tag.to_owned(),
            expected,
            found,
        })
    }
}

fn wrong_kind(instance_type: &InstanceType, expected: ImplementationKind, found: &Implementation) -> LoadError {
    LoadError::WrongKind {
        tag: instance_type.key(),
        expected,
        found: found.kind(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{HeadlessView, RecordingComponent};
    use futures_util::FutureExt;

    fn counting_loader(calls: Rc<Cell<usize>>) -> Loader {
        Rc::new(move |instance_type, kind| {
            calls.set(calls.get() + 1);
            async move {
                match kind {
                    ImplementationKind::View => Ok(Implementation::view::<HeadlessView>()),
                    ImplementationKind::Component => Ok(Implementation::component::<RecordingComponent>()),
                    ImplementationKind::Layout => Err(LoadError::Failed {
                        tag: instance_type.key(),
                        reason: "no layouts here".to_owned(),
                    }),
                }
            }
            .boxed_local()
        })
    }

    #[tokio::test]
    async fn loads_are_memoized_per_type() {
        let calls = Rc::new(Cell::new(0));
        let registry = Registry::new();
        registry.register_loader("lcars", counting_loader(Rc::clone(&calls)));

        let text = InstanceType::named(Some("lcars"), "text");
        registry.load(&text, ImplementationKind::Component).await.unwrap();
        registry
            .load(&InstanceType::named(Some("LCARS"), "Text"), ImplementationKind::Component)
            .await
            .unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(registry.load_count(), 1);
        assert!(registry.create_component(&text).is_ok());
    }

    #[tokio::test]
    async fn unknown_namespace_without_fallback_is_unregistered() {
        let registry = Registry::new();
        let result = registry
            .load(&InstanceType::named(Some("retro"), "table"), ImplementationKind::Component)
            .await;

        assert_eq!(
            result,
            Err(LoadError::Unregistered {
                tag: "retro-table".to_owned()
            })
        );
    }

    #[tokio::test]
    async fn fallback_serves_any_namespace_and_failures_are_not_memoized() {
        let calls = Rc::new(Cell::new(0));
        let registry = Registry::new();
        registry.set_fallback(counting_loader(Rc::clone(&calls)));

        let layout = InstanceType::named(Some("retro"), "grid");
        assert!(registry.load(&layout, ImplementationKind::Layout).await.is_err());
        assert!(registry.load(&layout, ImplementationKind::Layout).await.is_err());
        assert_eq!(calls.get(), 2);
        assert!(!registry.is_loaded(&layout));
    }

    #[tokio::test]
    async fn kind_mismatch_is_reported() {
        let registry = Registry::new();
        let view = InstanceType::named(Some("lcars"), "view");
        registry.register(&view, Implementation::view::<HeadlessView>());

        assert!(matches!(
            registry.load(&view, ImplementationKind::Component).await,
            Err(LoadError::WrongKind { .. })
        ));
        assert!(matches!(registry.create_component(&view), Err(LoadError::WrongKind { .. })));
    }

    #[test]
    fn creating_before_loading_fails() {
        let registry = Registry::new();
        assert!(matches!(
            registry.create_component(&InstanceType::element("span")),
            Err(LoadError::NotLoaded { .. })
        ));
    }
}
