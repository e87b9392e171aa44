pub mod config;
pub mod descriptor;
pub mod error;
pub mod headless;
pub mod instance;
pub mod link_manager;
pub mod platform;
pub mod reconcile;
pub mod registry;
pub mod view_model;

pub use config::Config;
pub use descriptor::{ComponentModel, Head, HistoryMode, Layers, Link, Schema};
pub use error::{BindingError, LoadError, NetworkError, ValidationError, ViewError};
pub use link_manager::{CurrentValue, Discriminator, FieldScope, LinkManager, LinkValues};
pub use reconcile::{InstanceType, ReconcileReport};
pub use registry::{Implementation, ImplementationKind, Registry};
pub use view_model::{HistoryEntry, NavigationRequest, Navigator, ViewModel};

#[cfg(target_arch = "wasm32")]
pub use zoon;
