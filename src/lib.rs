//! Overlay composition runtime.
//!
//! Compiles user-authored widget scripts into instances, mounts each into its own
//! style-encapsulated surface, and reconciles the live set against a desired ordered sequence of
//! widget definitions:
//!
//! - Describe widgets with [`WidgetDefinition`] (or load an [`OverlayDocument`])
//! - Create an [`OverlayReconciler`] over a [`Scene`] and call [`OverlayReconciler::load`]
//! - Observe mount transitions through the injected [`MountRegistry`]
//!
//! The single-widget [`OverlayRuntime`] backs interactive previews and reports compile and mount
//! errors to the caller.
#![forbid(unsafe_code)]

pub mod foundation;
pub mod model;
pub mod runtime;
pub mod scene;
pub mod script;
pub mod surface;

pub use crate::foundation::error::{OverlayError, OverlayResult};
pub use crate::model::document::OverlayDocument;
pub use crate::model::widget::{WidgetDefinition, WidgetId, sort_for_stacking};
pub use crate::runtime::overlay::OverlayRuntime;
pub use crate::runtime::persist::{InMemoryMountStore, JsonFileMountStore, MountStore};
pub use crate::runtime::reconciler::{LoadReport, OverlayReconciler, ReconcilerOpts, WidgetFailure};
pub use crate::runtime::registry::{MountEvent, MountRegistry, Subscription};
pub use crate::runtime::root::{ElementIdRoot, RootProvider};
pub use crate::scene::tree::{NodeId, NodeSnapshot, Scene, SceneTree};
pub use crate::script::component::{CompileCtx, Component, ModuleCompiler};
pub use crate::script::quickjs::QuickJsCompiler;
pub use crate::surface::{Surface, SurfaceManager};
