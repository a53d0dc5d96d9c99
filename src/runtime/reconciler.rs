use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use serde::Serialize;

use crate::foundation::error::{OverlayError, OverlayResult};
use crate::model::widget::{WidgetDefinition, WidgetId, sort_for_stacking};
use crate::runtime::overlay::OverlayRuntime;
use crate::runtime::persist::MountStore;
use crate::runtime::registry::MountRegistry;
use crate::runtime::root::RootProvider;
use crate::scene::tree::{NodeId, Scene, SceneTree};
use crate::script::component::ModuleCompiler;
use crate::surface::SurfaceManager;

pub const CONTAINER_CLASS: &str = "widget-container";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcilerOpts {
    /// Stable-sort the enabled widgets by `z_order` before reconciling. When off, input order is
    /// paint order and callers pre-sort with [`sort_for_stacking`].
    pub sort_by_z_order: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WidgetFailure {
    pub id: WidgetId,
    pub name: String,
    pub message: String,
}

/// What one `load` did, per widget id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Newly mounted, in paint order.
    pub mounted: Vec<WidgetId>,
    /// Already live and kept as is (possibly restacked).
    pub updated: Vec<WidgetId>,
    /// Already live with a changed script or stylesheet, re-applied in place.
    pub reapplied: Vec<WidgetId>,
    pub removed: Vec<WidgetId>,
    pub failed: Vec<WidgetFailure>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

struct LiveWidget {
    container: NodeId,
    runtime: OverlayRuntime,
    fingerprint: u64,
}

/// Keeps the set of mounted widgets under the overlay root in line with a desired sequence of
/// widget definitions.
///
/// Per widget id the only states are absent and mounted. Live widgets are never torn down just
/// because they were reordered; only a changed root, a removal, or a changed definition touches
/// their instance.
pub struct OverlayReconciler {
    scene: Scene,
    surfaces: SurfaceManager,
    compiler: Rc<dyn ModuleCompiler>,
    roots: Box<dyn RootProvider>,
    registry: MountRegistry,
    store: Option<Box<dyn MountStore>>,
    opts: ReconcilerOpts,
    root: Option<NodeId>,
    live: BTreeMap<WidgetId, LiveWidget>,
}

impl std::fmt::Debug for OverlayReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayReconciler")
            .field("root", &self.root)
            .field("live", &self.live.keys().collect::<Vec<_>>())
            .field("opts", &self.opts)
            .finish()
    }
}

impl OverlayReconciler {
    pub fn new(
        scene: Scene,
        compiler: Rc<dyn ModuleCompiler>,
        roots: impl RootProvider + 'static,
        registry: MountRegistry,
    ) -> Self {
        Self {
            surfaces: SurfaceManager::new(scene.clone()),
            scene,
            compiler,
            roots: Box::new(roots),
            registry,
            store: None,
            opts: ReconcilerOpts::default(),
            root: None,
            live: BTreeMap::new(),
        }
    }

    pub fn with_store(mut self, store: impl MountStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn with_opts(mut self, opts: ReconcilerOpts) -> Self {
        self.opts = opts;
        self
    }

    pub fn registry(&self) -> &MountRegistry {
        &self.registry
    }

    /// The root the live widgets are mounted under.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn live_ids(&self) -> Vec<WidgetId> {
        self.live.keys().cloned().collect()
    }

    pub fn is_live(&self, id: &str) -> bool {
        self.live.contains_key(id)
    }

    pub fn container_of(&self, id: &str) -> Option<NodeId> {
        self.live.get(id).map(|w| w.container)
    }

    pub fn layer_of(&self, id: &str) -> Option<NodeId> {
        self.live.get(id).and_then(|w| w.runtime.layer())
    }

    /// Reconciles the live set against `widgets`, whose order is the desired paint order.
    ///
    /// Failures of individual widgets are logged and reported, never returned. The only error is
    /// [`OverlayError::RootUnavailable`], in which case nothing changed.
    #[tracing::instrument(skip_all, fields(widgets = widgets.len()))]
    pub fn load(&mut self, widgets: &[WidgetDefinition]) -> OverlayResult<LoadReport> {
        let mut report = LoadReport::default();
        let root = self.sync_root(&mut report)?;
        let desired = self.desired(widgets);

        let keep: BTreeSet<&WidgetId> = desired.iter().map(|w| &w.id).collect();
        let stale: Vec<WidgetId> = self
            .live
            .keys()
            .filter(|id| !keep.contains(id))
            .cloned()
            .collect();
        for id in stale {
            if let Some(w) = self.live.remove(&id) {
                self.retire(&id, w);
                report.removed.push(id);
            }
        }

        for def in &desired {
            if self.live.contains_key(&def.id) {
                self.update_live(root, def, &mut report);
            } else {
                match self.mount_new(root, def) {
                    Ok(()) => report.mounted.push(def.id.clone()),
                    Err(e) => {
                        if e.is_widget_failure() {
                            tracing::warn!(widget = %def.id, "skipping widget: {e}");
                        } else {
                            tracing::error!(widget = %def.id, "skipping widget, host failure: {e}");
                        }
                        report.failed.push(WidgetFailure {
                            id: def.id.clone(),
                            name: def.label().to_string(),
                            message: e.to_string(),
                        });
                    }
                }
            }
        }

        tracing::debug!(
            mounted = report.mounted.len(),
            updated = report.updated.len(),
            reapplied = report.reapplied.len(),
            removed = report.removed.len(),
            failed = report.failed.len(),
            "overlay reconciled"
        );
        Ok(report)
    }

    /// Unmounts every live widget. The next `load` starts from an empty live set.
    pub fn unload_all(&mut self) {
        for (id, w) in std::mem::take(&mut self.live) {
            self.retire(&id, w);
        }
    }

    /// Mounts or unmounts one widget without touching the others.
    ///
    /// Enabling an already live widget is a no-op. Unlike `load`, a compile or mount failure is
    /// returned to the caller.
    pub fn toggle_widget(&mut self, def: &WidgetDefinition, enabled: bool) -> OverlayResult<()> {
        if !enabled {
            if let Some(w) = self.live.remove(&def.id) {
                self.retire(&def.id, w);
            }
            return Ok(());
        }
        let mut report = LoadReport::default();
        let root = self.sync_root(&mut report)?;
        if self.live.contains_key(&def.id) {
            return Ok(());
        }
        self.mount_new(root, def)
    }

    /// Advances every live widget's frame clock; returns the number of callbacks that ran.
    pub fn run_frame(&mut self, now_ms: f64) -> usize {
        self.live
            .values_mut()
            .map(|w| w.runtime.run_frame(now_ms))
            .sum()
    }

    /// Resolves the current root, resetting all live widgets if it was replaced since the last
    /// call.
    fn sync_root(&mut self, report: &mut LoadReport) -> OverlayResult<NodeId> {
        let root = self
            .roots
            .current_root()
            .ok_or(OverlayError::RootUnavailable)?;
        if self.root == Some(root) {
            return Ok(root);
        }
        if !self.live.is_empty() {
            tracing::info!(
                previous = ?self.root,
                %root,
                live = self.live.len(),
                "overlay root replaced, unmounting live widgets"
            );
        }
        for (id, w) in std::mem::take(&mut self.live) {
            self.retire(&id, w);
            report.removed.push(id);
        }
        self.root = Some(root);
        Ok(root)
    }

    /// Enabled widgets, first occurrence of each id, optionally sorted by z-order.
    fn desired(&self, widgets: &[WidgetDefinition]) -> Vec<WidgetDefinition> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::with_capacity(widgets.len());
        for w in widgets.iter().filter(|w| w.enabled) {
            if !seen.insert(&w.id) {
                tracing::warn!(widget = %w.id, "duplicate widget id, keeping the first");
                continue;
            }
            out.push(w.clone());
        }
        if self.opts.sort_by_z_order {
            sort_for_stacking(&mut out);
        }
        out
    }

    fn update_live(&mut self, root: NodeId, def: &WidgetDefinition, report: &mut LoadReport) {
        let fingerprint = def.content_fingerprint();
        let Some(w) = self.live.get_mut(&def.id) else {
            return;
        };

        if w.fingerprint != fingerprint {
            if let Err(e) = w.runtime.apply(&def.script, &def.stylesheet) {
                tracing::warn!(widget = %def.id, "re-apply failed, unmounting: {e}");
                report.failed.push(WidgetFailure {
                    id: def.id.clone(),
                    name: def.label().to_string(),
                    message: e.to_string(),
                });
                if let Some(w) = self.live.remove(&def.id) {
                    self.retire(&def.id, w);
                    report.removed.push(def.id.clone());
                }
                return;
            }
            w.fingerprint = fingerprint;
            report.reapplied.push(def.id.clone());
        } else {
            report.updated.push(def.id.clone());
        }

        let container = w.container;
        let mut tree = self.scene.borrow_mut();
        let z = def.z_order.to_string();
        let restacked = match tree.set_style_property(container, "z-index", &z) {
            Ok(()) => tree.append_child(root, container),
            Err(e) => Err(e),
        };
        if let Err(e) = restacked {
            tracing::warn!(widget = %def.id, "restack container: {e}");
        }
    }

    fn mount_new(&mut self, root: NodeId, def: &WidgetDefinition) -> OverlayResult<()> {
        let container = self.create_container(root, def)?;
        let attached = OverlayRuntime::attach(
            &self.surfaces,
            self.compiler.clone(),
            container,
            def.label(),
        );
        let mut runtime = match attached {
            Ok(r) => r,
            Err(e) => {
                self.free_container(container);
                return Err(e);
            }
        };
        if let Err(e) = runtime.apply(&def.script, &def.stylesheet) {
            self.free_container(container);
            return Err(e);
        }

        self.live.insert(
            def.id.clone(),
            LiveWidget {
                container,
                runtime,
                fingerprint: def.content_fingerprint(),
            },
        );
        self.mark(&def.id, true);
        tracing::debug!(widget = %def.id, %container, "widget mounted");
        Ok(())
    }

    fn create_container(&self, root: NodeId, def: &WidgetDefinition) -> OverlayResult<NodeId> {
        let mut tree = self.scene.borrow_mut();
        let container = tree.create_element("div");
        if let Err(e) = fill_container(&mut tree, root, container, def) {
            tree.remove(container)?;
            return Err(e);
        }
        Ok(container)
    }

    fn free_container(&self, container: NodeId) {
        if let Err(e) = self.scene.borrow_mut().remove(container) {
            tracing::warn!(%container, "free container: {e}");
        }
    }

    /// Tears down one widget that has already been taken out of `live`.
    fn retire(&self, id: &WidgetId, mut w: LiveWidget) {
        w.runtime.destroy();
        self.free_container(w.container);
        self.mark(id, false);
        tracing::debug!(widget = %id, "widget unmounted");
    }

    fn mark(&self, id: &WidgetId, mounted: bool) {
        if mounted {
            self.registry.mark_mounted(id);
        } else {
            self.registry.mark_unmounted(id);
        }
        if let Some(store) = &self.store
            && let Err(e) = store.record_mount_state(id, mounted)
        {
            tracing::warn!(widget = %id, mounted, "record mount state: {e:#}");
        }
    }
}

fn fill_container(
    tree: &mut SceneTree,
    root: NodeId,
    container: NodeId,
    def: &WidgetDefinition,
) -> OverlayResult<()> {
    tree.set_attr(container, "id", &format!("widget-{}", def.id))?;
    tree.set_attr(container, "class", CONTAINER_CLASS)?;
    tree.set_attr(
        container,
        "style",
        &format!(
            "position: absolute; inset: 0; pointer-events: none; z-index: {}",
            def.z_order
        ),
    )?;
    tree.append_child(root, container)
}

impl Drop for OverlayReconciler {
    fn drop(&mut self) {
        self.unload_all();
    }
}
