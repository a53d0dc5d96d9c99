use std::rc::Rc;

use crate::foundation::error::OverlayResult;
use crate::scene::tree::NodeId;
use crate::script::component::{CompileCtx, Component, ModuleCompiler};
use crate::surface::{Surface, SurfaceManager};

/// Runs exactly one widget on one surface.
///
/// `apply` always tears down the current instance before compiling the new one, so on failure
/// the widget is left unmounted rather than half applied.
pub struct OverlayRuntime {
    surface: Surface,
    compiler: Rc<dyn ModuleCompiler>,
    label: String,
    layer: Option<NodeId>,
    instance: Option<Box<dyn Component>>,
}

impl std::fmt::Debug for OverlayRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayRuntime")
            .field("label", &self.label)
            .field("container", &self.surface.container())
            .field("layer", &self.layer)
            .field("mounted", &self.instance.is_some())
            .finish()
    }
}

impl OverlayRuntime {
    /// Binds a runtime to the surface of `container`, creating the surface if needed.
    pub fn attach(
        surfaces: &SurfaceManager,
        compiler: Rc<dyn ModuleCompiler>,
        container: NodeId,
        label: impl Into<String>,
    ) -> OverlayResult<Self> {
        Ok(Self {
            surface: surfaces.get_or_create_surface(container)?,
            compiler,
            label: label.into(),
            layer: None,
            instance: None,
        })
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn layer(&self) -> Option<NodeId> {
        self.layer
    }

    pub fn is_mounted(&self) -> bool {
        self.instance.is_some()
    }

    #[tracing::instrument(skip_all, fields(widget = %self.label))]
    pub fn apply(&mut self, script: &str, stylesheet: &str) -> OverlayResult<()> {
        self.teardown();

        self.surface.set_stylesheet(stylesheet)?;
        let layer = self.surface.new_layer()?;
        self.layer = Some(layer);

        let cx = CompileCtx {
            scene: self.surface.scene().clone(),
            host: self.surface.mount_host(),
            layer,
            scope: self.surface.scope(),
            label: self.label.clone(),
        };
        let mut instance = match self.compiler.compile(script, &cx) {
            Ok(i) => i,
            Err(e) => {
                self.release_layer();
                return Err(e);
            }
        };

        if let Err(e) = instance.mount(layer) {
            // Release whatever the instance started before it failed.
            if instance.has_unmount()
                && let Err(u) = instance.unmount()
            {
                tracing::warn!(widget = %self.label, "unmount after failed mount: {u}");
            }
            self.release_layer();
            return Err(e);
        }

        tracing::debug!(%layer, "widget mounted");
        self.instance = Some(instance);
        Ok(())
    }

    /// Tears down the current instance and removes the widget stylesheet. A no-op when nothing is
    /// mounted.
    pub fn destroy(&mut self) {
        self.teardown();
        if let Err(e) = self.surface.clear_stylesheet() {
            tracing::warn!(widget = %self.label, "clear stylesheet: {e}");
        }
    }

    /// Advances the instance's frame clock.
    pub fn run_frame(&mut self, now_ms: f64) -> usize {
        match self.instance.as_mut() {
            Some(i) => i.run_frame(now_ms),
            None => 0,
        }
    }

    /// Unmount errors are logged and swallowed; the layer is freed after `unmount` returns.
    fn teardown(&mut self) {
        if let Some(mut instance) = self.instance.take()
            && instance.has_unmount()
            && let Err(e) = instance.unmount()
        {
            let e = e.into_unmount();
            tracing::warn!(widget = %self.label, "overlay unmount error: {e}");
        }
        self.release_layer();
    }

    /// Frees the layer and any detached nodes the released instance created.
    fn release_layer(&mut self) {
        let Some(layer) = self.layer.take() else {
            return;
        };
        // The layer is already gone when the whole root was torn down.
        let mut tree = self.surface.scene().borrow_mut();
        if tree.contains(layer)
            && let Err(e) = tree.remove(layer)
        {
            tracing::warn!(widget = %self.label, "release layer: {e}");
        }
        let scope = self.surface.scope();
        if tree.contains(scope) {
            match tree.free_detached(scope) {
                Ok(0) => {}
                Ok(n) => tracing::debug!(widget = %self.label, freed = n, "freed detached nodes"),
                Err(e) => tracing::warn!(widget = %self.label, "free detached nodes: {e}"),
            }
        }
    }
}
