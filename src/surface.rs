//! Style-encapsulated rendering surfaces, one per host container.
//!
//! A surface is a shadow root on the container holding, in order: the base style node, the
//! mount host, and (once a widget stylesheet is set) the widget style node. Widget instances
//! mount into a fresh layer under the mount host.

use crate::foundation::error::OverlayResult;
use crate::scene::tree::{NodeId, Scene};

pub const SURFACE_CLASS: &str = "ov-surface";
pub const LAYER_CLASS: &str = "ov-layer";
pub const BASE_STYLE_MARKER: &str = "data-overlay-style";
pub const USER_STYLE_MARKER: &str = "data-overlay-user";

/// Surfaces and layers cover their parent and ignore pointer input unless a widget opts in.
pub const BASE_STYLESHEET: &str = r#"
:host {
  position: absolute;
  inset: 0;
  display: block;
  pointer-events: none;
}
.ov-surface {
  position: absolute;
  inset: 0;
  pointer-events: none;
}
.ov-layer {
  position: absolute;
  inset: 0;
  pointer-events: none;
  box-sizing: border-box;
}
"#;

#[derive(Clone, Debug)]
pub struct SurfaceManager {
    scene: Scene,
}

impl SurfaceManager {
    pub fn new(scene: Scene) -> Self {
        Self { scene }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Returns the surface owned by `container`, creating it on first use. Repeated calls on the
    /// same container return the same shadow root and mount host.
    pub fn get_or_create_surface(&self, container: NodeId) -> OverlayResult<Surface> {
        let mut tree = self.scene.borrow_mut();

        let shadow = match tree.shadow_root(container)? {
            Some(s) => s,
            None => tree.attach_shadow(container)?,
        };

        if tree
            .find_child(shadow, |n| n.attr(BASE_STYLE_MARKER).is_some())
            .is_none()
        {
            let base = tree.create_style(BASE_STYLESHEET);
            tree.set_attr(base, BASE_STYLE_MARKER, "true")?;
            tree.append_child(shadow, base)?;
        }

        let mount_host = match tree.find_child(shadow, |n| n.has_class(SURFACE_CLASS)) {
            Some(h) => h,
            None => {
                let h = tree.create_element("div");
                tree.set_attr(h, "class", SURFACE_CLASS)?;
                tree.append_child(shadow, h)?;
                h
            }
        };

        Ok(Surface {
            scene: self.scene.clone(),
            container,
            shadow,
            mount_host,
        })
    }
}

#[derive(Clone, Debug)]
pub struct Surface {
    scene: Scene,
    container: NodeId,
    shadow: NodeId,
    mount_host: NodeId,
}

impl Surface {
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn container(&self) -> NodeId {
        self.container
    }

    /// The shadow root; also the style scope of everything under this surface.
    pub fn scope(&self) -> NodeId {
        self.shadow
    }

    pub fn mount_host(&self) -> NodeId {
        self.mount_host
    }

    /// Replaces the widget stylesheet wholesale.
    pub fn set_stylesheet(&self, text: &str) -> OverlayResult<()> {
        let mut tree = self.scene.borrow_mut();
        match tree.find_child(self.shadow, |n| n.attr(USER_STYLE_MARKER).is_some()) {
            Some(style) => tree.set_text(style, text),
            None => {
                let style = tree.create_style(text);
                tree.set_attr(style, USER_STYLE_MARKER, "true")?;
                tree.append_child(self.shadow, style)
            }
        }
    }

    pub fn stylesheet(&self) -> Option<String> {
        let tree = self.scene.borrow();
        let style = tree.find_child(self.shadow, |n| n.attr(USER_STYLE_MARKER).is_some())?;
        tree.text(style).ok()
    }

    pub fn clear_stylesheet(&self) -> OverlayResult<()> {
        let mut tree = self.scene.borrow_mut();
        if let Some(style) = tree.find_child(self.shadow, |n| n.attr(USER_STYLE_MARKER).is_some())
        {
            tree.remove(style)?;
        }
        Ok(())
    }

    /// Creates a fresh layer under the mount host. Everything still under the host is freed
    /// first, so a surface never holds more than one layer. A mount host that was moved out of
    /// the shadow root is put back in place ahead of the widget stylesheet.
    pub fn new_layer(&self) -> OverlayResult<NodeId> {
        let mut tree = self.scene.borrow_mut();
        if tree.parent(self.mount_host)? != Some(self.shadow) {
            tracing::warn!(surface = %self.shadow, "mount host was detached; restoring it");
            tree.append_child(self.shadow, self.mount_host)?;
            if let Some(user) =
                tree.find_child(self.shadow, |n| n.attr(USER_STYLE_MARKER).is_some())
            {
                tree.append_child(self.shadow, user)?;
            }
        }

        let stale = tree.children(self.mount_host)?.to_vec();
        for node in stale {
            tree.remove(node)?;
        }
        tree.free_detached(self.shadow)?;

        let layer = tree.create_element("div");
        tree.set_attr(layer, "class", LAYER_CLASS)?;
        tree.append_child(self.mount_host, layer)?;
        Ok(layer)
    }

    pub fn layers(&self) -> Vec<NodeId> {
        let tree = self.scene.borrow();
        tree.children(self.mount_host)
            .map(|cs| {
                cs.iter()
                    .copied()
                    .filter(|c| tree.get(*c).is_some_and(|n| n.has_class(LAYER_CLASS)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (SurfaceManager, NodeId) {
        let scene = Scene::new();
        let root = scene.create_root("overlay-root").unwrap();
        let container = {
            let mut t = scene.borrow_mut();
            let c = t.create_element("div");
            t.append_child(root, c).unwrap();
            c
        };
        (SurfaceManager::new(scene), container)
    }

    #[test]
    fn surface_is_idempotent_per_container() {
        let (mgr, container) = setup();
        let a = mgr.get_or_create_surface(container).unwrap();
        let b = mgr.get_or_create_surface(container).unwrap();
        assert_eq!(a.scope(), b.scope());
        assert_eq!(a.mount_host(), b.mount_host());

        let tree = mgr.scene().borrow();
        assert_eq!(tree.children(a.scope()).unwrap().len(), 2);
    }

    #[test]
    fn stylesheet_is_replaced_not_merged() {
        let (mgr, container) = setup();
        let s = mgr.get_or_create_surface(container).unwrap();
        let layer = s.new_layer().unwrap();
        {
            let mut t = mgr.scene().borrow_mut();
            t.set_attr(layer, "class", "ov-layer a b").unwrap();
        }

        s.set_stylesheet(".a { color: red }").unwrap();
        s.set_stylesheet(".b { top: 1px }").unwrap();
        assert_eq!(s.stylesheet().as_deref(), Some(".b { top: 1px }"));

        let cs = mgr.scene().borrow().computed_style(layer).unwrap();
        assert!(!cs.contains_key("color"));
        assert_eq!(cs["top"], "1px");

        s.clear_stylesheet().unwrap();
        assert_eq!(s.stylesheet(), None);
    }

    #[test]
    fn layers_default_to_non_interactive_full_cover() {
        let (mgr, container) = setup();
        let s = mgr.get_or_create_surface(container).unwrap();
        let layer = s.new_layer().unwrap();
        let t = mgr.scene().borrow();

        let layer_style = t.computed_style(layer).unwrap();
        assert_eq!(layer_style["pointer-events"], "none");
        assert_eq!(layer_style["position"], "absolute");
        assert_eq!(layer_style["inset"], "0");

        let host_style = t.computed_style(container).unwrap();
        assert_eq!(host_style["pointer-events"], "none");
    }

    #[test]
    fn new_layer_clears_foreign_children_and_restores_the_host() {
        let (mgr, container) = setup();
        let s = mgr.get_or_create_surface(container).unwrap();
        s.set_stylesheet(".x {}").unwrap();
        s.new_layer().unwrap();
        let stray = {
            let mut t = mgr.scene().borrow_mut();
            let stray = t.create_element("div");
            t.append_child(s.mount_host(), stray).unwrap();
            t.detach(s.mount_host()).unwrap();
            stray
        };

        let layer = s.new_layer().unwrap();
        let t = mgr.scene().borrow();
        assert!(!t.contains(stray));
        assert_eq!(t.children(s.mount_host()).unwrap(), &[layer]);
        assert_eq!(t.parent(s.mount_host()).unwrap(), Some(s.scope()));
        let order: Vec<_> = t
            .children(s.scope())
            .unwrap()
            .iter()
            .map(|c| t.get(*c).unwrap().attr(USER_STYLE_MARKER).is_some())
            .collect();
        assert_eq!(order, vec![false, false, true]);
    }

    #[test]
    fn new_layer_frees_the_previous_one() {
        let (mgr, container) = setup();
        let s = mgr.get_or_create_surface(container).unwrap();
        let first = s.new_layer().unwrap();
        let second = s.new_layer().unwrap();
        assert_ne!(first, second);
        assert_eq!(s.layers(), vec![second]);
        assert!(!mgr.scene().borrow().contains(first));
    }
}
