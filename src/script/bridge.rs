//! Host functions backing the script prelude's DOM shim.
//!
//! Every node a script reads must live in the scope of the surface it was compiled for. Writes
//! are narrower: only the widget's layer subtree and detached nodes the script created itself are
//! mutable, so the mount host and everything around it stay read-only.
//!
//! Nodes the script creates are tagged with its scope and tracked here. The prelude reports each
//! wrapper it hands out and each one the engine collects; [`HostBridge::sweep`] frees detached
//! subtrees no wrapper can reach anymore.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use rquickjs::{Ctx, Exception, Function, Object};

use crate::foundation::error::{OverlayError, OverlayResult};
use crate::scene::tree::{NodeId, NodeKind, Scene, SceneTree};
use crate::script::component::CompileCtx;

pub(crate) const PRELUDE: &str = include_str!("prelude.js");

pub(crate) struct HostBridge {
    scene: Scene,
    scope: NodeId,
    layer: NodeId,
    label: String,
    /// Nodes created through `createElement` that may still exist.
    created: RefCell<BTreeSet<NodeId>>,
    /// Live script wrappers per node.
    handles: RefCell<BTreeMap<NodeId, usize>>,
}

impl HostBridge {
    pub(crate) fn new(cx: &CompileCtx) -> Self {
        Self {
            scene: cx.scene.clone(),
            scope: cx.scope,
            layer: cx.layer,
            label: cx.label.clone(),
            created: RefCell::new(BTreeSet::new()),
            handles: RefCell::new(BTreeMap::new()),
        }
    }

    fn element(&self, tree: &SceneTree, raw: u32) -> OverlayResult<NodeId> {
        let id = NodeId(raw);
        let node = tree.node(id)?;
        if !node.is_element() {
            return Err(OverlayError::scene(format!("node {id} is not an element")));
        }
        if tree.scope_of(id)? != self.scope {
            return Err(OverlayError::scene(format!(
                "node {id} is outside this widget's surface"
            )));
        }
        Ok(id)
    }

    /// Like [`Self::element`], but the node must also be inside the layer or belong to a detached
    /// tree this script created.
    fn writable(&self, tree: &SceneTree, raw: u32) -> OverlayResult<NodeId> {
        let id = self.element(tree, raw)?;
        if tree.is_ancestor_or_self(self.layer, id) {
            return Ok(id);
        }
        let top = tree.tree_root(id)?;
        let node = tree.node(top)?;
        if node.is_element() && node.origin == Some(self.scope) {
            return Ok(id);
        }
        Err(OverlayError::scene(format!(
            "node {id} is outside this widget's layer"
        )))
    }

    /// A writable node other than the layer itself, which stays where the surface put it.
    fn movable(&self, tree: &SceneTree, raw: u32) -> OverlayResult<NodeId> {
        let id = self.writable(tree, raw)?;
        if id == self.layer {
            return Err(OverlayError::scene(format!(
                "layer {id} cannot be moved or detached"
            )));
        }
        Ok(id)
    }

    fn create_element(&self, tag: &str) -> OverlayResult<u32> {
        if tag.trim().is_empty() {
            return Err(OverlayError::scene("element tag must be non-empty"));
        }
        let mut tree = self.scene.borrow_mut();
        let id = tree.create_element(tag);
        tree.set_origin(id, self.scope)?;
        self.created.borrow_mut().insert(id);
        Ok(id.0)
    }

    fn tag_name(&self, raw: u32) -> OverlayResult<String> {
        let tree = self.scene.borrow();
        let id = self.element(&tree, raw)?;
        Ok(tree.tag(id)?.to_string())
    }

    fn get_attribute(&self, raw: u32, name: &str) -> OverlayResult<Option<String>> {
        let tree = self.scene.borrow();
        let id = self.element(&tree, raw)?;
        Ok(tree.attr(id, &name.to_ascii_lowercase())?.map(str::to_string))
    }

    fn set_attribute(&self, raw: u32, name: &str, value: &str) -> OverlayResult<()> {
        let mut tree = self.scene.borrow_mut();
        let id = self.writable(&tree, raw)?;
        tree.set_attr(id, name, value)
    }

    fn remove_attribute(&self, raw: u32, name: &str) -> OverlayResult<()> {
        let mut tree = self.scene.borrow_mut();
        let id = self.writable(&tree, raw)?;
        tree.remove_attr(id, name)
    }

    fn get_text(&self, raw: u32) -> OverlayResult<String> {
        let tree = self.scene.borrow();
        let id = self.element(&tree, raw)?;
        tree.text(id)
    }

    fn set_text(&self, raw: u32, text: &str) -> OverlayResult<()> {
        let mut tree = self.scene.borrow_mut();
        let id = self.writable(&tree, raw)?;
        tree.set_text(id, text)
    }

    fn get_style(&self, raw: u32, property: &str) -> OverlayResult<Option<String>> {
        let tree = self.scene.borrow();
        let id = self.element(&tree, raw)?;
        Ok(tree.style_property(id, property)?.map(str::to_string))
    }

    fn set_style(&self, raw: u32, property: &str, value: &str) -> OverlayResult<()> {
        let mut tree = self.scene.borrow_mut();
        let id = self.writable(&tree, raw)?;
        tree.set_style_property(id, property, value)
    }

    fn append_child(&self, parent: u32, child: u32) -> OverlayResult<()> {
        let mut tree = self.scene.borrow_mut();
        let parent = self.writable(&tree, parent)?;
        let child = self.movable(&tree, child)?;
        tree.append_child(parent, child)
    }

    fn detach(&self, raw: u32) -> OverlayResult<()> {
        let mut tree = self.scene.borrow_mut();
        let id = self.movable(&tree, raw)?;
        tree.detach(id)
    }

    /// Parent element within the same scope; shadow roots are never handed out.
    fn parent(&self, raw: u32) -> OverlayResult<Option<u32>> {
        let tree = self.scene.borrow();
        let id = self.element(&tree, raw)?;
        let Some(parent) = tree.parent(id)? else {
            return Ok(None);
        };
        let visible = matches!(tree.node(parent)?.kind, NodeKind::Element { .. })
            && tree.scope_of(parent)? == self.scope;
        Ok(visible.then_some(parent.0))
    }

    fn children(&self, raw: u32) -> OverlayResult<Vec<u32>> {
        let tree = self.scene.borrow();
        let id = self.element(&tree, raw)?;
        Ok(tree
            .children(id)?
            .iter()
            .filter(|c| tree.get(**c).is_some_and(|n| n.is_element()))
            .map(|c| c.0)
            .collect())
    }

    fn retain(&self, raw: u32) {
        *self.handles.borrow_mut().entry(NodeId(raw)).or_default() += 1;
    }

    fn release(&self, raw: u32) {
        let mut handles = self.handles.borrow_mut();
        let id = NodeId(raw);
        if let Some(n) = handles.get_mut(&id) {
            *n -= 1;
            if *n == 0 {
                handles.remove(&id);
            }
        }
    }

    /// Frees detached trees this script created once no node in them has a live wrapper.
    /// Returns the number of trees freed.
    pub(crate) fn sweep(&self) -> usize {
        let mut tree = self.scene.borrow_mut();
        let mut created = self.created.borrow_mut();
        let handles = self.handles.borrow();
        created.retain(|id| tree.contains(*id));

        let unreachable: Vec<NodeId> = created
            .iter()
            .copied()
            .filter(|id| tree.get(*id).is_some_and(|n| n.parent.is_none()))
            .filter(|id| tree.subtree(*id).iter().all(|n| !handles.contains_key(n)))
            .collect();
        let mut freed = 0;
        for id in unreachable {
            match tree.remove(id) {
                Ok(()) => freed += 1,
                Err(e) => tracing::warn!(widget = %self.label, "free detached node {id}: {e}"),
            }
        }
        if freed > 0 {
            created.retain(|id| tree.contains(*id));
            tracing::trace!(widget = %self.label, freed, "freed detached nodes");
        }
        freed
    }

    fn log(&self, level: &str, message: &str) {
        let widget = self.label.as_str();
        match level {
            "error" => tracing::error!(widget, "{message}"),
            "warn" => tracing::warn!(widget, "{message}"),
            "debug" => tracing::debug!(widget, "{message}"),
            _ => tracing::info!(widget, "{message}"),
        }
    }
}

fn throw(ctx: &Ctx<'_>, err: OverlayError) -> rquickjs::Error {
    Exception::throw_message(ctx, &err.to_string())
}

/// Builds the native object handed to the prelude.
pub(crate) fn install_host<'js>(
    ctx: &Ctx<'js>,
    bridge: Rc<HostBridge>,
) -> rquickjs::Result<Object<'js>> {
    let native = Object::new(ctx.clone())?;

    let b = bridge.clone();
    native.set(
        "createElement",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, tag: String| {
            b.create_element(&tag).map_err(|e| throw(&ctx, e))
        })?,
    )?;

    let b = bridge.clone();
    native.set(
        "tagName",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, id: u32| {
            b.tag_name(id).map_err(|e| throw(&ctx, e))
        })?,
    )?;

    let b = bridge.clone();
    native.set(
        "getAttribute",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, id: u32, name: String| {
            b.get_attribute(id, &name).map_err(|e| throw(&ctx, e))
        })?,
    )?;

    let b = bridge.clone();
    native.set(
        "setAttribute",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, id: u32, name: String, value: String| {
                b.set_attribute(id, &name, &value)
                    .map_err(|e| throw(&ctx, e))
            },
        )?,
    )?;

    let b = bridge.clone();
    native.set(
        "removeAttribute",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, id: u32, name: String| {
            b.remove_attribute(id, &name).map_err(|e| throw(&ctx, e))
        })?,
    )?;

    let b = bridge.clone();
    native.set(
        "getText",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, id: u32| {
            b.get_text(id).map_err(|e| throw(&ctx, e))
        })?,
    )?;

    let b = bridge.clone();
    native.set(
        "setText",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, id: u32, text: String| {
            b.set_text(id, &text).map_err(|e| throw(&ctx, e))
        })?,
    )?;

    let b = bridge.clone();
    native.set(
        "getStyle",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, id: u32, prop: String| {
            b.get_style(id, &prop).map_err(|e| throw(&ctx, e))
        })?,
    )?;

    let b = bridge.clone();
    native.set(
        "setStyle",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, id: u32, prop: String, value: String| {
                b.set_style(id, &prop, &value).map_err(|e| throw(&ctx, e))
            },
        )?,
    )?;

    let b = bridge.clone();
    native.set(
        "appendChild",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, parent: u32, child: u32| {
            b.append_child(parent, child).map_err(|e| throw(&ctx, e))
        })?,
    )?;

    let b = bridge.clone();
    native.set(
        "detach",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, id: u32| {
            b.detach(id).map_err(|e| throw(&ctx, e))
        })?,
    )?;

    let b = bridge.clone();
    native.set(
        "parent",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, id: u32| {
            b.parent(id).map_err(|e| throw(&ctx, e))
        })?,
    )?;

    let b = bridge.clone();
    native.set(
        "children",
        Function::new(ctx.clone(), move |ctx: Ctx<'js>, id: u32| {
            b.children(id).map_err(|e| throw(&ctx, e))
        })?,
    )?;

    let b = bridge.clone();
    native.set(
        "retain",
        Function::new(ctx.clone(), move |id: u32| b.retain(id))?,
    )?;

    let b = bridge.clone();
    native.set(
        "release",
        Function::new(ctx.clone(), move |id: u32| b.release(id))?,
    )?;

    let b = bridge;
    native.set(
        "log",
        Function::new(ctx.clone(), move |level: String, message: String| {
            b.log(&level, &message);
        })?,
    )?;

    Ok(native)
}
