use std::cell::{Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::foundation::error::{OverlayError, OverlayResult};
use crate::scene::style::{Combinator, Compound, Selector, Stylesheet, css_property_name};

/// Node handle. Ids are never reused, so a replaced node always compares unequal to its
/// predecessor.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Debug)]
pub enum NodeKind {
    Document,
    Element { tag: String },
    /// Encapsulated subtree attached to `host`.
    ShadowRoot { host: NodeId },
    Style { sheet: Stylesheet },
}

#[derive(Clone, Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub attrs: BTreeMap<String, String>,
    pub inline_style: BTreeMap<String, String>,
    pub text: String,
    pub shadow: Option<NodeId>,
    /// Scope (shadow root) that created this node, for nodes created by widget scripts.
    pub origin: Option<NodeId>,
}

impl Node {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            attrs: BTreeMap::new(),
            inline_style: BTreeMap::new(),
            text: String::new(),
            shadow: None,
            origin: None,
        }
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { tag } => Some(tag),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self.kind, NodeKind::Element { .. })
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attrs
            .get("class")
            .is_some_and(|c| c.split_whitespace().any(|c| c == class))
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

/// Resolved style properties for one element.
pub type ComputedStyle = BTreeMap<String, String>;

/// Serializable view of a subtree, shadow trees included.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attrs: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub style: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadow: Option<Box<NodeSnapshot>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

/// Node tree keyed by monotonically allocated ids. Removed nodes are dropped from the map.
#[derive(Debug)]
pub struct SceneTree {
    nodes: BTreeMap<NodeId, Node>,
    next_id: u32,
    document: NodeId,
}

impl Default for SceneTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneTree {
    pub fn new() -> Self {
        let document = NodeId(0);
        Self {
            nodes: BTreeMap::from([(document, Node::new(NodeKind::Document))]),
            next_id: 1,
            document,
        }
    }

    pub fn document(&self) -> NodeId {
        self.document
    }

    /// Number of live nodes, document included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node(&self, id: NodeId) -> OverlayResult<&Node> {
        self.get(id)
            .ok_or_else(|| OverlayError::scene(format!("node {id} does not exist")))
    }

    fn node_mut(&mut self, id: NodeId) -> OverlayResult<&mut Node> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| OverlayError::scene(format!("node {id} does not exist")))
    }

    fn element_mut(&mut self, id: NodeId) -> OverlayResult<&mut Node> {
        let node = self.node_mut(id)?;
        if !node.is_element() {
            return Err(OverlayError::scene(format!("node {id} is not an element")));
        }
        Ok(node)
    }

    fn insert(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.insert(Node::new(NodeKind::Element {
            tag: tag.trim().to_ascii_lowercase(),
        }))
    }

    pub fn create_style(&mut self, text: &str) -> NodeId {
        let mut node = Node::new(NodeKind::Style {
            sheet: Stylesheet::parse(text),
        });
        node.text = text.to_string();
        self.insert(node)
    }

    pub fn set_origin(&mut self, id: NodeId, scope: NodeId) -> OverlayResult<()> {
        self.node_mut(id)?.origin = Some(scope);
        Ok(())
    }

    /// Attaches a new shadow root to `host`. Fails if one is already attached.
    pub fn attach_shadow(&mut self, host: NodeId) -> OverlayResult<NodeId> {
        let node = self.element_mut(host)?;
        if node.shadow.is_some() {
            return Err(OverlayError::scene(format!(
                "node {host} already hosts a shadow root"
            )));
        }
        let shadow = self.insert(Node::new(NodeKind::ShadowRoot { host }));
        self.element_mut(host)?.shadow = Some(shadow);
        Ok(shadow)
    }

    pub fn shadow_root(&self, host: NodeId) -> OverlayResult<Option<NodeId>> {
        Ok(self.node(host)?.shadow)
    }

    pub fn parent(&self, id: NodeId) -> OverlayResult<Option<NodeId>> {
        Ok(self.node(id)?.parent)
    }

    pub fn children(&self, id: NodeId) -> OverlayResult<&[NodeId]> {
        Ok(&self.node(id)?.children)
    }

    pub fn find_child(&self, parent: NodeId, pred: impl Fn(&Node) -> bool) -> Option<NodeId> {
        let node = self.get(parent)?;
        node.children
            .iter()
            .copied()
            .find(|c| self.get(*c).is_some_and(&pred))
    }

    /// Whether `ancestor` is `id` or encloses it, crossing shadow roots to their hosts.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, mut id: NodeId) -> bool {
        loop {
            if id == ancestor {
                return true;
            }
            match self.get(id) {
                Some(Node {
                    parent: Some(p), ..
                }) => id = *p,
                Some(Node {
                    kind: NodeKind::ShadowRoot { host },
                    ..
                }) => id = *host,
                _ => return false,
            }
        }
    }

    /// Appends `child` as the last child of `parent`, moving it if it is already attached.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> OverlayResult<()> {
        let pnode = self.node(parent)?;
        if matches!(pnode.kind, NodeKind::Style { .. }) {
            return Err(OverlayError::scene(format!(
                "style node {parent} cannot have children"
            )));
        }
        let cnode = self.node(child)?;
        if matches!(
            cnode.kind,
            NodeKind::Document | NodeKind::ShadowRoot { .. }
        ) {
            return Err(OverlayError::scene(format!(
                "node {child} cannot be appended"
            )));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(OverlayError::scene(format!(
                "appending {child} to {parent} would create a cycle"
            )));
        }

        self.detach(child)?;
        self.node_mut(parent)?.children.push(child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    /// Unlinks `id` from its parent; the subtree stays alive.
    pub fn detach(&mut self, id: NodeId) -> OverlayResult<()> {
        let Some(parent) = self.node(id)?.parent else {
            return Ok(());
        };
        if let Ok(p) = self.node_mut(parent) {
            p.children.retain(|c| *c != id);
        }
        self.node_mut(id)?.parent = None;
        Ok(())
    }

    /// Detaches and frees `id` with its subtree, shadow trees, and any detached nodes those
    /// shadow scopes created. Removing a missing node is a no-op.
    pub fn remove(&mut self, id: NodeId) -> OverlayResult<()> {
        if !self.contains(id) {
            return Ok(());
        }
        if id == self.document {
            return Err(OverlayError::scene("the document node cannot be removed"));
        }
        self.detach(id)?;

        let mut freed_scopes = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            let Some(node) = self.nodes.remove(&cur) else {
                continue;
            };
            if matches!(node.kind, NodeKind::ShadowRoot { .. }) {
                freed_scopes.push(cur);
            }
            stack.extend(node.children);
            stack.extend(node.shadow);
        }

        for scope in freed_scopes {
            self.free_detached(scope)?;
        }
        Ok(())
    }

    /// Frees every detached subtree that `scope` created. Returns how many roots were freed.
    pub fn free_detached(&mut self, scope: NodeId) -> OverlayResult<usize> {
        let orphans: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.origin == Some(scope) && n.parent.is_none())
            .map(|(id, _)| *id)
            .collect();
        for orphan in &orphans {
            self.remove(*orphan)?;
        }
        Ok(orphans.len())
    }

    /// `id` and its light-tree descendants in pre-order. Shadow trees are not entered.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            let Some(node) = self.get(cur) else {
                continue;
            };
            out.push(cur);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Topmost ancestor of `id` within its own tree; shadow roots are not crossed.
    pub fn tree_root(&self, id: NodeId) -> OverlayResult<NodeId> {
        let mut cur = id;
        while let Some(p) = self.node(cur)?.parent {
            cur = p;
        }
        Ok(cur)
    }

    pub fn tag(&self, id: NodeId) -> OverlayResult<&str> {
        self.node(id)?
            .tag()
            .ok_or_else(|| OverlayError::scene(format!("node {id} is not an element")))
    }

    pub fn text(&self, id: NodeId) -> OverlayResult<String> {
        let node = self.node(id)?;
        if matches!(node.kind, NodeKind::Style { .. }) {
            return Ok(node.text.clone());
        }
        let mut out = node.text.clone();
        for c in &node.children {
            out.push_str(&self.text(*c)?);
        }
        Ok(out)
    }

    /// Replaces the node's content with `text`; element children are freed.
    pub fn set_text(&mut self, id: NodeId, text: &str) -> OverlayResult<()> {
        let node = self.node_mut(id)?;
        match &mut node.kind {
            NodeKind::Style { sheet } => {
                *sheet = Stylesheet::parse(text);
                node.text = text.to_string();
                Ok(())
            }
            NodeKind::Element { .. } => {
                node.text = text.to_string();
                let children = std::mem::take(&mut node.children);
                for c in children {
                    if let Ok(child) = self.node_mut(c) {
                        child.parent = None;
                    }
                    self.remove(c)?;
                }
                Ok(())
            }
            _ => Err(OverlayError::scene(format!("node {id} cannot hold text"))),
        }
    }

    pub fn attr(&self, id: NodeId, name: &str) -> OverlayResult<Option<&str>> {
        Ok(self.node(id)?.attr(name))
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> OverlayResult<()> {
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() {
            return Err(OverlayError::scene("attribute name must be non-empty"));
        }
        let node = self.element_or_style_mut(id)?;
        if name == "style" {
            node.inline_style = parse_inline_style(value);
        }
        node.attrs.insert(name, value.to_string());
        Ok(())
    }

    pub fn remove_attr(&mut self, id: NodeId, name: &str) -> OverlayResult<()> {
        let name = name.trim().to_ascii_lowercase();
        let node = self.element_or_style_mut(id)?;
        if name == "style" {
            node.inline_style.clear();
        }
        node.attrs.remove(&name);
        Ok(())
    }

    fn element_or_style_mut(&mut self, id: NodeId) -> OverlayResult<&mut Node> {
        let node = self.node_mut(id)?;
        match node.kind {
            NodeKind::Element { .. } | NodeKind::Style { .. } => Ok(node),
            _ => Err(OverlayError::scene(format!(
                "node {id} does not carry attributes"
            ))),
        }
    }

    /// Sets one inline style property; an empty value removes it.
    pub fn set_style_property(
        &mut self,
        id: NodeId,
        property: &str,
        value: &str,
    ) -> OverlayResult<()> {
        let property = css_property_name(property);
        let node = self.element_mut(id)?;
        if value.trim().is_empty() {
            node.inline_style.remove(&property);
        } else {
            node.inline_style.insert(property, value.trim().to_string());
        }
        Ok(())
    }

    pub fn style_property(&self, id: NodeId, property: &str) -> OverlayResult<Option<&str>> {
        Ok(self
            .node(id)?
            .inline_style
            .get(&css_property_name(property))
            .map(String::as_str))
    }

    /// Like `document.getElementById`: searches the document tree without entering shadow roots.
    pub fn find_element_by_id(&self, element_id: &str) -> Option<NodeId> {
        let mut stack = vec![self.document];
        while let Some(cur) = stack.pop() {
            let node = self.get(cur)?;
            if node.is_element() && node.attr("id") == Some(element_id) {
                return Some(cur);
            }
            stack.extend(node.children.iter().rev());
        }
        None
    }

    /// The scope a node lives in: the nearest enclosing shadow root, or the document.
    ///
    /// Detached nodes resolve through their topmost ancestor's `origin`, falling back to the
    /// document.
    pub fn scope_of(&self, id: NodeId) -> OverlayResult<NodeId> {
        let mut cur = id;
        let mut node = self.node(id)?;
        loop {
            if matches!(node.kind, NodeKind::ShadowRoot { .. } | NodeKind::Document) && cur != id {
                return Ok(cur);
            }
            match node.parent {
                Some(p) => {
                    cur = p;
                    node = self.node(p)?;
                }
                None => return Ok(node.origin.unwrap_or(self.document)),
            }
        }
    }

    /// Scope-local parent used for selector matching. Crossing from a shadow root yields its host
    /// as the final, `:host`-only ancestor.
    fn match_parent(&self, id: NodeId, scope: NodeId) -> Option<NodeId> {
        if self.host_of(scope) == Some(id) {
            return None;
        }
        let parent = self.get(id)?.parent?;
        if parent == scope {
            return match self.get(scope)?.kind {
                NodeKind::ShadowRoot { host } => Some(host),
                _ => None,
            };
        }
        match self.get(parent)?.kind {
            NodeKind::Element { .. } => Some(parent),
            _ => None,
        }
    }

    fn host_of(&self, scope: NodeId) -> Option<NodeId> {
        match self.get(scope)?.kind {
            NodeKind::ShadowRoot { host } => Some(host),
            _ => None,
        }
    }

    fn compound_matches(&self, c: &Compound, id: NodeId, scope: NodeId) -> bool {
        let is_host = self.host_of(scope) == Some(id);
        if c.host != is_host {
            return false;
        }
        if c.host {
            return true;
        }
        let Some(node) = self.get(id) else {
            return false;
        };
        if let Some(tag) = &c.tag
            && node.tag() != Some(tag.as_str())
        {
            return false;
        }
        if let Some(want) = &c.id
            && node.attr("id") != Some(want.as_str())
        {
            return false;
        }
        c.classes.iter().all(|cls| node.has_class(cls))
    }

    fn selector_matches_at(&self, sel: &Selector, idx: usize, id: NodeId, scope: NodeId) -> bool {
        let (combinator, compound) = &sel.parts[idx];
        if !self.compound_matches(compound, id, scope) {
            return false;
        }
        if idx == 0 {
            return true;
        }
        match combinator {
            Combinator::Child => self
                .match_parent(id, scope)
                .is_some_and(|p| self.selector_matches_at(sel, idx - 1, p, scope)),
            Combinator::Descendant => {
                let mut cur = self.match_parent(id, scope);
                while let Some(a) = cur {
                    if self.selector_matches_at(sel, idx - 1, a, scope) {
                        return true;
                    }
                    cur = self.match_parent(a, scope);
                }
                false
            }
        }
    }

    /// Stylesheets owned by `scope`, in tree order. Shadow roots nested below are not entered.
    fn scope_sheets(&self, scope: NodeId) -> Vec<&Stylesheet> {
        let mut out = Vec::new();
        let mut stack = vec![scope];
        while let Some(cur) = stack.pop() {
            let Some(node) = self.get(cur) else {
                continue;
            };
            if let NodeKind::Style { sheet } = &node.kind {
                out.push(sheet);
            }
            stack.extend(node.children.iter().rev());
        }
        out
    }

    /// Cascade for one element: `:host` rules from its own shadow root, then rules from the scope
    /// it lives in ordered by specificity and source order, then inline style.
    pub fn computed_style(&self, id: NodeId) -> OverlayResult<ComputedStyle> {
        let node = self.node(id)?;
        if !node.is_element() {
            return Err(OverlayError::scene(format!("node {id} is not an element")));
        }

        let mut out = ComputedStyle::new();
        let mut important = ComputedStyle::new();

        if let Some(shadow) = node.shadow {
            self.cascade_into(id, shadow, &mut out, &mut important);
        }
        self.cascade_into(id, self.scope_of(id)?, &mut out, &mut important);

        for (k, v) in &node.inline_style {
            out.insert(k.clone(), v.clone());
        }
        out.extend(important);
        Ok(out)
    }

    fn cascade_into(
        &self,
        id: NodeId,
        scope: NodeId,
        out: &mut ComputedStyle,
        important: &mut ComputedStyle,
    ) {
        let mut matched = Vec::new();
        let mut order = 0usize;
        for sheet in self.scope_sheets(scope) {
            for rule in &sheet.rules {
                order += 1;
                let best = rule
                    .selectors
                    .iter()
                    .filter(|s| {
                        s.subject().is_some() && self.selector_matches_at(s, s.parts.len() - 1, id, scope)
                    })
                    .map(Selector::specificity)
                    .max();
                if let Some(spec) = best {
                    matched.push((spec, order, rule));
                }
            }
        }
        matched.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        for (_, _, rule) in matched {
            for d in &rule.declarations {
                let target = if d.important { &mut *important } else { &mut *out };
                target.insert(d.name.clone(), d.value.clone());
            }
        }
    }

    pub fn snapshot(&self, id: NodeId) -> OverlayResult<NodeSnapshot> {
        let node = self.node(id)?;
        let kind = match node.kind {
            NodeKind::Document => "document",
            NodeKind::Element { .. } => "element",
            NodeKind::ShadowRoot { .. } => "shadow-root",
            NodeKind::Style { .. } => "style",
        };
        let shadow = match node.shadow {
            Some(s) => Some(Box::new(self.snapshot(s)?)),
            None => None,
        };
        let mut children = Vec::with_capacity(node.children.len());
        for c in &node.children {
            children.push(self.snapshot(*c)?);
        }
        Ok(NodeSnapshot {
            id,
            kind,
            tag: node.tag().map(str::to_string),
            attrs: node
                .attrs
                .iter()
                .filter(|(k, _)| k.as_str() != "style")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            style: node.inline_style.clone(),
            text: node.text.clone(),
            shadow,
            children,
        })
    }
}

fn parse_inline_style(value: &str) -> BTreeMap<String, String> {
    crate::scene::style::parse_declarations(value)
        .into_iter()
        .map(|d| (d.name, d.value))
        .collect()
}

/// Shared single-threaded handle to a [`SceneTree`].
///
/// Borrows must not be held across calls into widget scripts: script host functions borrow the
/// tree themselves.
#[derive(Clone, Debug, Default)]
pub struct Scene {
    inner: Rc<RefCell<SceneTree>>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn borrow(&self) -> Ref<'_, SceneTree> {
        self.inner.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, SceneTree> {
        self.inner.borrow_mut()
    }

    /// Creates `<div id="{element_id}">` under the document, as hosts do for overlay roots.
    pub fn create_root(&self, element_id: &str) -> OverlayResult<NodeId> {
        let mut tree = self.inner.borrow_mut();
        let root = tree.create_element("div");
        tree.set_attr(root, "id", element_id)?;
        let doc = tree.document();
        tree.append_child(doc, root)?;
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn el(tree: &mut SceneTree, parent: NodeId, tag: &str, class: &str) -> NodeId {
        let id = tree.create_element(tag);
        if !class.is_empty() {
            tree.set_attr(id, "class", class).unwrap();
        }
        tree.append_child(parent, id).unwrap();
        id
    }

    #[test]
    fn append_moves_existing_child_to_end() {
        let mut t = SceneTree::new();
        let doc = t.document();
        let a = el(&mut t, doc, "div", "");
        let b = el(&mut t, doc, "div", "");
        t.append_child(doc, a).unwrap();
        assert_eq!(t.children(doc).unwrap(), &[b, a]);
    }

    #[test]
    fn append_rejects_cycles() {
        let mut t = SceneTree::new();
        let doc = t.document();
        let a = el(&mut t, doc, "div", "");
        let b = el(&mut t, a, "div", "");
        assert!(t.append_child(b, a).is_err());
    }

    #[test]
    fn remove_frees_subtree_and_shadow() {
        let mut t = SceneTree::new();
        let doc = t.document();
        let host = el(&mut t, doc, "div", "");
        let shadow = t.attach_shadow(host).unwrap();
        let inner = t.create_element("span");
        t.append_child(shadow, inner).unwrap();
        let orphan = t.create_element("b");
        t.set_origin(orphan, shadow).unwrap();

        t.remove(host).unwrap();
        assert!(!t.contains(host));
        assert!(!t.contains(shadow));
        assert!(!t.contains(inner));
        assert!(!t.contains(orphan));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn ids_are_not_reused() {
        let mut t = SceneTree::new();
        let a = t.create_element("div");
        t.remove(a).unwrap();
        let b = t.create_element("div");
        assert_ne!(a, b);
    }

    #[test]
    fn free_detached_keeps_attached_and_foreign_nodes() {
        let mut t = SceneTree::new();
        let doc = t.document();
        let host = el(&mut t, doc, "div", "");
        let shadow = t.attach_shadow(host).unwrap();
        let attached = t.create_element("div");
        t.set_origin(attached, shadow).unwrap();
        t.append_child(shadow, attached).unwrap();
        let loose = t.create_element("div");
        t.set_origin(loose, shadow).unwrap();
        let loose_child = el(&mut t, loose, "span", "");
        let foreign = t.create_element("div");

        let before = t.len();
        assert_eq!(t.free_detached(shadow).unwrap(), 1);
        assert_eq!(t.len(), before - 2);
        assert!(!t.contains(loose) && !t.contains(loose_child));
        assert!(t.contains(attached) && t.contains(foreign));
    }

    #[test]
    fn subtree_and_tree_root_follow_light_children() {
        let mut t = SceneTree::new();
        let doc = t.document();
        let host = el(&mut t, doc, "div", "");
        let shadow = t.attach_shadow(host).unwrap();
        let hidden = t.create_element("i");
        t.append_child(shadow, hidden).unwrap();
        let a = el(&mut t, host, "span", "");
        let b = el(&mut t, a, "b", "");

        assert_eq!(t.subtree(host), vec![host, a, b]);
        assert_eq!(t.tree_root(b).unwrap(), doc);
        assert_eq!(t.tree_root(hidden).unwrap(), shadow);
    }

    #[test]
    fn find_by_id_does_not_enter_shadow_roots() {
        let mut t = SceneTree::new();
        let doc = t.document();
        let host = el(&mut t, doc, "div", "");
        let shadow = t.attach_shadow(host).unwrap();
        let hidden = t.create_element("div");
        t.set_attr(hidden, "id", "overlay-root").unwrap();
        t.append_child(shadow, hidden).unwrap();
        assert_eq!(t.find_element_by_id("overlay-root"), None);

        let visible = el(&mut t, doc, "div", "");
        t.set_attr(visible, "id", "overlay-root").unwrap();
        assert_eq!(t.find_element_by_id("overlay-root"), Some(visible));
    }

    #[test]
    fn set_text_replaces_children() {
        let mut t = SceneTree::new();
        let doc = t.document();
        let a = el(&mut t, doc, "div", "");
        let child = el(&mut t, a, "span", "");
        t.set_text(child, "inner").unwrap();
        assert_eq!(t.text(a).unwrap(), "inner");
        t.set_text(a, "12:00").unwrap();
        assert_eq!(t.text(a).unwrap(), "12:00");
        assert!(!t.contains(child));
    }

    #[test]
    fn shadow_styles_do_not_leak_either_way() {
        let mut t = SceneTree::new();
        let doc = t.document();
        let global = t.create_style(".label { color: green }");
        t.append_child(doc, global).unwrap();

        let outside = el(&mut t, doc, "div", "label");
        let host = el(&mut t, doc, "div", "");
        let shadow = t.attach_shadow(host).unwrap();
        let local = t.create_style(".label { color: red } :host { display: block }");
        t.append_child(shadow, local).unwrap();
        let inside = t.create_element("div");
        t.set_attr(inside, "class", "label").unwrap();
        t.append_child(shadow, inside).unwrap();

        assert_eq!(t.computed_style(outside).unwrap()["color"], "green");
        assert_eq!(t.computed_style(inside).unwrap()["color"], "red");
        let host_style = t.computed_style(host).unwrap();
        assert_eq!(host_style["display"], "block");
        assert!(!host_style.contains_key("color"));
    }

    #[test]
    fn cascade_orders_by_specificity_then_source_then_inline() {
        let mut t = SceneTree::new();
        let doc = t.document();
        let sheet = t.create_style(
            "#x { color: blue } .a { color: red; top: 1px } div.a { top: 2px } .a { left: 3px !important }",
        );
        t.append_child(doc, sheet).unwrap();
        let node = el(&mut t, doc, "div", "a");
        t.set_attr(node, "id", "x").unwrap();
        t.set_style_property(node, "left", "9px").unwrap();

        let cs = t.computed_style(node).unwrap();
        assert_eq!(cs["color"], "blue");
        assert_eq!(cs["top"], "2px");
        assert_eq!(cs["left"], "3px");
    }

    #[test]
    fn descendant_and_child_combinators_stay_in_scope() {
        let mut t = SceneTree::new();
        let doc = t.document();
        let host = el(&mut t, doc, "div", "outer");
        let shadow = t.attach_shadow(host).unwrap();
        let sheet = t.create_style(
            ".outer .x { color: red } :host .x { top: 1px } .wrap > .x { left: 2px }",
        );
        t.append_child(shadow, sheet).unwrap();
        let wrap = t.create_element("div");
        t.set_attr(wrap, "class", "wrap").unwrap();
        t.append_child(shadow, wrap).unwrap();
        let x = el(&mut t, wrap, "span", "x");

        let cs = t.computed_style(x).unwrap();
        assert!(!cs.contains_key("color"));
        assert_eq!(cs["top"], "1px");
        assert_eq!(cs["left"], "2px");
    }

    #[test]
    fn inline_style_attribute_round_trips() {
        let mut t = SceneTree::new();
        let a = t.create_element("div");
        t.set_attr(a, "style", "z-index: 3; inset: 0").unwrap();
        assert_eq!(t.style_property(a, "zIndex").unwrap(), Some("3"));
        t.set_style_property(a, "zIndex", "").unwrap();
        assert_eq!(t.style_property(a, "z-index").unwrap(), None);
    }

    #[test]
    fn scope_of_uses_origin_for_detached_nodes() {
        let mut t = SceneTree::new();
        let doc = t.document();
        let host = el(&mut t, doc, "div", "");
        let shadow = t.attach_shadow(host).unwrap();
        let inner = t.create_element("div");
        t.append_child(shadow, inner).unwrap();
        let loose = t.create_element("div");
        t.set_origin(loose, shadow).unwrap();

        assert_eq!(t.scope_of(inner).unwrap(), shadow);
        assert_eq!(t.scope_of(loose).unwrap(), shadow);
        assert_eq!(t.scope_of(host).unwrap(), doc);
    }

    #[test]
    fn snapshot_includes_shadow_tree() {
        let scene = Scene::new();
        let root = scene.create_root("overlay-root").unwrap();
        let mut t = scene.borrow_mut();
        let shadow = t.attach_shadow(root).unwrap();
        let s = t.create_element("span");
        t.append_child(shadow, s).unwrap();

        let snap = t.snapshot(t.document()).unwrap();
        let root_snap = &snap.children[0];
        assert_eq!(root_snap.attrs["id"], "overlay-root");
        let shadow_snap = root_snap.shadow.as_ref().unwrap();
        assert_eq!(shadow_snap.kind, "shadow-root");
        assert_eq!(shadow_snap.children[0].tag.as_deref(), Some("span"));
    }
}
