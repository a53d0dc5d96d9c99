use crate::scene::tree::{NodeId, Scene};

/// Source of the node that overlay containers are mounted under.
///
/// Consulted at the start of every reconciliation; `None` means the host page has no root yet.
pub trait RootProvider {
    fn current_root(&self) -> Option<NodeId>;
}

impl<F> RootProvider for F
where
    F: Fn() -> Option<NodeId>,
{
    fn current_root(&self) -> Option<NodeId> {
        self()
    }
}

/// Resolves the root by element id in the document scope, the way a host page exposes it.
#[derive(Clone, Debug)]
pub struct ElementIdRoot {
    scene: Scene,
    element_id: String,
}

impl ElementIdRoot {
    pub fn new(scene: Scene, element_id: impl Into<String>) -> Self {
        Self {
            scene,
            element_id: element_id.into(),
        }
    }
}

impl RootProvider for ElementIdRoot {
    fn current_root(&self) -> Option<NodeId> {
        self.scene.borrow().find_element_by_id(&self.element_id)
    }
}
