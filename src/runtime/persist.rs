use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Context as _;

use crate::model::widget::WidgetId;

/// Durable record of mount transitions.
///
/// Called fire-and-forget by the reconciler: errors are logged there and never reach `load`.
pub trait MountStore {
    fn record_mount_state(&self, id: &WidgetId, mounted: bool) -> anyhow::Result<()>;
}

impl<T: MountStore + ?Sized> MountStore for Rc<T> {
    fn record_mount_state(&self, id: &WidgetId, mounted: bool) -> anyhow::Result<()> {
        (**self).record_mount_state(id, mounted)
    }
}

/// In-memory store for tests and debugging.
#[derive(Debug, Default)]
pub struct InMemoryMountStore {
    states: RefCell<BTreeMap<WidgetId, bool>>,
    history: RefCell<Vec<(WidgetId, bool)>>,
}

impl InMemoryMountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, id: &str) -> Option<bool> {
        self.states.borrow().get(id).copied()
    }

    /// Every recorded transition, oldest first.
    pub fn history(&self) -> Vec<(WidgetId, bool)> {
        self.history.borrow().clone()
    }
}

impl MountStore for InMemoryMountStore {
    fn record_mount_state(&self, id: &WidgetId, mounted: bool) -> anyhow::Result<()> {
        self.states.borrow_mut().insert(id.clone(), mounted);
        self.history.borrow_mut().push((id.clone(), mounted));
        Ok(())
    }
}

/// Writes the full `{ id: mounted }` map as JSON after every transition.
#[derive(Debug)]
pub struct JsonFileMountStore {
    path: PathBuf,
    states: RefCell<BTreeMap<WidgetId, bool>>,
}

impl JsonFileMountStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            states: RefCell::new(BTreeMap::new()),
        }
    }
}

impl MountStore for JsonFileMountStore {
    fn record_mount_state(&self, id: &WidgetId, mounted: bool) -> anyhow::Result<()> {
        self.states.borrow_mut().insert(id.clone(), mounted);
        let json = serde_json::to_vec_pretty(&*self.states.borrow())
            .context("serialize mount states")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("write mount states '{}'", self.path.display()))?;
        Ok(())
    }
}
