pub mod overlay;
pub mod persist;
pub mod reconciler;
pub mod registry;
pub mod root;
