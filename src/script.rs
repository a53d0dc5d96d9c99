pub mod bridge;
pub mod component;
pub mod module;
pub mod quickjs;
