pub mod document;
pub mod widget;
