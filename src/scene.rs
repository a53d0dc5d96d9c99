pub mod style;
pub mod tree;
