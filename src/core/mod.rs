pub mod note;
pub mod tree;
