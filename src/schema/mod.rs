pub mod condition;
pub mod flag;
pub mod node;
pub mod tree;
