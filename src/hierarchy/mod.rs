//! UI hierarchy capture model: typed element tree and per-capture indices.

pub mod index;
pub mod node;
pub mod parser;

pub use index::{Index, ScrollAxis};
pub use node::{Bounds, Node};
pub use parser::parse;
