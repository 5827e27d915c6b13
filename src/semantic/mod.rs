//! Semantic passes over the typed AST
//!
//! - Escape analysis: which variables are referenced from a scope nested
//!   inside their declaring scope
//! - Call graph: which functions each function calls directly

pub mod call_graph;
pub mod escape_analysis;

pub use call_graph::CallGraph;
pub use escape_analysis::{analyze, EscapeError, EscapeMap};
