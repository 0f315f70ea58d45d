//! sqlplan: relational SQL plan IR plus structural optimizer.
//!
//! Re-exports the workspace crates so integration tests and callers can
//! depend on a single package.

pub use sqlplan_core as core;
pub use sqlplan_optimizer as optimizer;

pub use sqlplan_optimizer::optimize;
