//! Column pruning.
//!
//! Two phases: `tag_required` computes, for every reachable node, the output
//! aliases something downstream needs; `pruner` rebuilds the tree keeping
//! only those columns.

mod pruner;
mod tag_required;

pub use pruner::SqlColumnPrunerOptimizer;
pub use tag_required::{NodeToColumnAliasMapping, RequiredColumnAliasTagger};
