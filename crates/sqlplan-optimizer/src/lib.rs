#![forbid(unsafe_code)]
//! sqlplan-optimizer: structural rewrite passes over `SqlPlan`.
//!
//! - `cte_lookup`: which CTE definition a name resolves to at each statement.
//! - `pruning`: required-alias propagation + column pruning.
//! - `reducer`: sub-query collapsing (conservative and rewriting variants).
//! - `table_alias`: drops table-alias qualification in single-source statements.
//! - `rules`: the optimizer trait, optimization levels, and `optimize`.
//!
//! Every pass is a pure function from one tree to a new tree. State lives in
//! pass-local maps keyed by `NodeId`.

use serde::Serialize;

use sqlplan_core::error::Error;
use sqlplan_core::id::NodeId;

pub mod cte_lookup;
pub mod pruning;
pub mod reducer;
pub mod rules;
pub mod table_alias;

pub use cte_lookup::SqlCteAliasMappingLookup;
pub use pruning::{NodeToColumnAliasMapping, SqlColumnPrunerOptimizer};
pub use reducer::{SqlRewritingSubQueryReducer, SqlSubQueryReducer};
pub use rules::{optimize, optimizers_for_config, SqlPlanOptimizer};
pub use table_alias::SqlTableAliasSimplifier;

/// Build a defect-class error carrying `node` rendered as JSON.
pub(crate) fn defect<T: Serialize + ?Sized>(
    pass: &'static str,
    node_id: NodeId,
    node: &T,
    message: impl Into<String>,
    state: String,
) -> Error {
    Error::Defect {
        pass,
        node_id,
        message: message.into(),
        node: serde_json::to_string(node)
            .unwrap_or_else(|e| format!("<unserializable node: {}>", e)),
        state,
    }
}
