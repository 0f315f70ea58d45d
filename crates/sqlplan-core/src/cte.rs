//! CTE name resolution.
//!
//! A `SqlCteAliasMapping` is the set of CTE definitions visible at one point
//! of a query. Inner scopes may redefine an alias already bound outside; the
//! inner definition wins, which is what `merge` models.

use std::collections::BTreeMap;

use crate::id::NodeId;
use crate::node::SqlCteNode;

#[derive(Debug, Clone, Default)]
pub struct SqlCteAliasMapping {
    cte_alias_to_cte_node: BTreeMap<String, SqlCteNode>,
}

impl SqlCteAliasMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cte_nodes<'a>(cte_nodes: impl IntoIterator<Item = &'a SqlCteNode>) -> Self {
        Self {
            cte_alias_to_cte_node: cte_nodes
                .into_iter()
                .map(|cte| (cte.cte_alias.clone(), cte.clone()))
                .collect(),
        }
    }

    pub fn get_cte_node_for_alias(&self, cte_alias: &str) -> Option<&SqlCteNode> {
        self.cte_alias_to_cte_node.get(cte_alias)
    }

    pub fn contains(&self, cte_alias: &str) -> bool {
        self.cte_alias_to_cte_node.contains_key(cte_alias)
    }

    /// Entries of `other` (the inner scope) override entries of `self`.
    pub fn merge(&self, other: &SqlCteAliasMapping) -> SqlCteAliasMapping {
        let mut merged = self.cte_alias_to_cte_node.clone();
        for (alias, cte) in &other.cte_alias_to_cte_node {
            merged.insert(alias.clone(), cte.clone());
        }
        SqlCteAliasMapping {
            cte_alias_to_cte_node: merged,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cte_alias_to_cte_node.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cte_alias_to_cte_node.len()
    }

    /// `alias -> node id`, for diagnostics.
    pub fn summary(&self) -> BTreeMap<String, NodeId> {
        self.cte_alias_to_cte_node
            .iter()
            .map(|(alias, cte)| (alias.clone(), cte.id))
            .collect()
    }
}
