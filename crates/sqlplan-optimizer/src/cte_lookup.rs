//! Per-statement CTE scope.
//!
//! Walks the plan depth-first from the render node. The mapping visible at a
//! statement is the mapping visible at its consumer merged with the
//! statement's own `cte_sources` (inner definitions shadow outer ones). The
//! mapping is passed down as an argument, so leaving a scope needs no undo.

use std::collections::{BTreeMap, HashMap};

use sqlplan_core::cte::SqlCteAliasMapping;
use sqlplan_core::error::Result;
use sqlplan_core::id::NodeId;
use sqlplan_core::node::{SqlPlanNode, SqlSelectStatementNode};

use crate::defect;

#[derive(Debug, Clone, Default)]
pub struct SqlCteAliasMappingLookup {
    select_node_to_cte_alias_mapping: HashMap<NodeId, SqlCteAliasMapping>,
}

impl SqlCteAliasMappingLookup {
    /// Record the visible CTE mapping for every statement reachable from `root`.
    pub fn build(root: &SqlPlanNode) -> Self {
        let mut lookup = Self::default();
        lookup.descend(root, &SqlCteAliasMapping::new());
        lookup
    }

    fn descend(&mut self, node: &SqlPlanNode, visible: &SqlCteAliasMapping) {
        match node {
            SqlPlanNode::SelectStatement(n) => {
                // Reachable through several paths when shared; first scope wins.
                if self.cte_alias_mapping_exists(n.id) {
                    return;
                }
                let mapping = visible.merge(&SqlCteAliasMapping::from_cte_nodes(&n.cte_sources));
                self.select_node_to_cte_alias_mapping
                    .insert(n.id, mapping.clone());
                for parent in node.parent_nodes() {
                    self.descend(&parent, &mapping);
                }
            }
            _ => {
                for parent in node.parent_nodes() {
                    self.descend(&parent, visible);
                }
            }
        }
    }

    pub fn cte_alias_mapping_exists(&self, select_node_id: NodeId) -> bool {
        self.select_node_to_cte_alias_mapping
            .contains_key(&select_node_id)
    }

    pub fn get_cte_alias_mapping(
        &self,
        select_node: &SqlSelectStatementNode,
    ) -> Result<&SqlCteAliasMapping> {
        self.select_node_to_cte_alias_mapping
            .get(&select_node.id)
            .ok_or_else(|| {
                defect(
                    "cte_lookup",
                    select_node.id,
                    select_node,
                    "no CTE alias mapping was recorded for this select statement",
                    self.summary_json(),
                )
            })
    }

    pub fn len(&self) -> usize {
        self.select_node_to_cte_alias_mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.select_node_to_cte_alias_mapping.is_empty()
    }

    /// Statement id → visible `alias -> CTE id`, as JSON.
    fn summary_json(&self) -> String {
        let summary: BTreeMap<NodeId, BTreeMap<String, NodeId>> = self
            .select_node_to_cte_alias_mapping
            .iter()
            .map(|(id, mapping)| (*id, mapping.summary()))
            .collect();
        serde_json::to_string(&summary)
            .unwrap_or_else(|e| format!("<unserializable lookup: {}>", e))
    }
}
