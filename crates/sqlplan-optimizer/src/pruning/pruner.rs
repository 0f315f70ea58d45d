//! Rebuilds the plan keeping only required select columns.

use std::collections::{HashMap, HashSet};

use sqlplan_core::error::Result;
use sqlplan_core::id::NodeId;
use sqlplan_core::node::{
    SqlCreateTableAsNode, SqlCteNode, SqlJoinDescription, SqlPlanNode, SqlPlanNodeRef,
    SqlSelectColumn, SqlSelectStatementNode, SqlSelectTextNode, SqlTableNode,
};
use sqlplan_core::visitor::SqlPlanNodeVisitor;

use super::tag_required::{NodeToColumnAliasMapping, RequiredColumnAliasTagger};
use crate::cte_lookup::SqlCteAliasMappingLookup;
use crate::defect;
use crate::rules::SqlPlanOptimizer;

const PASS: &str = "column_pruner";

/// Removes select columns nothing downstream reads, and CTEs nothing
/// references.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlColumnPrunerOptimizer;

impl SqlPlanOptimizer for SqlColumnPrunerOptimizer {
    fn name(&self) -> &'static str {
        PASS
    }

    fn optimize(&self, node: &SqlPlanNodeRef) -> Result<SqlPlanNodeRef> {
        let cte_lookup = SqlCteAliasMappingLookup::build(node);
        let Some(required) = RequiredColumnAliasTagger::tag(node, &cte_lookup)? else {
            return Ok(node.clone());
        };
        Self::prune_with_required(node, &required)
    }
}

impl SqlColumnPrunerOptimizer {
    /// Rebuild `node` keeping the columns `required` names for each
    /// statement. Every reachable statement must have an entry, and must
    /// keep at least one column; otherwise this is a defect.
    pub fn prune_with_required(
        node: &SqlPlanNodeRef,
        required: &NodeToColumnAliasMapping,
    ) -> Result<SqlPlanNodeRef> {
        let mut visitor = PrunerVisitor {
            required,
            pruned: HashMap::new(),
        };
        visitor.prune(node)
    }
}

struct PrunerVisitor<'a> {
    required: &'a NodeToColumnAliasMapping,
    /// Original id → rebuilt node, so shared sub-trees stay shared.
    pruned: HashMap<NodeId, SqlPlanNodeRef>,
}

impl PrunerVisitor<'_> {
    fn prune(&mut self, node: &SqlPlanNodeRef) -> Result<SqlPlanNodeRef> {
        if let Some(done) = self.pruned.get(&node.id()) {
            return Ok(done.clone());
        }
        let rebuilt = match node.as_ref() {
            SqlPlanNode::Table(_) | SqlPlanNode::SelectText(_) => node.clone(),
            _ => node.accept(self)?,
        };
        self.pruned.insert(node.id(), rebuilt.clone());
        Ok(rebuilt)
    }

    fn prune_cte(&mut self, cte: &SqlCteNode) -> Result<SqlCteNode> {
        if let Some(done) = self.pruned.get(&cte.id).and_then(|n| n.as_cte_node()) {
            return Ok(done.clone());
        }
        let rebuilt = SqlCteNode::new(self.prune(&cte.select_statement)?, cte.cte_alias.clone());
        self.pruned.insert(cte.id, rebuilt.clone().into_node());
        Ok(rebuilt)
    }

    fn is_referenced(&self, cte: &SqlCteNode) -> bool {
        self.required
            .get_aliases(cte.id)
            .map_or(false, |aliases| !aliases.is_empty())
    }
}

impl SqlPlanNodeVisitor for PrunerVisitor<'_> {
    type Output = Result<SqlPlanNodeRef>;

    fn visit_table_node(&mut self, node: &SqlTableNode) -> Self::Output {
        Ok(node.clone().into_node())
    }

    fn visit_select_text_node(&mut self, node: &SqlSelectTextNode) -> Self::Output {
        Ok(node.clone().into_node())
    }

    fn visit_select_statement_node(&mut self, node: &SqlSelectStatementNode) -> Self::Output {
        let required = self.required.get_aliases(node.id).ok_or_else(|| {
            defect(
                PASS,
                node.id,
                node,
                "select statement was not reached while tagging required columns",
                self.required.summary_json(),
            )
        })?;
        let group_by_aliases: HashSet<&str> =
            node.group_bys.iter().map(|c| c.column_alias.as_str()).collect();

        let select_columns: Vec<SqlSelectColumn> = node
            .select_columns
            .iter()
            .filter(|c| {
                required.contains(&c.column_alias)
                    || group_by_aliases.contains(c.column_alias.as_str())
            })
            .cloned()
            .collect();
        if select_columns.is_empty() {
            return Err(defect(
                PASS,
                node.id,
                node,
                format!(
                    "every select column was pruned; columns {:?}, required {:?}",
                    node.select_column_aliases(),
                    required
                ),
                self.required.summary_json(),
            ));
        }

        let from_source = self.prune(&node.from_source)?;
        let join_descs = node
            .join_descs
            .iter()
            .map(|j| {
                Ok(SqlJoinDescription {
                    right_source: self.prune(&j.right_source)?,
                    ..j.clone()
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut cte_sources = Vec::with_capacity(node.cte_sources.len());
        for cte in &node.cte_sources {
            if !self.is_referenced(cte) {
                #[cfg(feature = "tracing")]
                tracing::trace!(cte = %cte.cte_alias, "dropping unreferenced CTE");
                continue;
            }
            cte_sources.push(self.prune_cte(cte)?);
        }

        Ok(SqlSelectStatementNode {
            id: NodeId::next(),
            select_columns,
            from_source,
            cte_sources,
            join_descs,
            ..node.clone()
        }
        .into_node())
    }

    fn visit_cte_node(&mut self, node: &SqlCteNode) -> Self::Output {
        Ok(self.prune_cte(node)?.into_node())
    }

    fn visit_create_table_as_node(&mut self, node: &SqlCreateTableAsNode) -> Self::Output {
        let parent = self.prune(&node.parent)?;
        Ok(SqlCreateTableAsNode::new(node.sql_table.clone(), parent).into_node())
    }
}
