//! Drops table-alias qualification where it is redundant.
//!
//! In a statement with a single source every column reference is
//! unambiguous, so `a.foo` can render as `foo`. ORDER BY and GROUP BY are the
//! exception: there an unqualified name that matches a different output alias
//! would bind to that output column instead, so such references stay
//! qualified.

use std::collections::HashMap;

use sqlplan_core::error::Result;
use sqlplan_core::expr::SqlExpr;
use sqlplan_core::id::NodeId;
use sqlplan_core::node::{
    SqlCreateTableAsNode, SqlCteNode, SqlJoinDescription, SqlOrderByDescription, SqlPlanNode,
    SqlPlanNodeRef, SqlSelectColumn, SqlSelectStatementNode, SqlSelectTextNode, SqlTableNode,
};
use sqlplan_core::visitor::SqlPlanNodeVisitor;

use crate::rules::SqlPlanOptimizer;

#[derive(Debug, Default, Clone, Copy)]
pub struct SqlTableAliasSimplifier;

impl SqlPlanOptimizer for SqlTableAliasSimplifier {
    fn name(&self) -> &'static str {
        "table_alias_simplifier"
    }

    fn optimize(&self, node: &SqlPlanNodeRef) -> Result<SqlPlanNodeRef> {
        let mut visitor = SimplifierVisitor::default();
        Ok(visitor.simplify(node))
    }
}

#[derive(Default)]
struct SimplifierVisitor {
    simplified: HashMap<NodeId, SqlPlanNodeRef>,
}

impl SimplifierVisitor {
    fn simplify(&mut self, node: &SqlPlanNodeRef) -> SqlPlanNodeRef {
        if let Some(done) = self.simplified.get(&node.id()) {
            return done.clone();
        }
        let rebuilt = match node.as_ref() {
            SqlPlanNode::Table(_) | SqlPlanNode::SelectText(_) => node.clone(),
            _ => node.accept(self),
        };
        self.simplified.insert(node.id(), rebuilt.clone());
        rebuilt
    }

    fn simplify_cte(&mut self, cte: &SqlCteNode) -> SqlCteNode {
        if let Some(SqlPlanNode::Cte(done)) = self.simplified.get(&cte.id).map(|n| n.as_ref()) {
            return done.clone();
        }
        let rebuilt = SqlCteNode::new(self.simplify(&cte.select_statement), cte.cte_alias.clone());
        self.simplified.insert(cte.id, rebuilt.clone().into_node());
        rebuilt
    }
}

/// Whether `expr` may drop qualification inside ORDER BY / GROUP BY.
fn unqualified_binds_same(expr: &SqlExpr, select_columns: &[SqlSelectColumn]) -> bool {
    expr.lineage().column_references.iter().all(|col_ref| {
        select_columns.iter().all(|c| {
            c.column_alias != col_ref.column_name || c.expr.as_column_reference() == Some(col_ref)
        })
    })
}

fn unqualify_clause(expr: &SqlExpr, select_columns: &[SqlSelectColumn]) -> SqlExpr {
    if unqualified_binds_same(expr, select_columns) {
        expr.with_table_alias_rendering(false)
    } else {
        expr.clone()
    }
}

impl SqlPlanNodeVisitor for SimplifierVisitor {
    type Output = SqlPlanNodeRef;

    fn visit_table_node(&mut self, node: &SqlTableNode) -> SqlPlanNodeRef {
        node.clone().into_node()
    }

    fn visit_select_text_node(&mut self, node: &SqlSelectTextNode) -> SqlPlanNodeRef {
        node.clone().into_node()
    }

    fn visit_select_statement_node(&mut self, node: &SqlSelectStatementNode) -> SqlPlanNodeRef {
        let from_source = self.simplify(&node.from_source);
        let join_descs: Vec<SqlJoinDescription> = node
            .join_descs
            .iter()
            .map(|j| SqlJoinDescription {
                right_source: self.simplify(&j.right_source),
                ..j.clone()
            })
            .collect();
        let cte_sources: Vec<SqlCteNode> = node.cte_sources.iter().map(|c| self.simplify_cte(c)).collect();

        let rebuilt = SqlSelectStatementNode {
            id: NodeId::next(),
            from_source,
            join_descs,
            cte_sources,
            ..node.clone()
        };
        if !node.join_descs.is_empty() {
            return rebuilt.into_node();
        }

        // Checked against the original select list; rendering flags do not
        // change which names the list exposes.
        let select = &node.select_columns;
        SqlSelectStatementNode {
            select_columns: select
                .iter()
                .map(|c| SqlSelectColumn::new(c.expr.with_table_alias_rendering(false), c.column_alias.clone()))
                .collect(),
            where_: node.where_.as_ref().map(|w| w.with_table_alias_rendering(false)),
            group_bys: node
                .group_bys
                .iter()
                .map(|g| SqlSelectColumn::new(unqualify_clause(&g.expr, select), g.column_alias.clone()))
                .collect(),
            order_bys: node
                .order_bys
                .iter()
                .map(|o| SqlOrderByDescription {
                    expr: unqualify_clause(&o.expr, select),
                    descending: o.descending,
                })
                .collect(),
            ..rebuilt
        }
        .into_node()
    }

    fn visit_cte_node(&mut self, node: &SqlCteNode) -> SqlPlanNodeRef {
        self.simplify_cte(node).into_node()
    }

    fn visit_create_table_as_node(&mut self, node: &SqlCreateTableAsNode) -> SqlPlanNodeRef {
        SqlCreateTableAsNode::new(node.sql_table.clone(), self.simplify(&node.parent)).into_node()
    }
}
