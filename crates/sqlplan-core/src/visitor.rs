//! Double dispatch over the closed node set.
//!
//! Adding a node variant means adding a method here, which forces every
//! visitor (passes and renderers alike) to handle it.

use crate::node::{
    SqlCreateTableAsNode, SqlCteNode, SqlPlanNode, SqlSelectStatementNode, SqlSelectTextNode,
    SqlTableNode,
};

pub trait SqlPlanNodeVisitor {
    type Output;

    fn visit_table_node(&mut self, node: &SqlTableNode) -> Self::Output;

    fn visit_select_text_node(&mut self, node: &SqlSelectTextNode) -> Self::Output;

    fn visit_select_statement_node(&mut self, node: &SqlSelectStatementNode) -> Self::Output;

    fn visit_cte_node(&mut self, node: &SqlCteNode) -> Self::Output;

    fn visit_create_table_as_node(&mut self, node: &SqlCreateTableAsNode) -> Self::Output;
}

impl SqlPlanNode {
    pub fn accept<V: SqlPlanNodeVisitor + ?Sized>(&self, visitor: &mut V) -> V::Output {
        match self {
            SqlPlanNode::Table(n) => visitor.visit_table_node(n),
            SqlPlanNode::SelectText(n) => visitor.visit_select_text_node(n),
            SqlPlanNode::SelectStatement(n) => visitor.visit_select_statement_node(n),
            SqlPlanNode::Cte(n) => visitor.visit_cte_node(n),
            SqlPlanNode::CreateTableAs(n) => visitor.visit_create_table_as_node(n),
        }
    }
}
