//! Dialect-neutral, single-line SQL rendering.
//!
//! Engine-specific renderers live outside this crate; this one exists so
//! plans can be compared as text in tests and printed in diagnostics.

use crate::node::{
    SqlCreateTableAsNode, SqlCteNode, SqlPlanNode, SqlSelectStatementNode, SqlSelectTextNode,
    SqlTableNode,
};
use crate::visitor::SqlPlanNodeVisitor;

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSqlRenderer;

impl DefaultSqlRenderer {
    fn render_source(&mut self, source: &SqlPlanNode, alias: &str) -> String {
        match source {
            SqlPlanNode::Table(n) => format!("{} {}", n.sql_table, alias),
            SqlPlanNode::Cte(n) => format!("{} {}", n.cte_alias, alias),
            SqlPlanNode::SelectText(n) => format!("({}) {}", n.select_query, alias),
            SqlPlanNode::SelectStatement(_) | SqlPlanNode::CreateTableAs(_) => {
                format!("({}) {}", source.accept(self), alias)
            }
        }
    }
}

impl SqlPlanNodeVisitor for DefaultSqlRenderer {
    type Output = String;

    fn visit_table_node(&mut self, node: &SqlTableNode) -> String {
        format!("SELECT * FROM {}", node.sql_table)
    }

    fn visit_select_text_node(&mut self, node: &SqlSelectTextNode) -> String {
        node.select_query.clone()
    }

    fn visit_select_statement_node(&mut self, node: &SqlSelectStatementNode) -> String {
        let mut sql = String::new();

        if !node.cte_sources.is_empty() {
            let ctes: Vec<String> = node
                .cte_sources
                .iter()
                .map(|cte| format!("{} AS ({})", cte.cte_alias, cte.select_statement.accept(self)))
                .collect();
            sql.push_str("WITH ");
            sql.push_str(&ctes.join(", "));
            sql.push(' ');
        }

        sql.push_str("SELECT ");
        if node.distinct {
            sql.push_str("DISTINCT ");
        }
        let columns: Vec<String> = node
            .select_columns
            .iter()
            .map(|c| format!("{} AS {}", c.expr, c.column_alias))
            .collect();
        sql.push_str(&columns.join(", "));

        sql.push_str(" FROM ");
        let from = self.render_source(&node.from_source, &node.from_source_alias);
        sql.push_str(&from);

        for join in &node.join_descs {
            let source = self.render_source(&join.right_source, &join.right_source_alias);
            sql.push(' ');
            sql.push_str(join.join_type.as_sql());
            sql.push(' ');
            sql.push_str(&source);
            if let Some(on) = &join.on_condition {
                sql.push_str(&format!(" ON {}", on));
            }
        }

        if let Some(where_) = &node.where_ {
            sql.push_str(&format!(" WHERE {}", where_));
        }

        if !node.group_bys.is_empty() {
            let group_bys: Vec<String> = node.group_bys.iter().map(|c| c.expr.to_string()).collect();
            sql.push_str(" GROUP BY ");
            sql.push_str(&group_bys.join(", "));
        }

        if !node.order_bys.is_empty() {
            let order_bys: Vec<String> = node
                .order_bys
                .iter()
                .map(|o| {
                    if o.descending {
                        format!("{} DESC", o.expr)
                    } else {
                        o.expr.to_string()
                    }
                })
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&order_bys.join(", "));
        }

        if let Some(limit) = node.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        sql
    }

    fn visit_cte_node(&mut self, node: &SqlCteNode) -> String {
        node.select_statement.accept(self)
    }

    fn visit_create_table_as_node(&mut self, node: &SqlCreateTableAsNode) -> String {
        format!("CREATE TABLE {} AS {}", node.sql_table, node.parent.accept(self))
    }
}

pub fn render_sql(node: &SqlPlanNode) -> String {
    node.accept(&mut DefaultSqlRenderer)
}
