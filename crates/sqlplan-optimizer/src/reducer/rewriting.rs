//! Rewriting sub-query reducer.
//!
//! Merges a statement into the statement it reads from by substituting the
//! child's column expressions for the parent's references to them. Handles
//! filters, grouping on either side, limits, and joined sources, at the cost
//! of a long list of preconditions.

use sqlplan_core::error::Result;
use sqlplan_core::expr::{SqlColumnReplacements, SqlExpr};
use sqlplan_core::node::{
    SqlJoinDescription, SqlJoinType, SqlOrderByDescription, SqlPlanNodeRef, SqlSelectColumn,
    SqlSelectStatementNode,
};

use super::{
    blocks_substitution, carry_group_bys, child_column_replacements, cte_aliases_collide,
    is_aggregated, min_limit, references_resolve, select_lineage, CollapseRule, ReducerVisitor,
};
use crate::rules::SqlPlanOptimizer;

#[derive(Debug, Clone, Copy)]
pub struct SqlRewritingSubQueryReducer {
    max_reduction_rounds: usize,
}

impl SqlRewritingSubQueryReducer {
    pub fn new(max_reduction_rounds: usize) -> Self {
        Self {
            max_reduction_rounds,
        }
    }
}

impl Default for SqlRewritingSubQueryReducer {
    fn default() -> Self {
        Self::new(64)
    }
}

impl SqlPlanOptimizer for SqlRewritingSubQueryReducer {
    fn name(&self) -> &'static str {
        "rewriting_sub_query_reducer"
    }

    fn optimize(&self, node: &SqlPlanNodeRef) -> Result<SqlPlanNodeRef> {
        let mut visitor = ReducerVisitor::new(self, self.max_reduction_rounds);
        Ok(visitor.reduce(node))
    }
}

impl CollapseRule for SqlRewritingSubQueryReducer {
    fn try_collapse(&self, node: &SqlSelectStatementNode) -> Option<SqlSelectStatementNode> {
        if node.join_descs.is_empty() {
            collapse_from_source(node)
        } else {
            collapse_join_sources(node)
        }
    }
}

/// Parent reads only from a select statement: fold the child into it.
fn collapse_from_source(parent: &SqlSelectStatementNode) -> Option<SqlSelectStatementNode> {
    let child = parent.from_source.as_select_node()?;
    let source_alias = parent.from_source_alias.as_str();

    if blocks_substitution(parent) || blocks_substitution(child) {
        return None;
    }
    if child.distinct {
        return None;
    }
    if !parent.order_bys.is_empty() && !child.order_bys.is_empty() {
        return None;
    }
    if !parent.group_bys.is_empty() && !child.group_bys.is_empty() {
        return None;
    }
    if cte_aliases_collide(parent, child) {
        return None;
    }

    let parent_select = select_lineage(parent);
    let child_select = select_lineage(child);
    let child_aggregated = is_aggregated(child);

    // A limit applies after the child's rows are produced; filters, groups,
    // windows and DISTINCT above it must stay above it.
    if child.limit.is_some()
        && (parent.where_.is_some()
            || !parent.group_bys.is_empty()
            || parent_select.contains_aggregate
            || parent_select.contains_window_function
            || parent.distinct)
    {
        return None;
    }

    // Every child grouping key must survive as a parent column.
    let all_group_keys_selected = child.group_bys.iter().all(|g| {
        parent_select
            .column_references
            .iter()
            .any(|c| c.table_alias == source_alias && c.column_name == g.column_alias)
    });
    if !all_group_keys_selected {
        return None;
    }

    if child_aggregated {
        if parent.where_.is_some() || !parent.group_bys.is_empty() {
            return None;
        }
        if !parent
            .select_columns
            .iter()
            .all(|c| c.expr.as_column_reference().is_some())
        {
            return None;
        }
    }

    if child_select.contains_window_function {
        let window_aliases: Vec<&str> = child
            .select_columns
            .iter()
            .filter(|c| c.expr.lineage().contains_window_function)
            .map(|c| c.column_alias.as_str())
            .collect();
        let grouped_on_window = parent.group_bys.iter().any(|g| {
            g.expr.lineage().column_references.iter().any(|c| {
                c.table_alias == source_alias && window_aliases.contains(&c.column_name.as_str())
            })
        });
        // Filtering or aggregating below a window changes what it sees.
        if grouped_on_window || parent.where_.is_some() || parent_select.contains_aggregate {
            return None;
        }
    }

    if !parent.group_bys.is_empty() && !child_select.string_exprs.is_empty() {
        return None;
    }

    let replacements = child_column_replacements(source_alias, child);
    if !references_resolve(parent, source_alias, &replacements) {
        return None;
    }
    let foreign_reference = parent
        .all_exprs()
        .into_iter()
        .flat_map(|e| e.lineage().column_references)
        .any(|c| c.table_alias != source_alias);
    if foreign_reference {
        return None;
    }

    let select_columns: Vec<SqlSelectColumn> = parent
        .select_columns
        .iter()
        .map(|c| SqlSelectColumn::new(c.expr.replace_columns(&replacements), c.column_alias.clone()))
        .collect();

    let order_bys = if !parent.order_bys.is_empty() {
        resolve_parent_order_bys(parent, &replacements, &select_columns)?
    } else {
        resolve_child_order_bys(child, &select_columns)?
    };

    let group_bys = if !parent.group_bys.is_empty() {
        parent
            .group_bys
            .iter()
            .map(|g| SqlSelectColumn::new(g.expr.replace_columns(&replacements), g.column_alias.clone()))
            .collect()
    } else {
        carry_group_bys(&child.group_bys, &select_columns)
    };

    let mut cte_sources = parent.cte_sources.clone();
    cte_sources.extend(child.cte_sources.iter().cloned());

    Some(
        SqlSelectStatementNode {
            select_columns,
            from_source: child.from_source.clone(),
            from_source_alias: child.from_source_alias.clone(),
            cte_sources,
            join_descs: child.join_descs.clone(),
            group_bys,
            order_bys,
            where_: SqlExpr::conjoin(
                child.where_.clone(),
                parent.where_.as_ref().map(|w| w.replace_columns(&replacements)),
            ),
            limit: min_limit(parent.limit, child.limit),
            distinct: parent.distinct,
            ..parent.clone()
        }
        .renewed(),
    )
}

/// Parent ORDER BY entries, rewritten as references to merged select aliases.
fn resolve_parent_order_bys(
    parent: &SqlSelectStatementNode,
    replacements: &SqlColumnReplacements,
    merged_select: &[SqlSelectColumn],
) -> Option<Vec<SqlOrderByDescription>> {
    parent
        .order_bys
        .iter()
        .map(|o| {
            let alias = match o.expr.as_column_alias_reference() {
                Some(column_alias) => parent.select_column(column_alias)?.column_alias.clone(),
                None => alias_carrying(merged_select, &o.expr.replace_columns(replacements))?,
            };
            Some(SqlOrderByDescription {
                expr: SqlExpr::alias_ref(alias),
                descending: o.descending,
            })
        })
        .collect()
}

/// Child ORDER BY entries (in the child's terms, which are the merged
/// statement's terms), rewritten as references to merged select aliases.
fn resolve_child_order_bys(
    child: &SqlSelectStatementNode,
    merged_select: &[SqlSelectColumn],
) -> Option<Vec<SqlOrderByDescription>> {
    child
        .order_bys
        .iter()
        .map(|o| {
            let target = match o.expr.as_column_alias_reference() {
                Some(column_alias) => child.select_column(column_alias)?.expr.clone(),
                None => o.expr.clone(),
            };
            Some(SqlOrderByDescription {
                expr: SqlExpr::alias_ref(alias_carrying(merged_select, &target)?),
                descending: o.descending,
            })
        })
        .collect()
}

fn alias_carrying(select_columns: &[SqlSelectColumn], expr: &SqlExpr) -> Option<String> {
    select_columns
        .iter()
        .find(|c| c.expr == *expr)
        .map(|c| c.column_alias.clone())
}

/// Parent has joins: replace each source that is a plain projection of a
/// single relation with that relation.
fn collapse_join_sources(parent: &SqlSelectStatementNode) -> Option<SqlSelectStatementNode> {
    if blocks_substitution(parent) {
        return None;
    }

    let mut current = parent.clone();
    let mut changed = false;

    for index in 0..=parent.join_descs.len() {
        let (source_alias, source) = {
            let sources = current.sources();
            let (alias, source) = sources[index];
            (alias.to_string(), source.clone())
        };
        let Some(child) = source.as_select_node() else {
            continue;
        };
        if !is_simple_projection(child) {
            continue;
        }
        if null_extended(&current, index)
            && !child
                .select_columns
                .iter()
                .all(|c| c.expr.as_column_reference().is_some())
        {
            // Expressions like literals would stop evaluating to NULL for
            // unmatched rows.
            continue;
        }
        let collides = current
            .sources()
            .iter()
            .enumerate()
            .any(|(i, (alias, _))| i != index && *alias == child.from_source_alias);
        if collides {
            continue;
        }

        let replacements = child_column_replacements(&source_alias, child);
        if !references_resolve(&current, &source_alias, &replacements) {
            continue;
        }

        current = substitute_source(&current, index, child, &replacements);
        changed = true;
    }

    changed.then(|| current.renewed())
}

fn is_simple_projection(node: &SqlSelectStatementNode) -> bool {
    let lineage = select_lineage(node);
    node.join_descs.is_empty()
        && node.where_.is_none()
        && node.group_bys.is_empty()
        && node.order_bys.is_empty()
        && node.limit.is_none()
        && !node.distinct
        && node.cte_sources.is_empty()
        && !lineage.contains_aggregate
        && !lineage.contains_window_function
        && lineage.string_exprs.is_empty()
        && lineage.column_alias_references.is_empty()
}

/// Whether rows of the source at `index` can be NULL-extended by a join.
fn null_extended(node: &SqlSelectStatementNode, index: usize) -> bool {
    if index == 0 {
        return node
            .join_descs
            .iter()
            .any(|j| j.join_type == SqlJoinType::FullOuter);
    }
    matches!(
        node.join_descs[index - 1].join_type,
        SqlJoinType::LeftOuter | SqlJoinType::FullOuter
    )
}

fn substitute_source(
    node: &SqlSelectStatementNode,
    index: usize,
    child: &SqlSelectStatementNode,
    replacements: &SqlColumnReplacements,
) -> SqlSelectStatementNode {
    let rewrite_columns = |columns: &[SqlSelectColumn]| -> Vec<SqlSelectColumn> {
        columns
            .iter()
            .map(|c| SqlSelectColumn::new(c.expr.replace_columns(replacements), c.column_alias.clone()))
            .collect()
    };

    let mut rewritten = SqlSelectStatementNode {
        select_columns: rewrite_columns(&node.select_columns),
        group_bys: rewrite_columns(&node.group_bys),
        order_bys: node
            .order_bys
            .iter()
            .map(|o| SqlOrderByDescription {
                expr: o.expr.replace_columns(replacements),
                descending: o.descending,
            })
            .collect(),
        where_: node.where_.as_ref().map(|w| w.replace_columns(replacements)),
        join_descs: node
            .join_descs
            .iter()
            .map(|j| SqlJoinDescription {
                on_condition: j.on_condition.as_ref().map(|e| e.replace_columns(replacements)),
                ..j.clone()
            })
            .collect(),
        ..node.clone()
    };

    if index == 0 {
        rewritten.from_source = child.from_source.clone();
        rewritten.from_source_alias = child.from_source_alias.clone();
    } else {
        let join = &mut rewritten.join_descs[index - 1];
        join.right_source = child.from_source.clone();
        join.right_source_alias = child.from_source_alias.clone();
    }
    rewritten
}
