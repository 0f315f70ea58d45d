//! Plan nodes: the relational IR the optimizer rewrites.
//!
//! A plan is a DAG of `Arc<SqlPlanNode>`. Nodes are immutable once wrapped;
//! every rewrite builds new nodes. Identity is the `NodeId` assigned at
//! construction; two structurally identical statements at different positions
//! are different entities.
//!
//! Invariant relied on by every traversal: the parents of a `SelectStatement`
//! are exactly its `from_source`, each join's `right_source`, then its
//! `cte_sources`, in that order. The type makes this structural, so
//! `parent_nodes()` cannot drift from the fields.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::cte::SqlCteAliasMapping;
use crate::error::{Error, Result};
use crate::expr::SqlExpr;
use crate::hash::{hash_serde, Hash256};
use crate::id::{NodeId, PlanId};

pub type SqlPlanNodeRef = Arc<SqlPlanNode>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SqlTable {
    pub schema_name: Option<String>,
    pub table_name: String,
}

impl SqlTable {
    pub fn new(schema_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            schema_name: Some(schema_name.into()),
            table_name: table_name.into(),
        }
    }

    /// A table name without schema; this is how CTEs are referenced.
    pub fn bare(table_name: impl Into<String>) -> Self {
        Self {
            schema_name: None,
            table_name: table_name.into(),
        }
    }

    /// Parse `schema.table` or `table`.
    pub fn parse(name: &str) -> Result<Self> {
        let parts: Vec<&str> = name.split('.').collect();
        match parts.as_slice() {
            [table] if !table.is_empty() => Ok(Self::bare(*table)),
            [schema, table] if !schema.is_empty() && !table.is_empty() => {
                Ok(Self::new(*schema, *table))
            }
            _ => Err(Error::Plan(format!("invalid table name '{}'", name))),
        }
    }
}

impl fmt::Display for SqlTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema_name {
            Some(schema) => write!(f, "{}.{}", schema, self.table_name),
            None => f.write_str(&self.table_name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlSelectColumn {
    pub expr: SqlExpr,
    pub column_alias: String,
}

impl SqlSelectColumn {
    pub fn new(expr: SqlExpr, column_alias: impl Into<String>) -> Self {
        Self {
            expr,
            column_alias: column_alias.into(),
        }
    }

    /// `table_alias.column AS column`
    pub fn from_column(table_alias: &str, column_name: &str) -> Self {
        Self::new(SqlExpr::column(table_alias, column_name), column_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SqlJoinType {
    LeftOuter,
    FullOuter,
    Inner,
    Cross,
}

impl SqlJoinType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlJoinType::LeftOuter => "LEFT OUTER JOIN",
            SqlJoinType::FullOuter => "FULL OUTER JOIN",
            SqlJoinType::Inner => "INNER JOIN",
            SqlJoinType::Cross => "CROSS JOIN",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SqlJoinDescription {
    pub right_source: SqlPlanNodeRef,
    pub right_source_alias: String,
    pub join_type: SqlJoinType,
    pub on_condition: Option<SqlExpr>,
}

impl SqlJoinDescription {
    pub fn new(
        right_source: SqlPlanNodeRef,
        right_source_alias: impl Into<String>,
        join_type: SqlJoinType,
        on_condition: Option<SqlExpr>,
    ) -> Self {
        Self {
            right_source,
            right_source_alias: right_source_alias.into(),
            join_type,
            on_condition,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlOrderByDescription {
    pub expr: SqlExpr,
    pub descending: bool,
}

impl SqlOrderByDescription {
    pub fn asc(expr: SqlExpr) -> Self {
        Self {
            expr,
            descending: false,
        }
    }

    pub fn desc(expr: SqlExpr) -> Self {
        Self {
            expr,
            descending: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SqlTableNode {
    #[serde(skip)]
    pub id: NodeId,
    pub sql_table: SqlTable,
}

impl SqlTableNode {
    pub fn new(sql_table: SqlTable) -> Self {
        Self {
            id: NodeId::next(),
            sql_table,
        }
    }

    pub fn into_node(self) -> SqlPlanNodeRef {
        Arc::new(SqlPlanNode::Table(self))
    }
}

/// Opaque, user-supplied `SELECT`.
#[derive(Debug, Clone, Serialize)]
pub struct SqlSelectTextNode {
    #[serde(skip)]
    pub id: NodeId,
    pub select_query: String,
}

impl SqlSelectTextNode {
    pub fn new(select_query: impl Into<String>) -> Self {
        Self {
            id: NodeId::next(),
            select_query: select_query.into(),
        }
    }

    pub fn into_node(self) -> SqlPlanNodeRef {
        Arc::new(SqlPlanNode::SelectText(self))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SqlSelectStatementNode {
    #[serde(skip)]
    pub id: NodeId,
    pub select_columns: Vec<SqlSelectColumn>,
    pub from_source: SqlPlanNodeRef,
    pub from_source_alias: String,
    pub cte_sources: Vec<SqlCteNode>,
    pub join_descs: Vec<SqlJoinDescription>,
    pub group_bys: Vec<SqlSelectColumn>,
    pub order_bys: Vec<SqlOrderByDescription>,
    #[serde(rename = "where")]
    pub where_: Option<SqlExpr>,
    pub limit: Option<u64>,
    pub distinct: bool,
}

impl SqlSelectStatementNode {
    pub fn new(
        select_columns: Vec<SqlSelectColumn>,
        from_source: SqlPlanNodeRef,
        from_source_alias: impl Into<String>,
    ) -> Self {
        Self {
            id: NodeId::next(),
            select_columns,
            from_source,
            from_source_alias: from_source_alias.into(),
            cte_sources: Vec::new(),
            join_descs: Vec::new(),
            group_bys: Vec::new(),
            order_bys: Vec::new(),
            where_: None,
            limit: None,
            distinct: false,
        }
    }

    pub fn with_cte_sources(mut self, cte_sources: Vec<SqlCteNode>) -> Self {
        self.cte_sources = cte_sources;
        self
    }

    pub fn with_joins(mut self, join_descs: Vec<SqlJoinDescription>) -> Self {
        self.join_descs = join_descs;
        self
    }

    pub fn with_group_bys(mut self, group_bys: Vec<SqlSelectColumn>) -> Self {
        self.group_bys = group_bys;
        self
    }

    pub fn with_order_bys(mut self, order_bys: Vec<SqlOrderByDescription>) -> Self {
        self.order_bys = order_bys;
        self
    }

    pub fn with_where(mut self, where_: SqlExpr) -> Self {
        self.where_ = Some(where_);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    /// Same contents under a freshly allocated identity.
    pub fn renewed(&self) -> Self {
        Self {
            id: NodeId::next(),
            ..self.clone()
        }
    }

    pub fn into_node(self) -> SqlPlanNodeRef {
        Arc::new(SqlPlanNode::SelectStatement(self))
    }

    pub fn select_column_aliases(&self) -> Vec<&str> {
        self.select_columns
            .iter()
            .map(|c| c.column_alias.as_str())
            .collect()
    }

    pub fn select_column(&self, column_alias: &str) -> Option<&SqlSelectColumn> {
        self.select_columns
            .iter()
            .find(|c| c.column_alias == column_alias)
    }

    /// `(alias, source)` for the from source then each join, in order.
    pub fn sources(&self) -> Vec<(&str, &SqlPlanNodeRef)> {
        std::iter::once((self.from_source_alias.as_str(), &self.from_source))
            .chain(
                self.join_descs
                    .iter()
                    .map(|j| (j.right_source_alias.as_str(), &j.right_source)),
            )
            .collect()
    }

    pub fn source_for_alias(&self, table_alias: &str) -> Option<&SqlPlanNodeRef> {
        self.sources()
            .into_iter()
            .find(|(alias, _)| *alias == table_alias)
            .map(|(_, source)| source)
    }

    /// Every expression held by this statement, in clause order: select,
    /// join conditions, where, group by, order by.
    pub fn all_exprs(&self) -> Vec<&SqlExpr> {
        let mut exprs: Vec<&SqlExpr> = self.select_columns.iter().map(|c| &c.expr).collect();
        exprs.extend(self.join_descs.iter().filter_map(|j| j.on_condition.as_ref()));
        exprs.extend(self.where_.iter());
        exprs.extend(self.group_bys.iter().map(|c| &c.expr));
        exprs.extend(self.order_bys.iter().map(|o| &o.expr));
        exprs
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SqlCteNode {
    #[serde(skip)]
    pub id: NodeId,
    pub cte_alias: String,
    pub select_statement: SqlPlanNodeRef,
}

impl SqlCteNode {
    pub fn new(select_statement: SqlPlanNodeRef, cte_alias: impl Into<String>) -> Self {
        Self {
            id: NodeId::next(),
            cte_alias: cte_alias.into(),
            select_statement,
        }
    }

    pub fn into_node(self) -> SqlPlanNodeRef {
        Arc::new(SqlPlanNode::Cte(self))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SqlCreateTableAsNode {
    #[serde(skip)]
    pub id: NodeId,
    pub sql_table: SqlTable,
    pub parent: SqlPlanNodeRef,
}

impl SqlCreateTableAsNode {
    pub fn new(sql_table: SqlTable, parent: SqlPlanNodeRef) -> Self {
        Self {
            id: NodeId::next(),
            sql_table,
            parent,
        }
    }

    pub fn into_node(self) -> SqlPlanNodeRef {
        Arc::new(SqlPlanNode::CreateTableAs(self))
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum SqlPlanNode {
    Table(SqlTableNode),
    SelectText(SqlSelectTextNode),
    SelectStatement(SqlSelectStatementNode),
    Cte(SqlCteNode),
    CreateTableAs(SqlCreateTableAsNode),
}

impl SqlPlanNode {
    pub fn id(&self) -> NodeId {
        match self {
            SqlPlanNode::Table(n) => n.id,
            SqlPlanNode::SelectText(n) => n.id,
            SqlPlanNode::SelectStatement(n) => n.id,
            SqlPlanNode::Cte(n) => n.id,
            SqlPlanNode::CreateTableAs(n) => n.id,
        }
    }

    pub fn node_type(&self) -> &'static str {
        match self {
            SqlPlanNode::Table(_) => "Table",
            SqlPlanNode::SelectText(_) => "SelectText",
            SqlPlanNode::SelectStatement(_) => "SelectStatement",
            SqlPlanNode::Cte(_) => "Cte",
            SqlPlanNode::CreateTableAs(_) => "CreateTableAs",
        }
    }

    pub fn as_select_node(&self) -> Option<&SqlSelectStatementNode> {
        match self {
            SqlPlanNode::SelectStatement(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_table_node(&self) -> Option<&SqlTableNode> {
        match self {
            SqlPlanNode::Table(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_cte_node(&self) -> Option<&SqlCteNode> {
        match self {
            SqlPlanNode::Cte(n) => Some(n),
            _ => None,
        }
    }

    pub fn parent_nodes(&self) -> Vec<SqlPlanNodeRef> {
        match self {
            SqlPlanNode::Table(_) | SqlPlanNode::SelectText(_) => Vec::new(),
            SqlPlanNode::SelectStatement(n) => {
                let mut parents = vec![n.from_source.clone()];
                parents.extend(n.join_descs.iter().map(|j| j.right_source.clone()));
                parents.extend(n.cte_sources.iter().map(|c| c.clone().into_node()));
                parents
            }
            SqlPlanNode::Cte(n) => vec![n.select_statement.clone()],
            SqlPlanNode::CreateTableAs(n) => vec![n.parent.clone()],
        }
    }

    /// The CTE a bare table reference names, if any, under `cte_alias_mapping`.
    pub fn referenced_cte<'a>(
        &self,
        cte_alias_mapping: &'a SqlCteAliasMapping,
    ) -> Option<&'a SqlCteNode> {
        match self {
            SqlPlanNode::Table(n) if n.sql_table.schema_name.is_none() => {
                cte_alias_mapping.get_cte_node_for_alias(&n.sql_table.table_name)
            }
            _ => None,
        }
    }

    /// The SELECT list visible at this node, or `None` when it cannot be known.
    pub fn nearest_select_columns<'a>(
        &'a self,
        cte_alias_mapping: &'a SqlCteAliasMapping,
    ) -> Option<&'a [SqlSelectColumn]> {
        match self {
            SqlPlanNode::SelectStatement(n) => Some(&n.select_columns),
            SqlPlanNode::Cte(n) => n.select_statement.nearest_select_columns(cte_alias_mapping),
            SqlPlanNode::CreateTableAs(n) => n.parent.nearest_select_columns(cte_alias_mapping),
            SqlPlanNode::Table(_) => self
                .referenced_cte(cte_alias_mapping)
                .and_then(|cte| cte.select_statement.nearest_select_columns(cte_alias_mapping)),
            SqlPlanNode::SelectText(_) => None,
        }
    }

    /// Deep copy with fresh identities. Sharing inside the tree is preserved.
    pub fn copy(&self) -> SqlPlanNodeRef {
        let mut copies = HashMap::new();
        copy_node(self, &mut copies)
    }

    /// Structural digest; node ids do not participate.
    pub fn fingerprint(&self) -> Result<Hash256> {
        hash_serde(self)
    }

    /// Check construction-level invariants over the whole DAG.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        validate_node(self, &mut seen)
    }
}

fn copy_node(node: &SqlPlanNode, copies: &mut HashMap<NodeId, SqlPlanNodeRef>) -> SqlPlanNodeRef {
    if let Some(done) = copies.get(&node.id()) {
        return done.clone();
    }
    let copied = match node {
        SqlPlanNode::Table(n) => SqlTableNode::new(n.sql_table.clone()).into_node(),
        SqlPlanNode::SelectText(n) => SqlSelectTextNode::new(n.select_query.clone()).into_node(),
        SqlPlanNode::SelectStatement(n) => SqlSelectStatementNode {
            id: NodeId::next(),
            select_columns: n.select_columns.clone(),
            from_source: copy_node(&n.from_source, copies),
            from_source_alias: n.from_source_alias.clone(),
            cte_sources: n.cte_sources.iter().map(|c| copy_cte(c, copies)).collect(),
            join_descs: n
                .join_descs
                .iter()
                .map(|j| SqlJoinDescription {
                    right_source: copy_node(&j.right_source, copies),
                    ..j.clone()
                })
                .collect(),
            group_bys: n.group_bys.clone(),
            order_bys: n.order_bys.clone(),
            where_: n.where_.clone(),
            limit: n.limit,
            distinct: n.distinct,
        }
        .into_node(),
        SqlPlanNode::Cte(n) => copy_cte(n, copies).into_node(),
        SqlPlanNode::CreateTableAs(n) => {
            SqlCreateTableAsNode::new(n.sql_table.clone(), copy_node(&n.parent, copies))
                .into_node()
        }
    };
    copies.insert(node.id(), copied.clone());
    copied
}

fn copy_cte(cte: &SqlCteNode, copies: &mut HashMap<NodeId, SqlPlanNodeRef>) -> SqlCteNode {
    if let Some(SqlPlanNode::Cte(done)) = copies.get(&cte.id).map(|n| n.as_ref()) {
        return done.clone();
    }
    let copied = SqlCteNode::new(copy_node(&cte.select_statement, copies), cte.cte_alias.clone());
    copies.insert(cte.id, copied.clone().into_node());
    copied
}

fn validate_node(node: &SqlPlanNode, seen: &mut HashSet<NodeId>) -> Result<()> {
    if !seen.insert(node.id()) {
        return Ok(());
    }
    match node {
        SqlPlanNode::Table(n) => {
            if n.sql_table.table_name.is_empty() {
                return Err(Error::Plan(format!("table node {} has an empty name", n.id)));
            }
        }
        SqlPlanNode::SelectText(_) => {}
        SqlPlanNode::SelectStatement(n) => {
            if n.select_columns.is_empty() {
                return Err(Error::Plan(format!("select node {} has no select columns", n.id)));
            }
            let mut aliases = HashSet::new();
            for column in &n.select_columns {
                if !aliases.insert(column.column_alias.as_str()) {
                    return Err(Error::Plan(format!(
                        "select node {} repeats column alias '{}'",
                        n.id, column.column_alias
                    )));
                }
            }
            let mut source_aliases = HashSet::new();
            for (alias, _) in n.sources() {
                if alias.is_empty() {
                    return Err(Error::Plan(format!("select node {} has an empty source alias", n.id)));
                }
                if !source_aliases.insert(alias) {
                    return Err(Error::Plan(format!(
                        "select node {} repeats source alias '{}'",
                        n.id, alias
                    )));
                }
            }
            let mut cte_aliases = HashSet::new();
            for cte in &n.cte_sources {
                if !cte_aliases.insert(cte.cte_alias.as_str()) {
                    return Err(Error::Plan(format!(
                        "select node {} defines CTE alias '{}' twice",
                        n.id, cte.cte_alias
                    )));
                }
            }
        }
        SqlPlanNode::Cte(n) => {
            if n.select_statement.as_select_node().is_none() {
                return Err(Error::Plan(format!(
                    "CTE '{}' must wrap a select statement, found {}",
                    n.cte_alias,
                    n.select_statement.node_type()
                )));
            }
        }
        SqlPlanNode::CreateTableAs(n) => {
            if n.parent.as_select_node().is_none() {
                return Err(Error::Plan(format!(
                    "CREATE TABLE {} must wrap a select statement, found {}",
                    n.sql_table,
                    n.parent.node_type()
                )));
            }
        }
    }
    for parent in node.parent_nodes() {
        validate_node(&parent, seen)?;
    }
    Ok(())
}

/// A query plan as handed from the dataflow-to-SQL converter to a renderer.
#[derive(Debug, Clone)]
pub struct SqlPlan {
    pub plan_id: PlanId,
    pub render_node: SqlPlanNodeRef,
}

impl SqlPlan {
    pub fn new(render_node: SqlPlanNodeRef) -> Self {
        Self {
            plan_id: PlanId::new(),
            render_node,
        }
    }

    /// Same plan id, different tree.
    pub fn with_render_node(&self, render_node: SqlPlanNodeRef) -> Self {
        Self {
            plan_id: self.plan_id,
            render_node,
        }
    }

    pub fn fingerprint(&self) -> Result<Hash256> {
        self.render_node.fingerprint()
    }
}
