pub use crate::config::{OptimizerConfig, SqlQueryOptimizationLevel};
pub use crate::cte::SqlCteAliasMapping;
pub use crate::error::{Error, Result};
pub use crate::expr::{
    SqlAggregateFunction, SqlColumnReference, SqlColumnReplacements, SqlComparison, SqlExpr,
    SqlExprLineage, SqlWindowFunction, SqlWindowOrderBy, TimeGranularity,
};
pub use crate::hash::Hash256;
pub use crate::id::{NodeId, PlanId};
pub use crate::node::{
    SqlCreateTableAsNode, SqlCteNode, SqlJoinDescription, SqlJoinType, SqlOrderByDescription,
    SqlPlan, SqlPlanNode, SqlPlanNodeRef, SqlSelectColumn, SqlSelectStatementNode,
    SqlSelectTextNode, SqlTable, SqlTableNode,
};
pub use crate::render::render_sql;
pub use crate::visitor::SqlPlanNodeVisitor;
