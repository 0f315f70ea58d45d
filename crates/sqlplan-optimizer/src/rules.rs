//! Optimizer passes and the pipeline that runs them.

use sqlplan_core::config::{OptimizerConfig, SqlQueryOptimizationLevel};
use sqlplan_core::error::Result;
use sqlplan_core::node::{SqlPlan, SqlPlanNodeRef};

use crate::pruning::SqlColumnPrunerOptimizer;
use crate::reducer::{SqlRewritingSubQueryReducer, SqlSubQueryReducer};
use crate::table_alias::SqlTableAliasSimplifier;

/// A pure rewrite from one plan tree to another.
pub trait SqlPlanOptimizer {
    fn name(&self) -> &'static str;

    fn optimize(&self, node: &SqlPlanNodeRef) -> Result<SqlPlanNodeRef>;
}

/// Passes run at `cfg.level`, in order.
pub fn optimizers_for_config(cfg: &OptimizerConfig) -> Vec<Box<dyn SqlPlanOptimizer>> {
    use SqlQueryOptimizationLevel::*;

    let rounds = cfg.max_reduction_rounds;
    match cfg.level {
        O0 => vec![],
        O1 => vec![Box::new(SqlColumnPrunerOptimizer)],
        O2 => vec![
            Box::new(SqlColumnPrunerOptimizer),
            Box::new(SqlSubQueryReducer::new(rounds)),
        ],
        O3 => vec![
            Box::new(SqlColumnPrunerOptimizer),
            Box::new(SqlRewritingSubQueryReducer::new(rounds)),
        ],
        O4 => vec![
            Box::new(SqlColumnPrunerOptimizer),
            Box::new(SqlRewritingSubQueryReducer::new(rounds)),
            Box::new(SqlTableAliasSimplifier),
        ],
    }
}

/// Run the passes for `cfg.level` over `plan`. The plan id is preserved.
pub fn optimize(plan: &SqlPlan, cfg: &OptimizerConfig) -> Result<SqlPlan> {
    cfg.validate()?;
    if cfg.validate_input {
        plan.render_node
            .validate()
            .map_err(|e| e.with_context(format!("validating {}", plan.plan_id)))?;
    }

    let mut node = plan.render_node.clone();
    for pass in optimizers_for_config(cfg) {
        #[cfg(feature = "tracing")]
        let before = node.fingerprint().map(|h| h.short()).unwrap_or_default();

        node = pass
            .optimize(&node)
            .map_err(|e| e.with_context(format!("pass '{}' on {}", pass.name(), plan.plan_id)))?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            plan = %plan.plan_id,
            pass = pass.name(),
            before = %before,
            after = %node.fingerprint().map(|h| h.short()).unwrap_or_default(),
            "optimizer pass finished"
        );
    }
    Ok(plan.with_render_node(node))
}
