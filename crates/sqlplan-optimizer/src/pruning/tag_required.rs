//! Required-alias propagation.
//!
//! Requirements flow from the render node toward the leaves. For a select
//! statement, the columns that are required (plus those forced by DISTINCT
//! and GROUP BY) determine, through expression lineage, which output aliases
//! of each source are required in turn.
//!
//! Sets only grow. A statement is re-processed only when its required set
//! grew since the last time it was processed, so shared sub-trees and CTEs
//! reached from several places converge instead of being walked once per
//! path. CTE bodies are processed after the main traversal, and again
//! whenever a later reference adds to their set.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;

use sqlplan_core::cte::SqlCteAliasMapping;
use sqlplan_core::error::Result;
use sqlplan_core::expr::SqlExprLineage;
use sqlplan_core::id::NodeId;
use sqlplan_core::node::{SqlCteNode, SqlPlanNode, SqlPlanNodeRef, SqlSelectStatementNode};

use crate::cte_lookup::SqlCteAliasMappingLookup;

/// Node id → output aliases required of that node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeToColumnAliasMapping {
    node_to_aliases: HashMap<NodeId, BTreeSet<String>>,
}

impl NodeToColumnAliasMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_aliases(&self, node_id: NodeId) -> Option<&BTreeSet<String>> {
        self.node_to_aliases.get(&node_id)
    }

    pub fn contains(&self, node_id: NodeId) -> bool {
        self.node_to_aliases.contains_key(&node_id)
    }

    /// Returns true if the set for `node_id` grew.
    pub fn add_alias(&mut self, node_id: NodeId, alias: &str) -> bool {
        let aliases = self.node_to_aliases.entry(node_id).or_default();
        if aliases.contains(alias) {
            return false;
        }
        aliases.insert(alias.to_string())
    }

    /// Registers `node_id` even when `aliases` is empty.
    pub fn add_aliases<'a>(
        &mut self,
        node_id: NodeId,
        aliases: impl IntoIterator<Item = &'a str>,
    ) -> bool {
        let set = self.node_to_aliases.entry(node_id).or_default();
        let before = set.len();
        set.extend(aliases.into_iter().map(str::to_string));
        set.len() > before
    }

    pub fn len(&self) -> usize {
        self.node_to_aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_to_aliases.is_empty()
    }

    /// Deterministic JSON dump for diagnostics.
    pub fn summary_json(&self) -> String {
        #[derive(Serialize)]
        struct Summary<'a> {
            required: BTreeMap<NodeId, &'a BTreeSet<String>>,
        }
        let summary = Summary {
            required: self.node_to_aliases.iter().map(|(k, v)| (*k, v)).collect(),
        };
        serde_json::to_string(&summary)
            .unwrap_or_else(|e| format!("<unserializable mapping: {}>", e))
    }
}

pub struct RequiredColumnAliasTagger<'a> {
    cte_lookup: &'a SqlCteAliasMappingLookup,
    required: NodeToColumnAliasMapping,
    /// Size of the required set when a node was last processed.
    processed: HashMap<NodeId, usize>,
    /// CTE definitions that have been referenced, by id.
    referenced_ctes: BTreeMap<NodeId, SqlCteNode>,
}

impl<'a> RequiredColumnAliasTagger<'a> {
    /// Compute required aliases for every node reachable from `root`.
    ///
    /// Returns `None` when the root's own SELECT list is not known (a bare
    /// table or opaque select text), in which case there is nothing to prune.
    pub fn tag(
        root: &SqlPlanNode,
        cte_lookup: &'a SqlCteAliasMappingLookup,
    ) -> Result<Option<NodeToColumnAliasMapping>> {
        let empty = SqlCteAliasMapping::new();
        let Some(root_columns) = root.nearest_select_columns(&empty) else {
            return Ok(None);
        };

        let mut tagger = Self {
            cte_lookup,
            required: NodeToColumnAliasMapping::new(),
            processed: HashMap::new(),
            referenced_ctes: BTreeMap::new(),
        };
        tagger.required.add_aliases(
            root.id(),
            root_columns.iter().map(|c| c.column_alias.as_str()),
        );
        tagger.visit(root)?;

        // Drain CTE bodies until no referenced CTE has grown.
        loop {
            let pending: Vec<SqlCteNode> = tagger
                .referenced_ctes
                .values()
                .filter(|cte| tagger.has_grown(cte.id))
                .cloned()
                .collect();
            if pending.is_empty() {
                break;
            }
            for cte in &pending {
                tagger.visit_cte(cte)?;
            }
        }

        Ok(Some(tagger.required))
    }

    fn has_grown(&self, node_id: NodeId) -> bool {
        let current = self.required.get_aliases(node_id).map_or(0, BTreeSet::len);
        match self.processed.get(&node_id) {
            Some(seen) => *seen != current,
            None => current > 0,
        }
    }

    fn visit(&mut self, node: &SqlPlanNode) -> Result<()> {
        match node {
            SqlPlanNode::Table(_) | SqlPlanNode::SelectText(_) => Ok(()),
            SqlPlanNode::SelectStatement(n) => self.visit_select(n),
            SqlPlanNode::Cte(n) => self.visit_cte(n),
            SqlPlanNode::CreateTableAs(n) => {
                let aliases: Vec<String> = self.aliases_of(n.id);
                self.required
                    .add_aliases(n.parent.id(), aliases.iter().map(String::as_str));
                self.visit(&n.parent)
            }
        }
    }

    fn aliases_of(&self, node_id: NodeId) -> Vec<String> {
        self.required
            .get_aliases(node_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn visit_cte(&mut self, cte: &SqlCteNode) -> Result<()> {
        let aliases = self.aliases_of(cte.id);
        self.processed.insert(cte.id, aliases.len());
        self.required.add_aliases(
            cte.select_statement.id(),
            aliases.iter().map(String::as_str),
        );
        self.visit(&cte.select_statement)
    }

    fn visit_select(&mut self, node: &SqlSelectStatementNode) -> Result<()> {
        let mut forced: Vec<&str> = node.group_bys.iter().map(|c| c.column_alias.as_str()).collect();
        let order_by = SqlExprLineage::combine(node.order_bys.iter().map(|o| o.expr.lineage()));
        if node.distinct || order_by.has_unknown_used_columns() {
            // Dropping a column changes which rows are distinct, or what an
            // opaque ORDER BY sorts on.
            forced.extend(node.select_column_aliases());
        } else {
            // ORDER BY may name this statement's own output columns.
            let named = order_by
                .column_alias_references
                .iter()
                .chain(
                    order_by
                        .string_exprs
                        .iter()
                        .filter_map(|s| s.used_columns.as_ref())
                        .flatten(),
                )
                .filter_map(|alias| node.select_column(alias))
                .map(|c| c.column_alias.as_str());
            forced.extend(named);
        }
        self.required.add_aliases(node.id, forced);

        let required = self
            .required
            .get_aliases(node.id)
            .cloned()
            .unwrap_or_default();
        if self.processed.get(&node.id) == Some(&required.len()) {
            return Ok(());
        }
        self.processed.insert(node.id, required.len());

        let cte_mapping = self.cte_lookup.get_cte_alias_mapping(node)?.clone();

        // Select text below this statement may name any of its CTEs.
        if !node.cte_sources.is_empty() && contains_select_text(node) {
            for cte in &node.cte_sources {
                let aliases: Vec<String> = cte
                    .select_statement
                    .nearest_select_columns(&cte_mapping)
                    .map(|cols| cols.iter().map(|c| c.column_alias.clone()).collect())
                    .unwrap_or_default();
                self.required
                    .add_aliases(cte.id, aliases.iter().map(String::as_str));
                self.referenced_ctes
                    .entry(cte.id)
                    .or_insert_with(|| cte.clone());
            }
        }

        let sources: Vec<(String, SqlPlanNodeRef)> = node
            .sources()
            .into_iter()
            .map(|(alias, source)| (alias.to_string(), source.clone()))
            .collect();

        let lineage = SqlExprLineage::combine(
            node.select_columns
                .iter()
                .filter(|c| required.contains(&c.column_alias))
                .map(|c| c.expr.lineage())
                .chain(
                    node.join_descs
                        .iter()
                        .filter_map(|j| j.on_condition.as_ref())
                        .map(|e| e.lineage()),
                )
                .chain(node.where_.iter().map(|e| e.lineage()))
                .chain(node.group_bys.iter().map(|c| c.expr.lineage()))
                .chain(node.order_bys.iter().map(|o| o.expr.lineage())),
        );

        let unresolvable = lineage
            .column_references
            .iter()
            .any(|col_ref| node.source_for_alias(&col_ref.table_alias).is_none());
        if lineage.has_unknown_used_columns() || unresolvable {
            // Inputs unknown: keep everything every source exposes.
            #[cfg(feature = "tracing")]
            tracing::trace!(node = %node.id, "unknown column usage, keeping all source columns");
            for (_, source) in &sources {
                let all: Vec<String> = source
                    .nearest_select_columns(&cte_mapping)
                    .map(|cols| cols.iter().map(|c| c.column_alias.clone()).collect())
                    .unwrap_or_default();
                for alias in &all {
                    self.tag_source(source, alias, &cte_mapping);
                }
            }
        }

        // Names without a table alias could come from any source.
        let unqualified = lineage
            .string_exprs
            .iter()
            .filter_map(|s| s.used_columns.as_ref())
            .flatten()
            .chain(lineage.column_alias_references.iter());
        for alias in unqualified {
            for (_, source) in &sources {
                self.tag_source(source, alias, &cte_mapping);
            }
        }

        for col_ref in &lineage.column_references {
            if let Some((_, source)) = sources.iter().find(|(a, _)| *a == col_ref.table_alias) {
                self.tag_source(source, &col_ref.column_name, &cte_mapping);
            }
        }

        for (_, source) in &sources {
            self.require_at_least_one(source, &cte_mapping);
            self.visit(source)?;
        }
        Ok(())
    }

    /// A source read only for its row count (e.g. `COUNT(*)`) still has to
    /// render a SELECT list; keep its first column.
    fn require_at_least_one(&mut self, source: &SqlPlanNode, cte_mapping: &SqlCteAliasMapping) {
        let target = source.referenced_cte(cte_mapping).map_or(source.id(), |cte| cte.id);
        if self
            .required
            .get_aliases(target)
            .map_or(false, |aliases| !aliases.is_empty())
        {
            return;
        }
        let first = source
            .nearest_select_columns(cte_mapping)
            .and_then(|columns| columns.first())
            .map(|c| c.column_alias.clone());
        if let Some(alias) = first {
            self.tag_source(source, &alias, cte_mapping);
        }
    }

    fn tag_source(&mut self, source: &SqlPlanNode, alias: &str, cte_mapping: &SqlCteAliasMapping) {
        #[cfg(feature = "tracing")]
        tracing::trace!(node = %source.id(), alias, "column required");
        self.required.add_alias(source.id(), alias);
        if let Some(cte) = source.referenced_cte(cte_mapping) {
            self.required.add_alias(cte.id, alias);
            self.referenced_ctes
                .entry(cte.id)
                .or_insert_with(|| cte.clone());
        }
    }
}

/// True if opaque select text appears anywhere below `node`.
pub(crate) fn contains_select_text(node: &SqlSelectStatementNode) -> bool {
    fn search(node: &SqlPlanNode, seen: &mut HashSet<NodeId>) -> bool {
        if !seen.insert(node.id()) {
            return false;
        }
        match node {
            SqlPlanNode::SelectText(_) => true,
            _ => node.parent_nodes().iter().any(|parent| search(parent, seen)),
        }
    }
    let mut seen = HashSet::new();
    node.sources()
        .into_iter()
        .map(|(_, source)| source.clone())
        .chain(node.cte_sources.iter().map(|cte| cte.clone().into_node()))
        .any(|parent| search(&parent, &mut seen))
}
