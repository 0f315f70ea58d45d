//! Column pruning tests


use plan_fixtures::*;
use sqlplan_core::prelude::*;
use sqlplan_optimizer::{NodeToColumnAliasMapping, SqlColumnPrunerOptimizer};

#[test]
fn test_prunes_from_and_join_sub_queries() {
    let pruned = run(&SqlColumnPrunerOptimizer, &from_and_join_sub_queries());

    assert_eq!(
        sql(&pruned),
        "SELECT q.from_source_col0 AS from_source_col0, q.joined_source_col1 AS joined_source_col1 \
         FROM (SELECT from_source.col0 AS from_source_col0, joined_source.col1 AS joined_source_col1 \
         FROM (SELECT a.col0 AS col0, a.join_col AS join_col FROM demo.from_source_table a) from_source \
         INNER JOIN (SELECT b.col1 AS col1, b.join_col AS join_col FROM demo.joined_source_table b) joined_source \
         ON from_source.join_col = joined_source.join_col) q"
    );
}

#[test]
fn test_distinct_keeps_every_column() {
    let child = select("a", &["col0", "col1"], table("t")).with_distinct(true);
    let plan = select("s", &["col0"], child.into_node()).into_node();

    let pruned = run(&SqlColumnPrunerOptimizer, &plan);
    assert_eq!(sql(&pruned), sql(&plan));
    assert_eq!(
        sql(&pruned),
        "SELECT s.col0 AS col0 FROM (SELECT DISTINCT a.col0 AS col0, a.col1 AS col1 FROM t a) s"
    );
}

#[test]
fn test_group_by_columns_are_kept() {
    let child = SqlSelectStatementNode::new(
        vec![
            SqlSelectColumn::from_column("a", "g"),
            SqlSelectColumn::new(SqlExpr::sum(col("a", "x")), "total"),
            SqlSelectColumn::new(SqlExpr::max(col("a", "y")), "max_y"),
        ],
        table("t"),
        "a",
    )
    .with_group_bys(columns("a", &["g"]));
    let plan = select("s", &["total"], child.into_node()).into_node();

    let pruned = run(&SqlColumnPrunerOptimizer, &plan);
    assert_eq!(
        sql(&pruned),
        "SELECT s.total AS total FROM (SELECT a.g AS g, SUM(a.x) AS total FROM t a GROUP BY a.g) s"
    );
}

#[test]
fn test_unknown_string_expression_keeps_all_source_columns() {
    let inner = select("b", &["col0", "col1", "col2"], table("t"));
    let middle = SqlSelectStatementNode::new(
        vec![
            SqlSelectColumn::from_column("a", "col0"),
            SqlSelectColumn::new(SqlExpr::string("my_udf(col1)"), "derived"),
        ],
        inner.into_node(),
        "a",
    );
    let plan = select("s", &["derived"], middle.into_node()).into_node();

    let pruned = run(&SqlColumnPrunerOptimizer, &plan);
    assert_eq!(
        sql(&pruned),
        "SELECT s.derived AS derived FROM (SELECT my_udf(col1) AS derived \
         FROM (SELECT b.col0 AS col0, b.col1 AS col1, b.col2 AS col2 FROM t b) a) s"
    );
}

#[test]
fn test_known_string_columns_are_required_from_sources() {
    let inner = select("b", &["col0", "col1", "col2"], table("t"));
    let middle = SqlSelectStatementNode::new(
        vec![
            SqlSelectColumn::from_column("a", "col0"),
            SqlSelectColumn::new(
                SqlExpr::string_with_used_columns("a.col1 * 2", ["col1"]),
                "derived",
            ),
        ],
        inner.into_node(),
        "a",
    );
    let plan = select("s", &["derived"], middle.into_node()).into_node();

    let pruned = run(&SqlColumnPrunerOptimizer, &plan);
    assert_eq!(
        sql(&pruned),
        "SELECT s.derived AS derived FROM (SELECT a.col1 * 2 AS derived \
         FROM (SELECT b.col1 AS col1 FROM t b) a) s"
    );
}

#[test]
fn test_alias_reference_is_required_from_every_source() {
    let child = select("a", &["x", "y"], table("t"));
    let plan = select("s", &["x"], child.into_node())
        .with_order_bys(vec![SqlOrderByDescription::asc(SqlExpr::alias_ref("y"))])
        .into_node();

    let pruned = run(&SqlColumnPrunerOptimizer, &plan);
    assert_eq!(
        sql(&pruned),
        "SELECT s.x AS x FROM (SELECT a.x AS x, a.y AS y FROM t a) s ORDER BY y"
    );
}

#[test]
fn test_prunes_cte_columns() {
    let cte = SqlCteNode::new(select("a", &["col0", "col1"], table("t")).into_node(), "c");
    let plan = select("c1", &["col0"], table("c"))
        .with_cte_sources(vec![cte])
        .into_node();

    let pruned = run(&SqlColumnPrunerOptimizer, &plan);
    assert_eq!(
        sql(&pruned),
        "WITH c AS (SELECT a.col0 AS col0 FROM t a) SELECT c1.col0 AS col0 FROM c c1"
    );
}

#[test]
fn test_cte_read_twice_keeps_union_of_columns() {
    let cte = SqlCteNode::new(select("a", &["x", "y", "z"], table("t")).into_node(), "c");
    let plan = SqlSelectStatementNode::new(
        vec![
            SqlSelectColumn::from_column("l", "x"),
            SqlSelectColumn::from_column("r", "y"),
        ],
        table("c"),
        "l",
    )
    .with_joins(vec![SqlJoinDescription::new(
        table("c"),
        "r",
        SqlJoinType::Inner,
        Some(SqlExpr::equals(col("l", "x"), col("r", "x"))),
    )])
    .with_cte_sources(vec![cte])
    .into_node();

    let pruned = run(&SqlColumnPrunerOptimizer, &plan);
    assert_eq!(
        sql(&pruned),
        "WITH c AS (SELECT a.x AS x, a.y AS y FROM t a) \
         SELECT l.x AS x, r.y AS y FROM c l INNER JOIN c r ON l.x = r.x"
    );
}

#[test]
fn test_shadowed_cte_is_pruned_per_scope() {
    let pruned = run(&SqlColumnPrunerOptimizer, &shadowed_cte());

    assert_eq!(
        sql(&pruned),
        "WITH c AS (SELECT a.x AS x FROM t a) SELECT s.y AS y, o.x AS x \
         FROM (WITH c AS (SELECT b.y AS y FROM u b) SELECT i.y AS y FROM c i) s CROSS JOIN c o"
    );
}

#[test]
fn test_unreferenced_cte_is_dropped() {
    let used = SqlCteNode::new(select("a", &["x"], table("t")).into_node(), "used");
    let unused = SqlCteNode::new(select("b", &["y"], table("u")).into_node(), "unused");
    let plan = select("s", &["x"], table("used"))
        .with_cte_sources(vec![used, unused])
        .into_node();

    let pruned = run(&SqlColumnPrunerOptimizer, &plan);
    assert_eq!(
        sql(&pruned),
        "WITH used AS (SELECT a.x AS x FROM t a) SELECT s.x AS x FROM used s"
    );
}

#[test]
fn test_select_text_keeps_ctes_intact() {
    let cte = SqlCteNode::new(select("a", &["x", "y"], table("t")).into_node(), "c");
    let plan = select("s", &["x"], SqlSelectTextNode::new("SELECT x FROM c").into_node())
        .with_cte_sources(vec![cte])
        .into_node();

    let pruned = run(&SqlColumnPrunerOptimizer, &plan);
    assert_eq!(sql(&pruned), sql(&plan));
}

#[test]
fn test_row_count_only_source_keeps_one_column() {
    let child = select("a", &["x", "y"], table("t"));
    let plan = SqlSelectStatementNode::new(
        vec![SqlSelectColumn::new(
            SqlExpr::aggregate(SqlAggregateFunction::Count, vec![]),
            "n",
        )],
        child.into_node(),
        "s",
    )
    .into_node();

    let pruned = run(&SqlColumnPrunerOptimizer, &plan);
    assert_eq!(sql(&pruned), "SELECT COUNT(*) AS n FROM (SELECT a.x AS x FROM t a) s");
}

#[test]
fn test_order_by_alias_keeps_its_column() {
    let pruned = run(&SqlColumnPrunerOptimizer, &top_groups_by_alias());
    assert_eq!(
        sql(&pruned),
        "SELECT a.g AS g FROM (SELECT b.g AS g, SUM(b.x) AS total FROM bar b \
         GROUP BY b.g ORDER BY total DESC LIMIT 3) a"
    );
}

#[test]
fn test_order_by_alias_nobody_reads_is_still_kept() {
    let child = SqlSelectStatementNode::new(
        vec![
            SqlSelectColumn::from_column("b", "x"),
            SqlSelectColumn::new(col("b", "y"), "sort_key"),
            SqlSelectColumn::from_column("b", "z"),
        ],
        table("t"),
        "b",
    )
    .with_order_bys(vec![SqlOrderByDescription::asc(SqlExpr::alias_ref("sort_key"))])
    .with_limit(5);
    let plan = select("a", &["x"], child.into_node()).into_node();

    let pruned = run(&SqlColumnPrunerOptimizer, &plan);
    assert_eq!(
        sql(&pruned),
        "SELECT a.x AS x FROM (SELECT b.x AS x, b.y AS sort_key FROM t b ORDER BY sort_key LIMIT 5) a"
    );
}

#[test]
fn test_opaque_order_by_keeps_every_column() {
    let child = select("b", &["x", "y"], table("t"))
        .with_order_bys(vec![SqlOrderByDescription::asc(SqlExpr::string("y % 7"))])
        .with_limit(5);
    let plan = select("a", &["x"], child.into_node()).into_node();

    let pruned = run(&SqlColumnPrunerOptimizer, &plan);
    assert_eq!(
        sql(&pruned),
        "SELECT a.x AS x FROM (SELECT b.x AS x, b.y AS y FROM t b ORDER BY y % 7 LIMIT 5) a"
    );
}

#[test]
fn test_unreached_statement_is_a_defect() {
    let plan = limit_over_sub_query();
    let err = SqlColumnPrunerOptimizer::prune_with_required(&plan, &NodeToColumnAliasMapping::new())
        .unwrap_err();

    assert!(err.is_defect());
    let message = err.to_string();
    assert!(message.contains("column_pruner"));
    assert!(message.contains("was not reached"));
    assert!(message.contains(&plan.id().to_string()));
}

#[test]
fn test_statement_left_without_columns_is_a_defect() {
    let plan = limit_over_sub_query();
    let mut required = NodeToColumnAliasMapping::new();
    required.add_alias(plan.id(), "not_a_column");

    let err = SqlColumnPrunerOptimizer::prune_with_required(&plan, &required).unwrap_err();
    assert!(err.to_string().contains("every select column was pruned"));
    match &err {
        Error::Defect {
            pass,
            node_id,
            node,
            state,
            ..
        } => {
            assert_eq!(*pass, "column_pruner");
            assert_eq!(*node_id, plan.id());
            assert!(node.contains("foo"));
            assert!(state.contains("not_a_column"));
        }
        _ => panic!("Expected Defect variant"),
    }
}

#[test]
fn test_create_table_as_prunes_its_select() {
    let child = select("a", &["x", "y"], table("t"));
    let plan = SqlCreateTableAsNode::new(
        SqlTable::new("demo", "out"),
        select("s", &["x"], child.into_node()).into_node(),
    )
    .into_node();

    let pruned = run(&SqlColumnPrunerOptimizer, &plan);
    assert_eq!(
        sql(&pruned),
        "CREATE TABLE demo.out AS SELECT s.x AS x FROM (SELECT a.x AS x FROM t a) s"
    );
}

#[test]
fn test_leaf_roots_are_returned_unchanged() {
    let plan = table("demo.t");
    let pruned = run(&SqlColumnPrunerOptimizer, &plan);
    assert_eq!(sql(&pruned), "SELECT * FROM demo.t");

    let text = SqlSelectTextNode::new("SELECT 1 AS one").into_node();
    assert_eq!(sql(&run(&SqlColumnPrunerOptimizer, &text)), "SELECT 1 AS one");
}

#[test]
fn test_pruner_is_idempotent() {
    for plan in all_fixtures() {
        assert_idempotent(&SqlColumnPrunerOptimizer, &plan);
    }
}
