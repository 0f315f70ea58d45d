//! Sub-query reducer tests (rewriting and conservative variants)


use plan_fixtures::*;
use sqlplan_core::prelude::*;
use sqlplan_optimizer::{SqlRewritingSubQueryReducer, SqlSubQueryReducer};

fn rewriting() -> SqlRewritingSubQueryReducer {
    SqlRewritingSubQueryReducer::default()
}

fn conservative() -> SqlSubQueryReducer {
    SqlSubQueryReducer::default()
}

fn grouped_child() -> SqlSelectStatementNode {
    SqlSelectStatementNode::new(
        vec![
            SqlSelectColumn::from_column("b", "g"),
            SqlSelectColumn::new(SqlExpr::sum(col("b", "x")), "total"),
        ],
        table("t"),
        "b",
    )
    .with_group_bys(columns("b", &["g"]))
}

#[test]
fn test_limit_over_sub_query_collapses() {
    let reduced = run(&rewriting(), &limit_over_sub_query());
    assert_eq!(sql(&reduced), "SELECT b.foo AS foo FROM bar b LIMIT 10");
}

#[test]
fn test_both_group_by_does_not_collapse() {
    let plan = grouped_over_grouped();
    let reduced = run(&rewriting(), &plan);
    assert_eq!(sql(&reduced), sql(&plan));
    assert_eq!(
        sql(&reduced),
        "SELECT a.g AS g, MAX(a.total) AS max_total \
         FROM (SELECT b.g AS g, SUM(b.x) AS total FROM bar b GROUP BY b.g) a GROUP BY a.g"
    );
}

#[test]
fn test_where_clauses_are_conjoined() {
    let child = select("b", &["foo", "bar"], table("t")).with_where(SqlExpr::compare(
        col("b", "bar"),
        SqlComparison::Gt,
        SqlExpr::literal("1"),
    ));
    let plan = select("a", &["foo"], child.into_node())
        .with_where(SqlExpr::equals(col("a", "bar"), SqlExpr::literal("x")))
        .into_node();

    let reduced = run(&rewriting(), &plan);
    assert_eq!(
        sql(&reduced),
        "SELECT b.foo AS foo FROM t b WHERE (b.bar > '1') AND (b.bar = 'x')"
    );
}

#[test]
fn test_limits_combine_to_minimum() {
    let child = select("b", &["foo"], table("t")).with_limit(5);
    let plan = select("a", &["foo"], child.into_node()).with_limit(20).into_node();

    let reduced = run(&rewriting(), &plan);
    assert_eq!(sql(&reduced), "SELECT b.foo AS foo FROM t b LIMIT 5");
}

#[test]
fn test_projection_over_grouped_child_collapses_with_order_by_alias() {
    let plan = select("a", &["g", "total"], grouped_child().into_node())
        .with_order_bys(vec![SqlOrderByDescription::desc(col("a", "total"))])
        .with_limit(5)
        .into_node();

    let reduced = run(&rewriting(), &plan);
    assert_eq!(
        sql(&reduced),
        "SELECT b.g AS g, SUM(b.x) AS total FROM t b GROUP BY b.g ORDER BY total DESC LIMIT 5"
    );
}

#[test]
fn test_child_order_by_moves_up_as_alias() {
    let child = select("b", &["foo", "bar"], table("t"))
        .with_order_bys(vec![SqlOrderByDescription::asc(col("b", "bar"))]);
    let plan = SqlSelectStatementNode::new(
        vec![
            SqlSelectColumn::from_column("a", "foo"),
            SqlSelectColumn::new(col("a", "bar"), "sort_key"),
        ],
        child.into_node(),
        "a",
    )
    .into_node();

    let reduced = run(&rewriting(), &plan);
    assert_eq!(
        sql(&reduced),
        "SELECT b.foo AS foo, b.bar AS sort_key FROM t b ORDER BY sort_key"
    );
}

#[test]
fn test_unresolvable_order_by_blocks_collapse() {
    let child = select("b", &["foo", "bar"], table("t"))
        .with_order_bys(vec![SqlOrderByDescription::asc(col("b", "bar"))]);
    let plan = select("a", &["foo"], child.into_node()).into_node();

    let reduced = run(&rewriting(), &plan);
    assert_eq!(sql(&reduced), sql(&plan));
}

#[test]
fn test_grouped_child_with_parent_filter_does_not_collapse() {
    let plan = select("a", &["g", "total"], grouped_child().into_node())
        .with_where(SqlExpr::equals(col("a", "g"), SqlExpr::literal("x")))
        .into_node();

    let reduced = run(&rewriting(), &plan);
    assert_eq!(sql(&reduced), sql(&plan));
}

#[test]
fn test_grouped_child_requires_group_keys_in_parent() {
    let plan = select("a", &["total"], grouped_child().into_node()).into_node();
    let reduced = run(&rewriting(), &plan);
    assert_eq!(sql(&reduced), sql(&plan));
}

#[test]
fn test_distinct_child_does_not_collapse() {
    let child = select("b", &["foo"], table("t")).with_distinct(true);
    let plan = select("a", &["foo"], child.into_node()).into_node();

    let reduced = run(&rewriting(), &plan);
    assert_eq!(sql(&reduced), sql(&plan));
}

#[test]
fn test_child_limit_with_parent_filter_does_not_collapse() {
    let child = select("b", &["foo"], table("t")).with_limit(10);
    let plan = select("a", &["foo"], child.into_node())
        .with_where(SqlExpr::is_null(col("a", "foo")))
        .into_node();

    let reduced = run(&rewriting(), &plan);
    assert_eq!(sql(&reduced), sql(&plan));
}

#[test]
fn test_child_limit_with_parent_window_does_not_collapse() {
    let plan = row_number_over_limited();
    let reduced = run(&rewriting(), &plan);
    assert_eq!(
        sql(&reduced),
        "SELECT a.x AS x, ROW_NUMBER() OVER (ORDER BY a.x) AS rn \
         FROM (SELECT b.x AS x FROM t b LIMIT 10) a"
    );
}

#[test]
fn test_top_n_child_collapses_with_its_sort() {
    let reduced = run(&rewriting(), &top_n_under_projection());
    assert_eq!(sql(&reduced), "SELECT b.x AS x FROM t b ORDER BY x DESC LIMIT 5");
}

#[test]
fn test_child_sorted_on_unselected_alias_does_not_collapse() {
    let plan = top_groups_by_alias();
    assert_eq!(sql(&run(&rewriting(), &plan)), sql(&plan));
    assert_eq!(sql(&run(&conservative(), &plan)), sql(&plan));
}

#[test]
fn test_unknown_string_expression_blocks_collapse() {
    let child = select("b", &["foo"], table("t"));
    let plan = SqlSelectStatementNode::new(
        vec![SqlSelectColumn::new(SqlExpr::string("UPPER(foo)"), "foo_upper")],
        child.into_node(),
        "a",
    )
    .into_node();

    let reduced = run(&rewriting(), &plan);
    assert_eq!(sql(&reduced), sql(&plan));
}

#[test]
fn test_window_column_grouped_by_parent_does_not_collapse() {
    let child = SqlSelectStatementNode::new(
        vec![
            SqlSelectColumn::from_column("b", "x"),
            SqlSelectColumn::new(
                SqlExpr::window(
                    SqlWindowFunction::RowNumber,
                    vec![],
                    vec![col("b", "g")],
                    vec![SqlWindowOrderBy {
                        expr: col("b", "x"),
                        descending: false,
                    }],
                ),
                "rn",
            ),
        ],
        table("t"),
        "b",
    );
    let plan = SqlSelectStatementNode::new(
        vec![
            SqlSelectColumn::from_column("a", "rn"),
            SqlSelectColumn::new(SqlExpr::sum(col("a", "x")), "total"),
        ],
        child.into_node(),
        "a",
    )
    .with_group_bys(columns("a", &["rn"]))
    .into_node();

    let reduced = run(&rewriting(), &plan);
    assert_eq!(sql(&reduced), sql(&plan));
}

#[test]
fn test_nested_chain_reaches_fixed_point() {
    let innermost = select("a", &["foo"], table("t"));
    let middle = select("b", &["foo"], innermost.into_node());
    let plan = select("c", &["foo"], middle.into_node()).into_node();

    let reduced = run(&rewriting(), &plan);
    assert_eq!(sql(&reduced), "SELECT a.foo AS foo FROM t a");
}

#[test]
fn test_child_ctes_move_up() {
    let cte = SqlCteNode::new(select("a", &["x"], table("t")).into_node(), "c");
    let child = select("d", &["x"], table("c")).with_cte_sources(vec![cte]);
    let plan = select("s", &["x"], child.into_node()).into_node();

    let reduced = run(&rewriting(), &plan);
    assert_eq!(
        sql(&reduced),
        "WITH c AS (SELECT a.x AS x FROM t a) SELECT d.x AS x FROM c d"
    );
}

#[test]
fn test_join_sources_collapse_independently() {
    let left = select("a", &["x", "k"], table("t"));
    let right = select("b", &["y", "k"], table("u"));
    let plan = SqlSelectStatementNode::new(
        vec![
            SqlSelectColumn::from_column("l", "x"),
            SqlSelectColumn::from_column("r", "y"),
        ],
        left.into_node(),
        "l",
    )
    .with_joins(vec![SqlJoinDescription::new(
        right.into_node(),
        "r",
        SqlJoinType::Inner,
        Some(SqlExpr::equals(col("l", "k"), col("r", "k"))),
    )])
    .into_node();

    let reduced = run(&rewriting(), &plan);
    assert_eq!(
        sql(&reduced),
        "SELECT a.x AS x, b.y AS y FROM t a INNER JOIN u b ON a.k = b.k"
    );
}

#[test]
fn test_join_source_alias_collision_is_skipped() {
    let left = select("a", &["x"], table("t"));
    let plan = SqlSelectStatementNode::new(
        vec![
            SqlSelectColumn::from_column("l", "x"),
            SqlSelectColumn::from_column("a", "y"),
        ],
        left.into_node(),
        "l",
    )
    .with_joins(vec![SqlJoinDescription::new(
        table("u"),
        "a",
        SqlJoinType::Inner,
        Some(SqlExpr::equals(col("l", "x"), col("a", "y"))),
    )])
    .into_node();

    let reduced = run(&rewriting(), &plan);
    assert_eq!(sql(&reduced), sql(&plan));
    assert_eq!(
        sql(&reduced),
        "SELECT l.x AS x, a.y AS y FROM (SELECT a.x AS x FROM t a) l INNER JOIN u a ON l.x = a.y"
    );
}

#[test]
fn test_outer_join_literal_column_is_not_inlined() {
    let right = SqlSelectStatementNode::new(
        vec![
            SqlSelectColumn::from_column("b", "x"),
            SqlSelectColumn::new(SqlExpr::literal("yes"), "flag"),
        ],
        table("u"),
        "b",
    );
    let plan = SqlSelectStatementNode::new(
        vec![
            SqlSelectColumn::from_column("l", "x"),
            SqlSelectColumn::from_column("r", "flag"),
        ],
        table("t"),
        "l",
    )
    .with_joins(vec![SqlJoinDescription::new(
        right.into_node(),
        "r",
        SqlJoinType::LeftOuter,
        Some(SqlExpr::equals(col("l", "x"), col("r", "x"))),
    )])
    .into_node();

    let reduced = run(&rewriting(), &plan);
    assert_eq!(
        sql(&reduced),
        "SELECT l.x AS x, r.flag AS flag FROM t l \
         LEFT OUTER JOIN (SELECT b.x AS x, 'yes' AS flag FROM u b) r ON l.x = r.x"
    );
}

#[test]
fn test_rewriting_reducer_is_idempotent() {
    for plan in all_fixtures() {
        assert_idempotent(&rewriting(), &plan);
    }
}

#[test]
fn test_conservative_collapses_pure_projection() {
    let child = select("a", &["foo", "bar"], table("t"))
        .with_where(SqlExpr::equals(col("a", "bar"), SqlExpr::literal("x")));
    let plan = SqlSelectStatementNode::new(
        vec![SqlSelectColumn::new(col("s", "foo"), "renamed")],
        child.into_node(),
        "s",
    )
    .with_limit(3)
    .into_node();

    let reduced = run(&conservative(), &plan);
    assert_eq!(
        sql(&reduced),
        "SELECT a.foo AS renamed FROM t a WHERE a.bar = 'x' LIMIT 3"
    );
}

#[test]
fn test_conservative_leaves_filtering_parent_alone() {
    let plan = filter_over_sub_query();
    let reduced = run(&conservative(), &plan);
    assert_eq!(sql(&reduced), sql(&plan));
}

#[test]
fn test_conservative_distinct_child_needs_every_column() {
    let child = select("a", &["foo", "bar"], table("t")).with_distinct(true);
    let plan = select("s", &["foo"], child.into_node()).into_node();
    assert_eq!(sql(&run(&conservative(), &plan)), sql(&plan));

    let child = select("a", &["foo", "bar"], table("t")).with_distinct(true);
    let plan = select("s", &["foo", "bar"], child.into_node()).into_node();
    assert_eq!(
        sql(&run(&conservative(), &plan)),
        "SELECT DISTINCT a.foo AS foo, a.bar AS bar FROM t a"
    );
}

#[test]
fn test_conservative_order_by_becomes_alias() {
    let child = select("a", &["foo"], table("t"));
    let plan = select("s", &["foo"], child.into_node())
        .with_order_bys(vec![SqlOrderByDescription::asc(col("s", "foo"))])
        .into_node();

    assert_eq!(
        sql(&run(&conservative(), &plan)),
        "SELECT a.foo AS foo FROM t a ORDER BY foo"
    );
}

#[test]
fn test_conservative_grouped_child_with_all_keys() {
    let plan = select("s", &["g", "total"], grouped_child().into_node()).into_node();
    assert_eq!(
        sql(&run(&conservative(), &plan)),
        "SELECT b.g AS g, SUM(b.x) AS total FROM t b GROUP BY b.g"
    );
}

#[test]
fn test_conservative_reducer_is_idempotent() {
    for plan in all_fixtures() {
        assert_idempotent(&conservative(), &plan);
    }
}
