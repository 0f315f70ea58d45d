//! Table-alias simplifier tests


use plan_fixtures::*;
use sqlplan_core::prelude::*;
use sqlplan_optimizer::SqlTableAliasSimplifier;

#[test]
fn test_single_source_drops_qualification() {
    let plan = select("a", &["col"], table("t")).into_node();
    let simplified = run(&SqlTableAliasSimplifier, &plan);
    assert_eq!(sql(&simplified), "SELECT col AS col FROM t a");
}

#[test]
fn test_joined_statement_stays_qualified_but_sources_are_simplified() {
    let left = select("a", &["x"], table("t"));
    let plan = SqlSelectStatementNode::new(
        vec![
            SqlSelectColumn::from_column("l", "x"),
            SqlSelectColumn::from_column("r", "y"),
        ],
        left.into_node(),
        "l",
    )
    .with_joins(vec![SqlJoinDescription::new(
        table("u"),
        "r",
        SqlJoinType::Inner,
        Some(SqlExpr::equals(col("l", "x"), col("r", "y"))),
    )])
    .into_node();

    let simplified = run(&SqlTableAliasSimplifier, &plan);
    assert_eq!(
        sql(&simplified),
        "SELECT l.x AS x, r.y AS y FROM (SELECT x AS x FROM t a) l INNER JOIN u r ON l.x = r.y"
    );
}

#[test]
fn test_every_clause_is_simplified() {
    let plan = SqlSelectStatementNode::new(
        vec![
            SqlSelectColumn::from_column("a", "g"),
            SqlSelectColumn::new(SqlExpr::sum(col("a", "x")), "total"),
        ],
        table("t"),
        "a",
    )
    .with_where(SqlExpr::equals(col("a", "y"), SqlExpr::literal("z")))
    .with_group_bys(columns("a", &["g"]))
    .with_order_bys(vec![SqlOrderByDescription::asc(col("a", "g"))])
    .into_node();

    let simplified = run(&SqlTableAliasSimplifier, &plan);
    assert_eq!(
        sql(&simplified),
        "SELECT g AS g, SUM(x) AS total FROM t a WHERE y = 'z' GROUP BY g ORDER BY g"
    );
}

#[test]
fn test_order_by_colliding_with_output_alias_stays_qualified() {
    let plan = SqlSelectStatementNode::new(
        vec![
            SqlSelectColumn::new(col("a", "bar"), "foo"),
            SqlSelectColumn::new(col("a", "foo"), "bar"),
        ],
        table("t"),
        "a",
    )
    .with_order_bys(vec![SqlOrderByDescription::asc(col("a", "foo"))])
    .into_node();

    let simplified = run(&SqlTableAliasSimplifier, &plan);
    assert_eq!(
        sql(&simplified),
        "SELECT bar AS foo, foo AS bar FROM t a ORDER BY a.foo"
    );
}

#[test]
fn test_create_table_as_and_ctes_pass_through() {
    let cte = SqlCteNode::new(select("b", &["x"], table("u")).into_node(), "c");
    let body = select("a", &["x"], table("c")).with_cte_sources(vec![cte]);
    let plan = SqlCreateTableAsNode::new(SqlTable::new("demo", "out"), body.into_node()).into_node();

    let simplified = run(&SqlTableAliasSimplifier, &plan);
    assert_eq!(
        sql(&simplified),
        "CREATE TABLE demo.out AS WITH c AS (SELECT x AS x FROM u b) SELECT x AS x FROM c a"
    );
}

#[test]
fn test_simplifier_is_idempotent() {
    for plan in all_fixtures() {
        assert_idempotent(&SqlTableAliasSimplifier, &plan);
    }
}
