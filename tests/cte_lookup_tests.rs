//! CTE alias mapping and lookup tests


use plan_fixtures::*;
use sqlplan_core::prelude::*;
use sqlplan_optimizer::SqlCteAliasMappingLookup;

#[test]
fn test_merge_inner_scope_wins() {
    let outer = SqlCteNode::new(select("a", &["x"], table("t")).into_node(), "c");
    let inner = SqlCteNode::new(select("b", &["x"], table("u")).into_node(), "c");
    let other = SqlCteNode::new(select("d", &["y"], table("v")).into_node(), "d");

    let outer_mapping = SqlCteAliasMapping::from_cte_nodes([&outer, &other]);
    let merged = outer_mapping.merge(&SqlCteAliasMapping::from_cte_nodes([&inner]));

    assert_eq!(merged.len(), 2);
    assert_eq!(merged.get_cte_node_for_alias("c").unwrap().id, inner.id);
    assert_eq!(merged.get_cte_node_for_alias("d").unwrap().id, other.id);
    assert!(!merged.contains("missing"));
}

#[test]
fn test_lookup_resolves_shadowed_alias_per_statement() {
    let outer_cte = SqlCteNode::new(select("a", &["x"], table("t")).into_node(), "c");
    let inner_cte = SqlCteNode::new(select("b", &["x"], table("u")).into_node(), "c");
    let extra_cte = SqlCteNode::new(select("e", &["z"], table("w")).into_node(), "extra");

    let inner = select("i", &["x"], table("c")).with_cte_sources(vec![inner_cte.clone()]);
    let outer = select("s", &["x"], inner.clone().into_node())
        .with_cte_sources(vec![outer_cte.clone(), extra_cte.clone()]);
    let root = outer.clone().into_node();

    let lookup = SqlCteAliasMappingLookup::build(&root);

    let outer_mapping = lookup.get_cte_alias_mapping(&outer).unwrap();
    assert_eq!(outer_mapping.get_cte_node_for_alias("c").unwrap().id, outer_cte.id);

    let inner_mapping = lookup.get_cte_alias_mapping(&inner).unwrap();
    assert_eq!(inner_mapping.get_cte_node_for_alias("c").unwrap().id, inner_cte.id);
    // Outer definitions stay visible unless shadowed.
    assert_eq!(inner_mapping.get_cte_node_for_alias("extra").unwrap().id, extra_cte.id);
}

#[test]
fn test_lookup_records_cte_bodies() {
    let body = select("a", &["x"], table("t"));
    let cte = SqlCteNode::new(body.clone().into_node(), "c");
    let root = select("s", &["x"], table("c"))
        .with_cte_sources(vec![cte.clone()])
        .into_node();

    let lookup = SqlCteAliasMappingLookup::build(&root);
    assert_eq!(lookup.len(), 2);
    let body_mapping = lookup.get_cte_alias_mapping(&body).unwrap();
    assert!(body_mapping.contains("c"));
}

#[test]
fn test_shared_statement_is_recorded_once() {
    let shared = select("a", &["x"], table("t")).into_node();
    let root = SqlSelectStatementNode::new(
        vec![
            SqlSelectColumn::from_column("l", "x"),
            SqlSelectColumn::new(col("r", "x"), "x_right"),
        ],
        shared.clone(),
        "l",
    )
    .with_joins(vec![SqlJoinDescription::new(
        shared,
        "r",
        SqlJoinType::Inner,
        Some(SqlExpr::equals(col("l", "x"), col("r", "x"))),
    )])
    .into_node();

    let lookup = SqlCteAliasMappingLookup::build(&root);
    assert_eq!(lookup.len(), 2);
}

#[test]
fn test_missing_statement_is_a_defect() {
    let cte = SqlCteNode::new(select("b", &["x"], table("t")).into_node(), "recent");
    let root = select("s", &["x"], table("recent"))
        .with_cte_sources(vec![cte])
        .into_node();
    let stranger = select("z", &["x"], table("t"));

    let lookup = SqlCteAliasMappingLookup::build(&root);
    let err = lookup.get_cte_alias_mapping(&stranger).unwrap_err();

    assert!(err.is_defect());
    let message = err.to_string();
    assert!(message.contains("cte_lookup"));
    assert!(message.contains(&stranger.id.to_string()));
    // The recorded scopes are part of the report.
    assert!(message.contains("\"recent\""));
    assert!(message.contains(&root.id().get().to_string()));
}

#[test]
fn test_nearest_select_columns_through_cte() {
    let cte = SqlCteNode::new(select("a", &["x", "y"], table("t")).into_node(), "c");
    let mapping = SqlCteAliasMapping::from_cte_nodes([&cte]);

    let via_cte = table("c");
    let aliases: Vec<&str> = via_cte
        .nearest_select_columns(&mapping)
        .unwrap()
        .iter()
        .map(|c| c.column_alias.as_str())
        .collect();
    assert_eq!(aliases, vec!["x", "y"]);

    // Schema-qualified names never resolve to a CTE.
    assert!(table("demo.c").nearest_select_columns(&mapping).is_none());
    assert!(table("other").nearest_select_columns(&mapping).is_none());
    assert!(SqlSelectTextNode::new("SELECT 1 AS x")
        .into_node()
        .nearest_select_columns(&mapping)
        .is_none());
}
