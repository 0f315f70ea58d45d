#![forbid(unsafe_code)]
//! sqlplan-core: shared kernel for the SQL plan optimizer.
//!
//! This crate contains only *pure* types and small helpers: the plan node and
//! expression IR, identities, CTE name mappings, structural fingerprints, the
//! optimizer configuration, and a reference renderer. There are **no passes**
//! and **no logging** here.
//!
//! Crates that use this:
//! - sqlplan-optimizer: rewrites `SqlPlan`s built from these types.
//! - dialect renderers (external): implement `SqlPlanNodeVisitor`.

pub mod config;
pub mod cte;
pub mod error;
pub mod expr;
pub mod hash;
pub mod id;
pub mod node;
pub mod prelude;
pub mod render;
pub mod visitor;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
