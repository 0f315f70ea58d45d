use thiserror::Error;

use crate::id::NodeId;

/// Canonical result for core and the optimizer passes.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The input plan breaks a construction-level invariant.
    #[error("Invalid plan: {0}")]
    Plan(String),

    #[error("Hashing error: {0}")]
    Hash(String),

    /// A pass hit a state that well-formed input can never produce. Carries the
    /// offending node (structurally rendered) and the pass-local state.
    #[error("Internal invariant failed in {pass} at node {node_id}: {message}\nnode: {node}\nstate: {state}")]
    Defect {
        pass: &'static str,
        node_id: NodeId,
        message: String,
        node: String,
        state: String,
    },

    /// Error with context chain for better debugging
    #[error("Error in {context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    /// Add context to an error, creating an error chain.
    ///
    /// # Example
    /// ```rust,no_run
    /// use sqlplan_core::error::Error;
    /// let err = Error::Plan("duplicate source alias 'a'".into());
    /// let err = err.with_context("while validating the input plan");
    /// ```
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Error::Context {
            context: context.into(),
            source: Box::new(self) as Box<dyn std::error::Error + Send + Sync>,
        }
    }

    /// True for defect-class failures, including ones wrapped in context.
    pub fn is_defect(&self) -> bool {
        match self {
            Error::Defect { .. } => true,
            Error::Context { source, .. } => source
                .downcast_ref::<Error>()
                .map(Error::is_defect)
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Get suggestions for common errors.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            Error::Plan(msg) => {
                if msg.contains("alias") {
                    vec!["Check that every source in a SELECT has a distinct alias".into(),
                         "Check that select column aliases are unique within a statement".into()]
                } else {
                    vec!["Verify the plan produced by the dataflow-to-SQL converter".into()]
                }
            }
            Error::Config(msg) => {
                if msg.contains("level") {
                    vec!["Supported optimization levels: O0, O1, O2, O3, O4".into()]
                } else {
                    vec![]
                }
            }
            Error::Defect { .. } => {
                vec!["This is a bug in the optimizer, not in the query".into(),
                     "Retry with optimization level O0 to bypass the rewrite passes".into()]
            }
            _ => vec![],
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Hash(e.to_string())
    }
}
