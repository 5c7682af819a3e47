//! Error types for parsing and rewriting.

use thiserror::Error;
use tradegraph_rbac::{ResolveError, StoreError};

/// A tokenizer or parser failure, with the byte offset of the offending
/// input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at offset {offset}: {message}")]
pub struct ParseError {
    /// Byte offset into the query text.
    pub offset: usize,
    /// What went wrong.
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// Error raised by the query rewriter.
///
/// Every variant surfaces as an authorization failure: the engine never
/// prefers "request succeeds without security" over "request fails".
#[derive(Debug, Error)]
pub enum RewriteError {
    /// The query (or a stored filter fragment) could not be parsed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A filter fragment resolved from the permission store is not valid
    /// predicate text. Failing here is the fail-closed path for corrupt
    /// policy data.
    #[error("invalid filter fragment for {scope}: {source}")]
    FilterFragment {
        scope: String,
        #[source]
        source: ParseError,
    },

    /// A variable is reused across incompatible label or type bindings.
    /// The rewriter refuses to guess which binding to enforce.
    #[error("variable '{variable}' is bound to both '{first}' and '{second}'")]
    BindingAmbiguity {
        variable: String,
        first: String,
        second: String,
    },

    /// One MATCH clause binds the same label to several variables while
    /// rules exist for that label. Until disambiguation syntax exists the
    /// rewriter refuses rather than under- or over-filter.
    #[error("label '{label}' is bound to multiple variables in one MATCH clause; refusing to rewrite")]
    SelfJoinAmbiguity { label: String },

    /// An audit parameter would overwrite a caller-supplied one.
    #[error("audit parameter '{key}' collides with a caller-supplied parameter")]
    ParameterCollision { key: String },

    /// The query uses a construct that cannot carry a security filter.
    #[error("cannot secure pattern: {detail}")]
    UnsupportedPattern { detail: String },

    /// Permission resolution failed (fail closed).
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The underlying graph rejected the rewritten query.
    #[error(transparent)]
    Execute(#[from] StoreError),
}

/// Result type for rewrite operations.
pub type Result<T> = std::result::Result<T, RewriteError>;
