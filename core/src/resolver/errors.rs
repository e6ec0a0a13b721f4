//! Resolver error types

use thiserror::Error;

/// Hard failures raised while resolving a template
///
/// Missing paths are not errors (they resolve to undefined); only filter
/// problems are.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("malformed filter '{filter}': {reason}")]
    FilterSyntax { filter: String, reason: String },

    #[error("unknown filter '{0}'")]
    UnknownFilter(String),

    #[error("filter '{filter}' failed: {source}")]
    FilterFailed {
        filter: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ResolveError {
    /// Taxonomy name exposed to catch blocks
    pub fn kind(&self) -> &'static str {
        match self {
            ResolveError::FilterSyntax { .. } => "FilterSyntaxError",
            ResolveError::UnknownFilter(_) => "UnknownFilter",
            ResolveError::FilterFailed { .. } => "FilterFailure",
        }
    }
}
