//! Lookout - path-addressable JSON status for a build orchestration master.
//!
//! This library exposes builders, builds, steps, workers, the pending-build
//! queue and source changes as one hierarchical tree that can be queried by
//! path, or composed from several unrelated sub-paths into one document.

pub mod cli;
pub mod config;
pub mod models;
pub mod query;
#[cfg(feature = "server")]
pub mod server;
pub mod storage;
pub mod tree;

/// Library-level error type for Lookout operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A node without any rendering was asked for a value.
    #[error("No rendering defined for {0}")]
    Unimplemented(String),

    #[error("Status store failure: {0}")]
    BackingStore(String),

    /// A query parameter that cannot be honoured. Requests never fail with
    /// it: the value is ignored and the error only logged.
    #[error("Malformed query: {0}")]
    MalformedQuery(String),

    /// One constituent of a fan-out failed, failing the whole operation.
    #[error("{operation} failed: {source}")]
    Aggregate {
        operation: &'static str,
        #[source]
        source: Box<Error>,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap a constituent failure of a fan-out.
    ///
    /// Failures that are already aggregated pass through unchanged, so nested
    /// fan-outs report the innermost operation once.
    pub fn aggregate(operation: &'static str, source: Error) -> Self {
        match source {
            aggregated @ Error::Aggregate { .. } => aggregated,
            other => Error::Aggregate {
                operation,
                source: Box::new(other),
            },
        }
    }

    /// True when this error, or the failure it aggregates, is a `NotFound`.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Aggregate { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

/// Result type alias for Lookout operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_seen_through_aggregate() {
        let err = Error::aggregate(
            "selection",
            Error::aggregate("container render", Error::NotFound("x".into())),
        );
        assert!(err.is_not_found());
        assert!(!Error::BackingStore("down".into()).is_not_found());
    }

    #[test]
    fn test_nested_aggregates_collapse() {
        let err = Error::aggregate(
            "selection",
            Error::aggregate("queue prefetch", Error::BackingStore("down".into())),
        );
        match err {
            Error::Aggregate { operation, source } => {
                assert_eq!(operation, "queue prefetch");
                assert!(matches!(*source, Error::BackingStore(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_aggregate_display_names_operation() {
        let err = Error::aggregate("queue prefetch", Error::BackingStore("timeout".into()));
        assert_eq!(
            err.to_string(),
            "queue prefetch failed: Status store failure: timeout"
        );
    }
}
