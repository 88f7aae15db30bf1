//! Retriever errors.

use thiserror::Error;

/// Errors a [`crate::Retriever`] may raise.
#[derive(Debug, Error)]
pub enum RetrieverError {
    /// The service has been deleted upstream. The refresher reacts by
    /// optionally invalidating the cache file and clearing the enricher's
    /// snapshot.
    #[error("service not found: {service_name}")]
    ServiceNotFound {
        /// The service name that could not be found.
        service_name: String,
    },
    /// Any other retrieval failure (network, deserialization, etc.). Logged
    /// and swallowed by the refresher loop; the next trigger retries.
    #[error("tag retrieval failed: {reason}")]
    Other {
        /// Human-readable failure context.
        reason: String,
    },
}

/// Result alias for retriever operations.
pub type RetrieverResult<T> = Result<T, RetrieverError>;
