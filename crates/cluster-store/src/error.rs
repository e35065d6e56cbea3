//! Cluster store errors

use thiserror::Error;

/// Errors returned by a [`ResourceStore`](crate::ResourceStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object already exists (create of an existing name)
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Object not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Optimistic concurrency check failed (stale resource version)
    #[error("conflict: {0}")]
    Conflict(String),

    /// API server rejected the request for another reason
    #[error("API error {code}: {message}")]
    Api {
        /// HTTP status code
        code: u16,
        /// Message returned by the API server
        message: String,
    },

    /// Transport or client-side failure
    #[error("Kubernetes client error: {0}")]
    Kube(#[source] kube::Error),

    /// Object could not be addressed (missing name or namespace)
    #[error("invalid object: {0}")]
    InvalidObject(String),
}

impl StoreError {
    /// Whether this is the idempotency signal of a create.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Whether the object did not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether an update lost an optimistic concurrency race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<kube::Error> for StoreError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) => match (resp.code, resp.reason.as_str()) {
                (409, "AlreadyExists") => Self::AlreadyExists(resp.message.clone()),
                (409, _) => Self::Conflict(resp.message.clone()),
                (404, _) => Self::NotFound(resp.message.clone()),
                (code, _) => Self::Api {
                    code,
                    message: resp.message.clone(),
                },
            },
            other => Self::Kube(other),
        }
    }
}
