use thiserror::Error;

/// Errors surfaced by the deployment orchestrator and the state reader.
///
/// Configuration problems are reported before any network traffic happens and
/// are never retried. Deployment and query failures carry the underlying RPC or
/// decoding message.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid credential, endpoint, address or call description
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Submission, confirmation or artifact failure while deploying
    #[error("deployment failed: {0}")]
    Deployment(String),

    /// Read failure against a bad address, a mismatched ABI or an unreachable node
    #[error("query failed: {0}")]
    Query(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn deployment(msg: impl Into<String>) -> Self {
        Self::Deployment(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_deployment(&self) -> bool {
        matches!(self, Self::Deployment(_))
    }

    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
