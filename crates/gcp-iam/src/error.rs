//! Error kinds surfaced by the catalog fetcher and the synchronizer

use thiserror::Error;

/// Remediation shown whenever Google Cloud rejects our credentials
pub const AUTH_REMEDIATION: &str = "To fix authentication issues, run: gcloud auth login --update-adc";

/// Failures talking to the upstream catalog
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Credentials were missing or rejected
    #[error(
        "authentication failed accessing Google Cloud IAM API ({operation}).\nTo fix authentication issues, run: gcloud auth login --update-adc"
    )]
    Authentication { operation: String },

    /// Any other network or API failure
    #[error("{operation}: {message}")]
    Transport { operation: String, message: String },

    /// The external listing tool could not run or its output was unusable
    #[error("{tool}: {message}")]
    ExternalTool { tool: String, message: String },
}

impl CatalogError {
    pub fn authentication(operation: impl Into<String>) -> Self {
        Self::Authentication {
            operation: operation.into(),
        }
    }

    pub fn transport(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn external_tool(tool: impl Into<String>, message: impl ToString) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            message: message.to_string(),
        }
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. })
    }
}

/// Fatal failures of a sync run
#[derive(Error, Debug)]
pub enum SyncError {
    /// Passed through untouched so the remediation text reaches the user
    #[error(transparent)]
    Authentication(CatalogError),

    #[error("failed to fetch GCP IAM roles: {0}")]
    FetchRoles(#[source] CatalogError),

    #[error("failed to fetch Google Cloud services: {0}")]
    FetchServices(#[source] CatalogError),

    #[error("failed to read local store: {0:#}")]
    Store(anyhow::Error),
}

impl SyncError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}
