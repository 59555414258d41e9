//! Access-token sources for the IAM API
//!
//! The client never reads credentials from the environment itself; callers
//! hand it a [`TokenSource`].

use crate::error::CatalogError;
use iam_core::process;

/// Environment variable holding a pre-minted bearer token
pub const TOKEN_ENV: &str = "GCP_IAM_ACCESS_TOKEN";

/// Something that can hand out an OAuth2 bearer token
pub trait TokenSource {
    fn access_token(&self) -> Result<String, CatalogError>;
}

/// A fixed token
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

impl TokenSource for StaticToken {
    fn access_token(&self) -> Result<String, CatalogError> {
        if self.0.trim().is_empty() {
            return Err(CatalogError::authentication("empty access token"));
        }
        Ok(self.0.clone())
    }
}

/// Application-default credentials minted by the gcloud CLI
#[derive(Debug, Clone)]
pub struct GcloudToken {
    pub program: String,
}

impl GcloudToken {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl TokenSource for GcloudToken {
    fn access_token(&self) -> Result<String, CatalogError> {
        let out = process::run_capture(
            &self.program,
            &["auth", "application-default", "print-access-token"],
        )
        .map_err(|e| {
            tracing::debug!(error = %e, "gcloud could not mint an access token");
            CatalogError::authentication("resolve application-default credentials")
        })?;

        let token = out.trim();
        if token.is_empty() {
            return Err(CatalogError::authentication(
                "resolve application-default credentials",
            ));
        }
        Ok(token.to_string())
    }
}

/// Pick a token source: the environment override wins over gcloud
pub fn from_env_or_gcloud(gcloud_program: &str) -> Box<dyn TokenSource> {
    match std::env::var(TOKEN_ENV) {
        Ok(token) if !token.trim().is_empty() => Box::new(StaticToken(token)),
        _ => Box::new(GcloudToken::new(gcloud_program)),
    }
}

impl<T: TokenSource + ?Sized> TokenSource for Box<T> {
    fn access_token(&self) -> Result<String, CatalogError> {
        (**self).access_token()
    }
}
