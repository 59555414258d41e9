//! Blocking client for the Google Cloud IAM REST API
//!
//! Only the two read-only calls the cache needs: `roles.list` (paged) and
//! `roles.get`.

use crate::catalog::{collect_pages, normalize_role_name, qualified_role_name, Page, RoleCatalog, MAX_PAGE_SIZE};
use crate::credentials::TokenSource;
use crate::error::CatalogError;
use crate::store::Role;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::cell::RefCell;

pub const DEFAULT_ENDPOINT: &str = "https://iam.googleapis.com";

/// Role resource as returned by the API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRole {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub included_permissions: Vec<String>,
}

impl From<ApiRole> for Role {
    fn from(api: ApiRole) -> Self {
        Role {
            name: normalize_role_name(&api.name).to_string(),
            title: api.title,
            description: api.description,
            stage: api.stage,
            deleted: api.deleted,
            created_at: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRolesResponse {
    #[serde(default)]
    pub roles: Vec<ApiRole>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

/// Map a non-success HTTP status to an error kind
pub fn classify_status(operation: &str, status: StatusCode, body: &str) -> CatalogError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CatalogError::authentication(operation),
        _ => CatalogError::transport(
            operation,
            format!(
                "IAM API error {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            ),
        ),
    }
}

/// Bearer token held across requests
#[derive(Debug, Clone, PartialEq, Eq)]
enum CachedToken {
    Unminted,
    Ready(String),
    /// Minting failed once; later requests fail without asking again
    Unavailable,
}

/// IAM API client with an explicit token source.
///
/// A token is minted on first use and reused for every later request. A
/// 401/403 response drops it so the next request mints a fresh one.
pub struct IamClient<T: TokenSource> {
    http: Client,
    endpoint: String,
    page_size: u32,
    tokens: T,
    token: RefCell<CachedToken>,
}

impl<T: TokenSource> IamClient<T> {
    pub fn new(endpoint: &str, page_size: u32, tokens: T) -> Result<Self, CatalogError> {
        let http = Client::builder()
            .user_agent(concat!("gcp-iam/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CatalogError::transport("create HTTP client", e))?;

        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
            tokens,
            token: RefCell::new(CachedToken::Unminted),
        })
    }

    fn bearer_token(&self) -> Result<String, CatalogError> {
        let cached = self.token.borrow().clone();
        match cached {
            CachedToken::Ready(token) => Ok(token),
            CachedToken::Unavailable => Err(CatalogError::authentication(
                "resolve application-default credentials",
            )),
            CachedToken::Unminted => match self.tokens.access_token() {
                Ok(token) => {
                    *self.token.borrow_mut() = CachedToken::Ready(token.clone());
                    Ok(token)
                }
                Err(e) => {
                    *self.token.borrow_mut() = CachedToken::Unavailable;
                    Err(e)
                }
            },
        }
    }

    fn get_json<R: serde::de::DeserializeOwned>(
        &self,
        operation: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<R, CatalogError> {
        let token = self.bearer_token()?;

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .map_err(|e| CatalogError::transport(operation, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let err = classify_status(operation, status, &body);
            if err.is_authentication() {
                *self.token.borrow_mut() = CachedToken::Unminted;
            }
            return Err(err);
        }

        response
            .json()
            .map_err(|e| CatalogError::transport(operation, format!("invalid response: {}", e)))
    }

    fn list_roles_page(&self, page_token: Option<&str>) -> Result<Page<ApiRole>, CatalogError> {
        let mut query = vec![
            ("pageSize", self.page_size.to_string()),
            ("view", "FULL".to_string()),
            ("showDeleted", "false".to_string()),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let url = format!("{}/v1/roles", self.endpoint);
        let resp: ListRolesResponse = self.get_json("list roles", &url, &query)?;
        tracing::debug!(count = resp.roles.len(), "fetched roles page");

        Ok(Page {
            items: resp.roles,
            next_page_token: resp.next_page_token,
        })
    }
}

impl<T: TokenSource> RoleCatalog for IamClient<T> {
    fn fetch_all_roles(&self) -> Result<Vec<Role>, CatalogError> {
        let roles = collect_pages(|token| self.list_roles_page(token))?;
        Ok(roles.into_iter().map(Role::from).collect())
    }

    fn fetch_role_permissions(&self, role: &str) -> Result<Vec<String>, CatalogError> {
        let qualified = qualified_role_name(role);
        let operation = format!("get role {}", normalize_role_name(role));
        let url = format!("{}/v1/{}", self.endpoint, qualified);

        let api_role: ApiRole = self.get_json(&operation, &url, &[])?;
        Ok(api_role.included_permissions)
    }
}
