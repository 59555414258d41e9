//! Role catalog abstraction and name normalization
//!
//! Upstream names roles `roles/<name>`; the local store keeps the bare
//! `<name>`. Every entry point accepts either form.

use crate::error::CatalogError;
use crate::store::Role;

/// Structural prefix of predefined role names upstream
pub const ROLE_PREFIX: &str = "roles/";

/// Upper bound the IAM API accepts for `pageSize`
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Strip the `roles/` prefix if present
pub fn normalize_role_name(name: &str) -> &str {
    name.strip_prefix(ROLE_PREFIX).unwrap_or(name)
}

/// Add the `roles/` prefix if absent
pub fn qualified_role_name(name: &str) -> String {
    if name.starts_with(ROLE_PREFIX) {
        name.to_string()
    } else {
        format!("{}{}", ROLE_PREFIX, name)
    }
}

/// Source of predefined roles and their permissions
pub trait RoleCatalog {
    /// Every predefined role, names normalized
    fn fetch_all_roles(&self) -> Result<Vec<Role>, CatalogError>;

    /// Permissions granted by one role (bare or prefixed name)
    fn fetch_role_permissions(&self, role: &str) -> Result<Vec<String>, CatalogError>;
}

/// One page of a listing plus the token for the next
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<String>,
}

/// Drive a paginated listing until the token runs out.
///
/// An empty token ends the listing, as does a token the server already
/// handed out (guards against a server that loops).
pub fn collect_pages<T, F>(mut fetch_page: F) -> Result<Vec<T>, CatalogError>
where
    F: FnMut(Option<&str>) -> Result<Page<T>, CatalogError>,
{
    let mut items = Vec::new();
    let mut seen: Vec<String> = Vec::new();
    let mut token: Option<String> = None;

    loop {
        let page = fetch_page(token.as_deref())?;
        items.extend(page.items);

        match page.next_page_token.filter(|t| !t.is_empty()) {
            Some(next) if !seen.contains(&next) => {
                seen.push(next.clone());
                token = Some(next);
            }
            Some(next) => {
                tracing::warn!(token = %next, "page token repeated, stopping pagination");
                break;
            }
            None => break,
        }
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_role_name() {
        assert_eq!(normalize_role_name("roles/storage.admin"), "storage.admin");
        assert_eq!(normalize_role_name("storage.admin"), "storage.admin");
        assert_eq!(normalize_role_name("viewer"), "viewer");
    }

    #[test]
    fn test_qualified_role_name() {
        assert_eq!(qualified_role_name("storage.admin"), "roles/storage.admin");
        assert_eq!(qualified_role_name("roles/storage.admin"), "roles/storage.admin");
    }

    #[test]
    fn test_collect_pages_follows_tokens() {
        let mut calls = Vec::new();
        let items = collect_pages(|token| {
            calls.push(token.map(str::to_string));
            Ok(match token {
                None => Page {
                    items: vec![1, 2],
                    next_page_token: Some("a".into()),
                },
                Some("a") => Page {
                    items: vec![3],
                    next_page_token: Some("b".into()),
                },
                _ => Page {
                    items: vec![4],
                    next_page_token: Some(String::new()),
                },
            })
        })
        .unwrap();

        assert_eq!(items, vec![1, 2, 3, 4]);
        assert_eq!(calls, vec![None, Some("a".into()), Some("b".into())]);
    }

    #[test]
    fn test_collect_pages_stops_on_repeated_token() {
        let mut calls = 0;
        let items = collect_pages(|_| {
            calls += 1;
            Ok(Page {
                items: vec!["x"],
                next_page_token: Some("same".into()),
            })
        })
        .unwrap();

        assert_eq!(calls, 2);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_collect_pages_propagates_error() {
        let result: Result<Vec<u8>, _> = collect_pages(|token| match token {
            None => Ok(Page {
                items: vec![1],
                next_page_token: Some("next".into()),
            }),
            Some(_) => Err(CatalogError::authentication("list roles")),
        });

        assert!(result.unwrap_err().is_authentication());
    }
}
