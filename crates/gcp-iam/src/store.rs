//! SQLite cache of IAM roles, permissions and services
//!
//! Three flat tables:
//! - `roles` keyed by name (stored without the `roles/` prefix), soft-deleted via a flag
//! - `permissions` keyed by the (permission, role) pair, one row per granting role
//! - `services` keyed by the reverse-DNS service identifier
//!
//! Every write is its own statement and commits immediately. Soft-deleted
//! roles are hidden from every read query.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// A predefined IAM role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub title: String,
    pub description: String,
    /// Launch stage: GA, BETA, ALPHA, DEPRECATED, ...
    pub stage: String,
    pub deleted: bool,
    /// Set once the row has been read back from the store
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Role {
    pub fn new(name: &str, title: &str, description: &str, stage: &str) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            stage: stage.to_string(),
            deleted: false,
            created_at: None,
            updated_at: None,
        }
    }
}

/// A permission and how many live roles grant it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSummary {
    pub name: String,
    pub role_count: i64,
}

/// A Google Cloud service (API)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub title: String,
    pub description: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Service {
    pub fn new(name: &str, title: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            created_at: None,
            updated_at: None,
        }
    }
}

const ROLE_COLUMNS: &str = "r.name, r.title, r.description, r.stage, r.deleted, r.created_at, r.updated_at";

const SERVICE_COLUMNS: &str = "name, title, description, created_at, updated_at";

fn role_from_row(row: &Row) -> rusqlite::Result<Role> {
    Ok(Role {
        name: row.get(0)?,
        title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        stage: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        deleted: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn service_from_row(row: &Row) -> rusqlite::Result<Service> {
    Ok(Service {
        name: row.get(0)?,
        title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        description: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

/// Substring pattern for `LIKE ... ESCAPE '\'`; `%` and `_` in the query match literally
fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Local IAM catalog cache
pub struct IamStore {
    conn: Connection,
}

impl IamStore {
    /// Open or create the database, creating the schema if absent
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        let store = Self { conn };
        store.init_schema().context("Failed to create tables")?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS roles (
                name TEXT PRIMARY KEY,
                title TEXT,
                description TEXT,
                stage TEXT,
                deleted BOOLEAN NOT NULL DEFAULT FALSE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS permissions (
                permission TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (permission, role),
                FOREIGN KEY (role) REFERENCES roles(name) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_permissions_role ON permissions(role);
            CREATE INDEX IF NOT EXISTS idx_permissions_permission ON permissions(permission);

            CREATE TABLE IF NOT EXISTS services (
                name TEXT PRIMARY KEY,
                title TEXT,
                description TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_services_title ON services(title);
            "#,
        )?;
        Ok(())
    }

    /// Insert a role, or overwrite its metadata if the name already exists
    pub fn upsert_role(&self, role: &Role) -> Result<()> {
        self.conn.execute(
            "INSERT INTO roles (name, title, description, stage, deleted)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(name) DO UPDATE SET
                 title = excluded.title,
                 description = excluded.description,
                 stage = excluded.stage,
                 deleted = excluded.deleted,
                 updated_at = CURRENT_TIMESTAMP",
            params![role.name, role.title, role.description, role.stage, role.deleted],
        )?;
        Ok(())
    }

    /// Link a permission to a role. No-op if the pair exists; fails if the role does not.
    pub fn upsert_permission(&self, permission: &str, role: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO permissions (permission, role) VALUES (?1, ?2)",
            params![permission, role],
        )?;
        Ok(())
    }

    /// Insert a service, or overwrite its metadata if the name already exists
    pub fn upsert_service(&self, service: &Service) -> Result<()> {
        self.conn.execute(
            "INSERT INTO services (name, title, description)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET
                 title = excluded.title,
                 description = excluded.description,
                 updated_at = CURRENT_TIMESTAMP",
            params![service.name, service.title, service.description],
        )?;
        Ok(())
    }

    pub fn get_role_by_name(&self, name: &str) -> Result<Option<Role>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {ROLE_COLUMNS} FROM roles r WHERE r.name = ?1 AND r.deleted = FALSE"
                ),
                params![name],
                role_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Look up a permission granted by at least one live role
    pub fn get_permission_by_name(&self, name: &str) -> Result<Option<PermissionSummary>> {
        let role_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM permissions p
             JOIN roles r ON r.name = p.role
             WHERE p.permission = ?1 AND r.deleted = FALSE",
            params![name],
            |row| row.get(0),
        )?;

        Ok((role_count > 0).then(|| PermissionSummary {
            name: name.to_string(),
            role_count,
        }))
    }

    pub fn get_service_by_name(&self, name: &str) -> Result<Option<Service>> {
        self.conn
            .query_row(
                &format!("SELECT {SERVICE_COLUMNS} FROM services WHERE name = ?1"),
                params![name],
                service_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// All live roles ordered by name
    pub fn list_roles(&self) -> Result<Vec<Role>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles r WHERE r.deleted = FALSE ORDER BY r.name"
        ))?;
        let roles = stmt
            .query_map([], role_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(roles)
    }

    /// Substring match on name, title or description (ASCII case-insensitive)
    pub fn search_roles(&self, query: &str) -> Result<Vec<Role>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles r
             WHERE (r.name LIKE ?1 ESCAPE '\\' OR r.title LIKE ?1 ESCAPE '\\'
                    OR r.description LIKE ?1 ESCAPE '\\')
               AND r.deleted = FALSE
             ORDER BY r.name"
        ))?;
        let roles = stmt
            .query_map(params![like_pattern(query)], role_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(roles)
    }

    /// Distinct permission names containing `query`, granted by a live role
    pub fn search_permissions(&self, query: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT DISTINCT p.permission FROM permissions p
             JOIN roles r ON r.name = p.role
             WHERE p.permission LIKE ?1 ESCAPE '\\' AND r.deleted = FALSE
             ORDER BY p.permission",
        )?;
        let names = stmt
            .query_map(params![like_pattern(query)], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    pub fn search_services(&self, query: &str) -> Result<Vec<Service>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SERVICE_COLUMNS} FROM services
             WHERE name LIKE ?1 ESCAPE '\\' OR title LIKE ?1 ESCAPE '\\'
                OR description LIKE ?1 ESCAPE '\\'
             ORDER BY name"
        ))?;
        let services = stmt
            .query_map(params![like_pattern(query)], service_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(services)
    }

    /// Permission names linked to a role, sorted
    pub fn role_permissions(&self, role: &str) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT permission FROM permissions WHERE role = ?1 ORDER BY permission",
        )?;
        let names = stmt
            .query_map(params![role], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Live roles with an explicit link to `permission`
    pub fn roles_with_permission(&self, permission: &str) -> Result<Vec<Role>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles r
             JOIN permissions p ON p.role = r.name
             WHERE p.permission = ?1 AND r.deleted = FALSE
             ORDER BY r.name"
        ))?;
        let roles = stmt
            .query_map(params![permission], role_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(roles)
    }

    /// Live roles with no linked permission rows: the refresh work-list
    pub fn roles_needing_permission_refresh(&self) -> Result<Vec<Role>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ROLE_COLUMNS} FROM roles r
             WHERE r.deleted = FALSE
               AND NOT EXISTS (SELECT 1 FROM permissions p WHERE p.role = r.name)
             ORDER BY r.name"
        ))?;
        let roles = stmt
            .query_map([], role_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(roles)
    }

    pub fn has_any_permission(&self, role: &str) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM permissions WHERE role = ?1)",
            params![role],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    pub fn count_roles(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM roles WHERE deleted = FALSE")
    }

    /// Number of distinct permission names
    pub fn count_permissions(&self) -> Result<i64> {
        self.count("SELECT COUNT(DISTINCT permission) FROM permissions")
    }

    pub fn count_services(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM services")
    }

    fn count(&self, sql: &str) -> Result<i64> {
        let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n)
    }

    /// Live role names, for shell completion
    pub fn role_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM roles WHERE deleted = FALSE ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// Distinct permission names, for shell completion
    pub fn permission_names(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT permission FROM permissions ORDER BY permission")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    /// When any role was last written
    pub fn last_updated(&self) -> Result<Option<NaiveDateTime>> {
        let latest: Option<String> =
            self.conn
                .query_row("SELECT MAX(updated_at) FROM roles", [], |row| row.get(0))?;

        latest
            .map(|ts| {
                NaiveDateTime::parse_from_str(&ts, "%Y-%m-%d %H:%M:%S")
                    .with_context(|| format!("Invalid timestamp in roles table: {}", ts))
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> Result<(TempDir, IamStore)> {
        let tmp = TempDir::new()?;
        let store = IamStore::open(&tmp.path().join("test.db"))?;
        Ok((tmp, store))
    }

    fn seed_roles(store: &IamStore, names: &[&str]) -> Result<()> {
        for name in names {
            store.upsert_role(&Role::new(name, &format!("{} title", name), "", "GA"))?;
        }
        Ok(())
    }

    fn names(roles: &[Role]) -> Vec<&str> {
        roles.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_database_creation() -> Result<()> {
        let tmp = TempDir::new()?;
        let db_path = tmp.path().join("nested").join("test.db");
        let _store = IamStore::open(&db_path)?;
        assert!(db_path.exists());

        // schema creation is idempotent
        let _again = IamStore::open(&db_path)?;
        Ok(())
    }

    #[test]
    fn test_upsert_role_overwrites() -> Result<()> {
        let (_tmp, store) = open_temp()?;

        store.upsert_role(&Role::new("storage.admin", "Old", "old text", "BETA"))?;
        store.upsert_role(&Role::new("storage.admin", "Storage Admin", "Full control", "GA"))?;

        assert_eq!(store.count_roles()?, 1);
        let role = store.get_role_by_name("storage.admin")?.unwrap();
        assert_eq!(role.title, "Storage Admin");
        assert_eq!(role.description, "Full control");
        assert_eq!(role.stage, "GA");
        assert!(role.created_at.is_some());
        Ok(())
    }

    #[test]
    fn test_upsert_permission_is_idempotent() -> Result<()> {
        let (_tmp, store) = open_temp()?;
        seed_roles(&store, &["storage.admin"])?;

        store.upsert_permission("storage.buckets.get", "storage.admin")?;
        store.upsert_permission("storage.buckets.get", "storage.admin")?;

        assert_eq!(store.role_permissions("storage.admin")?, vec!["storage.buckets.get"]);
        assert_eq!(store.count_permissions()?, 1);
        Ok(())
    }

    #[test]
    fn test_upsert_permission_requires_role() -> Result<()> {
        let (_tmp, store) = open_temp()?;
        assert!(store.upsert_permission("storage.buckets.get", "no.such.role").is_err());
        Ok(())
    }

    #[test]
    fn test_lookups_not_found() -> Result<()> {
        let (_tmp, store) = open_temp()?;
        assert!(store.get_role_by_name("viewer")?.is_none());
        assert!(store.get_permission_by_name("storage.buckets.get")?.is_none());
        assert!(store.get_service_by_name("compute.googleapis.com")?.is_none());
        assert!(store.search_roles("anything")?.is_empty());
        Ok(())
    }

    #[test]
    fn test_list_roles_sorted() -> Result<()> {
        let (_tmp, store) = open_temp()?;
        seed_roles(&store, &["storage.viewer", "compute.admin", "compute.viewer"])?;

        let roles = store.list_roles()?;
        assert_eq!(
            names(&roles),
            vec!["compute.admin", "compute.viewer", "storage.viewer"]
        );
        Ok(())
    }

    #[test]
    fn test_search_roles() -> Result<()> {
        let (_tmp, store) = open_temp()?;
        seed_roles(&store, &["compute.admin", "compute.viewer", "storage.viewer"])?;

        let roles = store.search_roles("compute")?;
        assert_eq!(names(&roles), vec!["compute.admin", "compute.viewer"]);

        // LIKE ignores ASCII case
        assert_eq!(store.search_roles("COMPUTE")?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_search_wildcards_match_literally() -> Result<()> {
        let (_tmp, store) = open_temp()?;
        seed_roles(&store, &["storage_admin", "storageXadmin", "pct%role"])?;
        store.upsert_permission("storage.objects_get", "storage_admin")?;
        store.upsert_permission("storage.objectsXget", "storageXadmin")?;
        store.upsert_service(&Service::new("a_b.googleapis.com", "Underscore", ""))?;
        store.upsert_service(&Service::new("axb.googleapis.com", "Letter", ""))?;

        assert_eq!(names(&store.search_roles("storage_admin")?), vec!["storage_admin"]);
        assert_eq!(names(&store.search_roles("%")?), vec!["pct%role"]);
        assert_eq!(
            store.search_permissions("objects_get")?,
            vec!["storage.objects_get"]
        );
        let services = store.search_services("a_b")?;
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].name, "a_b.googleapis.com");
        Ok(())
    }

    #[test]
    fn test_search_roles_matches_description() -> Result<()> {
        let (_tmp, store) = open_temp()?;
        store.upsert_role(&Role::new("viewer", "Viewer", "Read access to all resources", "GA"))?;
        store.upsert_role(&Role::new("editor", "Editor", "Edit access", "GA"))?;

        assert_eq!(names(&store.search_roles("read access")?), vec!["viewer"]);
        Ok(())
    }

    #[test]
    fn test_roles_with_permission() -> Result<()> {
        let (_tmp, store) = open_temp()?;
        seed_roles(&store, &["compute.admin", "storage.admin"])?;
        store.upsert_permission("compute.instances.get", "compute.admin")?;

        let roles = store.roles_with_permission("compute.instances.get")?;
        assert_eq!(names(&roles), vec!["compute.admin"]);
        assert!(store.roles_with_permission("storage.buckets.get")?.is_empty());

        let summary = store.get_permission_by_name("compute.instances.get")?.unwrap();
        assert_eq!(summary.role_count, 1);
        Ok(())
    }

    #[test]
    fn test_search_permissions() -> Result<()> {
        let (_tmp, store) = open_temp()?;
        seed_roles(&store, &["compute.admin", "compute.viewer", "storage.admin"])?;
        store.upsert_permission("compute.instances.get", "compute.admin")?;
        store.upsert_permission("compute.instances.get", "compute.viewer")?;
        store.upsert_permission("compute.instances.list", "compute.viewer")?;
        store.upsert_permission("storage.buckets.get", "storage.admin")?;

        assert_eq!(
            store.search_permissions("compute")?,
            vec!["compute.instances.get", "compute.instances.list"]
        );
        Ok(())
    }

    #[test]
    fn test_refresh_work_list() -> Result<()> {
        let (_tmp, store) = open_temp()?;
        seed_roles(&store, &["storage.admin", "storage.viewer"])?;

        assert_eq!(
            names(&store.roles_needing_permission_refresh()?),
            vec!["storage.admin", "storage.viewer"]
        );
        assert!(!store.has_any_permission("storage.admin")?);

        store.upsert_permission("storage.buckets.get", "storage.admin")?;

        assert!(store.has_any_permission("storage.admin")?);
        assert_eq!(
            names(&store.roles_needing_permission_refresh()?),
            vec!["storage.viewer"]
        );
        Ok(())
    }

    #[test]
    fn test_soft_deleted_role_hidden() -> Result<()> {
        let (_tmp, store) = open_temp()?;
        seed_roles(&store, &["compute.admin", "compute.legacy"])?;
        store.upsert_permission("compute.instances.get", "compute.admin")?;
        store.upsert_permission("compute.instances.get", "compute.legacy")?;

        let mut legacy = Role::new("compute.legacy", "Legacy", "", "DEPRECATED");
        legacy.deleted = true;
        store.upsert_role(&legacy)?;

        assert_eq!(names(&store.list_roles()?), vec!["compute.admin"]);
        assert_eq!(names(&store.search_roles("compute")?), vec!["compute.admin"]);
        assert_eq!(
            names(&store.roles_with_permission("compute.instances.get")?),
            vec!["compute.admin"]
        );
        assert!(store.get_role_by_name("compute.legacy")?.is_none());
        assert_eq!(store.count_roles()?, 1);

        // row still present
        let raw: i64 = store.conn.query_row(
            "SELECT COUNT(*) FROM roles WHERE name = 'compute.legacy'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(raw, 1);
        Ok(())
    }

    #[test]
    fn test_services() -> Result<()> {
        let (_tmp, store) = open_temp()?;
        store.upsert_service(&Service::new("compute.googleapis.com", "Compute Engine API", "Compute Engine API"))?;
        store.upsert_service(&Service::new("storage.googleapis.com", "Cloud Storage", "Cloud Storage"))?;
        store.upsert_service(&Service::new("compute.googleapis.com", "Compute Engine", "Compute Engine"))?;

        assert_eq!(store.count_services()?, 2);
        let svc = store.get_service_by_name("compute.googleapis.com")?.unwrap();
        assert_eq!(svc.title, "Compute Engine");

        let found = store.search_services("storage")?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "storage.googleapis.com");
        Ok(())
    }

    #[test]
    fn test_completion_names_and_last_updated() -> Result<()> {
        let (_tmp, store) = open_temp()?;
        assert!(store.last_updated()?.is_none());

        seed_roles(&store, &["viewer", "editor"])?;
        store.upsert_permission("resourcemanager.projects.get", "viewer")?;
        store.upsert_permission("resourcemanager.projects.get", "editor")?;

        assert_eq!(store.role_names()?, vec!["editor", "viewer"]);
        assert_eq!(store.permission_names()?, vec!["resourcemanager.projects.get"]);
        assert!(store.last_updated()?.is_some());
        Ok(())
    }
}
