//! Catalog -> store synchronization
//!
//! A sync pass:
//! 1. fetch every role (fatal on failure)
//! 2. upsert each role, skipping ones that fail
//! 3. build the work-list of live roles with no linked permissions
//! 4. fetch and link permissions for each work-list role, skipping failures
//! 5. independently, fetch and upsert the service catalog
//!
//! Nothing here is retried. Rows commit one at a time, so an interrupted run
//! leaves gaps that the next run's work-list picks up.

use crate::catalog::RoleCatalog;
use crate::error::{CatalogError, SyncError};
use crate::services::{fetch_all_services, ServiceFilter, ServiceLister};
use crate::store::IamStore;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RoleSyncReport {
    pub fetched: usize,
    pub stored: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionSyncReport {
    /// Roles on the work-list
    pub attempted: usize,
    pub refreshed: usize,
    pub failed: usize,
    pub permissions_linked: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceSyncReport {
    pub fetched: usize,
    pub stored: usize,
    pub failed: usize,
}

/// Orchestrates fetchers and the store for one invocation
pub struct Synchronizer<'a, R, S> {
    store: &'a IamStore,
    roles: R,
    services: S,
    service_filter: ServiceFilter,
}

impl<'a, R: RoleCatalog, S: ServiceLister> Synchronizer<'a, R, S> {
    pub fn new(store: &'a IamStore, roles: R, services: S) -> Self {
        Self {
            store,
            roles,
            services,
            service_filter: ServiceFilter::default(),
        }
    }

    pub fn with_service_filter(mut self, filter: ServiceFilter) -> Self {
        self.service_filter = filter;
        self
    }

    /// Steps 1-2: fetch the role list and upsert every role
    pub fn sync_roles(&self) -> Result<RoleSyncReport, SyncError> {
        info!("fetching predefined roles");

        let roles = self.roles.fetch_all_roles().map_err(|e| {
            if e.is_authentication() {
                SyncError::Authentication(e)
            } else {
                SyncError::FetchRoles(e)
            }
        })?;

        let mut report = RoleSyncReport {
            fetched: roles.len(),
            ..Default::default()
        };

        for role in &roles {
            match self.store.upsert_role(role) {
                Ok(()) => report.stored += 1,
                Err(e) => {
                    warn!(role = %role.name, error = %e, "failed to store role");
                    report.failed += 1;
                }
            }
        }

        info!(fetched = report.fetched, stored = report.stored, "roles synced");
        Ok(report)
    }

    /// Steps 3-4: link permissions for every role that has none
    pub fn refresh_permissions(&self) -> Result<PermissionSyncReport, SyncError> {
        let work_list = self
            .store
            .roles_needing_permission_refresh()
            .map_err(SyncError::Store)?;

        let mut report = PermissionSyncReport {
            attempted: work_list.len(),
            ..Default::default()
        };

        if work_list.is_empty() {
            info!("no roles need permission updates");
            return Ok(report);
        }

        let total = work_list.len();
        for (i, role) in work_list.iter().enumerate() {
            info!(role = %role.name, "updating permissions for role {}/{}", i + 1, total);

            match self.refresh_role(&role.name) {
                Ok((fetched, 0)) if fetched > 0 => {
                    warn!(role = %role.name, fetched, "no permissions could be stored");
                    report.failed += 1;
                }
                Ok((fetched, linked)) => {
                    if linked < fetched {
                        warn!(role = %role.name, fetched, linked, "some permissions were not stored");
                    }
                    report.refreshed += 1;
                    report.permissions_linked += linked;
                }
                Err(e) => {
                    warn!(role = %role.name, error = %e, "failed to update permissions");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Fetch one role's permissions and link them. Individual link failures
    /// are logged; returns (fetched, linked).
    fn refresh_role(&self, role: &str) -> Result<(usize, usize), CatalogError> {
        let permissions = self.roles.fetch_role_permissions(role)?;

        let mut linked = 0;
        for permission in &permissions {
            match self.store.upsert_permission(permission, role) {
                Ok(()) => linked += 1,
                Err(e) => {
                    warn!(role, permission = %permission, error = %e, "failed to store permission");
                }
            }
        }

        info!(role, count = linked, "updated permissions");
        Ok((permissions.len(), linked))
    }

    /// Step 5: refresh the service catalog
    pub fn sync_services(&self) -> Result<ServiceSyncReport, SyncError> {
        info!("fetching Google Cloud services");

        let services = fetch_all_services(&self.services, &self.service_filter)
            .map_err(SyncError::FetchServices)?;

        let mut report = ServiceSyncReport {
            fetched: services.len(),
            ..Default::default()
        };

        for service in &services {
            match self.store.upsert_service(service) {
                Ok(()) => report.stored += 1,
                Err(e) => {
                    warn!(service = %service.name, error = %e, "failed to store service");
                    report.failed += 1;
                }
            }
        }

        info!(fetched = report.fetched, stored = report.stored, "services synced");
        Ok(report)
    }
}
