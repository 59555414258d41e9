//! gcp-iam configuration
//!
//! Configuration file: ~/.gcp-iam/config.yaml. Every key is optional.
//!
//! ```yaml
//! database_path: /home/me/.gcp-iam/database.sqlite
//! iam_endpoint: https://iam.googleapis.com
//! page_size: 1000
//! gcloud_path: gcloud
//! service_filter: googleapis.com
//! available_services: true
//! ```

use crate::catalog::MAX_PAGE_SIZE;
use crate::iam::DEFAULT_ENDPOINT;
use crate::services::ServiceFilter;
use anyhow::{Context, Result};
use iam_core::Paths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Overrides `database_path`
pub const DATABASE_ENV: &str = "GCP_IAM_DATABASE";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_iam_endpoint")]
    pub iam_endpoint: String,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default = "default_gcloud_path")]
    pub gcloud_path: String,

    /// Suffix every cached service identifier must carry
    #[serde(default = "default_service_filter")]
    pub service_filter: String,

    /// List every service that could be enabled, not only enabled ones
    #[serde(default = "default_available_services")]
    pub available_services: bool,
}

fn default_database_path() -> PathBuf {
    Paths::new().database
}

fn default_iam_endpoint() -> String {
    DEFAULT_ENDPOINT.to_string()
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_gcloud_path() -> String {
    "gcloud".to_string()
}

fn default_service_filter() -> String {
    "googleapis.com".to_string()
}

fn default_available_services() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            iam_endpoint: default_iam_endpoint(),
            page_size: default_page_size(),
            gcloud_path: default_gcloud_path(),
            service_filter: default_service_filter(),
            available_services: default_available_services(),
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        Paths::new().config
    }

    /// Load from the default location and apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::default_path())?;
        if let Ok(db) = std::env::var(DATABASE_ENV) {
            if !db.trim().is_empty() {
                config.database_path = PathBuf::from(db);
            }
        }
        Ok(config)
    }

    /// Load from a specific path; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let mut config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        config.page_size = config.page_size.clamp(1, MAX_PAGE_SIZE);
        Ok(config)
    }

    /// Write the config to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {:?}", path))?;
        Ok(())
    }

    pub fn service_filter(&self) -> ServiceFilter {
        ServiceFilter {
            suffix: self.service_filter.clone(),
            available: self.available_services,
        }
    }

    /// Create the directory holding the database
    pub fn ensure_directories(&self) -> Result<()> {
        if let Some(dir) = self.database_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }
}
