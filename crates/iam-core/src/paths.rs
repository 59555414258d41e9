//! Standard paths used by gcp-iam

use std::path::{Path, PathBuf};

/// Name of the per-user directory holding config and cache
pub const DIR_NAME: &str = ".gcp-iam";

/// Standard gcp-iam paths
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory (~/.gcp-iam)
    pub base: PathBuf,
    /// Config file (~/.gcp-iam/config.yaml)
    pub config: PathBuf,
    /// Default SQLite cache (~/.gcp-iam/database.sqlite)
    pub database: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("~"));
        Self::under(&home)
    }

    /// Paths rooted at an arbitrary home directory
    pub fn under(home: &Path) -> Self {
        let base = home.join(DIR_NAME);
        Self {
            config: base.join("config.yaml"),
            database: base.join("database.sqlite"),
            base,
        }
    }
}
