//! Google Cloud service catalog
//!
//! The listing comes from `gcloud services list` as CSV. [`ServiceLister`]
//! keeps the subprocess behind a narrow seam so it can be swapped for a
//! direct API call.

use crate::error::CatalogError;
use crate::store::Service;
use iam_core::process;
use regex::Regex;

/// Reverse-DNS style service identifier, e.g. `compute.googleapis.com`
const SERVICE_NAME_PATTERN: &str = r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)+$";

/// Which services to keep from a listing
#[derive(Debug, Clone)]
pub struct ServiceFilter {
    /// Identifier suffix every kept service must carry
    pub suffix: String,
    /// Ask for every service that could be enabled, not just enabled ones
    pub available: bool,
}

impl Default for ServiceFilter {
    fn default() -> Self {
        Self {
            suffix: "googleapis.com".to_string(),
            available: true,
        }
    }
}

/// Source of (identifier, title) pairs
pub trait ServiceLister {
    fn list_services(&self, filter: &ServiceFilter) -> Result<Vec<(String, String)>, CatalogError>;
}

/// Lists services by running the gcloud CLI
#[derive(Debug, Clone)]
pub struct GcloudServiceLister {
    pub program: String,
}

impl GcloudServiceLister {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// gcloud arguments for a listing under `filter`
fn list_args(filter: &ServiceFilter) -> Vec<&'static str> {
    let mut args = vec!["services", "list"];
    if filter.available {
        args.push("--available");
    }
    args.push("--format=csv(config.name,config.title)");
    args
}

impl ServiceLister for GcloudServiceLister {
    fn list_services(&self, filter: &ServiceFilter) -> Result<Vec<(String, String)>, CatalogError> {
        let args = list_args(filter);
        let output = process::run_capture(&self.program, &args)
            .map_err(|e| CatalogError::external_tool(&self.program, e))?;

        parse_service_csv(&output).map_err(|e| CatalogError::external_tool(&self.program, e))
    }
}

/// Parse the two-column CSV listing. The first line is a header; rows with
/// fewer than two columns are skipped.
pub fn parse_service_csv(output: &str) -> Result<Vec<(String, String)>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(output.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let (Some(name), Some(title)) = (record.get(0), record.get(1)) {
            rows.push((name.trim().to_string(), title.trim().to_string()));
        }
    }
    Ok(rows)
}

/// Fetch the service catalog, keeping only well-formed identifiers under the
/// filter's suffix. The listing has no separate description, so the title
/// doubles as one.
pub fn fetch_all_services<L: ServiceLister + ?Sized>(
    lister: &L,
    filter: &ServiceFilter,
) -> Result<Vec<Service>, CatalogError> {
    let name_re = Regex::new(SERVICE_NAME_PATTERN)
        .map_err(|e| CatalogError::external_tool("service filter", e))?;

    let services = lister
        .list_services(filter)?
        .into_iter()
        .filter(|(name, _)| name_re.is_match(name) && name.ends_with(&filter.suffix))
        .map(|(name, title)| Service::new(&name, &title, &title))
        .collect();

    Ok(services)
}
