//! IAM Core - Shared functionality for the gcp-iam tool
//!
//! Filesystem locations and subprocess helpers used by the catalog fetcher
//! and the command-line front end.

pub mod paths;
pub mod process;

pub use paths::Paths;
pub use process::ProcessError;
