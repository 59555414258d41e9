//! gcp-iam - Query Google Cloud IAM roles and permissions offline
//!
//! Commands:
//! - role list/show/search/compare: inspect cached roles
//! - permission show/search: find which roles grant a permission
//! - service show/search: inspect cached services
//! - update: refresh the cache from Google Cloud
//! - info: cache statistics and file locations
//! - init: write a default config file

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use gcp_iam::compare::compare_roles;
use gcp_iam::credentials;
use gcp_iam::iam::IamClient;
use gcp_iam::services::GcloudServiceLister;
use gcp_iam::{normalize_role_name, Config, IamStore, Synchronizer};

#[derive(Parser)]
#[command(name = "gcp-iam")]
#[command(about = "Query Google Cloud IAM Roles and Permissions")]
#[command(version)]
#[command(after_help = r#"EXAMPLES:
    # Refresh the local cache (needs gcloud credentials)
    gcp-iam update

    # Show a role and its permissions
    gcp-iam role show storage.admin

    # Which roles grant a permission?
    gcp-iam permission show storage.objects.get

    # Compare two roles
    gcp-iam role compare viewer editor
"#)]
struct Cli {
    /// Config file (default: ~/.gcp-iam/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log sync progress
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Query IAM roles
    #[command(subcommand)]
    Role(RoleCommand),

    /// Query IAM permissions
    #[command(subcommand)]
    Permission(PermissionCommand),

    /// Query Google Cloud services
    #[command(subcommand)]
    Service(ServiceCommand),

    /// Update IAM roles, permissions and services from Google Cloud
    Update {
        /// Only refresh roles and permissions
        #[arg(long, conflicts_with = "services_only")]
        roles_only: bool,

        /// Only refresh the service catalog
        #[arg(long)]
        services_only: bool,
    },

    /// Show cache statistics and file locations
    Info {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a default config file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// List all role names for shell completion
    #[command(hide = true)]
    CompleteRoles,

    /// List all permission names for shell completion
    #[command(hide = true)]
    CompletePermissions,
}

#[derive(Subcommand)]
enum RoleCommand {
    /// List every cached role
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show IAM role permissions
    Show {
        /// Role name, with or without the roles/ prefix
        role: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search IAM roles by name, title or description
    Search {
        query: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compare permissions of 2 IAM roles
    Compare {
        role1: String,
        role2: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum PermissionCommand {
    /// Show IAM roles with a permission
    Show {
        permission: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Search IAM permissions by name
    Search {
        query: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ServiceCommand {
    /// Show a Google Cloud service
    Show { name: String },

    /// Search services by name or title
    Search { query: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = load_config(cli.config.as_ref())?;

    let Some(command) = cli.command else {
        println!("gcp-iam - Query Google Cloud IAM Roles and Permissions");
        println!();
        println!("Use 'gcp-iam --help' for usage information");
        println!("Use 'gcp-iam update' to populate the local cache");
        return Ok(());
    };

    if let Commands::Init { force } = command {
        return cmd_init(&config_path, force);
    }

    config.ensure_directories()?;
    let store = IamStore::open(&config.database_path).context("Failed to open database")?;

    match command {
        Commands::Role(RoleCommand::List { json }) => cmd_role_list(&store, json),
        Commands::Role(RoleCommand::Show { role, json }) => cmd_role_show(&store, &role, json),
        Commands::Role(RoleCommand::Search { query, json }) => cmd_role_search(&store, &query, json),
        Commands::Role(RoleCommand::Compare { role1, role2, json }) => {
            cmd_role_compare(&store, &role1, &role2, json)
        }
        Commands::Permission(PermissionCommand::Show { permission, json }) => {
            cmd_permission_show(&store, &permission, json)
        }
        Commands::Permission(PermissionCommand::Search { query, json }) => {
            cmd_permission_search(&store, &query, json)
        }
        Commands::Service(ServiceCommand::Show { name }) => cmd_service_show(&store, &name),
        Commands::Service(ServiceCommand::Search { query }) => cmd_service_search(&store, &query),
        Commands::Update {
            roles_only,
            services_only,
        } => cmd_update(&config, &store, roles_only, services_only),
        Commands::Info { json } => cmd_info(&config, &config_path, &store, json),
        Commands::CompleteRoles => print_lines(store.role_names()?),
        Commands::CompletePermissions => print_lines(store.permission_names()?),
        Commands::Init { .. } => Ok(()),
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(p) => Config::load_from(p),
        None => Config::load(),
    }
    .context("Failed to load config")
}

fn print_lines(lines: Vec<String>) -> Result<()> {
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

fn cmd_role_list(store: &IamStore, as_json: bool) -> Result<()> {
    let roles = store.list_roles()?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&roles)?);
        return Ok(());
    }

    println!("{:<50} {:<10} {}", "ROLE", "STAGE", "TITLE");
    println!("{}", "-".repeat(90));
    for role in &roles {
        println!("{:<50} {:<10} {}", role.name, role.stage, role.title);
    }
    println!("\nTotal: {} roles", roles.len());
    Ok(())
}

fn cmd_role_show(store: &IamStore, name: &str, as_json: bool) -> Result<()> {
    let name = normalize_role_name(name);

    let Some(role) = store.get_role_by_name(name)? else {
        println!("Role '{}' not found", name);
        return Ok(());
    };
    let permissions = store.role_permissions(&role.name)?;

    if as_json {
        let output = json!({
            "role": role,
            "permissions": permissions,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Role: {}", role.name);
    println!("Title: {}", role.title);
    println!("Description: {}", role.description);
    println!("Stage: {}", role.stage);
    println!("Permissions ({}):", permissions.len());
    for perm in &permissions {
        println!("  - {}", perm);
    }

    Ok(())
}

fn cmd_role_search(store: &IamStore, query: &str, as_json: bool) -> Result<()> {
    let roles = store.search_roles(query)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&roles)?);
        return Ok(());
    }

    println!("Found {} roles matching '{}':", roles.len(), query);
    for role in &roles {
        println!("  {} - {}", role.name, role.title);
    }
    Ok(())
}

fn cmd_role_compare(store: &IamStore, first: &str, second: &str, as_json: bool) -> Result<()> {
    let first = normalize_role_name(first);
    let second = normalize_role_name(second);

    let role1 = store
        .get_role_by_name(first)?
        .ok_or_else(|| anyhow::anyhow!("role '{}' not found", first))?;
    let role2 = store
        .get_role_by_name(second)?
        .ok_or_else(|| anyhow::anyhow!("role '{}' not found", second))?;

    let perms1 = store
        .role_permissions(&role1.name)
        .with_context(|| format!("failed to get permissions for role '{}'", role1.name))?;
    let perms2 = store
        .role_permissions(&role2.name)
        .with_context(|| format!("failed to get permissions for role '{}'", role2.name))?;

    let cmp = compare_roles(&perms1, &perms2);

    if as_json {
        let output = json!({
            "role1": role1.name,
            "role2": role2.name,
            "common": cmp.common,
            "only_in_role1": cmp.only_left,
            "only_in_role2": cmp.only_right,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Comparing roles:");
    println!("  Role 1: {} ({})", role1.name, role1.title);
    println!("  Role 2: {} ({})", role2.name, role2.title);
    println!();

    println!("Common permissions ({}):", cmp.common.len());
    for perm in &cmp.common {
        println!("  ✓ {}", perm);
    }

    println!("\nPermissions only in '{}' ({}):", role1.name, cmp.only_left.len());
    for perm in &cmp.only_left {
        println!("  - {}", perm);
    }

    println!("\nPermissions only in '{}' ({}):", role2.name, cmp.only_right.len());
    for perm in &cmp.only_right {
        println!("  + {}", perm);
    }

    println!("\nSummary:");
    println!("  Total permissions in '{}': {}", role1.name, perms1.len());
    println!("  Total permissions in '{}': {}", role2.name, perms2.len());
    println!("  Common permissions: {}", cmp.common.len());
    println!("  Unique to '{}': {}", role1.name, cmp.only_left.len());
    println!("  Unique to '{}': {}", role2.name, cmp.only_right.len());

    Ok(())
}

fn cmd_permission_show(store: &IamStore, name: &str, as_json: bool) -> Result<()> {
    let Some(permission) = store.get_permission_by_name(name)? else {
        println!("Permission '{}' not found", name);
        return Ok(());
    };
    let roles = store.roles_with_permission(&permission.name)?;

    if as_json {
        let output = json!({
            "permission": permission.name,
            "roles": roles,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Permission: {}", permission.name);
    println!("Roles with this permission ({}):", roles.len());
    for role in &roles {
        println!("  {} - {}", role.name, role.title);
    }
    Ok(())
}

fn cmd_permission_search(store: &IamStore, query: &str, as_json: bool) -> Result<()> {
    let permissions = store.search_permissions(query)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&permissions)?);
        return Ok(());
    }

    println!("Found {} permissions matching '{}':", permissions.len(), query);
    for perm in &permissions {
        println!("  {}", perm);
    }
    Ok(())
}

fn cmd_service_show(store: &IamStore, name: &str) -> Result<()> {
    match store.get_service_by_name(name)? {
        Some(service) => {
            println!("Service: {}", service.name);
            println!("Title: {}", service.title);
            if service.description != service.title {
                println!("Description: {}", service.description);
            }
        }
        None => println!("Service '{}' not found", name),
    }
    Ok(())
}

fn cmd_service_search(store: &IamStore, query: &str) -> Result<()> {
    let services = store.search_services(query)?;
    println!("Found {} services matching '{}':", services.len(), query);
    for service in &services {
        println!("  {} - {}", service.name, service.title);
    }
    Ok(())
}

/// Composition root for a sync run: one client, one lister, one store
fn cmd_update(config: &Config, store: &IamStore, roles_only: bool, services_only: bool) -> Result<()> {
    let tokens = credentials::from_env_or_gcloud(&config.gcloud_path);
    let client = IamClient::new(&config.iam_endpoint, config.page_size, tokens)?;
    let lister = GcloudServiceLister::new(&config.gcloud_path);
    let sync = Synchronizer::new(store, client, lister).with_service_filter(config.service_filter());

    let mut updated = Vec::new();
    let mut failures = 0;

    if !services_only {
        println!("Updating GCP IAM pre-defined roles and permissions...");
        let roles = sync.sync_roles()?;
        println!("Fetched {} roles from GCP", roles.fetched);
        if roles.failed > 0 {
            println!("Warning: {} of {} roles could not be stored", roles.failed, roles.fetched);
        }

        println!("Identifying roles needing permission updates...");
        let perms = sync.refresh_permissions()?;
        if perms.attempted == 0 {
            println!("No roles need permission updates - all roles are up to date");
        } else {
            println!(
                "Updated permissions for {}/{} roles ({} permissions linked)",
                perms.refreshed, perms.attempted, perms.permissions_linked
            );
            if perms.failed > 0 {
                println!(
                    "Warning: {} roles failed and will be retried on the next update",
                    perms.failed
                );
            }
        }

        updated.push("IAM roles and permissions");
        failures += roles.failed + perms.failed;
    }

    if !roles_only {
        println!("Updating Google Cloud services...");
        match sync.sync_services() {
            Ok(report) => {
                println!(
                    "Fetched {} services from GCP ({} stored)",
                    report.fetched, report.stored
                );
                updated.push("Google Cloud services");
                failures += report.failed;
            }
            Err(e) if services_only => return Err(e.into()),
            Err(e) => println!("Warning: service update skipped: {}", e),
        }
    }

    println!("{}", update_summary(&updated, failures));
    Ok(())
}

/// Closing line of `update`, naming only the passes that ran
fn update_summary(updated: &[&str], failures: usize) -> String {
    if updated.is_empty() {
        return "Nothing was updated".to_string();
    }
    let what = updated.join(" and ");
    if failures == 0 {
        format!("Successfully updated {}", what)
    } else {
        format!(
            "Updated {} with {} failed items; run 'gcp-iam update' again to retry",
            what, failures
        )
    }
}

fn cmd_info(config: &Config, config_path: &std::path::Path, store: &IamStore, as_json: bool) -> Result<()> {
    let roles = store.count_roles().context("failed to count roles")?;
    let permissions = store.count_permissions().context("failed to count permissions")?;
    let services = store.count_services().context("failed to count services")?;
    let last_updated = store.last_updated()?;
    let gcloud = iam_core::process::is_available(&config.gcloud_path);

    if as_json {
        let output = json!({
            "roles": roles,
            "permissions": permissions,
            "services": services,
            "last_updated": last_updated.map(|t| t.to_string()),
            "config_file": config_path,
            "database_path": config.database_path,
            "gcloud_available": gcloud,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("GCP IAM Configuration:");
    println!("  Roles:        {}", roles);
    println!("  Permissions:  {}", permissions);
    println!("  Services:     {}", services);
    match last_updated {
        Some(ts) => println!("  LastUpdated:  {} UTC", ts.format("%Y-%m-%d %H:%M:%S")),
        None => println!("  LastUpdated:  never (run 'gcp-iam update')"),
    }
    println!("  ConfigFile:   {}", config_path.display());
    println!("  DatabasePath: {}", config.database_path.display());
    println!(
        "  gcloud:       {}",
        if gcloud { "available" } else { "not found" }
    );

    Ok(())
}

fn cmd_init(path: &std::path::Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("Config already exists at {} (use --force to overwrite)", path.display());
    }

    let config = Config::default();
    config.save_to(path)?;
    config.ensure_directories()?;

    println!("Wrote default config to {}", path.display());
    Ok(())
}
