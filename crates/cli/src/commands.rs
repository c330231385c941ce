//! CLI commands

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use hms_core::{
    Appointment, Consultation, Department, HealthFacility, HospitalStaff, InsuranceCompany,
    LabResult, ListQuery, LocationLevel, Patient, SortOrder, User,
};
use hms_http::{FileTokenStore, HmsClient, Navigator, ResourceClient};
use serde_json::Value as JsonValue;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config;

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store the session tokens
    Login {
        /// Health ID of the account
        #[arg(long)]
        health_id: String,

        /// Account password. Prefer `HMS_PASSWORD` or stdin: flag values
        /// show up in process listings.
        #[arg(long, env = "HMS_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Drop the stored session tokens
    Logout,

    /// Show the stored session
    Status,

    /// List the permissions granted to the signed-in account
    Permissions,

    /// List rows of a collection
    List {
        resource: ResourceKind,

        #[arg(long)]
        limit: Option<u32>,

        #[arg(long)]
        offset: Option<u32>,

        /// Free-text search term
        #[arg(long)]
        search: Option<String>,

        /// Field to sort by
        #[arg(long)]
        sort_by: Option<String>,

        #[arg(long, value_enum, requires = "sort_by")]
        order: Option<Order>,

        /// Extra filter as KEY=VALUE, repeatable
        #[arg(long = "filter", value_parser = parse_filter)]
        filters: Vec<(String, String)>,
    },

    /// Fetch one row
    Get { resource: ResourceKind, id: String },

    /// Create a row from JSON (`--data '{...}'` or `--data @file.json`)
    Create {
        resource: ResourceKind,

        #[arg(long)]
        data: String,
    },

    /// Replace a row from JSON
    Update {
        resource: ResourceKind,
        id: String,

        #[arg(long)]
        data: String,
    },

    /// Delete a row permanently
    Delete { resource: ResourceKind, id: String },

    /// Flip a row's active flag
    Toggle { resource: ResourceKind, id: String },

    /// Mark a row as deleted
    SoftDelete { resource: ResourceKind, id: String },

    /// Undo a soft delete
    Restore { resource: ResourceKind, id: String },

    /// List locations at one administrative level
    Locations {
        #[arg(value_enum)]
        level: Level,

        /// Only children of this location
        #[arg(long)]
        parent_id: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ResourceKind {
    Patients,
    Appointments,
    Departments,
    HospitalStaff,
    HealthFacilities,
    InsuranceCompanies,
    LabResults,
    Consultations,
    Users,
}

impl ResourceKind {
    fn client(self, client: &HmsClient) -> ResourceClient<JsonValue> {
        match self {
            Self::Patients => client.resource::<Patient>().untyped(),
            Self::Appointments => client.resource::<Appointment>().untyped(),
            Self::Departments => client.resource::<Department>().untyped(),
            Self::HospitalStaff => client.resource::<HospitalStaff>().untyped(),
            Self::HealthFacilities => client.resource::<HealthFacility>().untyped(),
            Self::InsuranceCompanies => client.resource::<InsuranceCompany>().untyped(),
            Self::LabResults => client.resource::<LabResult>().untyped(),
            Self::Consultations => client.resource::<Consultation>().untyped(),
            Self::Users => client.resource::<User>().untyped(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Order {
    Asc,
    Desc,
}

impl From<Order> for SortOrder {
    fn from(order: Order) -> Self {
        match order {
            Order::Asc => Self::Asc,
            Order::Desc => Self::Desc,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Level {
    Countries,
    Regions,
    Districts,
    Wards,
}

impl From<Level> for LocationLevel {
    fn from(level: Level) -> Self {
        match level {
            Level::Countries => Self::Countries,
            Level::Regions => Self::Regions,
            Level::Districts => Self::Districts,
            Level::Wards => Self::Wards,
        }
    }
}

/// Tells the operator to sign in again after a forced logout
struct TerminalNavigator;

impl Navigator for TerminalNavigator {
    fn redirect(&self, route: &str) {
        warn!(route, "session ended");
        eprintln!("Session expired. Run `hms-admin login` to sign in again.");
    }
}

impl Commands {
    pub async fn execute(self, config_path: Option<&Path>, state_dir: &Path) -> Result<()> {
        let config = config::load_client_config(config_path, state_dir)?;
        let token_file = config::token_file(&config, state_dir);
        debug!(base_url = %config.base_url, token_file = %token_file.display(), "client configured");

        let client = HmsClient::from_config(&config)
            .token_store(Arc::new(FileTokenStore::new(token_file)))
            .navigator(Arc::new(TerminalNavigator))
            .build()?;

        match self {
            Commands::Login {
                health_id,
                password,
            } => {
                let password = match password {
                    Some(password) => password,
                    None => {
                        eprint!("Password: ");
                        read_password(std::io::stdin().lock())?
                    }
                };
                client.login(&health_id, &password).await?;
                println!("Signed in as {health_id}");
                Ok(())
            }
            Commands::Logout => {
                client.logout()?;
                println!("Signed out");
                Ok(())
            }
            Commands::Status => show_status(&client),
            Commands::Permissions => {
                let permissions = client.permissions().await?;
                for permission in &permissions.permissions {
                    println!("{permission}");
                }
                Ok(())
            }
            Commands::List {
                resource,
                limit,
                offset,
                search,
                sort_by,
                order,
                filters,
            } => {
                let mut query = ListQuery::new();
                query.limit = limit;
                query.offset = offset;
                query.search = search;
                if let Some(field) = sort_by {
                    query = query.sort(field, order.map_or(SortOrder::Asc, SortOrder::from));
                }
                query.filters.extend(filters);

                let page = resource.client(&client).list(&query).await?;
                print_json(&page)?;
                if page.has_more(&query) {
                    eprintln!(
                        "Showing {} of {} rows; use --offset to see more",
                        page.data.len(),
                        page.total
                    );
                }
                Ok(())
            }
            Commands::Get { resource, id } => {
                print_json(&resource.client(&client).get(&id).await?)
            }
            Commands::Create { resource, data } => {
                let body = parse_body(&data)?;
                print_json(&resource.client(&client).create(&body).await?)
            }
            Commands::Update { resource, id, data } => {
                let body = parse_body(&data)?;
                print_json(&resource.client(&client).update(&id, &body).await?)
            }
            Commands::Delete { resource, id } => {
                resource.client(&client).delete(&id).await?;
                println!("Deleted {id}");
                Ok(())
            }
            Commands::Toggle { resource, id } => {
                resource.client(&client).toggle(&id).await?;
                println!("Toggled {id}");
                Ok(())
            }
            Commands::SoftDelete { resource, id } => {
                resource.client(&client).soft_delete(&id).await?;
                println!("Soft-deleted {id}");
                Ok(())
            }
            Commands::Restore { resource, id } => {
                resource.client(&client).restore(&id).await?;
                println!("Restored {id}");
                Ok(())
            }
            Commands::Locations { level, parent_id } => {
                let locations = client.locations(level.into(), parent_id.as_deref()).await?;
                for location in &locations {
                    println!("{}\t{}", location.id, location.name);
                }
                Ok(())
            }
        }
    }
}

fn show_status(client: &HmsClient) -> Result<()> {
    let tokens = client.session()?;
    println!("Backend: {}", client.base_url());

    if tokens.is_empty() {
        println!("Not signed in");
        return Ok(());
    }

    if client.is_authenticated()? {
        println!("Signed in");
    } else {
        println!("Session expired");
    }
    if let Some(access) = &tokens.access {
        println!("  Access token expires:  {}", access.expires_at);
    }
    if let Some(refresh) = &tokens.refresh {
        println!("  Refresh token expires: {}", refresh.expires_at);
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Inline JSON, or `@path` to read it from a file
fn parse_body(data: &str) -> Result<JsonValue> {
    let text = match data.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read request body from {path}"))?,
        None => data.to_string(),
    };
    serde_json::from_str(&text).context("request body is not valid JSON")
}

/// First line of `reader`, without the line ending
fn read_password(mut reader: impl BufRead) -> Result<String> {
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        anyhow::bail!("no password given; set HMS_PASSWORD or pipe it on stdin");
    }
    Ok(password.to_string())
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(subcommand)]
        command: Commands,
    }

    fn parse(args: &[&str]) -> Commands {
        let mut argv = vec!["hms-admin"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().command
    }

    #[test]
    fn list_collects_filters_and_sorting() {
        let command = parse(&[
            "list",
            "hospital-staff",
            "--limit",
            "25",
            "--sort-by",
            "last_name",
            "--order",
            "desc",
            "--filter",
            "department_id=d-1",
            "--filter",
            "role=nurse",
        ]);

        match command {
            Commands::List {
                resource,
                limit,
                sort_by,
                order,
                filters,
                ..
            } => {
                assert_eq!(resource, ResourceKind::HospitalStaff);
                assert_eq!(limit, Some(25));
                assert_eq!(sort_by.as_deref(), Some("last_name"));
                assert_eq!(order, Some(Order::Desc));
                assert_eq!(
                    filters,
                    vec![
                        ("department_id".to_string(), "d-1".to_string()),
                        ("role".to_string(), "nurse".to_string()),
                    ]
                );
            }
            _ => panic!("expected list"),
        }
    }

    #[test]
    fn order_without_sort_field_is_rejected() {
        let result = TestCli::try_parse_from(["hms-admin", "list", "patients", "--order", "asc"]);
        assert!(result.is_err());
    }

    #[test]
    fn login_takes_password_flag() {
        let command = parse(&["login", "--health-id", "H123", "--password", "secret"]);
        assert!(matches!(
            command,
            Commands::Login { ref health_id, ref password }
                if health_id == "H123" && password.as_deref() == Some("secret")
        ));
    }

    #[test]
    fn password_is_read_from_the_first_line() {
        let password = read_password("s3cret pass\r\nignored\n".as_bytes()).unwrap();
        assert_eq!(password, "s3cret pass");
        assert!(read_password("\n".as_bytes()).is_err());
        assert!(read_password("".as_bytes()).is_err());
    }

    #[test]
    fn resource_kinds_map_to_backend_paths() {
        let client = HmsClient::new("http://localhost:8000/api").unwrap();
        assert_eq!(ResourceKind::HospitalStaff.client(&client).path(), "hospital-staff");
        assert_eq!(ResourceKind::LabResults.client(&client).path(), "lab-results");
        assert_eq!(ResourceKind::Users.client(&client).path(), "users");
    }

    #[test]
    fn filters_need_a_key() {
        assert_eq!(
            parse_filter("status=scheduled").unwrap(),
            ("status".to_string(), "scheduled".to_string())
        );
        assert!(parse_filter("=x").is_err());
        assert!(parse_filter("status").is_err());
    }

    #[test]
    fn body_can_come_from_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patient.json");
        std::fs::write(&path, r#"{"first_name": "Ada"}"#).unwrap();

        let body = parse_body(&format!("@{}", path.display())).unwrap();
        assert_eq!(body["first_name"], "Ada");

        assert!(parse_body("{not json").is_err());
    }
}
