mod config;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use switchyard_core::provider::{Provider, ResourceType};
use switchyard_core::resource::{Resource, State};
use switchyard_provider_rds::RdsProvider;

use crate::config::{ConfigFile, value_to_json};

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(about = "Blue/green deployments for Amazon RDS clusters", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the configuration file
    Validate {
        /// Path to the JSON configuration file
        #[arg(default_value = "switchyard.json")]
        file: PathBuf,
    },
    /// Run the deployment workflow of every resource
    Create {
        #[arg(default_value = "switchyard.json")]
        file: PathBuf,
    },
    /// Show the current state of every resource
    Read {
        #[arg(default_value = "switchyard.json")]
        file: PathBuf,
    },
    /// Converge every resource to its configuration
    Update {
        #[arg(default_value = "switchyard.json")]
        file: PathBuf,
    },
    /// Delete the deployment records of every resource
    Delete {
        #[arg(default_value = "switchyard.json")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Create { file } => run_create(&file).await,
        Commands::Read { file } => run_read(&file).await,
        Commands::Update { file } => run_update(&file).await,
        Commands::Delete { file } => run_delete(&file).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn resource_types() -> HashMap<&'static str, Box<dyn ResourceType>> {
    switchyard_provider_rds::resources::resource_types()
        .into_iter()
        .map(|t| (t.name(), t))
        .collect()
}

fn validate_resources(resources: &[Resource]) -> Result<(), String> {
    let types = resource_types();
    let mut all_errors = Vec::new();

    for resource in resources {
        match types.get(resource.id.resource_type.as_str()) {
            Some(resource_type) => {
                if let Err(e) = resource_type.validate(resource) {
                    all_errors.push(e.to_string());
                }
            }
            None => all_errors.push(format!(
                "{}: unknown resource type '{}'",
                resource.id, resource.id.resource_type
            )),
        }
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(format!("Validation failed:\n  {}", all_errors.join("\n  ")))
    }
}

/// Load and validate the configuration
fn load(file: &Path) -> Result<(ConfigFile, Vec<Resource>), String> {
    let config = ConfigFile::load(file)?;
    let resources = config.resources()?;
    validate_resources(&resources)?;
    Ok((config, resources))
}

fn identifier(resource: &Resource) -> Result<&str, String> {
    resource
        .get_str("cluster_identifier")
        .ok_or_else(|| format!("{}: cluster_identifier is required", resource.id))
}

/// Build the provider, cancelling its waits on Ctrl-C
async fn provider(config: &ConfigFile) -> RdsProvider {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::warn!("Interrupted, cancelling in-flight operations");
                on_signal.cancel();
            }
            Err(e) => log::error!("Failed to install Ctrl-C handler: {}", e),
        }
    });

    RdsProvider::new(config.provider.clone())
        .await
        .with_cancel(cancel)
}

fn state_to_json(state: &State) -> serde_json::Value {
    let attributes: serde_json::Map<String, serde_json::Value> = state
        .attributes
        .iter()
        .map(|(k, v)| (k.clone(), value_to_json(v)))
        .collect();
    serde_json::json!({
        "id": state.id.to_string(),
        "exists": state.exists,
        "identifier": state.identifier,
        "attributes": attributes,
    })
}

fn print_state(state: &State) -> Result<(), String> {
    let json = serde_json::to_string_pretty(&state_to_json(state))
        .map_err(|e| format!("Failed to serialize state: {}", e))?;
    println!("{}", json);
    Ok(())
}

fn run_validate(file: &Path) -> Result<(), String> {
    println!("{}", "Validating...".cyan());
    let (_, resources) = load(file)?;

    println!(
        "{}",
        format!("✓ {} resources validated successfully.", resources.len())
            .green()
            .bold()
    );
    for resource in &resources {
        println!("  • {}", resource.id);
    }
    Ok(())
}

async fn run_create(file: &Path) -> Result<(), String> {
    let (config, resources) = load(file)?;
    let provider = provider(&config).await;

    for resource in &resources {
        println!("{} {}", "Creating".cyan().bold(), resource.id);
        let state = provider
            .create(resource)
            .await
            .map_err(|e| format!("Failed to create: {}", e))?;
        println!("{} {}", "✓".green(), resource.id);
        print_state(&state)?;
    }
    Ok(())
}

async fn run_read(file: &Path) -> Result<(), String> {
    let (config, resources) = load(file)?;
    let provider = provider(&config).await;

    for resource in &resources {
        let state = provider
            .read(&resource.id, Some(identifier(resource)?))
            .await
            .map_err(|e| format!("Failed to read state: {}", e))?;
        if !state.exists {
            println!("{} {} does not exist", "!".yellow(), resource.id);
        }
        print_state(&state)?;
    }
    Ok(())
}

async fn run_update(file: &Path) -> Result<(), String> {
    let (config, resources) = load(file)?;
    let provider = provider(&config).await;

    for resource in &resources {
        let identifier = identifier(resource)?;
        let current = provider
            .read(&resource.id, Some(identifier))
            .await
            .map_err(|e| format!("Failed to read state: {}", e))?;
        if !current.exists {
            return Err(format!("{}: cluster {} does not exist", resource.id, identifier));
        }

        println!("{} {}", "Updating".cyan().bold(), resource.id);
        let state = provider
            .update(&resource.id, identifier, &current, resource)
            .await
            .map_err(|e| format!("Failed to update: {}", e))?;
        println!("{} {}", "✓".green(), resource.id);
        print_state(&state)?;
    }
    Ok(())
}

async fn run_delete(file: &Path) -> Result<(), String> {
    let (config, resources) = load(file)?;
    let provider = provider(&config).await;

    for resource in &resources {
        println!("{} {}", "Deleting".red().bold(), resource.id);
        provider
            .delete(&resource.id, identifier(resource)?)
            .await
            .map_err(|e| format!("Failed to delete: {}", e))?;
        println!("{} {}", "✓".green(), resource.id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::resource::{ResourceId, Value};

    fn resource(engine: &str) -> Resource {
        Resource::new("rds.cluster_blue_green_deployment", "main")
            .with_attribute("cluster_identifier", Value::String("db-1".to_string()))
            .with_attribute("engine", Value::String(engine.to_string()))
            .with_attribute("engine_version", Value::String("8.0.mysql_aurora.3.05.2".to_string()))
            .with_attribute("create_deployment", Value::Bool(true))
            .with_attribute("switchover_enabled", Value::Bool(false))
    }

    #[test]
    fn validation_collects_every_error() {
        let unknown = Resource::new("rds.cluster", "other");
        let err = validate_resources(&[resource("aurora-postgresql"), unknown]).unwrap_err();

        assert!(err.contains("create_deployment cannot be enabled"));
        assert!(err.contains("rds.cluster.other: unknown resource type 'rds.cluster'"));
    }

    #[test]
    fn valid_resources_pass() {
        assert!(validate_resources(&[resource("aurora-mysql")]).is_ok());
    }

    #[test]
    fn state_json_shape() {
        let mut attributes = HashMap::new();
        attributes.insert("deployment_status".to_string(), Value::String("AVAILABLE".to_string()));
        let state = State::existing(ResourceId::new("rds.cluster_blue_green_deployment", "main"), attributes)
            .with_identifier("db-1");

        let json = state_to_json(&state);
        assert_eq!(json["id"], "rds.cluster_blue_green_deployment.main");
        assert_eq!(json["exists"], true);
        assert_eq!(json["identifier"], "db-1");
        assert_eq!(json["attributes"]["deployment_status"], "AVAILABLE");
    }

    #[test]
    fn identifier_comes_from_cluster_identifier() {
        assert_eq!(identifier(&resource("aurora-mysql")), Ok("db-1"));
        let err = identifier(&Resource::new("rds.cluster_blue_green_deployment", "x")).unwrap_err();
        assert!(err.contains("cluster_identifier is required"));
    }
}
