//! rds.cluster_blue_green_deployment - blue/green deployment of an existing
//! Aurora cluster
//!
//! The resource adopts a cluster that already exists. Create and Update both
//! converge it: settings on the cluster itself are modified first, then the
//! deployment workflow selected by the flags runs within the operation
//! timeout. Delete removes only the deployment record.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use regex::Regex;
use switchyard_core::deadline::Deadline;
use switchyard_core::provider::{ProviderError, ProviderResult, ResourceType};
use switchyard_core::resource::{Resource, ResourceId, State, Value};
use switchyard_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};
use switchyard_core::utils::parse_duration;

use crate::RdsProvider;
use crate::api::{DbCluster, ModifyClusterInput};
use crate::error::RdsError;
use crate::resources::{merge_tags, resource_tags, tags_from_value, tags_to_value};
use crate::workflow::{Workflow, WorkflowFlags, WorkflowTarget, run_workflow};

pub const RESOURCE_TYPE: &str = "rds.cluster_blue_green_deployment";

/// Engines RDS accepts for a DB cluster
const CLUSTER_ENGINES: &[&str] = &["aurora-mysql", "aurora-postgresql", "mysql", "postgres"];

const CUSTOM_ENGINE_PREFIX: &str = "custom-";

/// Engines that support blue/green deployments of a cluster
const BLUE_GREEN_ENGINES: &[&str] = &["aurora-mysql"];

const MAX_BACKUP_RETENTION_PERIOD: i64 = 35;

fn cluster_identifier() -> AttributeType {
    AttributeType::Custom {
        name: "ClusterIdentifier".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| {
            let Value::String(s) = value else {
                return Err("Expected string".to_string());
            };
            let pattern = Regex::new(r"^[a-z][0-9a-z-]*$").map_err(|e| e.to_string())?;
            if !pattern.is_match(s) {
                return Err(format!(
                    "'{}' must begin with a lowercase letter and contain only lowercase alphanumeric characters and hyphens",
                    s
                ));
            }
            if s.len() > 63 {
                return Err(format!("'{}' must be at most 63 characters", s));
            }
            if s.contains("--") {
                return Err(format!("'{}' cannot contain two consecutive hyphens", s));
            }
            if s.ends_with('-') {
                return Err(format!("'{}' cannot end with a hyphen", s));
            }
            Ok(())
        },
    }
}

fn cluster_engine() -> AttributeType {
    AttributeType::Custom {
        name: "ClusterEngine".to_string(),
        base: Box::new(AttributeType::String),
        validate: |value| match value {
            Value::String(s) if s.starts_with(CUSTOM_ENGINE_PREFIX) => Ok(()),
            Value::String(s) if CLUSTER_ENGINES.contains(&s.as_str()) => Ok(()),
            Value::String(s) => Err(format!(
                "Invalid engine '{}', expected one of: {}, or a name beginning with {}",
                s,
                CLUSTER_ENGINES.join(", "),
                CUSTOM_ENGINE_PREFIX
            )),
            _ => Err("Expected string".to_string()),
        },
    }
}

fn backup_retention_period() -> AttributeType {
    AttributeType::Custom {
        name: "BackupRetentionPeriod".to_string(),
        base: Box::new(types::non_negative_int()),
        validate: |value| match value {
            Value::Int(n) if *n <= MAX_BACKUP_RETENTION_PERIOD => Ok(()),
            Value::Int(n) => Err(format!(
                "backup_retention_period must be at most {}, got {}",
                MAX_BACKUP_RETENTION_PERIOD, n
            )),
            _ => Err("Expected integer".to_string()),
        },
    }
}

fn operation_timeouts() -> AttributeType {
    AttributeType::Custom {
        name: "Timeouts".to_string(),
        base: Box::new(AttributeType::Map(Box::new(types::duration()))),
        validate: |value| {
            let Value::Map(map) = value else {
                return Err("Expected map".to_string());
            };
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            match keys.iter().find(|k| !matches!(k.as_str(), "create" | "update")) {
                Some(key) => Err(format!(
                    "Unknown timeout '{}', expected create or update",
                    key
                )),
                None => Ok(()),
            }
        },
    }
}

/// Returns the schema for cluster blue/green deployments
pub fn cluster_blue_green_schema() -> ResourceSchema {
    ResourceSchema::new(RESOURCE_TYPE)
        .with_description("Blue/green deployment of an existing RDS DB cluster")
        .attribute(
            AttributeSchema::new("cluster_identifier", cluster_identifier())
                .required()
                .with_description("Identifier of the cluster to deploy"),
        )
        .attribute(AttributeSchema::new("engine", cluster_engine()).required())
        .attribute(
            AttributeSchema::new("engine_version", AttributeType::String)
                .with_description(
                    "Engine version the green environment runs; required with create_deployment",
                ),
        )
        .attribute(AttributeSchema::new("create_deployment", AttributeType::Bool).required())
        .attribute(AttributeSchema::new("switchover_enabled", AttributeType::Bool).required())
        .attribute(
            AttributeSchema::new("cleanup_resources", AttributeType::Bool)
                .with_default(Value::Bool(false))
                .with_description("Delete the old blue cluster after a completed switchover"),
        )
        .attribute(AttributeSchema::new(
            "deletion_protection",
            AttributeType::Bool,
        ))
        .attribute(
            AttributeSchema::new("backup_retention_period", backup_retention_period())
                .with_default(Value::Int(1)),
        )
        .attribute(AttributeSchema::new("apply_immediately", AttributeType::Bool))
        .attribute(AttributeSchema::new("tags", types::string_map()))
        .attribute(
            AttributeSchema::new("timeouts", operation_timeouts())
                .with_description("Per-resource create/update timeouts, e.g. \"90m\""),
        )
        .attribute(AttributeSchema::new("arn", AttributeType::String).computed())
        .attribute(
            AttributeSchema::new(
                "cluster_members",
                AttributeType::List(Box::new(AttributeType::String)),
            )
            .computed(),
        )
        .attribute(AttributeSchema::new("cluster_resource_id", AttributeType::String).computed())
        .attribute(AttributeSchema::new("tags_all", types::string_map()).computed())
        .attribute(
            AttributeSchema::new("deployment_identifier", AttributeType::String).computed(),
        )
        .attribute(AttributeSchema::new("deployment_status", AttributeType::String).computed())
}

/// rds.cluster_blue_green_deployment resource type
pub struct ClusterBlueGreenType;

impl ResourceType for ClusterBlueGreenType {
    fn name(&self) -> &'static str {
        RESOURCE_TYPE
    }

    fn schema(&self) -> ResourceSchema {
        cluster_blue_green_schema()
    }

    fn validate(&self, resource: &Resource) -> ProviderResult<()> {
        let mut messages: Vec<String> = match self.schema().validate(&resource.attributes) {
            Ok(()) => Vec::new(),
            Err(errors) => errors.iter().map(ToString::to_string).collect(),
        };

        if resource.get_bool("create_deployment") == Some(true)
            && let Some(engine) = resource.get_str("engine")
            && !BLUE_GREEN_ENGINES.contains(&engine)
        {
            messages.push(format!(
                "create_deployment cannot be enabled when engine is \"{}\"",
                engine
            ));
        }

        // The cluster's engine version is the only record of a finished
        // deployment once cleanup has removed it
        if resource.get_bool("create_deployment") == Some(true)
            && resource.get_str("engine_version").is_none()
        {
            messages.push("engine_version is required when create_deployment is enabled".to_string());
        }

        if messages.is_empty() {
            Ok(())
        } else {
            Err(ProviderError::new(messages.join("; ")).for_resource(resource.id.clone()))
        }
    }
}

/// Per-resource overrides of the provider timeouts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceTimeouts {
    pub create: Option<Duration>,
    pub update: Option<Duration>,
}

/// Typed view of a validated resource
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterBlueGreenConfig {
    pub cluster_identifier: String,
    pub engine: String,
    pub engine_version: Option<String>,
    pub flags: WorkflowFlags,
    pub deletion_protection: Option<bool>,
    pub backup_retention_period: i32,
    pub apply_immediately: Option<bool>,
    pub tags: BTreeMap<String, String>,
    pub timeouts: ResourceTimeouts,
}

impl ClusterBlueGreenConfig {
    pub fn from_resource(resource: &Resource) -> Result<Self, String> {
        let mut attributes = resource.attributes.clone();
        cluster_blue_green_schema().apply_defaults(&mut attributes);

        let string = |key: &str| attributes.get(key).and_then(Value::as_str).map(str::to_string);
        let boolean = |key: &str| attributes.get(key).and_then(Value::as_bool);
        let required_bool =
            |key: &str| boolean(key).ok_or_else(|| format!("{} is required", key));

        let cluster_identifier =
            string("cluster_identifier").ok_or("cluster_identifier is required")?;
        let engine = string("engine").ok_or("engine is required")?;
        let backup_retention_period = attributes
            .get("backup_retention_period")
            .and_then(Value::as_int)
            .unwrap_or(1);
        let backup_retention_period = i32::try_from(backup_retention_period)
            .map_err(|_| format!("backup_retention_period {} is out of range", backup_retention_period))?;

        Ok(Self {
            cluster_identifier,
            engine,
            engine_version: string("engine_version"),
            flags: WorkflowFlags {
                create_deployment: required_bool("create_deployment")?,
                switchover_enabled: required_bool("switchover_enabled")?,
                cleanup_resources: boolean("cleanup_resources").unwrap_or(false),
            },
            deletion_protection: boolean("deletion_protection"),
            backup_retention_period,
            apply_immediately: boolean("apply_immediately"),
            tags: tags_from_value(attributes.get("tags")),
            timeouts: parse_timeouts(attributes.get("timeouts"))?,
        })
    }

    /// Cluster settings that differ from `cluster`, if any
    pub fn modify_input(&self, cluster: &DbCluster) -> Option<ModifyClusterInput> {
        let mut input = ModifyClusterInput {
            apply_immediately: self.apply_immediately,
            ..ModifyClusterInput::new(&self.cluster_identifier)
        };
        if let Some(enabled) = self.deletion_protection
            && enabled != cluster.deletion_protection
        {
            input.deletion_protection = Some(enabled);
        }
        if cluster.backup_retention_period != Some(self.backup_retention_period) {
            input.backup_retention_period = Some(self.backup_retention_period);
        }
        input.has_changes().then_some(input)
    }
}

fn parse_timeouts(value: Option<&Value>) -> Result<ResourceTimeouts, String> {
    let Some(map) = value.and_then(Value::as_map) else {
        return Ok(ResourceTimeouts::default());
    };
    let parse = |key: &str| -> Result<Option<Duration>, String> {
        match map.get(key).and_then(Value::as_str) {
            Some(s) => parse_duration(s).map(Some),
            None => Ok(None),
        }
    };
    Ok(ResourceTimeouts {
        create: parse("create")?,
        update: parse("update")?,
    })
}

fn rds_error(id: &ResourceId) -> impl Fn(RdsError) -> ProviderError + '_ {
    move |e| {
        ProviderError::new(e.to_string())
            .for_resource(id.clone())
            .with_cause(e)
    }
}

impl RdsProvider {
    pub(crate) async fn create_cluster_blue_green(&self, resource: Resource) -> ProviderResult<State> {
        ClusterBlueGreenType.validate(&resource)?;
        let config = self.cluster_blue_green_config(&resource)?;
        let timeout = config.timeouts.create.unwrap_or(self.config.timeouts.create);
        self.converge_cluster_blue_green(&resource.id, &config, timeout)
            .await
    }

    pub(crate) async fn update_cluster_blue_green(&self, resource: Resource) -> ProviderResult<State> {
        ClusterBlueGreenType.validate(&resource)?;
        let config = self.cluster_blue_green_config(&resource)?;
        let timeout = config.timeouts.update.unwrap_or(self.config.timeouts.update);
        self.converge_cluster_blue_green(&resource.id, &config, timeout)
            .await
    }

    fn cluster_blue_green_config(&self, resource: &Resource) -> ProviderResult<ClusterBlueGreenConfig> {
        ClusterBlueGreenConfig::from_resource(resource)
            .map_err(|message| ProviderError::new(message).for_resource(resource.id.clone()))
    }

    /// Bring the cluster and its deployment in line with `config`, then read
    /// the resulting state back
    async fn converge_cluster_blue_green(
        &self,
        id: &ResourceId,
        config: &ClusterBlueGreenConfig,
        timeout: Duration,
    ) -> ProviderResult<State> {
        let deadline = Deadline::new(timeout);
        let lifecycle = self.orchestrator().lifecycle();

        let cluster = lifecycle
            .describe_cluster(&config.cluster_identifier)
            .await
            .map_err(rds_error(id))?
            .ok_or_else(|| {
                ProviderError::new(format!(
                    "DB cluster {} not found",
                    config.cluster_identifier
                ))
                .for_resource(id.clone())
            })?;

        if let Some(input) = config.modify_input(&cluster) {
            lifecycle
                .modify_cluster(&input, deadline.remaining())
                .await
                .map_err(rds_error(id))?;
        }

        // Tags go on the cluster and on the deployment; the green cluster
        // inherits them from the blue one
        let tags = merge_tags(&self.config.default_tags, &config.tags);
        lifecycle
            .tag_cluster(&cluster, &tags)
            .await
            .map_err(rds_error(id))?;

        let workflow = Workflow::plan(&config.flags);
        let target = WorkflowTarget {
            cluster_identifier: config.cluster_identifier.clone(),
            cluster_arn: cluster.arn.clone(),
            current_engine_version: cluster.engine_version.clone(),
            engine_version: config.engine_version.clone(),
            tags,
        };
        let report = run_workflow(self.orchestrator(), &workflow, &target, &deadline).await;

        for warning in report.diagnostics.warnings() {
            log::warn!("[{}] {}", id, warning);
        }
        if report.has_errors() {
            return Err(ProviderError::from_diagnostics(&report.diagnostics).for_resource(id.clone()));
        }

        self.read_cluster_blue_green(id, &config.cluster_identifier)
            .await
    }

    pub(crate) async fn read_cluster_blue_green(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let lifecycle = self.orchestrator().lifecycle();
        let Some(cluster) = lifecycle
            .describe_cluster(identifier)
            .await
            .map_err(rds_error(id))?
        else {
            log::warn!("[{}] DB cluster {} not found, removing from state", id, identifier);
            return Ok(State::not_found(id.clone()));
        };

        let mut attributes = cluster_attributes(&cluster, &self.config.default_tags);

        if let Some(deployment) = self
            .orchestrator()
            .locate_deployment(&cluster.identifier)
            .await
            .map_err(rds_error(id))?
        {
            attributes.insert(
                "deployment_identifier".to_string(),
                Value::String(deployment.identifier),
            );
            attributes.insert(
                "deployment_status".to_string(),
                Value::String(deployment.status.to_string()),
            );
        }

        Ok(State::existing(id.clone(), attributes).with_identifier(cluster.identifier))
    }

    /// Remove the deployment record of the cluster, if there is one. The
    /// cluster stays.
    pub(crate) async fn delete_cluster_blue_green(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<()> {
        let deadline = Deadline::new(self.config.timeouts.delete);
        let Some(deployment) = self
            .orchestrator()
            .locate_deployment(identifier)
            .await
            .map_err(rds_error(id))?
        else {
            log::info!("[{}] no blue/green deployment for {}, nothing to delete", id, identifier);
            return Ok(());
        };

        self.orchestrator()
            .delete_deployment(&deployment.identifier, deadline.remaining())
            .await
            .map_err(rds_error(id))
    }
}

fn cluster_attributes(
    cluster: &DbCluster,
    default_tags: &BTreeMap<String, String>,
) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();
    attributes.insert("arn".to_string(), Value::String(cluster.arn.clone()));
    attributes.insert(
        "cluster_identifier".to_string(),
        Value::String(cluster.identifier.clone()),
    );
    attributes.insert(
        "cluster_members".to_string(),
        Value::List(
            cluster
                .members
                .iter()
                .map(|m| Value::String(m.clone()))
                .collect(),
        ),
    );
    if let Some(resource_id) = &cluster.resource_id {
        attributes.insert(
            "cluster_resource_id".to_string(),
            Value::String(resource_id.clone()),
        );
    }
    attributes.insert("engine".to_string(), Value::String(cluster.engine.clone()));
    if let Some(version) = &cluster.engine_version {
        attributes.insert("engine_version".to_string(), Value::String(version.clone()));
    }
    attributes.insert(
        "deletion_protection".to_string(),
        Value::Bool(cluster.deletion_protection),
    );
    if let Some(period) = cluster.backup_retention_period {
        attributes.insert(
            "backup_retention_period".to_string(),
            Value::Int(i64::from(period)),
        );
    }
    attributes.insert(
        "tags".to_string(),
        tags_to_value(&resource_tags(default_tags, &cluster.tags)),
    );
    attributes.insert("tags_all".to_string(), tags_to_value(&cluster.tags));
    attributes
}
