//! Remote API contract
//!
//! `RdsApi` is the subset of the RDS control plane the provider consumes.
//! Records are parsed into closed status enums by the binding, so everything
//! above this trait works with typed values only.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::ApiResult;
use crate::status::{ClusterStatus, DeploymentStatus, InstanceStatus};

/// Filter name RDS uses to look deployments up by name
pub const DEPLOYMENT_NAME_FILTER: &str = "blue-green-deployment-name";

#[derive(Debug, Clone, PartialEq)]
pub struct BlueGreenDeployment {
    pub identifier: String,
    pub name: String,
    pub status: DeploymentStatus,
    pub status_details: Option<String>,
    /// ARN of the blue (source) cluster
    pub source: Option<String>,
    /// ARN of the green (target) cluster
    pub target: Option<String>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DbCluster {
    pub identifier: String,
    pub arn: String,
    pub resource_id: Option<String>,
    pub engine: String,
    pub engine_version: Option<String>,
    pub status: ClusterStatus,
    /// Member instance identifiers, sorted
    pub members: Vec<String>,
    pub deletion_protection: bool,
    pub backup_retention_period: Option<i32>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DbInstance {
    pub identifier: String,
    pub cluster_identifier: Option<String>,
    pub status: InstanceStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateDeploymentInput {
    pub name: String,
    pub source_arn: String,
    pub target_engine_version: Option<String>,
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModifyClusterInput {
    pub identifier: String,
    pub deletion_protection: Option<bool>,
    pub backup_retention_period: Option<i32>,
    pub apply_immediately: Option<bool>,
}

impl ModifyClusterInput {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Default::default()
        }
    }

    /// Whether the input changes anything at all
    pub fn has_changes(&self) -> bool {
        self.deletion_protection.is_some() || self.backup_retention_period.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentFilter {
    Identifier(String),
    /// Deployments are named after their source cluster identifier
    Name(String),
}

#[async_trait]
pub trait RdsApi: Send + Sync {
    async fn create_blue_green_deployment(
        &self,
        input: &CreateDeploymentInput,
    ) -> ApiResult<BlueGreenDeployment>;

    /// An unknown identifier is either a not-found error or an empty list
    async fn describe_blue_green_deployments(
        &self,
        filter: &DeploymentFilter,
    ) -> ApiResult<Vec<BlueGreenDeployment>>;

    async fn switchover_blue_green_deployment(
        &self,
        identifier: &str,
    ) -> ApiResult<BlueGreenDeployment>;

    async fn delete_blue_green_deployment(
        &self,
        identifier: &str,
        delete_target: bool,
    ) -> ApiResult<()>;

    async fn describe_db_cluster(&self, identifier: &str) -> ApiResult<DbCluster>;

    async fn modify_db_cluster(&self, input: &ModifyClusterInput) -> ApiResult<DbCluster>;

    /// Add or overwrite tags on the resource named by `arn`
    async fn add_tags_to_resource(&self, arn: &str, tags: &BTreeMap<String, String>)
    -> ApiResult<()>;

    async fn delete_db_cluster(&self, identifier: &str, skip_final_snapshot: bool) -> ApiResult<()>;

    async fn describe_db_instance(&self, identifier: &str) -> ApiResult<DbInstance>;

    async fn delete_db_instance(&self, identifier: &str, skip_final_snapshot: bool)
    -> ApiResult<()>;
}
