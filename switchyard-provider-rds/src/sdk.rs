//! `RdsApi` binding over the AWS SDK

use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use aws_sdk_rds::Client;
use aws_sdk_rds::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_rds::types::{
    BlueGreenDeployment as SdkDeployment, DbCluster as SdkCluster, DbInstance as SdkInstance,
    Filter, Tag,
};

use crate::api::{
    BlueGreenDeployment, CreateDeploymentInput, DEPLOYMENT_NAME_FILTER, DbCluster, DbInstance,
    DeploymentFilter, ModifyClusterInput, RdsApi,
};
use crate::error::{ApiError, ApiResult};
use crate::status::UnknownStatus;

/// RDS control plane reached through `aws-sdk-rds`
pub struct SdkRdsApi {
    client: Client,
}

impl SdkRdsApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Load credentials from the default chain, optionally pinning the region
    pub async fn from_region(region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_sdk_rds::config::Region::new(region.to_string()));
        }
        let config = loader.load().await;
        Self::new(Client::new(&config))
    }
}

#[async_trait]
impl RdsApi for SdkRdsApi {
    async fn create_blue_green_deployment(
        &self,
        input: &CreateDeploymentInput,
    ) -> ApiResult<BlueGreenDeployment> {
        let tags = sdk_tags(&input.tags);

        let output = self
            .client
            .create_blue_green_deployment()
            .blue_green_deployment_name(&input.name)
            .source(&input.source_arn)
            .set_target_engine_version(input.target_engine_version.clone())
            .set_tags(if tags.is_empty() { None } else { Some(tags) })
            .send()
            .await
            .map_err(api_error)?;

        let deployment = output
            .blue_green_deployment()
            .ok_or_else(|| ApiError::malformed("create response has no blue/green deployment"))?;
        deployment_from_sdk(deployment)
    }

    async fn describe_blue_green_deployments(
        &self,
        filter: &DeploymentFilter,
    ) -> ApiResult<Vec<BlueGreenDeployment>> {
        let request = self.client.describe_blue_green_deployments();
        let request = match filter {
            DeploymentFilter::Identifier(id) => request.blue_green_deployment_identifier(id),
            DeploymentFilter::Name(name) => request.filters(name_filter(name)),
        };

        let output = request.send().await.map_err(api_error)?;
        output
            .blue_green_deployments()
            .iter()
            .map(deployment_from_sdk)
            .collect()
    }

    async fn switchover_blue_green_deployment(
        &self,
        identifier: &str,
    ) -> ApiResult<BlueGreenDeployment> {
        let output = self
            .client
            .switchover_blue_green_deployment()
            .blue_green_deployment_identifier(identifier)
            .send()
            .await
            .map_err(api_error)?;

        let deployment = output.blue_green_deployment().ok_or_else(|| {
            ApiError::malformed("switchover response has no blue/green deployment")
        })?;
        deployment_from_sdk(deployment)
    }

    async fn delete_blue_green_deployment(
        &self,
        identifier: &str,
        delete_target: bool,
    ) -> ApiResult<()> {
        self.client
            .delete_blue_green_deployment()
            .blue_green_deployment_identifier(identifier)
            .delete_target(delete_target)
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn describe_db_cluster(&self, identifier: &str) -> ApiResult<DbCluster> {
        let output = self
            .client
            .describe_db_clusters()
            .db_cluster_identifier(identifier)
            .send()
            .await
            .map_err(api_error)?;

        match output.db_clusters().first() {
            Some(cluster) => cluster_from_sdk(cluster),
            None => Err(ApiError::classify(
                "DBClusterNotFoundFault",
                format!("DBCluster {} not found", identifier),
            )),
        }
    }

    async fn modify_db_cluster(&self, input: &ModifyClusterInput) -> ApiResult<DbCluster> {
        let output = self
            .client
            .modify_db_cluster()
            .db_cluster_identifier(&input.identifier)
            .set_deletion_protection(input.deletion_protection)
            .set_backup_retention_period(input.backup_retention_period)
            .set_apply_immediately(input.apply_immediately)
            .send()
            .await
            .map_err(api_error)?;

        let cluster = output
            .db_cluster()
            .ok_or_else(|| ApiError::malformed("modify response has no DB cluster"))?;
        cluster_from_sdk(cluster)
    }

    async fn add_tags_to_resource(
        &self,
        arn: &str,
        tags: &BTreeMap<String, String>,
    ) -> ApiResult<()> {
        self.client
            .add_tags_to_resource()
            .resource_name(arn)
            .set_tags(Some(sdk_tags(tags)))
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn delete_db_cluster(&self, identifier: &str, skip_final_snapshot: bool) -> ApiResult<()> {
        self.client
            .delete_db_cluster()
            .db_cluster_identifier(identifier)
            .skip_final_snapshot(skip_final_snapshot)
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }

    async fn describe_db_instance(&self, identifier: &str) -> ApiResult<DbInstance> {
        let output = self
            .client
            .describe_db_instances()
            .db_instance_identifier(identifier)
            .send()
            .await
            .map_err(api_error)?;

        match output.db_instances().first() {
            Some(instance) => instance_from_sdk(instance),
            None => Err(ApiError::classify(
                "DBInstanceNotFound",
                format!("DBInstance {} not found", identifier),
            )),
        }
    }

    async fn delete_db_instance(
        &self,
        identifier: &str,
        skip_final_snapshot: bool,
    ) -> ApiResult<()> {
        self.client
            .delete_db_instance()
            .db_instance_identifier(identifier)
            .skip_final_snapshot(skip_final_snapshot)
            .send()
            .await
            .map_err(api_error)?;
        Ok(())
    }
}

fn api_error<E, R>(err: SdkError<E, R>) -> ApiError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    match &err {
        SdkError::ServiceError(service) => {
            let inner = service.err();
            ApiError::classify(
                inner.code().unwrap_or("Unknown"),
                inner.message().unwrap_or_default(),
            )
        }
        _ => ApiError::transport(DisplayErrorContext(&err).to_string()),
    }
}

fn required<'a>(value: Option<&'a str>, what: &str) -> ApiResult<&'a str> {
    value.ok_or_else(|| ApiError::malformed(format!("response is missing {}", what)))
}

fn parse_status<S>(value: Option<&str>, what: &str) -> ApiResult<S>
where
    S: FromStr<Err = UnknownStatus>,
{
    required(value, what)?
        .parse()
        .map_err(|e: UnknownStatus| ApiError::malformed(e.to_string()))
}

fn name_filter(name: &str) -> Filter {
    Filter::builder()
        .name(DEPLOYMENT_NAME_FILTER)
        .values(name)
        .build()
}

fn sdk_tags(tags: &BTreeMap<String, String>) -> Vec<Tag> {
    tags.iter()
        .map(|(k, v)| Tag::builder().key(k).value(v).build())
        .collect()
}

fn tags_from_sdk(tags: &[Tag]) -> BTreeMap<String, String> {
    tags.iter()
        .filter_map(|tag| {
            let key = tag.key()?;
            Some((key.to_string(), tag.value().unwrap_or_default().to_string()))
        })
        .collect()
}

fn deployment_from_sdk(deployment: &SdkDeployment) -> ApiResult<BlueGreenDeployment> {
    Ok(BlueGreenDeployment {
        identifier: required(
            deployment.blue_green_deployment_identifier(),
            "blue/green deployment identifier",
        )?
        .to_string(),
        name: deployment
            .blue_green_deployment_name()
            .unwrap_or_default()
            .to_string(),
        status: parse_status(deployment.status(), "blue/green deployment status")?,
        status_details: deployment.status_details().map(str::to_string),
        source: deployment.source().map(str::to_string),
        target: deployment.target().map(str::to_string),
        tags: tags_from_sdk(deployment.tag_list()),
    })
}

fn cluster_from_sdk(cluster: &SdkCluster) -> ApiResult<DbCluster> {
    let mut members: Vec<String> = cluster
        .db_cluster_members()
        .iter()
        .filter_map(|m| m.db_instance_identifier().map(str::to_string))
        .collect();
    members.sort();

    Ok(DbCluster {
        identifier: required(cluster.db_cluster_identifier(), "DB cluster identifier")?
            .to_string(),
        arn: required(cluster.db_cluster_arn(), "DB cluster ARN")?.to_string(),
        resource_id: cluster.db_cluster_resource_id().map(str::to_string),
        engine: cluster.engine().unwrap_or_default().to_string(),
        engine_version: cluster.engine_version().map(str::to_string),
        status: parse_status(cluster.status(), "DB cluster status")?,
        members,
        deletion_protection: cluster.deletion_protection().unwrap_or(false),
        backup_retention_period: cluster.backup_retention_period(),
        tags: tags_from_sdk(cluster.tag_list()),
    })
}

fn instance_from_sdk(instance: &SdkInstance) -> ApiResult<DbInstance> {
    Ok(DbInstance {
        identifier: required(instance.db_instance_identifier(), "DB instance identifier")?
            .to_string(),
        cluster_identifier: instance.db_cluster_identifier().map(str::to_string),
        status: parse_status(instance.db_instance_status(), "DB instance status")?,
    })
}
