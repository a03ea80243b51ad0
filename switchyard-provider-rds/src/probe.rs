//! Status probes
//!
//! Each probe performs one describe call and turns the result into an
//! `Observation` for the wait engine. A missing object is reported as the
//! `Absent` status rather than an error.

use switchyard_core::wait::Observation;

use crate::api::{BlueGreenDeployment, DbCluster, DbInstance, DeploymentFilter, RdsApi};
use crate::error::ApiResult;
use crate::status::{ClusterStatus, DeploymentStatus, InstanceStatus};

pub async fn status_deployment(
    api: &dyn RdsApi,
    identifier: &str,
) -> ApiResult<Observation<BlueGreenDeployment, DeploymentStatus>> {
    let filter = DeploymentFilter::Identifier(identifier.to_string());
    match api.describe_blue_green_deployments(&filter).await {
        Ok(deployments) => Ok(deployments
            .into_iter()
            .find(|d| d.identifier == identifier)
            .map(|d| {
                let status = d.status;
                let detail = d.status_details.clone();
                Observation::found(d, status).with_detail(detail)
            })
            .unwrap_or_else(Observation::absent)),
        Err(e) if e.is_not_found() => Ok(Observation::absent()),
        Err(e) => Err(e),
    }
}

pub async fn status_cluster(
    api: &dyn RdsApi,
    identifier: &str,
) -> ApiResult<Observation<DbCluster, ClusterStatus>> {
    match api.describe_db_cluster(identifier).await {
        Ok(cluster) => {
            let status = cluster.status;
            Ok(Observation::found(cluster, status))
        }
        Err(e) if e.is_not_found() => Ok(Observation::absent()),
        Err(e) => Err(e),
    }
}

pub async fn status_instance(
    api: &dyn RdsApi,
    identifier: &str,
) -> ApiResult<Observation<DbInstance, InstanceStatus>> {
    match api.describe_db_instance(identifier).await {
        Ok(instance) => {
            let status = instance.status;
            Ok(Observation::found(instance, status))
        }
        Err(e) if e.is_not_found() => Ok(Observation::absent()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;
    use crate::fake::FakeRds;

    #[tokio::test]
    async fn deployment_probe_carries_status_details() {
        let fake = FakeRds::new();
        fake.add_cluster("db-1", "aurora-mysql", "8.0.mysql_aurora.3.04.0", &["db-1-a"]);
        let id = fake.add_deployment("db-1", DeploymentStatus::InvalidConfiguration);
        fake.set_deployment_details(&id, "Binary logging is not enabled");

        let observation = status_deployment(&fake, &id).await.unwrap();
        assert_eq!(observation.status, DeploymentStatus::InvalidConfiguration);
        assert_eq!(
            observation.detail.as_deref(),
            Some("Binary logging is not enabled")
        );
        assert_eq!(observation.object.map(|d| d.name), Some("db-1".to_string()));
    }

    #[tokio::test]
    async fn missing_objects_are_absent() {
        let fake = FakeRds::new();
        assert!(status_deployment(&fake, "bgd-missing").await.unwrap().is_absent());
        assert!(status_cluster(&fake, "db-missing").await.unwrap().is_absent());
        assert!(status_instance(&fake, "db-missing-a").await.unwrap().is_absent());
    }

    #[tokio::test]
    async fn other_errors_propagate() {
        let fake = FakeRds::new();
        fake.fail_next(
            "describe_db_cluster",
            ApiError::classify("AccessDenied", "not authorized"),
        );
        let err = status_cluster(&fake, "db-1").await.unwrap_err();
        assert_eq!(err.code, "AccessDenied");
    }
}
