//! Waiters for deployments, clusters and instances

use std::time::Duration;

use switchyard_core::retry::RetryConfig;
use switchyard_core::wait::StateChangeConf;

use crate::api::{BlueGreenDeployment, DbCluster};
use crate::context::RdsContext;
use crate::error::{RdsError, RdsResult};
use crate::probe;
use crate::status::{ClusterStatus, DeploymentStatus, InstanceStatus};

/// Poll timing shared by every waiter of a provider
#[derive(Debug, Clone, Copy)]
pub struct WaitTiming {
    /// Sleep before the first poll of a wait
    pub delay: Duration,
    pub poll_interval: Duration,
    pub retry: RetryConfig,
}

impl Default for WaitTiming {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(60),
            poll_interval: Duration::from_secs(10),
            retry: RetryConfig::default(),
        }
    }
}

/// Statuses a cluster passes through on its way back to `available`
const CLUSTER_AVAILABLE_PENDING: &[ClusterStatus] = &[
    ClusterStatus::BackingUp,
    ClusterStatus::Backtracking,
    ClusterStatus::ConfiguringIamDatabaseAuth,
    ClusterStatus::Creating,
    ClusterStatus::Deleting,
    ClusterStatus::FailingOver,
    ClusterStatus::Maintenance,
    ClusterStatus::Migrating,
    ClusterStatus::Modifying,
    ClusterStatus::PreparingDataMigration,
    ClusterStatus::Promoting,
    ClusterStatus::Rebooting,
    ClusterStatus::Renaming,
    ClusterStatus::ResettingMasterCredentials,
    ClusterStatus::ScalingCompute,
    ClusterStatus::Starting,
    ClusterStatus::UpdateIamDbAuth,
    ClusterStatus::Upgrading,
];

fn conf<S: switchyard_core::wait::WaitStatus>(
    timing: &WaitTiming,
    pending: &[S],
    target: &[S],
    timeout: Duration,
) -> StateChangeConf<S> {
    StateChangeConf::new(pending, target)
        .with_timeout(timeout)
        .with_delay(timing.delay)
        .with_poll_interval(timing.poll_interval)
}

pub async fn wait_deployment_available(
    ctx: &RdsContext,
    identifier: &str,
    timeout: Duration,
) -> RdsResult<BlueGreenDeployment> {
    const OPERATION: &str = "waiting for blue/green deployment to become available";
    let api = ctx.api.as_ref();
    conf(
        &ctx.timing,
        &[DeploymentStatus::Provisioning],
        &[DeploymentStatus::Available],
        timeout,
    )
    .wait_for_state(&ctx.cancel, move || probe::status_deployment(api, identifier))
    .await
    .map_err(|e| RdsError::from_wait(OPERATION, identifier, e))?
    .ok_or_else(|| RdsError::invalid(OPERATION, identifier, "deployment disappeared"))
}

pub async fn wait_deployment_switchover_completed(
    ctx: &RdsContext,
    identifier: &str,
    timeout: Duration,
) -> RdsResult<BlueGreenDeployment> {
    const OPERATION: &str = "waiting for blue/green deployment switchover to complete";
    let api = ctx.api.as_ref();
    conf(
        &ctx.timing,
        &[DeploymentStatus::SwitchoverInProgress],
        &[DeploymentStatus::SwitchoverCompleted],
        timeout,
    )
    .wait_for_state(&ctx.cancel, move || probe::status_deployment(api, identifier))
    .await
    .map_err(|e| RdsError::from_wait(OPERATION, identifier, e))?
    .ok_or_else(|| RdsError::invalid(OPERATION, identifier, "deployment disappeared"))
}

pub async fn wait_deployment_deleted(
    ctx: &RdsContext,
    identifier: &str,
    timeout: Duration,
) -> RdsResult<()> {
    let api = ctx.api.as_ref();
    conf(
        &ctx.timing,
        DeploymentStatus::ALL,
        &[DeploymentStatus::Absent],
        timeout,
    )
    .wait_for_state(&ctx.cancel, move || probe::status_deployment(api, identifier))
    .await
    .map_err(|e| RdsError::from_wait("waiting for blue/green deployment deletion", identifier, e))?;
    Ok(())
}

pub async fn wait_cluster_available(
    ctx: &RdsContext,
    identifier: &str,
    timeout: Duration,
) -> RdsResult<DbCluster> {
    const OPERATION: &str = "waiting for DB cluster to become available";
    let api = ctx.api.as_ref();
    conf(
        &ctx.timing,
        CLUSTER_AVAILABLE_PENDING,
        &[ClusterStatus::Available],
        timeout,
    )
    .with_continuous_target_occurence(3)
    .wait_for_state(&ctx.cancel, move || probe::status_cluster(api, identifier))
    .await
    .map_err(|e| RdsError::from_wait(OPERATION, identifier, e))?
    .ok_or_else(|| RdsError::invalid(OPERATION, identifier, "cluster disappeared"))
}

pub async fn wait_cluster_deleted(
    ctx: &RdsContext,
    identifier: &str,
    timeout: Duration,
) -> RdsResult<()> {
    let api = ctx.api.as_ref();
    conf(&ctx.timing, ClusterStatus::ALL, &[ClusterStatus::Absent], timeout)
        .wait_for_state(&ctx.cancel, move || probe::status_cluster(api, identifier))
        .await
        .map_err(|e| RdsError::from_wait("waiting for DB cluster deletion", identifier, e))?;
    Ok(())
}

pub async fn wait_instance_deleted(
    ctx: &RdsContext,
    identifier: &str,
    timeout: Duration,
) -> RdsResult<()> {
    let api = ctx.api.as_ref();
    conf(&ctx.timing, InstanceStatus::ALL, &[InstanceStatus::Absent], timeout)
        .wait_for_state(&ctx.cancel, move || probe::status_instance(api, identifier))
        .await
        .map_err(|e| RdsError::from_wait("waiting for DB instance deletion", identifier, e))?;
    Ok(())
}
