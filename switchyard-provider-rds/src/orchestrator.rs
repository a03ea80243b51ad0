//! Blue/green deployment orchestrator
//!
//! A deployment moves `PROVISIONING → AVAILABLE → SWITCHOVER_IN_PROGRESS →
//! SWITCHOVER_COMPLETED`, or ends in `INVALID_CONFIGURATION` /
//! `SWITCHOVER_FAILED`. Each operation here performs one transition (or one
//! wait for it); the workflow module decides which ones run.

use std::time::Duration;

use switchyard_core::deadline::Deadline;

use crate::api::{BlueGreenDeployment, CreateDeploymentInput, DeploymentFilter};
use crate::arn::ClusterArn;
use crate::cluster::ClusterLifecycle;
use crate::context::RdsContext;
use crate::error::{RdsError, RdsResult};
use crate::probe;
use crate::status::DeploymentStatus;
use crate::waiters;

/// Result of a cleanup attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The deployment was not in `SWITCHOVER_COMPLETED`; nothing was touched
    Skipped(DeploymentStatus),
    Completed { source_cluster: String },
}

pub struct BlueGreenOrchestrator {
    ctx: RdsContext,
    lifecycle: ClusterLifecycle,
}

impl BlueGreenOrchestrator {
    pub fn new(ctx: RdsContext) -> Self {
        let lifecycle = ClusterLifecycle::new(ctx.clone());
        Self { ctx, lifecycle }
    }

    pub fn lifecycle(&self) -> &ClusterLifecycle {
        &self.lifecycle
    }

    /// Create a deployment and return its identifier. When RDS reports the
    /// deployment already exists, the existing one is looked up by name and
    /// adopted.
    pub async fn create_deployment(&self, input: &CreateDeploymentInput) -> RdsResult<String> {
        const OPERATION: &str = "creating blue/green deployment";
        log::info!("Creating blue/green deployment for {}", input.name);

        match self.ctx.api.create_blue_green_deployment(input).await {
            Ok(deployment) => {
                log::info!(
                    "Created blue/green deployment {} for {}",
                    deployment.identifier,
                    input.name
                );
                Ok(deployment.identifier)
            }
            Err(e) if e.is_already_exists() => {
                log::info!("Using existing blue/green deployment for {}: {}", input.name, e.message);
                match self.locate_deployment(&input.name).await? {
                    Some(existing) => Ok(existing.identifier),
                    None => Err(RdsError::api(OPERATION, &input.name, e)),
                }
            }
            Err(e) => Err(RdsError::api(OPERATION, &input.name, e)),
        }
    }

    /// Find the active deployment named after `cluster_identifier`.
    ///
    /// Deployments being deleted are ignored. More than one active match is
    /// an error rather than a guess.
    pub async fn locate_deployment(
        &self,
        cluster_identifier: &str,
    ) -> RdsResult<Option<BlueGreenDeployment>> {
        const OPERATION: &str = "looking up blue/green deployment";
        let filter = DeploymentFilter::Name(cluster_identifier.to_string());
        let found = match self.ctx.api.describe_blue_green_deployments(&filter).await {
            Ok(found) => found,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(RdsError::api(OPERATION, cluster_identifier, e)),
        };

        let mut active: Vec<BlueGreenDeployment> = found
            .into_iter()
            .filter(|d| d.status != DeploymentStatus::Deleting)
            .collect();

        match active.len() {
            0 | 1 => Ok(active.pop()),
            count => Err(RdsError::AmbiguousDeployment {
                operation: OPERATION,
                id: cluster_identifier.to_string(),
                count,
            }),
        }
    }

    /// Fresh describe by identifier; `None` when the deployment is gone
    pub async fn describe_deployment(
        &self,
        identifier: &str,
    ) -> RdsResult<Option<BlueGreenDeployment>> {
        probe::status_deployment(self.ctx.api.as_ref(), identifier)
            .await
            .map(|observation| observation.object)
            .map_err(|e| RdsError::api("describing blue/green deployment", identifier, e))
    }

    pub async fn wait_for_available(
        &self,
        identifier: &str,
        timeout: Duration,
    ) -> RdsResult<BlueGreenDeployment> {
        log::info!("Waiting for blue/green deployment {} to become available", identifier);
        waiters::wait_deployment_available(&self.ctx, identifier, timeout).await
    }

    pub async fn start_switchover(&self, identifier: &str) -> RdsResult<()> {
        log::info!("Switching over blue/green deployment {}", identifier);
        self.ctx
            .api
            .switchover_blue_green_deployment(identifier)
            .await
            .map_err(|e| RdsError::api("switching over blue/green deployment", identifier, e))?;
        Ok(())
    }

    pub async fn switchover(
        &self,
        identifier: &str,
        timeout: Duration,
    ) -> RdsResult<BlueGreenDeployment> {
        let deadline = Deadline::new(timeout);
        self.start_switchover(identifier).await?;
        self.wait_for_switchover_completed(identifier, deadline.remaining())
            .await
    }

    pub async fn wait_for_switchover_completed(
        &self,
        identifier: &str,
        timeout: Duration,
    ) -> RdsResult<BlueGreenDeployment> {
        log::info!(
            "Waiting for blue/green deployment {} switchover to complete",
            identifier
        );
        waiters::wait_deployment_switchover_completed(&self.ctx, identifier, timeout).await
    }

    /// Tear down the old (blue) environment of a completed switchover, then
    /// the deployment record.
    ///
    /// The deployment status is re-read first: nothing is deleted unless it
    /// is `SWITCHOVER_COMPLETED`.
    pub async fn cleanup_source(
        &self,
        identifier: &str,
        deadline: &Deadline,
    ) -> RdsResult<CleanupOutcome> {
        const OPERATION: &str = "cleaning up blue/green source";

        let Some(deployment) = self.describe_deployment(identifier).await? else {
            log::info!("Blue/green deployment {} no longer exists, skipping cleanup", identifier);
            return Ok(CleanupOutcome::Skipped(DeploymentStatus::Absent));
        };
        if deployment.status != DeploymentStatus::SwitchoverCompleted {
            log::info!(
                "Blue/green deployment {} is {}, skipping cleanup",
                identifier,
                deployment.status
            );
            return Ok(CleanupOutcome::Skipped(deployment.status));
        }

        let source_arn = deployment
            .source
            .as_deref()
            .ok_or_else(|| RdsError::invalid(OPERATION, identifier, "deployment has no source cluster"))?;
        let source = ClusterArn::parse(source_arn)
            .map_err(|message| RdsError::invalid(OPERATION, identifier, message))?
            .cluster_identifier;

        log::info!(
            "Deleting blue/green source cluster {} of deployment {}",
            source,
            identifier
        );
        self.lifecycle
            .delete_cluster_with_members(&source, deadline)
            .await?;
        self.delete_deployment(identifier, deadline.remaining())
            .await?;

        Ok(CleanupOutcome::Completed {
            source_cluster: source,
        })
    }

    /// Delete the deployment record, keeping the target environment, and
    /// wait until it is gone
    pub async fn delete_deployment(&self, identifier: &str, timeout: Duration) -> RdsResult<()> {
        let deadline = Deadline::new(timeout);
        log::info!("Deleting blue/green deployment {}", identifier);

        match self
            .ctx
            .api
            .delete_blue_green_deployment(identifier, false)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => {
                return Err(RdsError::api(
                    "deleting blue/green deployment",
                    identifier,
                    e,
                ));
            }
        }

        waiters::wait_deployment_deleted(&self.ctx, identifier, deadline.remaining()).await
    }
}
