//! Cluster and instance lifecycle operations
//!
//! Modify and delete calls are retried while RDS reports one of its
//! eventual-consistency errors, then followed by a wait for the resulting
//! status. Teardown of a cluster deletes its members one at a time and only
//! deletes the cluster once every member is confirmed gone.

use std::collections::BTreeMap;
use std::time::Duration;

use switchyard_core::deadline::Deadline;
use switchyard_core::retry::{RetryError, retry_when};

use crate::api::{DbCluster, ModifyClusterInput};
use crate::context::RdsContext;
use crate::error::{ApiError, RdsError, RdsResult};
use crate::waiters;

/// Errors worth retrying on modify: IAM role propagation, storage
/// optimization, a busy cluster, throttling
pub fn is_modify_retryable(err: &ApiError) -> bool {
    err.is_throttling()
        || err.matches(
            "InvalidParameterValue",
            "IAM role ARN value is invalid or does not include the required permissions",
        )
        || err.matches(
            "InvalidParameterCombination",
            "previous storage change is being optimized",
        )
        || err.code == "InvalidDBClusterStateFault"
}

/// Errors worth retrying on delete. Disabling deletion protection takes a
/// moment to be honoured.
pub fn is_delete_retryable(err: &ApiError) -> bool {
    is_modify_retryable(err)
        || err.matches("InvalidParameterCombination", "disable deletion pro")
        || err.code == "InvalidDBInstanceState"
}

#[derive(Clone)]
pub struct ClusterLifecycle {
    ctx: RdsContext,
}

impl ClusterLifecycle {
    pub fn new(ctx: RdsContext) -> Self {
        Self { ctx }
    }

    pub async fn describe_cluster(&self, identifier: &str) -> RdsResult<Option<DbCluster>> {
        match self.ctx.api.describe_db_cluster(identifier).await {
            Ok(cluster) => Ok(Some(cluster)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(RdsError::api("describing DB cluster", identifier, e)),
        }
    }

    /// Apply `input` and wait until the cluster is available again
    pub async fn modify_cluster(
        &self,
        input: &ModifyClusterInput,
        timeout: Duration,
    ) -> RdsResult<DbCluster> {
        let deadline = Deadline::new(timeout);
        let api = self.ctx.api.as_ref();
        log::info!("Modifying DB cluster {}", input.identifier);

        retry_when(
            deadline.remaining(),
            &self.ctx.cancel,
            self.ctx.timing.retry,
            move || api.modify_db_cluster(input),
            is_modify_retryable,
        )
        .await
        .map_err(|e| RdsError::from_retry("modifying DB cluster", &input.identifier, e))?;

        waiters::wait_cluster_available(&self.ctx, &input.identifier, deadline.remaining()).await
    }

    /// Add the `tags` the cluster lacks or carries with another value
    pub async fn tag_cluster(
        &self,
        cluster: &DbCluster,
        tags: &BTreeMap<String, String>,
    ) -> RdsResult<bool> {
        let missing: BTreeMap<String, String> = tags
            .iter()
            .filter(|(k, v)| cluster.tags.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if missing.is_empty() {
            return Ok(false);
        }

        log::info!("Tagging DB cluster {} with {} tag(s)", cluster.identifier, missing.len());
        self.ctx
            .api
            .add_tags_to_resource(&cluster.arn, &missing)
            .await
            .map_err(|e| RdsError::api("tagging DB cluster", &cluster.identifier, e))?;
        Ok(true)
    }

    /// Delete an instance (skipping the final snapshot) and wait until it is
    /// gone. An instance that no longer exists counts as deleted.
    pub async fn delete_instance(&self, identifier: &str, timeout: Duration) -> RdsResult<()> {
        let deadline = Deadline::new(timeout);
        let api = self.ctx.api.as_ref();
        log::info!("Deleting DB instance {}", identifier);

        let deleted = retry_when(
            deadline.remaining(),
            &self.ctx.cancel,
            self.ctx.timing.retry,
            move || api.delete_db_instance(identifier, true),
            is_delete_retryable,
        )
        .await;
        match deleted {
            Ok(()) => {}
            Err(RetryError::Failed(e)) if e.is_not_found() => {
                log::debug!("DB instance {} already deleted", identifier);
                return Ok(());
            }
            Err(e) => return Err(RdsError::from_retry("deleting DB instance", identifier, e)),
        }

        waiters::wait_instance_deleted(&self.ctx, identifier, deadline.remaining()).await
    }

    /// Delete a cluster (skipping the final snapshot), clearing deletion
    /// protection first when it is enabled, and wait until it is gone
    pub async fn delete_cluster(&self, identifier: &str, timeout: Duration) -> RdsResult<()> {
        let deadline = Deadline::new(timeout);
        let api = self.ctx.api.as_ref();

        let Some(cluster) = self.describe_cluster(identifier).await? else {
            log::debug!("DB cluster {} already deleted", identifier);
            return Ok(());
        };

        if cluster.deletion_protection {
            log::info!("Disabling deletion protection on DB cluster {}", identifier);
            let input = ModifyClusterInput {
                deletion_protection: Some(false),
                apply_immediately: Some(true),
                ..ModifyClusterInput::new(identifier)
            };
            self.modify_cluster(&input, deadline.remaining()).await?;
        }

        log::info!("Deleting DB cluster {}", identifier);
        let deleted = retry_when(
            deadline.remaining(),
            &self.ctx.cancel,
            self.ctx.timing.retry,
            move || api.delete_db_cluster(identifier, true),
            is_delete_retryable,
        )
        .await;
        match deleted {
            Ok(()) => {}
            Err(RetryError::Failed(e)) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(RdsError::from_retry("deleting DB cluster", identifier, e)),
        }

        waiters::wait_cluster_deleted(&self.ctx, identifier, deadline.remaining()).await
    }

    /// Delete every member instance, then the cluster itself
    pub async fn delete_cluster_with_members(
        &self,
        identifier: &str,
        deadline: &Deadline,
    ) -> RdsResult<()> {
        let Some(cluster) = self.describe_cluster(identifier).await? else {
            log::debug!("DB cluster {} already deleted", identifier);
            return Ok(());
        };

        for member in &cluster.members {
            self.delete_instance(member, deadline.remaining()).await?;
        }

        self.delete_cluster(identifier, deadline.remaining()).await
    }
}
