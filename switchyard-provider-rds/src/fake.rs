//! In-memory `RdsApi` used by tests
//!
//! Records every call as `"<operation> <identifier> [details]"`. Status
//! scripts replay one status per describe call; the last entry repeats.
//! Switchover renames environments the way RDS does: the source cluster
//! and its members get an `-old1` suffix and the green cluster takes over
//! the source names.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::api::{
    BlueGreenDeployment, CreateDeploymentInput, DbCluster, DbInstance, DeploymentFilter,
    ModifyClusterInput, RdsApi,
};
use crate::arn::ClusterArn;
use crate::error::{ApiError, ApiResult};
use crate::status::{ClusterStatus, DeploymentStatus, InstanceStatus};

struct FakeDeployment {
    record: BlueGreenDeployment,
    script: VecDeque<DeploymentStatus>,
    switchover_script: Option<Vec<DeploymentStatus>>,
    green_suffix: String,
}

struct FakeCluster {
    record: DbCluster,
    script: VecDeque<ClusterStatus>,
}

#[derive(Default)]
struct Inner {
    clusters: BTreeMap<String, FakeCluster>,
    instances: BTreeMap<String, DbInstance>,
    deployments: BTreeMap<String, FakeDeployment>,
    calls: Vec<String>,
    failures: HashMap<String, VecDeque<ApiError>>,
    create_script: Option<Vec<DeploymentStatus>>,
    switchover_script: Option<Vec<DeploymentStatus>>,
    sequence: u32,
}

pub struct FakeRds {
    inner: Mutex<Inner>,
}

fn arn(identifier: &str) -> String {
    format!("arn:aws:rds:us-east-1:123456789012:cluster:{}", identifier)
}

fn not_found(code: &str, what: &str, identifier: &str) -> ApiError {
    ApiError::classify(code, format!("{} {} not found.", what, identifier))
}

/// Advance a status script: pop until one entry is left, which then repeats
fn advance<S: Copy>(script: &mut VecDeque<S>) -> Option<S> {
    if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().copied()
    }
}

impl Inner {
    fn record(&mut self, call: String) {
        self.calls.push(call);
    }

    fn take_failure(&mut self, operation: &str) -> ApiResult<()> {
        match self.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn add_instance(&mut self, identifier: &str, cluster: &str) {
        self.instances.insert(
            identifier.to_string(),
            DbInstance {
                identifier: identifier.to_string(),
                cluster_identifier: Some(cluster.to_string()),
                status: InstanceStatus::Available,
            },
        );
    }

    fn add_cluster(&mut self, identifier: &str, engine: &str, version: &str, members: &[String]) {
        let mut members = members.to_vec();
        members.sort();
        for member in &members {
            self.add_instance(member, identifier);
        }
        self.clusters.insert(
            identifier.to_string(),
            FakeCluster {
                record: DbCluster {
                    identifier: identifier.to_string(),
                    arn: arn(identifier),
                    resource_id: Some(format!("cluster-{}", identifier.to_uppercase())),
                    engine: engine.to_string(),
                    engine_version: Some(version.to_string()),
                    status: ClusterStatus::Available,
                    members,
                    deletion_protection: false,
                    backup_retention_period: Some(1),
                    tags: BTreeMap::new(),
                },
                script: VecDeque::new(),
            },
        );
    }

    /// Insert a deployment for the cluster named `name`, with a green copy
    /// of that cluster running `target_version`
    fn insert_deployment(
        &mut self,
        name: &str,
        status: DeploymentStatus,
        target_version: Option<&str>,
        tags: BTreeMap<String, String>,
    ) -> BlueGreenDeployment {
        self.sequence += 1;
        let identifier = format!("bgd-{:06}", self.sequence);
        let green_suffix = format!("-green-{:06}", self.sequence);
        let green = format!("{}{}", name, green_suffix);

        let source = self
            .clusters
            .get(name)
            .map(|c| c.record.clone());
        if let Some(source) = source {
            let members: Vec<String> = source
                .members
                .iter()
                .map(|m| format!("{}{}", m, green_suffix))
                .collect();
            let version = target_version
                .map(str::to_string)
                .or(source.engine_version.clone())
                .unwrap_or_default();
            self.add_cluster(&green, &source.engine, &version, &members);
            if let Some(green) = self.clusters.get_mut(&green) {
                green.record.tags = source.tags.clone();
            }
        }

        let record = BlueGreenDeployment {
            identifier: identifier.clone(),
            name: name.to_string(),
            status,
            status_details: None,
            source: Some(arn(name)),
            target: Some(arn(&green)),
            tags,
        };
        self.deployments.insert(
            identifier,
            FakeDeployment {
                record: record.clone(),
                script: VecDeque::new(),
                switchover_script: None,
                green_suffix,
            },
        );
        record
    }

    fn rename_cluster(&mut self, from: &str, to: &str, rename_member: impl Fn(&str) -> String) {
        let Some(mut cluster) = self.clusters.remove(from) else {
            return;
        };
        let mut members = Vec::new();
        for member in &cluster.record.members {
            let renamed = rename_member(member.as_str());
            if let Some(mut instance) = self.instances.remove(member) {
                instance.identifier = renamed.clone();
                instance.cluster_identifier = Some(to.to_string());
                self.instances.insert(renamed.clone(), instance);
            }
            members.push(renamed);
        }
        members.sort();
        cluster.record.identifier = to.to_string();
        cluster.record.arn = arn(to);
        cluster.record.members = members;
        self.clusters.insert(to.to_string(), cluster);
    }
}

impl FakeRds {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    pub fn add_cluster(&self, identifier: &str, engine: &str, version: &str, members: &[&str]) {
        let members: Vec<String> = members.iter().map(|m| m.to_string()).collect();
        self.lock().add_cluster(identifier, engine, version, &members);
    }

    pub fn cluster_arn(&self, identifier: &str) -> String {
        arn(identifier)
    }

    pub fn cluster(&self, identifier: &str) -> Option<DbCluster> {
        self.lock()
            .clusters
            .get(identifier)
            .map(|c| c.record.clone())
    }

    pub fn has_cluster(&self, identifier: &str) -> bool {
        self.lock().clusters.contains_key(identifier)
    }

    pub fn has_instance(&self, identifier: &str) -> bool {
        self.lock().instances.contains_key(identifier)
    }

    pub fn has_deployment(&self, identifier: &str) -> bool {
        self.lock().deployments.contains_key(identifier)
    }

    pub fn set_deletion_protection(&self, identifier: &str, enabled: bool) {
        if let Some(cluster) = self.lock().clusters.get_mut(identifier) {
            cluster.record.deletion_protection = enabled;
        }
    }

    pub fn set_cluster_tags(&self, identifier: &str, tags: &[(&str, &str)]) {
        if let Some(cluster) = self.lock().clusters.get_mut(identifier) {
            cluster.record.tags = tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
        }
    }

    pub fn script_cluster(&self, identifier: &str, statuses: &[ClusterStatus]) {
        if let Some(cluster) = self.lock().clusters.get_mut(identifier) {
            cluster.script = statuses.iter().copied().collect();
        }
    }

    /// Add a deployment for cluster `name` in `status`; returns its identifier
    pub fn add_deployment(&self, name: &str, status: DeploymentStatus) -> String {
        self.lock()
            .insert_deployment(name, status, None, BTreeMap::new())
            .identifier
    }

    pub fn deployment(&self, identifier: &str) -> Option<BlueGreenDeployment> {
        self.lock()
            .deployments
            .get(identifier)
            .map(|d| d.record.clone())
    }

    pub fn set_deployment_details(&self, identifier: &str, details: &str) {
        if let Some(deployment) = self.lock().deployments.get_mut(identifier) {
            deployment.record.status_details = Some(details.to_string());
        }
    }

    pub fn script_deployment(&self, identifier: &str, statuses: &[DeploymentStatus]) {
        if let Some(deployment) = self.lock().deployments.get_mut(identifier) {
            deployment.script = statuses.iter().copied().collect();
        }
    }

    /// Statuses replayed after a switchover of this deployment
    pub fn set_switchover_script(&self, identifier: &str, statuses: &[DeploymentStatus]) {
        if let Some(deployment) = self.lock().deployments.get_mut(identifier) {
            deployment.switchover_script = Some(statuses.to_vec());
        }
    }

    /// Statuses replayed after any switchover without its own script
    pub fn set_default_switchover_script(&self, statuses: &[DeploymentStatus]) {
        self.lock().switchover_script = Some(statuses.to_vec());
    }

    /// Statuses replayed by deployments created through the API
    pub fn set_create_script(&self, statuses: &[DeploymentStatus]) {
        self.lock().create_script = Some(statuses.to_vec());
    }

    /// Make the next call to `operation` fail with `err`
    pub fn fail_next(&self, operation: &str, err: ApiError) {
        self.lock()
            .failures
            .entry(operation.to_string())
            .or_default()
            .push_back(err);
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.split(' ').next() == Some(operation))
            .count()
    }

    pub fn describe_deployment_count(&self) -> usize {
        self.calls_to("describe_blue_green_deployments")
    }
}

#[async_trait]
impl RdsApi for FakeRds {
    async fn create_blue_green_deployment(
        &self,
        input: &CreateDeploymentInput,
    ) -> ApiResult<BlueGreenDeployment> {
        let mut inner = self.lock();
        inner.record(format!("create_blue_green_deployment {}", input.name));
        inner.take_failure("create_blue_green_deployment")?;

        if let Some(existing) = inner
            .deployments
            .values()
            .find(|d| d.record.name == input.name && d.record.status != DeploymentStatus::Deleting)
        {
            return Err(ApiError::classify(
                "BlueGreenDeploymentAlreadyExistsFault",
                format!("Using existing deployment {}", existing.record.identifier),
            ));
        }

        let source = ClusterArn::parse(&input.source_arn)
            .map_err(|e| ApiError::classify("InvalidParameterValue", e))?
            .cluster_identifier;
        if !inner.clusters.contains_key(&source) {
            return Err(not_found("DBClusterNotFoundFault", "DBCluster", &source));
        }

        let script: VecDeque<DeploymentStatus> = inner
            .create_script
            .clone()
            .unwrap_or_else(|| vec![DeploymentStatus::Available])
            .into();
        let record = inner.insert_deployment(
            &input.name,
            DeploymentStatus::Provisioning,
            input.target_engine_version.as_deref(),
            input.tags.clone(),
        );
        if let Some(deployment) = inner.deployments.get_mut(&record.identifier) {
            deployment.script = script;
        }
        Ok(record)
    }

    async fn describe_blue_green_deployments(
        &self,
        filter: &DeploymentFilter,
    ) -> ApiResult<Vec<BlueGreenDeployment>> {
        let mut inner = self.lock();
        match filter {
            DeploymentFilter::Identifier(id) => {
                inner.record(format!("describe_blue_green_deployments {}", id));
                inner.take_failure("describe_blue_green_deployments")?;
                let deployment = inner.deployments.get_mut(id).ok_or_else(|| {
                    not_found("BlueGreenDeploymentNotFoundFault", "BlueGreenDeployment", id)
                })?;
                if let Some(status) = advance(&mut deployment.script) {
                    deployment.record.status = status;
                }
                Ok(vec![deployment.record.clone()])
            }
            DeploymentFilter::Name(name) => {
                inner.record(format!("describe_blue_green_deployments name={}", name));
                inner.take_failure("describe_blue_green_deployments")?;
                Ok(inner
                    .deployments
                    .values()
                    .filter(|d| &d.record.name == name)
                    .map(|d| d.record.clone())
                    .collect())
            }
        }
    }

    async fn switchover_blue_green_deployment(
        &self,
        identifier: &str,
    ) -> ApiResult<BlueGreenDeployment> {
        let mut inner = self.lock();
        inner.record(format!("switchover_blue_green_deployment {}", identifier));
        inner.take_failure("switchover_blue_green_deployment")?;

        let default_script = inner.switchover_script.clone();
        let deployment = inner.deployments.get_mut(identifier).ok_or_else(|| {
            not_found("BlueGreenDeploymentNotFoundFault", "BlueGreenDeployment", identifier)
        })?;
        if deployment.record.status != DeploymentStatus::Available {
            return Err(ApiError::classify(
                "InvalidBlueGreenDeploymentStateFault",
                format!(
                    "The blue/green deployment can't be switched over in state {}",
                    deployment.record.status
                ),
            ));
        }

        deployment.record.status = DeploymentStatus::SwitchoverInProgress;
        deployment.script = deployment
            .switchover_script
            .clone()
            .or(default_script)
            .unwrap_or_else(|| vec![DeploymentStatus::SwitchoverCompleted])
            .into();
        let name = deployment.record.name.clone();
        let suffix = deployment.green_suffix.clone();

        let old = format!("{}-old1", name);
        let green = format!("{}{}", name, suffix);
        inner.rename_cluster(&name, &old, |m| format!("{}-old1", m));
        inner.rename_cluster(&green, &name, |m| m.trim_end_matches(suffix.as_str()).to_string());

        let deployment = inner.deployments.get_mut(identifier).ok_or_else(|| {
            not_found("BlueGreenDeploymentNotFoundFault", "BlueGreenDeployment", identifier)
        })?;
        deployment.record.source = Some(arn(&old));
        deployment.record.target = Some(arn(&name));
        Ok(deployment.record.clone())
    }

    async fn delete_blue_green_deployment(
        &self,
        identifier: &str,
        delete_target: bool,
    ) -> ApiResult<()> {
        let mut inner = self.lock();
        inner.record(format!(
            "delete_blue_green_deployment {} delete_target={}",
            identifier, delete_target
        ));
        inner.take_failure("delete_blue_green_deployment")?;
        inner.deployments.remove(identifier).ok_or_else(|| {
            not_found("BlueGreenDeploymentNotFoundFault", "BlueGreenDeployment", identifier)
        })?;
        Ok(())
    }

    async fn describe_db_cluster(&self, identifier: &str) -> ApiResult<DbCluster> {
        let mut inner = self.lock();
        inner.record(format!("describe_db_cluster {}", identifier));
        inner.take_failure("describe_db_cluster")?;
        let cluster = inner
            .clusters
            .get_mut(identifier)
            .ok_or_else(|| not_found("DBClusterNotFoundFault", "DBCluster", identifier))?;
        if let Some(status) = advance(&mut cluster.script) {
            cluster.record.status = status;
        }
        Ok(cluster.record.clone())
    }

    async fn modify_db_cluster(&self, input: &ModifyClusterInput) -> ApiResult<DbCluster> {
        let mut inner = self.lock();
        let mut call = format!("modify_db_cluster {}", input.identifier);
        if let Some(enabled) = input.deletion_protection {
            call.push_str(&format!(" deletion_protection={}", enabled));
        }
        if let Some(days) = input.backup_retention_period {
            call.push_str(&format!(" backup_retention_period={}", days));
        }
        inner.record(call);
        inner.take_failure("modify_db_cluster")?;

        let cluster = inner
            .clusters
            .get_mut(&input.identifier)
            .ok_or_else(|| not_found("DBClusterNotFoundFault", "DBCluster", &input.identifier))?;
        if let Some(enabled) = input.deletion_protection {
            cluster.record.deletion_protection = enabled;
        }
        if let Some(days) = input.backup_retention_period {
            cluster.record.backup_retention_period = Some(days);
        }
        Ok(cluster.record.clone())
    }

    async fn add_tags_to_resource(
        &self,
        arn: &str,
        tags: &BTreeMap<String, String>,
    ) -> ApiResult<()> {
        let mut inner = self.lock();
        let pairs: Vec<String> = tags.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        let identifier = ClusterArn::parse(arn)
            .map_err(|e| ApiError::classify("InvalidParameterValue", e))?
            .cluster_identifier;
        inner.record(format!("add_tags_to_resource {} {}", identifier, pairs.join(",")));
        inner.take_failure("add_tags_to_resource")?;

        let cluster = inner
            .clusters
            .get_mut(&identifier)
            .ok_or_else(|| not_found("DBClusterNotFoundFault", "DBCluster", &identifier))?;
        cluster
            .record
            .tags
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn delete_db_cluster(&self, identifier: &str, _skip_final_snapshot: bool) -> ApiResult<()> {
        let mut inner = self.lock();
        inner.record(format!("delete_db_cluster {}", identifier));
        inner.take_failure("delete_db_cluster")?;

        let cluster = inner
            .clusters
            .get(identifier)
            .ok_or_else(|| not_found("DBClusterNotFoundFault", "DBCluster", identifier))?;
        if cluster.record.deletion_protection {
            return Err(ApiError::classify(
                "InvalidParameterCombination",
                "Cannot delete protected Cluster, please disable deletion protection and try again.",
            ));
        }
        if !cluster.record.members.is_empty() {
            return Err(ApiError::classify(
                "InvalidDBClusterStateFault",
                "Cluster cannot be deleted, it still contains DB instances in non-deleting state.",
            ));
        }
        inner.clusters.remove(identifier);
        Ok(())
    }

    async fn describe_db_instance(&self, identifier: &str) -> ApiResult<DbInstance> {
        let mut inner = self.lock();
        inner.record(format!("describe_db_instance {}", identifier));
        inner.take_failure("describe_db_instance")?;
        inner
            .instances
            .get(identifier)
            .cloned()
            .ok_or_else(|| not_found("DBInstanceNotFound", "DBInstance", identifier))
    }

    async fn delete_db_instance(
        &self,
        identifier: &str,
        _skip_final_snapshot: bool,
    ) -> ApiResult<()> {
        let mut inner = self.lock();
        inner.record(format!("delete_db_instance {}", identifier));
        inner.take_failure("delete_db_instance")?;

        let instance = inner
            .instances
            .remove(identifier)
            .ok_or_else(|| not_found("DBInstanceNotFound", "DBInstance", identifier))?;
        if let Some(cluster) = instance
            .cluster_identifier
            .as_deref()
            .and_then(|c| inner.clusters.get_mut(c))
        {
            cluster.record.members.retain(|m| m != identifier);
        }
        Ok(())
    }
}
