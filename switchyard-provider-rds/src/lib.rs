//! Switchyard RDS Provider
//!
//! Drives Amazon RDS blue/green deployments of Aurora clusters: create the
//! green environment, wait for it, switch over, and tear down the old blue
//! cluster once the switchover has completed.

pub mod api;
pub mod arn;
pub mod cluster;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod probe;
pub mod resources;
pub mod sdk;
pub mod status;
pub mod waiters;
pub mod workflow;

#[cfg(test)]
mod fake;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use switchyard_core::provider::{
    BoxFuture, Provider, ProviderError, ProviderResult, ResourceType,
};
use switchyard_core::resource::{Resource, ResourceId, State};
use switchyard_core::utils::parse_duration;
use tokio_util::sync::CancellationToken;

use crate::api::RdsApi;
use crate::context::RdsContext;
use crate::orchestrator::BlueGreenOrchestrator;
use crate::resources::cluster_blue_green;
use crate::sdk::SdkRdsApi;
use crate::waiters::WaitTiming;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120 * 60);

/// Create/update/delete timeouts applied to every handler invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    #[serde(deserialize_with = "deserialize_duration")]
    pub create: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub update: Duration,
    #[serde(deserialize_with = "deserialize_duration")]
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: DEFAULT_TIMEOUT,
            update: DEFAULT_TIMEOUT,
            delete: DEFAULT_TIMEOUT,
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// AWS region; falls back to the default provider chain when unset
    pub region: Option<String>,
    /// Tags applied to every deployment, overridden by resource tags
    pub default_tags: BTreeMap<String, String>,
    pub timeouts: Timeouts,
}

/// RDS Provider
pub struct RdsProvider {
    config: ProviderConfig,
    ctx: RdsContext,
    orchestrator: BlueGreenOrchestrator,
}

impl RdsProvider {
    /// Create a provider backed by the AWS SDK, loading credentials from the
    /// environment
    pub async fn new(config: ProviderConfig) -> Self {
        let api = SdkRdsApi::from_region(config.region.as_deref()).await;
        Self::with_api(Arc::new(api), config)
    }

    /// Create a provider over any `RdsApi` implementation
    pub fn with_api(api: Arc<dyn RdsApi>, config: ProviderConfig) -> Self {
        let ctx = RdsContext::new(api);
        let orchestrator = BlueGreenOrchestrator::new(ctx.clone());
        Self {
            config,
            ctx,
            orchestrator,
        }
    }

    /// Cancel every in-flight wait when `cancel` fires
    pub fn with_cancel(self, cancel: CancellationToken) -> Self {
        let ctx = self.ctx.with_cancel(cancel);
        Self::from_parts(self.config, ctx)
    }

    pub fn with_timing(self, timing: WaitTiming) -> Self {
        let ctx = self.ctx.with_timing(timing);
        Self::from_parts(self.config, ctx)
    }

    fn from_parts(config: ProviderConfig, ctx: RdsContext) -> Self {
        let orchestrator = BlueGreenOrchestrator::new(ctx.clone());
        Self {
            config,
            ctx,
            orchestrator,
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub(crate) fn orchestrator(&self) -> &BlueGreenOrchestrator {
        &self.orchestrator
    }
}

fn unknown_type(id: &ResourceId) -> ProviderError {
    ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
        .for_resource(id.clone())
}

impl Provider for RdsProvider {
    fn name(&self) -> &'static str {
        "rds"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resources::resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(str::to_string);
        Box::pin(async move {
            match id.resource_type.as_str() {
                cluster_blue_green::RESOURCE_TYPE => {
                    let Some(identifier) = identifier else {
                        return Ok(State::not_found(id));
                    };
                    self.read_cluster_blue_green(&id, &identifier).await
                }
                _ => Err(unknown_type(&id)),
            }
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            match resource.id.resource_type.as_str() {
                cluster_blue_green::RESOURCE_TYPE => self.create_cluster_blue_green(resource).await,
                _ => Err(unknown_type(&resource.id)),
            }
        })
    }

    fn update(
        &self,
        id: &ResourceId,
        _identifier: &str,
        _from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let to = to.clone();
        Box::pin(async move {
            match id.resource_type.as_str() {
                cluster_blue_green::RESOURCE_TYPE => self.update_cluster_blue_green(to).await,
                _ => Err(unknown_type(&id)),
            }
        })
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        Box::pin(async move {
            match id.resource_type.as_str() {
                cluster_blue_green::RESOURCE_TYPE => {
                    self.delete_cluster_blue_green(&id, &identifier).await
                }
                _ => Err(unknown_type(&id)),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeRds;

    #[test]
    fn provider_config_defaults() {
        let config = ProviderConfig::default();
        assert_eq!(config.timeouts.create, Duration::from_secs(7200));
        assert_eq!(config.timeouts.update, Duration::from_secs(7200));
        assert_eq!(config.timeouts.delete, Duration::from_secs(7200));
        assert!(config.region.is_none());
    }

    #[test]
    fn provider_config_from_json() {
        let config: ProviderConfig = serde_json::from_str(
            r#"{
                "region": "eu-west-1",
                "default_tags": {"team": "data"},
                "timeouts": {"create": "3h", "delete": "45m"}
            }"#,
        )
        .unwrap();

        assert_eq!(config.region.as_deref(), Some("eu-west-1"));
        assert_eq!(config.default_tags.get("team").map(String::as_str), Some("data"));
        assert_eq!(config.timeouts.create, Duration::from_secs(3 * 3600));
        assert_eq!(config.timeouts.update, DEFAULT_TIMEOUT);
        assert_eq!(config.timeouts.delete, Duration::from_secs(45 * 60));
    }

    #[test]
    fn invalid_timeout_is_rejected() {
        let result: Result<ProviderConfig, _> =
            serde_json::from_str(r#"{"timeouts": {"create": "soon"}}"#);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unknown_resource_type_is_an_error() {
        let provider = RdsProvider::with_api(Arc::new(FakeRds::new()), ProviderConfig::default());
        let id = ResourceId::new("rds.cluster", "main");
        let err = provider.read(&id, Some("db-1")).await.unwrap_err();
        assert!(err.to_string().contains("Unknown resource type: rds.cluster"));
        assert_eq!(provider.name(), "rds");
        assert_eq!(provider.resource_types().len(), 1);
    }
}
