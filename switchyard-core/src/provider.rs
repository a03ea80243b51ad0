//! Provider - Trait abstracting resource operations
//!
//! A Provider owns the API clients for one control plane and turns
//! declared resources into remote calls. Handlers may block for a long time:
//! every operation is bounded by the provider's configured timeouts.

use std::future::Future;
use std::pin::Pin;

use crate::diagnostic::Diagnostics;
use crate::resource::{Resource, ResourceId, State};
use crate::schema::ResourceSchema;

/// Error type for Provider operations
#[derive(Debug)]
pub struct ProviderError {
    pub message: String,
    pub resource_id: Option<ResourceId>,
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref id) = self.resource_id {
            write!(f, "[{}.{}] {}", id.resource_type, id.name, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_ref()
            .map(|e| e.as_ref() as &dyn std::error::Error)
    }
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource_id: None,
            cause: None,
        }
    }

    /// Build an error out of the error-level entries of a diagnostics list
    pub fn from_diagnostics(diagnostics: &Diagnostics) -> Self {
        let lines: Vec<String> = diagnostics.errors().map(|d| d.to_string()).collect();
        Self::new(lines.join("; "))
    }

    pub fn for_resource(mut self, id: ResourceId) -> Self {
        self.resource_id = Some(id);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// Return type for async operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Definition of resource types that a Provider can handle
pub trait ResourceType: Send + Sync {
    /// Resource type name (e.g., "rds.cluster_blue_green_deployment")
    fn name(&self) -> &'static str;

    /// Attribute schema used for plan-time validation
    fn schema(&self) -> ResourceSchema;

    /// Validate a declared resource against the schema and any
    /// cross-attribute rules of the type
    fn validate(&self, resource: &Resource) -> ProviderResult<()> {
        self.schema().validate(&resource.attributes).map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            ProviderError::new(messages.join("; ")).for_resource(resource.id.clone())
        })
    }
}

/// Main Provider trait
///
/// All operations are async and involve side effects.
pub trait Provider: Send + Sync {
    /// Name of this Provider (e.g., "rds")
    fn name(&self) -> &'static str;

    /// List of resource types this Provider can handle
    fn resource_types(&self) -> Vec<Box<dyn ResourceType>>;

    /// Get the current state of a resource
    ///
    /// Returns `State::not_found()` if the resource does not exist.
    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Create a resource
    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>>;

    /// Update a resource
    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>>;

    /// Delete a resource
    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>>;
}

/// Provider implementation for Box<dyn Provider>
/// This enables dynamic dispatch for Providers
impl Provider for Box<dyn Provider> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        (**self).resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).read(id, identifier)
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).create(resource)
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        (**self).update(id, identifier, from, to)
    }

    fn delete(&self, id: &ResourceId, identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
        (**self).delete(id, identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Diagnostic;
    use crate::resource::Value;
    use crate::schema::{AttributeSchema, AttributeType};

    struct MockType;

    impl ResourceType for MockType {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn schema(&self) -> ResourceSchema {
            ResourceSchema::new("mock")
                .attribute(AttributeSchema::new("name", AttributeType::String).required())
        }
    }

    // Mock Provider for testing
    struct MockProvider;

    impl Provider for MockProvider {
        fn name(&self) -> &'static str {
            "mock"
        }

        fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
            vec![Box::new(MockType)]
        }

        fn read(
            &self,
            id: &ResourceId,
            _identifier: Option<&str>,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            Box::pin(async move { Ok(State::not_found(id)) })
        }

        fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
            let id = resource.id.clone();
            let attrs = resource.attributes.clone();
            Box::pin(async move { Ok(State::existing(id, attrs).with_identifier("mock-id-123")) })
        }

        fn update(
            &self,
            id: &ResourceId,
            _identifier: &str,
            _from: &State,
            to: &Resource,
        ) -> BoxFuture<'_, ProviderResult<State>> {
            let id = id.clone();
            let attrs = to.attributes.clone();
            Box::pin(async move { Ok(State::existing(id, attrs)) })
        }

        fn delete(&self, _id: &ResourceId, _identifier: &str) -> BoxFuture<'_, ProviderResult<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn mock_provider_read_returns_not_found() {
        let provider: Box<dyn Provider> = Box::new(MockProvider);
        let id = ResourceId::new("mock", "example");
        let state = provider.read(&id, None).await.unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn mock_provider_create_returns_existing() {
        let provider = MockProvider;
        let resource = Resource::new("mock", "example");
        let state = provider.create(&resource).await.unwrap();
        assert!(state.exists);
        assert_eq!(state.identifier, Some("mock-id-123".to_string()));
    }

    #[test]
    fn resource_type_validate_reports_missing_attribute() {
        let resource = Resource::new("mock", "example");
        let err = MockType.validate(&resource).unwrap_err();
        assert_eq!(err.resource_id, Some(ResourceId::new("mock", "example")));
        assert!(err.message.contains("'name'"));

        let resource = resource.with_attribute("name", Value::String("x".to_string()));
        assert!(MockType.validate(&resource).is_ok());
    }

    #[test]
    fn provider_error_display_includes_resource() {
        let err = ProviderError::new("boom").for_resource(ResourceId::new("mock", "example"));
        assert_eq!(err.to_string(), "[mock.example] boom");
    }

    #[test]
    fn provider_error_from_diagnostics_keeps_errors_only() {
        let mut diags = Diagnostics::new();
        diags.push(Diagnostic::warning("just a warning", ""));
        diags.push(Diagnostic::error("switchover", "db-1: failed"));
        let err = ProviderError::from_diagnostics(&diags);
        assert_eq!(err.message, "switchover: db-1: failed");
    }
}
