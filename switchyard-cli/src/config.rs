//! Configuration file loading
//!
//! A configuration file is JSON:
//!
//! ```json
//! {
//!   "provider": { "region": "us-east-1", "default_tags": {}, "timeouts": { "create": "2h" } },
//!   "resources": [
//!     { "type": "rds.cluster_blue_green_deployment", "name": "main", "attributes": { ... } }
//!   ]
//! }
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use switchyard_core::resource::{Resource, Value};
use switchyard_provider_rds::ProviderConfig;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceConfig {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub name: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::parse(&content).map_err(|e| format!("{}: {}", path.display(), e))
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))
    }

    /// Declared resources with their attributes converted to core values.
    /// `null` attributes are treated as unset.
    pub fn resources(&self) -> Result<Vec<Resource>, String> {
        self.resources
            .iter()
            .map(|config| -> Result<Resource, String> {
                let mut resource = Resource::new(&config.resource_type, &config.name);
                for (key, value) in &config.attributes {
                    if value.is_null() {
                        continue;
                    }
                    let value = json_to_value(value).map_err(|e| {
                        format!("{}: attribute '{}': {}", resource.id, key, e)
                    })?;
                    resource.attributes.insert(key.clone(), value);
                }
                Ok(resource)
            })
            .collect()
    }
}

fn json_to_value(json: &serde_json::Value) -> Result<Value, String> {
    match json {
        serde_json::Value::String(s) => Ok(Value::String(s.clone())),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .ok_or_else(|| format!("{} is not an integer", n)),
        serde_json::Value::Array(items) => items
            .iter()
            .map(json_to_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(k, v)| json_to_value(v).map(|v| (k.clone(), v)))
            .collect::<Result<HashMap<_, _>, _>>()
            .map(Value::Map),
        serde_json::Value::Null => Err("null is not allowed here".to_string()),
    }
}

/// Convert a core value to JSON for output
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::List(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), value_to_json(v)))
                .collect(),
        ),
    }
}
