//! Resource types served by the RDS provider

pub mod cluster_blue_green;

use std::collections::{BTreeMap, HashMap};

use switchyard_core::provider::ResourceType;
use switchyard_core::resource::Value;

/// Every resource type this provider serves
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![Box::new(cluster_blue_green::ClusterBlueGreenType)]
}

/// Provider default tags overlaid with the resource's own tags
pub fn merge_tags(
    defaults: &BTreeMap<String, String>,
    tags: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut all = defaults.clone();
    all.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
    all
}

/// Split remote tags back into the resource's own tags: entries identical to
/// a provider default tag are dropped
pub fn resource_tags(
    defaults: &BTreeMap<String, String>,
    remote: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    remote
        .iter()
        .filter(|(k, v)| defaults.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

pub(crate) fn tags_to_value(tags: &BTreeMap<String, String>) -> Value {
    Value::Map(
        tags.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect::<HashMap<_, _>>(),
    )
}

pub(crate) fn tags_from_value(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_map)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}
