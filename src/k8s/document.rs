//! Resource document model
//!
//! Resources travel to and from the cluster as weakly-typed
//! [`DynamicObject`]s and are converted into typed documents per kind at
//! that edge. Typed documents keep fields they do not model in a flattened
//! residual map, so an update never strips them.

use std::fmt;

use kube::api::{ApiResource, DynamicObject};
use kube::{Resource, ResourceExt};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::error::{ClusterError, ClusterResult};

/// Identity of a resource: `(kind, namespace, name)`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: impl Into<String>, namespace: Option<&str>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.map(str::to_string),
            name: name.into(),
        }
    }

    /// Key of a dynamic object of the given resource type
    pub fn of_dynamic(resource: &ApiResource, obj: &DynamicObject) -> Self {
        Self::new(
            resource.kind.clone(),
            obj.metadata.namespace.as_deref(),
            obj.name_any(),
        )
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// Reference usable by policies targeting a resource
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectReference {
    pub group: String,
    pub kind: String,
    pub name: String,
}

/// Status condition reported by the control plane
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default, JsonSchema)]
pub struct Condition {
    /// Condition type
    #[serde(rename = "type")]
    pub condition_type: String,

    /// Status (True, False, Unknown)
    pub status: String,

    /// Machine readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(rename = "lastTransitionTime", default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,

    #[serde(rename = "observedGeneration", default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    pub fn new(condition_type: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            condition_type: condition_type.into(),
            status: status.into(),
            ..Default::default()
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Whether this is a `type` condition with status `True`
    pub fn is_true(&self, condition_type: &str) -> bool {
        self.condition_type == condition_type && self.status == "True"
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.condition_type, self.status)?;
        if let Some(reason) = &self.reason {
            write!(f, " ({reason})")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

/// Match a condition on type, status and reason, with every fragment
/// required to appear in its message.
pub fn check_condition(
    condition: &Condition,
    condition_type: &str,
    status: &str,
    reason: &str,
    message_fragments: &[&str],
) -> bool {
    if condition.condition_type != condition_type
        || condition.status != status
        || condition.reason.as_deref() != Some(reason)
    {
        return false;
    }
    let message = condition.message.as_deref().unwrap_or_default();
    message_fragments.iter().all(|fragment| message.contains(fragment))
}

/// Render conditions for diagnostics
pub fn describe_conditions(conditions: &[Condition]) -> String {
    if conditions.is_empty() {
        return "no conditions reported".to_string();
    }
    conditions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// A typed resource document that can be handled through the cluster API
pub trait Manifest:
    Resource<DynamicType = ()> + Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Dynamic type information for this kind
    fn api_resource() -> ApiResource {
        ApiResource::erase::<Self>(&())
    }

    /// `(kind, namespace, name)` identity of this document
    fn key(&self) -> ResourceKey {
        ResourceKey::new(
            Self::kind(&()).to_string(),
            self.meta().namespace.as_deref(),
            self.name_any(),
        )
    }
}

impl<K> Manifest for K where
    K: Resource<DynamicType = ()> + Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

/// Convert a typed document into its wire form
pub fn to_dynamic<K: Manifest>(document: &K) -> ClusterResult<DynamicObject> {
    let kind = K::kind(&()).to_string();
    serde_json::to_value(document)
        .and_then(serde_json::from_value)
        .map_err(|source| ClusterError::Serialization { kind, source })
}

/// Convert a wire document into a typed one
pub fn from_dynamic<K: DeserializeOwned>(kind: &str, obj: DynamicObject) -> ClusterResult<K> {
    serde_json::to_value(obj)
        .and_then(serde_json::from_value)
        .map_err(|source| ClusterError::Serialization {
            kind: kind.to_string(),
            source,
        })
}
