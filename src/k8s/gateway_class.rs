//! GatewayClass selection
//!
//! Gateways are created with the first preferred GatewayClass the cluster
//! offers. The choice is made once per cluster and then reused.

use std::collections::{BTreeMap, HashMap};

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::context::ClusterContext;
use super::document::{Condition, Manifest};
use super::error::{ClusterError, ClusterResult};

/// GatewayClass names in order of preference
pub const PREFERRED_GATEWAY_CLASSES: [&str; 2] = ["openshift-default", "istio"];

/// GatewayClass custom resource specification
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(group = "gateway.networking.k8s.io", version = "v1", kind = "GatewayClass")]
#[kube(status = "GatewayClassStatus")]
pub struct GatewayClassSpec {
    /// Controller that manages Gateways of this class
    #[serde(rename = "controllerName")]
    pub controller_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// GatewayClass status
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct GatewayClassStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Pick the preferred class among `available`
pub fn select_gateway_class<'a>(
    available: impl IntoIterator<Item = &'a str>,
) -> ClusterResult<String> {
    let available: Vec<&str> = available.into_iter().collect();
    PREFERRED_GATEWAY_CLASSES
        .iter()
        .find(|preferred| available.contains(*preferred))
        .map(|name| name.to_string())
        .ok_or_else(|| {
            ClusterError::Configuration(format!(
                "Neither '{}' nor '{}' GatewayClass found",
                PREFERRED_GATEWAY_CLASSES[0], PREFERRED_GATEWAY_CLASSES[1]
            ))
        })
}

/// Resolves and remembers the GatewayClass per cluster.
///
/// Class availability is assumed stable for the lifetime of the resolver.
#[derive(Debug, Default)]
pub struct GatewayClassResolver {
    cache: Mutex<HashMap<String, String>>,
}

impl GatewayClassResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Class for the cluster behind `context`, listing GatewayClasses only
    /// on first use
    pub async fn resolve(&self, context: &ClusterContext) -> ClusterResult<String> {
        let mut cache = self.cache.lock().await;
        if let Some(name) = cache.get(context.cluster_id()) {
            return Ok(name.clone());
        }

        let classes = context
            .api()
            .list(&GatewayClass::api_resource(), None, None)
            .await?;
        let names: Vec<String> = classes.iter().map(ResourceExt::name_any).collect();
        debug!("GatewayClasses in {}: {:?}", context.cluster_id(), names);

        let selected = select_gateway_class(names.iter().map(String::as_str))?;
        info!(
            "Using GatewayClass {} for {}",
            selected,
            context.cluster_id()
        );
        cache.insert(context.cluster_id().to_string(), selected.clone());
        Ok(selected)
    }

    /// Previously resolved class, if any
    pub async fn cached(&self, context: &ClusterContext) -> Option<String> {
        self.cache.lock().await.get(context.cluster_id()).cloned()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::k8s::document::to_dynamic;
    use crate::k8s::testing::FakeCluster;
    use std::sync::Arc;

    pub(crate) fn install_classes(cluster: &FakeCluster, names: &[&str]) {
        for name in names {
            let class = GatewayClass::new(
                name,
                GatewayClassSpec {
                    controller_name: format!("example.com/{name}"),
                    ..Default::default()
                },
            );
            cluster.insert(&GatewayClass::api_resource(), to_dynamic(&class).unwrap());
        }
    }

    #[test]
    fn test_prefers_openshift_default() {
        let selected = select_gateway_class(["istio", "openshift-default"]).unwrap();
        assert_eq!(selected, "openshift-default");
    }

    #[test]
    fn test_falls_back_to_istio() {
        assert_eq!(select_gateway_class(["istio"]).unwrap(), "istio");
        assert_eq!(select_gateway_class(["other", "istio"]).unwrap(), "istio");
    }

    #[test]
    fn test_no_known_class() {
        let err = select_gateway_class(std::iter::empty()).unwrap_err();
        assert!(matches!(err, ClusterError::Configuration(_)));

        let err = select_gateway_class(["nginx"]).unwrap_err();
        assert!(err.to_string().contains("Neither 'openshift-default' nor 'istio'"));
    }

    #[tokio::test]
    async fn test_resolver_lists_once_per_cluster() {
        let cluster = FakeCluster::new();
        install_classes(&cluster, &["istio"]);
        let resolver = GatewayClassResolver::new();
        let context = cluster.context("kuadrant");

        assert_eq!(resolver.resolve(&context).await.unwrap(), "istio");
        install_classes(&cluster, &["openshift-default"]);
        assert_eq!(
            resolver.resolve(&context.change_project("other")).await.unwrap(),
            "istio"
        );
        assert_eq!(cluster.count_calls("list"), 1);
    }

    #[tokio::test]
    async fn test_resolver_is_keyed_by_cluster() {
        let first = FakeCluster::new();
        install_classes(&first, &["istio"]);
        let second = FakeCluster::new();
        install_classes(&second, &["openshift-default"]);

        let resolver = GatewayClassResolver::new();
        let first_ctx = ClusterContext::from_api(Arc::new(first), "ns", "first");
        let second_ctx = ClusterContext::from_api(Arc::new(second), "ns", "second");

        assert_eq!(resolver.resolve(&first_ctx).await.unwrap(), "istio");
        assert_eq!(
            resolver.resolve(&second_ctx).await.unwrap(),
            "openshift-default"
        );
        assert_eq!(resolver.cached(&first_ctx).await.as_deref(), Some("istio"));
    }

    #[tokio::test]
    async fn test_failed_resolution_is_not_cached() {
        let cluster = FakeCluster::new();
        let resolver = GatewayClassResolver::new();
        let context = cluster.context("kuadrant");

        assert!(resolver.resolve(&context).await.is_err());
        install_classes(&cluster, &["istio"]);
        assert_eq!(resolver.resolve(&context).await.unwrap(), "istio");
    }
}
