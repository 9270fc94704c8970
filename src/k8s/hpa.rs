//! HorizontalPodAutoscaler handles

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::autoscaling::v2::{
    CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec, MetricSpec,
};

use super::context::ClusterContext;
use super::handle::Handle;

/// Default bounds of an autoscaler
pub const DEFAULT_MIN_REPLICAS: i32 = 1;
pub const DEFAULT_MAX_REPLICAS: i32 = 10;

impl Handle<HorizontalPodAutoscaler> {
    /// Build an uncommitted autoscaler scaling `deployment` between
    /// `min_replicas` and `max_replicas` on `metrics`
    pub fn create_instance(
        context: &ClusterContext,
        name: &str,
        deployment: &Handle<Deployment>,
        metrics: Vec<MetricSpec>,
        min_replicas: i32,
        max_replicas: i32,
    ) -> Self {
        let mut hpa = HorizontalPodAutoscaler::default();
        hpa.metadata.name = Some(name.to_string());
        hpa.spec = Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".to_string()),
                kind: "Deployment".to_string(),
                name: deployment.name(),
            },
            min_replicas: Some(min_replicas),
            max_replicas,
            metrics: Some(metrics),
            ..Default::default()
        });
        Handle::new(context, hpa)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::testing::FakeCluster;
    use k8s_openapi::api::autoscaling::v2::{MetricTarget, ResourceMetricSource};

    fn cpu_utilization(percent: i32) -> MetricSpec {
        MetricSpec {
            type_: "Resource".to_string(),
            resource: Some(ResourceMetricSource {
                name: "cpu".to_string(),
                target: MetricTarget {
                    type_: "Utilization".to_string(),
                    average_utilization: Some(percent),
                    ..Default::default()
                },
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_targets_deployment() {
        let cluster = FakeCluster::new();
        let context = cluster.context("kuadrant");
        let mut deployment = Deployment::default();
        deployment.metadata.name = Some("authorino".to_string());
        let deployment = Handle::new(&context, deployment);

        let mut hpa = Handle::<HorizontalPodAutoscaler>::create_instance(
            &context,
            "authorino-hpa",
            &deployment,
            vec![cpu_utilization(50)],
            DEFAULT_MIN_REPLICAS,
            DEFAULT_MAX_REPLICAS,
        );
        hpa.commit().await.unwrap();

        let stored = cluster.object(&hpa.key()).unwrap();
        assert_eq!(stored.data["spec"]["scaleTargetRef"]["kind"], "Deployment");
        assert_eq!(stored.data["spec"]["scaleTargetRef"]["name"], "authorino");
        assert_eq!(stored.data["spec"]["minReplicas"], 1);
        assert_eq!(stored.data["spec"]["maxReplicas"], 10);
        assert_eq!(
            stored.data["spec"]["metrics"][0]["resource"]["target"]["averageUtilization"],
            50
        );
    }
}
