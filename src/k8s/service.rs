//! Service handles

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::context::ClusterContext;
use super::error::{ClusterError, ClusterResult};
use super::handle::Handle;

/// Named service port forwarding to `target_port` on the selected pods
pub fn service_port(name: &str, port: i32, target_port: IntOrString) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(target_port),
        ..Default::default()
    }
}

impl Handle<Service> {
    /// Build an uncommitted Service. `service_type` defaults to the
    /// cluster's choice (ClusterIP) when `None`.
    pub fn create_instance(
        context: &ClusterContext,
        name: &str,
        selector: BTreeMap<String, String>,
        ports: Vec<ServicePort>,
        labels: BTreeMap<String, String>,
        service_type: Option<&str>,
    ) -> Self {
        let mut service = Service::default();
        service.metadata.name = Some(name.to_string());
        service.metadata.labels = Some(labels);
        service.spec = Some(ServiceSpec {
            selector: Some(selector),
            ports: Some(ports),
            type_: service_type.map(str::to_string),
            ..Default::default()
        });
        Handle::new(context, service)
    }

    /// Port definition called `name`
    pub fn port(&self, name: &str) -> ClusterResult<&ServicePort> {
        self.document()
            .spec
            .as_ref()
            .and_then(|spec| spec.ports.as_ref())
            .and_then(|ports| ports.iter().find(|p| p.name.as_deref() == Some(name)))
            .ok_or_else(|| {
                ClusterError::Configuration(format!("No port with name {name} exists in {}", self.key()))
            })
    }

    /// Ingress IP of a LoadBalancer service, once the cloud provider
    /// assigned one
    pub fn external_ip(&self) -> ClusterResult<Option<&str>> {
        let service = self.document();
        let service_type = service.spec.as_ref().and_then(|s| s.type_.as_deref());
        if service_type != Some("LoadBalancer") {
            return Err(ClusterError::Configuration(format!(
                "External IP can be only used with LoadBalancer services, {} is {}",
                self.key(),
                service_type.unwrap_or("ClusterIP")
            )));
        }

        Ok(service
            .status
            .as_ref()
            .and_then(|s| s.load_balancer.as_ref())
            .and_then(|lb| lb.ingress.as_ref())
            .and_then(|ingress| ingress.first())
            .and_then(|i| i.ip.as_deref()))
    }
}
