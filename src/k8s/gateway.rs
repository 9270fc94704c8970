//! Gateway resource handle
//!
//! Gateway documents plus the logic tests need on top of them: listener
//! management, readiness, policy affectation, TLS certificate lookup and
//! cleanup of resources the control plane leaves behind.

use std::collections::BTreeMap;
use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use kube::api::ApiResource;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::context::ClusterContext;
use super::document::{
    check_condition, describe_conditions, from_dynamic, Condition, Manifest, ObjectReference,
    ResourceKey,
};
use super::error::{ClusterError, ClusterResult};
use super::gateway_class::GatewayClassResolver;
use super::handle::Handle;
use super::mutation::MutationPolicy;
use super::poller::PollConfig;
use super::tls::{certificate_secret_name, tls_listeners, Certificate};

/// API group of Gateway API resources
pub const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";

/// Condition reported once the gateway's data plane is configured
pub const PROGRAMMED: &str = "Programmed";

/// Grace period for load balancers that lag behind the Programmed condition
pub const SLOW_LOADBALANCER_DELAY: Duration = Duration::from_secs(60);

/// Gateway custom resource specification
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(group = "gateway.networking.k8s.io", version = "v1", kind = "Gateway", namespaced)]
#[kube(status = "GatewayStatus")]
pub struct GatewaySpec {
    /// GatewayClass name
    #[serde(rename = "gatewayClassName")]
    pub gateway_class_name: String,

    /// Listeners for the gateway
    #[serde(default)]
    pub listeners: Vec<ListenerSpec>,

    /// Addresses for the gateway
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<AddressSpec>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Gateway listener specification
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct ListenerSpec {
    /// Listener name
    pub name: String,

    /// Port number
    pub port: u16,

    /// Protocol (HTTP, HTTPS, TLS, TCP, UDP)
    pub protocol: String,

    /// Hostname pattern, possibly `*.`-prefixed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,

    /// TLS configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,

    /// Allowed routes
    #[serde(rename = "allowedRoutes", skip_serializing_if = "Option::is_none")]
    pub allowed_routes: Option<AllowedRoutes>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ListenerSpec {
    /// Plain HTTP listener on port 80 accepting routes from all namespaces
    pub fn http(name: impl Into<String>, hostname: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port: 80,
            protocol: "HTTP".to_string(),
            hostname: Some(hostname.into()),
            allowed_routes: Some(AllowedRoutes::from_all_namespaces()),
            ..Default::default()
        }
    }

    /// HTTPS listener on port 443 terminating TLS with `secret`
    pub fn https(
        name: impl Into<String>,
        hostname: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            port: 443,
            protocol: "HTTPS".to_string(),
            hostname: Some(hostname.into()),
            tls: Some(TlsConfig {
                mode: Some("Terminate".to_string()),
                certificate_refs: vec![CertificateRef {
                    name: secret.into(),
                    kind: Some("Secret".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            allowed_routes: Some(AllowedRoutes::from_all_namespaces()),
            ..Default::default()
        }
    }
}

/// TLS configuration for listener
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct TlsConfig {
    /// TLS mode (Terminate, Passthrough)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    /// Certificate references
    #[serde(rename = "certificateRefs", default)]
    pub certificate_refs: Vec<CertificateRef>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Certificate reference
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct CertificateRef {
    /// Name of the secret
    pub name: String,

    /// Kind (usually "Secret")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Namespace of the secret
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Allowed routes configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct AllowedRoutes {
    /// Namespaces from which routes may be attached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespaces: Option<RouteNamespaces>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl AllowedRoutes {
    pub fn from_all_namespaces() -> Self {
        Self {
            namespaces: Some(RouteNamespaces {
                from: "All".to_string(),
            }),
            ..Default::default()
        }
    }
}

/// Route namespace selector
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct RouteNamespaces {
    /// From: All, Same, Selector
    pub from: String,
}

/// Gateway address specification
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq)]
pub struct AddressSpec {
    /// Address type (IPAddress, Hostname)
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub address_type: Option<String>,

    /// Address value
    pub value: String,
}

/// Gateway status
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
pub struct GatewayStatus {
    /// Addresses assigned to the gateway
    #[serde(default)]
    pub addresses: Vec<AddressSpec>,

    /// Conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Gateway {
    /// Conditions reported so far, empty before the first reconciliation
    pub fn conditions(&self) -> &[Condition] {
        self.status
            .as_ref()
            .map(|s| s.conditions.as_slice())
            .unwrap_or_default()
    }
}

/// Whether the gateway reports `Programmed=True`
pub fn is_programmed(gateway: &Gateway) -> bool {
    gateway.conditions().iter().any(|c| c.is_true(PROGRAMMED))
}

/// Whether `gateway` reports being affected by the policy `policy`
pub fn is_affected_by(gateway: &Gateway, policy: &ResourceKey) -> bool {
    let condition_type = format!("kuadrant.io/{}Affected", policy.kind);
    let affected_by = format!("Object affected by {}", policy.kind);
    let policy_name = format!(
        "{}/{}",
        policy.namespace.as_deref().unwrap_or_default(),
        policy.name
    );

    gateway.conditions().iter().any(|c| {
        check_condition(
            c,
            &condition_type,
            "True",
            "Accepted",
            &[&affected_by, &policy_name],
        )
    })
}

fn dns_record_resource() -> ApiResource {
    ApiResource {
        group: "kuadrant.io".to_string(),
        version: "v1alpha1".to_string(),
        api_version: "kuadrant.io/v1alpha1".to_string(),
        kind: "DNSRecord".to_string(),
        plural: "dnsrecords".to_string(),
    }
}

/// Handle to a Gateway and the resources derived from it
#[derive(Clone, Debug)]
pub struct GatewayHandle {
    handle: Handle<Gateway>,
    slow_loadbalancer_delay: Option<Duration>,
}

impl GatewayHandle {
    /// Build an uncommitted Gateway with no listeners, using the
    /// GatewayClass `classes` resolves for this cluster
    pub async fn create_instance(
        context: &ClusterContext,
        classes: &GatewayClassResolver,
        name: &str,
        labels: BTreeMap<String, String>,
    ) -> ClusterResult<Self> {
        let class_name = classes.resolve(context).await?;
        let mut gateway = Self::new(context, name, class_name);
        gateway.handle.document_mut().metadata.labels = Some(labels);
        Ok(gateway)
    }

    /// Uncommitted gateway `name` of class `class_name`
    pub fn new(context: &ClusterContext, name: &str, class_name: impl Into<String>) -> Self {
        let gateway = Gateway::new(
            name,
            GatewaySpec {
                gateway_class_name: class_name.into(),
                ..Default::default()
            },
        );
        Self::from_handle(Handle::new(context, gateway))
    }

    /// Handle to an existing gateway in the context's project
    pub async fn fetch(context: &ClusterContext, name: &str) -> ClusterResult<Self> {
        let mut handle = Handle::new(context, Gateway::new(name, GatewaySpec::default()));
        handle.refresh().await?;
        Ok(Self::from_handle(handle))
    }

    /// The live gateway `name`, or, once it is gone, an uncommitted one of
    /// the class `classes` resolves so its leftovers can still be found
    pub async fn locate(
        context: &ClusterContext,
        classes: &GatewayClassResolver,
        name: &str,
    ) -> ClusterResult<Self> {
        match Self::fetch(context, name).await {
            Err(err) if err.is_not_found() => {
                debug!("Gateway {} not found, assuming the resolved class", name);
                let class_name = classes.resolve(context).await?;
                Ok(Self::new(context, name, class_name))
            }
            result => result,
        }
    }

    pub fn from_handle(handle: Handle<Gateway>) -> Self {
        Self {
            handle,
            slow_loadbalancer_delay: None,
        }
    }

    /// Wait an extra `delay` after readiness, for load balancers that
    /// become reachable later than the gateway reports
    pub fn with_slow_loadbalancers(mut self, delay: Option<Duration>) -> Self {
        self.slow_loadbalancer_delay = delay;
        self
    }

    pub fn slow_loadbalancer_delay(&self) -> Option<Duration> {
        self.slow_loadbalancer_delay
    }

    pub fn with_mutation_policy(mut self, policy: MutationPolicy) -> Self {
        self.handle = self.handle.with_mutation_policy(policy);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.handle = self.handle.with_poll_interval(interval);
        self
    }

    pub async fn commit(&mut self) -> ClusterResult<&Gateway> {
        self.handle.commit().await
    }

    pub async fn refresh(&mut self) -> ClusterResult<&Gateway> {
        self.handle.refresh().await
    }

    /// Delete the gateway, then the TLS secrets and service account created
    /// on its behalf, which the control plane does not clean up
    pub async fn delete(&self, ignore_not_found: bool) -> ClusterResult<bool> {
        let deleted = self.handle.delete(ignore_not_found).await?;

        let api = self.handle.context().api();
        let name = self.name();
        let namespace = self.namespace();

        let secrets = Secret::api_resource();
        for secret in api.list(&secrets, namespace, None).await? {
            let secret_name = secret.name_any();
            if secret_name.contains("tls") && secret_name.contains(&name) {
                debug!("Deleting TLS secret {} left by {}", secret_name, name);
                api.delete(&secrets, &secret_name, namespace, true).await?;
            }
        }

        api.delete(
            &ServiceAccount::api_resource(),
            &self.service_name(),
            namespace,
            true,
        )
        .await?;

        Ok(deleted)
    }

    /// Append a listener to the live gateway
    pub async fn add_listener(&mut self, listener: ListenerSpec) -> ClusterResult<&Gateway> {
        info!("Adding listener {} to {}", listener.name, self.name());
        self.handle
            .modify(|gateway: &mut Gateway| gateway.spec.listeners.push(listener.clone()))
            .await
    }

    /// Remove every listener called `listener_name` from the live gateway
    pub async fn remove_listener(&mut self, listener_name: &str) -> ClusterResult<&Gateway> {
        info!("Removing listener {} from {}", listener_name, self.name());
        self.handle
            .modify(|gateway: &mut Gateway| {
                gateway.spec.listeners.retain(|l| l.name != listener_name)
            })
            .await
    }

    /// TTL of the DNSRecord published for `listener_name`
    pub async fn listener_dns_ttl(&self, listener_name: &str) -> ClusterResult<Option<i64>> {
        let record_name = format!("{}-{}", self.name(), listener_name);
        let record = self
            .handle
            .context()
            .api()
            .get(&dns_record_resource(), &record_name, self.namespace())
            .await?;
        Ok(record.data["spec"]["endpoints"][0]["recordTTL"].as_i64())
    }

    /// Name of the Service (and Deployment) the gateway class controller
    /// creates for this gateway
    pub fn service_name(&self) -> String {
        format!(
            "{}-{}",
            self.name(),
            self.handle.document().spec.gateway_class_name
        )
    }

    /// First address the gateway got, with the HTTP port
    pub async fn external_ip(&mut self) -> ClusterResult<Option<String>> {
        let gateway = self.handle.refresh().await?;
        Ok(gateway
            .status
            .as_ref()
            .and_then(|s| s.addresses.first())
            .map(|a| format!("{}:80", a.value)))
    }

    /// Deployment managed for this gateway
    pub async fn deployment(&self) -> ClusterResult<Handle<Deployment>> {
        let resource = Deployment::api_resource();
        let obj = self
            .handle
            .context()
            .api()
            .get(&resource, &self.service_name(), self.namespace())
            .await?;
        let deployment: Deployment = from_dynamic(&resource.kind, obj)?;
        Ok(Handle::new(self.handle.context(), deployment)
            .with_mutation_policy(self.handle.mutation_policy().clone())
            .with_poll_interval(self.handle.poll_interval()))
    }

    /// Whether the last observed state is `Programmed=True`
    pub fn is_ready(&self) -> bool {
        is_programmed(self.handle.document())
    }

    /// Wait until the gateway is programmed, failing with the last observed
    /// conditions when `timeout` passes first
    pub async fn wait_for_ready(&mut self, timeout: Duration) -> ClusterResult<()> {
        let config = PollConfig::new(timeout, self.handle.poll_interval());
        let ready = self.handle.wait_with(is_programmed, config).await?;
        if !ready {
            return Err(ClusterError::NotReady {
                key: self.handle.key(),
                state: describe_conditions(self.handle.document().conditions()),
            });
        }
        info!("Gateway {} is ready", self.name());

        if let Some(delay) = self.slow_loadbalancer_delay {
            debug!("Waiting {:?} for slow load balancers", delay);
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    /// Whether the last observed state shows the policy `policy` affecting
    /// this gateway
    pub fn is_affected_by(&self, policy: &ResourceKey) -> bool {
        is_affected_by(self.handle.document(), policy)
    }

    /// Listeners with TLS configuration, in declaration order
    pub fn tls_listeners(&self) -> Vec<&ListenerSpec> {
        tls_listeners(&self.handle.document().spec.listeners)
    }

    /// Certificate secret of the listener serving `hostname`.
    ///
    /// `Ok(None)` means no TLS listener serves it; a listener that does but
    /// whose secret does not exist yet is [`ClusterError::CertificateNotReady`].
    pub async fn tls_secret(&self, hostname: &str) -> ClusterResult<Option<Secret>> {
        let Some(secret_name) =
            certificate_secret_name(&self.handle.document().spec.listeners, hostname)
        else {
            return Ok(None);
        };

        let resource = Secret::api_resource();
        match self
            .handle
            .context()
            .api()
            .get(&resource, secret_name, self.namespace())
            .await
        {
            Ok(obj) => from_dynamic(&resource.kind, obj).map(Some),
            Err(e) if e.is_not_found() => Err(ClusterError::CertificateNotReady {
                hostname: hostname.to_string(),
                secret: secret_name.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Certificate served for `hostname`, if any listener serves it with TLS
    pub async fn tls_cert(&self, hostname: &str) -> ClusterResult<Option<Certificate>> {
        match self.tls_secret(hostname).await? {
            Some(secret) => Certificate::from_secret(&secret).map(Some),
            None => Ok(None),
        }
    }

    /// Reference for policies targeting this gateway
    pub fn reference(&self) -> ObjectReference {
        ObjectReference {
            group: GATEWAY_API_GROUP.to_string(),
            kind: "Gateway".to_string(),
            name: self.name(),
        }
    }

    pub fn name(&self) -> String {
        self.handle.name()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.handle.namespace()
    }

    pub fn key(&self) -> ResourceKey {
        self.handle.key()
    }

    pub fn handle(&self) -> &Handle<Gateway> {
        &self.handle
    }

    pub fn handle_mut(&mut self) -> &mut Handle<Gateway> {
        &mut self.handle
    }
}
