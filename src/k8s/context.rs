//! Cluster context
//!
//! Identifies the cluster and project a resource handle works against.
//! Contexts are cheap to clone; clones share the same backend.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde_json::json;
use tracing::info;

use super::client::{ClusterApi, KubeClusterApi};
use crate::config::file::expand_path;
use crate::config::ClusterSettings;

const INLINE_CONTEXT: &str = "kuadrant-harness";

/// Target cluster and project of resource handles
#[derive(Clone)]
pub struct ClusterContext {
    api: Arc<dyn ClusterApi>,
    project: String,
    cluster_id: String,
}

impl ClusterContext {
    /// Connect using the given settings.
    ///
    /// An API URL with a token takes precedence over a kubeconfig path;
    /// with neither, the ambient configuration is inferred.
    pub async fn connect(settings: &ClusterSettings) -> Result<Self> {
        let config = match (&settings.api_url, &settings.token, &settings.kubeconfig_path) {
            (Some(api_url), Some(token), _) => {
                let kubeconfig = inline_kubeconfig(api_url, token, settings.project.as_deref())?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .context("Failed to build config from API URL and token")?
            }
            (_, _, Some(path)) => {
                let kubeconfig = Kubeconfig::read_from(expand_path(path))
                    .with_context(|| format!("Failed to read kubeconfig: {path}"))?;
                Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .with_context(|| format!("Failed to load kubeconfig: {path}"))?
            }
            _ => Config::infer()
                .await
                .context("Failed to infer Kubernetes config")?,
        };

        let cluster_id = settings
            .api_url
            .clone()
            .or_else(|| settings.kubeconfig_path.clone())
            .unwrap_or_else(|| config.cluster_url.to_string());
        let project = settings
            .project
            .clone()
            .unwrap_or_else(|| config.default_namespace.clone());

        let client = Client::try_from(config).context("Failed to create Kubernetes client")?;
        info!("Connected to {} (project {})", cluster_id, project);

        Ok(Self::from_api(
            Arc::new(KubeClusterApi::new(client)),
            project,
            cluster_id,
        ))
    }

    /// Context over an existing cluster API
    pub fn from_api(
        api: Arc<dyn ClusterApi>,
        project: impl Into<String>,
        cluster_id: impl Into<String>,
    ) -> Self {
        Self {
            api,
            project: project.into(),
            cluster_id: cluster_id.into(),
        }
    }

    /// Same cluster, different project
    pub fn change_project(&self, project: impl Into<String>) -> Self {
        Self {
            api: Arc::clone(&self.api),
            project: project.into(),
            cluster_id: self.cluster_id.clone(),
        }
    }

    pub fn api(&self) -> &dyn ClusterApi {
        self.api.as_ref()
    }

    /// Namespace new resources are created in
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Identifies the cluster independently of the project
    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }
}

impl fmt::Debug for ClusterContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterContext")
            .field("cluster_id", &self.cluster_id)
            .field("project", &self.project)
            .finish()
    }
}

fn inline_kubeconfig(api_url: &str, token: &str, project: Option<&str>) -> Result<Kubeconfig> {
    let mut context = json!({ "cluster": INLINE_CONTEXT, "user": INLINE_CONTEXT });
    if let Some(project) = project {
        context["namespace"] = json!(project);
    }
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Config",
        "clusters": [{ "name": INLINE_CONTEXT, "cluster": { "server": api_url } }],
        "users": [{ "name": INLINE_CONTEXT, "user": { "token": token } }],
        "contexts": [{ "name": INLINE_CONTEXT, "context": context }],
        "current-context": INLINE_CONTEXT,
    }))
    .context("Failed to build kubeconfig")
}
