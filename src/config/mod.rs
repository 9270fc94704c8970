//! Configuration module
//!
//! Harness settings: where the clusters are, which projects to use and how
//! long to wait for resources.

#![allow(dead_code)]

pub mod env;
pub mod file;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::k8s::{ClusterContext, GatewayHandle, MutationPolicy, SLOW_LOADBALANCER_DELAY};
use env::EnvConfig;
use file::is_yaml_file;

/// Harness settings
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Primary cluster
    pub cluster: ClusterSettings,

    /// Project for auxiliary tooling on the primary cluster
    pub tools: ToolsSettings,

    pub control_plane: ControlPlaneSettings,

    pub timeouts: TimeoutSettings,

    pub mutation: MutationSettings,
}

/// Connection to one cluster
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    /// Project (namespace) resources are created in
    pub project: Option<String>,

    /// API server URL, used together with `token`
    pub api_url: Option<String>,

    /// Bearer token for `api_url`
    pub token: Option<String>,

    /// Path to a kubeconfig file
    pub kubeconfig_path: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsSettings {
    pub project: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneSettings {
    /// Load balancers become reachable only some time after the gateway
    /// reports being programmed
    pub slow_loadbalancers: bool,

    /// Further clusters of a multi-cluster setup
    pub additional_clusters: Vec<ClusterSettings>,
}

/// Wait limits, in seconds
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub ready_secs: u64,
    pub poll_interval_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            ready_secs: 600,
            poll_interval_secs: 5,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MutationSettings {
    /// Update attempts before giving up on a conflicting resource
    pub attempts: u32,
}

impl Default for MutationSettings {
    fn default() -> Self {
        Self {
            attempts: crate::k8s::DEFAULT_ATTEMPTS,
        }
    }
}

/// Cluster contexts derived from [`Settings`]
#[derive(Clone, Debug)]
pub struct Contexts {
    pub cluster: ClusterContext,
    /// Primary cluster switched to the tools project, if one is configured
    pub tools: Option<ClusterContext>,
    pub additional_clusters: Vec<ClusterContext>,
}

impl Settings {
    /// Load settings from a YAML or JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let settings: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = if is_yaml_file(path) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Settings from `path`, or the first file found in the standard
    /// locations, with environment overrides applied
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        let env = EnvConfig::load();
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env.config_file.as_ref().map(Into::into))
            .or_else(file::find);

        let mut settings = match path {
            Some(path) => {
                debug!("Loading settings from {}", path.display());
                Self::load(path)?
            }
            None => Self::default(),
        };
        settings.apply_env(&env);
        settings.validate()?;
        Ok(settings)
    }

    /// Override settings with values set in the environment
    pub fn apply_env(&mut self, env: &EnvConfig) {
        let overrides = [
            (&mut self.cluster.project, &env.project),
            (&mut self.cluster.api_url, &env.api_url),
            (&mut self.cluster.token, &env.token),
            (&mut self.cluster.kubeconfig_path, &env.kubeconfig_path),
            (&mut self.tools.project, &env.tools_project),
        ];
        for (setting, value) in overrides {
            if value.is_some() {
                *setting = value.clone();
            }
        }

        if let Some(slow) = env.slow_loadbalancers {
            self.control_plane.slow_loadbalancers = slow;
        }
        if let Some(secs) = env.ready_timeout {
            self.timeouts.ready_secs = secs;
        }
        if let Some(secs) = env.poll_interval {
            self.timeouts.poll_interval_secs = secs;
        }
        if let Some(attempts) = env.mutation_attempts {
            self.mutation.attempts = attempts;
        }
    }

    /// Validate settings
    pub fn validate(&self) -> Result<()> {
        let clusters = std::iter::once(&self.cluster).chain(&self.control_plane.additional_clusters);
        for (index, cluster) in clusters.enumerate() {
            if cluster.api_url.is_some() != cluster.token.is_some() {
                anyhow::bail!(
                    "Cluster #{} must set both api_url and token, or neither",
                    index
                );
            }
        }

        if self.timeouts.poll_interval_secs == 0 {
            anyhow::bail!("timeouts.poll_interval_secs must be at least 1");
        }
        if self.mutation.attempts == 0 {
            anyhow::bail!("mutation.attempts must be at least 1");
        }
        Ok(())
    }

    /// Connect to every configured cluster
    pub async fn contexts(&self) -> Result<Contexts> {
        let cluster = ClusterContext::connect(&self.cluster)
            .await
            .context("Failed to connect to the primary cluster")?;
        let tools = self
            .tools
            .project
            .as_ref()
            .map(|project| cluster.change_project(project.clone()));

        let mut additional_clusters = Vec::new();
        for (index, settings) in self.control_plane.additional_clusters.iter().enumerate() {
            let context = ClusterContext::connect(settings)
                .await
                .with_context(|| format!("Failed to connect to additional cluster #{index}"))?;
            additional_clusters.push(context);
        }

        Ok(Contexts {
            cluster,
            tools,
            additional_clusters,
        })
    }

    /// Apply the configured waits and retries to a gateway handle
    pub fn configure_gateway(&self, gateway: GatewayHandle) -> GatewayHandle {
        gateway
            .with_poll_interval(self.poll_interval())
            .with_slow_loadbalancers(self.slow_loadbalancer_delay())
            .with_mutation_policy(self.mutation_policy())
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.ready_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.timeouts.poll_interval_secs)
    }

    pub fn mutation_policy(&self) -> MutationPolicy {
        MutationPolicy::default().with_attempts(self.mutation.attempts)
    }

    /// Extra wait after gateway readiness, when load balancers are slow
    pub fn slow_loadbalancer_delay(&self) -> Option<Duration> {
        self.control_plane
            .slow_loadbalancers
            .then_some(SLOW_LOADBALANCER_DELAY)
    }
}
