//! Environment variable configuration
//!
//! Provides environment variable overrides for settings.

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "KUADRANT_HARNESS";

/// Settings overrides from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Project from KUADRANT_HARNESS_PROJECT
    pub project: Option<String>,
    /// API URL from KUADRANT_HARNESS_API_URL
    pub api_url: Option<String>,
    /// Token from KUADRANT_HARNESS_TOKEN
    pub token: Option<String>,
    /// Kubeconfig from KUADRANT_HARNESS_KUBECONFIG, falling back to KUBECONFIG
    pub kubeconfig_path: Option<String>,
    /// Tools project from KUADRANT_HARNESS_TOOLS_PROJECT
    pub tools_project: Option<String>,
    /// From KUADRANT_HARNESS_SLOW_LOADBALANCERS
    pub slow_loadbalancers: Option<bool>,
    /// Ready timeout in seconds from KUADRANT_HARNESS_READY_TIMEOUT
    pub ready_timeout: Option<u64>,
    /// Poll interval in seconds from KUADRANT_HARNESS_POLL_INTERVAL
    pub poll_interval: Option<u64>,
    /// From KUADRANT_HARNESS_MUTATION_ATTEMPTS
    pub mutation_attempts: Option<u32>,
    /// Config file from KUADRANT_HARNESS_CONFIG
    pub config_file: Option<String>,
    /// Verbose from KUADRANT_HARNESS_VERBOSE
    pub verbose: Option<bool>,
    /// Log level from KUADRANT_HARNESS_LOG_LEVEL
    pub log_level: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            project: get_env("PROJECT"),
            api_url: get_env("API_URL"),
            token: get_env("TOKEN"),
            kubeconfig_path: get_env("KUBECONFIG").or_else(|| env::var("KUBECONFIG").ok()),
            tools_project: get_env("TOOLS_PROJECT"),
            slow_loadbalancers: get_env_bool("SLOW_LOADBALANCERS"),
            ready_timeout: get_env_parse("READY_TIMEOUT"),
            poll_interval: get_env_parse("POLL_INTERVAL"),
            mutation_attempts: get_env_parse("MUTATION_ATTEMPTS"),
            config_file: get_env("CONFIG"),
            verbose: get_env_bool("VERBOSE"),
            log_level: get_env("LOG_LEVEL"),
        }
    }

    /// Check if any override is set
    pub fn has_any(&self) -> bool {
        self.project.is_some()
            || self.api_url.is_some()
            || self.token.is_some()
            || self.kubeconfig_path.is_some()
            || self.tools_project.is_some()
            || self.slow_loadbalancers.is_some()
            || self.ready_timeout.is_some()
            || self.poll_interval.is_some()
            || self.mutation_attempts.is_some()
            || self.config_file.is_some()
            || self.verbose.is_some()
            || self.log_level.is_some()
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        let token = self.token.as_ref().map(|_| "<redacted>");
        println!("Environment Configuration:");
        println!("  {}_PROJECT:            {:?}", ENV_PREFIX, self.project);
        println!("  {}_API_URL:            {:?}", ENV_PREFIX, self.api_url);
        println!("  {}_TOKEN:              {:?}", ENV_PREFIX, token);
        println!("  {}_KUBECONFIG:         {:?}", ENV_PREFIX, self.kubeconfig_path);
        println!("  {}_TOOLS_PROJECT:      {:?}", ENV_PREFIX, self.tools_project);
        println!("  {}_SLOW_LOADBALANCERS: {:?}", ENV_PREFIX, self.slow_loadbalancers);
        println!("  {}_READY_TIMEOUT:      {:?}", ENV_PREFIX, self.ready_timeout);
        println!("  {}_POLL_INTERVAL:      {:?}", ENV_PREFIX, self.poll_interval);
        println!("  {}_MUTATION_ATTEMPTS:  {:?}", ENV_PREFIX, self.mutation_attempts);
        println!("  {}_CONFIG:             {:?}", ENV_PREFIX, self.config_file);
        println!("  {}_VERBOSE:            {:?}", ENV_PREFIX, self.verbose);
        println!("  {}_LOG_LEVEL:          {:?}", ENV_PREFIX, self.log_level);
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Builder for setting environment variables in tests
#[cfg(test)]
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

#[cfg(test)]
impl EnvBuilder {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    /// Set `KUADRANT_HARNESS_<name>`
    pub fn var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_{name}"), value.into()));
        self
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        for (key, value) in self.vars {
            env::set_var(key, value);
        }

        EnvGuard { previous }
    }
}

/// Guard that restores environment variables on drop
#[cfg(test)]
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

#[cfg(test)]
impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}

/// Print all KUADRANT_HARNESS environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_PROJECT             Project resources are created in");
    println!("  {ENV_PREFIX}_API_URL             API server URL (requires TOKEN)");
    println!("  {ENV_PREFIX}_TOKEN               Bearer token for API_URL");
    println!("  {ENV_PREFIX}_KUBECONFIG          Path to kubeconfig file (falls back to KUBECONFIG)");
    println!("  {ENV_PREFIX}_TOOLS_PROJECT       Project with auxiliary tooling");
    println!("  {ENV_PREFIX}_SLOW_LOADBALANCERS  Wait for load balancers after readiness (true/false)");
    println!("  {ENV_PREFIX}_READY_TIMEOUT       Readiness timeout in seconds");
    println!("  {ENV_PREFIX}_POLL_INTERVAL       Poll interval in seconds");
    println!("  {ENV_PREFIX}_MUTATION_ATTEMPTS   Update attempts on conflicts");
    println!("  {ENV_PREFIX}_CONFIG              Path to configuration file");
    println!("  {ENV_PREFIX}_VERBOSE             Enable verbose output (true/false)");
    println!("  {ENV_PREFIX}_LOG_LEVEL           Log level: trace, debug, info, warn, error");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_PROJECT=kuadrant");
    println!("  export {ENV_PREFIX}_SLOW_LOADBALANCERS=true");
    println!("  kuadrant-harness gateway create my-gateway --hostname '*.example.com'");
}
