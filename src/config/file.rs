//! Configuration file discovery
//!
//! Finds the settings file in standard locations and generates examples.

use std::path::{Path, PathBuf};

use super::{ClusterSettings, ControlPlaneSettings, Settings, ToolsSettings};

/// Configuration file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./kuadrant-harness.yaml",
    "./kuadrant-harness.yml",
    "./.kuadrant-harness.yaml",
    "~/.config/kuadrant-harness/config.yaml",
];

/// Default location for `config init`
pub const DEFAULT_CONFIG_PATH: &str = "~/.config/kuadrant-harness/config.yaml";

/// First existing settings file in the standard locations
pub fn find() -> Option<PathBuf> {
    CONFIG_LOCATIONS
        .iter()
        .map(|location| expand_path(location))
        .find(|path| path.exists())
}

/// Example settings written by `config init`
pub fn example() -> Settings {
    Settings {
        cluster: ClusterSettings {
            project: Some("kuadrant".to_string()),
            kubeconfig_path: Some("~/.kube/config".to_string()),
            ..Default::default()
        },
        tools: ToolsSettings {
            project: Some("tools".to_string()),
        },
        control_plane: ControlPlaneSettings {
            slow_loadbalancers: false,
            additional_clusters: vec![ClusterSettings {
                project: Some("kuadrant".to_string()),
                api_url: Some("https://api.second.example.com:6443".to_string()),
                token: Some("sha256~replace-me".to_string()),
                ..Default::default()
            }],
        },
        ..Default::default()
    }
}

/// Expand ~ to home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Check if file is YAML based on extension
pub fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}
