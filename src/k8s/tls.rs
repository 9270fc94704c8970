//! TLS resolution for Gateway listeners
//!
//! Maps a request hostname to the certificate secret of the listener that
//! serves it.

use eater_domainmatcher::DomainPattern;
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use tracing::{debug, warn};

use super::error::{ClusterError, ClusterResult};
use super::gateway::ListenerSpec;

/// Key of the private key in a TLS secret
pub const TLS_KEY: &str = "tls.key";
/// Key of the certificate in a TLS secret
pub const TLS_CERT: &str = "tls.crt";
/// Key of the optional CA chain in a TLS secret
pub const CA_CERT: &str = "ca.crt";

/// Whether `hostname` is served by a listener with hostname `pattern`.
///
/// `*.suffix` matches subdomains of `suffix` at any depth but not `suffix`
/// itself; anything else must match exactly. Comparison ignores ASCII case.
pub fn domain_match(hostname: &str, pattern: &str) -> bool {
    if hostname.eq_ignore_ascii_case(pattern) {
        return true;
    }
    let Some(suffix) = pattern.strip_prefix("*.") else {
        return false;
    };

    let wildcard = format!("**+.{}", suffix.to_ascii_lowercase());
    match DomainPattern::<'_, '.'>::try_from(wildcard.as_str()) {
        Ok(domain_pattern) => domain_pattern.matches(&hostname.to_ascii_lowercase()),
        Err(_) => {
            warn!("Listener hostname is not a valid domain: {}", pattern);
            false
        }
    }
}

/// Listeners that carry TLS configuration, in declaration order
pub fn tls_listeners(listeners: &[ListenerSpec]) -> Vec<&ListenerSpec> {
    listeners.iter().filter(|l| l.tls.is_some()).collect()
}

/// Name of the certificate secret serving `hostname`.
///
/// When several TLS listeners match, the last one declared wins. A
/// listener without a hostname serves every hostname.
pub fn certificate_secret_name<'a>(listeners: &'a [ListenerSpec], hostname: &str) -> Option<&'a str> {
    let mut secret = None;
    for listener in tls_listeners(listeners) {
        let matches = listener
            .hostname
            .as_deref()
            .map_or(true, |pattern| domain_match(hostname, pattern));
        if !matches {
            continue;
        }
        if let Some(first) = listener
            .tls
            .as_ref()
            .and_then(|tls| tls.certificate_refs.first())
        {
            debug!(
                "Listener {} serves {} with secret {}",
                listener.name, hostname, first.name
            );
            secret = Some(first.name.as_str());
        }
    }
    secret
}

/// PEM material of a TLS secret
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Certificate {
    pub key: String,
    pub certificate: String,
    pub chain: Option<String>,
}

impl Certificate {
    /// Decode `tls.key`, `tls.crt` and the optional `ca.crt`
    pub fn from_secret(secret: &Secret) -> ClusterResult<Self> {
        let entry = |key: &str| {
            secret
                .data
                .as_ref()
                .and_then(|data| data.get(key))
                .map(|bytes| String::from_utf8_lossy(&bytes.0).into_owned())
        };
        let missing = |key: &str| {
            ClusterError::Configuration(format!("Secret {} has no {key}", secret.name_any()))
        };

        Ok(Self {
            key: entry(TLS_KEY).ok_or_else(|| missing(TLS_KEY))?,
            certificate: entry(TLS_CERT).ok_or_else(|| missing(TLS_CERT))?,
            chain: entry(CA_CERT),
        })
    }
}
