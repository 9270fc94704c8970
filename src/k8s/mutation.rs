//! Optimistic mutation
//!
//! Applies a mutation closure to the freshest copy of a resource and
//! submits it, retrying from a fresh read whenever the cluster reports
//! that another writer got there first.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use super::client::ClusterApi;
use super::document::{from_dynamic, to_dynamic, Manifest, ResourceKey};
use super::error::{ClusterError, ClusterResult};

/// Default number of update attempts
pub const DEFAULT_ATTEMPTS: u32 = 5;

const INITIAL_BACKOFF_MILLIS: u64 = 100;
const MAX_BACKOFF_MILLIS: u64 = 2000;
const BACKOFF_MULTIPLIER: f64 = 2.0;
const RANDOMIZATION_FACTOR: f64 = 0.1;

/// How conflicting updates are retried
#[derive(Clone, Debug, PartialEq)]
pub struct MutationPolicy {
    /// Total update attempts, the first one included
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Jitter applied to each backoff (0.1 = ±10%)
    pub randomization_factor: f64,
}

impl Default for MutationPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MILLIS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MILLIS),
            randomization_factor: RANDOMIZATION_FACTOR,
        }
    }
}

impl MutationPolicy {
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    /// Retry immediately, without sleeping between attempts
    pub fn without_backoff(mut self) -> Self {
        self.initial_backoff = Duration::ZERO;
        self.max_backoff = Duration::ZERO;
        self
    }

    fn backoff(&self) -> Backoff {
        Backoff {
            current: self.initial_backoff,
            max: self.max_backoff,
            randomization_factor: self.randomization_factor,
        }
    }
}

/// Exponential backoff with jitter
struct Backoff {
    current: Duration,
    max: Duration,
    randomization_factor: f64,
}

impl Backoff {
    fn next_backoff(&mut self) -> Duration {
        let interval = self.current;
        self.current = interval.mul_f64(BACKOFF_MULTIPLIER).min(self.max);

        if interval.is_zero() || self.randomization_factor == 0.0 {
            return interval;
        }
        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;
        let jittered = rand::rng().random_range((secs - delta)..=(secs + delta));
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Read-modify-write `key` until the update is accepted.
///
/// Every attempt starts from a fresh read, so `mutate` may run more than
/// once and must only touch the document it is given. Errors other than
/// conflicts are returned as they are.
pub async fn optimistic_update<K, F>(
    api: &dyn ClusterApi,
    key: &ResourceKey,
    policy: &MutationPolicy,
    mut mutate: F,
) -> ClusterResult<K>
where
    K: Manifest,
    F: FnMut(&mut K),
{
    let resource = K::api_resource();
    let mut backoff = policy.backoff();
    let attempts = policy.attempts.max(1);

    for attempt in 1..=attempts {
        let current = api
            .get(&resource, &key.name, key.namespace.as_deref())
            .await?;
        let mut document: K = from_dynamic(&resource.kind, current)?;
        mutate(&mut document);

        match api.update(&resource, &to_dynamic(&document)?).await {
            Ok(stored) => {
                debug!("Updated {} on attempt {}", key, attempt);
                return from_dynamic(&resource.kind, stored);
            }
            Err(e) if e.is_conflict() => {
                if attempt < attempts {
                    let delay = backoff.next_backoff();
                    debug!(
                        "Conflict updating {} (attempt {}/{}), retrying in {:?}",
                        key, attempt, attempts, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    warn!("Giving up on {} after {} conflicting updates", key, attempts);
    Err(ClusterError::ConcurrentModification {
        key: key.clone(),
        attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::testing::FakeCluster;
    use k8s_openapi::api::core::v1::ConfigMap;
    use std::collections::BTreeMap;

    fn config_map(name: &str) -> ConfigMap {
        let mut map = ConfigMap::default();
        map.metadata.name = Some(name.to_string());
        map.metadata.namespace = Some("default".to_string());
        map.data = Some(BTreeMap::new());
        map
    }

    fn seeded(name: &str) -> (FakeCluster, ResourceKey) {
        let cluster = FakeCluster::new();
        let map = config_map(name);
        cluster.insert(&ConfigMap::api_resource(), to_dynamic(&map).unwrap());
        (cluster, map.key())
    }

    fn set(key: &'static str, value: &'static str) -> impl FnMut(&mut ConfigMap) {
        move |map| {
            map.data
                .get_or_insert_with(BTreeMap::new)
                .insert(key.to_string(), value.to_string());
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = MutationPolicy {
            randomization_factor: 0.0,
            ..Default::default()
        };
        let mut backoff = policy.backoff();
        let delays: Vec<_> = (0..7).map(|_| backoff.next_backoff().as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1600, 2000, 2000]);
    }

    #[test]
    fn test_backoff_jitter_bounds() {
        let mut backoff = MutationPolicy::default().backoff();
        let first = backoff.next_backoff();
        assert!(first >= Duration::from_millis(90) && first <= Duration::from_millis(110));
    }

    #[tokio::test]
    async fn test_sequential_mutations_keep_both_effects() {
        let (cluster, key) = seeded("settings");
        let policy = MutationPolicy::default();

        let _: ConfigMap = optimistic_update(&cluster, &key, &policy, set("a", "1"))
            .await
            .unwrap();
        let last: ConfigMap = optimistic_update(&cluster, &key, &policy, set("b", "2"))
            .await
            .unwrap();

        let data = last.data.unwrap();
        assert_eq!(data["a"], "1");
        assert_eq!(data["b"], "2");
    }

    #[tokio::test]
    async fn test_conflict_then_success_reruns_mutation_on_fresh_snapshot() {
        let (cluster, key) = seeded("settings");
        cluster.inject_conflicts(1);

        let mut seen_versions = Vec::new();
        let policy = MutationPolicy::default().without_backoff();
        let result: ConfigMap = optimistic_update(&cluster, &key, &policy, |map: &mut ConfigMap| {
            seen_versions.push(map.metadata.resource_version.clone());
            set("a", "1")(map);
        })
        .await
        .unwrap();

        assert_eq!(seen_versions.len(), 2);
        assert_ne!(seen_versions[0], seen_versions[1]);
        assert_eq!(result.data.unwrap()["a"], "1");
        assert_eq!(cluster.count_calls("update"), 2);
    }

    #[tokio::test]
    async fn test_exhausted_attempts() {
        let (cluster, key) = seeded("settings");
        cluster.inject_conflicts(10);

        let policy = MutationPolicy::default().with_attempts(3).without_backoff();
        let err = optimistic_update::<ConfigMap, _>(&cluster, &key, &policy, set("a", "1"))
            .await
            .unwrap_err();

        match err {
            ClusterError::ConcurrentModification { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(cluster.count_calls("update"), 3);
        assert_eq!(cluster.count_calls("get"), 3);
    }

    #[tokio::test]
    async fn test_missing_resource_is_not_retried() {
        let cluster = FakeCluster::new();
        let key = config_map("missing").key();

        let err = optimistic_update::<ConfigMap, _>(
            &cluster,
            &key,
            &MutationPolicy::default(),
            set("a", "1"),
        )
        .await
        .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(cluster.count_calls("update"), 0);
    }

    #[tokio::test]
    async fn test_external_change_is_visible_to_mutation() {
        let (cluster, key) = seeded("settings");
        cluster.mutate(&key, |obj| {
            obj.data["data"]["external"] = serde_json::json!("yes");
        });

        let result: ConfigMap =
            optimistic_update(&cluster, &key, &MutationPolicy::default(), set("a", "1"))
                .await
                .unwrap();

        let data = result.data.unwrap();
        assert_eq!(data["external"], "yes");
        assert_eq!(data["a"], "1");
    }
}
