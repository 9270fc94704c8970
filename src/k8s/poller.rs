//! Condition polling
//!
//! Bounded waiting for a predicate over a repeatedly refreshed resource.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use super::document::Manifest;
use super::error::ClusterResult;
use super::handle::Handle;

/// Default limit for generic readiness waits
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default delay between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Time limit and interval of a wait
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollConfig {
    pub time_limit: Duration,
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            time_limit: DEFAULT_READY_TIMEOUT,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PollConfig {
    pub fn new(time_limit: Duration, interval: Duration) -> Self {
        Self {
            time_limit,
            interval,
        }
    }

    pub fn time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = time_limit;
        self
    }
}

impl<K: Manifest> Handle<K> {
    /// Refresh and evaluate `predicate` until it holds or `time_limit`
    /// passes. Returns `Ok(false)` on timeout; refresh failures are errors.
    ///
    /// The limit is checked between polls, so a slow refresh can overrun it.
    pub async fn wait_until<P>(
        &mut self,
        mut predicate: P,
        time_limit: Duration,
        poll_interval: Duration,
    ) -> ClusterResult<bool>
    where
        P: FnMut(&K) -> bool,
    {
        let start = Instant::now();
        let mut polls = 0u32;

        loop {
            polls += 1;
            if predicate(self.refresh().await?) {
                debug!(
                    "{} satisfied condition after {} polls ({:?})",
                    self.key(),
                    polls,
                    start.elapsed()
                );
                return Ok(true);
            }

            let elapsed = start.elapsed();
            if elapsed >= time_limit {
                debug!(
                    "{} did not satisfy condition within {:?} ({} polls)",
                    self.key(),
                    time_limit,
                    polls
                );
                return Ok(false);
            }
            sleep(poll_interval.min(time_limit - elapsed)).await;
        }
    }

    /// [`Handle::wait_until`] with a [`PollConfig`]
    pub async fn wait_with<P>(&mut self, predicate: P, config: PollConfig) -> ClusterResult<bool>
    where
        P: FnMut(&K) -> bool,
    {
        self.wait_until(predicate, config.time_limit, config.interval)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::testing::FakeCluster;
    use k8s_openapi::api::core::v1::ConfigMap;
    use std::collections::BTreeMap;

    async fn committed(cluster: &FakeCluster) -> Handle<ConfigMap> {
        let mut map = ConfigMap::default();
        map.metadata.name = Some("settings".to_string());
        map.data = Some(BTreeMap::from([("phase".to_string(), "pending".to_string())]));
        Handle::create(&cluster.context("default"), map).await.unwrap()
    }

    fn phase_is(expected: &'static str) -> impl FnMut(&ConfigMap) -> bool {
        move |map| {
            map.data
                .as_ref()
                .and_then(|d| d.get("phase"))
                .is_some_and(|p| p == expected)
        }
    }

    #[tokio::test]
    async fn test_wait_until_observes_later_change() {
        let cluster = FakeCluster::new();
        let mut handle = committed(&cluster).await;
        cluster.change_after_gets(&handle.key(), 3, |obj| {
            obj.data["data"]["phase"] = serde_json::json!("done");
        });

        let ok = handle
            .wait_until(phase_is("done"), Duration::from_secs(5), Duration::from_millis(5))
            .await
            .unwrap();

        assert!(ok);
        assert_eq!(cluster.count_calls("get"), 3);
    }

    #[tokio::test]
    async fn test_wait_until_times_out_without_error() {
        let cluster = FakeCluster::new();
        let mut handle = committed(&cluster).await;

        let ok = handle
            .wait_until(phase_is("done"), Duration::from_millis(50), Duration::from_millis(10))
            .await
            .unwrap();

        assert!(!ok);
        assert!(cluster.count_calls("get") >= 2);
    }

    #[tokio::test]
    async fn test_predicate_always_sees_fresh_document() {
        let cluster = FakeCluster::new();
        let mut handle = committed(&cluster).await;
        let mut versions = Vec::new();

        let ok = handle
            .wait_until(
                |map: &ConfigMap| {
                    versions.push(map.metadata.resource_version.clone());
                    versions.len() == 2
                },
                Duration::from_secs(5),
                Duration::from_millis(1),
            )
            .await
            .unwrap();

        assert!(ok);
        assert_eq!(versions.len(), 2);
        assert_eq!(cluster.count_calls("get"), 2);
    }

    #[tokio::test]
    async fn test_wait_propagates_missing_resource() {
        let cluster = FakeCluster::new();
        let mut handle = committed(&cluster).await;
        handle.delete(false).await.unwrap();

        let err = handle
            .wait_with(phase_is("done"), PollConfig::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_default_poll_config() {
        let config = PollConfig::default();
        assert_eq!(config.time_limit, Duration::from_secs(600));
        assert_eq!(config.interval, Duration::from_secs(5));
    }
}
