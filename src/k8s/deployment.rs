//! Deployment handles
//!
//! Replica scaling and rollout readiness.

use std::time::Duration;

use k8s_openapi::api::apps::v1::Deployment;
use tracing::info;

use super::error::{ClusterError, ClusterResult};
use super::handle::Handle;

/// Whether every desired replica reports ready
pub fn is_rolled_out(deployment: &Deployment) -> bool {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let ready = deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    ready == desired
}

impl Handle<Deployment> {
    /// Scale to `replicas` on the live resource
    pub async fn set_replicas(&mut self, replicas: i32) -> ClusterResult<&Deployment> {
        info!("Scaling {} to {} replicas", self.key(), replicas);
        self.modify(|deployment: &mut Deployment| {
            deployment.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
        })
        .await
    }

    /// Replicas the controller last reported
    pub fn replicas(&self) -> i32 {
        self.document()
            .status
            .as_ref()
            .and_then(|s| s.replicas)
            .unwrap_or(0)
    }

    pub fn is_ready(&self) -> bool {
        is_rolled_out(self.document())
    }

    /// Wait until every replica is ready, polling at the handle's interval
    pub async fn wait_for_ready(&mut self, timeout: Duration) -> ClusterResult<()> {
        let interval = self.poll_interval();
        if self
            .wait_until(is_rolled_out, timeout, interval)
            .await?
        {
            return Ok(());
        }

        let status = self.document().status.clone().unwrap_or_default();
        Err(ClusterError::NotReady {
            key: self.key(),
            state: format!(
                "{} of {} replicas ready",
                status.ready_replicas.unwrap_or(0),
                status.replicas.unwrap_or(0)
            ),
        })
    }
}
