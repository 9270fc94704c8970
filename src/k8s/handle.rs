//! Declarative resource handle
//!
//! A [`Handle`] pairs one typed resource document with the cluster context
//! it lives in, and exposes create/refresh/delete over it.

use std::time::Duration;

use kube::ResourceExt;
use tracing::{debug, info};

use super::context::ClusterContext;
use super::document::{from_dynamic, to_dynamic, Manifest, ResourceKey};
use super::error::ClusterResult;
use super::mutation::{optimistic_update, MutationPolicy};
use super::poller::DEFAULT_POLL_INTERVAL;

/// A resource document bound to a cluster context
#[derive(Clone, Debug)]
pub struct Handle<K> {
    context: ClusterContext,
    document: K,
    mutation_policy: MutationPolicy,
    poll_interval: Duration,
}

impl<K: Manifest> Handle<K> {
    /// Wrap an in-memory document. Nothing is sent to the cluster until
    /// [`Handle::commit`]; documents without a namespace land in the
    /// context's project.
    pub fn new(context: &ClusterContext, mut document: K) -> Self {
        if document.meta().namespace.is_none() {
            document.meta_mut().namespace = Some(context.project().to_string());
        }
        Self {
            context: context.clone(),
            document,
            mutation_policy: MutationPolicy::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Submit `document` and return a handle to the stored resource
    pub async fn create(context: &ClusterContext, document: K) -> ClusterResult<Self> {
        let mut handle = Self::new(context, document);
        handle.commit().await?;
        Ok(handle)
    }

    pub fn with_mutation_policy(mut self, policy: MutationPolicy) -> Self {
        self.mutation_policy = policy;
        self
    }

    /// Delay between polls of the readiness waits built on this handle
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Create the resource in the cluster
    pub async fn commit(&mut self) -> ClusterResult<&K> {
        let resource = K::api_resource();
        let stored = self
            .context
            .api()
            .create(&resource, &to_dynamic(&self.document)?)
            .await?;
        self.document = from_dynamic(&resource.kind, stored)?;
        info!("Created {}", self.key());
        Ok(&self.document)
    }

    /// Replace the in-memory document with the cluster's current state
    pub async fn refresh(&mut self) -> ClusterResult<&K> {
        let resource = K::api_resource();
        let current = self
            .context
            .api()
            .get(&resource, &self.name(), self.namespace())
            .await?;
        self.document = from_dynamic(&resource.kind, current)?;
        Ok(&self.document)
    }

    /// Delete the resource. With `ignore_not_found`, a resource that is
    /// already gone yields `Ok(false)`.
    pub async fn delete(&self, ignore_not_found: bool) -> ClusterResult<bool> {
        let deleted = self
            .context
            .api()
            .delete(
                &K::api_resource(),
                &self.name(),
                self.namespace(),
                ignore_not_found,
            )
            .await?;
        if deleted {
            info!("Deleted {}", self.key());
        } else {
            debug!("{} was already gone", self.key());
        }
        Ok(deleted)
    }

    /// Apply `mutate` to the live resource under optimistic concurrency.
    /// `mutate` may run several times, each time on a freshly read document.
    pub async fn modify<F>(&mut self, mutate: F) -> ClusterResult<&K>
    where
        F: FnMut(&mut K),
    {
        let key = self.key();
        self.document =
            optimistic_update(self.context.api(), &key, &self.mutation_policy, mutate).await?;
        Ok(&self.document)
    }

    pub fn name(&self) -> String {
        self.document.name_any()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.document.meta().namespace.as_deref()
    }

    pub fn key(&self) -> ResourceKey {
        self.document.key()
    }

    /// Last observed (or not yet committed) document
    pub fn document(&self) -> &K {
        &self.document
    }

    /// Edit the in-memory document before it is committed
    pub fn document_mut(&mut self) -> &mut K {
        &mut self.document
    }

    pub fn context(&self) -> &ClusterContext {
        &self.context
    }

    pub fn mutation_policy(&self) -> &MutationPolicy {
        &self.mutation_policy
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
