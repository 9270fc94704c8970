//! Cluster API client
//!
//! The primitives resource handles need from a cluster, and their
//! implementation on top of the Kubernetes API.

use async_trait::async_trait;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

use super::document::ResourceKey;
use super::error::{ClusterError, ClusterResult};

/// Object retrieval and mutation primitives of a cluster
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Fetch a single object
    async fn get(
        &self,
        resource: &ApiResource,
        name: &str,
        namespace: Option<&str>,
    ) -> ClusterResult<DynamicObject>;

    /// Create an object, returning what the cluster stored
    async fn create(
        &self,
        resource: &ApiResource,
        document: &DynamicObject,
    ) -> ClusterResult<DynamicObject>;

    /// Replace an object; a stale `resourceVersion` yields [`ClusterError::Conflict`]
    async fn update(
        &self,
        resource: &ApiResource,
        document: &DynamicObject,
    ) -> ClusterResult<DynamicObject>;

    /// Delete an object. Returns `false` if it was already gone and
    /// `ignore_not_found` is set.
    async fn delete(
        &self,
        resource: &ApiResource,
        name: &str,
        namespace: Option<&str>,
        ignore_not_found: bool,
    ) -> ClusterResult<bool>;

    /// List objects, optionally filtered by a label selector
    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> ClusterResult<Vec<DynamicObject>>;
}

/// [`ClusterApi`] backed by a kube client
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Get the underlying kube client
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn api(&self, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, resource),
            None => Api::all_with(self.client.clone(), resource),
        }
    }
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn get(
        &self,
        resource: &ApiResource,
        name: &str,
        namespace: Option<&str>,
    ) -> ClusterResult<DynamicObject> {
        let key = ResourceKey::new(resource.kind.clone(), namespace, name);
        debug!("Getting {}", key);
        self.api(resource, namespace)
            .get(name)
            .await
            .map_err(|e| ClusterError::from_kube(key, e, false))
    }

    async fn create(
        &self,
        resource: &ApiResource,
        document: &DynamicObject,
    ) -> ClusterResult<DynamicObject> {
        let key = ResourceKey::of_dynamic(resource, document);
        debug!("Creating {}", key);
        self.api(resource, document.metadata.namespace.as_deref())
            .create(&PostParams::default(), document)
            .await
            .map_err(|e| ClusterError::from_kube(key, e, false))
    }

    async fn update(
        &self,
        resource: &ApiResource,
        document: &DynamicObject,
    ) -> ClusterResult<DynamicObject> {
        let key = ResourceKey::of_dynamic(resource, document);
        debug!(
            "Replacing {} at resourceVersion {:?}",
            key,
            document.resource_version()
        );
        self.api(resource, document.metadata.namespace.as_deref())
            .replace(&document.name_any(), &PostParams::default(), document)
            .await
            .map_err(|e| ClusterError::from_kube(key, e, true))
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        name: &str,
        namespace: Option<&str>,
        ignore_not_found: bool,
    ) -> ClusterResult<bool> {
        let key = ResourceKey::new(resource.kind.clone(), namespace, name);
        debug!("Deleting {}", key);
        match self
            .api(resource, namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(e)) if e.code == 404 && ignore_not_found => Ok(false),
            Err(e) => Err(ClusterError::from_kube(key, e, false)),
        }
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        label_selector: Option<&str>,
    ) -> ClusterResult<Vec<DynamicObject>> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }
        let list = self
            .api(resource, namespace)
            .list(&params)
            .await
            .map_err(ClusterError::Api)?;
        Ok(list.items)
    }
}
