//! Kubernetes resource handles
//!
//! Typed resource documents bound to a cluster context, with optimistic
//! updates, condition polling and Gateway-specific resolution logic.

#![allow(dead_code)]

mod client;
mod context;
mod deployment;
mod document;
mod error;
mod gateway;
mod gateway_class;
mod handle;
mod hpa;
mod mutation;
mod poller;
mod service;
mod tls;

#[cfg(test)]
pub(crate) mod testing;

pub use context::ClusterContext;
pub use document::describe_conditions;
pub use gateway::{GatewayHandle, ListenerSpec, SLOW_LOADBALANCER_DELAY};
pub use gateway_class::GatewayClassResolver;
pub use mutation::{MutationPolicy, DEFAULT_ATTEMPTS};
