//! Kubernetes-backed collaborators: Service discovery and the tenant port registry.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod registry;
mod services;

pub use self::{registry::NamespaceRegistry, services::KubeServices};
pub use k8s_openapi::api::core::v1::{Namespace, Service, ServicePort, ServiceSpec};
pub use kube::{api::ObjectMeta, Client};
