//! Discovers the NodePort currently serving a tenant's front-end.

use crate::{poll::poll_until, Protocol, ResolvedEndpoint, TenantId};
use anyhow::Result;
use regex::Regex;
use std::{num::NonZeroU16, ops::ControlFlow};
use tokio::time;
use tracing::{debug, info, instrument, warn};

/// Read-only access to the cluster's Services.
#[async_trait::async_trait]
pub trait ServiceLookup: Send + Sync {
    async fn list_services(&self, namespace: &str) -> Result<Vec<ServiceInfo>>;

    async fn namespace_exists(&self, namespace: &str) -> Result<bool>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceInfo {
    pub name: String,
    pub ports: Vec<ServicePortInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServicePortInfo {
    /// The catalog label on the port, e.g. `tcp` or `tcp-api`.
    pub logical_name: Option<String>,
    pub declared_port: u16,
    /// `None` until the cluster has allocated a NodePort.
    pub external_port: Option<NonZeroU16>,
    pub protocol: Protocol,
}

#[derive(Clone, Debug)]
pub struct ResolverConfig {
    /// Host through which the proxy reaches NodePorts.
    pub backend_host: String,

    /// Matches the names of tenant front-end Services.
    pub services: Regex,

    pub poll_interval: time::Duration,
}

#[derive(Clone, Debug)]
pub struct Resolver<L> {
    lookup: L,
    config: ResolverConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    Found(ResolvedEndpoint),

    /// No matching Service declares the port: there is nothing to provision.
    NotFound,

    /// No NodePort was seen before the deadline. `last_error` holds the failure of the final
    /// lookup, if it failed.
    Timeout { last_error: Option<String> },
}

enum PortState {
    Found(ResolvedEndpoint),
    NotFound,
    Pending,
}

// === impl Resolver ===

impl<L: ServiceLookup> Resolver<L> {
    pub fn new(lookup: L, config: ResolverConfig) -> Self {
        Self { lookup, config }
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    /// Waits for `logical_port` on the tenant's front-end Service to have a NodePort.
    ///
    /// Lookup errors are logged and retried until the deadline; if the final lookup failed, its
    /// error is kept in [`Resolution::Timeout`]. Nothing is cached between calls.
    #[instrument(skip_all, fields(%tenant, %logical_port))]
    pub async fn resolve(
        &self,
        tenant: &TenantId,
        logical_port: &str,
        deadline: time::Instant,
    ) -> Resolution {
        let interval = self.config.poll_interval;
        let polled = poll_until(interval, deadline, move || async move {
            match self.find_port(tenant, logical_port).await {
                Ok(PortState::Found(endpoint)) => ControlFlow::Break(Resolution::Found(endpoint)),
                Ok(PortState::NotFound) => ControlFlow::Break(Resolution::NotFound),
                Ok(PortState::Pending) => {
                    debug!("External port not yet allocated");
                    ControlFlow::Continue(None)
                }
                Err(error) => {
                    warn!(%error, "Service lookup failed");
                    ControlFlow::Continue(Some(format!("{error:#}")))
                }
            }
        })
        .await;

        let resolution = polled.unwrap_or_else(|last| Resolution::Timeout {
            last_error: last.flatten(),
        });
        match &resolution {
            Resolution::Found(endpoint) => info!(%endpoint, "Resolved"),
            Resolution::NotFound => info!("No front-end Service exposes this port"),
            Resolution::Timeout { last_error } => {
                warn!(?last_error, "Timed out waiting for an external port")
            }
        }
        resolution
    }

    async fn find_port(&self, tenant: &TenantId, logical_port: &str) -> Result<PortState> {
        if !self.lookup.namespace_exists(tenant.as_str()).await? {
            return Ok(PortState::NotFound);
        }

        let mut services = self.lookup.list_services(tenant.as_str()).await?;
        services.retain(|svc| self.config.services.is_match(&svc.name));
        services.sort_by(|a, b| a.name.cmp(&b.name));

        let port = services.iter().find_map(|svc| {
            svc.ports
                .iter()
                .find(|p| p.logical_name.as_deref() == Some(logical_port))
        });
        Ok(match port {
            None => PortState::NotFound,
            Some(ServicePortInfo {
                external_port: None,
                ..
            }) => PortState::Pending,
            Some(ServicePortInfo {
                external_port: Some(external_port),
                protocol,
                ..
            }) => PortState::Found(ResolvedEndpoint {
                host: self.config.backend_host.clone(),
                external_port: *external_port,
                protocol: *protocol,
            }),
        })
    }
}
