use crate::core::{FragmentLayout, ResolverConfig};
use regex::Regex;
use tokio::time;

/// Settings injected into a [`Provisioner`](crate::Provisioner).
#[derive(Clone, Debug)]
pub struct Config {
    /// The address through which the proxy reaches the cluster's NodePorts.
    ///
    /// Every resolved backend uses this host; only the port varies per tenant.
    pub backend_host: String,

    /// The proxy's include directories.
    pub layout: FragmentLayout,

    /// Names of tenant front-end Services, e.g. `acme-frontend`.
    pub service_pattern: Regex,

    pub poll_interval: time::Duration,

    /// How long to wait for the cluster to allocate a NodePort.
    pub resolve_timeout: time::Duration,
}

impl Config {
    pub(crate) fn resolver(&self) -> ResolverConfig {
        ResolverConfig {
            backend_host: self.backend_host.clone(),
            services: self.service_pattern.clone(),
            poll_interval: self.poll_interval,
        }
    }
}
