use super::{Backend, MARKER};
use std::{collections::BTreeSet, fmt, num::NonZeroU16};
use tenant_ingress_core::TenantId;

const CONNECT_TIMEOUT: &str = "5s";
const IDLE_TIMEOUT: &str = "10m";

/// Layer-4 forwarding for one public port.
///
/// Renders a TCP and a UDP upstream over the same backend set with a listener for each, plus an
/// optional TCP-only secondary ("api") listener on its own public port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamFragment {
    tenant: Option<TenantId>,
    primary: Listener,
    secondary: Option<Listener>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Listener {
    pub public_port: NonZeroU16,
    pub backends: BTreeSet<Backend>,
}

#[derive(Clone, Debug)]
#[must_use]
pub struct StreamBuilder {
    fragment: StreamFragment,
}

// === impl StreamFragment ===

impl StreamFragment {
    pub fn builder(public_port: NonZeroU16) -> StreamBuilder {
        StreamBuilder {
            fragment: Self {
                tenant: None,
                primary: Listener::new(public_port),
                secondary: None,
            },
        }
    }

    pub fn tenant(&self) -> Option<&TenantId> {
        self.tenant.as_ref()
    }

    pub fn primary(&self) -> &Listener {
        &self.primary
    }

    pub fn secondary(&self) -> Option<&Listener> {
        self.secondary.as_ref()
    }
}

impl fmt::Display for StreamFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tenant) = &self.tenant {
            writeln!(f, "{MARKER} {tenant}")?;
        }

        let port = self.primary.public_port;
        let tcp = format!("tcp_{port}");
        let udp = format!("udp_{port}");
        upstream(f, &tcp, &self.primary.backends)?;
        writeln!(f)?;
        upstream(f, &udp, &self.primary.backends)?;
        writeln!(f)?;
        server(f, &port.to_string(), &tcp)?;
        writeln!(f)?;
        server(f, &format!("{port} udp"), &udp)?;

        if let Some(api) = &self.secondary {
            let name = format!("api_{}", api.public_port);
            writeln!(f)?;
            upstream(f, &name, &api.backends)?;
            writeln!(f)?;
            server(f, &api.public_port.to_string(), &name)?;
        }

        Ok(())
    }
}

fn upstream(f: &mut fmt::Formatter<'_>, name: &str, backends: &BTreeSet<Backend>) -> fmt::Result {
    writeln!(f, "upstream {name} {{")?;
    for backend in backends {
        writeln!(f, "    server {backend};")?;
    }
    writeln!(f, "}}")
}

fn server(f: &mut fmt::Formatter<'_>, listen: &str, upstream: &str) -> fmt::Result {
    writeln!(f, "server {{")?;
    writeln!(f, "    listen {listen};")?;
    writeln!(f, "    proxy_connect_timeout {CONNECT_TIMEOUT};")?;
    writeln!(f, "    proxy_timeout {IDLE_TIMEOUT};")?;
    writeln!(f, "    proxy_pass {upstream};")?;
    writeln!(f, "}}")
}

// === impl Listener ===

impl Listener {
    fn new(public_port: NonZeroU16) -> Self {
        Self {
            public_port,
            backends: BTreeSet::new(),
        }
    }
}

// === impl StreamBuilder ===

impl StreamBuilder {
    pub fn tenant(mut self, tenant: TenantId) -> Self {
        self.fragment.tenant = Some(tenant);
        self
    }

    pub fn backend(mut self, backend: Backend) -> Self {
        self.fragment.primary.backends.insert(backend);
        self
    }

    pub fn backends(mut self, backends: impl IntoIterator<Item = Backend>) -> Self {
        self.fragment.primary.backends.extend(backends);
        self
    }

    /// Adds a secondary backend. A secondary listener on a different port replaces the current
    /// one.
    pub fn secondary(self, public_port: NonZeroU16, backend: Backend) -> Self {
        self.secondary_backends(public_port, Some(backend))
    }

    pub fn secondary_backends(
        mut self,
        public_port: NonZeroU16,
        backends: impl IntoIterator<Item = Backend>,
    ) -> Self {
        let secondary = match self.fragment.secondary.take() {
            Some(api) if api.public_port == public_port => api,
            _ => Listener::new(public_port),
        };
        self.fragment.secondary = Some(Listener {
            backends: secondary.backends.into_iter().chain(backends).collect(),
            ..secondary
        });
        self
    }

    pub fn build(self) -> StreamFragment {
        self.fragment
    }
}
