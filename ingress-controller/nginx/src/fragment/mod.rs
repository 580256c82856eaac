//! Proxy configuration fragments.
//!
//! A fragment is modeled as a [`ProxyFragment`], built through [`StreamFragment::builder`] or
//! [`HttpLocation::new`], and rendered to nginx syntax by its `Display` impl. Synthesis is pure:
//! text in, text out. Every rendered fragment starts with a `# tenant: <id>` marker so that its
//! owner can be recovered from disk.

mod http;
mod parse;
mod stream;

pub use self::{
    http::HttpLocation,
    stream::{Listener, StreamBuilder, StreamFragment},
};
use std::{fmt, num::NonZeroU16, str::FromStr};
use tenant_ingress_core::{ResolvedEndpoint, TenantId};

pub const MARKER: &str = "# tenant:";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProxyFragment {
    Stream(StreamFragment),
    HttpLocation(HttpLocation),
}

/// An upstream server address. Ordering is by host, then port.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Backend {
    pub host: String,
    pub port: NonZeroU16,
}

/// What a stream synthesis does with the secondary ("api") listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Secondary {
    /// The plan has no secondary listener; any previously rendered one is dropped.
    Absent,

    /// The plan names a secondary listener on this port but no backend is known for it now.
    /// Backends already rendered on this port are kept.
    Retain(NonZeroU16),

    /// Adds a backend to the secondary listener on this port.
    Add(NonZeroU16, Backend),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("invalid backend address {0:?}")]
pub struct InvalidBackend(String);

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FragmentError {
    #[error("line {line}: {source}")]
    Backend {
        line: usize,
        #[source]
        source: InvalidBackend,
    },

    #[error("line {line}: invalid tenant marker")]
    Marker { line: usize },

    #[error("port {port} is already published for tenant {owner}")]
    ForeignOwner { port: NonZeroU16, owner: TenantId },

    #[error("invalid location path {0:?}")]
    InvalidPath(String),
}

/// Builds the stream fragment for `public_port`, merging in the backends of `existing`.
///
/// The result is deterministic: backends are deduplicated and sorted, so synthesizing again from
/// the output with the same backend yields identical text. A fragment marked for another tenant
/// is never merged. A previously rendered secondary listener survives only while `secondary`
/// still names its port.
pub fn synthesize_stream(
    existing: Option<&str>,
    tenant: &TenantId,
    public_port: NonZeroU16,
    backend: Backend,
    secondary: Secondary,
) -> Result<String, FragmentError> {
    let api_port = secondary.port();
    let mut builder = StreamFragment::builder(public_port).tenant(tenant.clone());

    if let Some(text) = existing {
        let parsed = parse::stream(text)?;
        if let Some(owner) = parsed.tenant {
            if owner != *tenant {
                return Err(FragmentError::ForeignOwner {
                    port: public_port,
                    owner,
                });
            }
        }
        for upstream in parsed.upstreams {
            builder = match upstream.role {
                parse::Role::Tcp | parse::Role::Udp if upstream.port == public_port => {
                    builder.backends(upstream.backends)
                }
                parse::Role::Api if Some(upstream.port) == api_port => {
                    builder.secondary_backends(upstream.port, upstream.backends)
                }
                role => {
                    tracing::debug!(?role, port = %upstream.port, "Dropping stale upstream");
                    builder
                }
            };
        }
    }

    builder = builder.backend(backend);
    if let Secondary::Add(port, backend) = secondary {
        builder = builder.secondary(port, backend);
    }
    Ok(builder.build().to_string())
}

pub fn synthesize_http(
    tenant: &TenantId,
    public_port: NonZeroU16,
    backend: Backend,
    path_suffix: &str,
) -> Result<String, FragmentError> {
    HttpLocation::new(tenant.clone(), public_port, backend, path_suffix).map(|l| l.to_string())
}

/// Reads the tenant marker from a rendered fragment.
pub fn owner(text: &str) -> Option<TenantId> {
    text.lines()
        .find_map(|l| l.trim().strip_prefix(MARKER))
        .and_then(|t| t.trim().parse().ok())
}

// === impl Secondary ===

impl Secondary {
    pub fn port(&self) -> Option<NonZeroU16> {
        match self {
            Self::Absent => None,
            Self::Retain(port) | Self::Add(port, _) => Some(*port),
        }
    }
}

// === impl ProxyFragment ===

impl ProxyFragment {
    pub fn tenant(&self) -> Option<&TenantId> {
        match self {
            Self::Stream(s) => s.tenant(),
            Self::HttpLocation(l) => Some(l.tenant()),
        }
    }
}

impl From<StreamFragment> for ProxyFragment {
    fn from(s: StreamFragment) -> Self {
        Self::Stream(s)
    }
}

impl From<HttpLocation> for ProxyFragment {
    fn from(l: HttpLocation) -> Self {
        Self::HttpLocation(l)
    }
}

impl fmt::Display for ProxyFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream(s) => fmt::Display::fmt(s, f),
            Self::HttpLocation(l) => fmt::Display::fmt(l, f),
        }
    }
}

// === impl Backend ===

impl From<&ResolvedEndpoint> for Backend {
    fn from(ep: &ResolvedEndpoint) -> Self {
        Self {
            host: ep.host.clone(),
            port: ep.external_port,
        }
    }
}

impl FromStr for Backend {
    type Err = InvalidBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidBackend(s.to_string());
        let (host, port) = s.rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(invalid());
        }
        let port = port.parse().map_err(|_| invalid())?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests;
