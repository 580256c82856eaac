use serde::Serialize;
use std::{fmt, num::NonZeroU16, str::FromStr};

/// Transport protocol of a Service port.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Protocol {
    Tcp,
    Udp,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unsupported protocol {0:?}")]
pub struct UnknownProtocol(String);

/// A backend the proxy can reach right now.
///
/// Endpoints are re-derived from the cluster on every run and never cached: NodePorts change
/// whenever a tenant's front-end Service is recreated.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ResolvedEndpoint {
    pub host: String,
    pub external_port: NonZeroU16,
    pub protocol: Protocol,
}

// === impl Protocol ===

impl FromStr for Protocol {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("tcp") {
            Ok(Self::Tcp)
        } else if s.eq_ignore_ascii_case("udp") {
            Ok(Self::Udp)
        } else {
            Err(UnknownProtocol(s.to_string()))
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("TCP"),
            Self::Udp => f.write_str("UDP"),
        }
    }
}

// === impl ResolvedEndpoint ===

impl fmt::Display for ResolvedEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.host, self.external_port, self.protocol)
    }
}
