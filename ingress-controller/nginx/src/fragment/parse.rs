use super::{Backend, FragmentError, MARKER};
use std::{collections::BTreeSet, num::NonZeroU16};
use tenant_ingress_core::TenantId;

#[derive(Debug, Default)]
pub(super) struct ParsedStream {
    pub tenant: Option<TenantId>,
    pub upstreams: Vec<Upstream>,
}

#[derive(Debug)]
pub(super) struct Upstream {
    pub role: Role,
    pub port: NonZeroU16,
    pub backends: BTreeSet<Backend>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum Role {
    Tcp,
    Udp,
    Api,
}

/// Recovers the tenant marker and upstream backends from a stream fragment.
///
/// Only `upstream <role>_<port>` blocks are understood. Anything else, including upstreams with
/// other names, is skipped, since the fragment is regenerated from the parsed backends.
pub(super) fn stream(text: &str) -> Result<ParsedStream, FragmentError> {
    let mut parsed = ParsedStream::default();
    let mut current: Option<Upstream> = None;

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim();

        if let Some(tenant) = line.strip_prefix(MARKER) {
            let tenant = tenant
                .trim()
                .parse()
                .map_err(|_| FragmentError::Marker { line: line_no })?;
            parsed.tenant = Some(tenant);
        } else if let Some(name) = line.strip_prefix("upstream ") {
            current = Upstream::named(name.trim_end_matches('{').trim());
        } else if line.starts_with('}') {
            parsed.upstreams.extend(current.take());
        } else if let (Some(upstream), Some(server)) =
            (current.as_mut(), line.strip_prefix("server "))
        {
            let addr = server
                .trim_end_matches(';')
                .split_whitespace()
                .next()
                .unwrap_or_default();
            let backend = addr.parse().map_err(|source| FragmentError::Backend {
                line: line_no,
                source,
            })?;
            upstream.backends.insert(backend);
        }
    }

    Ok(parsed)
}

impl Upstream {
    fn named(name: &str) -> Option<Self> {
        let (role, port) = name.split_once('_')?;
        let role = match role {
            "tcp" => Role::Tcp,
            "udp" => Role::Udp,
            "api" => Role::Api,
            _ => return None,
        };
        Some(Self {
            role,
            port: port.parse().ok()?,
            backends: BTreeSet::new(),
        })
    }
}
