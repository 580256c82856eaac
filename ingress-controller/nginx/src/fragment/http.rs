use super::{Backend, FragmentError, MARKER};
use std::{fmt, num::NonZeroU16};
use tenant_ingress_core::TenantId;

/// Layer-7 routing of one path prefix to a tenant's web backend.
///
/// Rendered as a bare `location` block; the including `server {}` owns the listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpLocation {
    tenant: TenantId,
    public_port: NonZeroU16,
    path: String,
    backend: Backend,
}

impl HttpLocation {
    pub fn new(
        tenant: TenantId,
        public_port: NonZeroU16,
        backend: Backend,
        path_suffix: &str,
    ) -> Result<Self, FragmentError> {
        let suffix = path_suffix.trim_matches('/');
        let valid = !suffix.is_empty()
            && suffix
                .split('/')
                .all(|seg| !seg.is_empty() && seg != "." && seg != "..")
            && suffix
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
        if !valid {
            return Err(FragmentError::InvalidPath(path_suffix.to_string()));
        }

        Ok(Self {
            tenant,
            public_port,
            path: format!("/{suffix}/"),
            backend,
        })
    }

    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }
}

impl fmt::Display for HttpLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{MARKER} {}", self.tenant)?;
        writeln!(f, "# public port: {}", self.public_port)?;
        writeln!(f, "location {} {{", self.path)?;
        writeln!(f, "    proxy_pass http://{}/;", self.backend)?;
        writeln!(f, "    proxy_set_header Host $host;")?;
        writeln!(f, "    proxy_set_header X-Real-IP $remote_addr;")?;
        writeln!(
            f,
            "    proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;"
        )?;
        writeln!(f, "    proxy_set_header X-Forwarded-Proto $scheme;")?;
        writeln!(f, "}}")
    }
}
