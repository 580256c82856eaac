use crate::TenantId;
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// The public ports recorded for a tenant. Zero means "not bound".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    pub tenant: TenantId,
    pub public_port: u16,
    pub api_port: u16,
    pub web_port: u16,
}

/// The tenant store's port fields.
///
/// Writes happen only after the proxy change they describe has succeeded, so callers treat a
/// failed write as secondary: the proxy is already serving the new configuration.
#[async_trait::async_trait]
pub trait PortRegistry: Send + Sync {
    async fn record_ports(&self, binding: &PortBinding) -> Result<()>;

    async fn clear_ports(&self, tenant: &TenantId) -> Result<()>;

    async fn get_ports(&self, tenant: &TenantId) -> Result<Option<PortBinding>>;
}

// === impl PortBinding ===

impl PortBinding {
    pub fn unbound(tenant: TenantId) -> Self {
        Self {
            tenant,
            public_port: 0,
            api_port: 0,
            web_port: 0,
        }
    }

    pub fn is_unbound(&self) -> bool {
        self.public_port == 0 && self.api_port == 0 && self.web_port == 0
    }
}
