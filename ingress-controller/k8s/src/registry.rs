use crate::Namespace;
use anyhow::{anyhow, Context, Result};
use kube::api::{Api, Patch, PatchParams, ResourceExt};
use std::collections::BTreeMap;
use tenant_ingress_core::{PortBinding, PortRegistry, TenantId};
use tokio::time;
use tracing::{debug, info};

const PUBLIC_PORT: &str = "tenant-ingress.io/public-port";
const API_PORT: &str = "tenant-ingress.io/api-port";
const WEB_PORT: &str = "tenant-ingress.io/web-port";

const WRITE_TIMEOUT: time::Duration = time::Duration::from_secs(10);
const FIELD_MANAGER: &str = "tenant-ingress";

/// Records port bindings as annotations on the tenant's Namespace.
#[derive(Clone)]
pub struct NamespaceRegistry {
    client: kube::Client,
}

impl NamespaceRegistry {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    fn api(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }
}

#[async_trait::async_trait]
impl PortRegistry for NamespaceRegistry {
    async fn record_ports(&self, binding: &PortBinding) -> Result<()> {
        let patch = annotations_patch(binding);
        debug!(%patch, "Patching namespace");
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        time::timeout(
            WRITE_TIMEOUT,
            self.api()
                .patch(binding.tenant.as_str(), &params, &Patch::Merge(&patch)),
        )
        .await
        .map_err(|_| anyhow!("timed out patching namespace {}", binding.tenant))??;
        info!(
            tenant = %binding.tenant,
            public_port = binding.public_port,
            api_port = binding.api_port,
            web_port = binding.web_port,
            "Recorded ports"
        );
        Ok(())
    }

    async fn clear_ports(&self, tenant: &TenantId) -> Result<()> {
        self.record_ports(&PortBinding::unbound(tenant.clone()))
            .await
    }

    async fn get_ports(&self, tenant: &TenantId) -> Result<Option<PortBinding>> {
        let ns = match self.api().get_opt(tenant.as_str()).await? {
            Some(ns) => ns,
            None => return Ok(None),
        };
        binding_from_annotations(tenant, ns.annotations())
    }
}

fn annotations_patch(binding: &PortBinding) -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "annotations": {
                PUBLIC_PORT: binding.public_port.to_string(),
                API_PORT: binding.api_port.to_string(),
                WEB_PORT: binding.web_port.to_string(),
            }
        }
    })
}

fn binding_from_annotations(
    tenant: &TenantId,
    annotations: &BTreeMap<String, String>,
) -> Result<Option<PortBinding>> {
    let port = |key: &str| -> Result<Option<u16>> {
        annotations
            .get(key)
            .map(|v| v.parse().with_context(|| format!("parsing {key}={v:?}")))
            .transpose()
    };
    let (public_port, api_port, web_port) = (port(PUBLIC_PORT)?, port(API_PORT)?, port(WEB_PORT)?);
    if public_port.is_none() && api_port.is_none() && web_port.is_none() {
        return Ok(None);
    }
    Ok(Some(PortBinding {
        tenant: tenant.clone(),
        public_port: public_port.unwrap_or(0),
        api_port: api_port.unwrap_or(0),
        web_port: web_port.unwrap_or(0),
    }))
}
