use crate::{Namespace, Service, ServicePort};
use anyhow::Result;
use kube::api::{Api, ListParams};
use std::num::NonZeroU16;
use tenant_ingress_core::{Protocol, ServiceInfo, ServiceLookup, ServicePortInfo};
use tracing::debug;

/// Looks up tenant Services through the Kubernetes API.
#[derive(Clone)]
pub struct KubeServices {
    client: kube::Client,
}

impl KubeServices {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ServiceLookup for KubeServices {
    async fn list_services(&self, namespace: &str) -> Result<Vec<ServiceInfo>> {
        let api = Api::<Service>::namespaced(self.client.clone(), namespace);
        let services = api.list(&ListParams::default()).await?;
        Ok(services.items.iter().filter_map(service_info).collect())
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool> {
        let api = Api::<Namespace>::all(self.client.clone());
        Ok(api.get_opt(namespace).await?.is_some())
    }
}

pub(crate) fn service_info(svc: &Service) -> Option<ServiceInfo> {
    let name = svc.metadata.name.clone()?;
    let ports = svc
        .spec
        .iter()
        .flat_map(|spec| spec.ports.iter().flatten())
        .filter_map(port_info)
        .collect();
    Some(ServiceInfo { name, ports })
}

fn port_info(port: &ServicePort) -> Option<ServicePortInfo> {
    let protocol = match port.protocol.as_deref().unwrap_or("TCP").parse::<Protocol>() {
        Ok(protocol) => protocol,
        Err(error) => {
            debug!(%error, name = ?port.name, "Skipping Service port");
            return None;
        }
    };
    Some(ServicePortInfo {
        logical_name: port.name.clone(),
        declared_port: u16::try_from(port.port).ok()?,
        // The API server reports an unallocated NodePort as absent or zero.
        external_port: port
            .node_port
            .and_then(|p| u16::try_from(p).ok())
            .and_then(NonZeroU16::new),
        protocol,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ObjectMeta, ServiceSpec};

    fn service_port(name: &str, protocol: &str, node_port: Option<i32>) -> ServicePort {
        ServicePort {
            name: Some(name.to_string()),
            port: 5000,
            protocol: Some(protocol.to_string()),
            node_port,
            ..Default::default()
        }
    }

    #[test]
    fn converts_node_ports() {
        let svc = Service {
            metadata: ObjectMeta {
                namespace: Some("acme".to_string()),
                name: Some("acme-frontend".to_string()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some("NodePort".to_string()),
                ports: Some(vec![
                    service_port("tcp", "TCP", Some(31090)),
                    service_port("udp", "UDP", Some(0)),
                    service_port("tcp-api", "TCP", None),
                    service_port("sctp", "SCTP", Some(31092)),
                ]),
                ..Default::default()
            }),
            ..Default::default()
        };

        let info = service_info(&svc).unwrap();
        assert_eq!(info.name, "acme-frontend");
        assert_eq!(
            info.ports,
            [
                ServicePortInfo {
                    logical_name: Some("tcp".to_string()),
                    declared_port: 5000,
                    external_port: NonZeroU16::new(31090),
                    protocol: Protocol::Tcp,
                },
                ServicePortInfo {
                    logical_name: Some("udp".to_string()),
                    declared_port: 5000,
                    external_port: None,
                    protocol: Protocol::Udp,
                },
                ServicePortInfo {
                    logical_name: Some("tcp-api".to_string()),
                    declared_port: 5000,
                    external_port: None,
                    protocol: Protocol::Tcp,
                },
            ]
        );
    }

    #[test]
    fn service_without_spec_has_no_ports() {
        let svc = Service {
            metadata: ObjectMeta {
                name: Some("acme-frontend".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(service_info(&svc).unwrap().ports.is_empty());
    }
}
