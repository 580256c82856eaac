//! Tenant ingress core
//!
//! Publishes a tenant's ephemeral NodePorts behind stable public ports on an edge proxy. A
//! provisioning run flows leaf to root:
//!
//! ```text
//! [ Resolver ] -> [ Synthesizer ] -> [ Activation ] -> [ Registry ]
//! ```
//!
//! This crate holds the pieces that don't depend on any particular proxy or cluster client: the
//! resolver's polling discipline, the activation and decommission state machines, and the narrow
//! traits that the Kubernetes and nginx crates implement. Every operation reports an ordered
//! [`Trail`] of steps instead of failing outright, so a failed run never takes down its caller.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod activate;
pub mod decommission;
mod endpoint;
mod layout;
pub mod poll;
pub mod registry;
pub mod resolve;
mod tenant;
pub mod trail;

pub use self::{
    activate::{activate, FileActivator, Outcome, ProxyController, ProxyError, Swapped},
    decommission::decommission,
    endpoint::{Protocol, ResolvedEndpoint, UnknownProtocol},
    layout::FragmentLayout,
    registry::{PortBinding, PortRegistry},
    resolve::{Resolution, Resolver, ResolverConfig, ServiceInfo, ServiceLookup, ServicePortInfo},
    tenant::{InvalidTenantId, TenantId},
    trail::{Step, StepName, Trail},
};
