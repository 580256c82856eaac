#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use tenant_ingress_core as core;
pub use tenant_ingress_k8s as k8s;
pub use tenant_ingress_nginx as nginx;

mod args;
mod config;
mod duration;
mod provision;


pub use self::{
    args::Args,
    config::Config,
    duration::parse_interval,
    provision::{ApiPlan, Plan, Provisioner, StreamPlan, WebPlan},
};
