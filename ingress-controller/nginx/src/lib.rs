//! nginx support for tenant ingress: fragment synthesis, on-disk activation, and process
//! control.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod fragment;
mod fs;
mod process;

pub use self::{
    fragment::{Backend, FragmentError, HttpLocation, ProxyFragment, Secondary, StreamFragment},
    fs::{FsActivator, InvalidOwner, Owner, Staged},
    process::NginxController,
};
