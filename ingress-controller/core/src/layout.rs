use crate::TenantId;
use std::{
    num::NonZeroU16,
    path::{Path, PathBuf},
};

/// Where fragments live in the proxy's configuration tree.
///
/// Both directories are included by the proxy's static top-level configuration: streams from
/// its `stream {}` context and endpoints from inside a `server {}` block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FragmentLayout {
    pub streams_dir: PathBuf,
    pub endpoints_dir: PathBuf,
}

impl FragmentLayout {
    pub const EXTENSION: &'static str = "conf";

    /// One stream fragment per public port, named by the port number.
    pub fn stream_path(&self, public_port: NonZeroU16) -> PathBuf {
        self.streams_dir
            .join(format!("{public_port}.{}", Self::EXTENSION))
    }

    /// One location fragment per tenant, named by the tenant ID.
    pub fn endpoint_path(&self, tenant: &TenantId) -> PathBuf {
        self.endpoints_dir
            .join(format!("{tenant}.{}", Self::EXTENSION))
    }

    pub fn is_fragment(path: &Path) -> bool {
        path.extension().is_some_and(|ext| ext == Self::EXTENSION)
    }
}
