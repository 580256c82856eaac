use crate::{
    core::{
        self, FileActivator, FragmentLayout, PortBinding, PortRegistry, ProxyController,
        Resolution, Resolver, ServiceLookup, StepName, TenantId, Trail,
    },
    nginx::{fragment, Backend, Secondary},
    Config,
};
use std::{collections::BTreeSet, num::NonZeroU16, path::Path};
use tokio::time;
use tracing::{info, instrument};

/// What to publish for a tenant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Plan {
    pub stream: Option<StreamPlan>,
    pub web: Option<WebPlan>,
}

/// A stable public port forwarding TCP and UDP to the tenant's ingestion service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamPlan {
    pub public_port: NonZeroU16,
    pub logical_port: String,
    pub api: Option<ApiPlan>,
}

/// An optional TCP listener alongside a stream, e.g. for device management APIs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiPlan {
    pub public_port: NonZeroU16,
    pub logical_port: String,
}

/// A path on the shared HTTP server routed to the tenant's web front-end.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebPlan {
    pub public_port: NonZeroU16,
    pub logical_port: String,
    pub path_suffix: String,
}

/// Drives provisioning and decommissioning for one tenant at a time.
///
/// Different tenants may be provisioned concurrently as long as their public ports differ.
/// Callers must not run two activations for the same public port at once: validation reads the
/// whole configuration tree and may observe the other run's swap.
pub struct Provisioner<L, F, P, R> {
    resolver: Resolver<L>,
    files: F,
    proxy: P,
    registry: R,
    layout: FragmentLayout,
    resolve_timeout: time::Duration,
}

enum Chain<T> {
    Done(T),
    Skipped,
    Failed,
}

/// Registry fields to overwrite; `None` keeps the recorded value.
#[derive(Default)]
struct PortUpdate {
    public_port: Option<u16>,
    api_port: Option<u16>,
    web_port: Option<u16>,
}

// === impl Provisioner ===

impl<L, F, P, R> Provisioner<L, F, P, R>
where
    L: ServiceLookup,
    F: FileActivator,
    P: ProxyController,
    R: PortRegistry,
{
    pub fn new(config: Config, lookup: L, files: F, proxy: P, registry: R) -> Self {
        Self {
            resolver: Resolver::new(lookup, config.resolver()),
            files,
            proxy,
            registry,
            layout: config.layout,
            resolve_timeout: config.resolve_timeout,
        }
    }

    /// Resolves, synthesizes and activates each part of `plan`, then records the resulting
    /// ports.
    ///
    /// The stream is provisioned before the web location, and a fatal failure stops the run.
    /// Ports are recorded whenever a fragment is live afterwards, including one that was already
    /// up to date.
    #[instrument(skip_all, fields(%tenant))]
    pub async fn provision(&self, tenant: &TenantId, plan: &Plan) -> Trail {
        let deadline = time::Instant::now() + self.resolve_timeout;
        let mut trail = Trail::default();
        let mut update = PortUpdate::default();
        let mut live = false;

        if let Some(stream) = &plan.stream {
            match self.provision_stream(tenant, stream, deadline, &mut trail).await {
                Chain::Done(api_port) => {
                    live = true;
                    update.public_port = Some(stream.public_port.get());
                    update.api_port = api_port.map(NonZeroU16::get);
                }
                Chain::Skipped => {}
                Chain::Failed => return trail,
            }
        }

        if let Some(web) = &plan.web {
            match self.provision_web(tenant, web, deadline, &mut trail).await {
                Chain::Done(web_port) => {
                    live = true;
                    update.web_port = Some(web_port.get());
                }
                Chain::Skipped | Chain::Failed => {}
            }
        }

        if live {
            self.record_ports(tenant, update, &mut trail).await;
        }
        trail
    }

    /// Removes the tenant's fragments and clears its recorded ports.
    ///
    /// Stream fragments are found through the registry and by scanning the streams directory for
    /// the tenant's marker. A fragment marked for another tenant is never removed.
    #[instrument(skip_all, fields(%tenant))]
    pub async fn decommission(&self, tenant: &TenantId) -> Trail {
        let mut trail = Trail::default();

        let mut candidates = BTreeSet::new();
        match self.registry.get_ports(tenant).await {
            Ok(binding) => candidates.extend(
                binding
                    .and_then(|b| NonZeroU16::new(b.public_port))
                    .map(|port| self.layout.stream_path(port)),
            ),
            Err(error) => trail.warn(
                StepName::Discover,
                format!("reading recorded ports: {error}"),
            ),
        }
        match self.files.list(&self.layout.streams_dir) {
            Ok(paths) => candidates.extend(paths.into_iter().filter(|path| {
                let text = self.files.read(path).ok().flatten();
                text.and_then(|t| fragment::owner(&t)).as_ref() == Some(tenant)
            })),
            Err(error) => trail.warn(
                StepName::Discover,
                format!("listing {}: {error}", self.layout.streams_dir.display()),
            ),
        }

        let mut targets = Vec::new();
        for path in candidates {
            match self.files.read(&path) {
                Ok(None) => {}
                Ok(Some(text)) => match fragment::owner(&text) {
                    Some(owner) if owner != *tenant => trail.pass(
                        StepName::Discover,
                        format!("skipping {}: published for tenant {owner}", path.display()),
                    ),
                    _ => targets.push(path),
                },
                Err(error) => {
                    trail.fail(
                        StepName::Discover,
                        format!("reading {}: {error}", path.display()),
                    );
                    return trail;
                }
            }
        }
        targets.push(self.layout.endpoint_path(tenant));

        let removal = core::decommission(&self.files, &self.proxy, &targets).await;
        let removed = !removal
            .steps
            .iter()
            .any(|s| s.name == StepName::Remove && !s.ok);
        trail.extend(removal);

        if removed {
            match self.registry.clear_ports(tenant).await {
                Ok(()) => trail.pass(StepName::ClearPorts, "cleared recorded ports"),
                Err(error) => trail.warn(StepName::ClearPorts, error.to_string()),
            }
        }
        trail
    }

    async fn provision_stream(
        &self,
        tenant: &TenantId,
        plan: &StreamPlan,
        deadline: time::Instant,
        trail: &mut Trail,
    ) -> Chain<Option<NonZeroU16>> {
        let primary = match self
            .resolve(StepName::Resolve, tenant, &plan.logical_port, deadline, trail)
            .await
        {
            Chain::Done(endpoint) => endpoint,
            Chain::Skipped => return Chain::Skipped,
            Chain::Failed => return Chain::Failed,
        };

        // The secondary listener is best-effort: its absence never blocks the primary.
        let mut secondary = Secondary::Absent;
        if let Some(api) = &plan.api {
            secondary = Secondary::Retain(api.public_port);
            match self.resolver.resolve(tenant, &api.logical_port, deadline).await {
                Resolution::Found(endpoint) => {
                    trail.pass(
                        StepName::ResolveApi,
                        format!("{} -> {endpoint}", api.logical_port),
                    );
                    secondary = Secondary::Add(api.public_port, Backend::from(&endpoint));
                }
                Resolution::NotFound => trail.warn(
                    StepName::ResolveApi,
                    format!("no Service exposes {}; continuing without it", api.logical_port),
                ),
                Resolution::Timeout { last_error } => trail.warn(
                    StepName::ResolveApi,
                    format!(
                        "timed out waiting for {}{}; continuing without it",
                        api.logical_port,
                        last_lookup_error(last_error.as_deref()),
                    ),
                ),
            }
        }
        let api_port = match &secondary {
            Secondary::Add(port, _) => Some(*port),
            _ => None,
        };

        let path = self.layout.stream_path(plan.public_port);
        let Some(existing) = self.read_existing(&path, trail) else {
            return Chain::Failed;
        };
        let text = match fragment::synthesize_stream(
            existing.as_deref(),
            tenant,
            plan.public_port,
            Backend::from(&primary),
            secondary,
        ) {
            Ok(text) => text,
            Err(error) => {
                trail.fail(StepName::Synthesize, error.to_string());
                return Chain::Failed;
            }
        };

        if self.apply(&path, existing, text, trail).await {
            Chain::Done(api_port)
        } else {
            Chain::Failed
        }
    }

    async fn provision_web(
        &self,
        tenant: &TenantId,
        plan: &WebPlan,
        deadline: time::Instant,
        trail: &mut Trail,
    ) -> Chain<NonZeroU16> {
        let endpoint = match self
            .resolve(StepName::ResolveWeb, tenant, &plan.logical_port, deadline, trail)
            .await
        {
            Chain::Done(endpoint) => endpoint,
            Chain::Skipped => return Chain::Skipped,
            Chain::Failed => return Chain::Failed,
        };

        let path = self.layout.endpoint_path(tenant);
        let Some(existing) = self.read_existing(&path, trail) else {
            return Chain::Failed;
        };
        let text = match fragment::synthesize_http(
            tenant,
            plan.public_port,
            Backend::from(&endpoint),
            &plan.path_suffix,
        ) {
            Ok(text) => text,
            Err(error) => {
                trail.fail(StepName::Synthesize, error.to_string());
                return Chain::Failed;
            }
        };

        if self.apply(&path, existing, text, trail).await {
            Chain::Done(endpoint.external_port)
        } else {
            Chain::Failed
        }
    }

    /// Resolves a port whose absence means "nothing to provision" and whose timeout is fatal.
    async fn resolve(
        &self,
        step: StepName,
        tenant: &TenantId,
        logical_port: &str,
        deadline: time::Instant,
        trail: &mut Trail,
    ) -> Chain<core::ResolvedEndpoint> {
        match self.resolver.resolve(tenant, logical_port, deadline).await {
            Resolution::Found(endpoint) => {
                trail.pass(step, format!("{logical_port} -> {endpoint}"));
                Chain::Done(endpoint)
            }
            Resolution::NotFound => {
                trail.pass(
                    step,
                    format!("no front-end Service exposes {logical_port}; nothing to provision"),
                );
                Chain::Skipped
            }
            Resolution::Timeout { last_error } => {
                trail.fail(
                    step,
                    format!(
                        "timed out after {:?} waiting for an external port for {logical_port}{}",
                        self.resolve_timeout,
                        last_lookup_error(last_error.as_deref()),
                    ),
                );
                Chain::Failed
            }
        }
    }

    fn read_existing(&self, path: &Path, trail: &mut Trail) -> Option<Option<String>> {
        match self.files.read(path) {
            Ok(existing) => Some(existing),
            Err(error) => {
                trail.fail(
                    StepName::Synthesize,
                    format!("reading {}: {error}", path.display()),
                );
                None
            }
        }
    }

    /// Activates `text` at `path` unless it is already live. Returns whether the fragment is
    /// live afterwards.
    async fn apply(
        &self,
        path: &Path,
        existing: Option<String>,
        text: String,
        trail: &mut Trail,
    ) -> bool {
        if existing.as_deref() == Some(text.as_str()) {
            info!(path = %path.display(), "Fragment unchanged");
            trail.pass(
                StepName::Synthesize,
                format!("{} is unchanged", path.display()),
            );
            return true;
        }
        trail.pass(
            StepName::Synthesize,
            format!("{} bytes for {}", text.len(), path.display()),
        );

        let activation = core::activate(&self.files, &self.proxy, path, &text).await;
        let ok = activation.ok;
        trail.extend(activation);
        ok
    }

    async fn record_ports(&self, tenant: &TenantId, update: PortUpdate, trail: &mut Trail) {
        let mut binding = match self.registry.get_ports(tenant).await {
            Ok(binding) => binding.unwrap_or_else(|| PortBinding::unbound(tenant.clone())),
            Err(error) => {
                trail.warn(
                    StepName::RecordPorts,
                    format!("reading recorded ports: {error}"),
                );
                PortBinding::unbound(tenant.clone())
            }
        };
        let PortUpdate {
            public_port,
            api_port,
            web_port,
        } = update;
        binding.public_port = public_port.unwrap_or(binding.public_port);
        binding.api_port = api_port.unwrap_or(binding.api_port);
        binding.web_port = web_port.unwrap_or(binding.web_port);

        match self.registry.record_ports(&binding).await {
            Ok(()) => trail.pass(
                StepName::RecordPorts,
                format!(
                    "public={} api={} web={}",
                    binding.public_port, binding.api_port, binding.web_port
                ),
            ),
            Err(error) => {
                tracing::warn!(%error, "Failed to record ports");
                trail.warn(StepName::RecordPorts, error.to_string());
            }
        }
    }
}

fn last_lookup_error(error: Option<&str>) -> String {
    error
        .map(|e| format!(" (last lookup error: {e})"))
        .unwrap_or_default()
}
