use crate::{
    core::{FragmentLayout, TenantId, Trail},
    k8s::{KubeServices, NamespaceRegistry},
    nginx::{FsActivator, NginxController, Owner},
    parse_interval, ApiPlan, Config, Plan, Provisioner, StreamPlan, WebPlan,
};
use anyhow::{bail, ensure, Result};
use clap::{Parser, Subcommand, ValueEnum};
use regex::Regex;
use std::{num::NonZeroU16, path::PathBuf};
use tokio::time;
use tracing::info;

#[derive(Debug, Parser)]
#[clap(
    name = "tenant-ingress",
    about = "Publishes tenant NodePorts behind stable public ports on an edge proxy"
)]
pub struct Args {
    #[clap(
        long,
        default_value = "tenant_ingress=info,warn",
        env = "TENANT_INGRESS_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    /// The address through which the proxy reaches cluster NodePorts.
    #[clap(long, env = "TENANT_INGRESS_BACKEND_HOST")]
    backend_host: String,

    #[clap(long, default_value = "/etc/nginx/streams.d")]
    streams_dir: PathBuf,

    #[clap(long, default_value = "/etc/nginx/endpoints.d")]
    endpoints_dir: PathBuf,

    /// Matches the names of tenant front-end Services.
    #[clap(long, default_value = "^(.+-)?frontend$")]
    service_pattern: Regex,

    #[clap(long, default_value = "5s", value_parser = parse_interval)]
    poll_interval: time::Duration,

    #[clap(long, default_value = "60s", value_parser = parse_interval)]
    resolve_timeout: time::Duration,

    /// Applied to every activated fragment, as `<uid>:<gid>`.
    #[clap(long)]
    fragment_owner: Option<Owner>,

    #[clap(long, default_value = "0644", value_parser = parse_mode)]
    fragment_mode: u32,

    #[clap(long, default_value = "nginx")]
    nginx_bin: PathBuf,

    /// Passed to every nginx invocation, e.g. `--nginx-arg=-c --nginx-arg=/etc/nginx/nginx.conf`.
    #[clap(long = "nginx-arg", allow_hyphen_values = true)]
    nginx_args: Vec<String>,

    #[clap(long, default_value = "30s", value_parser = parse_interval)]
    proxy_command_timeout: time::Duration,

    #[clap(long, value_enum, default_value = "plain")]
    output: Output,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Publishes a tenant's stream and/or web endpoint.
    Provision(ProvisionArgs),

    /// Withdraws everything published for a tenant.
    Decommission {
        #[clap(long, short = 'n')]
        namespace: TenantId,
    },
}

#[derive(Debug, clap::Args)]
struct ProvisionArgs {
    #[clap(long, short = 'n')]
    namespace: TenantId,

    #[clap(long, requires = "logical_port")]
    public_port: Option<NonZeroU16>,

    #[clap(long, requires = "public_port")]
    logical_port: Option<String>,

    #[clap(long, requires_all = ["api_logical_port", "public_port"])]
    api_public_port: Option<NonZeroU16>,

    #[clap(long, requires = "api_public_port")]
    api_logical_port: Option<String>,

    /// Served as `/<web-path>/` on the shared HTTP server.
    #[clap(long, requires_all = ["web_logical_port", "web_public_port"])]
    web_path: Option<String>,

    #[clap(long, requires = "web_path")]
    web_logical_port: Option<String>,

    /// The shared HTTP server's public port.
    #[clap(long, requires = "web_path")]
    web_public_port: Option<NonZeroU16>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Output {
    Plain,
    Json,
}

// === impl Args ===

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            backend_host,
            streams_dir,
            endpoints_dir,
            service_pattern,
            poll_interval,
            resolve_timeout,
            fragment_owner,
            fragment_mode,
            nginx_bin,
            nginx_args,
            proxy_command_timeout,
            output,
            command,
        } = self;

        log_format.try_init(log_level)?;

        let config = Config {
            backend_host,
            layout: FragmentLayout {
                streams_dir,
                endpoints_dir,
            },
            service_pattern,
            poll_interval,
            resolve_timeout,
        };
        // Reject an inconsistent plan before reaching out to the cluster.
        let command = match command {
            Command::Provision(args) => {
                let (tenant, plan) = args.into_plan()?;
                Job::Provision(tenant, plan)
            }
            Command::Decommission { namespace } => Job::Decommission(namespace),
        };

        let client = client.try_client().await?;
        let provisioner = Provisioner::new(
            config,
            KubeServices::new(client.clone()),
            FsActivator::new(fragment_mode, fragment_owner),
            NginxController::new(nginx_bin, nginx_args, proxy_command_timeout),
            NamespaceRegistry::new(client),
        );

        let trail = match command {
            Job::Provision(tenant, plan) => {
                info!(%tenant, "Provisioning");
                provisioner.provision(&tenant, &plan).await
            }
            Job::Decommission(tenant) => {
                info!(%tenant, "Decommissioning");
                provisioner.decommission(&tenant).await
            }
        };

        match output {
            Output::Plain => println!("{trail}"),
            Output::Json => println!("{}", serde_json::to_string_pretty(&trail)?),
        }
        ensure!(trail.ok, "{}", failure_summary(&trail));
        Ok(())
    }
}

enum Job {
    Provision(TenantId, Plan),
    Decommission(TenantId),
}

fn failure_summary(trail: &Trail) -> String {
    match trail.first_failure() {
        Some(step) => format!("{} failed: {}", step.name, step.message),
        None => "failed".to_string(),
    }
}

// === impl ProvisionArgs ===

impl ProvisionArgs {
    fn into_plan(self) -> Result<(TenantId, Plan)> {
        let Self {
            namespace,
            public_port,
            logical_port,
            api_public_port,
            api_logical_port,
            web_path,
            web_logical_port,
            web_public_port,
        } = self;

        let api = match (api_public_port, api_logical_port) {
            (Some(public_port), Some(logical_port)) => Some(ApiPlan {
                public_port,
                logical_port,
            }),
            (None, None) => None,
            _ => bail!("--api-public-port and --api-logical-port must be set together"),
        };

        let stream = match (public_port, logical_port) {
            (Some(public_port), Some(logical_port)) => {
                if let Some(api) = &api {
                    ensure!(
                        api.public_port != public_port,
                        "--api-public-port must differ from --public-port"
                    );
                }
                Some(StreamPlan {
                    public_port,
                    logical_port,
                    api,
                })
            }
            (None, None) if api.is_none() => None,
            (None, None) => bail!("--api-public-port requires --public-port"),
            _ => bail!("--public-port and --logical-port must be set together"),
        };

        let web = match (web_path, web_logical_port, web_public_port) {
            (Some(path_suffix), Some(logical_port), Some(public_port)) => Some(WebPlan {
                public_port,
                logical_port,
                path_suffix,
            }),
            (None, None, None) => None,
            _ => bail!("--web-path, --web-logical-port and --web-public-port must be set together"),
        };

        ensure!(
            stream.is_some() || web.is_some(),
            "nothing to provision: pass --public-port or --web-path"
        );
        Ok((namespace, Plan { stream, web }))
    }
}

fn parse_mode(s: &str) -> Result<u32> {
    let mode = u32::from_str_radix(s.trim_start_matches("0o"), 8)?;
    ensure!(mode <= 0o7777, "{s} is not a file mode");
    Ok(mode)
}
