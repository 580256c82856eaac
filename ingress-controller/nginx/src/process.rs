use std::{path::PathBuf, process::Stdio};
use tenant_ingress_core::{Outcome, ProxyController, ProxyError};
use tokio::{process::Command, time};
use tracing::{debug, instrument};

/// Controls a local nginx through its command line.
///
/// Validation runs `nginx -t`, which tests the entire configuration tree; reload runs
/// `nginx -s reload`, which lets workers drain established connections. Whatever the command
/// prints is returned verbatim as the diagnostic.
#[derive(Clone, Debug)]
pub struct NginxController {
    bin: PathBuf,
    args: Vec<String>,
    timeout: time::Duration,
}

impl NginxController {
    /// `args` precede every command, e.g. `-c /etc/nginx/nginx.conf`.
    pub fn new(bin: impl Into<PathBuf>, args: Vec<String>, timeout: time::Duration) -> Self {
        Self {
            bin: bin.into(),
            args,
            timeout,
        }
    }

    #[instrument(skip(self), fields(bin = %self.bin.display()))]
    async fn run(&self, command: &[&str]) -> Result<Outcome, ProxyError> {
        let mut cmd = Command::new(&self.bin);
        cmd.args(&self.args)
            .args(command)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        let output = time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| ProxyError::Timeout(self.timeout))??;

        let mut diagnostic = String::from_utf8_lossy(&output.stderr).into_owned();
        diagnostic.push_str(&String::from_utf8_lossy(&output.stdout));
        let diagnostic = diagnostic.trim_end().to_string();
        debug!(status = %output.status, %diagnostic);

        Ok(Outcome {
            success: output.status.success(),
            diagnostic,
        })
    }
}

#[async_trait::async_trait]
impl ProxyController for NginxController {
    async fn validate(&self) -> Result<Outcome, ProxyError> {
        self.run(&["-t"]).await
    }

    async fn reload(&self) -> Result<Outcome, ProxyError> {
        self.run(&["-s", "reload"]).await
    }
}
