//! Stages, swaps in, validates and reloads a single fragment, rolling back on failure.
//!
//! ```text
//! STAGE -> SWAP -> VALIDATE -> RELOAD -> ok
//!                     |          |
//!                     +----+-----+
//!                          v
//!                      ROLLBACK -> not ok
//! ```
//!
//! Once staging begins the sequence runs to completion or rollback; there is no cancellation
//! point in between. Callers must ensure at most one activation per fragment path is in flight,
//! since validation inspects the whole configuration tree.

use crate::{StepName, Trail};
use std::{
    io,
    path::{Path, PathBuf},
    time,
};
use tracing::{info, instrument, warn};

/// Filesystem operations used by activation and decommission.
pub trait FileActivator {
    /// A fragment written somewhere private, not yet visible to the proxy.
    type Staged;

    /// Reads a fragment, returning `None` if it does not exist.
    fn read(&self, path: &Path) -> io::Result<Option<String>>;

    /// Lists the fragments in `dir`, sorted.
    fn list(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;

    fn stage(&self, target: &Path, contents: &str) -> io::Result<Self::Staged>;

    /// Moves a staged fragment onto its target path with the required owner and mode.
    fn swap(&self, staged: Self::Staged) -> io::Result<Swapped>;

    /// Restores the target to its state before `swap`.
    fn rollback(&self, swapped: Swapped) -> io::Result<()>;

    /// Deletes a fragment, returning `false` if it did not exist.
    fn remove(&self, path: &Path) -> io::Result<bool>;
}

/// A fragment that is live on disk, with whatever it replaced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Swapped {
    pub target: PathBuf,
    pub previous: Option<Vec<u8>>,
}

/// The proxy's whole-process control surface.
#[async_trait::async_trait]
pub trait ProxyController: Send + Sync {
    /// Tests the entire configuration tree.
    async fn validate(&self) -> Result<Outcome, ProxyError>;

    /// Reloads configuration without dropping established connections.
    async fn reload(&self) -> Result<Outcome, ProxyError>;
}

/// What the proxy said about a control command.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub success: bool,
    pub diagnostic: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("failed to run proxy command: {0}")]
    Spawn(#[from] io::Error),

    #[error("proxy command timed out after {0:?}")]
    Timeout(time::Duration),
}

#[instrument(skip_all, fields(target = %target.display()))]
pub async fn activate<F, P>(files: &F, proxy: &P, target: &Path, contents: &str) -> Trail
where
    F: FileActivator,
    P: ProxyController + ?Sized,
{
    let mut trail = Trail::default();

    let staged = match files.stage(target, contents) {
        Ok(staged) => staged,
        Err(error) => {
            warn!(%error, "Failed to stage fragment");
            trail.fail(StepName::Stage, format!("{}: {error}", target.display()));
            return trail;
        }
    };
    trail.pass(
        StepName::Stage,
        format!("staged {} bytes for {}", contents.len(), target.display()),
    );

    let swapped = match files.swap(staged) {
        Ok(swapped) => swapped,
        Err(error) => {
            warn!(%error, "Failed to swap fragment into place");
            trail.fail(StepName::Swap, format!("{}: {error}", target.display()));
            return trail;
        }
    };
    trail.pass(
        StepName::Swap,
        match swapped.previous {
            Some(_) => format!("replaced {}", target.display()),
            None => format!("created {}", target.display()),
        },
    );

    for step in [StepName::Validate, StepName::Reload] {
        let result = match step {
            StepName::Validate => proxy.validate().await,
            _ => proxy.reload().await,
        };
        match checked(result) {
            Ok(diagnostic) => trail.pass(step, diagnostic),
            Err(diagnostic) => {
                warn!(%step, %diagnostic, "Rolling back fragment");
                trail.fail(step, diagnostic);
                rollback(files, swapped, &mut trail);
                return trail;
            }
        }
    }

    info!("Activated fragment");
    trail
}

fn rollback<F: FileActivator>(files: &F, swapped: Swapped, trail: &mut Trail) {
    let target = swapped.target.clone();
    let message = match swapped.previous {
        Some(_) => format!("restored {}", target.display()),
        None => format!("removed {}", target.display()),
    };
    match files.rollback(swapped) {
        Ok(()) => trail.pass(StepName::Rollback, message),
        Err(error) => {
            tracing::error!(%error, target = %target.display(), "Rollback failed");
            trail.fail(StepName::Rollback, format!("{}: {error}", target.display()));
        }
    }
}

/// Flattens a proxy command result into its diagnostic text, preserved verbatim.
pub(crate) fn checked(result: Result<Outcome, ProxyError>) -> Result<String, String> {
    match result {
        Ok(Outcome {
            success: true,
            diagnostic,
        }) => Ok(diagnostic),
        Ok(Outcome {
            success: false,
            diagnostic,
        }) => Err(diagnostic),
        Err(error) => Err(error.to_string()),
    }
}
