use crate::{
    activate::{checked, FileActivator, ProxyController},
    StepName, Trail,
};
use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// Removes the given fragments, then validates and reloads the proxy.
///
/// Each candidate is optional: missing files are skipped, and when nothing was removed the proxy
/// is left alone. Removals are not rolled back if validation fails afterwards. A config tree that
/// is invalid without these fragments was already broken by hand, and keeping a dead backend
/// registered doesn't fix that.
#[instrument(skip_all, fields(candidates = candidates.len()))]
pub async fn decommission<F, P>(files: &F, proxy: &P, candidates: &[PathBuf]) -> Trail
where
    F: FileActivator,
    P: ProxyController + ?Sized,
{
    let mut trail = Trail::default();

    let mut removed = 0;
    for path in candidates {
        match files.remove(path) {
            Ok(true) => {
                removed += 1;
                trail.pass(StepName::Remove, format!("removed {}", path.display()));
            }
            Ok(false) => tracing::debug!(path = %path.display(), "Fragment absent"),
            Err(error) => {
                warn!(%error, path = %path.display(), "Failed to remove fragment");
                trail.fail(StepName::Remove, format!("{}: {error}", path.display()));
                return trail;
            }
        }
    }

    if removed == 0 {
        trail.pass(StepName::Remove, "no fragments present");
        return trail;
    }

    match checked(proxy.validate().await) {
        Ok(diagnostic) => trail.pass(StepName::Validate, diagnostic),
        Err(diagnostic) => {
            warn!(%diagnostic, "Configuration invalid after removal");
            trail.fail(StepName::Validate, diagnostic);
            return trail;
        }
    }

    match checked(proxy.reload().await) {
        Ok(diagnostic) => trail.pass(StepName::Reload, diagnostic),
        Err(diagnostic) => trail.fail(StepName::Reload, diagnostic),
    }

    info!(removed, "Decommissioned fragments");
    trail
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activate::tests::{MemFiles, MockProxy};
    use std::{path::Path, sync::atomic::Ordering};

    fn paths(ps: &[&str]) -> Vec<PathBuf> {
        ps.iter().map(PathBuf::from).collect()
    }

    #[tokio::test]
    async fn removes_present_fragments() {
        let files = MemFiles::with([
            ("/streams/8042.conf", "# tenant: acme"),
            ("/endpoints/acme.conf", "# tenant: acme"),
            ("/streams/7000.conf", "# tenant: beta"),
        ]);
        let proxy = MockProxy::default();

        let trail = decommission(
            &files,
            &proxy,
            &paths(&["/streams/8042.conf", "/endpoints/acme.conf"]),
        )
        .await;
        assert!(trail.ok, "{trail}");
        assert_eq!(
            files.snapshot().into_keys().collect::<Vec<_>>(),
            paths(&["/streams/7000.conf"])
        );
        assert_eq!(proxy.reloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn absent_fragments_are_a_noop() {
        let files = MemFiles::default();
        let proxy = MockProxy::default();

        let trail = decommission(
            &files,
            &proxy,
            &paths(&["/streams/8042.conf", "/endpoints/acme.conf"]),
        )
        .await;
        assert!(trail.ok);
        assert_eq!(trail.steps.len(), 1);
        assert_eq!(trail.steps[0].message, "no fragments present");
        assert_eq!(proxy.validations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn validation_failure_keeps_removal() {
        let files = MemFiles::with([("/endpoints/acme.conf", "# tenant: acme")]);
        let proxy = MockProxy::default();
        proxy.reject_config.store(true, Ordering::SeqCst);

        let trail = decommission(&files, &proxy, &paths(&["/endpoints/acme.conf"])).await;
        assert!(!trail.ok);
        assert_eq!(trail.first_failure().unwrap().name, StepName::Validate);
        assert!(!trail.contains(StepName::Rollback));
        assert_eq!(files.read(Path::new("/endpoints/acme.conf")).unwrap(), None);
        assert_eq!(proxy.reloads.load(Ordering::SeqCst), 0);
    }
}
