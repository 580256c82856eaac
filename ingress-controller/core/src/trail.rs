use serde::Serialize;
use std::fmt;

/// The ordered record of what a provisioning or decommissioning run did.
///
/// `ok` tracks fatal failures only. Secondary failures, e.g. a registry write after the proxy
/// already serves the new configuration, are recorded as failed steps via [`Trail::warn`] without
/// clearing `ok`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Trail {
    pub ok: bool,
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Step {
    pub name: StepName,
    pub ok: bool,
    pub message: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepName {
    Resolve,
    ResolveApi,
    ResolveWeb,
    Synthesize,
    Stage,
    Swap,
    Validate,
    Reload,
    Rollback,
    Discover,
    Remove,
    RecordPorts,
    ClearPorts,
}

// === impl Trail ===

impl Default for Trail {
    fn default() -> Self {
        Self {
            ok: true,
            steps: Vec::new(),
        }
    }
}

impl Trail {
    pub fn pass(&mut self, name: StepName, message: impl Into<String>) {
        self.push(name, true, message.into());
    }

    /// Records a fatal failure.
    pub fn fail(&mut self, name: StepName, message: impl Into<String>) {
        self.ok = false;
        self.push(name, false, message.into());
    }

    /// Records a failure that does not affect the overall outcome.
    pub fn warn(&mut self, name: StepName, message: impl Into<String>) {
        self.push(name, false, message.into());
    }

    pub fn extend(&mut self, other: Trail) {
        self.ok &= other.ok;
        self.steps.extend(other.steps);
    }

    /// The first failed step, fatal or not.
    pub fn first_failure(&self) -> Option<&Step> {
        self.steps.iter().find(|s| !s.ok)
    }

    pub fn contains(&self, name: StepName) -> bool {
        self.steps.iter().any(|s| s.name == name)
    }

    fn push(&mut self, name: StepName, ok: bool, message: String) {
        self.steps.push(Step { name, ok, message });
    }
}

impl fmt::Display for Trail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            writeln!(f, "{step}")?;
        }
        write!(f, "{}", if self.ok { "succeeded" } else { "failed" })
    }
}

// === impl Step ===

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.ok { "ok" } else { "FAILED" };
        write!(f, "[{mark:>6}] {}: {}", self.name, self.message)
    }
}

// === impl StepName ===

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Resolve => "resolve",
            Self::ResolveApi => "resolve-api",
            Self::ResolveWeb => "resolve-web",
            Self::Synthesize => "synthesize",
            Self::Stage => "stage",
            Self::Swap => "swap",
            Self::Validate => "validate",
            Self::Reload => "reload",
            Self::Rollback => "rollback",
            Self::Discover => "discover",
            Self::Remove => "remove",
            Self::RecordPorts => "record-ports",
            Self::ClearPorts => "clear-ports",
        }
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warnings_do_not_fail_the_trail() {
        let mut trail = Trail::default();
        trail.pass(StepName::Validate, "syntax is ok");
        trail.warn(StepName::RecordPorts, "registry unavailable");
        assert!(trail.ok);
        assert_eq!(trail.first_failure().unwrap().name, StepName::RecordPorts);

        let mut failed = Trail::default();
        failed.fail(StepName::Reload, "signal process failed");
        trail.extend(failed);
        assert!(!trail.ok);
        assert_eq!(trail.steps.len(), 3);
    }

    #[test]
    fn renders_plain() {
        let mut trail = Trail::default();
        trail.pass(StepName::Stage, "staged 10 bytes");
        trail.fail(StepName::Validate, "unexpected \"}\"");
        assert_eq!(
            trail.to_string(),
            "[    ok] stage: staged 10 bytes\n[FAILED] validate: unexpected \"}\"\nfailed"
        );
    }
}
