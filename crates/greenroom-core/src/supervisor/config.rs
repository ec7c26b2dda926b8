use std::time::Duration;

use crate::client::ClientConfig;

/// Explicit orchestrator settings, threaded through every call.
///
/// Scenario values (`startup_timeout_secs`, `timeout_secs`) override these
/// per role / per assessment.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Time a role gets to answer its health probe.
    pub startup_timeout: Duration,
    /// First delay between health probes; doubles up to `health_poll_max`.
    pub health_poll_initial: Duration,
    pub health_poll_max: Duration,
    /// Budget of one health probe request.
    pub probe_timeout: Duration,
    /// Time between the shutdown request and a forced kill.
    pub stop_grace: Duration,
    /// Budget for watching one assessment to a terminal status.
    pub assessment_timeout: Duration,
    /// Pass role stdout/stderr through to ours.
    pub inherit_output: bool,
    pub client: ClientConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(30),
            health_poll_initial: Duration::from_millis(100),
            health_poll_max: Duration::from_secs(1),
            probe_timeout: Duration::from_secs(1),
            stop_grace: Duration::from_secs(5),
            assessment_timeout: Duration::from_secs(300),
            inherit_output: false,
            client: ClientConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_assessment_timeout(mut self, timeout: Duration) -> Self {
        self.assessment_timeout = timeout;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn with_inherit_output(mut self, inherit: bool) -> Self {
        self.inherit_output = inherit;
        self
    }
}
