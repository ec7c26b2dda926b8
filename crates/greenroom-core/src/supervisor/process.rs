//! One supervised role process.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use serde::Serialize;
use tokio::process::{Child, Command};

use crate::client::AgentClient;
use crate::contract::Endpoint;

use super::scenario::RoleDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Starting,
    Ready,
    Failed,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    /// Exited after the shutdown request, within the grace period.
    Graceful,
    /// Had to be killed.
    Killed,
    /// Was already gone when teardown reached it.
    AlreadyExited,
}

impl StopOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            StopOutcome::Graceful => "graceful",
            StopOutcome::Killed => "killed",
            StopOutcome::AlreadyExited => "already_exited",
        }
    }
}

/// A child process owned by the supervisor. Killed if dropped while running.
#[derive(Debug)]
pub struct RoleProcess {
    role: RoleDefinition,
    child: Child,
    pid: Option<u32>,
    state: HealthState,
}

impl RoleProcess {
    pub fn spawn(role: &RoleDefinition, base_dir: &Path, inherit_output: bool) -> std::io::Result<Self> {
        let (program, args) = role.launch_command.program();
        let output = || {
            if inherit_output {
                Stdio::inherit()
            } else {
                Stdio::null()
            }
        };
        let child = Command::new(program)
            .args(args)
            .current_dir(base_dir)
            .envs(&role.env)
            .stdin(Stdio::null())
            .stdout(output())
            .stderr(output())
            .kill_on_drop(true)
            .spawn()?;
        let pid = child.id();
        Ok(Self {
            role: role.clone(),
            child,
            pid,
            state: HealthState::Starting,
        })
    }

    pub fn role(&self) -> &str {
        &self.role.name
    }

    pub fn definition(&self) -> &RoleDefinition {
        &self.role
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.role.endpoint
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> HealthState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: HealthState) {
        self.state = state;
    }

    /// Exit status if the process has already exited.
    pub fn exit_status(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Ask the agent to exit over HTTP, wait up to `grace`, then kill and reap.
    ///
    /// An agent that cannot even take the shutdown request is killed at once.
    pub async fn stop(&mut self, client: &AgentClient, grace: Duration) -> std::io::Result<StopOutcome> {
        if self.child.try_wait()?.is_some() {
            self.state = HealthState::Stopped;
            return Ok(StopOutcome::AlreadyExited);
        }

        let endpoint = &self.role.endpoint;
        let child = &mut self.child;
        let graceful = match client.request_shutdown(endpoint).await {
            Ok(()) => tokio::time::timeout(grace, child.wait()).await.is_ok_and(|r| r.is_ok()),
            Err(e) => {
                tracing::debug!(role = %self.role.name, error = %e, "shutdown request failed");
                false
            }
        };

        let outcome = if graceful {
            StopOutcome::Graceful
        } else {
            if let Err(e) = self.child.start_kill() {
                tracing::debug!(role = %self.role.name, error = %e, "kill failed");
            }
            self.child.wait().await?;
            StopOutcome::Killed
        };
        self.state = HealthState::Stopped;
        Ok(outcome)
    }

    /// Kill and wait up to `grace` for the exit. Returns whether the
    /// process was reaped.
    pub async fn kill_and_reap(&mut self, grace: Duration) -> bool {
        if let Err(e) = self.child.start_kill() {
            tracing::debug!(role = %self.role.name, error = %e, "kill failed");
        }
        let reaped = matches!(tokio::time::timeout(grace, self.child.wait()).await, Ok(Ok(_)));
        if reaped {
            self.state = HealthState::Stopped;
        }
        reaped
    }

    /// Send SIGKILL without waiting. For drop paths.
    pub fn kill_now(&mut self) {
        let _ = self.child.start_kill();
    }
}
