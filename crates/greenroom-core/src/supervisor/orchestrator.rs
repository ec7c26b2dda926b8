//! Scenario orchestrator: launch → run one assessment → teardown.
//!
//! Every launch path has a matching stop path. A failed launch stops what it
//! already started; [`Orchestrator::run_scenario`] always tears down, also
//! when [`Orchestrator::run_scenario_until`] is interrupted, and a
//! [`ScenarioHandle`] dropped without teardown kills its processes.

use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::Instrument;

use crate::client::{AgentClient, ClientError};
use crate::contract::{
    AssessmentResult, Endpoint, FailureReason, Hook, LifecycleFailure, StatusUpdate, Task,
    TaskId, TaskStatus, TaskSubmission,
};
use crate::metrics::METRICS;
use crate::obs;

use super::config::OrchestratorConfig;
use super::error::{SupervisorError, SupervisorResult};
use super::process::{HealthState, RoleProcess, StopOutcome};
use super::scenario::Scenario;

/// Callback receiving every status update in emission order.
pub type Observer<'a> = &'a mut (dyn FnMut(&StatusUpdate) + Send);

/// The running processes of one launched scenario.
#[derive(Debug)]
pub struct ScenarioHandle {
    scenario: Scenario,
    processes: Vec<RoleProcess>,
}

impl ScenarioHandle {
    pub fn scenario(&self) -> &Scenario {
        &self.scenario
    }

    /// Processes in launch order.
    pub fn processes(&self) -> &[RoleProcess] {
        &self.processes
    }

    pub fn process(&self, role: &str) -> Option<&RoleProcess> {
        self.processes.iter().find(|p| p.role() == role)
    }

    pub fn ready_count(&self) -> usize {
        self.processes
            .iter()
            .filter(|p| p.state() == HealthState::Ready)
            .count()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.processes.iter().filter_map(RoleProcess::pid).collect()
    }
}

impl Drop for ScenarioHandle {
    fn drop(&mut self) {
        if self.processes.is_empty() {
            return;
        }
        tracing::warn!(
            scenario = %self.scenario.name,
            processes = self.processes.len(),
            "scenario handle dropped without teardown; killing processes"
        );
        for process in &mut self.processes {
            process.kill_now();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoppedRole {
    pub role: String,
    pub pid: Option<u32>,
    pub outcome: StopOutcome,
}

/// What teardown did. Errors are recorded here and logged, never raised.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    /// Roles in stop order (reverse of launch order).
    pub stopped: Vec<StoppedRole>,
    pub errors: Vec<String>,
    /// Processes still running after teardown returned.
    pub live_remaining: usize,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.live_remaining == 0
    }

    pub fn forced_kills(&self) -> usize {
        self.stopped
            .iter()
            .filter(|s| s.outcome == StopOutcome::Killed)
            .count()
    }
}

/// Owns the local task mirror and the teardown history. One assessment at a
/// time; mutated only through `&mut self`.
pub struct Orchestrator {
    config: OrchestratorConfig,
    client: AgentClient,
    tasks: HashMap<TaskId, Task>,
    /// Evaluator endpoint and id of the task being watched.
    active: Option<(Endpoint, TaskId)>,
    last_teardown: Option<TeardownReport>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> SupervisorResult<Self> {
        let client = AgentClient::new(config.client.clone())?;
        Ok(Self {
            config,
            client,
            tasks: HashMap::new(),
            active: None,
            last_teardown: None,
        })
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Local view of a task driven by this orchestrator.
    pub fn task(&self, task_id: TaskId) -> Option<&Task> {
        self.tasks.get(&task_id)
    }

    /// Drop the local view once the caller has read the outcome.
    pub fn forget_task(&mut self, task_id: TaskId) -> Option<Task> {
        self.tasks.remove(&task_id)
    }

    pub fn last_teardown(&self) -> Option<&TeardownReport> {
        self.last_teardown.as_ref()
    }

    /// Start every role in declared order and wait for each to become ready.
    ///
    /// On failure every process already started is stopped before
    /// [`SupervisorError::StartupTimeout`] is returned.
    pub async fn launch(&mut self, scenario: &Scenario) -> SupervisorResult<ScenarioHandle> {
        tracing::info!(scenario = %scenario.name, roles = scenario.roles.len(), "launching scenario");
        let mut handle = ScenarioHandle {
            scenario: scenario.clone(),
            processes: Vec::with_capacity(scenario.roles.len()),
        };

        for role in &scenario.roles {
            let mut process = match RoleProcess::spawn(role, &scenario.base_dir, self.config.inherit_output) {
                Ok(process) => process,
                Err(e) => {
                    self.teardown(handle).await;
                    return Err(SupervisorError::StartupTimeout {
                        role: role.name.clone(),
                        waited_ms: 0,
                        cause: format!("cannot spawn `{}`: {e}", role.launch_command),
                    });
                }
            };
            METRICS.inc_processes_spawned();
            obs::emit_role_spawned(&role.name, process.pid(), &role.endpoint.to_string());

            let budget = role.startup_timeout.unwrap_or(self.config.startup_timeout);
            let ready = self.await_ready(&mut process, budget).await;
            handle.processes.push(process);
            if let Err(err) = ready {
                self.teardown(handle).await;
                return Err(err);
            }
        }
        Ok(handle)
    }

    async fn await_ready(&self, process: &mut RoleProcess, budget: Duration) -> SupervisorResult<()> {
        let probe = self.client.with_request_timeout(self.config.probe_timeout);
        let started = Instant::now();
        let mut delay = self.config.health_poll_initial;
        loop {
            if let Some(status) = process.exit_status() {
                process.set_state(HealthState::Failed);
                return Err(SupervisorError::StartupTimeout {
                    role: process.role().to_string(),
                    waited_ms: started.elapsed().as_millis() as u64,
                    cause: format!("process exited during startup ({status})"),
                });
            }
            let path = process.definition().health_check_path.clone();
            if probe.probe_health(process.endpoint(), &path).await {
                process.set_state(HealthState::Ready);
                obs::emit_role_ready(process.role(), started.elapsed().as_millis() as u64);
                return Ok(());
            }
            let elapsed = started.elapsed();
            if elapsed >= budget {
                process.set_state(HealthState::Failed);
                return Err(SupervisorError::StartupTimeout {
                    role: process.role().to_string(),
                    waited_ms: elapsed.as_millis() as u64,
                    cause: format!("no healthy answer from {}{path}", process.endpoint()),
                });
            }
            tokio::time::sleep(delay.min(budget - elapsed)).await;
            delay = (delay * 2).min(self.config.health_poll_max);
        }
    }

    /// Submit one task to the evaluator, follow it to a terminal status and
    /// fetch the result.
    ///
    /// A FAILED task surfaces as [`SupervisorError::Lifecycle`], or as
    /// [`SupervisorError::Timeout`] when the failure is timeout-tagged. When
    /// the watch budget runs out the local task is failed with a timeout tag
    /// and the evaluator is asked to cancel.
    pub async fn run_assessment(
        &mut self,
        handle: &ScenarioHandle,
        observer: Option<Observer<'_>>,
    ) -> SupervisorResult<AssessmentResult> {
        let scenario = handle.scenario();
        let evaluator = scenario
            .evaluator()
            .ok_or_else(|| SupervisorError::UnknownRole(scenario.assessment.evaluator.clone()))?;
        let endpoint = evaluator.endpoint.clone();
        let budget = scenario
            .assessment
            .timeout
            .unwrap_or(self.config.assessment_timeout);

        let task_id = TaskId::new();
        let submission = scenario.submission(task_id);
        self.tasks.insert(task_id, Task::new(task_id));
        self.active = Some((endpoint.clone(), task_id));
        tracing::info!(task_id = %task_id, evaluator = %evaluator.name, "submitting assessment");

        let outcome = self
            .follow(&endpoint, &submission, budget, observer)
            .await;
        self.active = None;
        outcome
    }

    async fn follow(
        &mut self,
        endpoint: &Endpoint,
        submission: &TaskSubmission,
        budget: Duration,
        mut observer: Option<Observer<'_>>,
    ) -> SupervisorResult<AssessmentResult> {
        let task_id = submission.task_id;
        self.client.submit_task(endpoint, submission).await?;

        let mut stream = self.client.stream_updates(endpoint, task_id, budget);
        let terminal = loop {
            match stream.next().await {
                Some(Ok(update)) => {
                    self.mirror(task_id, update.clone())?;
                    if let Some(observer) = observer.as_deref_mut() {
                        observer(&update);
                    }
                    if update.is_terminal() {
                        break update;
                    }
                }
                Some(Err(ClientError::Timeout { .. })) => {
                    return Err(self.abandon(endpoint, task_id, budget).await);
                }
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(SupervisorError::Protocol {
                        task_id,
                        reason: "update stream ended before a terminal status".to_string(),
                    })
                }
            }
        };
        drop(stream);

        if terminal.status == TaskStatus::Completed {
            let result = self.client.fetch_result(endpoint, task_id).await?;
            if let Some(task) = self.tasks.get_mut(&task_id) {
                task.attach_result(result.clone())
                    .map_err(|e| SupervisorError::Protocol {
                        task_id,
                        reason: e.to_string(),
                    })?;
            }
            return Ok(result);
        }

        let failure = terminal.failure().unwrap_or_else(|| {
            LifecycleFailure::new(Hook::Evaluate, FailureReason::Error, terminal.message.clone())
        });
        if failure.is_timeout() {
            Err(SupervisorError::Timeout {
                task_id,
                detail: failure.to_string(),
            })
        } else {
            Err(SupervisorError::Lifecycle { task_id, failure })
        }
    }

    fn mirror(&mut self, task_id: TaskId, update: StatusUpdate) -> SupervisorResult<()> {
        let task = self
            .tasks
            .get_mut(&task_id)
            .ok_or_else(|| SupervisorError::Protocol {
                task_id,
                reason: "update for a task this orchestrator did not submit".to_string(),
            })?;
        task.apply(update).map_err(|e| SupervisorError::Protocol {
            task_id,
            reason: e.to_string(),
        })
    }

    /// Stop watching: fail the local task with a timeout tag and ask the
    /// evaluator to cancel. The remote lifecycle stays authoritative.
    async fn abandon(&mut self, endpoint: &Endpoint, task_id: TaskId, budget: Duration) -> SupervisorError {
        let detail = format!("no terminal status within {}ms", budget.as_millis());
        self.fail_and_cancel(endpoint, task_id, FailureReason::Timeout, &detail)
            .await;
        SupervisorError::Timeout { task_id, detail }
    }

    /// Stop watching after an interrupt: fail the local task as cancelled
    /// and ask the evaluator to cancel.
    async fn interrupt(&mut self) -> SupervisorError {
        let Some((endpoint, task_id)) = self.active.take() else {
            return SupervisorError::Interrupted {
                task_id: None,
                detail: "no assessment was running".to_string(),
            };
        };
        let detail = format!("stopped watching task {task_id}; cancellation requested");
        self.fail_and_cancel(&endpoint, task_id, FailureReason::Cancelled, &detail)
            .await;
        SupervisorError::Interrupted {
            task_id: Some(task_id),
            detail,
        }
    }

    async fn fail_and_cancel(
        &mut self,
        endpoint: &Endpoint,
        task_id: TaskId,
        reason: FailureReason,
        detail: &str,
    ) {
        if let Some(task) = self.tasks.get_mut(&task_id) {
            if !task.is_terminal() {
                let failure = LifecycleFailure::new(task.current_hook(), reason, detail);
                if let Err(e) = task.inject_failure(failure) {
                    tracing::warn!(task_id = %task_id, error = %e, "could not fail local task");
                }
            }
        }
        let canceller = self.client.with_request_timeout(self.config.probe_timeout);
        match canceller.cancel_task(endpoint, task_id).await {
            Ok(cancelled) => tracing::info!(task_id = %task_id, cancelled, reason = %reason, "requested cancellation"),
            Err(e) => tracing::warn!(task_id = %task_id, error = %e, "cancellation request failed"),
        }
    }

    /// Stop every process in reverse launch order. Never fails; problems are
    /// logged and recorded in the report.
    pub async fn teardown(&mut self, mut handle: ScenarioHandle) -> TeardownReport {
        let processes = std::mem::take(&mut handle.processes);
        let client = self.client.with_request_timeout(self.config.stop_grace);
        let mut report = TeardownReport::default();

        for mut process in processes.into_iter().rev() {
            let role = process.role().to_string();
            let pid = process.pid();
            match process.stop(&client, self.config.stop_grace).await {
                Ok(outcome) => {
                    METRICS.inc_processes_stopped(outcome == StopOutcome::Killed);
                    obs::emit_role_stopped(&role, outcome.as_str());
                    report.stopped.push(StoppedRole { role, pid, outcome });
                }
                Err(e) => {
                    obs::emit_teardown_error(&role, &e);
                    report.errors.push(format!("{role}: {e}"));
                    if !process.kill_and_reap(self.config.stop_grace).await {
                        report.errors.push(format!("{role}: not reaped after kill"));
                    }
                }
            }
            if process.is_alive() {
                report.live_remaining += 1;
            }
        }

        tracing::info!(
            scenario = %handle.scenario.name,
            stopped = report.stopped.len(),
            forced = report.forced_kills(),
            errors = report.errors.len(),
            "teardown complete"
        );
        self.last_teardown = Some(report.clone());
        report
    }

    /// Launch, run one assessment, and tear down whatever the outcome.
    pub async fn run_scenario(
        &mut self,
        scenario: &Scenario,
        observer: Option<Observer<'_>>,
    ) -> SupervisorResult<AssessmentResult> {
        self.run_scenario_until(scenario, observer, std::future::pending())
            .await
    }

    /// [`run_scenario`](Self::run_scenario), abandoned when `interrupt`
    /// resolves.
    ///
    /// An interrupt while watching fails the local task as cancelled, asks
    /// the evaluator to cancel and tears down before returning
    /// [`SupervisorError::Interrupted`]. An interrupt during launch kills
    /// the roles started so far.
    pub async fn run_scenario_until<F>(
        &mut self,
        scenario: &Scenario,
        observer: Option<Observer<'_>>,
        interrupt: F,
    ) -> SupervisorResult<AssessmentResult>
    where
        F: Future<Output = ()>,
    {
        let span = obs::scenario_span(&scenario.name);
        self.launch_run_teardown(scenario, observer, interrupt)
            .instrument(span)
            .await
    }

    async fn launch_run_teardown<F>(
        &mut self,
        scenario: &Scenario,
        observer: Option<Observer<'_>>,
        interrupt: F,
    ) -> SupervisorResult<AssessmentResult>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(interrupt);

        let launched = tokio::select! {
            launched = self.launch(scenario) => Some(launched),
            () = &mut interrupt => None,
        };
        let Some(launched) = launched else {
            tracing::warn!(scenario = %scenario.name, "interrupted during launch");
            return Err(SupervisorError::Interrupted {
                task_id: None,
                detail: "interrupted during launch; started roles were killed".to_string(),
            });
        };
        let handle = launched?;

        let watched = tokio::select! {
            outcome = self.run_assessment(&handle, observer) => Some(outcome),
            () = &mut interrupt => None,
        };
        let outcome = match watched {
            Some(outcome) => outcome,
            None => {
                tracing::warn!(scenario = %scenario.name, "interrupted; tearing down");
                Err(self.interrupt().await)
            }
        };
        let report = self.teardown(handle).await;
        if !report.is_clean() {
            tracing::warn!(errors = ?report.errors, live = report.live_remaining, "teardown incomplete");
        }
        outcome
    }

    /// Launch and keep every role running until `until` resolves.
    pub async fn serve<F>(&mut self, scenario: &Scenario, until: F) -> SupervisorResult<TeardownReport>
    where
        F: Future<Output = ()>,
    {
        let handle = self.launch(scenario).await?;
        tracing::info!(scenario = %scenario.name, ready = handle.ready_count(), "all roles ready; serving");
        until.await;
        Ok(self.teardown(handle).await)
    }
}
