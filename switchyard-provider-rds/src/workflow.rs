//! Workflow - ordered, named deployment steps and the driver that runs them
//!
//! The configuration flags select a fixed sequence of steps. Every step
//! checks the last known deployment status first and skips itself when its
//! work is already done, so running the same workflow again after a partial
//! failure resumes where the previous run stopped. A failing step halts the
//! remaining regular steps; deferred steps (source cleanup) still run, except
//! after a cancellation.

use std::collections::BTreeMap;
use std::fmt;

use switchyard_core::deadline::Deadline;
use switchyard_core::diagnostic::{Diagnostic, Diagnostics};
use switchyard_core::utils::format_duration;

use crate::api::{BlueGreenDeployment, CreateDeploymentInput};
use crate::error::RdsResult;
use crate::orchestrator::{BlueGreenOrchestrator, CleanupOutcome};
use crate::status::DeploymentStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CreateDeployment,
    LocateDeployment,
    WaitAvailable,
    Switchover,
    WaitSwitchoverCompleted,
    CleanupSource,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::CreateDeployment => "create deployment",
            Step::LocateDeployment => "locate deployment",
            Step::WaitAvailable => "wait for deployment available",
            Step::Switchover => "switchover",
            Step::WaitSwitchoverCompleted => "wait for switchover completed",
            Step::CleanupSource => "cleanup source",
        }
    }

    /// Deferred steps run even after an earlier step failed
    pub fn is_deferred(&self) -> bool {
        matches!(self, Step::CleanupSource)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkflowFlags {
    pub create_deployment: bool,
    pub switchover_enabled: bool,
    pub cleanup_resources: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workflow {
    steps: Vec<Step>,
}

impl Workflow {
    pub fn plan(flags: &WorkflowFlags) -> Self {
        let mut steps = match (flags.create_deployment, flags.switchover_enabled) {
            (true, false) => vec![Step::CreateDeployment, Step::WaitAvailable],
            (true, true) => vec![
                Step::CreateDeployment,
                Step::WaitAvailable,
                Step::Switchover,
                Step::WaitSwitchoverCompleted,
            ],
            (false, true) => vec![
                Step::LocateDeployment,
                Step::Switchover,
                Step::WaitSwitchoverCompleted,
            ],
            (false, false) => Vec::new(),
        };
        if flags.cleanup_resources {
            steps.push(Step::CleanupSource);
        }
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// The cluster a workflow runs against
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowTarget {
    pub cluster_identifier: String,
    pub cluster_arn: String,
    /// Engine version the cluster runs right now
    pub current_engine_version: Option<String>,
    /// Engine version the green environment should run
    pub engine_version: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl WorkflowTarget {
    /// The cluster already runs the desired engine version
    pub fn is_converged(&self) -> bool {
        matches!(
            (&self.engine_version, &self.current_engine_version),
            (Some(want), Some(have)) if want == have
        )
    }

    fn create_input(&self) -> CreateDeploymentInput {
        CreateDeploymentInput {
            name: self.cluster_identifier.clone(),
            source_arn: self.cluster_arn.clone(),
            target_engine_version: self.engine_version.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// What a workflow run did
#[derive(Debug, Default)]
pub struct WorkflowReport {
    pub deployment_identifier: Option<String>,
    pub deployment_status: Option<DeploymentStatus>,
    pub completed: Vec<Step>,
    pub skipped: Vec<Step>,
    /// No deployment was needed: the cluster already runs the target version
    pub converged: bool,
    pub cleanup: Option<CleanupOutcome>,
    pub diagnostics: Diagnostics,
}

impl WorkflowReport {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.has_errors()
    }
}

enum StepOutcome {
    Done,
    Skipped(&'static str),
    /// Nothing left for the regular steps to act on
    Halt,
}

struct WorkflowRun<'a> {
    orchestrator: &'a BlueGreenOrchestrator,
    target: &'a WorkflowTarget,
    deadline: &'a Deadline,
    report: WorkflowReport,
}

/// Run `workflow` against `target` within `deadline`
pub async fn run_workflow(
    orchestrator: &BlueGreenOrchestrator,
    workflow: &Workflow,
    target: &WorkflowTarget,
    deadline: &Deadline,
) -> WorkflowReport {
    let mut run = WorkflowRun {
        orchestrator,
        target,
        deadline,
        report: WorkflowReport::default(),
    };
    let mut halted = false;
    let mut cancelled = false;

    for &step in workflow.steps() {
        if cancelled || (halted && !step.is_deferred()) {
            log::debug!("[{}] skipping step '{}'", target.cluster_identifier, step);
            run.report.skipped.push(step);
            continue;
        }

        log::info!("[{}] running step '{}'", target.cluster_identifier, step);
        match run.execute(step).await {
            Ok(StepOutcome::Done) => run.report.completed.push(step),
            Ok(StepOutcome::Skipped(reason)) => {
                log::info!("[{}] step '{}' skipped: {}", target.cluster_identifier, step, reason);
                run.report.skipped.push(step);
            }
            Ok(StepOutcome::Halt) => {
                run.report.completed.push(step);
                halted = true;
            }
            Err(e) => {
                if e.is_cancelled() {
                    // nothing runs after an interrupt, deferred steps included
                    log::warn!("[{}] step '{}' cancelled", target.cluster_identifier, step);
                    cancelled = true;
                } else {
                    log::error!("[{}] step '{}' failed: {}", target.cluster_identifier, step, e);
                }
                run.report.diagnostics.push(Diagnostic::error(
                    format!("{} failed", step),
                    format!("{}: {}", target.cluster_identifier, e),
                ));
                halted = true;
            }
        }
    }

    log::info!(
        "[{}] workflow finished in {}",
        target.cluster_identifier,
        format_duration(deadline.elapsed())
    );
    run.report
}

impl WorkflowRun<'_> {
    async fn execute(&mut self, step: Step) -> RdsResult<StepOutcome> {
        match step {
            Step::CreateDeployment => self.create_deployment().await,
            Step::LocateDeployment => self.locate_deployment().await,
            Step::WaitAvailable => self.wait_available().await,
            Step::Switchover => self.switchover().await,
            Step::WaitSwitchoverCompleted => self.wait_switchover_completed().await,
            Step::CleanupSource => self.cleanup_source().await,
        }
    }

    fn track(&mut self, deployment: &BlueGreenDeployment) {
        self.report.deployment_identifier = Some(deployment.identifier.clone());
        self.report.deployment_status = Some(deployment.status);
    }

    fn tracked(&self) -> Option<(String, DeploymentStatus)> {
        let id = self.report.deployment_identifier.clone()?;
        let status = self
            .report
            .deployment_status
            .unwrap_or(DeploymentStatus::Provisioning);
        Some((id, status))
    }

    async fn create_deployment(&mut self) -> RdsResult<StepOutcome> {
        let cluster = &self.target.cluster_identifier;
        if let Some(existing) = self.orchestrator.locate_deployment(cluster).await? {
            log::info!(
                "[{}] using existing blue/green deployment {} ({})",
                cluster,
                existing.identifier,
                existing.status
            );
            self.track(&existing);
            return Ok(StepOutcome::Done);
        }

        if self.target.is_converged() {
            log::info!(
                "[{}] already running engine version {}, no deployment needed",
                cluster,
                self.target.engine_version.as_deref().unwrap_or_default()
            );
            self.report.converged = true;
            return Ok(StepOutcome::Halt);
        }

        let id = self
            .orchestrator
            .create_deployment(&self.target.create_input())
            .await?;
        self.report.deployment_status = Some(DeploymentStatus::Provisioning);
        self.report.deployment_identifier = Some(id);
        Ok(StepOutcome::Done)
    }

    async fn locate_deployment(&mut self) -> RdsResult<StepOutcome> {
        let cluster = &self.target.cluster_identifier;
        match self.orchestrator.locate_deployment(cluster).await? {
            Some(deployment) => {
                self.track(&deployment);
                Ok(StepOutcome::Done)
            }
            None => {
                self.report.diagnostics.push(Diagnostic::warning(
                    "no blue/green deployment found",
                    format!(
                        "{}: switchover requested but no deployment exists; set create_deployment to create one",
                        cluster
                    ),
                ));
                Ok(StepOutcome::Halt)
            }
        }
    }

    async fn wait_available(&mut self) -> RdsResult<StepOutcome> {
        let Some((id, status)) = self.tracked() else {
            return Ok(StepOutcome::Skipped("no deployment"));
        };
        if status.is_switching_or_switched() {
            return Ok(StepOutcome::Skipped("deployment is already past AVAILABLE"));
        }

        let deployment = self
            .orchestrator
            .wait_for_available(&id, self.deadline.remaining())
            .await?;
        self.track(&deployment);
        Ok(StepOutcome::Done)
    }

    async fn switchover(&mut self) -> RdsResult<StepOutcome> {
        let Some((id, status)) = self.tracked() else {
            return Ok(StepOutcome::Skipped("no deployment"));
        };
        if status.is_switching_or_switched() {
            return Ok(StepOutcome::Skipped("switchover already started"));
        }

        self.orchestrator.start_switchover(&id).await?;
        self.report.deployment_status = Some(DeploymentStatus::SwitchoverInProgress);
        Ok(StepOutcome::Done)
    }

    async fn wait_switchover_completed(&mut self) -> RdsResult<StepOutcome> {
        let Some((id, status)) = self.tracked() else {
            return Ok(StepOutcome::Skipped("no deployment"));
        };
        if status == DeploymentStatus::SwitchoverCompleted {
            return Ok(StepOutcome::Skipped("switchover already completed"));
        }

        let deployment = self
            .orchestrator
            .wait_for_switchover_completed(&id, self.deadline.remaining())
            .await?;
        self.track(&deployment);
        Ok(StepOutcome::Done)
    }

    async fn cleanup_source(&mut self) -> RdsResult<StepOutcome> {
        let id = match self.report.deployment_identifier.clone() {
            Some(id) => id,
            None => match self
                .orchestrator
                .locate_deployment(&self.target.cluster_identifier)
                .await?
            {
                Some(deployment) => deployment.identifier,
                None => return Ok(StepOutcome::Skipped("no deployment")),
            },
        };

        let outcome = self.orchestrator.cleanup_source(&id, self.deadline).await?;
        let step_outcome = match &outcome {
            CleanupOutcome::Skipped(_) => StepOutcome::Skipped("switchover not completed"),
            CleanupOutcome::Completed { .. } => {
                self.report.deployment_status = Some(DeploymentStatus::Absent);
                StepOutcome::Done
            }
        };
        self.report.cleanup = Some(outcome);
        Ok(step_outcome)
    }
}
