//! Scenario and suite execution.

use crate::config::validate_scenarios;
use crate::context::ExecutionContext;
use crate::error::ConfigError;
use crate::executor::{StepExecutor, StepOutcome};
use crate::gate::{self, IssueKind};
use crate::model::{Scenario, ScenarioReport, SuiteReport};
use crate::openapi::EndpointResolver;
use crate::resolver::VariableResolver;
use crate::transport::RequestSender;
use crate::validator::Validator;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Scenario runner trait
#[async_trait]
pub trait ScenarioRunner: Send + Sync {
    /// Run every step of `scenario` in declaration order against
    /// `ctx`. Completion flags and results are reset first; variables
    /// are kept.
    async fn run_scenario(
        &self,
        scenario: &Scenario,
        ctx: &mut ExecutionContext,
    ) -> ScenarioReport;

    /// Validate the list, then run the scenarios in order. Only a
    /// malformed list is an error; step failures never abort the run.
    async fn run_suite(
        &self,
        scenarios: &[Scenario],
    ) -> Result<SuiteReport, ConfigError>;

    /// Run the one scenario called `name`.
    async fn run_named(
        &self,
        scenarios: &[Scenario],
        name: &str,
    ) -> Result<SuiteReport, ConfigError> {
        let scenario = scenarios
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ConfigError::UnknownScenario(name.to_string()))?;
        self.run_suite(std::slice::from_ref(scenario)).await
    }
}

/// Default scenario runner
pub struct DefaultScenarioRunner {
    endpoints: Box<dyn EndpointResolver>,
    sender: Arc<dyn RequestSender>,
    validator: Option<Box<dyn Validator>>,
    resolver: VariableResolver,
    isolate_variables: bool,
}

impl DefaultScenarioRunner {
    pub fn new(
        endpoints: Box<dyn EndpointResolver>,
        sender: Arc<dyn RequestSender>,
    ) -> Self {
        Self {
            endpoints,
            sender,
            validator: None,
            resolver: VariableResolver::default(),
            isolate_variables: false,
        }
    }

    pub fn with_validator(mut self, validator: Box<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn with_resolver(mut self, resolver: VariableResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Start each scenario with no variables instead of carrying them
    /// over from the previous one.
    pub fn isolate_variables(mut self, isolate: bool) -> Self {
        self.isolate_variables = isolate;
        self
    }

    fn executor(&self) -> StepExecutor<'_> {
        let executor = StepExecutor::new(
            self.endpoints.as_ref(),
            self.sender.as_ref(),
            &self.resolver,
        );
        match &self.validator {
            Some(validator) => executor.with_validator(validator.as_ref()),
            None => executor,
        }
    }
}

fn warn_dependency_issues(scenario: &Scenario) {
    for issue in gate::lint(scenario) {
        match issue.kind {
            IssueKind::Unknown => warn!(
                "Step '{}' depends on unknown step '{}' and will be skipped",
                issue.step, issue.dependency
            ),
            IssueKind::NotEarlier => warn!(
                "Step '{}' depends on '{}', which does not run before it; \
                 it will be skipped",
                issue.step, issue.dependency
            ),
        }
    }
}

#[async_trait]
impl ScenarioRunner for DefaultScenarioRunner {
    #[instrument(skip(self, scenario, ctx), fields(name = %scenario.name))]
    async fn run_scenario(
        &self,
        scenario: &Scenario,
        ctx: &mut ExecutionContext,
    ) -> ScenarioReport {
        let start_time = Instant::now();
        ctx.begin_scenario();
        warn_dependency_issues(scenario);

        info!("Starting scenario: {}", scenario.name);

        let executor = self.executor();
        let mut results = Vec::new();
        let mut skipped = Vec::new();

        for (step_idx, step) in scenario.steps.iter().enumerate() {
            info!(
                "Running step {}/{}: {}",
                step_idx + 1,
                scenario.steps.len(),
                step.name
            );

            match executor.execute(step, &scenario.name, ctx).await {
                StepOutcome::Executed(result) => results.push(result),
                StepOutcome::Skipped { .. } => skipped.push(step.name.clone()),
            }
        }

        let report = ScenarioReport {
            name: scenario.name.clone(),
            description: scenario.description.clone(),
            results,
            skipped,
            duration_ms: start_time.elapsed().as_millis() as u64,
        };

        info!(
            "Scenario finished: {} ({} ms) - {} executed, {} skipped",
            scenario.name,
            report.duration_ms,
            report.results.len(),
            report.skipped.len()
        );

        report
    }

    async fn run_suite(
        &self,
        scenarios: &[Scenario],
    ) -> Result<SuiteReport, ConfigError> {
        validate_scenarios(scenarios)?;

        let started_at = Utc::now();
        let start_time = Instant::now();
        let mut ctx = ExecutionContext::new();
        let mut reports = Vec::with_capacity(scenarios.len());

        for scenario in scenarios {
            if self.isolate_variables {
                ctx = ExecutionContext::new();
            }
            reports.push(self.run_scenario(scenario, &mut ctx).await);
        }

        Ok(SuiteReport {
            scenarios: reports,
            duration_ms: start_time.elapsed().as_millis() as u64,
            started_at,
        })
    }
}
