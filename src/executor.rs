//! Drives one step: gate, resolve, send, validate, extract, record.

use crate::context::ExecutionContext;
use crate::extractor;
use crate::gate;
use crate::model::{Endpoint, RequestBody, Step, StepResult};
use crate::openapi::EndpointResolver;
use crate::resolver::{LocalBindings, VariableResolver};
use crate::transport::{PreparedRequest, RequestSender};
use crate::validator::{check_success_range, Validator};
use chrono::Utc;
use serde_json::Value;
use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, instrument, warn};

/// Lifecycle of a step within one scenario run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    /// Gate denied. Never marked completed.
    Skipped,
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// The sender was never called and no result was recorded.
    Skipped { unmet: Vec<String> },
    Executed(StepResult),
}

impl StepOutcome {
    pub fn state(&self) -> StepState {
        match self {
            Self::Skipped { .. } => StepState::Skipped,
            Self::Executed(result) if result.passed => StepState::Succeeded,
            Self::Executed(_) => StepState::Failed,
        }
    }

    pub fn result(&self) -> Option<&StepResult> {
        match self {
            Self::Executed(result) => Some(result),
            Self::Skipped { .. } => None,
        }
    }
}

/// Borrows its collaborators; one executor serves every step of a
/// run.
pub struct StepExecutor<'a> {
    endpoints: &'a dyn EndpointResolver,
    sender: &'a dyn RequestSender,
    validator: Option<&'a dyn Validator>,
    resolver: &'a VariableResolver,
}

impl<'a> StepExecutor<'a> {
    pub fn new(
        endpoints: &'a dyn EndpointResolver,
        sender: &'a dyn RequestSender,
        resolver: &'a VariableResolver,
    ) -> Self {
        Self {
            endpoints,
            sender,
            validator: None,
            resolver,
        }
    }

    /// Without a validator only the 2xx range decides pass/fail.
    pub fn with_validator(mut self, validator: &'a dyn Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Resolve every template of `step` against `ctx`.
    ///
    /// Path params are resolved first and become local bindings, so
    /// they win over context variables everywhere else in the step.
    /// The endpoint path is made concrete before query, headers and
    /// body.
    pub fn prepare_request(
        &self,
        step: &Step,
        ctx: &ExecutionContext,
    ) -> PreparedRequest {
        let mut locals = LocalBindings::new();
        let mut unresolved = Vec::new();

        let mut path_params = HashMap::new();
        for (name, template) in &step.path_params {
            let sub = self.resolver.substitute(template, &mut locals, ctx);
            unresolved.extend(sub.unresolved);
            locals.insert(name.clone(), Value::String(sub.text.clone()));
            path_params.insert(name.clone(), sub.text);
        }

        let path = self.resolver.substitute(
            &step.target.path,
            &mut locals,
            ctx,
        );
        unresolved.extend(path.unresolved);

        let mut fill = |templates: &HashMap<String, String>| {
            templates
                .iter()
                .map(|(name, template)| {
                    let sub =
                        self.resolver.substitute(template, &mut locals, ctx);
                    unresolved.extend(sub.unresolved);
                    (name.clone(), sub.text)
                })
                .collect::<HashMap<_, _>>()
        };
        let query_params = fill(&step.query_params);
        let headers = fill(&step.headers);

        let body = step.request_body.as_ref().and_then(|body| {
            body_template(&step.name, body).map(|template| {
                let sub =
                    self.resolver.substitute(&template, &mut locals, ctx);
                unresolved.extend(sub.unresolved);
                sub.text
            })
        });

        let mut seen = HashSet::new();
        unresolved.retain(|name| seen.insert(name.clone()));

        PreparedRequest {
            path: path.text,
            path_params,
            query_params,
            headers,
            body,
            unresolved,
        }
    }

    /// Run `step` and record its outcome in `ctx`.
    ///
    /// A step that gets any HTTP response is completed, pass or fail.
    /// A transport failure records a failed result but leaves the step
    /// incomplete, so its dependents are skipped.
    #[instrument(skip(self, step, ctx), fields(step = %step.name))]
    pub async fn execute(
        &self,
        step: &Step,
        scenario: &str,
        ctx: &mut ExecutionContext,
    ) -> StepOutcome {
        if !gate::can_run(step, ctx.status()) {
            let unmet: Vec<String> = gate::unmet_dependencies(step, ctx.status())
                .into_iter()
                .map(String::from)
                .collect();
            warn!(
                "Skipping step '{}': dependencies not completed: {}",
                step.name,
                unmet.join(", ")
            );
            transition(step, StepState::Pending, StepState::Skipped);
            return StepOutcome::Skipped { unmet };
        }
        transition(step, StepState::Pending, StepState::Running);

        let endpoint = match self
            .endpoints
            .find(&step.target.path, step.target.method)
        {
            Some(endpoint) => Cow::Borrowed(endpoint),
            None => {
                debug!(
                    "{} {} not in the API definition, using a synthetic endpoint",
                    step.target.method, step.target.path
                );
                Cow::Owned(Endpoint::synthetic(step))
            }
        };

        let request = self.prepare_request(step, ctx);
        let tested_at = Utc::now();
        let started = Instant::now();

        let result = match self.sender.send(&endpoint, &request).await {
            Err(err) => {
                warn!("Step '{}' failed to send: {}", step.name, err);
                ctx.set_completed(&step.name, false);
                StepResult {
                    scenario: scenario.to_string(),
                    step: step.name.clone(),
                    method: step.target.method,
                    path: request.path,
                    status: None,
                    expected_status: None,
                    passed: false,
                    failure_reason: Some(err.to_string()),
                    transport_error: true,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                    response_body: None,
                    tested_at,
                }
            }
            Ok(response) => {
                let validation = match self.validator {
                    Some(validator) => {
                        validator.validate(&endpoint, &step.assertions, &response)
                    }
                    None => check_success_range(&response),
                };
                ctx.set_completed(&step.name, true);

                if !step.extract.is_empty() && !response.body.trim().is_empty() {
                    match extractor::extract(&step.extract, &response.body, ctx) {
                        Ok(report) => debug!(
                            "Extracted {} of {} variables",
                            report.extracted.len(),
                            step.extract.len()
                        ),
                        Err(err) => warn!(
                            "Extraction skipped for step '{}': {}",
                            step.name, err
                        ),
                    }
                }

                StepResult {
                    scenario: scenario.to_string(),
                    step: step.name.clone(),
                    method: step.target.method,
                    path: request.path,
                    status: Some(response.status),
                    expected_status: validation.expected_status,
                    passed: validation.passed,
                    failure_reason: validation.failure_reason,
                    transport_error: false,
                    elapsed_ms: response.elapsed_ms,
                    response_body: Some(response.body),
                    tested_at,
                }
            }
        };

        let state = if result.passed {
            StepState::Succeeded
        } else {
            StepState::Failed
        };
        transition(step, StepState::Running, state);

        ctx.record_result(result.clone());
        StepOutcome::Executed(result)
    }
}

fn transition(step: &Step, from: StepState, to: StepState) {
    debug!("Step '{}': {:?} -> {:?}", step.name, from, to);
}

fn body_template(step: &str, body: &RequestBody) -> Option<String> {
    match body.template() {
        Ok(template) => Some(template),
        Err(err) => {
            warn!("Request body of step '{}' dropped: {}", step, err);
            None
        }
    }
}
