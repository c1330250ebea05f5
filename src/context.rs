//! Per-scenario execution state.

use crate::model::StepResult;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// step name -> completed flag.
pub type StepStatus = HashMap<String, bool>;

/// Variables, completion flags and results for one scenario run.
///
/// Owned by the runner and passed by `&mut` to every step in turn;
/// nothing else touches it while a scenario runs.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    variables: HashMap<String, Value>,
    results: HashMap<String, StepResult>,
    status: StepStatus,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with the given variables already bound.
    pub fn with_variables(variables: HashMap<String, Value>) -> Self {
        Self {
            variables,
            ..Self::default()
        }
    }

    /// Clear completion flags and results. Variables are kept.
    pub fn begin_scenario(&mut self) {
        self.status.clear();
        self.results.clear();
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Add or overwrite. Variables never shrink during a run.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn variables(&self) -> &HashMap<String, Value> {
        &self.variables
    }

    pub fn into_variables(self) -> HashMap<String, Value> {
        self.variables
    }

    pub fn status(&self) -> &StepStatus {
        &self.status
    }

    pub fn is_completed(&self, step: &str) -> bool {
        self.status.get(step).copied().unwrap_or(false)
    }

    /// Record the completion flag for a step. Write-once per
    /// scenario run; a second write is ignored.
    pub fn set_completed(&mut self, step: &str, completed: bool) {
        if self.status.contains_key(step) {
            warn!("Step '{}' already has a status; keeping the first", step);
            return;
        }
        self.status.insert(step.to_string(), completed);
    }

    pub fn result(&self, step: &str) -> Option<&StepResult> {
        self.results.get(step)
    }

    /// Write-once per scenario run, like [`Self::set_completed`].
    pub fn record_result(&mut self, result: StepResult) {
        if self.results.contains_key(&result.step) {
            warn!(
                "Step '{}' already has a result; keeping the first",
                result.step
            );
            return;
        }
        self.results.insert(result.step.clone(), result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HttpMethod;
    use chrono::Utc;
    use serde_json::json;

    fn result(step: &str, status: u16) -> StepResult {
        StepResult {
            scenario: "s".into(),
            step: step.into(),
            method: HttpMethod::Get,
            path: "/x".into(),
            status: Some(status),
            expected_status: None,
            passed: true,
            failure_reason: None,
            transport_error: false,
            elapsed_ms: 1,
            response_body: None,
            tested_at: Utc::now(),
        }
    }

    #[test]
    fn test_variables_last_write_wins() {
        let mut ctx = ExecutionContext::new();
        ctx.set_variable("id", json!(1));
        ctx.set_variable("id", json!("two"));
        assert_eq!(ctx.variable("id"), Some(&json!("two")));
        assert_eq!(ctx.variable("missing"), None);
    }

    #[test]
    fn test_status_and_results_are_write_once() {
        let mut ctx = ExecutionContext::new();
        ctx.set_completed("login", true);
        ctx.set_completed("login", false);
        assert!(ctx.is_completed("login"));

        ctx.record_result(result("login", 200));
        ctx.record_result(result("login", 500));
        assert_eq!(ctx.result("login").unwrap().status, Some(200));
    }

    #[test]
    fn test_begin_scenario_keeps_variables() {
        let mut ctx = ExecutionContext::with_variables(HashMap::from([(
            "token".to_string(),
            json!("abc"),
        )]));
        ctx.set_completed("login", true);
        ctx.record_result(result("login", 200));

        ctx.begin_scenario();

        assert!(!ctx.is_completed("login"));
        assert!(ctx.result("login").is_none());
        assert_eq!(ctx.variable("token"), Some(&json!("abc")));
    }
}
