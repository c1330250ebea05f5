//! Dependency gating between steps of one scenario.

use crate::context::StepStatus;
use crate::model::{Scenario, Step};
use std::collections::HashSet;

/// A step runs when every dependency has completed, pass or fail.
/// Steps without dependencies always run.
pub fn can_run(step: &Step, status: &StepStatus) -> bool {
    step.dependencies
        .iter()
        .all(|dep| status.get(dep).copied().unwrap_or(false))
}

/// Dependencies of `step` that have not completed.
pub fn unmet_dependencies<'a>(
    step: &'a Step,
    status: &StepStatus,
) -> Vec<&'a str> {
    step.dependencies
        .iter()
        .filter(|dep| !status.get(dep.as_str()).copied().unwrap_or(false))
        .map(String::as_str)
        .collect()
}

/// A dependency that cannot be satisfied by declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyIssue {
    pub step: String,
    pub dependency: String,
    pub kind: IssueKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// No step of that name exists in the scenario.
    Unknown,
    /// Names the step itself or a later step. Every dependency cycle
    /// contains at least one of these.
    NotEarlier,
}

/// Dependencies that will never be satisfied because steps run in
/// declaration order. Such steps are always skipped at run time.
pub fn lint(scenario: &Scenario) -> Vec<DependencyIssue> {
    let all: HashSet<&str> =
        scenario.steps.iter().map(|s| s.name.as_str()).collect();
    let mut earlier: HashSet<&str> = HashSet::new();
    let mut issues = Vec::new();

    for step in &scenario.steps {
        for dep in &step.dependencies {
            let kind = if earlier.contains(dep.as_str()) {
                continue;
            } else if all.contains(dep.as_str()) {
                IssueKind::NotEarlier
            } else {
                IssueKind::Unknown
            };
            issues.push(DependencyIssue {
                step: step.name.clone(),
                dependency: dep.clone(),
                kind,
            });
        }
        earlier.insert(step.name.as_str());
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, deps: &[&str]) -> Step {
        let mut step: Step = serde_yaml::from_str(&format!(
            "name: {name}\nendpoint: /{name}\nmethod: GET\n"
        ))
        .unwrap();
        step.dependencies = deps.iter().map(|d| d.to_string()).collect();
        step
    }

    fn scenario(steps: Vec<Step>) -> Scenario {
        Scenario {
            name: "s".into(),
            description: None,
            steps,
        }
    }

    #[test]
    fn test_no_dependencies_always_runs() {
        assert!(can_run(&step("a", &[]), &StepStatus::new()));
    }

    #[test]
    fn test_requires_every_dependency_completed() {
        let b = step("b", &["a", "x"]);
        let mut status = StepStatus::new();
        assert!(!can_run(&b, &status));

        status.insert("a".into(), true);
        assert!(!can_run(&b, &status));
        assert_eq!(unmet_dependencies(&b, &status), vec!["x"]);

        status.insert("x".into(), false);
        assert!(!can_run(&b, &status));

        status.insert("x".into(), true);
        assert!(can_run(&b, &status));
        assert!(unmet_dependencies(&b, &status).is_empty());
    }

    #[test]
    fn test_lint_accepts_backward_references() {
        let s = scenario(vec![step("a", &[]), step("b", &["a"])]);
        assert!(lint(&s).is_empty());
    }

    #[test]
    fn test_lint_reports_cycles_and_unknown_names() {
        let s = scenario(vec![
            step("a", &["b"]),
            step("b", &["a"]),
            step("c", &["ghost"]),
            step("d", &["d"]),
        ]);
        let issues = lint(&s);
        assert_eq!(
            issues,
            vec![
                DependencyIssue {
                    step: "a".into(),
                    dependency: "b".into(),
                    kind: IssueKind::NotEarlier,
                },
                DependencyIssue {
                    step: "c".into(),
                    dependency: "ghost".into(),
                    kind: IssueKind::Unknown,
                },
                DependencyIssue {
                    step: "d".into(),
                    dependency: "d".into(),
                    kind: IssueKind::NotEarlier,
                },
            ]
        );
    }
}
