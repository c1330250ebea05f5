//! Suite configuration and scenario file loading.

use crate::error::ConfigError;
use crate::model::Scenario;
use crate::resolver::{DefaultPool, NameStyle, VariableResolver};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_OUTPUT_DIR: &str = "./test-reports";

/// Settings applied to every request of the suite.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    pub headers: HashMap<String, String>,
    /// Endpoint mode only.
    pub path_params: HashMap<String, String>,
    /// Endpoint mode only.
    pub query_params: HashMap<String, String>,
    /// Endpoint mode only: body per endpoint path, used for POST, PUT
    /// and PATCH operations without a request-body example.
    pub request_bodies: HashMap<String, Value>,
}

/// A suite file. Every field is optional so included files can carry
/// fragments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Other suite files, relative to this one.
    pub includes: Vec<PathBuf>,
    pub spec: Option<PathBuf>,
    pub spec_files: Vec<PathBuf>,
    pub base_url: Option<String>,
    /// Seconds.
    pub timeout: Option<u64>,
    pub output_dir: Option<PathBuf>,
    pub verbose: Option<bool>,
    pub request: RequestConfig,
    pub default_values: Option<HashMap<String, Value>>,
    pub name_styles: Option<Vec<NameStyle>>,
    pub isolate_variables: Option<bool>,
    pub scenarios: Vec<Scenario>,
}

impl SuiteConfig {
    /// Load a suite file and everything it includes.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut stack = Vec::new();
        Self::load_nested(path.as_ref(), &mut stack)
    }

    fn load_nested(path: &Path, stack: &mut Vec<PathBuf>) -> Result<Self> {
        let canonical = fs::canonicalize(path).context(format!(
            "Failed to resolve config path: {}",
            path.display()
        ))?;
        if stack.contains(&canonical) {
            return Err(ConfigError::IncludeCycle(canonical).into());
        }
        info!("Loading suite config from {}", canonical.display());

        let content = fs::read_to_string(&canonical).context(format!(
            "Failed to read config file: {}",
            canonical.display()
        ))?;
        let mut config: Self = serde_yaml::from_str(&content).context(
            format!("Failed to parse YAML from {}", canonical.display()),
        )?;

        if let Some(dir) = canonical.parent() {
            config.rebase(dir);
        }

        stack.push(canonical);
        for include in std::mem::take(&mut config.includes) {
            debug!("Including {}", include.display());
            let included = Self::load_nested(&include, stack)?;
            config.merge(included);
        }
        stack.pop();

        Ok(config)
    }

    /// Make file references relative to `dir` absolute.
    fn rebase(&mut self, dir: &Path) {
        let join = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                dir.join(p)
            }
        };
        self.includes = self.includes.iter().map(join).collect();
        self.spec_files = self.spec_files.iter().map(join).collect();
        self.spec = self.spec.as_ref().map(join);
    }

    /// Fold an included file into this one. Lists are appended, maps
    /// merged with this file's entries winning, unset scalars filled.
    pub fn merge(&mut self, other: Self) {
        self.spec = self.spec.take().or(other.spec);
        self.spec_files.extend(other.spec_files);
        self.base_url = self.base_url.take().or(other.base_url);
        self.timeout = self.timeout.or(other.timeout);
        self.output_dir = self.output_dir.take().or(other.output_dir);
        self.verbose = self.verbose.or(other.verbose);
        self.name_styles = self.name_styles.take().or(other.name_styles);
        self.isolate_variables =
            self.isolate_variables.or(other.isolate_variables);

        merge_map(&mut self.request.headers, other.request.headers);
        merge_map(&mut self.request.path_params, other.request.path_params);
        merge_map(&mut self.request.query_params, other.request.query_params);
        merge_map(
            &mut self.request.request_bodies,
            other.request.request_bodies,
        );

        self.default_values = match (self.default_values.take(), other.default_values)
        {
            (Some(mut own), Some(theirs)) => {
                merge_map(&mut own, theirs);
                Some(own)
            }
            (own, theirs) => own.or(theirs),
        };

        self.scenarios.extend(other.scenarios);
    }

    pub fn base_url(&self) -> Result<&str, ConfigError> {
        self.base_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingBaseUrl)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
    }

    /// `spec` followed by `spec_files`.
    pub fn spec_paths(&self) -> Vec<PathBuf> {
        self.spec
            .iter()
            .chain(self.spec_files.iter())
            .cloned()
            .collect()
    }

    pub fn default_pool(&self) -> DefaultPool {
        match &self.default_values {
            Some(values) => DefaultPool::new(values.clone()),
            None => DefaultPool::builtin(),
        }
    }

    pub fn resolver(&self) -> VariableResolver {
        let styles = self.name_styles.clone().unwrap_or_else(NameStyle::defaults);
        VariableResolver::with_styles(&styles, self.default_pool())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_scenarios(&self.scenarios)
    }
}

fn merge_map<V>(own: &mut HashMap<String, V>, theirs: HashMap<String, V>) {
    for (key, value) in theirs {
        own.entry(key).or_insert(value);
    }
}

/// Structural checks on a scenario list: non-empty names, unique step
/// names per scenario, an endpoint on every step.
pub fn validate_scenarios(scenarios: &[Scenario]) -> Result<(), ConfigError> {
    for (index, scenario) in scenarios.iter().enumerate() {
        if scenario.name.trim().is_empty() {
            return Err(ConfigError::EmptyScenarioName { index });
        }
        let mut seen = HashSet::new();
        for (index, step) in scenario.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(ConfigError::EmptyStepName {
                    scenario: scenario.name.clone(),
                    index,
                });
            }
            if !seen.insert(step.name.as_str()) {
                return Err(ConfigError::DuplicateStep {
                    scenario: scenario.name.clone(),
                    step: step.name.clone(),
                });
            }
            if step.target.path.trim().is_empty() {
                return Err(ConfigError::MissingEndpoint {
                    scenario: scenario.name.clone(),
                    step: step.name.clone(),
                });
            }
        }
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScenarioFile {
    Many { scenarios: Vec<Scenario> },
    One(Scenario),
}

/// Load a scenario file or every scenario file in a directory.
pub fn load_scenarios<P: AsRef<Path>>(path: P) -> Result<Vec<Scenario>> {
    let path = path.as_ref();
    if path.is_dir() {
        load_scenarios_from_dir(path)
    } else {
        load_scenario_file(path)
    }
}

/// A file holds either a `scenarios:` list or a single scenario.
pub fn load_scenario_file<P: AsRef<Path>>(path: P) -> Result<Vec<Scenario>> {
    let path = path.as_ref();
    info!("Loading scenarios from {}", path.display());

    let content = fs::read_to_string(path).context(format!(
        "Failed to read scenario file: {}",
        path.display()
    ))?;
    let file: ScenarioFile = serde_yaml::from_str(&content).context(
        format!("Failed to parse YAML from {}", path.display()),
    )?;

    let scenarios = match file {
        ScenarioFile::Many { scenarios } => scenarios,
        ScenarioFile::One(scenario) => vec![scenario],
    };
    debug!("Loaded {} scenarios from {}", scenarios.len(), path.display());
    Ok(scenarios)
}

/// Every `.yaml` / `.yml` file in `dir`, in file name order.
pub fn load_scenarios_from_dir<P: AsRef<Path>>(
    dir: P,
) -> Result<Vec<Scenario>> {
    let dir = dir.as_ref();
    info!("Loading scenarios from directory: {}", dir.display());

    let mut files = Vec::new();
    for entry in fs::read_dir(dir)
        .context(format!("Failed to read directory: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_file() && is_scenario_file(&path) {
            files.push(path);
        }
    }
    files.sort();

    let mut scenarios = Vec::new();
    for path in &files {
        scenarios.extend(load_scenario_file(path)?);
    }

    info!(
        "Loaded {} scenarios from {} files in {}",
        scenarios.len(),
        files.len(),
        dir.display()
    );
    Ok(scenarios)
}

/// Return `true` for `.yaml` / `.yml` files.
fn is_scenario_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml")
}
