//! Scenario execution engine for API testing.
//!
//! Scenarios are ordered lists of HTTP steps. Values extracted from one
//! step's response feed the path, query, headers and body of later
//! steps through `{name}` / `{{.name}}` placeholders, and steps can
//! declare dependencies on earlier steps of the same scenario.
//!
//! The engine talks to its surroundings through three traits:
//! [`EndpointResolver`] (the API definition), [`RequestSender`] (HTTP)
//! and [`Validator`]. [`DefaultScenarioRunner`] ties them together.

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod extractor;
pub mod gate;
pub mod model;
pub mod openapi;
pub mod report;
pub mod resolver;
pub mod runner;
pub mod template;
pub mod transport;
pub mod validator;
pub mod value;

pub use config::{load_scenarios, SuiteConfig};
pub use context::ExecutionContext;
pub use error::{ConfigError, ExtractionError, TransportError};
pub use executor::{StepExecutor, StepOutcome, StepState};
pub use model::*;
pub use openapi::{ApiDefinition, EndpointResolver};
pub use report::{ReportFormat, Summary};
pub use resolver::{DefaultPool, NameStyle, VariableResolver};
pub use runner::{DefaultScenarioRunner, ScenarioRunner};
pub use transport::{HttpSender, RequestSender};
pub use validator::{StatusValidator, Validator};

/// Crate version, as reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
