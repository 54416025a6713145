//! apicheck contract-test harness
//!
//! Authenticates against an HTTP API, expands declarative endpoint specs
//! into parameter cases, executes them and judges every response.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    run_suite(config)                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  AuthProvider ──► Credential (Arc, read-only)               │
//! │  SuiteFile (YAML) ──► ParameterMatrix ──► ParameterCase*    │
//! │  Executor::run(case) ──► RawResponse ──► classify()         │
//! │  Aggregator::record(outcome) ──► summarize() ──► Report     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  INIT → AUTHENTICATED → (GENERATING → EXECUTING →           │
//! │         CLASSIFYING)* → AGGREGATED → REPORTED | ABORTED     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod catalog;
pub mod classify;
pub mod config;
pub mod error;
pub mod executor;
pub mod matrix;
pub mod render;
pub mod report;
pub mod runner;
pub mod spec;

pub use auth::{AuthProvider, Credential};
pub use classify::Verdict;
pub use config::SuiteConfig;
pub use error::{AuthError, HarnessError, HarnessResult};
pub use executor::{Executor, Outcome};
pub use matrix::{generate_cases, ParameterCase, ParameterMatrix};
pub use report::{Aggregator, Report};
pub use runner::{run_suite, RunPhase, SuiteRunner};
pub use spec::{EndpointSpec, SuiteFile};
