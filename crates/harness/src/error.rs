//! Error types for the contract-test harness
//!
//! Only [`AuthError`] and setup failures leave [`crate::run_suite`]. Everything
//! that can go wrong with a single case is turned into an
//! [`Outcome`](crate::executor::Outcome) instead.

use thiserror::Error;

/// Failure to obtain a credential. Fatal for the run.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{step} request to {url} failed: {reason}")]
    Transport {
        step: &'static str,
        url: String,
        reason: String,
    },

    #[error("{step} returned HTTP {status}: {body}")]
    Rejected {
        step: &'static str,
        status: u16,
        body: String,
    },

    #[error("{step} reported success=false: {message}")]
    Unsuccessful { step: &'static str, message: String },

    #[error("{step} response is not valid JSON: {reason}")]
    Malformed { step: &'static str, reason: String },

    #[error("login response did not carry result.secret_code")]
    MissingSecretCode,

    #[error("auth profile '{profile}' is missing {setting}")]
    MissingSetting {
        profile: String,
        setting: &'static str,
    },
}

/// Per-case failure that prevented a response from being judged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaseError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("timeout")]
    Timeout,

    #[error("cancelled")]
    Cancelled,

    #[error("invalid request: {0}")]
    Request(String),
}

/// A body predicate that did not hold for a 200 response.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{path}: {message}")]
pub struct AssertionMismatch {
    pub path: String,
    pub message: String,
}

impl AssertionMismatch {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            path: if path.is_empty() { "<body>".to_string() } else { path },
            message: message.into(),
        }
    }
}

/// Crate-level error for setup and configuration.
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid suite '{suite}': {reason}")]
    Suite { suite: String, reason: String },

    #[error("invalid run phase transition: {from} -> {to}")]
    PhaseTransition { from: String, to: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl HarnessError {
    pub fn suite(suite: impl Into<String>, reason: impl Into<String>) -> Self {
        HarnessError::Suite {
            suite: suite.into(),
            reason: reason.into(),
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
