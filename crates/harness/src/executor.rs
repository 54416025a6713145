//! Single-case execution
//!
//! [`Executor::run`] always returns an [`Outcome`]. Transport failures,
//! timeouts and undecodable bodies become ERROR outcomes; nothing is retried.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Url;
use serde::Serialize;
use tracing::{debug, warn};

use crate::auth::Credential;
use crate::classify::{classify, BodyState, RawResponse, Verdict};
use crate::error::{CaseError, HarnessError, HarnessResult};
use crate::matrix::{AuthMode, ParameterCase, Variant};

/// Per-case timeout when none is configured
pub const DEFAULT_CASE_TIMEOUT: Duration = Duration::from_secs(10);

/// Recorded result of one executed case
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    /// Position in the run, assigned by the runner
    pub seq: usize,
    pub case_id: String,
    pub endpoint: String,
    pub variant: Variant,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub mandatory: bool,
    pub status: Option<u16>,
    pub allowed: Vec<u16>,
    pub elapsed_ms: u64,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Filled in by the aggregator for endpoints with a metric
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric: Option<i64>,
    #[serde(skip)]
    pub body: BodyState,
}

impl Outcome {
    /// ERROR outcome for a case that never produced a judgeable response
    pub fn errored(case: &ParameterCase, error: &CaseError, elapsed: Duration) -> Self {
        Self {
            seq: 0,
            case_id: case.id.clone(),
            endpoint: case.endpoint.clone(),
            variant: case.variant,
            label: case.label.clone(),
            mandatory: case.mandatory,
            status: None,
            allowed: case.expect.allowed.iter().copied().collect(),
            elapsed_ms: elapsed.as_millis() as u64,
            verdict: Verdict::Error,
            reason: Some(error.to_string()),
            metric: None,
            body: BodyState::NotRead,
        }
    }

    fn judged(case: &ParameterCase, raw: &RawResponse) -> Self {
        let judgement = classify(case, raw);
        Self {
            seq: 0,
            case_id: case.id.clone(),
            endpoint: case.endpoint.clone(),
            variant: case.variant,
            label: case.label.clone(),
            mandatory: case.mandatory,
            status: Some(raw.status),
            allowed: case.expect.allowed.iter().copied().collect(),
            elapsed_ms: raw.elapsed.as_millis() as u64,
            verdict: judgement.verdict,
            reason: judgement.reason,
            metric: None,
            body: judgement.body,
        }
    }

    pub fn is_pass(&self) -> bool {
        self.verdict == Verdict::Pass
    }
}

/// Issues one request per case against a base URL with a shared credential
#[derive(Clone)]
pub struct Executor {
    client: reqwest::Client,
    base_url: Url,
    credential: Arc<Credential>,
    timeout: Duration,
}

impl Executor {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        credential: Arc<Credential>,
        timeout: Duration,
    ) -> HarnessResult<Self> {
        Ok(Self {
            client,
            base_url: normalize_base(base_url)?,
            credential,
            timeout,
        })
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Execute a case and judge the response
    pub async fn run(&self, case: &ParameterCase) -> Outcome {
        let start = Instant::now();
        debug!("Executing case: {}", case.id);

        let result = match tokio::time::timeout(self.timeout, self.send(case)).await {
            Ok(result) => result,
            Err(_) => Err(CaseError::Timeout),
        };

        match result {
            Ok(raw) => Outcome::judged(case, &raw),
            Err(e) => {
                warn!("{} - {}", case.id, e);
                Outcome::errored(case, &e, start.elapsed())
            }
        }
    }

    async fn send(&self, case: &ParameterCase) -> Result<RawResponse, CaseError> {
        let url = self
            .base_url
            .join(&case.path)
            .map_err(|e| CaseError::Request(format!("bad path '{}': {}", case.path, e)))?;

        let mut request = self
            .client
            .request(case.method.into(), url)
            .header(reqwest::header::ACCEPT, "application/json");

        let pairs = case.query_pairs();
        if !pairs.is_empty() {
            request = request.query(&pairs);
        }

        request = match &case.auth {
            AuthMode::Session => self.credential.apply(request),
            AuthMode::Anonymous => request,
            AuthMode::Bearer(token) => request.bearer_auth(token),
        };

        let start = Instant::now();
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_ascii_lowercase(),
                    value.to_str().unwrap_or("<binary>").to_string(),
                )
            })
            .collect::<BTreeMap<_, _>>();
        let body = response.bytes().await.map_err(transport_error)?;

        Ok(RawResponse {
            status,
            headers,
            body: body.to_vec(),
            elapsed: start.elapsed(),
        })
    }
}

fn transport_error(e: reqwest::Error) -> CaseError {
    if e.is_timeout() {
        CaseError::Timeout
    } else {
        CaseError::Transport(e.to_string())
    }
}

/// Parse the base URL and make sure relative joins keep its last segment
pub fn normalize_base(base_url: &str) -> HarnessResult<Url> {
    let mut raw = base_url.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    Url::parse(&raw).map_err(|e| HarnessError::Config(format!("invalid base URL '{}': {}", base_url, e)))
}
