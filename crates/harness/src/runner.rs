//! Run orchestration: authentication, case generation, bounded execution
//! and aggregation

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::auth::{provider_for, Credential};
use crate::catalog::load_suites;
use crate::classify::Verdict;
use crate::config::SuiteConfig;
use crate::error::{CaseError, HarnessError, HarnessResult};
use crate::executor::{normalize_base, Executor, Outcome};
use crate::matrix::{ParameterCase, ParameterMatrix};
use crate::report::{Aggregator, Report};
use crate::spec::SuiteFile;

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    Authenticated,
    Generating,
    Executing,
    Classifying,
    Aggregated,
    Reported,
    Aborted,
}

impl RunPhase {
    pub fn can_transition_to(self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (Init, Authenticated)
                | (Init, Aborted)
                | (Authenticated, Generating)
                | (Authenticated, Aggregated)
                | (Generating, Executing)
                | (Executing, Classifying)
                | (Classifying, Generating)
                | (Classifying, Aggregated)
                | (Aggregated, Reported)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Reported | RunPhase::Aborted)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunPhase::Init => "INIT",
            RunPhase::Authenticated => "AUTHENTICATED",
            RunPhase::Generating => "GENERATING",
            RunPhase::Executing => "EXECUTING",
            RunPhase::Classifying => "CLASSIFYING",
            RunPhase::Aggregated => "AGGREGATED",
            RunPhase::Reported => "REPORTED",
            RunPhase::Aborted => "ABORTED",
        };
        f.write_str(s)
    }
}

/// Load the configured suites and run them
pub async fn run_suite(config: &SuiteConfig) -> HarnessResult<Report> {
    config.validate()?;
    let suites = load_suites(&config.suites)?;
    let mut runner = SuiteRunner::new(config.clone())?;
    runner.run(&suites).await
}

/// Executes a set of suites against one base URL
pub struct SuiteRunner {
    config: SuiteConfig,
    client: reqwest::Client,
    phase: RunPhase,
}

impl SuiteRunner {
    pub fn new(config: SuiteConfig) -> HarnessResult<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(config.run.max_redirects))
            .user_agent(concat!("apicheck/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            config,
            client,
            phase: RunPhase::Init,
        })
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn advance(&mut self, next: RunPhase) -> HarnessResult<()> {
        if !self.phase.can_transition_to(next) {
            return Err(HarnessError::PhaseTransition {
                from: self.phase.to_string(),
                to: next.to_string(),
            });
        }
        debug!("Run phase: {} -> {}", self.phase, next);
        self.phase = next;
        Ok(())
    }

    /// Run every case of `suites` and build the report
    pub async fn run(&mut self, suites: &[SuiteFile]) -> HarnessResult<Report> {
        if self.phase != RunPhase::Init {
            return Err(HarnessError::PhaseTransition {
                from: self.phase.to_string(),
                to: RunPhase::Authenticated.to_string(),
            });
        }
        let start = Instant::now();
        let base_url = normalize_base(&self.config.base_url)?;

        let credentials = match self.authenticate(suites).await {
            Ok(credentials) => credentials,
            Err(e) => {
                error!("✗ Authentication failed: {}", e);
                self.advance(RunPhase::Aborted)?;
                return Err(e);
            }
        };
        self.advance(RunPhase::Authenticated)?;

        let mut aggregator = Aggregator::new(base_url.as_str());
        for suite in suites {
            for endpoint in &suite.endpoints {
                if let Some(rule) = &endpoint.metric {
                    aggregator.register_rule(&endpoint.name, rule);
                }
            }
        }

        let token = CancellationToken::new();
        let watchdog = self.config.run.deadline().map(|deadline| {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                warn!("Run deadline of {:?} reached, cancelling remaining cases", deadline);
                token.cancel();
            })
        });

        let workers = self.config.run.workers();
        let timeout = self.config.run.timeout();
        let anchor = Utc::now();
        let mut seq = 0;

        for suite in suites {
            self.advance(RunPhase::Generating)?;
            let cases: Vec<(usize, ParameterCase)> = suite
                .endpoints
                .iter()
                .flat_map(|endpoint| ParameterMatrix::for_endpoint(endpoint, anchor).cases())
                .map(|case| {
                    seq += 1;
                    (seq - 1, case)
                })
                .collect();
            info!("Suite '{}': {} case(s)", suite.name, cases.len());

            let credential = credentials
                .get(&suite.auth)
                .cloned()
                .unwrap_or_else(|| Arc::new(Credential::anonymous()));
            let executor = Executor::new(self.client.clone(), base_url.as_str(), credential, timeout)?;

            self.advance(RunPhase::Executing)?;
            let mut outcomes = stream::iter(cases.into_iter().map(|(seq, case)| {
                let executor = executor.clone();
                let token = token.clone();
                async move {
                    let mut outcome = execute_case(&executor, &case, &token).await;
                    outcome.seq = seq;
                    outcome
                }
            }))
            .buffer_unordered(workers);

            while let Some(outcome) = outcomes.next().await {
                log_outcome(&outcome);
                aggregator.record(outcome);
            }

            self.advance(RunPhase::Classifying)?;
        }

        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }

        self.advance(RunPhase::Aggregated)?;
        let mut report = aggregator.summarize();
        report.duration_ms = start.elapsed().as_millis() as u64;
        self.advance(RunPhase::Reported)?;

        let summary = &report.summary;
        info!("");
        info!(
            "Results: {} passed, {} failed, {} errored of {} ({} ms)",
            summary.passed, summary.failed, summary.errored, summary.total, report.duration_ms
        );
        Ok(report)
    }

    /// Authenticate each profile the suites reference, once
    async fn authenticate(
        &self,
        suites: &[SuiteFile],
    ) -> HarnessResult<BTreeMap<String, Arc<Credential>>> {
        let base_url = normalize_base(&self.config.base_url)?;
        let mut credentials = BTreeMap::new();
        for suite in suites {
            if credentials.contains_key(&suite.auth) {
                continue;
            }
            let profile = self.config.profile(&suite.auth)?;
            let provider = provider_for(&suite.auth, &profile, &base_url)?;
            let credential = provider.authenticate(&self.client).await?;
            if let Some(identity) = &credential.identity {
                info!("✓ Authenticated profile '{}' as {}", suite.auth, identity);
            }
            credentials.insert(suite.auth.clone(), Arc::new(credential));
        }
        Ok(credentials)
    }
}

/// Run one case unless the deadline has passed; abandon it if the deadline
/// passes while it is in flight
async fn execute_case(executor: &Executor, case: &ParameterCase, token: &CancellationToken) -> Outcome {
    if token.is_cancelled() {
        return Outcome::errored(case, &CaseError::Cancelled, Duration::ZERO);
    }
    let start = Instant::now();
    tokio::select! {
        biased;
        _ = token.cancelled() => Outcome::errored(case, &CaseError::Cancelled, start.elapsed()),
        outcome = executor.run(case) => outcome,
    }
}

fn log_outcome(outcome: &Outcome) {
    let reason = outcome.reason.as_deref().unwrap_or("unknown");
    match outcome.verdict {
        Verdict::Pass => info!("✓ {} ({} ms)", outcome.case_id, outcome.elapsed_ms),
        _ if !outcome.mandatory => warn!("✗ {} [{}] - {}", outcome.case_id, outcome.verdict, reason),
        _ => error!("✗ {} [{}] - {}", outcome.case_id, outcome.verdict, reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(RunPhase::Init, RunPhase::Authenticated, true)]
    #[test_case(RunPhase::Init, RunPhase::Aborted, true)]
    #[test_case(RunPhase::Init, RunPhase::Executing, false)]
    #[test_case(RunPhase::Authenticated, RunPhase::Aborted, false)]
    #[test_case(RunPhase::Classifying, RunPhase::Generating, true)]
    #[test_case(RunPhase::Classifying, RunPhase::Aggregated, true)]
    #[test_case(RunPhase::Executing, RunPhase::Aggregated, false)]
    #[test_case(RunPhase::Aggregated, RunPhase::Reported, true)]
    #[test_case(RunPhase::Reported, RunPhase::Init, false)]
    fn test_phase_transitions(from: RunPhase, to: RunPhase, allowed: bool) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn test_terminal_phases() {
        assert!(RunPhase::Reported.is_terminal());
        assert!(RunPhase::Aborted.is_terminal());
        assert!(!RunPhase::Aggregated.is_terminal());
    }

    #[tokio::test]
    async fn test_empty_run_reports_nothing() {
        let config = SuiteConfig {
            base_url: "http://127.0.0.1:9/".to_string(),
            ..Default::default()
        };
        let mut runner = SuiteRunner::new(config).unwrap();
        let report = runner.run(&[]).await.unwrap();
        assert_eq!(report.summary.total, 0);
        assert!(report.is_success());
        assert_eq!(runner.phase(), RunPhase::Reported);

        // A runner is single-use
        assert!(runner.run(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_infinite_timeout_rejected_before_running() {
        let mut config = SuiteConfig {
            base_url: "http://127.0.0.1:9/".to_string(),
            ..Default::default()
        };
        config.run.timeout_secs = f64::INFINITY;
        config.suites.builtin = false;
        let err = run_suite(&config).await.unwrap_err();
        assert!(matches!(err, HarnessError::Config(_)), "{err}");
    }
}
