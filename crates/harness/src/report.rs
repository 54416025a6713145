//! Outcome aggregation and the run report

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::classify::Verdict;
use crate::executor::Outcome;
use crate::spec::MetricRule;

/// Body keys tried, in order, when extracting a count
pub const COUNT_KEYS: [&str; 5] = ["total", "count", "result", "results", "age_groups"];

/// Pulls a numeric metric out of a JSON body
pub trait MetricExtractor: Send + Sync {
    fn extract(&self, body: &Value) -> Option<i64>;
}

/// Tries the rule's own keys, then [`COUNT_KEYS`]
#[derive(Debug, Clone, Default)]
pub struct CountExtractor {
    keys: Vec<String>,
}

impl CountExtractor {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }
}

impl MetricExtractor for CountExtractor {
    fn extract(&self, body: &Value) -> Option<i64> {
        for key in &self.keys {
            if let Some(n) = body.get(key).and_then(as_count) {
                return Some(n);
            }
        }
        extract_count(body)
    }
}

/// Count from a response body using the [`COUNT_KEYS`] priority list
///
/// `result` recurses into objects and counts arrays, `results` counts an
/// array, `age_groups` sums each group's `count`. A top-level array counts
/// its elements.
pub fn extract_count(body: &Value) -> Option<i64> {
    match body {
        Value::Array(items) => Some(items.len() as i64),
        Value::Object(map) => {
            if let Some(n) = map.get("total").and_then(as_count) {
                return Some(n);
            }
            if let Some(n) = map.get("count").and_then(as_count) {
                return Some(n);
            }
            match map.get("result") {
                Some(Value::Array(items)) => return Some(items.len() as i64),
                Some(inner @ Value::Object(_)) => {
                    if let Some(n) = extract_count(inner) {
                        return Some(n);
                    }
                }
                _ => {}
            }
            if let Some(Value::Array(items)) = map.get("results") {
                return Some(items.len() as i64);
            }
            if let Some(Value::Array(groups)) = map.get("age_groups") {
                return Some(
                    groups
                        .iter()
                        .filter_map(|g| g.get("count").and_then(as_count))
                        .sum(),
                );
            }
            None
        }
        _ => None,
    }
}

fn as_count(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.round() as i64))
}

/// Overall verdict counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    /// FAIL or ERROR among mandatory cases
    pub mandatory_failures: usize,
}

/// Verdict counts of one endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointSummary {
    pub endpoint: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
    /// Percentage of passing cases
    pub pass_rate: f64,
}

/// One labelled value of a metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricSample {
    pub label: String,
    pub case_id: String,
    pub value: Option<i64>,
}

/// All samples of a metric and their total
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricSummary {
    pub name: String,
    pub endpoint: String,
    pub total: i64,
    /// Samples that yielded no value
    pub missing: usize,
    pub samples: Vec<MetricSample>,
}

/// Result of a run
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub base_url: String,
    pub duration_ms: u64,
    pub summary: Summary,
    pub endpoints: Vec<EndpointSummary>,
    pub metrics: Vec<MetricSummary>,
    /// Ordered by sequence number
    pub outcomes: Vec<Outcome>,
}

impl Report {
    /// No FAIL or ERROR among mandatory cases
    pub fn is_success(&self) -> bool {
        self.summary.mandatory_failures == 0
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    /// Failing and erroring outcomes, in order
    pub fn problems(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| o.verdict != Verdict::Pass)
    }
}

struct Registered {
    metric: String,
    extractor: Arc<dyn MetricExtractor>,
}

/// Append-only collector of outcomes
pub struct Aggregator {
    base_url: String,
    generated_at: DateTime<Utc>,
    extractors: BTreeMap<String, Registered>,
    outcomes: Mutex<Vec<Outcome>>,
}

impl Aggregator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            generated_at: Utc::now(),
            extractors: BTreeMap::new(),
            outcomes: Mutex::new(Vec::new()),
        }
    }

    /// Extract `metric` from the labelled cases of `endpoint`
    pub fn register(&mut self, endpoint: impl Into<String>, metric: impl Into<String>, extractor: Arc<dyn MetricExtractor>) {
        self.extractors.insert(
            endpoint.into(),
            Registered {
                metric: metric.into(),
                extractor,
            },
        );
    }

    pub fn register_rule(&mut self, endpoint: &str, rule: &MetricRule) {
        self.register(endpoint, &rule.name, Arc::new(CountExtractor::new(rule.keys.clone())));
    }

    pub fn record(&self, mut outcome: Outcome) {
        if outcome.status == Some(200) {
            if let (Some(registered), Some(body)) = (self.extractors.get(&outcome.endpoint), outcome.body.json()) {
                outcome.metric = registered.extractor.extract(body);
            }
        }
        self.outcomes.lock().push(outcome);
    }

    pub fn len(&self) -> usize {
        self.outcomes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the report from what has been recorded so far
    pub fn summarize(&self) -> Report {
        let mut outcomes = self.outcomes.lock().clone();
        outcomes.sort_by(|a, b| a.seq.cmp(&b.seq).then_with(|| a.case_id.cmp(&b.case_id)));

        let mut summary = Summary::default();
        let mut endpoints: Vec<EndpointSummary> = Vec::new();
        for outcome in &outcomes {
            summary.total += 1;
            let index = match endpoints.iter().position(|e| e.endpoint == outcome.endpoint) {
                Some(i) => i,
                None => {
                    endpoints.push(EndpointSummary {
                        endpoint: outcome.endpoint.clone(),
                        total: 0,
                        passed: 0,
                        failed: 0,
                        errored: 0,
                        pass_rate: 0.0,
                    });
                    endpoints.len() - 1
                }
            };
            let entry = &mut endpoints[index];
            entry.total += 1;
            match outcome.verdict {
                Verdict::Pass => {
                    summary.passed += 1;
                    entry.passed += 1;
                }
                Verdict::Fail => {
                    summary.failed += 1;
                    entry.failed += 1;
                }
                Verdict::Error => {
                    summary.errored += 1;
                    entry.errored += 1;
                }
            }
            if outcome.mandatory && outcome.verdict != Verdict::Pass {
                summary.mandatory_failures += 1;
            }
        }
        for entry in &mut endpoints {
            entry.pass_rate = if entry.total == 0 {
                0.0
            } else {
                entry.passed as f64 * 100.0 / entry.total as f64
            };
        }

        let metrics = self
            .extractors
            .iter()
            .filter_map(|(endpoint, registered)| {
                let samples: Vec<MetricSample> = outcomes
                    .iter()
                    .filter(|o| &o.endpoint == endpoint)
                    .filter_map(|o| {
                        o.label.as_ref().map(|label| MetricSample {
                            label: label.clone(),
                            case_id: o.case_id.clone(),
                            value: o.metric,
                        })
                    })
                    .collect();
                if samples.is_empty() {
                    return None;
                }
                Some(MetricSummary {
                    name: registered.metric.clone(),
                    endpoint: endpoint.clone(),
                    total: samples.iter().filter_map(|s| s.value).sum(),
                    missing: samples.iter().filter(|s| s.value.is_none()).count(),
                    samples,
                })
            })
            .collect();

        Report {
            generated_at: self.generated_at,
            base_url: self.base_url.clone(),
            duration_ms: 0,
            summary,
            endpoints,
            metrics,
            outcomes,
        }
    }
}
