//! Response classification against a case's expectation

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AssertionMismatch;
use crate::matrix::ParameterCase;
use crate::spec::{BodyPredicate, JsonType};

/// Final judgement of a case
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
    Error,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// What came back from the wire, before any judgement
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    /// Header names lowercased
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub elapsed: Duration,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Parsed form of a response body
#[derive(Debug, Clone, Default, PartialEq)]
pub enum BodyState {
    Json(Value),
    Invalid(String),
    Empty,
    #[default]
    NotRead,
}

impl BodyState {
    pub fn parse(bytes: &[u8]) -> Self {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return BodyState::Empty;
        }
        match serde_json::from_slice(bytes) {
            Ok(value) => BodyState::Json(value),
            Err(e) => BodyState::Invalid(e.to_string()),
        }
    }

    pub fn json(&self) -> Option<&Value> {
        match self {
            BodyState::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// Verdict plus the parsed body it was reached with
#[derive(Debug, Clone)]
pub struct Judgement {
    pub verdict: Verdict,
    /// Set for FAIL and ERROR
    pub reason: Option<String>,
    pub body: BodyState,
}

impl Judgement {
    fn pass(body: BodyState) -> Self {
        Self {
            verdict: Verdict::Pass,
            reason: None,
            body,
        }
    }

    fn fail(reason: String, body: BodyState) -> Self {
        Self {
            verdict: Verdict::Fail,
            reason: Some(reason),
            body,
        }
    }
}

/// Judge a response against the case's expectation
pub fn classify(case: &ParameterCase, raw: &RawResponse) -> Judgement {
    let expect = &case.expect;
    let body = BodyState::parse(&raw.body);

    if !expect.allowed.contains(&raw.status) {
        let allowed: Vec<String> = expect.allowed.iter().map(u16::to_string).collect();
        return Judgement::fail(
            format!("status {} not in allowed set [{}]", raw.status, allowed.join(", ")),
            body,
        );
    }

    if let Some(budget) = expect.max_latency {
        if raw.elapsed > budget {
            return Judgement::fail(
                format!(
                    "response took {} ms, budget is {} ms",
                    raw.elapsed.as_millis(),
                    budget.as_millis()
                ),
                body,
            );
        }
    }

    if raw.status != 200 || !expect.check_body {
        return Judgement::pass(body);
    }

    let value = match &body {
        BodyState::Json(value) => value,
        BodyState::Invalid(e) => {
            return Judgement {
                verdict: Verdict::Error,
                reason: Some(format!("body is not valid JSON: {}", e)),
                body,
            };
        }
        BodyState::Empty | BodyState::NotRead => {
            return Judgement {
                verdict: Verdict::Error,
                reason: Some("body is empty".to_string()),
                body,
            };
        }
    };

    if let Some(wanted) = &expect.content_type {
        let actual = raw.header("content-type").unwrap_or("");
        if !actual.contains(wanted.as_str()) {
            return Judgement::fail(
                format!("content-type '{}' does not contain '{}'", actual, wanted),
                body,
            );
        }
    }

    let mismatches = check_all(&expect.shape, value);
    if mismatches.is_empty() {
        Judgement::pass(body)
    } else {
        let reason = mismatches
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Judgement::fail(reason, body)
    }
}

/// Evaluate every predicate, collecting all mismatches
pub fn check_all(predicates: &[BodyPredicate], value: &Value) -> Vec<AssertionMismatch> {
    predicates
        .iter()
        .filter_map(|p| check(p, value).err())
        .collect()
}

/// Evaluate one predicate against `value`
pub fn check(predicate: &BodyPredicate, value: &Value) -> Result<(), AssertionMismatch> {
    match predicate {
        BodyPredicate::Required { path } => required(value, path).map(|_| ()),

        BodyPredicate::AnyOf { paths } => {
            if paths.iter().any(|p| lookup(value, p).is_some()) {
                Ok(())
            } else {
                Err(AssertionMismatch::new(
                    paths.join("|"),
                    "none of the keys is present",
                ))
            }
        }

        BodyPredicate::Type { path, kind } => {
            let found = required(value, path)?;
            if is_type(found, *kind) {
                Ok(())
            } else {
                Err(AssertionMismatch::new(
                    path,
                    format!("expected {}, found {}", kind, type_name(found)),
                ))
            }
        }

        BodyPredicate::Range { path, min, max } => {
            let found = required(value, path)?;
            let Some(n) = found.as_f64() else {
                return Err(AssertionMismatch::new(
                    path,
                    format!("expected a number, found {}", type_name(found)),
                ));
            };
            if min.map_or(false, |m| n < m) || max.map_or(false, |m| n > m) {
                return Err(AssertionMismatch::new(
                    path,
                    format!("{} outside [{}, {}]", n, bound(*min), bound(*max)),
                ));
            }
            Ok(())
        }

        BodyPredicate::Equals { path, value: expected } => {
            let found = required(value, path)?;
            if found == expected {
                Ok(())
            } else {
                Err(AssertionMismatch::new(
                    path,
                    format!("expected {}, found {}", expected, found),
                ))
            }
        }

        BodyPredicate::Pattern { path, regex } => {
            let found = required(value, path)?;
            let text = as_text(found, path)?;
            let re = regex::Regex::new(regex)
                .map_err(|e| AssertionMismatch::new(path, format!("bad pattern: {}", e)))?;
            if re.is_match(text) {
                Ok(())
            } else {
                Err(AssertionMismatch::new(
                    path,
                    format!("'{}' does not match /{}/", text, regex),
                ))
            }
        }

        BodyPredicate::Prefix { path, prefixes } => {
            let found = required(value, path)?;
            let text = as_text(found, path)?;
            if prefixes.iter().any(|p| text.starts_with(p.as_str())) {
                Ok(())
            } else {
                Err(AssertionMismatch::new(
                    path,
                    format!("'{}' does not start with any of {:?}", text, prefixes),
                ))
            }
        }

        BodyPredicate::Len { path, min, max } => {
            let found = required(value, path)?;
            let Some(items) = found.as_array() else {
                return Err(AssertionMismatch::new(
                    path,
                    format!("expected array, found {}", type_name(found)),
                ));
            };
            let len = items.len();
            if min.map_or(false, |m| len < m) || max.map_or(false, |m| len > m) {
                return Err(AssertionMismatch::new(
                    path,
                    format!(
                        "length {} outside [{}, {}]",
                        len,
                        min.map_or("-".to_string(), |m| m.to_string()),
                        max.map_or("-".to_string(), |m| m.to_string())
                    ),
                ));
            }
            Ok(())
        }

        BodyPredicate::Each { path, checks } => {
            let found = required(value, path)?;
            let Some(items) = found.as_array() else {
                return Err(AssertionMismatch::new(
                    path,
                    format!("expected array, found {}", type_name(found)),
                ));
            };
            for (i, item) in items.iter().enumerate() {
                for nested in checks {
                    check(nested, item).map_err(|m| {
                        let inner = if m.path == "<body>" { String::new() } else { format!(".{}", m.path) };
                        AssertionMismatch::new(format!("{}.{}{}", path, i, inner), m.message)
                    })?;
                }
            }
            Ok(())
        }
    }
}

/// Resolve a dotted path; numeric segments index arrays
pub fn lookup<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn required<'v>(value: &'v Value, path: &str) -> Result<&'v Value, AssertionMismatch> {
    lookup(value, path).ok_or_else(|| AssertionMismatch::new(path, "missing"))
}

fn as_text<'v>(value: &'v Value, path: &str) -> Result<&'v str, AssertionMismatch> {
    value.as_str().ok_or_else(|| {
        AssertionMismatch::new(path, format!("expected string, found {}", type_name(value)))
    })
}

fn is_type(value: &Value, kind: JsonType) -> bool {
    match kind {
        JsonType::Bool => value.is_boolean(),
        JsonType::Number => value.is_number(),
        JsonType::Integer => value.is_i64() || value.is_u64(),
        JsonType::String => value.is_string(),
        JsonType::Array => value.is_array(),
        JsonType::Object => value.is_object(),
        JsonType::Null => value.is_null(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn bound(b: Option<f64>) -> String {
    b.map_or("-".to_string(), |v| v.to_string())
}
