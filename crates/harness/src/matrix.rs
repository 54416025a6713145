//! Case generation from an endpoint's declared parameter space
//!
//! Per endpoint the sequence is: a no-parameter baseline, every dimension
//! value on its own, one combined case taking the first valid value of each
//! query dimension, the curated combinations, one conflict case per range
//! pair, the sweep points, and finally the unauthenticated probes. The full
//! cross product is never generated.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::spec::{
    BodyPredicate, Dimension, EndpointSpec, Method, ParamLocation, ParamValue, RangePair, ValueKind,
};

/// Timestamp format used for `days_from_now` values without an explicit format
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const INVALID_TOKEN: &str = "invalid_token_12345";
const EXPIRED_TOKEN: &str =
    "eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.eyJleHAiOjE2MDAwMDAwMDB9.test";

/// Longest rendered value kept in a case id
const ID_VALUE_LIMIT: usize = 32;

/// Why a case exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    Valid,
    Boundary,
    Invalid,
    Combined,
    Conflict,
    Sweep,
    Auth,
}

impl From<ValueKind> for Variant {
    fn from(kind: ValueKind) -> Self {
        match kind {
            ValueKind::Valid => Variant::Valid,
            ValueKind::Boundary => Variant::Boundary,
            ValueKind::Invalid => Variant::Invalid,
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Variant::Valid => "valid",
            Variant::Boundary => "boundary",
            Variant::Invalid => "invalid",
            Variant::Combined => "combined",
            Variant::Conflict => "conflict",
            Variant::Sweep => "sweep",
            Variant::Auth => "auth",
        };
        f.write_str(s)
    }
}

/// Which credential a case is sent with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// The run's credential for the suite's profile
    Session,
    /// No credential at all
    Anonymous,
    /// A specific bearer token instead of the session
    Bearer(String),
}

/// What a response must look like for the case to pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expectation {
    pub allowed: BTreeSet<u16>,

    /// Body predicates apply to 200 responses only, and only when set
    pub check_body: bool,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shape: Vec<BodyPredicate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_latency: Option<Duration>,
}

impl Expectation {
    /// 200 only, no body checks
    pub fn status(allowed: impl IntoIterator<Item = u16>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
            check_body: false,
            shape: Vec::new(),
            content_type: None,
            max_latency: None,
        }
    }

    /// Unauthenticated access: 401/403 and no body checks
    pub fn unauthorized() -> Self {
        Self::status([401, 403])
    }

    pub fn with_shape(mut self, shape: Vec<BodyPredicate>) -> Self {
        self.check_body = true;
        self.shape = shape;
        self
    }
}

/// One concrete request plus its expected outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterCase {
    pub id: String,
    pub endpoint: String,
    pub variant: Variant,
    pub method: Method,

    /// Path with placeholders substituted, relative to the base URL
    pub path: String,

    pub query: Vec<(String, ParamValue)>,
    pub auth: AuthMode,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    pub expect: Expectation,
    pub mandatory: bool,
}

impl ParameterCase {
    /// Query pairs as sent on the wire
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query
            .iter()
            .flat_map(|(name, value)| value.query_pairs(name))
            .collect()
    }
}

/// Lazy, restartable case generator for one endpoint
///
/// Relative timestamps resolve against a fixed anchor, so iterating twice
/// yields identical cases.
#[derive(Debug, Clone)]
pub struct ParameterMatrix<'a> {
    endpoint: &'a EndpointSpec,
    dimensions: &'a [Dimension],
    anchor: DateTime<Utc>,
}

/// Boxed iterator over generated cases
pub struct Cases<'a> {
    inner: Box<dyn Iterator<Item = ParameterCase> + Send + 'a>,
}

impl Iterator for Cases<'_> {
    type Item = ParameterCase;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// Generate the cases of `endpoint` over the given dimensions
pub fn generate_cases<'a>(endpoint: &'a EndpointSpec, dimensions: &'a [Dimension]) -> Cases<'a> {
    ParameterMatrix::new(endpoint, dimensions, Utc::now()).cases()
}

impl<'a> ParameterMatrix<'a> {
    pub fn new(endpoint: &'a EndpointSpec, dimensions: &'a [Dimension], anchor: DateTime<Utc>) -> Self {
        Self {
            endpoint,
            dimensions,
            anchor,
        }
    }

    /// Matrix over all of the endpoint's own dimensions
    pub fn for_endpoint(endpoint: &'a EndpointSpec, anchor: DateTime<Utc>) -> Self {
        Self::new(endpoint, &endpoint.dimensions, anchor)
    }

    pub fn endpoint(&self) -> &'a EndpointSpec {
        self.endpoint
    }

    /// Start a fresh pass over the cases
    pub fn cases(&self) -> Cases<'a> {
        let this = self.clone();
        let ep = self.endpoint;

        let baseline = std::iter::once_with({
            let this = this.clone();
            move || {
                this.build(
                    format!("{}/baseline", ep.name),
                    Variant::Valid,
                    Vec::new(),
                    None,
                    true,
                    None,
                    None,
                )
            }
        });

        let singles = self.dimensions.iter().flat_map({
            let this = this.clone();
            move |dim| {
                let this = this.clone();
                dim.values.iter().enumerate().map(move |(i, value)| {
                    let resolved = this.resolve(&value.value);
                    let id = format!(
                        "{}/{}/{}[{}]={}",
                        ep.name,
                        value.kind,
                        dim.name,
                        i,
                        id_value(&resolved)
                    );
                    let allowed = value
                        .allow
                        .as_ref()
                        .map(|a| a.iter().copied().collect())
                        .unwrap_or_else(|| value.kind.default_allowed());
                    this.build(
                        id,
                        value.kind.into(),
                        vec![(dim.name.clone(), resolved)],
                        Some(allowed),
                        value.check_body,
                        value.mandatory,
                        None,
                    )
                })
            }
        });

        let combined = std::iter::once_with({
            let this = this.clone();
            move || this.combined_case()
        })
        .flatten();

        let curated = ep.combined.iter().map({
            let this = this.clone();
            move |case| {
                let params = case
                    .params
                    .iter()
                    .map(|(name, value)| (name.clone(), this.resolve(value)))
                    .collect();
                let allowed = case.allow.as_ref().map(|a| a.iter().copied().collect());
                this.build(
                    format!("{}/combined/{}", ep.name, case.name),
                    Variant::Combined,
                    params,
                    allowed,
                    true,
                    case.mandatory,
                    None,
                )
            }
        });

        let conflicts = ep.ranges.iter().map({
            let this = this.clone();
            move |range| this.conflict_case(range)
        });

        let sweep = ep.sweep.iter().flat_map({
            let this = this.clone();
            move |sweep| {
                let this = this.clone();
                sweep.points.iter().map(move |point| {
                    let value = this.resolve(&point.value);
                    this.build(
                        format!("{}/sweep/{}={}", ep.name, sweep.param, point.label),
                        Variant::Sweep,
                        vec![(sweep.param.clone(), value)],
                        None,
                        true,
                        Some(sweep.mandatory),
                        Some(point.label.clone()),
                    )
                })
            }
        });

        let probes = std::iter::once_with(move || this.auth_probes()).flatten();

        Cases {
            inner: Box::new(
                baseline
                    .chain(singles)
                    .chain(combined)
                    .chain(curated)
                    .chain(conflicts)
                    .chain(sweep)
                    .chain(probes),
            ),
        }
    }

    /// First valid value of every query dimension, sent together
    fn combined_case(&self) -> Option<ParameterCase> {
        let params: Vec<(String, ParamValue)> = self
            .dimensions
            .iter()
            .filter(|d| d.location == ParamLocation::Query)
            .filter_map(|d| {
                d.values
                    .iter()
                    .find(|v| v.kind == ValueKind::Valid)
                    .map(|v| (d.name.clone(), self.resolve(&v.value)))
            })
            .collect();
        if params.len() < 2 {
            return None;
        }
        let allowed = self
            .endpoint
            .combined_allow
            .as_ref()
            .map(|a| a.iter().copied().collect());
        Some(self.build(
            format!("{}/combined/all", self.endpoint.name),
            Variant::Combined,
            params,
            allowed,
            true,
            None,
            None,
        ))
    }

    fn conflict_case(&self, range: &RangePair) -> ParameterCase {
        let params = vec![
            (range.lower.clone(), self.resolve(&range.lower_value)),
            (range.upper.clone(), self.resolve(&range.upper_value)),
        ];
        self.build(
            format!("{}/conflict/{}>{}", self.endpoint.name, range.lower, range.upper),
            Variant::Conflict,
            params,
            Some(BTreeSet::from([200, 400])),
            true,
            None,
            None,
        )
    }

    fn auth_probes(&self) -> Vec<ParameterCase> {
        if !self.endpoint.protected {
            return Vec::new();
        }
        [
            ("no-credential", AuthMode::Anonymous),
            ("invalid-token", AuthMode::Bearer(INVALID_TOKEN.to_string())),
            ("expired-token", AuthMode::Bearer(EXPIRED_TOKEN.to_string())),
        ]
        .into_iter()
        .map(|(name, auth)| {
            let mut case = self.build(
                format!("{}/auth/{}", self.endpoint.name, name),
                Variant::Auth,
                Vec::new(),
                None,
                false,
                None,
                None,
            );
            case.auth = auth;
            case.expect = Expectation::unauthorized();
            case
        })
        .collect()
    }

    /// Assemble a case: split path and query parameters, fill missing path
    /// parameters with their representative value and apply the range
    /// conflict policy
    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        id: String,
        variant: Variant,
        params: Vec<(String, ParamValue)>,
        allowed: Option<BTreeSet<u16>>,
        check_body: bool,
        mandatory: Option<bool>,
        label: Option<String>,
    ) -> ParameterCase {
        let ep = self.endpoint;
        let mut path = ep.path.clone();
        let mut query = Vec::new();

        for (name, value) in &params {
            match ep.location_of(name) {
                ParamLocation::Path => {
                    path = path.replace(&format!("{{{}}}", name), &value.render());
                }
                ParamLocation::Query => query.push((name.clone(), value.clone())),
            }
        }
        for placeholder in ep.path_params() {
            if let Some(value) = self.representative(placeholder) {
                path = path.replace(&format!("{{{}}}", placeholder), &value.render());
            }
        }

        let mut allowed = allowed.unwrap_or_else(|| BTreeSet::from([200]));
        if self.has_range_conflict(&params) {
            allowed.insert(200);
            allowed.insert(400);
        }

        let mut expect = Expectation::status(allowed);
        if check_body {
            expect = expect.with_shape(ep.shape.clone());
        }
        expect.content_type = ep.content_type.clone();
        expect.max_latency = ep.max_latency_ms.map(Duration::from_millis);

        ParameterCase {
            id,
            endpoint: ep.name.clone(),
            variant,
            method: ep.method,
            path: path.trim_start_matches('/').to_string(),
            query,
            auth: AuthMode::Session,
            label,
            expect,
            mandatory: mandatory.unwrap_or(ep.mandatory),
        }
    }

    fn representative(&self, name: &str) -> Option<ParamValue> {
        self.endpoint
            .dimension(name)
            .and_then(|d| d.values.iter().find(|v| v.kind == ValueKind::Valid))
            .map(|v| self.resolve(&v.value))
    }

    fn has_range_conflict(&self, params: &[(String, ParamValue)]) -> bool {
        let lookup = |name: &str| params.iter().find(|(n, _)| n == name).map(|(_, v)| v);
        self.endpoint.ranges.iter().any(|range| {
            match (lookup(&range.lower), lookup(&range.upper)) {
                (Some(lower), Some(upper)) => exceeds(lower, upper),
                _ => false,
            }
        })
    }

    /// Turn generated value forms into concrete values
    fn resolve(&self, value: &ParamValue) -> ParamValue {
        match value {
            ParamValue::Repeat { repeat, times } => ParamValue::Text(repeat.repeat(*times)),
            ParamValue::Relative {
                days_from_now,
                format,
            } => {
                let at = self.anchor + chrono::Duration::days(*days_from_now);
                let format = format.as_deref().unwrap_or(DEFAULT_TIME_FORMAT);
                ParamValue::Text(at.format(format).to_string())
            }
            ParamValue::List(items) => ParamValue::List(items.iter().map(|v| self.resolve(v)).collect()),
            other => other.clone(),
        }
    }
}

/// `lower > upper`: numerically when both sides read as numbers (numeric
/// text included), then as timestamps or dates, else lexicographically
fn exceeds(lower: &ParamValue, upper: &ParamValue) -> bool {
    if let (Some(l), Some(u)) = (numeric(lower), numeric(upper)) {
        return l > u;
    }
    match (lower, upper) {
        (ParamValue::Text(l), ParamValue::Text(u)) => match (moment(l), moment(u)) {
            (Some(l), Some(u)) => l > u,
            _ => l > u,
        },
        _ => false,
    }
}

fn numeric(value: &ParamValue) -> Option<f64> {
    match value {
        ParamValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        other => other.as_f64(),
    }
}

fn moment(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.naive_utc())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(text, DEFAULT_TIME_FORMAT).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

fn id_value(value: &ParamValue) -> String {
    let rendered = value.to_string();
    if rendered.chars().count() > ID_VALUE_LIMIT {
        let head: String = rendered.chars().take(ID_VALUE_LIMIT).collect();
        format!("{}…", head)
    } else {
        rendered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::SuiteFile;
    use chrono::TimeZone;

    const SUITE: &str = r#"
name: location
endpoints:
  - name: list
    path: mobile/location/
    params: [city, page, price_min, price_max, time_start, time_end]
    dimensions:
      - name: city
        values:
          - { kind: valid, value: 347 }
          - { kind: boundary, value: 0 }
          - { kind: invalid, value: "invalid" }
      - name: page
        values:
          - { kind: valid, value: 1 }
          - { kind: boundary, value: 99999, allow: [200, 404] }
          - { kind: invalid, value: -1, allow: [200, 400, 404] }
    ranges:
      - { lower: price_min, upper: price_max, lower_value: 500000, upper_value: 100000 }
    combined:
      - name: price-range
        params: { price_min: 100000, price_max: 500000 }
      - name: time-window
        params: { time_start: { days_from_now: -30 }, time_end: { days_from_now: 30 } }
        allow: [200, 400]
    shape:
      - { check: equals, path: success, value: true }
      - { check: any_of, paths: [result, results] }
  - name: detail
    path: mobile/location/{id}/
    params: [id]
    protected: false
    dimensions:
      - name: id
        location: path
        values:
          - { kind: valid, value: 4 }
          - { kind: boundary, value: 0, allow: [400, 404] }
          - { kind: invalid, value: "invalid", allow: [400, 404] }
"#;

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
    }

    fn cases(index: usize) -> Vec<ParameterCase> {
        let suite = SuiteFile::from_yaml(SUITE).unwrap();
        suite.validate().unwrap();
        let endpoint = &suite.endpoints[index];
        ParameterMatrix::for_endpoint(endpoint, anchor()).cases().collect()
    }

    fn find<'c>(cases: &'c [ParameterCase], id: &str) -> &'c ParameterCase {
        cases
            .iter()
            .find(|c| c.id == id)
            .unwrap_or_else(|| panic!("no case {}", id))
    }

    #[test]
    fn test_baseline_expects_success_shape() {
        let cases = cases(0);
        let baseline = &cases[0];
        assert_eq!(baseline.id, "list/baseline");
        assert!(baseline.query.is_empty());
        assert_eq!(baseline.expect.allowed, BTreeSet::from([200]));
        assert!(baseline.expect.check_body);
        assert_eq!(baseline.expect.shape.len(), 2);
    }

    #[test]
    fn test_sequence_layout() {
        let cases = cases(0);
        // baseline + 6 singles + combined + 2 curated + 1 conflict + 3 probes
        assert_eq!(cases.len(), 14);
        let variants: Vec<Variant> = cases.iter().map(|c| c.variant).collect();
        assert_eq!(variants[0], Variant::Valid);
        assert_eq!(variants[7], Variant::Combined);
        assert_eq!(variants[10], Variant::Conflict);
        assert!(variants[11..].iter().all(|v| *v == Variant::Auth));
    }

    #[test]
    fn test_restartable() {
        let suite = SuiteFile::from_yaml(SUITE).unwrap();
        let matrix = ParameterMatrix::for_endpoint(&suite.endpoints[0], anchor());
        let first: Vec<_> = matrix.cases().collect();
        let second: Vec<_> = matrix.cases().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_conflict_case_tolerates_both_policies() {
        let cases = cases(0);
        let conflict = find(&cases, "list/conflict/price_min>price_max");
        assert_eq!(conflict.expect.allowed, BTreeSet::from([200, 400]));
        assert_eq!(
            conflict.query_pairs(),
            vec![
                ("price_min".to_string(), "500000".to_string()),
                ("price_max".to_string(), "100000".to_string()),
            ]
        );
    }

    #[test]
    fn test_ordered_range_keeps_strict_expectation() {
        let cases = cases(0);
        let curated = find(&cases, "list/combined/price-range");
        assert_eq!(curated.expect.allowed, BTreeSet::from([200]));
    }

    #[test]
    fn test_page_boundary_allows_not_found() {
        let cases = cases(0);
        let page = find(&cases, "list/boundary/page[1]=99999");
        assert_eq!(page.expect.allowed, BTreeSet::from([200, 404]));
        assert!(page.expect.check_body);
    }

    #[test]
    fn test_combined_takes_one_value_per_dimension() {
        let cases = cases(0);
        let combined = find(&cases, "list/combined/all");
        assert_eq!(
            combined.query_pairs(),
            vec![
                ("city".to_string(), "347".to_string()),
                ("page".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_relative_times_resolve_against_anchor() {
        let cases = cases(0);
        let window = find(&cases, "list/combined/time-window");
        let pairs = window.query_pairs();
        assert!(pairs.contains(&("time_start".to_string(), "2026-01-30T10:00:00".to_string())));
        assert!(pairs.contains(&("time_end".to_string(), "2026-03-31T10:00:00".to_string())));
        assert_eq!(window.expect.allowed, BTreeSet::from([200, 400]));
    }

    #[test]
    fn test_auth_probes_skip_body() {
        let cases = cases(0);
        let probes: Vec<_> = cases.iter().filter(|c| c.variant == Variant::Auth).collect();
        assert_eq!(probes.len(), 3);
        assert_eq!(probes[0].auth, AuthMode::Anonymous);
        for probe in probes {
            assert_eq!(probe.expect.allowed, BTreeSet::from([401, 403]));
            assert!(!probe.expect.check_body);
        }
    }

    #[test]
    fn test_path_parameters_substituted() {
        let cases = cases(1);
        assert_eq!(cases[0].path, "mobile/location/4/");
        let invalid = find(&cases, "detail/invalid/id[2]=invalid");
        assert_eq!(invalid.path, "mobile/location/invalid/");
        assert!(invalid.query.is_empty());
        assert_eq!(invalid.expect.allowed, BTreeSet::from([400, 404]));
        // unprotected, single dimension: no probes and no combined case
        assert_eq!(cases.len(), 4);
    }

    #[test]
    fn test_cases_reference_declared_params_only() {
        let suite = SuiteFile::from_yaml(SUITE).unwrap();
        for endpoint in &suite.endpoints {
            for case in ParameterMatrix::for_endpoint(endpoint, anchor()).cases() {
                for (name, _) in &case.query {
                    assert!(endpoint.params.contains(name), "{} uses {}", case.id, name);
                }
            }
        }
    }

    #[test]
    fn test_exceeds() {
        assert!(exceeds(&ParamValue::Int(5), &ParamValue::Float(4.5)));
        assert!(!exceeds(&ParamValue::Int(4), &ParamValue::Int(4)));
        assert!(exceeds(
            &ParamValue::Text("2026-03-02".to_string()),
            &ParamValue::Text("2026-03-01".to_string())
        ));
        assert!(!exceeds(&ParamValue::Text("x".to_string()), &ParamValue::Int(1)));
    }

    #[test]
    fn test_exceeds_numeric_text() {
        let text = |s: &str| ParamValue::Text(s.to_string());
        assert!(!exceeds(&text("9"), &text("10")));
        assert!(exceeds(&text("10"), &text("9")));
        assert!(exceeds(&text("500000"), &ParamValue::Int(100000)));
        assert!(!exceeds(&ParamValue::Int(9), &text("10")));
    }

    #[test]
    fn test_exceeds_dates_and_timestamps() {
        let text = |s: &str| ParamValue::Text(s.to_string());
        assert!(exceeds(&text("2026-03-02T00:00:00"), &text("2026-03-01T23:59:59")));
        assert!(!exceeds(&text("2026-03-01T09:00:00+05:00"), &text("2026-03-01T08:00:00Z")));
        assert!(exceeds(&text("2026-03-02"), &text("2026-03-01T12:00:00")));
    }
}
