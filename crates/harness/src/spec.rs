//! Declarative YAML endpoint specifications
//!
//! A suite file names an auth profile and lists endpoints. Each endpoint
//! declares its parameters and the dimensions the matrix varies:
//!
//! ```yaml
//! name: location
//! auth: mobile
//! endpoints:
//!   - name: location-list
//!     path: mobile/location/
//!     params: [city, page]
//!     dimensions:
//!       - name: city
//!         values:
//!           - { kind: valid, value: 347 }
//!           - { kind: boundary, value: 0 }
//!           - { kind: invalid, value: "invalid" }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};

/// Default auth profile used when a suite does not name one
pub const DEFAULT_PROFILE: &str = "default";

/// Profile name that means "no credential at all"
pub const ANONYMOUS_PROFILE: &str = "none";

/// A suite file: one auth profile and the endpoints that share it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteFile {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Auth profile from the config's `[auth.<profile>]` table
    #[serde(default = "default_profile")]
    pub auth: String,

    #[serde(default)]
    pub tags: Vec<String>,

    pub endpoints: Vec<EndpointSpec>,
}

fn default_profile() -> String {
    DEFAULT_PROFILE.to_string()
}

fn default_true() -> bool {
    true
}

/// HTTP method of an endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

/// One endpoint and the parameter space exercised against it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSpec {
    /// Unique name, used as the prefix of every case id
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub method: Method,

    /// Path relative to the base URL; `{name}` placeholders are path parameters
    pub path: String,

    /// Every parameter a case may reference
    #[serde(default)]
    pub params: Vec<String>,

    #[serde(default)]
    pub dimensions: Vec<Dimension>,

    /// Parameter pairs whose lower bound must not exceed the upper bound
    #[serde(default)]
    pub ranges: Vec<RangePair>,

    /// Allowed statuses for the generated all-dimensions case
    #[serde(default)]
    pub combined_allow: Option<Vec<u16>>,

    /// Hand-picked multi-parameter cases
    #[serde(default)]
    pub combined: Vec<CuratedCase>,

    #[serde(default)]
    pub sweep: Option<Sweep>,

    /// Emit unauthenticated probes expecting 401/403
    #[serde(default = "default_true")]
    pub protected: bool,

    /// Body predicates checked on every 200 response
    #[serde(default)]
    pub shape: Vec<BodyPredicate>,

    #[serde(default)]
    pub content_type: Option<String>,

    #[serde(default)]
    pub max_latency_ms: Option<u64>,

    #[serde(default)]
    pub metric: Option<MetricRule>,

    #[serde(default = "default_true")]
    pub mandatory: bool,
}

/// Where a parameter goes in the request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamLocation {
    #[default]
    Query,
    Path,
}

/// One independently varied parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,

    #[serde(default)]
    pub location: ParamLocation,

    pub values: Vec<DimensionValue>,
}

/// Tag of a dimension value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Valid,
    Boundary,
    Invalid,
}

impl ValueKind {
    /// Statuses tolerated when the value does not override them
    pub fn default_allowed(self) -> BTreeSet<u16> {
        match self {
            ValueKind::Valid => BTreeSet::from([200]),
            ValueKind::Boundary | ValueKind::Invalid => BTreeSet::from([200, 400]),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Valid => "valid",
            ValueKind::Boundary => "boundary",
            ValueKind::Invalid => "invalid",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimensionValue {
    pub kind: ValueKind,

    pub value: ParamValue,

    /// Overrides the kind's default allowed statuses
    #[serde(default)]
    pub allow: Option<Vec<u16>>,

    /// Check body predicates when the response is 200
    #[serde(default = "default_true")]
    pub check_body: bool,

    #[serde(default)]
    pub mandatory: Option<bool>,
}

/// A value sent as a query or path parameter
///
/// Lists are sent as repeated keys. `repeat` and `days_from_now` are
/// resolved when cases are generated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<ParamValue>),
    Repeat {
        repeat: String,
        times: usize,
    },
    Relative {
        days_from_now: i64,
        #[serde(default)]
        format: Option<String>,
    },
}

impl ParamValue {
    /// Numeric view used for range comparisons
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Expand into `(name, value)` query pairs
    pub fn query_pairs(&self, name: &str) -> Vec<(String, String)> {
        match self {
            ParamValue::List(items) => items
                .iter()
                .flat_map(|item| item.query_pairs(name))
                .collect(),
            other => vec![(name.to_string(), other.render())],
        }
    }

    /// Single-string rendering (lists are comma-joined)
    pub fn render(&self) -> String {
        match self {
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) => f.to_string(),
            ParamValue::Text(s) => s.clone(),
            ParamValue::List(items) => items
                .iter()
                .map(ParamValue::render)
                .collect::<Vec<_>>()
                .join(","),
            ParamValue::Repeat { repeat, times } => repeat.repeat(*times),
            ParamValue::Relative { days_from_now, .. } => format!("now{:+}d", days_from_now),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::List(items) => {
                let inner: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "[{}]", inner.join(","))
            }
            ParamValue::Text(s) if s.is_empty() => f.write_str("\"\""),
            ParamValue::Repeat { repeat, times } => write!(f, "{}x{}", repeat, times),
            other => f.write_str(&other.render()),
        }
    }
}

/// `lower` must not exceed `upper`; the matrix emits one case violating it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangePair {
    pub lower: String,
    pub upper: String,
    pub lower_value: ParamValue,
    pub upper_value: ParamValue,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CuratedCase {
    pub name: String,

    pub params: BTreeMap<String, ParamValue>,

    #[serde(default)]
    pub allow: Option<Vec<u16>>,

    #[serde(default)]
    pub mandatory: Option<bool>,
}

/// Labelled values of one parameter, each feeding the endpoint's metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sweep {
    pub param: String,

    pub points: Vec<SweepPoint>,

    #[serde(default)]
    pub mandatory: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepPoint {
    pub label: String,
    pub value: ParamValue,
}

/// Named numeric metric pulled from successful bodies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRule {
    pub name: String,

    /// Keys tried before the built-in priority list
    #[serde(default)]
    pub keys: Vec<String>,
}

/// JSON value types accepted by the `type` predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonType {
    Bool,
    Number,
    Integer,
    String,
    Array,
    Object,
    Null,
}

impl fmt::Display for JsonType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JsonType::Bool => "bool",
            JsonType::Number => "number",
            JsonType::Integer => "integer",
            JsonType::String => "string",
            JsonType::Array => "array",
            JsonType::Object => "object",
            JsonType::Null => "null",
        };
        f.write_str(s)
    }
}

/// Assertion over a JSON body, addressed by a dotted path
///
/// An empty path means the value itself, which is how `each` checks
/// address array elements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum BodyPredicate {
    Required {
        path: String,
    },
    AnyOf {
        paths: Vec<String>,
    },
    Type {
        path: String,
        kind: JsonType,
    },
    Range {
        path: String,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    Equals {
        path: String,
        value: serde_json::Value,
    },
    Pattern {
        path: String,
        regex: String,
    },
    Prefix {
        path: String,
        prefixes: Vec<String>,
    },
    Len {
        path: String,
        #[serde(default)]
        min: Option<usize>,
        #[serde(default)]
        max: Option<usize>,
    },
    Each {
        path: String,
        checks: Vec<BodyPredicate>,
    },
}

impl BodyPredicate {
    fn validate(&self) -> Result<(), String> {
        match self {
            BodyPredicate::Pattern { regex, .. } => regex::Regex::new(regex)
                .map(|_| ())
                .map_err(|e| format!("bad pattern '{}': {}", regex, e)),
            BodyPredicate::AnyOf { paths } if paths.is_empty() => {
                Err("any_of needs at least one path".to_string())
            }
            BodyPredicate::Each { checks, .. } => checks.iter().try_for_each(Self::validate),
            _ => Ok(()),
        }
    }
}

impl EndpointSpec {
    /// Placeholder names in the path template, in order
    pub fn path_params(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut rest = self.path.as_str();
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            names.push(&rest[start + 1..start + len]);
            rest = &rest[start + len + 1..];
        }
        names
    }

    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn location_of(&self, param: &str) -> ParamLocation {
        if self.path_params().contains(&param) {
            ParamLocation::Path
        } else {
            ParamLocation::Query
        }
    }

    /// Check that every referenced parameter is declared and every
    /// dimension covers valid, boundary and invalid values
    pub fn validate(&self) -> HarnessResult<()> {
        let err = |reason: String| HarnessError::suite(&self.name, reason);
        let declared: BTreeSet<&str> = self.params.iter().map(String::as_str).collect();
        let check = |param: &str, context: &str| {
            if declared.contains(param) {
                Ok(())
            } else {
                Err(err(format!("{} references undeclared parameter '{}'", context, param)))
            }
        };

        for placeholder in self.path_params() {
            check(placeholder, "path")?;
            let has_valid = self
                .dimension(placeholder)
                .map(|d| d.values.iter().any(|v| v.kind == ValueKind::Valid))
                .unwrap_or(false);
            if !has_valid {
                return Err(err(format!(
                    "path parameter '{}' needs a dimension with a valid value",
                    placeholder
                )));
            }
        }

        let mut seen = BTreeSet::new();
        for dim in &self.dimensions {
            check(&dim.name, "dimension")?;
            if !seen.insert(dim.name.as_str()) {
                return Err(err(format!("dimension '{}' declared twice", dim.name)));
            }
            if dim.location != self.location_of(&dim.name) {
                return Err(err(format!(
                    "dimension '{}' location does not match the path template",
                    dim.name
                )));
            }
            for kind in [ValueKind::Valid, ValueKind::Boundary, ValueKind::Invalid] {
                if !dim.values.iter().any(|v| v.kind == kind) {
                    return Err(err(format!("dimension '{}' has no {} value", dim.name, kind)));
                }
            }
        }

        for range in &self.ranges {
            check(&range.lower, "range")?;
            check(&range.upper, "range")?;
        }
        for case in &self.combined {
            for param in case.params.keys() {
                check(param, &format!("combined case '{}'", case.name))?;
            }
        }
        if let Some(sweep) = &self.sweep {
            check(&sweep.param, "sweep")?;
            if sweep.points.is_empty() {
                return Err(err("sweep has no points".to_string()));
            }
        }
        for predicate in &self.shape {
            predicate.validate().map_err(|reason| err(reason))?;
        }
        Ok(())
    }
}

impl SuiteFile {
    /// Parse a suite from a YAML string
    pub fn from_yaml(yaml: &str) -> HarnessResult<Self> {
        serde_yaml::from_str(yaml).map_err(HarnessError::from)
    }

    /// Parse a suite from a YAML file
    pub fn from_file(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load all suites from a directory, sorted by file path
    pub fn load_all(dir: &Path) -> HarnessResult<Vec<Self>> {
        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .map(|e| e.into_path())
            .collect();
        paths.sort();

        paths.iter().map(|p| Self::from_file(p)).collect()
    }

    /// Validate every endpoint and check endpoint names are unique
    pub fn validate(&self) -> HarnessResult<()> {
        let mut names = BTreeSet::new();
        for endpoint in &self.endpoints {
            if !names.insert(endpoint.name.as_str()) {
                return Err(HarnessError::suite(
                    &self.name,
                    format!("endpoint '{}' declared twice", endpoint.name),
                ));
            }
            endpoint.validate()?;
        }
        Ok(())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
            || self
                .endpoints
                .iter()
                .any(|e| e.tags.iter().any(|t| t == tag))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
name: location
auth: mobile
endpoints:
  - name: location-list
    path: mobile/location/
    params: [city, price_min, price_max]
    dimensions:
      - name: city
        values:
          - { kind: valid, value: 347 }
          - { kind: boundary, value: 0 }
          - { kind: invalid, value: "invalid", allow: [200, 400, 404] }
    ranges:
      - { lower: price_min, upper: price_max, lower_value: 500000, upper_value: 100000 }
    shape:
      - { check: equals, path: success, value: true }
      - { check: any_of, paths: [result, results] }
"#;

    #[test]
    fn test_parse_listing_suite() {
        let suite = SuiteFile::from_yaml(LISTING).unwrap();
        assert_eq!(suite.auth, "mobile");
        let endpoint = &suite.endpoints[0];
        assert_eq!(endpoint.method, Method::Get);
        assert!(endpoint.protected);
        assert_eq!(endpoint.dimensions[0].values.len(), 3);
        assert_eq!(endpoint.dimensions[0].values[0].value, ParamValue::Int(347));
        assert_eq!(
            endpoint.dimensions[0].values[2].value,
            ParamValue::Text("invalid".to_string())
        );
        assert_eq!(endpoint.shape.len(), 2);
        suite.validate().unwrap();
    }

    #[test]
    fn test_param_value_shapes() {
        let values: Vec<ParamValue> = serde_yaml::from_str(
            r#"
- 1500.5
- [1, 3, 4]
- { repeat: "a", times: 4 }
- { days_from_now: -30 }
"#,
        )
        .unwrap();
        assert_eq!(values[0], ParamValue::Float(1500.5));
        assert_eq!(values[1].query_pairs("languages").len(), 3);
        assert_eq!(values[2].render(), "aaaa");
        assert!(matches!(values[3], ParamValue::Relative { days_from_now: -30, .. }));
    }

    #[test]
    fn test_empty_list_has_no_pairs() {
        assert!(ParamValue::List(vec![]).query_pairs("languages").is_empty());
    }

    #[test]
    fn test_undeclared_parameter_rejected() {
        let yaml = LISTING.replace("params: [city, price_min, price_max]", "params: [city]");
        let suite = SuiteFile::from_yaml(&yaml).unwrap();
        let err = suite.validate().unwrap_err().to_string();
        assert!(err.contains("undeclared parameter 'price_min'"), "{}", err);
    }

    #[test]
    fn test_dimension_needs_every_kind() {
        let yaml = LISTING.replace("          - { kind: boundary, value: 0 }\n", "");
        let suite = SuiteFile::from_yaml(&yaml).unwrap();
        let err = suite.validate().unwrap_err().to_string();
        assert!(err.contains("no boundary value"), "{}", err);
    }

    #[test]
    fn test_path_params() {
        let endpoint = EndpointSpec {
            name: "detail".to_string(),
            path: "mobile/location/{id}/".to_string(),
            ..SuiteFile::from_yaml(LISTING).unwrap().endpoints.remove(0)
        };
        assert_eq!(endpoint.path_params(), vec!["id"]);
        assert_eq!(endpoint.location_of("id"), ParamLocation::Path);
        assert_eq!(endpoint.location_of("city"), ParamLocation::Query);
    }

    #[test]
    fn test_bad_pattern_rejected() {
        let yaml = LISTING.replace(
            "      - { check: any_of, paths: [result, results] }",
            "      - { check: pattern, path: result.open_at, regex: \"([\" }",
        );
        let suite = SuiteFile::from_yaml(&yaml).unwrap();
        assert!(suite.validate().is_err());
    }
}
