//! Cases Command
//!
//! Dry run: prints the cases one endpoint expands to without sending anything.

use anyhow::{anyhow, Result};
use apicheck_harness::catalog::{find_endpoint, load_suites};
use apicheck_harness::matrix::AuthMode;
use apicheck_harness::{ParameterCase, ParameterMatrix};
use chrono::Utc;
use clap::Args;
use serde::Serialize;

use super::ConfigArgs;
use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct CasesArgs {
    /// Endpoint name as shown by `apicheck list`
    pub endpoint: String,

    #[command(flatten)]
    pub config: ConfigArgs,
}

/// One generated case for display
#[derive(Serialize, Clone)]
pub struct CaseRow {
    pub id: String,
    pub variant: String,
    pub request: String,
    pub auth: String,
    pub allowed: Vec<u16>,
    pub mandatory: bool,
}

impl From<&ParameterCase> for CaseRow {
    fn from(case: &ParameterCase) -> Self {
        let query = case
            .query_pairs()
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let request = if query.is_empty() {
            format!("{} {}", case.method, case.path)
        } else {
            format!("{} {}?{}", case.method, case.path, query)
        };
        let auth = match &case.auth {
            AuthMode::Session => "session",
            AuthMode::Anonymous => "none",
            AuthMode::Bearer(_) => "bearer",
        };
        Self {
            id: case.id.clone(),
            variant: case.variant.to_string(),
            request,
            auth: auth.to_string(),
            allowed: case.expect.allowed.iter().copied().collect(),
            mandatory: case.mandatory,
        }
    }
}

impl TableDisplay for CaseRow {
    fn headers() -> Vec<&'static str> {
        vec!["Case", "Variant", "Request", "Auth", "Allowed", "Mandatory"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.clone(),
            self.variant.clone(),
            self.request.clone(),
            self.auth.clone(),
            self.allowed
                .iter()
                .map(u16::to_string)
                .collect::<Vec<_>>()
                .join(","),
            if self.mandatory { "yes" } else { "no" }.to_string(),
        ]
    }
}

pub async fn execute(args: CasesArgs, format: OutputFormat) -> Result<()> {
    let config = args.config.load()?;
    let suites = load_suites(&config.suites)?;
    let (_, endpoint) = find_endpoint(&suites, &args.endpoint)
        .ok_or_else(|| anyhow!("Unknown endpoint '{}'", args.endpoint))?;

    let rows: Vec<CaseRow> = ParameterMatrix::for_endpoint(endpoint, Utc::now())
        .cases()
        .map(|case| CaseRow::from(&case))
        .collect();

    print_list(&rows, format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use apicheck_harness::SuiteFile;

    #[test]
    fn test_case_rows() {
        let suite = SuiteFile::from_yaml(
            r#"
name: demo
endpoints:
  - name: list
    path: mobile/location/
    params: [languages]
    dimensions:
      - name: languages
        values:
          - { kind: valid, value: [1, 3] }
          - { kind: boundary, value: [] }
          - { kind: invalid, value: [999] }
"#,
        )
        .unwrap();
        let rows: Vec<CaseRow> = ParameterMatrix::for_endpoint(&suite.endpoints[0], Utc::now())
            .cases()
            .map(|case| CaseRow::from(&case))
            .collect();

        assert_eq!(rows[0].request, "GET mobile/location/");
        assert_eq!(rows[1].request, "GET mobile/location/?languages=1&languages=3");
        assert_eq!(rows[2].request, "GET mobile/location/");
        assert_eq!(rows.last().map(|r| r.auth.as_str()), Some("bearer"));
        assert_eq!(rows[3].allowed, vec![200, 400]);
    }
}
