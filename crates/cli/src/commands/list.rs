//! List Command
//!
//! Shows every selected endpoint and how many cases it expands to.

use anyhow::Result;
use apicheck_harness::catalog::load_suites;
use apicheck_harness::ParameterMatrix;
use chrono::Utc;
use clap::Args;
use serde::Serialize;

use super::ConfigArgs;
use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Endpoint summary for display
#[derive(Serialize, Clone)]
pub struct EndpointRow {
    pub suite: String,
    pub endpoint: String,
    pub method: String,
    pub path: String,
    pub auth: String,
    pub cases: usize,
    pub mandatory: bool,
}

impl TableDisplay for EndpointRow {
    fn headers() -> Vec<&'static str> {
        vec!["Suite", "Endpoint", "Method", "Path", "Auth", "Cases", "Mandatory"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.suite.clone(),
            self.endpoint.clone(),
            self.method.clone(),
            self.path.clone(),
            self.auth.clone(),
            self.cases.to_string(),
            if self.mandatory { "yes" } else { "no" }.to_string(),
        ]
    }
}

pub async fn execute(args: ListArgs, format: OutputFormat) -> Result<()> {
    let config = args.config.load()?;
    let suites = load_suites(&config.suites)?;
    let anchor = Utc::now();

    let rows: Vec<EndpointRow> = suites
        .iter()
        .flat_map(|suite| {
            suite.endpoints.iter().map(move |endpoint| EndpointRow {
                suite: suite.name.clone(),
                endpoint: endpoint.name.clone(),
                method: endpoint.method.to_string(),
                path: endpoint.path.clone(),
                auth: suite.auth.clone(),
                cases: ParameterMatrix::for_endpoint(endpoint, anchor).cases().count(),
                mandatory: endpoint.mandatory,
            })
        })
        .collect();

    print_list(&rows, format);
    Ok(())
}
