//! Run Command
//!
//! Executes the selected suites and prints the report.

use std::path::PathBuf;

use anyhow::{Context, Result};
use apicheck_harness::render::{render_json, render_text, write_json};
use apicheck_harness::{run_suite, SuiteConfig};
use clap::Args;
use tracing::debug;

use super::ConfigArgs;
use crate::output::{print_error, print_success, print_warning, OutputFormat};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Only run these suites (repeatable)
    #[arg(short, long = "suite")]
    pub suites: Vec<String>,

    /// Only run suites or endpoints with this tag (repeatable)
    #[arg(short, long = "tag")]
    pub tags: Vec<String>,

    /// Also write the JSON report to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Number of cases in flight at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Per-case timeout in seconds
    #[arg(long)]
    pub timeout: Option<f64>,

    /// Cancel cases still pending after this many seconds
    #[arg(long)]
    pub deadline: Option<f64>,

    /// Override the base URL of the API under test
    #[arg(long, env = "APICHECK_BASE_URL")]
    pub base_url: Option<String>,
}

impl RunArgs {
    fn apply(&self, mut config: SuiteConfig) -> SuiteConfig {
        if !self.suites.is_empty() {
            config.suites.names = self.suites.clone();
        }
        if !self.tags.is_empty() {
            config.suites.tags = self.tags.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.run.concurrency = concurrency;
        }
        if let Some(timeout) = self.timeout {
            config.run.timeout_secs = timeout;
        }
        if let Some(deadline) = self.deadline {
            config.run.deadline_secs = Some(deadline);
        }
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        config
    }
}

/// Run the suites and return the process exit code
pub async fn execute(args: RunArgs, format: OutputFormat) -> Result<i32> {
    let config = args.apply(args.config.load()?);
    debug!("Running against {}", config.base_url);

    let report = run_suite(&config).await?;

    match format {
        OutputFormat::Text => println!("{}", render_text(&report)),
        OutputFormat::Json => println!("{}", render_json(&report)?),
    }

    if let Some(path) = &args.output {
        write_json(&report, path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        debug!("Report written to {}", path.display());
    }

    let summary = &report.summary;
    if report.is_success() {
        print_success(&format!("{} of {} cases passed", summary.passed, summary.total));
        let optional = summary.failed + summary.errored;
        if optional > 0 {
            print_warning(&format!("{} optional case(s) failed or errored", optional));
        }
    } else {
        print_error(&format!(
            "{} mandatory case(s) failed or errored",
            summary.mandatory_failures
        ));
    }
    Ok(report.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        run: RunArgs,
    }

    #[test]
    fn test_flags_override_config() {
        let args = Harness::parse_from([
            "apicheck",
            "--suite",
            "location",
            "--tag",
            "perf",
            "--concurrency",
            "4",
            "--timeout",
            "2.5",
            "--deadline",
            "60",
            "--base-url",
            "http://localhost:9000/api/v1/",
        ])
        .run;
        let config = args.apply(SuiteConfig::default());
        assert_eq!(config.suites.names, vec!["location"]);
        assert_eq!(config.suites.tags, vec!["perf"]);
        assert_eq!(config.run.concurrency, 4);
        assert_eq!(config.run.timeout_secs, 2.5);
        assert_eq!(config.run.deadline_secs, Some(60.0));
        assert_eq!(config.base_url, "http://localhost:9000/api/v1/");
    }

    #[test]
    fn test_no_flags_keep_config() {
        let args = Harness::parse_from(["apicheck"]).run;
        let config = args.apply(SuiteConfig::default());
        assert!(config.suites.names.is_empty());
        assert_eq!(config.run.concurrency, 1);
    }
}
