//! Text and JSON renderings of a [`Report`]

use std::fmt::Write as _;
use std::path::Path;

use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Table};

use crate::error::HarnessResult;
use crate::report::Report;

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

/// Human-readable summary: per-endpoint table, metric totals and every
/// failing or erroring case
pub fn render_text(report: &Report) -> String {
    let mut out = String::new();
    let summary = &report.summary;

    let _ = writeln!(out, "Base URL:  {}", report.base_url);
    let _ = writeln!(out, "Generated: {}", report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "Duration:  {:.2}s", report.duration_ms as f64 / 1000.0);
    let _ = writeln!(out);

    let mut endpoints = table();
    endpoints.set_header(vec!["Endpoint", "Total", "Pass", "Fail", "Error", "Pass rate"]);
    for entry in &report.endpoints {
        endpoints.add_row(vec![
            Cell::new(&entry.endpoint),
            Cell::new(entry.total).set_alignment(CellAlignment::Right),
            Cell::new(entry.passed).set_alignment(CellAlignment::Right),
            Cell::new(entry.failed).set_alignment(CellAlignment::Right),
            Cell::new(entry.errored).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.1}%", entry.pass_rate)).set_alignment(CellAlignment::Right),
        ]);
    }
    let _ = writeln!(out, "{endpoints}");

    for metric in &report.metrics {
        let mut samples = table();
        samples.set_header(vec![metric.name.as_str(), "Value"]);
        for sample in &metric.samples {
            let value = sample
                .value
                .map(|v| v.to_string())
                .unwrap_or_else(|| "N/A".to_string());
            samples.add_row(vec![
                Cell::new(&sample.label),
                Cell::new(value).set_alignment(CellAlignment::Right),
            ]);
        }
        samples.add_row(vec![
            Cell::new("TOTAL"),
            Cell::new(metric.total).set_alignment(CellAlignment::Right),
        ]);
        let _ = writeln!(out);
        let _ = writeln!(out, "{} ({})", metric.name, metric.endpoint);
        let _ = writeln!(out, "{samples}");
    }

    let problems: Vec<_> = report.problems().collect();
    if !problems.is_empty() {
        let mut failing = table();
        failing.set_header(vec!["Case", "Verdict", "Status", "Reason"]);
        for outcome in problems {
            let mut case = outcome.case_id.clone();
            if !outcome.mandatory {
                case.push_str(" (optional)");
            }
            failing.add_row(vec![
                Cell::new(case),
                Cell::new(outcome.verdict),
                Cell::new(
                    outcome
                        .status
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ),
                Cell::new(outcome.reason.as_deref().unwrap_or("")),
            ]);
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "{failing}");
    }

    let _ = writeln!(out);
    let _ = write!(
        out,
        "{} cases: {} passed, {} failed, {} errored ({} mandatory failures)",
        summary.total, summary.passed, summary.failed, summary.errored, summary.mandatory_failures
    );
    out
}

/// Pretty-printed JSON
pub fn render_json(report: &Report) -> HarnessResult<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

/// Write the JSON rendering to `path`, creating parent directories
pub fn write_json(report: &Report, path: &Path) -> HarnessResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, render_json(report)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{BodyState, Verdict};
    use crate::executor::Outcome;
    use crate::matrix::Variant;
    use crate::report::Aggregator;

    fn report() -> Report {
        let aggregator = Aggregator::new("http://localhost/api/v1/");
        for (seq, verdict) in [Verdict::Pass, Verdict::Fail, Verdict::Error].into_iter().enumerate() {
            aggregator.record(Outcome {
                seq,
                case_id: format!("list/case{}", seq),
                endpoint: "list".to_string(),
                variant: Variant::Boundary,
                label: None,
                mandatory: true,
                status: (verdict != Verdict::Error).then_some(200),
                allowed: vec![200],
                elapsed_ms: 12,
                verdict,
                reason: (verdict != Verdict::Pass).then(|| format!("reason {}", seq)),
                metric: None,
                body: BodyState::NotRead,
            });
        }
        aggregator.summarize()
    }

    #[test]
    fn test_render_text_lists_problems() {
        let text = render_text(&report());
        assert!(text.contains("list/case1"));
        assert!(text.contains("reason 2"));
        assert!(!text.contains("list/case0 "));
        assert!(text.ends_with("3 cases: 1 passed, 1 failed, 1 errored (2 mandatory failures)"));
    }

    #[test]
    fn test_render_is_stable() {
        let report = report();
        assert_eq!(render_text(&report), render_text(&report));
        assert_eq!(render_json(&report).unwrap(), render_json(&report).unwrap());
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("run.json");
        write_json(&report(), &path).unwrap();

        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["summary"]["total"], 3);
        assert_eq!(value["outcomes"][1]["verdict"], "FAIL");
        assert_eq!(value["outcomes"][2]["reason"], "reason 2");
        assert!(value["outcomes"][0].get("reason").is_none());
    }
}
