use chrono::{DateTime, Utc};
use common::ResultStatus;
use common::report_job::{ReportJob, ResultSnapshot};
use handlebars::Handlebars;
use serde_json::json;

use crate::error::ReportError;

const REPORT_TEMPLATE: &str = include_str!("../templates/report.hbs");

/// Status breakdown over a result snapshot set.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ResultStats {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub blocked: usize,
    pub skipped: usize,
    pub pending: usize,
}

pub fn count_results(results: &[ResultSnapshot]) -> ResultStats {
    let mut stats = ResultStats::default();
    for result in results {
        stats.total += 1;
        match result.status {
            ResultStatus::Pending => stats.pending += 1,
            ResultStatus::Passed => stats.passed += 1,
            ResultStatus::Failed => stats.failed += 1,
            ResultStatus::Blocked => stats.blocked += 1,
            ResultStatus::Skipped => stats.skipped += 1,
        }
    }
    stats
}

/// Pass rate = passed / total × 100, rounded to 2 decimals. 0 when total is 0.
pub fn pass_rate(passed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (passed as f64 / total as f64 * 100.0 * 100.0).round() / 100.0
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
    time.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".into())
}

/// Render the self-contained HTML report for an execution.
pub fn render_html_report(job: &ReportJob) -> Result<String, ReportError> {
    let mut handlebars = Handlebars::new();
    handlebars
        .register_template_string("report", REPORT_TEMPLATE)
        .map_err(|e| ReportError::Template(e.to_string()))?;

    let stats = count_results(&job.results);
    let rate = pass_rate(stats.passed, stats.total);

    let rows: Vec<serde_json::Value> = job
        .results
        .iter()
        .map(|r| {
            json!({
                "case_id": r.case_id,
                "case_name": r.case_name,
                "status": r.status.as_str(),
                "actual_result": r.actual_result.as_deref().unwrap_or("-"),
                "remarks": r.remarks.as_deref().unwrap_or("-"),
                "execution_time": format_time(r.execution_time),
            })
        })
        .collect();

    let data = json!({
        "plan_name": job.execution.plan_name,
        "executor_name": job.execution.executor_name,
        "start_time": format_time(job.execution.start_time),
        "end_time": format_time(job.execution.end_time),
        "status": job.execution.status.as_str(),
        "total": stats.total,
        "passed": stats.passed,
        "failed": stats.failed,
        "blocked": stats.blocked,
        "skipped": stats.skipped,
        "pending": stats.pending,
        "pass_rate": rate,
        "results": rows,
    });

    handlebars
        .render("report", &data)
        .map_err(|e| ReportError::Template(e.to_string()))
}
