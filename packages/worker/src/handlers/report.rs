use std::fs;
use std::path::{Path, PathBuf};

use common::ReportType;
use common::report_job::ReportJob;
use common::report_outcome::{ReportErrorInfo, ReportOutcome};
use tracing::{info, instrument, warn};

use crate::allure::write_allure_results;
use crate::error::ReportError;
use crate::html::render_html_report;
use crate::renderer::ReportRenderer;

/// Handle a report-generation job and return the outcome.
///
/// Failures never panic and never leave a partial outcome: either the
/// artifact exists and the outcome carries its path, or the outcome carries
/// the error and no report record will be created.
#[instrument(skip(job, renderer, reports_dir), fields(execution_id = job.execution.execution_id, job_id = %job.job_id))]
pub async fn handle_report_job(
    job: &ReportJob,
    renderer: &dyn ReportRenderer,
    reports_dir: &Path,
) -> ReportOutcome {
    match generate_artifact(job, renderer, reports_dir).await {
        Ok((report_type, file_path)) => {
            info!(report_type = %report_type, file_path = %file_path.display(), "Report generated");
            ReportOutcome {
                job_id: job.job_id.clone(),
                execution_id: job.execution.execution_id,
                report_type,
                file_path: Some(file_path.to_string_lossy().into_owned()),
                name: job.name.clone(),
                description: job.description.clone(),
                requested_by: job.requested_by,
                error_info: None,
            }
        }
        Err(e) => ReportOutcome::failure(job, ReportErrorInfo::new(e.code(), e.to_string())),
    }
}

/// Produce the report artifact, returning its final type and path.
///
/// The final type may differ from the requested one: an Allure render that
/// cannot run falls back to the self-contained HTML document.
async fn generate_artifact(
    job: &ReportJob,
    renderer: &dyn ReportRenderer,
    reports_dir: &Path,
) -> Result<(ReportType, PathBuf), ReportError> {
    // One directory per job run; never mutated after the job finishes.
    let report_dir = reports_dir.join(format!(
        "report_{}_{}",
        job.execution.execution_id, job.job_id
    ));
    fs::create_dir_all(&report_dir)?;

    match job.report_type {
        ReportType::Allure => {
            let results_dir = report_dir.join("allure-results");
            write_allure_results(job, &results_dir)?;

            let rendered_dir = report_dir.join("allure-report");
            match renderer.render(&results_dir, &rendered_dir).await {
                Ok(()) => Ok((ReportType::Allure, rendered_dir)),
                Err(e) => {
                    // Toolchain failure is recoverable: downgrade to HTML.
                    warn!(error = %e, "Allure rendering failed, falling back to HTML report");
                    let file_path = write_html_report(job, &report_dir)?;
                    Ok((ReportType::Html, file_path))
                }
            }
        }
        ReportType::Html | ReportType::Pdf => {
            let file_path = write_html_report(job, &report_dir)?;
            Ok((job.report_type, file_path))
        }
    }
}

fn write_html_report(job: &ReportJob, report_dir: &Path) -> Result<PathBuf, ReportError> {
    let html = render_html_report(job)?;
    let file_path = report_dir.join("report.html");
    fs::write(&file_path, html)?;
    Ok(file_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use common::ResultStatus;
    use common::report_job::{ExecutionInfo, ResultSnapshot};
    use common::{ExecutionStatus, ReportType};

    use crate::renderer::RendererError;

    /// Renderer that writes an index.html like the real toolchain.
    struct FakeRenderer;

    #[async_trait]
    impl ReportRenderer for FakeRenderer {
        async fn render(&self, _results: &Path, report_dir: &Path) -> Result<(), RendererError> {
            fs::create_dir_all(report_dir).unwrap();
            fs::write(report_dir.join("index.html"), "<html></html>").unwrap();
            Ok(())
        }
    }

    /// Renderer that always reports the toolchain as missing.
    struct BrokenRenderer;

    #[async_trait]
    impl ReportRenderer for BrokenRenderer {
        async fn render(&self, _results: &Path, _report: &Path) -> Result<(), RendererError> {
            Err(RendererError::Unavailable("allure not found".into()))
        }
    }

    fn job(report_type: ReportType) -> ReportJob {
        ReportJob::new(
            report_type,
            "Nightly report".into(),
            "desc".into(),
            1,
            ExecutionInfo {
                execution_id: 9,
                plan_name: "Plan".into(),
                executor_name: "bob".into(),
                status: ExecutionStatus::Completed,
                start_time: None,
                end_time: None,
            },
            vec![ResultSnapshot {
                case_id: 1,
                case_name: "case".into(),
                status: ResultStatus::Passed,
                actual_result: None,
                remarks: None,
                execution_time: None,
                updated_at: Utc::now(),
            }],
        )
    }

    #[tokio::test]
    async fn allure_job_produces_report_directory() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = handle_report_job(&job(ReportType::Allure), &FakeRenderer, dir.path()).await;

        assert!(outcome.error_info.is_none());
        assert_eq!(outcome.report_type, ReportType::Allure);
        let path = PathBuf::from(outcome.file_path.unwrap());
        assert!(path.join("index.html").is_file());
        // Result documents were written for the toolchain to consume.
        assert!(
            path.parent()
                .unwrap()
                .join("allure-results")
                .join("result_0.json")
                .is_file()
        );
    }

    #[tokio::test]
    async fn toolchain_failure_downgrades_to_html() {
        let dir = tempfile::tempdir().unwrap();
        let outcome =
            handle_report_job(&job(ReportType::Allure), &BrokenRenderer, dir.path()).await;

        assert!(outcome.error_info.is_none(), "fallback must not fail the job");
        assert_eq!(outcome.report_type, ReportType::Html);
        let path = PathBuf::from(outcome.file_path.unwrap());
        assert!(path.is_file());
        assert!(path.ends_with("report.html"));
        let html = fs::read_to_string(path).unwrap();
        assert!(html.contains("Plan"));
    }

    #[tokio::test]
    async fn html_job_writes_single_document() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = handle_report_job(&job(ReportType::Html), &BrokenRenderer, dir.path()).await;

        assert!(outcome.error_info.is_none());
        assert_eq!(outcome.report_type, ReportType::Html);
        assert!(PathBuf::from(outcome.file_path.unwrap()).is_file());
    }

    #[tokio::test]
    async fn unwritable_reports_dir_fails_the_job() {
        let outcome = handle_report_job(
            &job(ReportType::Html),
            &BrokenRenderer,
            Path::new("/proc/definitely/not/writable"),
        )
        .await;

        let error = outcome.error_info.expect("job should fail");
        assert_eq!(error.code, "IO_ERROR");
        assert!(outcome.file_path.is_none());
    }
}
