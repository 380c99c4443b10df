use std::fs;
use std::path::Path;

use chrono::Utc;
use common::report_job::{ReportJob, ResultSnapshot};
use serde::Serialize;

use crate::error::ReportError;

/// One Allure result document, consumed by `allure generate`.
#[derive(Serialize)]
pub struct AllureResult {
    pub name: String,
    pub status: String,
    #[serde(rename = "statusDetails")]
    pub status_details: AllureStatusDetails,
    pub stage: String,
    pub steps: Vec<serde_json::Value>,
    pub attachments: Vec<serde_json::Value>,
    pub parameters: Vec<serde_json::Value>,
    /// Epoch milliseconds.
    pub start: i64,
    pub stop: i64,
    pub labels: Vec<AllureLabel>,
}

#[derive(Serialize)]
pub struct AllureStatusDetails {
    pub message: String,
    pub trace: String,
}

#[derive(Serialize)]
pub struct AllureLabel {
    pub name: String,
    pub value: String,
}

/// Suite summary document accompanying the result set.
#[derive(Serialize)]
pub struct AllureSuite {
    pub name: String,
    pub children: Vec<serde_json::Value>,
    pub befores: Vec<serde_json::Value>,
    pub afters: Vec<serde_json::Value>,
}

/// Build one Allure result document for a test result snapshot.
pub fn build_result_document(result: &ResultSnapshot, suite_name: &str) -> AllureResult {
    // Start falls back to now for results that never left pending.
    let start = result
        .execution_time
        .unwrap_or_else(Utc::now)
        .timestamp_millis();
    let stop = result.updated_at.timestamp_millis();

    AllureResult {
        name: result.case_name.clone(),
        status: result.status.as_str().to_string(),
        status_details: AllureStatusDetails {
            message: result.actual_result.clone().unwrap_or_default(),
            trace: result.remarks.clone().unwrap_or_default(),
        },
        stage: "finished".into(),
        steps: vec![],
        attachments: vec![],
        parameters: vec![],
        start,
        stop,
        labels: vec![
            AllureLabel {
                name: "suite".into(),
                value: suite_name.to_string(),
            },
            AllureLabel {
                name: "testcase".into(),
                value: result.case_name.clone(),
            },
        ],
    }
}

/// Write the Allure result documents plus the suite summary into `results_dir`.
pub fn write_allure_results(job: &ReportJob, results_dir: &Path) -> Result<(), ReportError> {
    fs::create_dir_all(results_dir)?;

    for (i, result) in job.results.iter().enumerate() {
        let doc = build_result_document(result, &job.execution.plan_name);
        let path = results_dir.join(format!("result_{i}.json"));
        fs::write(&path, serde_json::to_vec_pretty(&doc)?)?;
    }

    let suite = AllureSuite {
        name: job.execution.plan_name.clone(),
        children: vec![],
        befores: vec![],
        afters: vec![],
    };
    fs::write(
        results_dir.join("suite.json"),
        serde_json::to_vec_pretty(&suite)?,
    )?;

    Ok(())
}
