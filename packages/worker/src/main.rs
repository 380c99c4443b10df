use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use common::report_job::ReportJob;
use common::worker::Task;
use mq::{BroccoliError, BrokerMessage, MqConfig, init_mq};
use tracing::{error, info, warn};

use worker::config::WorkerAppConfig;
use worker::handlers::report::handle_report_job;
use worker::renderer::{AllureCli, ReportRenderer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = WorkerAppConfig::load().context("Failed to load config")?;
    info!("Worker starting: {}", config.worker.id);

    let reports_dir = PathBuf::from(&config.report.dir);
    std::fs::create_dir_all(&reports_dir).context("Failed to create reports directory")?;

    let mq = Arc::new(
        init_mq(MqConfig {
            url: config.mq.url.clone(),
            pool_size: config.mq.pool_size,
        })
        .await
        .context("Failed to initialize MQ")?,
    );

    info!(
        queue_name = %config.mq.queue_name,
        result_queue_name = %config.mq.result_queue_name,
        reports_dir = %reports_dir.display(),
        "MQ connected"
    );

    let renderer: Arc<dyn ReportRenderer> = Arc::new(AllureCli::new(&config.report.allure_bin));
    let result_queue = config.mq.result_queue_name.clone();
    let mq_for_handler = Arc::clone(&mq);

    let result = mq
        .process_messages(
            &config.mq.queue_name,
            Some(config.worker.batch_size), // concurrent jobs
            None,
            move |message: BrokerMessage<Task>| {
                let mq = Arc::clone(&mq_for_handler);
                let renderer = Arc::clone(&renderer);
                let result_queue = result_queue.clone();
                let reports_dir = reports_dir.clone();
                async move {
                    process_message(message, &mq, &*renderer, &result_queue, &reports_dir).await
                }
            },
        )
        .await;

    if let Err(e) = result {
        error!(error = %e, "Worker stopped unexpectedly");
    }

    Ok(())
}

async fn process_message(
    message: BrokerMessage<Task>,
    mq: &Arc<mq::Mq>,
    renderer: &dyn ReportRenderer,
    result_queue: &str,
    reports_dir: &std::path::Path,
) -> Result<(), BroccoliError> {
    let task = message.payload;
    let job_id = task.id.clone();

    if task.task_type != "report" {
        warn!(task_type = %task.task_type, "Unknown task type, skipping");
        return Ok(());
    }

    let job: ReportJob = match serde_json::from_value(task.payload) {
        Ok(j) => j,
        Err(e) => {
            // Malformed payloads are terminal; there is no job to report an
            // outcome for.
            error!(job_id = %job_id, error = %e, "Failed to parse ReportJob, dropping");
            return Ok(());
        }
    };

    info!(
        execution_id = job.execution.execution_id,
        job_id = %job.job_id,
        report_type = %job.report_type,
        results = job.results.len(),
        "Processing report job"
    );

    let outcome = handle_report_job(&job, renderer, reports_dir).await;

    mq.publish(result_queue, None, &outcome, None)
        .await
        .map_err(|e| BroccoliError::Publish(format!("Failed to publish ReportOutcome: {e}")))?;

    info!(
        execution_id = outcome.execution_id,
        report_type = %outcome.report_type,
        failed = outcome.error_info.is_some(),
        "Published outcome to queue"
    );

    Ok(())
}
