use std::sync::Arc;

use chrono::Utc;
use common::report_outcome::ReportOutcome;
use mq::{BroccoliError, BrokerMessage, Mq};
use sea_orm::sea_query::LockType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
};
use tracing::{error, info, warn};

use crate::entity::{report, test_execution};

/// Consume report outcomes from the result queue.
pub async fn consume_report_outcomes(db: DatabaseConnection, mq: Arc<Mq>, queue_name: String) {
    info!(queue = %queue_name, "Starting report outcome consumer");

    let result = mq
        .process_messages(
            &queue_name,
            None, // single-threaded for sequential DB writes
            None,
            move |message: BrokerMessage<ReportOutcome>| {
                let db = db.clone();
                async move {
                    let outcome = message.payload;
                    let job_id = outcome.job_id.clone();
                    let execution_id = outcome.execution_id;

                    if let Err(e) = process_report_outcome(&db, outcome).await {
                        error!(
                            execution_id,
                            job_id = %job_id,
                            error = %e,
                            "Failed to process report outcome"
                        );
                        return Err(BroccoliError::Job(e.to_string()));
                    }
                    Ok(())
                }
            },
        )
        .await;

    if let Err(e) = result {
        error!(error = %e, "Report outcome consumer stopped unexpectedly");
    }
}

/// Process a single report outcome.
///
/// Failed jobs are terminal: they are logged and produce no report row.
/// Successful outcomes insert exactly one row per job, even when the queue
/// delivers the message more than once.
async fn process_report_outcome(
    db: &DatabaseConnection,
    outcome: ReportOutcome,
) -> anyhow::Result<()> {
    if let Some(ref info) = outcome.error_info {
        error!(
            execution_id = outcome.execution_id,
            job_id = %outcome.job_id,
            code = %info.code,
            message = %info.message,
            "Report generation job failed; no report record created"
        );
        return Ok(());
    }

    let file_path = outcome
        .file_path
        .clone()
        .ok_or_else(|| anyhow::anyhow!("Successful outcome without file_path"))?;

    let txn = db.begin().await?;

    let execution = test_execution::Entity::find_by_id(outcome.execution_id)
        .lock(LockType::Update)
        .one(&txn)
        .await?;
    if execution.is_none() {
        warn!(
            execution_id = outcome.execution_id,
            job_id = %outcome.job_id,
            "Execution deleted before report outcome arrived, dropping"
        );
        txn.commit().await?;
        return Ok(());
    }

    let existing = report::Entity::find()
        .filter(report::Column::JobId.eq(&outcome.job_id))
        .one(&txn)
        .await?;
    if existing.is_some() {
        info!(job_id = %outcome.job_id, "Report already recorded, skipping");
        txn.commit().await?;
        return Ok(());
    }

    let now = Utc::now();
    let new_report = report::ActiveModel {
        name: Set(outcome.name.clone()),
        description: Set(if outcome.description.is_empty() {
            None
        } else {
            Some(outcome.description.clone())
        }),
        execution_id: Set(outcome.execution_id),
        report_type: Set(outcome.report_type),
        file_path: Set(file_path),
        is_public: Set(true),
        job_id: Set(outcome.job_id.clone()),
        creator_id: Set(outcome.requested_by),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    let model = new_report.insert(&txn).await?;

    txn.commit().await?;

    info!(
        report_id = model.id,
        execution_id = outcome.execution_id,
        report_type = %outcome.report_type,
        "Report record created"
    );

    Ok(())
}
