use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use server::config::AppConfig;
use server::consumers::report_outcome::consume_report_outcomes;
use server::database::init_db;
use server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = AppConfig::load().context("Failed to load config")?;

    let db = init_db(&config.database.url)
        .await
        .context("Failed to initialize database")?;
    info!("Database connected");

    let mq = if config.mq.enabled {
        let queue = mq::init_mq(mq::MqConfig {
            url: config.mq.url.clone(),
            pool_size: config.mq.pool_size,
        })
        .await
        .context("Failed to initialize MQ")?;
        info!(
            queue_name = %config.mq.queue_name,
            result_queue_name = %config.mq.result_queue_name,
            "MQ connected"
        );
        Some(Arc::new(queue))
    } else {
        warn!("MQ disabled; report generation will be unavailable");
        None
    };

    if let Some(ref mq) = mq {
        tokio::spawn(consume_report_outcomes(
            db.clone(),
            Arc::clone(mq),
            config.mq.result_queue_name.clone(),
        ));
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;

    let state = AppState {
        db,
        config,
        mq,
    };

    let app = server::build_router(state);

    info!("Server running at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
