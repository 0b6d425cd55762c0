//! CloudFront Logs Shipper - daemon entry point

use anyhow::{bail, Context, Result};
use cfls_common::logging::{init_logging, LogConfig};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use cfls_shipper::{
    config::ShipperConfig,
    metrics,
    pipeline::{spawn_workers, Pipeline},
    sink::LokiSink,
    storage::S3Store,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ShipperConfig::load()?;

    // Level and format come from the flags; LOG_OUTPUT, LOG_DIR, LOG_FILE_PREFIX
    // and LOG_FILTER have no flag and are read from the environment.
    let log_config = LogConfig::builder()
        .level(config.log_level.parse()?)
        .format(config.format)
        .log_file_prefix("cfls-shipper")
        .filter_directives("aws_config=warn,aws_smithy_runtime=warn,hyper=info")
        .build()
        .merge_output_env()?;

    let _guard = init_logging(&log_config)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting CloudFront logs shipper");
    info!(
        bucket = %config.storage.bucket,
        loki = %config.loki.url,
        cluster = %config.pipeline.cluster,
        workers = config.pipeline.workers,
        interval = ?config.wait_interval,
        "Configuration loaded"
    );

    let store = S3Store::new(config.storage.clone()).await;
    let sink = LokiSink::new(config.loki.clone()).context("Failed to build Loki client")?;
    let pipeline = Arc::new(Pipeline::new(
        config.pipeline.clone(),
        Arc::new(store),
        Arc::new(sink),
    ));

    let mut workers = spawn_workers(&pipeline);
    info!(workers = workers.len(), "Workers started");

    let poller = tokio::spawn({
        let pipeline = pipeline.clone();
        let interval = config.wait_interval;
        async move { pipeline.poll(interval).await }
    });

    let mut server = tokio::spawn({
        let pipeline = pipeline.clone();
        metrics::serve(pipeline.queue().clone(), config.port, async move {
            shutdown_signal().await;
            pipeline.stop();
        })
    });

    let mut failed = 0usize;
    let mut server_done = false;
    let mut server_failed = false;

    loop {
        tokio::select! {
            joined = workers.join_next() => {
                let Some(joined) = joined else { break };
                match joined {
                    Ok(Ok(())) => {},
                    Ok(Err(err)) => {
                        failed += 1;
                        error!(error = %err, remaining = workers.len(), "Worker exited with error");
                    },
                    Err(err) => {
                        failed += 1;
                        error!(error = %err, remaining = workers.len(), "Worker task aborted");
                    },
                }
            },
            served = &mut server, if !server_done => {
                server_done = true;
                match served {
                    Ok(Ok(())) => info!("Metrics endpoint stopped"),
                    Ok(Err(err)) => {
                        server_failed = true;
                        error!(error = %err, "Metrics endpoint failed");
                        pipeline.stop();
                    },
                    Err(err) => {
                        server_failed = true;
                        error!(error = %err, "Metrics endpoint task aborted");
                        pipeline.stop();
                    },
                }
            },
        }
    }

    // Every worker is gone: nothing left to feed
    pipeline.stop();
    poller.abort();
    if !server_done {
        server.abort();
    }

    if failed > 0 {
        bail!("{} of {} workers failed", failed, config.pipeline.workers);
    }
    if server_failed {
        bail!("Metrics endpoint failed");
    }

    info!("Shipper shut down gracefully");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}
