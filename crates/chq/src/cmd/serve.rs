//! Serve command - Run the ingestion daemon
//!
//! Startup loads whatever a previous process left in the staging directory,
//! then subscribes to the broker. SIGHUP stops gracefully and starts again
//! with the configuration re-read from disk; SIGINT and SIGTERM stop
//! gracefully and exit.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chq_broker::{AmqpBroker, Broker};
use chq_config::Config;
use chq_flush::Timers;
use chq_ingest::IngestionLoop;
use chq_staging::StagingArea;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::engine::{Engine, open_staging};
use crate::report::MetricsReport;

/// Why a serve cycle ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stop {
    Shutdown,
    Reload,
}

/// Run the serve command
pub async fn run(mut config: Config, config_path: Option<PathBuf>) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(default)".to_string()),
        "chq starting"
    );

    let mut signals = Signals::install()?;
    let mut staging = None;

    loop {
        let area = staging_for_cycle(staging.take(), &config).await?;
        staging = Some(Arc::clone(&area));
        let engine = Engine::with_staging(&config, area)?;
        let broker = AmqpBroker::connect(&config.broker.url)
            .await
            .context("failed to connect to broker")?;
        let broker = Arc::new(broker);

        let stop = run_daemon(&config, engine, broker.clone(), signals.recv()).await;
        broker.close().await;
        if stop? == Stop::Shutdown {
            break;
        }

        match crate::load_config(config_path.as_deref()) {
            Ok(reloaded) => {
                info!("configuration reloaded");
                config = reloaded;
            }
            Err(e) => error!(error = %e, "reload failed, keeping previous configuration"),
        }
    }

    info!("chq shutdown complete");
    Ok(())
}

/// Staging area for the next serve cycle
///
/// A reload keeps the previous area while the directory is unchanged, so
/// loads still running from the previous cycle keep their snapshot claims
/// and appends stay serialized with their rotations.
pub(crate) async fn staging_for_cycle(
    previous: Option<Arc<StagingArea>>,
    config: &Config,
) -> Result<Arc<StagingArea>> {
    if let Some(staging) = previous {
        if staging.dir() == config.staging.path.as_path() {
            if staging.fsync() != config.staging.fsync {
                warn!(
                    fsync = staging.fsync(),
                    "staging fsync change takes effect after a restart"
                );
            }
            staging.reopen();
            return Ok(staging);
        }
        warn!(
            previous = %staging.dir().display(),
            path = %config.staging.path.display(),
            "staging directory changed on reload"
        );
    }
    open_staging(config).await
}

/// One serve cycle, from startup catch-up until `stop` resolves or a fatal error
pub async fn run_daemon(
    config: &Config,
    engine: Engine,
    broker: Arc<dyn Broker>,
    stop: impl Future<Output = Stop>,
) -> Result<Stop> {
    tokio::pin!(stop);

    engine.scheduler.startup().await;

    tokio::select! {
        signal = &mut stop => {
            engine.staging.close();
            return Ok(signal);
        }
        _ = tokio::time::sleep(config.global.startup_pause) => {}
    }

    let ingest = Arc::new(IngestionLoop::new(
        Arc::clone(&broker),
        Arc::clone(&engine.coercer),
        Arc::clone(&engine.scheduler),
        &config.broker,
    ));
    let report = MetricsReport::new(&engine, Arc::clone(ingest.metrics()));

    let timers = Timers::new();
    engine.scheduler.schedule(
        &timers,
        config.flush.sweep_interval,
        config.flush.recovery_interval,
    );
    {
        let report = report.clone();
        timers.repeat(config.global.metrics_interval, move || {
            report.log();
            std::future::ready(())
        });
    }
    let mut unhealthy = spawn_health_check(&timers, broker, config);

    let ingest_cancel = CancellationToken::new();
    let mut ingest_task = tokio::spawn(Arc::clone(&ingest).run(ingest_cancel.clone()));
    let mut ingest_finished = false;

    let outcome: Result<Stop> = tokio::select! {
        joined = &mut ingest_task => {
            ingest_finished = true;
            Err(match joined {
                Ok(Ok(())) => anyhow::anyhow!("ingestion stopped unexpectedly"),
                Ok(Err(e)) => anyhow::Error::new(e).context("ingestion failed"),
                Err(e) => anyhow::Error::new(e).context("ingestion task failed"),
            })
        }
        Some(e) = unhealthy.recv() => Err(e),
        signal = &mut stop => Ok(signal),
    };

    match &outcome {
        Ok(signal) => info!(stop = ?signal, "stopping"),
        Err(e) => error!(error = %format!("{e:#}"), "stopping after fatal error"),
    }

    // one grace period for the whole shutdown
    let deadline = Instant::now() + config.global.shutdown_grace;
    timers.cancel();
    // late appends fail and their deliveries are requeued
    engine.staging.close();
    ingest_cancel.cancel();
    if !ingest_finished {
        match tokio::time::timeout_at(deadline, &mut ingest_task).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => warn!(error = %e, "ingestion ended with error during shutdown"),
            Ok(Err(e)) => warn!(error = %e, "ingestion task panicked during shutdown"),
            Err(_) => warn!("ingestion did not stop within grace period"),
        }
    }

    if tokio::time::timeout_at(deadline, timers.wait()).await.is_err() {
        warn!("timer tasks still running after grace period");
    }
    engine
        .scheduler
        .drain(deadline.saturating_duration_since(Instant::now()))
        .await;
    report.log();

    outcome
}

/// Check the broker periodically; failures arrive on the returned channel
fn spawn_health_check(
    timers: &Timers,
    broker: Arc<dyn Broker>,
    config: &Config,
) -> mpsc::Receiver<anyhow::Error> {
    let (tx, rx) = mpsc::channel(1);
    let queue = config.broker.queue.clone();

    timers.repeat(config.broker.health_check_interval, move || {
        let broker = Arc::clone(&broker);
        let queue = queue.clone();
        let tx = tx.clone();
        async move {
            match broker.health_check(&queue).await {
                Ok(status) => info!(
                    queue = %queue,
                    messages = status.messages,
                    consumers = status.consumers,
                    "broker healthy"
                ),
                Err(e) => {
                    let _ = tx.try_send(anyhow::Error::new(e).context("broker health check failed"));
                }
            }
        }
    });

    rx
}

/// SIGHUP, SIGINT and SIGTERM
struct Signals {
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl Signals {
    fn install() -> Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            Ok(Self {
                hangup: signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?,
                terminate: signal(SignalKind::terminate())
                    .context("failed to install SIGTERM handler")?,
            })
        }
        #[cfg(not(unix))]
        Ok(Self {})
    }

    async fn recv(&mut self) -> Stop {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = self.hangup.recv() => {
                    info!("SIGHUP received, reloading");
                    Stop::Reload
                }
                _ = self.terminate.recv() => {
                    info!("SIGTERM received");
                    Stop::Shutdown
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("SIGINT received");
                    Stop::Shutdown
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            Stop::Shutdown
        }
    }
}

#[cfg(test)]
#[path = "serve_test.rs"]
mod serve_test;
