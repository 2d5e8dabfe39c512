//! In-process cron loop for the daily run

use chrono::{DateTime, Utc};
use cron::Schedule;
use fdp_common::{PipelineError, Result};
use std::str::FromStr;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

use crate::pipeline::Pipeline;

/// Parse a cron expression, prepending a `0` seconds field to 5-field input.
///
/// The `cron` crate expects `sec min hour dom mon dow`.
pub fn parse_cron(expr: &str) -> std::result::Result<Schedule, cron::error::Error> {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    if parts.len() == 5 {
        Schedule::from_str(&format!("0 {}", expr))
    } else {
        Schedule::from_str(expr)
    }
}

/// First fire time strictly after `after`
pub fn next_fire(schedule: &Schedule, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(&after).next()
}

/// Run the whole pipeline on every tick until Ctrl+C or SIGTERM
///
/// A failed run is logged and the loop waits for the next tick.
pub async fn run_schedule(pipeline: &Pipeline) -> Result<()> {
    let expr = &pipeline.config().schedule.cron;
    let schedule = parse_cron(expr).map_err(|e| {
        PipelineError::config(format!("schedule.cron '{}' is not a valid cron expression: {}", expr, e))
    })?;

    info!(cron = %expr, "Scheduler started");

    if pipeline.config().schedule.run_on_start {
        run_once(pipeline).await;
    }

    loop {
        let now = Utc::now();
        let Some(next) = next_fire(&schedule, now) else {
            warn!(cron = %expr, "Schedule has no upcoming fire time, stopping");
            return Ok(());
        };

        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        info!(next_run = %next, wait_secs = wait.as_secs(), "Waiting for next scheduled run");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {},
            _ = shutdown_signal() => {
                info!("Scheduler stopped");
                return Ok(());
            },
        }

        run_once(pipeline).await;
    }
}

async fn run_once(pipeline: &Pipeline) {
    match pipeline.run_all().await {
        Ok(reports) => info!(stages = reports.len(), "Scheduled run completed"),
        Err(e) => error!(error = %e, "Scheduled run failed"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
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
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
