mod config;
mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alert_dispatch::notification::{AnalysisResult, ErrorEvent, NotificationDispatcher};
use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::logging::{LogFormat, init_logging};

/// Fan error reports out to chat, team chat, email and SMS.
///
/// Reads one JSON object per line from stdin, `{"error": {...}, "analysis": {...}}`,
/// and prints one delivery report per line on stdout.
#[derive(Debug, Parser)]
#[command(name = "alert-relay", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, env = "ALERT_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Seconds to keep retrying after input ends
    #[arg(long, default_value_t = 300)]
    drain_timeout: u64,
}

/// One input line.
#[derive(Debug, Deserialize)]
struct IncomingAlert {
    error: ErrorEvent,
    #[serde(default)]
    analysis: AnalysisResult,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load(args.config.as_deref())?;
    init_logging(args.log_format, config.log_filter.as_deref())?;

    let dispatcher = Arc::new(NotificationDispatcher::with_config(config.dispatcher));
    let worker = dispatcher.spawn_retry_worker();

    let interrupted = relay_stdin(&dispatcher).await?;
    if !interrupted {
        let outcome = drain(&dispatcher, Duration::from_secs(args.drain_timeout)).await;
        debug!("Drain finished: {:?}", outcome);
    }

    dispatcher.stop();
    worker.await?;

    let stats = dispatcher.stats();
    info!(
        "Processed {} alerts: {} retries pending, {} dead letters",
        stats.total, stats.pending_retries, stats.dead_letters
    );
    Ok(())
}

/// Dispatch every stdin line until EOF. Returns `true` on Ctrl-C.
async fn relay_stdin(dispatcher: &NotificationDispatcher) -> Result<bool> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping");
                return Ok(true);
            }
        };
        let Some(line) = line else {
            return Ok(false);
        };
        if line.trim().is_empty() {
            continue;
        }

        let output = match serde_json::from_str::<IncomingAlert>(&line) {
            Ok(alert) => match dispatcher.dispatch(alert.error, alert.analysis).await {
                Ok(report) => serde_json::to_string(&report)?,
                Err(e) => error_line(&e.to_string()),
            },
            Err(e) => {
                warn!("Skipping malformed input line: {}", e);
                error_line(&format!("invalid input: {e}"))
            }
        };

        stdout.write_all(output.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
}

fn error_line(message: &str) -> String {
    serde_json::json!({ "status": "error", "message": message }).to_string()
}

/// How [`drain`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrainOutcome {
    Settled,
    TimedOut,
    Interrupted,
}

/// Let the retry worker settle outstanding retries, until `timeout` passes
/// or Ctrl-C. The worker stays the only sweeper; this only watches.
async fn drain(dispatcher: &NotificationDispatcher, timeout: Duration) -> DrainOutcome {
    let pending = dispatcher.pending_retry_count();
    if pending == 0 {
        return DrainOutcome::Settled;
    }
    info!("Input finished, draining {} pending retries", pending);

    let mut events = dispatcher.subscribe();
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    while dispatcher.pending_retry_count() > 0 {
        tokio::select! {
            _ = &mut deadline => {
                warn!(
                    "Drain timeout reached, abandoning {} pending retries",
                    dispatcher.pending_retry_count()
                );
                return DrainOutcome::TimedOut;
            }
            _ = &mut interrupt => {
                info!("Interrupted, abandoning pending retries");
                return DrainOutcome::Interrupted;
            }
            event = events.recv() => match event {
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            }
        }
    }

    info!("All retries settled");
    DrainOutcome::Settled
}
