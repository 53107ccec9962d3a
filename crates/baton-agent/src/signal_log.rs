use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use baton_core::event::SignalBus;
use baton_core::signal::{Signal, SignalType};

/// JSONL signal logger.
///
/// Writes every signal belonging to one execution to
/// `{log_dir}/{execution_id}.jsonl`, one JSON object per line, flushed as it
/// goes. Stops on cancellation or after the execution's terminal signal.
pub struct SignalLogger {
    log_dir: PathBuf,
}

#[derive(Serialize)]
struct LogEntry<'a> {
    execution_id: &'a str,
    #[serde(flatten)]
    signal: &'a Signal,
}

impl SignalLogger {
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir }
    }

    /// Path of the log for `execution_id`.
    pub fn log_path(&self, execution_id: &str) -> PathBuf {
        self.log_dir.join(format!("{}.jsonl", execution_id))
    }

    pub async fn run(self, bus: Arc<SignalBus>, execution_id: String, cancel: CancellationToken) {
        let rx = bus.subscribe();
        self.run_with(rx, execution_id, cancel).await
    }

    /// Run against a receiver subscribed by the caller, so no signal emitted
    /// before the task is first polled is missed.
    pub async fn run_with(
        self,
        mut rx: broadcast::Receiver<Signal>,
        execution_id: String,
        cancel: CancellationToken,
    ) {
        if let Err(e) = tokio::fs::create_dir_all(&self.log_dir).await {
            error!(error = %e, "Failed to create signal log directory");
            return;
        }

        let log_path = self.log_path(&execution_id);
        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open signal log");
                return;
            }
        };

        info!(path = %log_path.display(), "SignalLogger started");
        let mut writer = tokio::io::BufWriter::new(file);

        loop {
            tokio::select! {
                biased;
                result = rx.recv() => {
                    match result {
                        Ok(signal) => {
                            if !belongs_to(&signal, &execution_id) {
                                continue;
                            }
                            if signal.is_expired() {
                                debug!(signal_id = %signal.id, signal_type = %signal.signal_type, "Dropping expired signal");
                            } else {
                                let entry = LogEntry { execution_id: &execution_id, signal: &signal };
                                if let Ok(json) = serde_json::to_string(&entry) {
                                    let line = format!("{}\n", json);
                                    if let Err(e) = writer.write_all(line.as_bytes()).await {
                                        error!(error = %e, "Failed to write signal");
                                        break;
                                    }
                                    if let Err(e) = writer.flush().await {
                                        error!(error = %e, "Failed to flush signal log");
                                    }
                                }
                            }
                            if is_terminal(&signal, &execution_id) {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(n)) => {
                            debug!(skipped = n, "SignalLogger lagged, skipped signals");
                        }
                        Err(RecvError::Closed) => {
                            debug!("SignalBus closed, SignalLogger stopping");
                            break;
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("SignalLogger cancelled");
                    break;
                }
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "SignalLogger finished");
    }
}

/// Terminal signals target the execution id; transitions carry it in `data`.
fn belongs_to(signal: &Signal, execution_id: &str) -> bool {
    signal.target == execution_id
        || signal
            .data
            .get("execution_id")
            .and_then(|v| v.as_str())
            .is_some_and(|id| id == execution_id)
}

fn is_terminal(signal: &Signal, execution_id: &str) -> bool {
    match signal.signal_type {
        SignalType::Success | SignalType::Failure => signal.target == execution_id,
        SignalType::Blocked => true,
        _ => false,
    }
}
