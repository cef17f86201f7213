use super::SignspellOrchestrator;
use crate::error::EventBusError;
use crate::events::{EventMetrics, SignEvent, Subscription};
use crate::status::PipelineStatus;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

impl SignspellOrchestrator {
    /// Follow the bus and the pipeline status, logging what a user would see on screen
    pub(super) fn spawn_monitor(
        &self,
        status_rx: watch::Receiver<PipelineStatus>,
    ) -> JoinHandle<()> {
        let subscription = self.event_bus.subscribe("monitor");
        tokio::spawn(run_monitor(
            subscription,
            status_rx,
            Arc::clone(&self.metrics),
            self.cancellation_token.clone(),
        ))
    }
}

async fn run_monitor(
    mut subscription: Subscription,
    mut status_rx: watch::Receiver<PipelineStatus>,
    metrics: Arc<parking_lot::Mutex<EventMetrics>>,
    cancellation_token: CancellationToken,
) {
    let mut status_line = status_rx.borrow_and_update().to_string();
    let mut last_label: Option<String> = None;
    let mut status_open = true;

    loop {
        tokio::select! {
            _ = cancellation_token.cancelled() => break,

            changed = status_rx.changed(), if status_open => {
                if changed.is_err() {
                    debug!("Pipeline status channel closed");
                    status_open = false;
                    continue;
                }

                let status = status_rx.borrow_and_update().clone();
                let line = status.to_string();
                if line != status_line {
                    info!("{}", line);
                    status_line = line;
                }
                if status.last_label != last_label {
                    debug!(
                        "Current alphabet: {} (hand {})",
                        status.last_label.as_deref().unwrap_or(crate::stability::NONE_SENTINEL),
                        status.hand_confidence()
                    );
                    last_label = status.last_label;
                }
            }

            received = subscription.recv() => match received {
                Ok(event) => record(&metrics, &event),
                Err(EventBusError::Lagged { skipped }) => {
                    warn!("Monitor skipped {} events", skipped);
                }
                Err(e) => {
                    debug!("Monitor subscription ended: {}", e);
                    break;
                }
            },
        }
    }

    // Count what was already published before the stop request
    while let Ok(Some(event)) = subscription.try_recv() {
        record(&metrics, &event);
    }
}

fn record(metrics: &parking_lot::Mutex<EventMetrics>, event: &SignEvent) {
    let mut metrics = metrics.lock();
    metrics.record_event(event);

    match event {
        SignEvent::SpellingChanged { text } => {
            info!("Spelling edited: \"{}\"", text);
        }
        SignEvent::SystemError { .. } => metrics.record_error(),
        _ => {}
    }
}
