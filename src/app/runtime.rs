use super::{ShutdownReason, SignspellOrchestrator};
use crate::error::{EventBusError, Result, SignspellError};
use crate::events::{EventFilter, SignEvent};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info, warn};

type SharedShutdownSender = Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>;

impl SignspellOrchestrator {
    /// Wait for a shutdown trigger, then shut down and return the exit code
    pub async fn run(&mut self) -> Result<i32> {
        info!("signspell is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| SignspellError::system("Shutdown sender already taken"))?;

        let shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| SignspellError::system("Shutdown receiver already taken"))?;

        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));
        self.setup_signal_handlers(Arc::clone(&shutdown_sender));
        self.forward_shutdown_requests(shutdown_sender);

        let shutdown_reason = shutdown_receiver
            .await
            .map_err(|_| SignspellError::system("Shutdown channel closed unexpectedly"))?;

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;

        info!("signspell shutdown complete");
        Ok(exit_code)
    }

    fn setup_signal_handlers(&self, shutdown_sender: SharedShutdownSender) {
        // SIGTERM - Unix only
        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            warn!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };

                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    send_reason(
                        &shutdown_sender_sigterm,
                        ShutdownReason::Signal("SIGTERM".to_string()),
                    )
                    .await;
                }
            });
        }

        // SIGINT (Ctrl+C)
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                send_reason(
                    &shutdown_sender,
                    ShutdownReason::Signal("SIGINT".to_string()),
                )
                .await;
            }
        });
    }

    /// Turn a `ShutdownRequested` bus event into a shutdown trigger
    fn forward_shutdown_requests(&self, shutdown_sender: SharedShutdownSender) {
        let mut subscription = self.event_bus.subscribe_filtered(
            "shutdown",
            EventFilter::EventTypes(vec!["shutdown_requested"]),
        );
        let cancellation_token = self.cancellation_token.clone();

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = cancellation_token.cancelled() => break,
                    received = subscription.recv() => received,
                };

                match received {
                    Ok(SignEvent::ShutdownRequested { reason, .. }) => {
                        send_reason(&shutdown_sender, ShutdownReason::UserRequest(reason)).await;
                        break;
                    }
                    Ok(_) | Err(EventBusError::Lagged { .. }) => continue,
                    Err(e) => {
                        debug!("Shutdown request listener ended: {}", e);
                        break;
                    }
                }
            }
        });
    }
}

async fn send_reason(shutdown_sender: &SharedShutdownSender, reason: ShutdownReason) {
    if let Some(sender) = shutdown_sender.lock().await.take() {
        let _ = sender.send(reason);
    }
}
