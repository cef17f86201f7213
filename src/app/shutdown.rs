use super::{ComponentState, SignspellOrchestrator};
use crate::error::{Result, SignspellError};
use crate::overlay::OverlayRenderer;
use crate::pipeline::OverlayFrame;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

impl SignspellOrchestrator {
    /// Stop every component in reverse start order and report the outcome
    pub async fn shutdown(&mut self) -> Result<i32> {
        info!("Beginning graceful shutdown");

        self.cancellation_token.cancel();
        let mut exit_code = 0;

        if self.keyboard_enabled {
            if let Some(keyboard_handler) = &self.keyboard_handler {
                if let Err(e) = self
                    .stop_component("keyboard", Duration::from_secs(2), keyboard_handler.stop())
                    .await
                {
                    error!("Error stopping keyboard: {}", e);
                    exit_code = 1;
                }
            }
        }

        let overlay_frame = self.stop_pipeline(&mut exit_code).await;

        if let Some(speller) = &self.speller {
            match self
                .stop_component("speller", Duration::from_secs(5), speller.stop())
                .await
            {
                Ok(text) => self.final_text = Some(text),
                Err(e) => {
                    error!("Error stopping speller: {}", e);
                    exit_code = 1;
                }
            }
        }

        if let Some(monitor_task) = self.monitor_task.take() {
            if timeout(Duration::from_secs(1), monitor_task).await.is_err() {
                warn!("Monitor did not stop in time");
            }
        }

        if let Some(path) = &self.config.overlay.snapshot_path {
            match overlay_frame {
                Some(image) => {
                    if let Err(e) = OverlayRenderer::save_snapshot(&image, path) {
                        error!("{}", e);
                        exit_code = 1;
                    }
                }
                None => warn!("No overlay frame rendered, snapshot {} not written", path),
            }
        }

        self.log_summary();

        let failed = self.failed_components().await;
        if !failed.is_empty() {
            warn!("Components failed during shutdown: {}", failed.join(", "));
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }

    /// Stop the frame loop, keeping the last overlay frame it rendered
    async fn stop_pipeline(&mut self, exit_code: &mut i32) -> OverlayFrame {
        let Some(mut pipeline) = self.pipeline.take() else {
            // Never started
            self.detection_loop = None;
            self.set_component_state("pipeline", ComponentState::Stopped)
                .await;
            return None;
        };

        let overlay_frame = pipeline.overlay().borrow().clone();

        match self
            .stop_component("pipeline", Duration::from_secs(5), pipeline.stop())
            .await
        {
            Ok(stats) => self.loop_stats = Some(stats),
            Err(e) => {
                error!("Error stopping pipeline: {}", e);
                *exit_code = 1;
            }
        }

        overlay_frame
    }

    /// Run a component's stop future under a time limit, tracking its state
    async fn stop_component<T>(
        &self,
        component: &str,
        limit: Duration,
        stop: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        info!("Stopping {} component", component);
        self.set_component_state(component, ComponentState::Stopping)
            .await;

        match timeout(limit, stop).await {
            Ok(Ok(value)) => {
                self.set_component_state(component, ComponentState::Stopped)
                    .await;
                info!("{} component stopped", component);
                Ok(value)
            }
            Ok(Err(e)) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(e)
            }
            Err(_) => {
                self.set_component_state(component, ComponentState::Failed)
                    .await;
                Err(SignspellError::component(component, "stop timed out"))
            }
        }
    }

    fn log_summary(&self) {
        info!("Final spelling: \"{}\"", self.text());

        if let Some(stats) = &self.loop_stats {
            info!(
                "Frame loop: {} ticks, {} detections ({} errors), {} frames skipped",
                stats.ticks, stats.detections, stats.detection_errors, stats.frames_skipped
            );
            info!(
                "Classifier: {} sent, {} succeeded, {} failed, {} discarded, {} labels",
                stats.dispatch.sent,
                stats.dispatch.succeeded,
                stats.dispatch.failed,
                stats.dispatch.discarded,
                stats.labels_published
            );
        }

        self.metrics.lock().log_summary();
    }
}
