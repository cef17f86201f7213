use super::{ComponentState, SignspellOrchestrator};
use crate::error::{Result, SignspellError};
use tracing::{error, info};

impl SignspellOrchestrator {
    /// Register every component as stopped
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing signspell components");

        let mut states = self.component_states.lock().await;
        states.insert("speller".to_string(), ComponentState::Stopped);
        states.insert("pipeline".to_string(), ComponentState::Stopped);

        // Only register keyboard component if enabled
        if self.keyboard_enabled {
            states.insert("keyboard".to_string(), ComponentState::Stopped);
        }
        drop(states);

        info!(
            "Components initialized (fps {}, dispatch cooldown {} ms, threshold {})",
            self.config.camera.fps, self.config.classifier.cooldown_ms, self.config.stability.threshold
        );
        Ok(())
    }

    /// Start consumers first, then the frame loop that feeds them
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting signspell");

        if let Some(speller) = &self.speller {
            self.set_component_state("speller", ComponentState::Starting)
                .await;

            speller.start().await.map_err(|e| {
                error!("Failed to start speller: {}", e);
                e
            })?;

            self.set_component_state("speller", ComponentState::Running)
                .await;
        }

        let detection_loop = self.detection_loop.take().ok_or_else(|| {
            SignspellError::component("pipeline", "Detection loop already started")
        })?;
        self.set_component_state("pipeline", ComponentState::Starting)
            .await;

        // The monitor must see readiness changes from the first tick
        self.monitor_task = Some(self.spawn_monitor(detection_loop.status()));
        self.pipeline = Some(detection_loop.spawn());

        self.set_component_state("pipeline", ComponentState::Running)
            .await;
        info!("Detection loop started");

        if self.keyboard_enabled {
            if let Some(keyboard_handler) = &self.keyboard_handler {
                self.set_component_state("keyboard", ComponentState::Starting)
                    .await;

                keyboard_handler.start().await.map_err(|e| {
                    error!("Failed to start keyboard handler: {}", e);
                    e
                })?;

                self.set_component_state("keyboard", ComponentState::Running)
                    .await;
                info!("Keyboard actions enabled: c = clear, u = undo, q = quit");
            }
        }

        info!("signspell started");
        Ok(())
    }
}
