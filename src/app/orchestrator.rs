use super::types::{ComponentState, ShutdownReason};
use crate::camera::{FrameSource, FrameSourceBuilder};
use crate::classifier::{HttpClassifier, LabelClassifier};
use crate::config::SignspellConfig;
use crate::detector::{LandmarkDetector, ReplayDetector};
use crate::error::Result;
use crate::events::{EventBus, EventMetrics};
use crate::keyboard_input::KeyboardInputHandler;
use crate::pipeline::{DetectionLoop, LoopStats, PipelineHandle};
use crate::speller::SpellerIntegration;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Owns the event bus and every running component of the speller
pub struct SignspellOrchestrator {
    pub(super) config: SignspellConfig,
    pub(super) event_bus: Arc<EventBus>,

    // Components
    pub(super) detection_loop: Option<DetectionLoop>,
    pub(super) pipeline: Option<PipelineHandle>,
    pub(super) speller: Option<SpellerIntegration>,
    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) keyboard_enabled: bool,
    pub(super) monitor_task: Option<JoinHandle<()>>,

    // Results gathered at shutdown
    pub(super) metrics: Arc<parking_lot::Mutex<EventMetrics>>,
    pub(super) final_text: Option<String>,
    pub(super) loop_stats: Option<LoopStats>,

    // Lifecycle management
    pub(super) component_states: Arc<Mutex<HashMap<String, ComponentState>>>,
    pub(super) shutdown_sender: Option<oneshot::Sender<ShutdownReason>>,
    pub(super) shutdown_receiver: Option<oneshot::Receiver<ShutdownReason>>,
    pub(super) cancellation_token: CancellationToken,
}

impl SignspellOrchestrator {
    /// Build the production stack: synthetic frames, replayed poses, HTTP classifier
    pub async fn new(config: SignspellConfig) -> Result<Self> {
        let frame_source = FrameSourceBuilder::new()
            .config(config.camera.clone())
            .build()?;
        let detector = Box::new(ReplayDetector::new(&config.detector));
        let classifier = Arc::new(HttpClassifier::from_config(&config.classifier)?);

        info!(
            "Classifier endpoint {} (timeout {} ms)",
            classifier.endpoint(),
            config.classifier.timeout_ms
        );

        Ok(Self::with_components(
            config,
            frame_source,
            detector,
            classifier,
        ))
    }

    /// Build around caller-supplied capabilities
    pub fn with_components(
        config: SignspellConfig,
        frame_source: Box<dyn FrameSource>,
        detector: Box<dyn LandmarkDetector>,
        classifier: Arc<dyn LabelClassifier>,
    ) -> Self {
        let event_bus = Arc::new(if config.system.event_debug_logging {
            EventBus::with_debug_logging(config.system.event_bus_capacity)
        } else {
            EventBus::new(config.system.event_bus_capacity)
        });
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        let detection_loop = DetectionLoop::new(
            &config,
            frame_source,
            detector,
            classifier,
            Arc::clone(&event_bus),
        );
        let speller = SpellerIntegration::new(config.stability.clone(), Arc::clone(&event_bus));
        let keyboard_handler = KeyboardInputHandler::new(Arc::clone(&event_bus));

        Self {
            config,
            event_bus,
            detection_loop: Some(detection_loop),
            pipeline: None,
            speller: Some(speller),
            keyboard_handler: Some(keyboard_handler),
            keyboard_enabled: false,
            monitor_task: None,
            metrics: Arc::new(parking_lot::Mutex::new(EventMetrics::default())),
            final_text: None,
            loop_stats: None,
            component_states: Arc::new(Mutex::new(HashMap::new())),
            shutdown_sender: Some(shutdown_sender),
            shutdown_receiver: Some(shutdown_receiver),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Enable or disable terminal key actions
    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_enabled = enabled;
    }

    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    /// Spelled text so far; the final text once shut down
    pub fn text(&self) -> String {
        match (&self.final_text, &self.speller) {
            (Some(text), _) => text.clone(),
            (None, Some(speller)) => speller.text(),
            (None, None) => String::new(),
        }
    }

    /// Counts of events seen on the bus while running
    pub fn metrics(&self) -> EventMetrics {
        self.metrics.lock().clone()
    }

    /// Frame loop counters, available after shutdown
    pub fn loop_stats(&self) -> Option<&LoopStats> {
        self.loop_stats.as_ref()
    }
}
