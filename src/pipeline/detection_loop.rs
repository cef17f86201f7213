use crate::camera::FrameSource;
use crate::classifier::LabelClassifier;
use crate::config::SignspellConfig;
use crate::detector::LandmarkDetector;
use crate::dispatcher::{
    ClassificationDispatcher, ClassificationOutcome, DispatchDecision, DispatchStats,
};
use crate::error::{DetectorError, EventBusError, Result, SignspellError};
use crate::events::{EventBus, EventFilter, SignEvent, SpellingCommand, Subscription};
use crate::landmark::{DetectionFrame, Pose};
use crate::overlay::OverlayRenderer;
use crate::status::{ClassifierHealth, PipelineStatus, ReadinessStatus};
use image::RgbaImage;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, watch};
use tokio::task::{self, JoinError, JoinHandle};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Latest composited frame, if any
pub type OverlayFrame = Option<Arc<RgbaImage>>;

/// Counters reported when the loop stops
#[derive(Debug, Clone, Default)]
pub struct LoopStats {
    pub ticks: u64,
    pub detections: u64,
    pub frames_skipped: u64,
    pub frames_missing: u64,
    pub detection_errors: u64,
    pub detector_failures: u64,
    pub hands_lost: u64,
    pub labels_published: u64,
    pub dispatch: DispatchStats,
}

/// Result of one detection run on the blocking pool; carries the detector back
struct DetectionJob {
    detector: Box<dyn LandmarkDetector>,
    frame_id: u64,
    timestamp_ms: u64,
    result: std::result::Result<Option<Pose>, DetectorError>,
    overlay: Option<RgbaImage>,
}

/// Frame-rate loop feeding frames to the detector and poses to the dispatcher.
///
/// All pipeline state is owned by the loop task. Detection runs on the
/// blocking pool with at most one call in flight, and classification runs on
/// spawned tasks, so a tick never waits on either.
pub struct DetectionLoop {
    fps: u32,
    frame_source: Box<dyn FrameSource>,
    detector: Option<Box<dyn LandmarkDetector>>,
    overlay: OverlayRenderer,
    dispatcher: ClassificationDispatcher,
    outcome_rx: mpsc::UnboundedReceiver<ClassificationOutcome>,
    event_bus: Arc<EventBus>,
    commands: Subscription,
    status_tx: watch::Sender<PipelineStatus>,
    overlay_tx: watch::Sender<OverlayFrame>,
    published_health: ClassifierHealth,
    hand_present: bool,
    origin: Instant,
    last_timestamp_ms: Option<u64>,
    stats: LoopStats,
}

impl DetectionLoop {
    pub fn new(
        config: &SignspellConfig,
        frame_source: Box<dyn FrameSource>,
        detector: Box<dyn LandmarkDetector>,
        classifier: Arc<dyn LabelClassifier>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let (dispatcher, outcome_rx) = ClassificationDispatcher::new(
            classifier,
            Duration::from_millis(config.classifier.cooldown_ms),
        );
        let (status_tx, _) = watch::channel(PipelineStatus::default());
        let (overlay_tx, _) = watch::channel(None);
        let commands = event_bus.subscribe_filtered(
            "pipeline",
            EventFilter::EventTypes(vec!["spelling_command"]),
        );

        Self {
            fps: config.camera.fps.max(1),
            frame_source,
            detector: Some(detector),
            overlay: OverlayRenderer::new(config.overlay.clone()),
            dispatcher,
            outcome_rx,
            event_bus,
            commands,
            status_tx,
            overlay_tx,
            published_health: ClassifierHealth::Idle,
            hand_present: false,
            origin: Instant::now(),
            last_timestamp_ms: None,
            stats: LoopStats::default(),
        }
    }

    pub fn status(&self) -> watch::Receiver<PipelineStatus> {
        self.status_tx.subscribe()
    }

    pub fn overlay(&self) -> watch::Receiver<OverlayFrame> {
        self.overlay_tx.subscribe()
    }

    /// Run the loop on its own task
    pub fn spawn(self) -> PipelineHandle {
        let cancellation_token = CancellationToken::new();
        let status_rx = self.status();
        let overlay_rx = self.overlay();
        let task = tokio::spawn(self.run(cancellation_token.clone()));

        PipelineHandle {
            task: Some(task),
            cancellation_token,
            status_rx,
            overlay_rx,
        }
    }

    /// Run until `cancellation_token` fires, then tear down and return the counters
    pub async fn run(mut self, cancellation_token: CancellationToken) -> LoopStats {
        info!("Detection loop starting at {} fps", self.fps);

        tokio::select! {
            _ = cancellation_token.cancelled() => {
                info!("Detection loop cancelled during initialization");
                return self.teardown(None);
            }
            _ = self.initialize_detector() => {}
        }
        self.open_camera();

        let mut ticker = interval(Duration::from_secs_f64(1.0 / self.fps as f64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Option<JoinHandle<DetectionJob>> = None;

        loop {
            tokio::select! {
                biased;

                _ = cancellation_token.cancelled() => break,

                joined = join_detection(&mut in_flight), if in_flight.is_some() => {
                    in_flight = None;
                    self.on_detection(joined);
                }

                Some(outcome) = self.outcome_rx.recv() => self.on_outcome(outcome),

                command = self.commands.recv(), if self.commands.is_active() => {
                    self.on_command(command);
                }

                _ = ticker.tick() => {
                    if let Some(handle) = self.on_tick(in_flight.is_some()) {
                        in_flight = Some(handle);
                    }
                }
            }
        }

        self.teardown(in_flight)
    }

    async fn initialize_detector(&mut self) {
        let Some(detector) = self.detector.take() else {
            return;
        };

        self.set_readiness(ReadinessStatus::LoadingRuntime);
        let loaded = task::spawn_blocking(move || {
            let mut detector = detector;
            let result = detector.load_runtime();
            (detector, result)
        })
        .await;
        let detector = match loaded {
            Ok((detector, Ok(()))) => detector,
            Ok((_, Err(e))) => return self.detector_unavailable(e.to_string()),
            Err(e) => return self.detector_unavailable(e.to_string()),
        };

        self.set_readiness(ReadinessStatus::LoadingModel);
        let loaded = task::spawn_blocking(move || {
            let mut detector = detector;
            let result = detector.load_model();
            (detector, result)
        })
        .await;
        match loaded {
            Ok((detector, Ok(()))) => {
                self.detector = Some(detector);
                self.set_readiness(ReadinessStatus::Ready);
            }
            Ok((_, Err(e))) => self.detector_unavailable(e.to_string()),
            Err(e) => self.detector_unavailable(e.to_string()),
        }
    }

    fn detector_unavailable(&mut self, reason: String) {
        error!("Landmark detector unavailable: {}", reason);
        self.detector = None;
        self.set_readiness(ReadinessStatus::Error);
        self.event_bus.publish(SignEvent::SystemError {
            component: "detector".to_string(),
            error: reason,
        });
    }

    fn open_camera(&mut self) {
        if let Err(e) = self.frame_source.open() {
            error!("Failed to open frame source: {}", e);
            // Camera failure wins over any detector status
            self.set_readiness(ReadinessStatus::CameraError);
            self.event_bus.publish(SignEvent::SystemError {
                component: "camera".to_string(),
                error: e.to_string(),
            });
        }
    }

    /// Handle one tick; returns the detection started on this tick, if any
    fn on_tick(&mut self, detection_in_flight: bool) -> Option<JoinHandle<DetectionJob>> {
        self.stats.ticks += 1;

        if self.status_tx.borrow().readiness != ReadinessStatus::Ready {
            return None;
        }

        let Some(frame) = self.frame_source.next_frame() else {
            self.stats.frames_missing += 1;
            return None;
        };

        // Latest wins: a frame arriving while the detector is busy is dropped
        if detection_in_flight {
            self.stats.frames_skipped += 1;
            trace!("Detector busy, skipping frame {}", frame.id);
            return None;
        }

        let mut detector = self.detector.take()?;
        let timestamp_ms = self.next_timestamp();
        let renderer = self.overlay.is_enabled().then(|| self.overlay.clone());

        Some(task::spawn_blocking(move || {
            let result = detector.detect(&frame, timestamp_ms);
            let overlay = renderer.and_then(|renderer| {
                let pose = result.as_ref().ok().and_then(Option::as_ref);
                renderer.composite(&frame, pose)
            });
            DetectionJob {
                detector,
                frame_id: frame.id,
                timestamp_ms,
                result,
                overlay,
            }
        }))
    }

    fn on_detection(&mut self, joined: std::result::Result<DetectionJob, JoinError>) {
        let job = match joined {
            Ok(job) => job,
            Err(e) => {
                // The detector went down with its task
                self.stats.detector_failures += 1;
                self.detector_unavailable(format!("detection task failed: {}", e));
                return;
            }
        };

        self.detector = Some(job.detector);
        self.stats.detections += 1;

        let pose = match job.result {
            Ok(pose) => pose,
            Err(e) => {
                self.stats.detection_errors += 1;
                debug!("Detection failed for frame {}: {}", job.frame_id, e);
                None
            }
        };
        let detection = DetectionFrame {
            pose,
            timestamp_ms: job.timestamp_ms,
        };

        if let Some(image) = job.overlay {
            self.overlay_tx.send_replace(Some(Arc::new(image)));
        }

        match detection.pose {
            Some(pose) => {
                self.set_hand_present(true);
                if let DispatchDecision::Sent { request_id } =
                    self.dispatcher.try_dispatch(pose, Instant::now())
                {
                    trace!(
                        "Pose at {} ms sent as request {}",
                        detection.timestamp_ms,
                        request_id
                    );
                    self.sync_health();
                }
            }
            None => {
                if self.hand_present {
                    self.set_hand_present(false);
                    self.stats.hands_lost += 1;
                    self.event_bus.publish(SignEvent::HandLost {
                        timestamp: SystemTime::now(),
                    });
                }
            }
        }
    }

    fn on_outcome(&mut self, outcome: ClassificationOutcome) {
        if let Some(result) = self.dispatcher.accept(outcome) {
            if let Some(label) = result.label {
                self.stats.labels_published += 1;
                self.status_tx
                    .send_modify(|status| status.last_label = Some(label.clone()));
                self.event_bus.publish(SignEvent::SignDetected {
                    alphabet: label,
                    request_id: result.request_id,
                    timestamp: SystemTime::now(),
                });
            }
        }
        self.sync_health();
    }

    fn on_command(&mut self, command: std::result::Result<SignEvent, EventBusError>) {
        match command {
            Ok(SignEvent::SpellingCommand(SpellingCommand::Clear)) => {
                // The displayed label goes back to the none sentinel
                self.status_tx.send_if_modified(|status| status.last_label.take().is_some());
            }
            Ok(_) => {}
            Err(EventBusError::Lagged { skipped }) => {
                warn!("Pipeline missed {} spelling commands", skipped);
            }
            Err(e) => {
                debug!("Spelling command subscription ended: {}", e);
                self.commands.unsubscribe();
            }
        }
    }

    /// Strictly increasing milliseconds since loop start
    fn next_timestamp(&mut self) -> u64 {
        let now = self.origin.elapsed().as_millis() as u64;
        let timestamp = match self.last_timestamp_ms {
            Some(last) if now <= last => last + 1,
            _ => now,
        };
        self.last_timestamp_ms = Some(timestamp);
        timestamp
    }

    fn set_readiness(&self, readiness: ReadinessStatus) {
        let changed = self.status_tx.send_if_modified(|status| {
            if status.readiness == readiness {
                return false;
            }
            status.readiness = readiness;
            true
        });

        if changed {
            self.event_bus.publish(SignEvent::ReadinessChanged {
                status: readiness,
                timestamp: SystemTime::now(),
            });
        }
    }

    fn set_hand_present(&mut self, present: bool) {
        if self.hand_present != present {
            self.hand_present = present;
            self.status_tx
                .send_modify(|status| status.hand_present = present);
        }
    }

    fn sync_health(&mut self) {
        let health = self.dispatcher.health();
        if health == self.published_health {
            return;
        }

        self.published_health = health;
        self.status_tx
            .send_modify(|status| status.classifier = health);
        self.event_bus.publish(SignEvent::ClassifierHealthChanged {
            health,
            timestamp: SystemTime::now(),
        });
    }

    fn teardown(mut self, in_flight: Option<JoinHandle<DetectionJob>>) -> LoopStats {
        // Late classification outcomes must not reach the torn-down pipeline
        self.dispatcher.invalidate();
        self.commands.unsubscribe();

        if in_flight.is_some() {
            debug!("Abandoning in-flight detection");
        }
        self.frame_source.release();

        self.stats.dispatch = self.dispatcher.stats().clone();
        info!(
            "Detection loop stopped after {} ticks ({} detections, {} skipped, {} requests)",
            self.stats.ticks,
            self.stats.detections,
            self.stats.frames_skipped,
            self.stats.dispatch.sent
        );
        self.stats
    }
}

async fn join_detection(
    in_flight: &mut Option<JoinHandle<DetectionJob>>,
) -> std::result::Result<DetectionJob, JoinError> {
    match in_flight {
        Some(handle) => handle.await,
        None => std::future::pending().await,
    }
}

/// Handle to a spawned detection loop
pub struct PipelineHandle {
    task: Option<JoinHandle<LoopStats>>,
    cancellation_token: CancellationToken,
    status_rx: watch::Receiver<PipelineStatus>,
    overlay_rx: watch::Receiver<OverlayFrame>,
}

impl PipelineHandle {
    pub fn status(&self) -> watch::Receiver<PipelineStatus> {
        self.status_rx.clone()
    }

    pub fn overlay(&self) -> watch::Receiver<OverlayFrame> {
        self.overlay_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }

    /// Cancel the loop and wait for teardown
    pub async fn stop(&mut self) -> Result<LoopStats> {
        self.cancellation_token.cancel();

        let task = self
            .task
            .take()
            .ok_or_else(|| SignspellError::system("Detection loop already stopped"))?;

        task.await
            .map_err(|e| SignspellError::component("pipeline", e.to_string()))
    }
}
