use crate::classifier::LabelClassifier;
use crate::error::ClassifierError;
use crate::landmark::Pose;
use crate::status::ClassifierHealth;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Outcome of one classification request, reported back to the loop
#[derive(Debug)]
pub struct ClassificationOutcome {
    pub generation: u64,
    pub request_id: u64,
    pub requested_at: Instant,
    pub result: Result<Option<String>, ClassifierError>,
}

/// A successful classification accepted by the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub label: Option<String>,
    pub request_id: u64,
    pub requested_at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchDecision {
    Sent { request_id: u64 },
    CoolingDown,
}

#[derive(Debug, Clone, Default)]
pub struct DispatchStats {
    pub sent: u64,
    pub skipped: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub discarded: u64,
}

/// Rate-limited bridge between the detection loop and the classifier.
///
/// At most one request leaves per cooldown window; requests are never queued
/// or retried. Each request runs on its own task and reports through a
/// channel, tagged with the dispatcher generation so that outcomes arriving
/// after [`invalidate`](Self::invalidate) are dropped.
pub struct ClassificationDispatcher {
    classifier: Arc<dyn LabelClassifier>,
    cooldown: Duration,
    last_dispatch: Option<Instant>,
    next_request_id: u64,
    generation: Arc<AtomicU64>,
    health: ClassifierHealth,
    in_flight: usize,
    outcome_tx: mpsc::UnboundedSender<ClassificationOutcome>,
    stats: DispatchStats,
}

impl ClassificationDispatcher {
    pub fn new(
        classifier: Arc<dyn LabelClassifier>,
        cooldown: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<ClassificationOutcome>) {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();

        let dispatcher = Self {
            classifier,
            cooldown,
            last_dispatch: None,
            next_request_id: 1,
            generation: Arc::new(AtomicU64::new(0)),
            health: ClassifierHealth::Idle,
            in_flight: 0,
            outcome_tx,
            stats: DispatchStats::default(),
        };

        (dispatcher, outcome_rx)
    }

    /// Send `pose` for classification unless the cooldown is still running
    pub fn try_dispatch(&mut self, pose: Pose, now: Instant) -> DispatchDecision {
        if let Some(last) = self.last_dispatch {
            if now.saturating_duration_since(last) < self.cooldown {
                self.stats.skipped += 1;
                return DispatchDecision::CoolingDown;
            }
        }

        // Claimed before the request leaves, so failures still use up the window
        self.last_dispatch = Some(now);

        let request_id = self.next_request_id;
        self.next_request_id += 1;
        self.in_flight += 1;
        self.stats.sent += 1;
        self.health = ClassifierHealth::Sending;

        let classifier = Arc::clone(&self.classifier);
        let generation = Arc::clone(&self.generation);
        let request_generation = generation.load(Ordering::Acquire);
        let tx = self.outcome_tx.clone();

        debug!("Dispatching classification request {}", request_id);
        tokio::spawn(async move {
            let result = classifier.classify(&pose).await;

            if generation.load(Ordering::Acquire) != request_generation {
                debug!("Request {} finished after teardown, discarding", request_id);
                return;
            }

            // The loop may already be gone; the outcome is then dropped
            let _ = tx.send(ClassificationOutcome {
                generation: request_generation,
                request_id,
                requested_at: now,
                result,
            });
        });

        DispatchDecision::Sent { request_id }
    }

    /// Apply a finished request to dispatcher health.
    ///
    /// Returns the result for successful requests of the current generation.
    pub fn accept(&mut self, outcome: ClassificationOutcome) -> Option<ClassificationResult> {
        if outcome.generation != self.generation.load(Ordering::Acquire) {
            self.stats.discarded += 1;
            debug!("Discarding stale outcome for request {}", outcome.request_id);
            return None;
        }

        self.in_flight = self.in_flight.saturating_sub(1);

        match outcome.result {
            Ok(label) => {
                self.stats.succeeded += 1;
                self.health = ClassifierHealth::Success;
                Some(ClassificationResult {
                    label,
                    request_id: outcome.request_id,
                    requested_at: outcome.requested_at,
                })
            }
            Err(e) => {
                self.stats.failed += 1;
                self.health = ClassifierHealth::Offline;
                warn!("Classification request {} failed: {}", outcome.request_id, e);
                None
            }
        }
    }

    /// Drop every pending and future outcome of requests sent so far
    pub fn invalidate(&mut self) {
        let previous = self.generation.fetch_add(1, Ordering::AcqRel);
        if self.in_flight > 0 {
            debug!(
                "Invalidated generation {} with {} request(s) in flight",
                previous, self.in_flight
            );
        }
        self.in_flight = 0;
    }

    pub fn health(&self) -> ClassifierHealth {
        self.health
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::test_pose;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::time::timeout;

    struct FixedClassifier {
        label: Option<&'static str>,
        fail: bool,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl FixedClassifier {
        fn new(label: Option<&'static str>) -> Self {
            Self {
                label,
                fail: false,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl LabelClassifier for FixedClassifier {
        async fn classify(&self, _pose: &Pose) -> Result<Option<String>, ClassifierError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(ClassifierError::Transport("connection refused".to_string()))
            } else {
                Ok(self.label.map(str::to_string))
            }
        }
    }

    async fn next_outcome(
        rx: &mut mpsc::UnboundedReceiver<ClassificationOutcome>,
    ) -> ClassificationOutcome {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_cooldown_limits_requests_at_frame_rate() {
        let classifier = Arc::new(FixedClassifier::new(Some("A")));
        let (mut dispatcher, _rx) =
            ClassificationDispatcher::new(classifier.clone(), Duration::from_millis(200));

        let start = Instant::now();
        let mut sent = 0;
        // One second of frames every 16 ms
        for frame in 0..63u64 {
            let now = start + Duration::from_millis(frame * 16);
            if let DispatchDecision::Sent { .. } = dispatcher.try_dispatch(test_pose(0.0), now) {
                sent += 1;
            }
        }

        assert_eq!(sent, 5);
        assert_eq!(dispatcher.stats().sent, 5);
        assert_eq!(dispatcher.stats().skipped, 58);
    }

    #[tokio::test]
    async fn test_never_more_than_one_request_per_window() {
        for interval_ms in [1u64, 7, 16, 33, 50, 199, 200, 250] {
            let classifier = Arc::new(FixedClassifier::new(Some("A")));
            let (mut dispatcher, _rx) =
                ClassificationDispatcher::new(classifier, Duration::from_millis(200));
            let start = Instant::now();
            let mut sent_at: Vec<u64> = Vec::new();

            for frame in 0..(3000 / interval_ms) {
                let offset = frame * interval_ms;
                let decision =
                    dispatcher.try_dispatch(test_pose(0.0), start + Duration::from_millis(offset));
                if matches!(decision, DispatchDecision::Sent { .. }) {
                    sent_at.push(offset);
                }
            }

            for pair in sent_at.windows(2) {
                assert!(pair[1] - pair[0] >= 200, "interval {} ms", interval_ms);
            }
        }
    }

    #[tokio::test]
    async fn test_success_reports_label_and_health() {
        let classifier = Arc::new(FixedClassifier::new(Some("C")));
        let (mut dispatcher, mut rx) =
            ClassificationDispatcher::new(classifier, Duration::from_millis(200));
        assert_eq!(dispatcher.health(), ClassifierHealth::Idle);

        let decision = dispatcher.try_dispatch(test_pose(0.0), Instant::now());
        assert_eq!(decision, DispatchDecision::Sent { request_id: 1 });
        assert_eq!(dispatcher.health(), ClassifierHealth::Sending);
        assert_eq!(dispatcher.in_flight(), 1);

        let result = dispatcher.accept(next_outcome(&mut rx).await).unwrap();
        assert_eq!(result.label.as_deref(), Some("C"));
        assert_eq!(result.request_id, 1);
        assert_eq!(dispatcher.health(), ClassifierHealth::Success);
        assert_eq!(dispatcher.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_failure_marks_offline_and_keeps_cooldown() {
        let classifier = Arc::new(FixedClassifier {
            fail: true,
            ..FixedClassifier::new(None)
        });
        let (mut dispatcher, mut rx) =
            ClassificationDispatcher::new(classifier.clone(), Duration::from_millis(200));

        let start = Instant::now();
        dispatcher.try_dispatch(test_pose(0.0), start);
        assert!(dispatcher.accept(next_outcome(&mut rx).await).is_none());
        assert_eq!(dispatcher.health(), ClassifierHealth::Offline);
        assert_eq!(dispatcher.stats().failed, 1);

        // No retry: the failed request still used up its window
        assert_eq!(
            dispatcher.try_dispatch(test_pose(0.0), start + Duration::from_millis(100)),
            DispatchDecision::CoolingDown
        );
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_health_recovers_after_success() {
        struct Flaky {
            calls: AtomicUsize,
        }

        #[async_trait]
        impl LabelClassifier for Flaky {
            async fn classify(&self, _pose: &Pose) -> Result<Option<String>, ClassifierError> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ClassifierError::Timeout)
                } else {
                    Ok(Some("D".to_string()))
                }
            }
        }

        let (mut dispatcher, mut rx) = ClassificationDispatcher::new(
            Arc::new(Flaky {
                calls: AtomicUsize::new(0),
            }),
            Duration::from_millis(200),
        );
        let start = Instant::now();

        dispatcher.try_dispatch(test_pose(0.0), start);
        dispatcher.accept(next_outcome(&mut rx).await);
        assert_eq!(dispatcher.health(), ClassifierHealth::Offline);

        dispatcher.try_dispatch(test_pose(0.0), start + Duration::from_millis(200));
        let result = dispatcher.accept(next_outcome(&mut rx).await);
        assert_eq!(result.and_then(|r| r.label).as_deref(), Some("D"));
        assert_eq!(dispatcher.health(), ClassifierHealth::Success);
    }

    #[tokio::test]
    async fn test_empty_label_is_accepted_without_symbol() {
        let (mut dispatcher, mut rx) = ClassificationDispatcher::new(
            Arc::new(FixedClassifier::new(None)),
            Duration::from_millis(200),
        );

        dispatcher.try_dispatch(test_pose(0.0), Instant::now());
        let result = dispatcher.accept(next_outcome(&mut rx).await).unwrap();
        assert!(result.label.is_none());
        assert_eq!(dispatcher.health(), ClassifierHealth::Success);
    }

    #[tokio::test]
    async fn test_invalidate_drops_late_outcomes() {
        let classifier = Arc::new(FixedClassifier {
            delay: Duration::from_millis(50),
            ..FixedClassifier::new(Some("E"))
        });
        let (mut dispatcher, mut rx) =
            ClassificationDispatcher::new(classifier.clone(), Duration::from_millis(200));

        dispatcher.try_dispatch(test_pose(0.0), Instant::now());
        dispatcher.invalidate();
        assert_eq!(dispatcher.in_flight(), 0);

        // The request completes but its outcome never reaches the loop
        assert!(timeout(Duration::from_millis(300), rx.recv()).await.is_err());
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_accept_rejects_previous_generation() {
        let (mut dispatcher, mut rx) = ClassificationDispatcher::new(
            Arc::new(FixedClassifier::new(Some("F"))),
            Duration::from_millis(200),
        );

        dispatcher.try_dispatch(test_pose(0.0), Instant::now());
        let outcome = next_outcome(&mut rx).await;
        dispatcher.invalidate();

        assert!(dispatcher.accept(outcome).is_none());
        assert_eq!(dispatcher.stats().discarded, 1);
        assert_eq!(dispatcher.health(), ClassifierHealth::Sending);
    }

    #[tokio::test]
    async fn test_late_outcome_after_loop_dropped() {
        let classifier = Arc::new(FixedClassifier {
            delay: Duration::from_millis(20),
            ..FixedClassifier::new(Some("G"))
        });
        let (mut dispatcher, rx) =
            ClassificationDispatcher::new(classifier.clone(), Duration::from_millis(200));

        dispatcher.try_dispatch(test_pose(0.0), Instant::now());
        drop(rx);
        drop(dispatcher);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    }
}
