use crate::config::StabilityConfig;
use crate::error::{EventBusError, Result, SignspellError};
use crate::events::{EventBus, EventFilter, SignEvent, SpellingCommand, Subscription};
use crate::stability::StabilityAutomaton;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Ordered sequence of committed symbols
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpellingBuffer {
    symbols: Vec<String>,
}

impl SpellingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, symbol: impl Into<String>) {
        self.symbols.push(symbol.into());
    }

    /// Remove the last symbol
    pub fn undo(&mut self) -> Option<String> {
        self.symbols.pop()
    }

    pub fn clear(&mut self) {
        self.symbols.clear();
    }

    pub fn text(&self) -> String {
        self.symbols.concat()
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Stability automaton plus the buffer it commits into
pub struct Speller {
    automaton: StabilityAutomaton,
    buffer: SpellingBuffer,
}

impl Speller {
    pub fn new(automaton: StabilityAutomaton) -> Self {
        Self {
            automaton,
            buffer: SpellingBuffer::new(),
        }
    }

    /// Apply one bus event observed at `at_ms`, returning the event to publish in response
    pub fn handle(&mut self, event: &SignEvent, at_ms: u64) -> Option<SignEvent> {
        match event {
            SignEvent::SignDetected { alphabet, .. } => {
                let symbol = self.automaton.observe(Some(alphabet.as_str()), at_ms)?;
                self.buffer.push(symbol.clone());
                Some(SignEvent::SymbolCommitted {
                    symbol,
                    text: self.buffer.text(),
                    timestamp: SystemTime::now(),
                })
            }
            SignEvent::HandLost { .. } => {
                self.automaton.observe(None, at_ms);
                None
            }
            SignEvent::SpellingCommand(SpellingCommand::Clear) => {
                if self.buffer.is_empty() {
                    return None;
                }
                self.buffer.clear();
                Some(SignEvent::SpellingChanged {
                    text: self.buffer.text(),
                })
            }
            SignEvent::SpellingCommand(SpellingCommand::Undo) => {
                self.buffer.undo()?;
                Some(SignEvent::SpellingChanged {
                    text: self.buffer.text(),
                })
            }
            _ => None,
        }
    }

    pub fn buffer(&self) -> &SpellingBuffer {
        &self.buffer
    }

    pub fn automaton(&self) -> &StabilityAutomaton {
        &self.automaton
    }
}

/// Bus consumer that drives a [`Speller`] from raw label events
pub struct SpellerIntegration {
    event_bus: Arc<EventBus>,
    config: StabilityConfig,
    text: Arc<RwLock<String>>,
    cancellation_token: CancellationToken,
    task: Mutex<Option<JoinHandle<SpellingBuffer>>>,
}

impl SpellerIntegration {
    pub fn new(config: StabilityConfig, event_bus: Arc<EventBus>) -> Self {
        Self {
            event_bus,
            config,
            text: Arc::new(RwLock::new(String::new())),
            cancellation_token: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Subscribe to the bus and start consuming
    pub async fn start(&self) -> Result<()> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            warn!("Speller is already running");
            return Ok(());
        }

        // Subscribe before spawning so nothing published after start() is missed
        let subscription = self.event_bus.subscribe_filtered(
            "speller",
            EventFilter::EventTypes(vec!["sign_detected", "hand_lost", "spelling_command"]),
        );

        let speller = Speller::new(StabilityAutomaton::from_config(&self.config));
        *task = Some(tokio::spawn(Self::run(
            speller,
            subscription,
            Arc::clone(&self.event_bus),
            Arc::clone(&self.text),
            self.cancellation_token.clone(),
        )));

        info!(
            "Speller started (threshold {}, append cooldown {} ms)",
            self.config.threshold, self.config.append_cooldown_ms
        );
        Ok(())
    }

    async fn run(
        mut speller: Speller,
        mut subscription: Subscription,
        event_bus: Arc<EventBus>,
        text: Arc<RwLock<String>>,
        cancellation_token: CancellationToken,
    ) -> SpellingBuffer {
        let origin = Instant::now();
        let apply = |speller: &mut Speller, event: SignEvent| {
            let at_ms = origin.elapsed().as_millis() as u64;
            if let Some(response) = speller.handle(&event, at_ms) {
                *text.write() = speller.buffer().text();
                event_bus.publish(response);
            }
        };

        loop {
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    // Take whatever was published before the stop request
                    while let Ok(Some(event)) = subscription.try_recv() {
                        apply(&mut speller, event);
                    }
                    break;
                }
                received = subscription.recv() => match received {
                    Ok(event) => apply(&mut speller, event),
                    Err(EventBusError::Lagged { skipped }) => {
                        warn!("Speller missed {} events", skipped);
                    }
                    Err(e) => {
                        debug!("Speller subscription ended: {}", e);
                        break;
                    }
                },
            }
        }

        subscription.unsubscribe();
        speller.buffer
    }

    /// Current spelled text
    pub fn text(&self) -> String {
        self.text.read().clone()
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .map_or(false, |task| !task.is_finished())
    }

    /// Stop consuming and return the final text
    pub async fn stop(&self) -> Result<String> {
        self.cancellation_token.cancel();

        let Some(task) = self.task.lock().await.take() else {
            return Ok(self.text());
        };

        let buffer = task
            .await
            .map_err(|e| SignspellError::component("speller", e.to_string()))?;

        info!("Speller stopped with {} symbol(s)", buffer.len());
        Ok(buffer.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    fn detected(alphabet: &str) -> SignEvent {
        SignEvent::SignDetected {
            alphabet: alphabet.to_string(),
            request_id: 0,
            timestamp: SystemTime::now(),
        }
    }

    #[test]
    fn test_buffer_operations() {
        let mut buffer = SpellingBuffer::new();
        buffer.push("H");
        buffer.push("I");
        assert_eq!(buffer.text(), "HI");
        assert_eq!(buffer.len(), 2);

        assert_eq!(buffer.undo().as_deref(), Some("I"));
        assert_eq!(buffer.text(), "H");

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.undo(), None);
    }

    #[test]
    fn test_speller_commits_and_reports() {
        let mut speller = Speller::new(StabilityAutomaton::new(3, 1500));

        assert!(speller.handle(&detected("A"), 0).is_none());
        assert!(speller.handle(&detected("A"), 100).is_none());
        match speller.handle(&detected("A"), 200) {
            Some(SignEvent::SymbolCommitted { symbol, text, .. }) => {
                assert_eq!(symbol, "A");
                assert_eq!(text, "A");
            }
            other => panic!("Expected commit, got {:?}", other),
        }
    }

    #[test]
    fn test_hand_lost_breaks_run() {
        let mut speller = Speller::new(StabilityAutomaton::new(3, 1500));

        speller.handle(&detected("A"), 0);
        speller.handle(&detected("A"), 100);
        speller.handle(
            &SignEvent::HandLost {
                timestamp: SystemTime::now(),
            },
            150,
        );
        assert!(speller.handle(&detected("A"), 200).is_none());
        assert_eq!(speller.automaton().count(), 1);
    }

    #[test]
    fn test_clear_and_undo_commands() {
        let mut speller = Speller::new(StabilityAutomaton::new(1, 0));
        speller.handle(&detected("A"), 0);
        speller.handle(&detected("B"), 10);
        speller.handle(&detected("C"), 20);
        assert_eq!(speller.buffer().text(), "ABC");

        match speller.handle(&SignEvent::SpellingCommand(SpellingCommand::Undo), 30) {
            Some(SignEvent::SpellingChanged { text }) => assert_eq!(text, "AB"),
            other => panic!("Expected change, got {:?}", other),
        }

        match speller.handle(&SignEvent::SpellingCommand(SpellingCommand::Clear), 40) {
            Some(SignEvent::SpellingChanged { text }) => assert!(text.is_empty()),
            other => panic!("Expected change, got {:?}", other),
        }

        // Nothing left to change
        assert!(speller
            .handle(&SignEvent::SpellingCommand(SpellingCommand::Undo), 50)
            .is_none());
        assert!(speller
            .handle(&SignEvent::SpellingCommand(SpellingCommand::Clear), 60)
            .is_none());
    }

    #[test]
    fn test_buffer_commands_do_not_reset_cooldown() {
        let mut speller = Speller::new(StabilityAutomaton::new(1, 1500));
        assert!(speller.handle(&detected("A"), 0).is_some());

        speller.handle(&SignEvent::SpellingCommand(SpellingCommand::Clear), 100);
        assert!(speller.handle(&detected("A"), 200).is_none());
    }

    #[tokio::test]
    async fn test_integration_commits_from_bus() {
        let event_bus = Arc::new(EventBus::new(64));
        let mut commits = event_bus
            .subscribe_filtered("commits", EventFilter::EventTypes(vec!["symbol_committed"]));

        let speller = SpellerIntegration::new(
            StabilityConfig {
                threshold: 5,
                append_cooldown_ms: 1500,
            },
            Arc::clone(&event_bus),
        );
        speller.start().await.unwrap();
        assert!(speller.is_running().await);

        for _ in 0..5 {
            event_bus.publish(detected("A"));
        }

        let committed = timeout(Duration::from_secs(1), commits.recv())
            .await
            .unwrap()
            .unwrap();
        match committed {
            SignEvent::SymbolCommitted { symbol, text, .. } => {
                assert_eq!(symbol, "A");
                assert_eq!(text, "A");
            }
            other => panic!("Unexpected event: {:?}", other),
        }
        assert_eq!(speller.text(), "A");

        assert_eq!(speller.stop().await.unwrap(), "A");
        assert!(!speller.is_running().await);
    }

    #[tokio::test]
    async fn test_integration_applies_commands_before_stop() {
        let event_bus = Arc::new(EventBus::new(64));
        let speller = SpellerIntegration::new(
            StabilityConfig {
                threshold: 1,
                append_cooldown_ms: 0,
            },
            Arc::clone(&event_bus),
        );
        speller.start().await.unwrap();

        event_bus.publish(detected("O"));
        event_bus.publish(SignEvent::HandLost {
            timestamp: SystemTime::now(),
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        event_bus.publish(detected("K"));
        event_bus.publish(SignEvent::SpellingCommand(SpellingCommand::Undo));

        assert_eq!(speller.stop().await.unwrap(), "O");
        assert_eq!(event_bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let event_bus = Arc::new(EventBus::new(8));
        let speller = SpellerIntegration::new(
            StabilityConfig {
                threshold: 5,
                append_cooldown_ms: 1500,
            },
            event_bus,
        );

        assert_eq!(speller.stop().await.unwrap(), "");
    }
}
