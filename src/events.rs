use crate::error::EventBusError;
use crate::status::{ClassifierHealth, ReadinessStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// User actions on the spelled text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpellingCommand {
    /// Remove every committed symbol
    Clear,
    /// Remove the last committed symbol
    Undo,
}

/// Events that flow through the signspell pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SignEvent {
    /// The classification service returned a label for a pose
    SignDetected {
        alphabet: String,
        request_id: u64,
        timestamp: SystemTime,
    },
    /// A hand that was in view is no longer detected
    HandLost { timestamp: SystemTime },
    /// A stable label was appended to the spelling
    SymbolCommitted {
        symbol: String,
        text: String,
        timestamp: SystemTime,
    },
    /// The spelling changed through a user command
    SpellingChanged { text: String },
    /// User requested a change to the spelling
    SpellingCommand(SpellingCommand),
    /// Detector or camera readiness changed
    ReadinessChanged {
        status: ReadinessStatus,
        timestamp: SystemTime,
    },
    /// Classification service health changed
    ClassifierHealthChanged {
        health: ClassifierHealth,
        timestamp: SystemTime,
    },
    /// A system error occurred in a component
    SystemError { component: String, error: String },
    /// System shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl SignEvent {
    /// Get the timestamp of the event
    pub fn timestamp(&self) -> SystemTime {
        match self {
            SignEvent::SignDetected { timestamp, .. } => *timestamp,
            SignEvent::HandLost { timestamp } => *timestamp,
            SignEvent::SymbolCommitted { timestamp, .. } => *timestamp,
            SignEvent::SpellingChanged { .. } => SystemTime::now(),
            SignEvent::SpellingCommand(_) => SystemTime::now(),
            SignEvent::ReadinessChanged { timestamp, .. } => *timestamp,
            SignEvent::ClassifierHealthChanged { timestamp, .. } => *timestamp,
            SignEvent::SystemError { .. } => SystemTime::now(),
            SignEvent::ShutdownRequested { timestamp, .. } => *timestamp,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            SignEvent::SignDetected {
                alphabet,
                request_id,
                ..
            } => format!("Sign '{}' detected (request {})", alphabet, request_id),
            SignEvent::HandLost { .. } => "Hand lost".to_string(),
            SignEvent::SymbolCommitted { symbol, text, .. } => {
                format!("Committed '{}' -> \"{}\"", symbol, text)
            }
            SignEvent::SpellingChanged { text } => format!("Spelling is now \"{}\"", text),
            SignEvent::SpellingCommand(command) => format!("Spelling command: {:?}", command),
            SignEvent::ReadinessChanged { status, .. } => {
                format!("Readiness: {}", status.label())
            }
            SignEvent::ClassifierHealthChanged { health, .. } => {
                format!("Classifier: {}", health.label())
            }
            SignEvent::SystemError { component, error } => {
                format!("Error in {}: {}", component, error)
            }
            SignEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            SignEvent::SignDetected { .. } => "sign_detected",
            SignEvent::HandLost { .. } => "hand_lost",
            SignEvent::SymbolCommitted { .. } => "symbol_committed",
            SignEvent::SpellingChanged { .. } => "spelling_changed",
            SignEvent::SpellingCommand(_) => "spelling_command",
            SignEvent::ReadinessChanged { .. } => "readiness_changed",
            SignEvent::ClassifierHealthChanged { .. } => "classifier_health_changed",
            SignEvent::SystemError { .. } => "system_error",
            SignEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Process-wide publish/subscribe bus backed by a broadcast channel.
///
/// Delivery is best effort: an event reaches whoever is subscribed at the
/// moment it is published, and nothing is retained for late subscribers.
pub struct EventBus {
    sender: broadcast::Sender<SignEvent>,
    next_subscription_id: Arc<AtomicU64>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            next_subscription_id: Arc::new(AtomicU64::new(1)),
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        Self {
            debug_logging: true,
            ..Self::new(capacity)
        }
    }

    /// Subscribe to every event
    pub fn subscribe(&self, name: impl Into<String>) -> Subscription {
        self.subscribe_filtered(name, EventFilter::All)
    }

    /// Subscribe to events that pass `filter`
    pub fn subscribe_filtered(&self, name: impl Into<String>, filter: EventFilter) -> Subscription {
        let id = self.next_subscription_id.fetch_add(1, Ordering::Relaxed);
        let name = name.into();
        debug!("Subscription {} '{}' attached", id, name);

        Subscription {
            id,
            name,
            filter,
            receiver: Some(self.sender.subscribe()),
        }
    }

    /// Publish an event to all current subscribers, returning how many were reached
    pub fn publish(&self, event: SignEvent) -> usize {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        match &event {
            SignEvent::SymbolCommitted { symbol, text, .. } => {
                info!("Committed '{}', spelling: \"{}\"", symbol, text);
            }
            SignEvent::ReadinessChanged { status, .. } => {
                if status.is_terminal() {
                    error!("Pipeline status: {}", status.label());
                } else {
                    info!("Pipeline status: {}", status.label());
                }
            }
            SignEvent::ClassifierHealthChanged { health, .. } => {
                if *health == ClassifierHealth::Offline {
                    warn!("Classifier health: {}", health.label());
                } else {
                    debug!("Classifier health: {}", health.label());
                }
            }
            SignEvent::SystemError { component, error } => {
                error!("System error in {}: {}", component, error);
            }
            SignEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            _ => {}
        }

        // No subscribers is not an error: the event is simply dropped
        self.sender.send(event).unwrap_or(0)
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            next_subscription_id: Arc::clone(&self.next_subscription_id),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Accept all events
    All,
    /// Accept only specific event types
    EventTypes(Vec<&'static str>),
    /// Custom filter function
    Custom(fn(&SignEvent) -> bool),
}

impl EventFilter {
    /// Check if an event passes this filter
    pub fn matches(&self, event: &SignEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// A named, filtered attachment to the bus.
///
/// `unsubscribe` is idempotent and dropping the subscription detaches it too,
/// so teardown paths can call it unconditionally.
pub struct Subscription {
    id: u64,
    name: String,
    filter: EventFilter,
    receiver: Option<broadcast::Receiver<SignEvent>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_active(&self) -> bool {
        self.receiver.is_some()
    }

    /// Detach from the bus
    pub fn unsubscribe(&mut self) {
        if self.receiver.take().is_some() {
            debug!("Subscription {} '{}' detached", self.id, self.name);
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<SignEvent, EventBusError> {
        let receiver = self
            .receiver
            .as_mut()
            .ok_or_else(|| EventBusError::Unsubscribed {
                name: self.name.clone(),
            })?;

        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Subscription '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for subscription '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<SignEvent>, EventBusError> {
        let receiver = self
            .receiver
            .as_mut()
            .ok_or_else(|| EventBusError::Unsubscribed {
                name: self.name.clone(),
            })?;

        loop {
            match receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Subscription '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Event metrics collector for monitoring and debugging
#[derive(Debug, Clone, Default)]
pub struct EventMetrics {
    pub total_events: u64,
    pub events_by_type: HashMap<&'static str, u64>,
    pub errors: u64,
    pub last_event_time: Option<SystemTime>,
}

impl EventMetrics {
    /// Record an event
    pub fn record_event(&mut self, event: &SignEvent) {
        self.total_events += 1;
        *self.events_by_type.entry(event.event_type()).or_insert(0) += 1;
        self.last_event_time = Some(event.timestamp());
    }

    /// Record an error
    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    pub fn count(&self, event_type: &str) -> u64 {
        self.events_by_type.get(event_type).copied().unwrap_or(0)
    }

    /// Log a summary of recorded events
    pub fn log_summary(&self) {
        info!("Event summary:");
        info!("  Total events: {}", self.total_events);
        info!("  Errors: {}", self.errors);

        let mut by_type: Vec<_> = self.events_by_type.iter().collect();
        by_type.sort();
        for (event_type, count) in by_type {
            info!("  {}: {}", event_type, count);
        }
    }
}
