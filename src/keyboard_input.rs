use crate::error::Result;
use crate::events::{EventBus, SignEvent, SpellingCommand};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Terminal key actions on the spelling
pub struct KeyboardInputHandler {
    event_bus: Arc<EventBus>,
    cancellation_token: CancellationToken,
}

/// Event published for a pressed key, if the key is bound
pub fn event_for_key(code: KeyCode) -> Option<SignEvent> {
    match code {
        KeyCode::Char('c') | KeyCode::Char('C') => {
            Some(SignEvent::SpellingCommand(SpellingCommand::Clear))
        }
        KeyCode::Char('u') | KeyCode::Char('U') | KeyCode::Backspace => {
            Some(SignEvent::SpellingCommand(SpellingCommand::Undo))
        }
        KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
            Some(SignEvent::ShutdownRequested {
                timestamp: SystemTime::now(),
                reason: "User requested via keyboard".to_string(),
            })
        }
        _ => None,
    }
}

impl KeyboardInputHandler {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            event_bus,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Start reading keys in raw mode on the blocking pool
    pub async fn start(&self) -> Result<()> {
        let event_bus = Arc::clone(&self.event_bus);
        let cancellation_token = self.cancellation_token.clone();

        task::spawn_blocking(move || {
            if let Err(e) = enable_raw_mode() {
                error!("Failed to enable raw mode for keyboard input: {}", e);
                return;
            }
            debug!("Raw mode enabled");

            while !cancellation_token.is_cancelled() {
                match event::poll(Duration::from_millis(100)) {
                    Ok(true) => {
                        let Ok(Event::Key(key_event)) = event::read() else {
                            continue;
                        };
                        // Ignore releases and repeats
                        if key_event.kind != KeyEventKind::Press {
                            continue;
                        }

                        let Some(event) = event_for_key(key_event.code) else {
                            debug!("Unbound key: {:?}", key_event.code);
                            continue;
                        };

                        let quit = matches!(event, SignEvent::ShutdownRequested { .. });
                        info!("Key {:?}: {}", key_event.code, event.description());
                        event_bus.publish(event);
                        if quit {
                            break;
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("Error polling for keyboard events: {}", e);
                    }
                }
            }

            if let Err(e) = disable_raw_mode() {
                error!("Failed to disable raw mode: {}", e);
            }
            debug!("Keyboard input task exited");
        });

        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        self.cancellation_token.cancel();

        // Let the poll loop notice and restore the terminal
        tokio::time::sleep(Duration::from_millis(200)).await;
        let _ = disable_raw_mode();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bound_keys() {
        assert!(matches!(
            event_for_key(KeyCode::Char('c')),
            Some(SignEvent::SpellingCommand(SpellingCommand::Clear))
        ));
        assert!(matches!(
            event_for_key(KeyCode::Backspace),
            Some(SignEvent::SpellingCommand(SpellingCommand::Undo))
        ));
        assert!(matches!(
            event_for_key(KeyCode::Char('U')),
            Some(SignEvent::SpellingCommand(SpellingCommand::Undo))
        ));
        assert!(matches!(
            event_for_key(KeyCode::Esc),
            Some(SignEvent::ShutdownRequested { .. })
        ));
    }

    #[test]
    fn test_unbound_keys() {
        assert!(event_for_key(KeyCode::Char(' ')).is_none());
        assert!(event_for_key(KeyCode::Enter).is_none());
        assert!(event_for_key(KeyCode::Char('a')).is_none());
    }

    #[tokio::test]
    async fn test_keyboard_handler_stop() {
        let event_bus = Arc::new(EventBus::new(100));
        let handler = KeyboardInputHandler::new(event_bus);
        assert!(!handler.cancellation_token.is_cancelled());

        handler.stop().await.unwrap();
        assert!(handler.cancellation_token.is_cancelled());
    }
}
