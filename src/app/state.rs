use super::{ComponentState, SignspellOrchestrator};
use std::collections::HashMap;
use tracing::debug;

impl SignspellOrchestrator {
    pub async fn set_component_state(&self, component: &str, state: ComponentState) {
        let previous = self
            .component_states
            .lock()
            .await
            .insert(component.to_string(), state.clone());
        debug!(
            "Component '{}': {:?} -> {:?}",
            component, previous, state
        );
    }

    pub async fn get_component_state(&self, component: &str) -> Option<ComponentState> {
        self.component_states.lock().await.get(component).cloned()
    }

    pub async fn get_all_component_states(&self) -> HashMap<String, ComponentState> {
        self.component_states.lock().await.clone()
    }

    /// Components that ended up `Failed`, sorted by name
    pub async fn failed_components(&self) -> Vec<String> {
        let states = self.component_states.lock().await;
        let mut failed: Vec<String> = states
            .iter()
            .filter(|(_, state)| **state == ComponentState::Failed)
            .map(|(name, _)| name.clone())
            .collect();
        failed.sort();
        failed
    }
}
