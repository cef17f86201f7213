//! Stability consensus over the raw label stream.
//!
//! Classification labels are noisy: a held sign may flicker to a neighbour
//! for a frame, and a sign held for seconds would otherwise be appended on
//! every response. [`StabilityAutomaton`] commits a label only after
//! `threshold` identical observations in a row, and never twice within
//! `append_cooldown_ms` of the previous commit.
//!
//! Transitions on observing `L` at `t`:
//!
//! 1. `L` is none: back to `Idle`.
//! 2. `L` equals the candidate: count + 1.
//! 3. otherwise: candidate becomes `L` with count 1.
//! 4. if count reached the threshold and the cooldown has passed, commit `L`,
//!    remember `t`, and restart the count at 0 while keeping the candidate.
//!
//! Observations are processed in arrival order; there is no reordering by
//! request time.

use crate::config::StabilityConfig;
use tracing::{debug, trace};

/// Placeholder label shown when nothing is classified
pub const NONE_SENTINEL: &str = "—";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StabilityState {
    Idle,
    Tracking { label: String, count: u32 },
}

#[derive(Debug, Clone)]
pub struct StabilityAutomaton {
    state: StabilityState,
    last_commit_ms: Option<u64>,
    threshold: u32,
    append_cooldown_ms: u64,
}

impl StabilityAutomaton {
    pub fn new(threshold: u32, append_cooldown_ms: u64) -> Self {
        Self {
            state: StabilityState::Idle,
            last_commit_ms: None,
            threshold: threshold.max(1),
            append_cooldown_ms,
        }
    }

    pub fn from_config(config: &StabilityConfig) -> Self {
        Self::new(config.threshold, config.append_cooldown_ms)
    }

    /// Feed one observation; returns the committed symbol, if any
    pub fn observe(&mut self, label: Option<&str>, at_ms: u64) -> Option<String> {
        let Some(label) = normalize(label) else {
            if self.state != StabilityState::Idle {
                trace!("No label observed, run broken");
            }
            self.state = StabilityState::Idle;
            return None;
        };

        match &mut self.state {
            StabilityState::Tracking {
                label: candidate,
                count,
            } if candidate.as_str() == label => *count += 1,
            state => {
                *state = StabilityState::Tracking {
                    label: label.to_string(),
                    count: 1,
                }
            }
        }

        if self.count() < self.threshold || !self.cooldown_elapsed(at_ms) {
            return None;
        }

        self.last_commit_ms = Some(at_ms);
        if let StabilityState::Tracking { count, .. } = &mut self.state {
            *count = 0;
        }
        debug!("Label '{}' stable, committing at {} ms", label, at_ms);

        Some(label.to_string())
    }

    fn cooldown_elapsed(&self, at_ms: u64) -> bool {
        match self.last_commit_ms {
            None => true,
            Some(last) => at_ms.saturating_sub(last) > self.append_cooldown_ms,
        }
    }

    pub fn state(&self) -> &StabilityState {
        &self.state
    }

    pub fn candidate(&self) -> Option<&str> {
        match &self.state {
            StabilityState::Idle => None,
            StabilityState::Tracking { label, .. } => Some(label),
        }
    }

    pub fn count(&self) -> u32 {
        match &self.state {
            StabilityState::Idle => 0,
            StabilityState::Tracking { count, .. } => *count,
        }
    }

    pub fn last_commit_ms(&self) -> Option<u64> {
        self.last_commit_ms
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }
}

fn normalize(label: Option<&str>) -> Option<&str> {
    let label = label?.trim();
    if label.is_empty() || label == NONE_SENTINEL {
        None
    } else {
        Some(label)
    }
}
