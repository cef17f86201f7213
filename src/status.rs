use serde::{Deserialize, Serialize};
use std::fmt;

/// Detector and camera readiness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadinessStatus {
    Uninitialized,
    LoadingRuntime,
    LoadingModel,
    Ready,
    Error,
    CameraError,
}

impl ReadinessStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ReadinessStatus::Uninitialized => "INITIALIZING",
            ReadinessStatus::LoadingRuntime => "LOADING_RUNTIME",
            ReadinessStatus::LoadingModel => "LOADING_MODEL",
            ReadinessStatus::Ready => "READY",
            ReadinessStatus::Error => "ERROR",
            ReadinessStatus::CameraError => "CAMERA_ERROR",
        }
    }

    /// Error states do not recover without a restart
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReadinessStatus::Error | ReadinessStatus::CameraError)
    }
}

/// Classification service health as seen by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassifierHealth {
    Idle,
    Sending,
    Success,
    Offline,
}

impl ClassifierHealth {
    pub fn label(&self) -> &'static str {
        match self {
            ClassifierHealth::Idle => "IDLE",
            ClassifierHealth::Sending => "SENDING",
            ClassifierHealth::Success => "SUCCESS",
            ClassifierHealth::Offline => "API_OFFLINE",
        }
    }
}

/// Snapshot of the pipeline for status display
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineStatus {
    pub readiness: ReadinessStatus,
    pub classifier: ClassifierHealth,
    pub hand_present: bool,
    pub last_label: Option<String>,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self {
            readiness: ReadinessStatus::Uninitialized,
            classifier: ClassifierHealth::Idle,
            hand_present: false,
            last_label: None,
        }
    }
}

impl PipelineStatus {
    /// Hand confidence indicator, 10 with a hand in view and 0 without
    pub fn hand_confidence(&self) -> u8 {
        if self.hand_present {
            10
        } else {
            0
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "STATUS: {} | API: {}",
            self.readiness.label(),
            self.classifier.label()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line() {
        let mut status = PipelineStatus::default();
        assert_eq!(status.to_string(), "STATUS: INITIALIZING | API: IDLE");

        status.readiness = ReadinessStatus::Ready;
        status.classifier = ClassifierHealth::Offline;
        assert_eq!(status.to_string(), "STATUS: READY | API: API_OFFLINE");
    }

    #[test]
    fn test_terminal_states() {
        assert!(ReadinessStatus::Error.is_terminal());
        assert!(ReadinessStatus::CameraError.is_terminal());
        assert!(!ReadinessStatus::LoadingModel.is_terminal());
        assert!(!ReadinessStatus::Ready.is_terminal());
    }

    #[test]
    fn test_hand_confidence() {
        let mut status = PipelineStatus::default();
        assert_eq!(status.hand_confidence(), 0);
        status.hand_present = true;
        assert_eq!(status.hand_confidence(), 10);
    }
}
