use thiserror::Error;

#[derive(Error, Debug)]
pub enum SignspellError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl SignspellError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Frame source (camera) failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CameraError {
    #[error("Failed to open frame source: {details}")]
    DeviceOpen { details: String },

    #[error("Invalid frame source configuration: {details}")]
    Configuration { details: String },
}

/// Landmark detector failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    #[error("Detector runtime failed to load: {details}")]
    Runtime { details: String },

    #[error("Detector model failed to load: {details}")]
    Model { details: String },

    #[error("Detection failed: {details}")]
    Inference { details: String },

    #[error("Invalid pose: {details}")]
    InvalidPose { details: String },
}

/// Classification service failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifierError {
    #[error("Classification request failed: {0}")]
    Transport(String),

    #[error("Classification request timed out")]
    Timeout,

    #[error("Classification service returned status {0}")]
    Status(u16),

    #[error("Failed to decode classification response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ClassifierError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClassifierError::Timeout
        } else if let Some(status) = e.status() {
            ClassifierError::Status(status.as_u16())
        } else if e.is_decode() {
            ClassifierError::Decode(e.to_string())
        } else {
            ClassifierError::Transport(e.to_string())
        }
    }
}

/// Event bus failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventBusError {
    #[error("Event bus channel closed")]
    ChannelClosed,

    #[error("Subscriber lagged behind by {skipped} events")]
    Lagged { skipped: u64 },

    #[error("Subscription '{name}' is no longer active")]
    Unsubscribed { name: String },
}

pub type Result<T> = std::result::Result<T, SignspellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_error_message() {
        let err = SignspellError::component("speller", "task panicked");
        assert_eq!(err.to_string(), "Component error in speller: task panicked");
    }

    #[test]
    fn test_nested_errors_convert() {
        let err: SignspellError = ClassifierError::Status(503).into();
        assert!(matches!(
            err,
            SignspellError::Classifier(ClassifierError::Status(503))
        ));
        assert!(err.to_string().contains("503"));

        let err: SignspellError = CameraError::DeviceOpen {
            details: "no device".to_string(),
        }
        .into();
        assert!(err.to_string().contains("no device"));
    }
}
