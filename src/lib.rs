pub mod app;
pub mod camera;
pub mod classifier;
pub mod config;
pub mod detector;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod frame;
pub mod keyboard_input;
pub mod landmark;
pub mod overlay;
pub mod pipeline;
pub mod speller;
pub mod stability;
pub mod status;

pub use app::{ComponentState, ShutdownReason, SignspellOrchestrator};
pub use camera::{FrameSource, FrameSourceBuilder, SyntheticFrameSource};
pub use classifier::{HttpClassifier, LabelClassifier};
pub use config::SignspellConfig;
pub use detector::{LandmarkDetector, ReplayDetector};
pub use dispatcher::{ClassificationDispatcher, DispatchDecision};
pub use error::{Result, SignspellError};
pub use events::{EventBus, EventFilter, EventMetrics, SignEvent, SpellingCommand, Subscription};
pub use frame::{FrameData, FrameFormat};
pub use landmark::{Landmark, Pose, HAND_CONNECTIONS, LANDMARK_COUNT};
pub use overlay::OverlayRenderer;
pub use pipeline::{DetectionLoop, LoopStats, PipelineHandle};
pub use speller::{Speller, SpellerIntegration, SpellingBuffer};
pub use stability::{StabilityAutomaton, StabilityState};
pub use status::{ClassifierHealth, PipelineStatus, ReadinessStatus};
