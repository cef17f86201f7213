mod replay;

pub use replay::{parse_recording, RecordedPose, ReplayDetector};

use crate::error::DetectorError;
use crate::frame::FrameData;
use crate::landmark::Pose;

/// Hand landmark detection capability.
///
/// Initialization happens in two stages so the loop can report progress:
/// `load_runtime` then `load_model`. `detect` is called at frame rate from the
/// blocking pool and returns at most one pose. A per-call error only means
/// "no pose this frame".
pub trait LandmarkDetector: Send + 'static {
    fn load_runtime(&mut self) -> Result<(), DetectorError>;

    fn load_model(&mut self) -> Result<(), DetectorError>;

    fn detect(&mut self, frame: &FrameData, timestamp_ms: u64)
        -> Result<Option<Pose>, DetectorError>;
}
