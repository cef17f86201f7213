//! Frame loop: frame source -> landmark detector -> {overlay, dispatcher} -> event bus.

mod detection_loop;

pub use detection_loop::{DetectionLoop, LoopStats, OverlayFrame, PipelineHandle};
