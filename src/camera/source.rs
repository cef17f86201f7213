use crate::error::CameraError;
use crate::frame::FrameData;

/// Supplier of video frames for the detection loop.
///
/// `open` acquires the device; a failure there is a camera acquisition
/// failure and the loop reports it as a terminal status. `next_frame` is
/// polled once per tick and only the most recent frame is ever requested.
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<(), CameraError>;

    /// Latest available frame, `None` when nothing new is ready
    fn next_frame(&mut self) -> Option<FrameData>;

    /// Release the device; safe to call more than once
    fn release(&mut self);

    fn is_open(&self) -> bool;
}
