use super::source::FrameSource;
use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::frame::{FrameData, FrameFormat};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, info};

/// Frame source producing a static dark gradient at the configured resolution.
///
/// Used together with the replay detector when no capture device is wired in;
/// every frame shares one pixel buffer.
pub struct SyntheticFrameSource {
    config: CameraConfig,
    background: Option<Arc<Vec<u8>>>,
    frame_counter: u64,
}

impl SyntheticFrameSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            background: None,
            frame_counter: 0,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    fn render_background(width: u32, height: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            let shade = 16 + (y * 32 / height.max(1)) as u8;
            for _ in 0..width {
                data.extend_from_slice(&[shade, shade, shade.saturating_add(8), 255]);
            }
        }
        data
    }
}

impl FrameSource for SyntheticFrameSource {
    fn open(&mut self) -> Result<(), CameraError> {
        let (width, height) = self.config.resolution;
        if width == 0 || height == 0 {
            return Err(CameraError::DeviceOpen {
                details: format!("unsupported resolution {}x{}", width, height),
            });
        }

        info!(
            "Opening synthetic frame source ({}x{} @ {}fps)",
            width, height, self.config.fps
        );
        self.background = Some(Arc::new(Self::render_background(width, height)));
        Ok(())
    }

    fn next_frame(&mut self) -> Option<FrameData> {
        let background = self.background.as_ref()?;
        self.frame_counter += 1;

        Some(FrameData::from_shared(
            self.frame_counter,
            SystemTime::now(),
            Arc::clone(background),
            self.config.resolution.0,
            self.config.resolution.1,
            FrameFormat::Rgba8,
        ))
    }

    fn release(&mut self) {
        if self.background.take().is_some() {
            debug!(
                "Synthetic frame source released after {} frames",
                self.frame_counter
            );
        }
    }

    fn is_open(&self) -> bool {
        self.background.is_some()
    }
}
