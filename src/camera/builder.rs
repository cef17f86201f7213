use super::source::FrameSource;
use super::synthetic::SyntheticFrameSource;
use crate::config::CameraConfig;
use crate::error::{CameraError, SignspellError, Result};

/// Builder for the configured frame source
pub struct FrameSourceBuilder {
    config: Option<CameraConfig>,
}

impl FrameSourceBuilder {
    pub fn new() -> Self {
        Self { config: None }
    }

    pub fn config(mut self, config: CameraConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<Box<dyn FrameSource>> {
        let config = self
            .config
            .ok_or_else(|| SignspellError::system("Camera configuration must be specified"))?;

        if config.fps == 0 {
            return Err(CameraError::Configuration {
                details: "fps must be greater than 0".to_string(),
            }
            .into());
        }

        Ok(Box::new(SyntheticFrameSource::new(config)))
    }
}

impl Default for FrameSourceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
