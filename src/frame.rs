use image::{DynamicImage, ImageBuffer, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// Pixel layout of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// 8-bit RGBA, 4 bytes per pixel
    Rgba8,
    /// 8-bit RGB, 3 bytes per pixel
    Rgb24,
}

impl FrameFormat {
    /// Get bytes per pixel for the format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            FrameFormat::Rgba8 => 4,
            FrameFormat::Rgb24 => 3,
        }
    }
}

/// Frame data structure containing raw frame data and metadata
#[derive(Debug, Clone)]
pub struct FrameData {
    /// Unique frame identifier
    pub id: u64,
    /// Timestamp when frame was captured
    pub timestamp: SystemTime,
    /// Raw pixel data (shared ownership for efficiency)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frame format
    pub format: FrameFormat,
}

impl FrameData {
    /// Create a new frame data instance
    pub fn new(
        id: u64,
        timestamp: SystemTime,
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self::from_shared(id, timestamp, Arc::new(data), width, height, format)
    }

    /// Create a frame around an already shared pixel buffer
    pub fn from_shared(
        id: u64,
        timestamp: SystemTime,
        data: Arc<Vec<u8>>,
        width: u32,
        height: u32,
        format: FrameFormat,
    ) -> Self {
        Self {
            id,
            timestamp,
            data,
            width,
            height,
            format,
        }
    }

    pub fn expected_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Validate frame data size against expected size
    pub fn validate_size(&self) -> bool {
        self.data.len() == self.expected_size()
    }

    /// Get frame age in milliseconds
    pub fn age_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.timestamp)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Copy the pixels into an RGBA image, `None` if the buffer size is wrong
    pub fn to_rgba_image(&self) -> Option<RgbaImage> {
        if !self.validate_size() {
            return None;
        }

        match self.format {
            FrameFormat::Rgba8 => {
                ImageBuffer::from_raw(self.width, self.height, self.data.as_ref().clone())
            }
            FrameFormat::Rgb24 => {
                let rgb: RgbImage =
                    ImageBuffer::from_raw(self.width, self.height, self.data.as_ref().clone())?;
                Some(DynamicImage::ImageRgb8(rgb).to_rgba8())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_frame_format_properties() {
        assert_eq!(FrameFormat::Rgba8.bytes_per_pixel(), 4);
        assert_eq!(FrameFormat::Rgb24.bytes_per_pixel(), 3);
    }

    #[test]
    fn test_frame_size_validation() {
        let valid = FrameData::new(
            1,
            SystemTime::now(),
            vec![0u8; 64 * 48 * 3],
            64,
            48,
            FrameFormat::Rgb24,
        );
        assert!(valid.validate_size());

        let invalid = FrameData::new(2, SystemTime::now(), vec![0u8; 100], 64, 48, FrameFormat::Rgba8);
        assert!(!invalid.validate_size());
        assert!(invalid.to_rgba_image().is_none());
    }

    #[test]
    fn test_rgb_frame_converts_to_rgba() {
        let mut data = vec![0u8; 2 * 2 * 3];
        data[0] = 200;
        data[1] = 10;
        data[2] = 30;
        let frame = FrameData::new(1, SystemTime::now(), data, 2, 2, FrameFormat::Rgb24);

        let image = frame.to_rgba_image().unwrap();
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.get_pixel(0, 0).0, [200, 10, 30, 255]);
    }

    #[test]
    fn test_shared_buffer_is_not_copied() {
        let shared = Arc::new(vec![7u8; 4 * 4 * 4]);
        let a = FrameData::from_shared(1, SystemTime::now(), Arc::clone(&shared), 4, 4, FrameFormat::Rgba8);
        let b = FrameData::from_shared(2, SystemTime::now(), Arc::clone(&shared), 4, 4, FrameFormat::Rgba8);

        assert!(Arc::ptr_eq(&a.data, &b.data));
    }

    #[test]
    fn test_frame_age() {
        let past = SystemTime::now() - Duration::from_millis(100);
        let frame = FrameData::new(1, past, vec![0u8; 4], 1, 1, FrameFormat::Rgba8);

        assert!(frame.age_ms() >= 100);
    }
}
