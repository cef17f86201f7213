use crate::config::OverlayConfig;
use crate::error::{Result, SignspellError};
use crate::frame::FrameData;
use crate::landmark::{Landmark, Pose};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_circle_mut, draw_line_segment_mut};
use std::path::Path;
use tracing::{debug, info};

const LINE_COLOR: Rgba<u8> = Rgba([99, 102, 241, 255]);
const POINT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Draws the hand skeleton over frames
#[derive(Debug, Clone)]
pub struct OverlayRenderer {
    config: OverlayConfig,
}

impl OverlayRenderer {
    pub fn new(config: OverlayConfig) -> Self {
        Self { config }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Frame pixels with the skeleton drawn on top
    pub fn composite(&self, frame: &FrameData, pose: Option<&Pose>) -> Option<RgbaImage> {
        let mut image = frame.to_rgba_image()?;
        if self.config.enabled {
            if let Some(pose) = pose {
                self.draw_skeleton(&mut image, pose);
            }
        }
        Some(image)
    }

    fn draw_skeleton(&self, image: &mut RgbaImage, pose: &Pose) {
        let (width, height) = image.dimensions();
        let to_pixel = |landmark: &Landmark| (landmark.x * width as f32, landmark.y * height as f32);

        let thickness = self.config.line_thickness.max(1) as i32;
        for (from, to) in pose.connections() {
            draw_thick_line(image, to_pixel(from), to_pixel(to), thickness, LINE_COLOR);
        }

        let radius = self.config.point_radius as i32;
        for landmark in pose.landmarks() {
            let (x, y) = to_pixel(landmark);
            let center = (x.round() as i32, y.round() as i32);
            draw_filled_circle_mut(image, center, radius, POINT_COLOR);
            draw_hollow_circle_mut(image, center, radius, LINE_COLOR);
        }
    }

    /// Write a composited frame as PNG
    pub fn save_snapshot(image: &RgbaImage, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        image.save(path).map_err(|e| {
            SignspellError::component(
                "overlay",
                format!("Failed to write snapshot {}: {}", path.display(), e),
            )
        })?;

        info!("Overlay snapshot written to {}", path.display());
        Ok(())
    }
}

/// Line of `thickness` pixels, drawn as parallel one-pixel segments
fn draw_thick_line(
    image: &mut RgbaImage,
    start: (f32, f32),
    end: (f32, f32),
    thickness: i32,
    color: Rgba<u8>,
) {
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let length = (dx * dx + dy * dy).sqrt();
    if length < f32::EPSILON {
        debug!("Skipping zero-length skeleton segment");
        return;
    }

    let (nx, ny) = (-dy / length, dx / length);
    let half = thickness / 2;
    for step in -half..=(thickness - 1 - half) {
        let offset = step as f32;
        draw_line_segment_mut(
            image,
            (start.0 + nx * offset, start.1 + ny * offset),
            (end.0 + nx * offset, end.1 + ny * offset),
            color,
        );
    }
}
