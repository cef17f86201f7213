//! Hand landmark data model.
//!
//! A [`Pose`] is one frame's set of 21 normalized hand landmarks. Poses are
//! validated on construction and never mutated afterwards; every frame yields
//! a fresh one.

use crate::error::DetectorError;
use serde::{Deserialize, Serialize};

/// Number of landmarks in one hand pose
pub const LANDMARK_COUNT: usize = 21;

/// Landmark index pairs joined when drawing the hand skeleton
pub const HAND_CONNECTIONS: [(usize, usize); 21] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (5, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (9, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (13, 17),
    (17, 18),
    (18, 19),
    (19, 20),
    (0, 17),
];

/// Normalized landmark coordinate, x and y relative to frame size
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f32>,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: Option<f32>) -> Self {
        Self { x, y, z }
    }

    fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.map_or(true, f32::is_finite)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Pose {
    landmarks: Vec<Landmark>,
}

impl Pose {
    pub fn new(landmarks: Vec<Landmark>) -> Result<Self, DetectorError> {
        if landmarks.len() != LANDMARK_COUNT {
            return Err(DetectorError::InvalidPose {
                details: format!(
                    "expected {} landmarks, got {}",
                    LANDMARK_COUNT,
                    landmarks.len()
                ),
            });
        }

        if let Some(index) = landmarks.iter().position(|l| !l.is_finite()) {
            return Err(DetectorError::InvalidPose {
                details: format!("landmark {} has a non-finite coordinate", index),
            });
        }

        Ok(Self { landmarks })
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    /// Landmark pairs for each skeleton connection
    pub fn connections(&self) -> impl Iterator<Item = (&Landmark, &Landmark)> + '_ {
        HAND_CONNECTIONS
            .iter()
            .map(move |&(a, b)| (&self.landmarks[a], &self.landmarks[b]))
    }
}

/// One detector result: a pose, or none when no hand is present
#[derive(Debug, Clone)]
pub struct DetectionFrame {
    pub pose: Option<Pose>,
    pub timestamp_ms: u64,
}

impl DetectionFrame {
    pub fn has_hand(&self) -> bool {
        self.pose.is_some()
    }
}

#[cfg(test)]
pub(crate) fn test_pose(offset: f32) -> Pose {
    let landmarks = (0..LANDMARK_COUNT)
        .map(|i| {
            let t = i as f32 / LANDMARK_COUNT as f32;
            Landmark::new((0.3 + t * 0.4 + offset).min(1.0), 0.2 + t * 0.6, Some(0.0))
        })
        .collect();
    Pose::new(landmarks).unwrap()
}
