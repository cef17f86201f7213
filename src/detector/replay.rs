use super::LandmarkDetector;
use crate::config::DetectorConfig;
use crate::error::DetectorError;
use crate::frame::FrameData;
use crate::landmark::{Landmark, Pose};
use serde::Deserialize;
use std::path::PathBuf;
use tracing::{debug, info};

/// One entry of a pose recording
#[derive(Debug, Clone)]
pub struct RecordedPose {
    pub t_ms: u64,
    pub pose: Option<Pose>,
}

#[derive(Deserialize)]
struct RecordLine {
    t_ms: u64,
    #[serde(default)]
    landmarks: Option<Vec<Landmark>>,
}

/// Parse a JSON-lines pose recording.
///
/// Each line is `{"t_ms": <u64>, "landmarks": [..21 points..] | null}`.
/// Blank lines and lines starting with `#` are ignored. Entries are returned
/// sorted by time.
pub fn parse_recording(contents: &str) -> Result<Vec<RecordedPose>, DetectorError> {
    let mut entries = Vec::new();

    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let record: RecordLine =
            serde_json::from_str(line).map_err(|e| DetectorError::Model {
                details: format!("line {}: {}", index + 1, e),
            })?;

        let pose = match record.landmarks {
            Some(landmarks) => Some(Pose::new(landmarks).map_err(|e| DetectorError::Model {
                details: format!("line {}: {}", index + 1, e),
            })?),
            None => None,
        };

        entries.push(RecordedPose {
            t_ms: record.t_ms,
            pose,
        });
    }

    if entries.is_empty() {
        return Err(DetectorError::Model {
            details: "recording contains no poses".to_string(),
        });
    }

    entries.sort_by_key(|entry| entry.t_ms);
    Ok(entries)
}

/// Detector that plays back a recorded pose stream against detector time.
///
/// The first `detect` call anchors recording time zero; afterwards each call
/// returns the entry in effect at `timestamp_ms - origin`.
pub struct ReplayDetector {
    path: PathBuf,
    loop_playback: bool,
    source: Option<String>,
    entries: Vec<RecordedPose>,
    origin_ms: Option<u64>,
}

impl ReplayDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            path: PathBuf::from(&config.recording_path),
            loop_playback: config.loop_playback,
            source: None,
            entries: Vec::new(),
            origin_ms: None,
        }
    }

    /// Build a detector around already parsed entries
    pub fn from_entries(entries: Vec<RecordedPose>, loop_playback: bool) -> Self {
        Self {
            path: PathBuf::new(),
            loop_playback,
            source: None,
            entries,
            origin_ms: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn pose_at(&self, elapsed_ms: u64) -> Option<Pose> {
        let last_t = self.entries.last()?.t_ms;

        let position = if self.loop_playback {
            // A recording ending at u64::MAX never wraps
            match last_t.checked_add(1) {
                Some(span) => elapsed_ms % span,
                None => elapsed_ms,
            }
        } else if elapsed_ms > last_t {
            return None;
        } else {
            elapsed_ms
        };

        let index = self.entries.partition_point(|entry| entry.t_ms <= position);
        if index == 0 {
            return None;
        }
        self.entries[index - 1].pose.clone()
    }
}

impl LandmarkDetector for ReplayDetector {
    fn load_runtime(&mut self) -> Result<(), DetectorError> {
        if !self.entries.is_empty() {
            return Ok(());
        }

        debug!("Reading pose recording {}", self.path.display());
        let contents = std::fs::read_to_string(&self.path).map_err(|e| DetectorError::Runtime {
            details: format!("{}: {}", self.path.display(), e),
        })?;
        self.source = Some(contents);
        Ok(())
    }

    fn load_model(&mut self) -> Result<(), DetectorError> {
        if !self.entries.is_empty() {
            return Ok(());
        }

        let contents = self.source.take().ok_or_else(|| DetectorError::Model {
            details: "runtime not loaded".to_string(),
        })?;
        self.entries = parse_recording(&contents)?;

        info!(
            "Loaded pose recording with {} entries spanning {} ms",
            self.entries.len(),
            self.entries.last().map(|e| e.t_ms).unwrap_or(0)
        );
        Ok(())
    }

    fn detect(
        &mut self,
        frame: &FrameData,
        timestamp_ms: u64,
    ) -> Result<Option<Pose>, DetectorError> {
        if self.entries.is_empty() {
            return Err(DetectorError::Inference {
                details: "model not loaded".to_string(),
            });
        }

        if !frame.validate_size() {
            return Err(DetectorError::Inference {
                details: format!(
                    "frame {} has {} bytes, expected {}",
                    frame.id,
                    frame.data.len(),
                    frame.expected_size()
                ),
            });
        }

        let origin = *self.origin_ms.get_or_insert(timestamp_ms);
        Ok(self.pose_at(timestamp_ms.saturating_sub(origin)))
    }
}
