use super::*;
use crate::config::CameraConfig;
use crate::error::{CameraError, SignspellError};

fn create_test_camera_config() -> CameraConfig {
    CameraConfig {
        fps: 30,
        resolution: (64, 48),
    }
}

#[test]
fn test_synthetic_source_lifecycle() {
    let mut source = SyntheticFrameSource::new(create_test_camera_config());
    assert!(!source.is_open());
    assert!(source.next_frame().is_none());

    source.open().unwrap();
    assert!(source.is_open());

    let first = source.next_frame().unwrap();
    let second = source.next_frame().unwrap();
    assert_eq!((first.width, first.height), (64, 48));
    assert!(first.validate_size());
    assert!(second.id > first.id);
    assert_eq!(source.frame_count(), 2);

    source.release();
    source.release();
    assert!(!source.is_open());
    assert!(source.next_frame().is_none());
}

#[test]
fn test_synthetic_source_rejects_zero_resolution() {
    let mut source = SyntheticFrameSource::new(CameraConfig {
        fps: 30,
        resolution: (0, 48),
    });

    assert!(matches!(
        source.open(),
        Err(CameraError::DeviceOpen { .. })
    ));
    assert!(!source.is_open());
}

#[test]
fn test_frame_source_builder() {
    let mut source = FrameSourceBuilder::new()
        .config(create_test_camera_config())
        .build()
        .unwrap();

    source.open().unwrap();
    assert!(source.next_frame().is_some());
}

#[test]
fn test_frame_source_builder_validation() {
    let result = FrameSourceBuilder::new().build();

    if let Err(SignspellError::System { message }) = result {
        assert!(message.contains("Camera configuration must be specified"));
    } else {
        panic!("Expected system error for missing configuration");
    }

    let result = FrameSourceBuilder::new()
        .config(CameraConfig {
            fps: 0,
            resolution: (64, 48),
        })
        .build();
    assert!(matches!(
        result,
        Err(SignspellError::Camera(CameraError::Configuration { .. }))
    ));
}
