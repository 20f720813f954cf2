use super::*;
use crate::error::{CameraError, DocscanError};
use crate::frame::ImageData;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn platform(devices: Vec<SyntheticDevice>) -> Arc<SyntheticPlatform> {
    Arc::new(SyntheticPlatform::new(devices).with_frame_interval(Duration::from_millis(10)))
}

async fn cameras_for(platform: &Arc<SyntheticPlatform>) -> Vec<Arc<Camera>> {
    let devices: Arc<dyn MediaDevices> = platform.clone();
    platform
        .enumerate_devices()
        .await
        .unwrap()
        .iter()
        .map(|info| Arc::new(Camera::new(info, Arc::clone(&devices))))
        .collect()
}

fn controller_for(platform: &Arc<SyntheticPlatform>) -> CameraStreamController {
    CameraStreamControllerBuilder::new()
        .devices(platform.clone())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_selects_most_capable_back_camera() {
    let platform = platform(vec![
        SyntheticDevice::new("basic", "Back Camera Basic"),
        SyntheticDevice::new("advanced", "Back Camera Advanced")
            .with_torch()
            .with_single_shot_focus(),
        SyntheticDevice::new("mid", "Back Camera Mid").with_torch(),
    ]);
    let cameras = cameras_for(&platform).await;

    let chosen = find_ideal_camera(&cameras, VideoResolution::Uhd4k, FacingMode::Back)
        .await
        .unwrap();

    assert_eq!(chosen.device_id(), "advanced");
    assert!(chosen.is_streaming());
    // Every trial stream except the winner's was stopped
    assert_eq!(platform.live_devices(), vec!["advanced".to_string()]);
    assert!(!cameras[0].is_streaming());
    assert!(!cameras[2].is_streaming());
}

#[tokio::test]
async fn test_dual_wide_camera_short_circuits() {
    let platform = platform(vec![
        SyntheticDevice::new("triple", "Back Triple Camera")
            .with_torch()
            .with_single_shot_focus(),
        SyntheticDevice::new("dual", "Back Dual Wide Camera"),
    ]);
    let cameras = cameras_for(&platform).await;

    let chosen = find_ideal_camera(&cameras, VideoResolution::Uhd4k, FacingMode::Back)
        .await
        .unwrap();
    assert_eq!(chosen.device_id(), "dual");
    assert_eq!(platform.open_request_count(), 1);
}

#[tokio::test]
async fn test_single_matching_camera_is_used() {
    let platform = platform(vec![
        SyntheticDevice::new("front", "Front Camera"),
        SyntheticDevice::new("back", "Back Camera"),
    ]);
    let cameras = cameras_for(&platform).await;

    let chosen = find_ideal_camera(&cameras, VideoResolution::Uhd4k, FacingMode::Back)
        .await
        .unwrap();
    assert_eq!(chosen.device_id(), "back");
    assert_eq!(platform.live_devices(), vec!["back".to_string()]);
}

#[tokio::test]
async fn test_front_request_takes_last_front_camera() {
    let platform = platform(vec![
        SyntheticDevice::new("front1", "Front Camera 1"),
        SyntheticDevice::new("front2", "Front Camera 2"),
        SyntheticDevice::new("back", "Back Camera"),
    ]);
    let cameras = cameras_for(&platform).await;

    let chosen = find_ideal_camera(&cameras, VideoResolution::Hd720, FacingMode::Front)
        .await
        .unwrap();
    assert_eq!(chosen.device_id(), "front2");
    assert_eq!(platform.open_request_count(), 1);
}

#[tokio::test]
async fn test_unknown_facing_camera_returned_immediately() {
    let platform = platform(vec![
        SyntheticDevice::new("usb", "USB Webcam"),
        SyntheticDevice::new("hd", "HD Camera"),
    ]);
    let cameras = cameras_for(&platform).await;

    let chosen = find_ideal_camera(&cameras, VideoResolution::Hd720, FacingMode::Back)
        .await
        .unwrap();
    // Reverse enumeration order: the last camera is tried first
    assert_eq!(chosen.device_id(), "hd");
    assert_eq!(platform.live_devices(), vec!["hd".to_string()]);
}

#[tokio::test]
async fn test_facing_corrected_from_stream_settings() {
    let platform = platform(vec![
        SyntheticDevice::new("liar", "Back Camera 0")
            .reports_facing(FacingMode::Front)
            .with_torch()
            .with_single_shot_focus(),
        SyntheticDevice::new("honest", "Back Camera 1").reports_facing(FacingMode::Back),
    ]);
    let cameras = cameras_for(&platform).await;

    let corrections = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&corrections);
    let _sub = cameras[0].subscribe(move |event| {
        if matches!(event, CameraEvent::FacingCorrected(FacingMode::Front)) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let chosen = find_ideal_camera(&cameras, VideoResolution::Hd720, FacingMode::Back)
        .await
        .unwrap();
    assert_eq!(chosen.device_id(), "honest");
    assert_eq!(cameras[0].facing(), FacingMode::Front);
    assert_eq!(corrections.load(Ordering::SeqCst), 1);
    assert_eq!(platform.live_devices(), vec!["honest".to_string()]);
}

#[tokio::test]
async fn test_empty_camera_list_fails() {
    let result = find_ideal_camera(&[], VideoResolution::Hd720, FacingMode::Back).await;
    assert_eq!(result.unwrap_err(), CameraError::NoCameras);
}

#[tokio::test]
async fn test_failing_camera_error_propagates() {
    let platform = platform(vec![
        SyntheticDevice::new("back", "Back Camera").failing(CameraError::PermissionDenied)
    ]);
    let cameras = cameras_for(&platform).await;

    let result = find_ideal_camera(&cameras, VideoResolution::Hd720, FacingMode::Back).await;
    assert_eq!(result.unwrap_err(), CameraError::PermissionDenied);
}

#[tokio::test]
async fn test_resolution_ladder_fallback() {
    let platform = platform(vec![
        SyntheticDevice::new("old", "Back Camera").max_resolution(VideoResolution::Hd720)
    ]);
    let cameras = cameras_for(&platform).await;

    let stream = cameras[0].start_stream(VideoResolution::Uhd4k).await.unwrap();
    assert_eq!(stream.settings().width, 1280);
    assert_eq!(cameras[0].resolution(), Some(VideoResolution::Hd720));
    assert_eq!(platform.open_request_count(), 3);

    // Already streaming: no new request
    cameras[0].start_stream(VideoResolution::Uhd4k).await.unwrap();
    assert_eq!(platform.open_request_count(), 3);
}

#[test]
fn test_controller_builder_validation() {
    let result = CameraStreamControllerBuilder::new().build();

    if let Err(DocscanError::System { message }) = result {
        assert!(message.contains("Media devices must be specified"));
    } else {
        panic!("Expected system error for missing media devices");
    }
}

#[tokio::test]
async fn test_refresh_reuses_camera_handles() {
    let platform = platform(vec![SyntheticDevice::new("back", "Back Camera")]);
    let controller = controller_for(&platform);

    let first = controller.refresh_cameras().await.unwrap();
    platform.add_device(SyntheticDevice::new("front", "Front Camera"));
    let second = controller.refresh_cameras().await.unwrap();

    assert_eq!(second.len(), 2);
    assert!(Arc::ptr_eq(&first[0], &second[0]));
    assert!(!controller.store().snapshot().is_querying);
}

#[tokio::test(start_paused = true)]
async fn test_capture_lifecycle() {
    let platform = platform(vec![SyntheticDevice::new("back", "Back Camera")]);
    let controller = controller_for(&platform);

    let frames = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&frames);
    let _sub = controller.add_frame_callback(move |image: &ImageData| {
        assert_eq!(image.data.len(), ImageData::byte_len(image.width, image.height));
        counter.fetch_add(1, Ordering::SeqCst);
    });

    controller.start_camera_stream().await.unwrap();
    assert_eq!(controller.playback_state(), PlaybackState::Playback);

    controller.start_frame_capture().await.unwrap();
    assert_eq!(controller.playback_state(), PlaybackState::Capturing);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(frames.load(Ordering::SeqCst) > 0);
    // Without a consumer every buffer goes straight back
    assert!(!controller.buffer_return().is_detached());

    controller.stop_frame_capture();
    assert_eq!(controller.playback_state(), PlaybackState::Playback);
    let delivered = frames.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(frames.load(Ordering::SeqCst), delivered);

    controller.pause_playback();
    assert_eq!(controller.playback_state(), PlaybackState::Idle);
    let camera = controller.selected_camera().unwrap();
    assert!(camera.is_streaming(), "pausing keeps the device open");

    controller.release_camera();
    assert!(!camera.is_streaming());
    assert!(platform.live_devices().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_camera_swap_resumes_capture() {
    let platform = platform(vec![
        SyntheticDevice::new("back", "Back Camera"),
        SyntheticDevice::new("front", "Front Camera"),
    ]);
    let controller = controller_for(&platform);
    controller.start_frame_capture().await.unwrap();
    assert_eq!(controller.selected_camera().unwrap().device_id(), "back");
    assert!(!controller.store().snapshot().mirror_x);

    let front = controller
        .store()
        .cameras()
        .into_iter()
        .find(|c| c.device_id() == "front")
        .unwrap();
    controller.select_camera(front).await.unwrap();

    let snapshot = controller.store().snapshot();
    assert_eq!(snapshot.playback_state, PlaybackState::Capturing);
    assert_eq!(snapshot.resume_request, None);
    assert!(!snapshot.is_swapping);
    assert!(snapshot.mirror_x, "front camera is mirrored");
    assert_eq!(platform.live_devices(), vec!["front".to_string()]);
}

#[tokio::test]
async fn test_concurrent_swap_rejected() {
    let platform = platform(vec![SyntheticDevice::new("back", "Back Camera")]);
    let controller = controller_for(&platform);
    let cameras = controller.refresh_cameras().await.unwrap();

    controller.store().update(|s| s.is_swapping = true);
    let result = controller.select_camera(Arc::clone(&cameras[0])).await;
    assert_eq!(result.unwrap_err(), CameraError::SwapInProgress);
    assert!(controller.selected_camera().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_visibility_round_trip() {
    let platform = platform(vec![SyntheticDevice::new("back", "Back Camera")]);
    let controller = controller_for(&platform);
    controller.start_frame_capture().await.unwrap();

    controller.handle_visibility_change(false).await.unwrap();
    let snapshot = controller.store().snapshot();
    assert_eq!(snapshot.playback_state, PlaybackState::Idle);
    assert_eq!(snapshot.resume_request, Some(PlaybackState::Capturing));
    assert!(platform.live_devices().is_empty());

    let delivered = controller.frames_delivered();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(controller.frames_delivered(), delivered);

    controller.handle_visibility_change(true).await.unwrap();
    assert_eq!(controller.playback_state(), PlaybackState::Capturing);
    assert_eq!(platform.live_devices().len(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(controller.frames_delivered() > delivered);
}

#[tokio::test(start_paused = true)]
async fn test_capture_requested_while_hidden_waits_for_visibility() {
    let platform = platform(vec![SyntheticDevice::new("back", "Back Camera")]);
    let controller = controller_for(&platform);
    controller.start_camera_stream().await.unwrap();

    controller.handle_visibility_change(false).await.unwrap();
    assert_eq!(
        controller.store().snapshot().resume_request,
        Some(PlaybackState::Playback)
    );

    controller.start_frame_capture().await.unwrap();
    let snapshot = controller.store().snapshot();
    assert_eq!(snapshot.playback_state, PlaybackState::Idle);
    assert_eq!(snapshot.resume_request, Some(PlaybackState::Capturing));
    assert!(platform.live_devices().is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(controller.frames_delivered(), 0);

    controller.handle_visibility_change(true).await.unwrap();
    assert_eq!(controller.playback_state(), PlaybackState::Capturing);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(controller.frames_delivered() > 0);
}

#[tokio::test(start_paused = true)]
async fn test_track_end_reported() {
    let platform = platform(vec![SyntheticDevice::new("back", "Back Camera")]);
    let controller = controller_for(&platform);

    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let _sub = controller.add_error_callback(move |e| sink.lock().push(e.clone()));

    controller.start_frame_capture().await.unwrap();
    platform.end_all_tracks();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(controller.playback_state(), PlaybackState::Idle);
    assert_eq!(
        *errors.lock(),
        vec![CameraError::TrackEnded {
            device: "back".to_string()
        }]
    );
    assert!(controller.store().snapshot().error.is_some());
}

#[tokio::test]
async fn test_permission_denied_reported_once() {
    let platform = platform(vec![SyntheticDevice::new("back", "Back Camera")]);
    platform.deny_permission(true);
    let controller = controller_for(&platform);

    let errors = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&errors);
    let _sub = controller.add_error_callback(move |e| {
        assert_eq!(*e, CameraError::PermissionDenied);
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let result = controller.start_camera_stream().await;
    assert_eq!(result.unwrap_err(), CameraError::PermissionDenied);
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert!(!controller.store().snapshot().is_querying);
}

#[tokio::test(start_paused = true)]
async fn test_abort_stream_start_resets_quietly() {
    let platform = Arc::new(
        SyntheticPlatform::new(vec![SyntheticDevice::new("back", "Back Camera")])
            .with_open_delay(Duration::from_millis(50)),
    );
    let controller = controller_for(&platform);

    let errors = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&errors);
    let _sub = controller.add_error_callback(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let starter = controller.clone();
    let pending = tokio::spawn(async move { starter.start_camera_stream().await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    controller.abort_stream_start();

    assert!(pending.await.unwrap().is_ok());
    assert_eq!(controller.playback_state(), PlaybackState::Idle);
    assert!(!controller.video().has_source());
    assert!(platform.live_devices().is_empty());
    assert_eq!(errors.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_set_resolution_restarts_stream() {
    let platform = platform(vec![SyntheticDevice::new("back", "Back Camera")]);
    let controller = controller_for(&platform);
    controller.start_frame_capture().await.unwrap();
    let camera = controller.selected_camera().unwrap();
    assert_eq!(camera.resolution(), Some(VideoResolution::Uhd4k));

    controller
        .set_resolution(VideoResolution::Hd720)
        .await
        .unwrap();
    assert_eq!(camera.resolution(), Some(VideoResolution::Hd720));
    assert_eq!(controller.playback_state(), PlaybackState::Capturing);
    assert_eq!(platform.live_devices().len(), 1);
}

#[tokio::test]
async fn test_torch_toggle() {
    let platform = platform(vec![
        SyntheticDevice::new("back", "Back Camera").with_torch(),
        SyntheticDevice::new("front", "Front Camera"),
    ]);
    let controller = controller_for(&platform);
    controller.start_camera_stream().await.unwrap();

    assert!(controller.toggle_torch().await.unwrap());
    assert!(platform.torch_on("back"));
    assert!(!controller.toggle_torch().await.unwrap());
    assert!(!platform.torch_on("back"));

    let front = controller
        .store()
        .cameras()
        .into_iter()
        .find(|c| c.device_id() == "front")
        .unwrap();
    controller.select_camera(front).await.unwrap();
    assert!(matches!(
        controller.toggle_torch().await,
        Err(CameraError::Platform { .. })
    ));
}

struct RecordingConsumer {
    sizes: Mutex<Vec<(u32, u32)>>,
}

impl FrameConsumer for RecordingConsumer {
    fn on_frame(&self, image: ImageData, buffers: BufferReturn) {
        self.sizes.lock().push((image.width, image.height));
        buffers.reattach(image.into_data()).unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_frame_consumer_gets_visible_area() {
    let platform = Arc::new(
        SyntheticPlatform::new(vec![SyntheticDevice::new("back", "Back Camera")])
            .with_frame_size(64, 48)
            .with_frame_interval(Duration::from_millis(10)),
    );
    let controller = controller_for(&platform);
    controller.video().set_view_size(Some((100, 100)));

    let consumer = Arc::new(RecordingConsumer {
        sizes: Mutex::new(Vec::new()),
    });
    controller.set_frame_consumer(Some(consumer.clone()));

    controller.start_frame_capture().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    controller.stop_frame_capture();

    let sizes = consumer.sizes.lock().clone();
    assert!(!sizes.is_empty());
    // Square viewport over a 4:3 frame shows a centered 48x48 crop
    assert!(sizes.iter().all(|s| *s == (48, 48)));
    assert!(!controller.buffer_return().is_detached());
}
