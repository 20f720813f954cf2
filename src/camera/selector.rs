use super::device::Camera;
use super::facing::{is_dual_wide, FacingMode};
use super::platform::VideoResolution;
use crate::error::CameraError;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pick the best camera for document scanning and leave it streaming.
///
/// Every camera opened along the way and rejected is stopped again, so
/// exactly one camera is streaming when this returns `Ok`.
pub async fn find_ideal_camera(
    cameras: &[Arc<Camera>],
    resolution: VideoResolution,
    facing: FacingMode,
) -> Result<Arc<Camera>, CameraError> {
    if cameras.is_empty() {
        return Err(CameraError::NoCameras);
    }

    if facing == FacingMode::Back {
        if let Some(camera) = cameras.iter().find(|c| is_dual_wide(c.name())) {
            info!("Using dual wide camera {}", camera.name());
            camera.start_stream(resolution).await?;
            return Ok(Arc::clone(camera));
        }
    }

    let matching: Vec<Arc<Camera>> = cameras
        .iter()
        .filter(|c| c.facing() == facing)
        .cloned()
        .collect();

    if matching.len() == 1 {
        let camera = &matching[0];
        debug!("Only {} faces {}", camera.name(), facing);
        camera.start_stream(resolution).await?;
        return Ok(Arc::clone(camera));
    }

    // Heuristic: most platforms enumerate the selfie camera last. Nothing in
    // the device metadata guarantees it.
    if facing == FacingMode::Front {
        if let Some(camera) = matching.last() {
            debug!("Picking last front camera {}", camera.name());
            camera.start_stream(resolution).await?;
            return Ok(Arc::clone(camera));
        }
    }

    let pool: &[Arc<Camera>] = if matching.is_empty() {
        cameras
    } else {
        &matching
    };

    let mut best: Option<(Arc<Camera>, u32)> = None;
    let mut last_error = None;

    for camera in pool.iter().rev() {
        let stream = match camera.start_stream(resolution).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Skipping camera {}: {}", camera.name(), e);
                last_error = Some(e);
                continue;
            }
        };

        // Opening the stream may have corrected the label-based guess
        match camera.facing() {
            FacingMode::Unknown => {
                // Likely a desktop webcam, take it as is
                debug!("Camera {} reports no facing, using it", camera.name());
                if let Some((previous, _)) = best.take() {
                    previous.stop_stream();
                }
                return Ok(Arc::clone(camera));
            }
            f if f != facing => {
                debug!("Camera {} faces {}, skipping", camera.name(), f);
                camera.stop_stream();
                continue;
            }
            _ => {}
        }

        let score = stream.capabilities().score();
        debug!("Camera {} scored {}", camera.name(), score);

        let better = best.as_ref().map_or(true, |(_, best_score)| score > *best_score);
        if better {
            if let Some((previous, _)) = best.replace((Arc::clone(camera), score)) {
                previous.stop_stream();
            }
        } else {
            camera.stop_stream();
        }
    }

    match best {
        Some((camera, score)) => {
            info!("Selected camera {} (score {})", camera.name(), score);
            Ok(camera)
        }
        None => Err(last_error.unwrap_or(CameraError::NoCameras)),
    }
}
