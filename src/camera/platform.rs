use super::facing::FacingMode;
use crate::error::CameraError;
use crate::frame::VideoFrame;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Requested capture resolutions, tried from the requested one downwards
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum VideoResolution {
    #[serde(rename = "720p")]
    Hd720,
    #[serde(rename = "1080p")]
    FullHd1080,
    #[serde(rename = "4k")]
    #[default]
    Uhd4k,
}

impl VideoResolution {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            VideoResolution::Hd720 => (1280, 720),
            VideoResolution::FullHd1080 => (1920, 1080),
            VideoResolution::Uhd4k => (3840, 2160),
        }
    }

    /// This resolution followed by every lower one
    pub fn fallback_ladder(self) -> impl Iterator<Item = VideoResolution> {
        [
            VideoResolution::Uhd4k,
            VideoResolution::FullHd1080,
            VideoResolution::Hd720,
        ]
        .into_iter()
        .filter(move |r| *r <= self)
    }
}

impl fmt::Display for VideoResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VideoResolution::Hd720 => "720p",
            VideoResolution::FullHd1080 => "1080p",
            VideoResolution::Uhd4k => "4k",
        };
        f.write_str(s)
    }
}

impl FromStr for VideoResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "720p" => Ok(VideoResolution::Hd720),
            "1080p" => Ok(VideoResolution::FullHd1080),
            "4k" | "2160p" => Ok(VideoResolution::Uhd4k),
            other => Err(format!("Unknown resolution '{}'", other)),
        }
    }
}

/// Kinds of media devices reported by enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    VideoInput,
    AudioInput,
    AudioOutput,
}

/// One enumerated device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub group_id: String,
    pub kind: DeviceKind,
    pub label: String,
}

/// Parameters for opening a stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConstraints {
    pub device_id: String,
    pub width: u32,
    pub height: u32,
}

impl StreamConstraints {
    pub fn new(device_id: &str, resolution: VideoResolution) -> Self {
        let (width, height) = resolution.dimensions();
        Self {
            device_id: device_id.to_string(),
            width,
            height,
        }
    }
}

/// What the platform actually negotiated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSettings {
    pub device_id: String,
    pub width: u32,
    pub height: u32,
    /// `None` when the platform cannot tell
    pub facing: Option<FacingMode>,
}

/// Optional features of the video track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrackCapabilities {
    pub torch: bool,
    pub single_shot_focus: bool,
    pub max_width: u32,
    pub max_height: u32,
}

impl TrackCapabilities {
    /// Ranking used when several cameras face the right way
    pub fn score(&self) -> u32 {
        u32::from(self.torch) + u32::from(self.single_shot_focus)
    }
}

/// Device enumeration and stream acquisition
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn enumerate_devices(&self) -> Result<Vec<DeviceInfo>, CameraError>;

    async fn get_user_media(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Arc<dyn MediaStream>, CameraError>;
}

/// An open video track
#[async_trait]
pub trait MediaStream: Send + Sync {
    fn id(&self) -> &str;

    fn settings(&self) -> StreamSettings;

    fn capabilities(&self) -> TrackCapabilities;

    async fn set_torch(&self, on: bool) -> Result<(), CameraError>;

    /// Release the device. Further `next_frame` calls fail with `TrackEnded`.
    fn stop(&self);

    fn is_live(&self) -> bool;

    /// Wait for the next decoded frame
    async fn next_frame(&self) -> Result<VideoFrame, CameraError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_ladder() {
        let ladder: Vec<_> = VideoResolution::Uhd4k.fallback_ladder().collect();
        assert_eq!(
            ladder,
            vec![
                VideoResolution::Uhd4k,
                VideoResolution::FullHd1080,
                VideoResolution::Hd720
            ]
        );

        let ladder: Vec<_> = VideoResolution::FullHd1080.fallback_ladder().collect();
        assert_eq!(ladder, vec![VideoResolution::FullHd1080, VideoResolution::Hd720]);
    }

    #[test]
    fn test_resolution_parsing() {
        assert_eq!("4K".parse::<VideoResolution>(), Ok(VideoResolution::Uhd4k));
        assert_eq!(VideoResolution::Hd720.to_string(), "720p");
        assert!("8k".parse::<VideoResolution>().is_err());
    }

    #[test]
    fn test_capability_score() {
        let caps = TrackCapabilities {
            torch: true,
            single_shot_focus: true,
            ..Default::default()
        };
        assert_eq!(caps.score(), 2);
        assert_eq!(TrackCapabilities::default().score(), 0);
    }
}
