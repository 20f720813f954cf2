mod controller;
mod device;
mod facing;
mod platform;
mod selector;
mod store;
mod synthetic;
mod video;
#[cfg(test)]
mod tests;

pub use controller::{
    BufferReturn, CameraStreamController, CameraStreamControllerBuilder, ControllerSettings,
    FrameConsumer,
};
pub use device::{Camera, CameraEvent};
pub use facing::{facing_from_label, is_dual_wide, FacingMode};
pub use platform::{
    DeviceInfo, DeviceKind, MediaDevices, MediaStream, StreamConstraints, StreamSettings,
    TrackCapabilities, VideoResolution,
};
pub use selector::find_ideal_camera;
pub use store::{PlaybackState, StoreChange, StreamSnapshot, StreamStore};
pub use synthetic::{SyntheticDevice, SyntheticPlatform};
pub use video::VideoElement;
