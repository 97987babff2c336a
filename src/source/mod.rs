pub mod device;
pub mod frame;
pub mod manager;
pub mod synthetic;

pub use device::{
    CameraDevice, DepthSessionProvider, EndSignal, Facing, FrameStream, SessionCapabilities,
};
pub use frame::{Frame, SourceFrame};
pub use manager::{FrameSourceManager, FrameSourceState, SourceKind, SourceOutcome, StopReason};
