//! homegate-core — client-side face liveness gate for door access.
//!
//! Captured camera frames are checked by four pixel heuristics (sharpness,
//! lighting, skin-tone coverage, frame-to-frame motion) before anything is
//! sent to the remote face verification service. The scan controller drives
//! capture, gating, verification and the follow-up door control.

pub mod analyzers;
pub mod capture;
pub mod doors;
pub mod enroll;
pub mod frame;
pub mod history;
pub mod liveness;
pub mod remote;
pub mod scan;

pub use capture::{CameraError, FrameSource, StillFrames};
pub use enroll::{EnrollError, EnrollmentCapture};
pub use frame::{CaptureError, CapturedImage, DecodedFrame};
pub use history::FrameHistory;
pub use liveness::{LivenessChecks, LivenessResult};
pub use remote::{
    DeviceService, DoorAction, DoorLock, Enrollment, FaceService, Recognition, RoomRef,
    ServiceError, VerifyOutcome,
};
pub use scan::{CloseReason, ScanController, ScanEvent, ScanHandle, ScanPhase, ScanTimings};

#[cfg(test)]
mod testing;
