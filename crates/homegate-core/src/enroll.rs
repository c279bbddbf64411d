//! Manual-capture enrollment.
//!
//! Unlike verification there is no polling loop: each capture runs one
//! liveness check. A rejected capture is reported with its reason and the
//! operator has to capture again.

use thiserror::Error;

use crate::capture::{self, CameraError, FrameSource};
use crate::frame::{CaptureError, CapturedImage, DEFAULT_JPEG_QUALITY};
use crate::history::FrameHistory;
use crate::liveness::{self, LivenessResult};
use crate::remote::{Enrollment, FaceService, ServiceError};

#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("select a user to enroll")]
    MissingUser,
    #[error("select at least one room")]
    MissingRooms,
    #[error("capture an image first")]
    NoCapture,
    #[error("camera returned no frame")]
    CaptureFailed,
    #[error("spoofing detected ({}% confidence): {}", .0.confidence, .0.message)]
    Rejected(LivenessResult),
    #[error("invalid upload: {0}")]
    InvalidUpload(#[from] CaptureError),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("enrollment failed: {0}")]
    Service(#[from] ServiceError),
}

/// Capture state of the enrollment dialog.
pub struct EnrollmentCapture<S> {
    source: S,
    quality: u8,
    history: FrameHistory,
    captured: Option<CapturedImage>,
    last_check: Option<LivenessResult>,
}

impl<S: FrameSource> EnrollmentCapture<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            quality: DEFAULT_JPEG_QUALITY,
            history: FrameHistory::new(),
            captured: None,
            last_check: None,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.quality = quality;
        self
    }

    /// Open the camera, releasing any previous stream first.
    pub fn start(&mut self) -> Result<(), EnrollError> {
        self.source.stop();
        self.history.clear();
        self.source.start().map_err(|e| {
            tracing::error!(error = %e, remedy = %e.remediation(), "enroll: camera start failed");
            EnrollError::Camera(e)
        })
    }

    /// Capture the current frame and keep it only if it looks live.
    pub fn capture(&mut self) -> Result<&CapturedImage, EnrollError> {
        let image = capture::capture(&mut self.source, self.quality).ok_or_else(|| {
            self.last_check = Some(LivenessResult::fail_closed());
            EnrollError::CaptureFailed
        })?;
        self.accept(image)
    }

    /// Use a user-selected file instead of the camera.
    pub fn upload(&mut self, bytes: Vec<u8>) -> Result<&CapturedImage, EnrollError> {
        let image = CapturedImage::from_upload(bytes)?;
        self.source.stop();
        self.history.clear();
        self.accept(image)
    }

    fn accept(&mut self, image: CapturedImage) -> Result<&CapturedImage, EnrollError> {
        let result = liveness::check_artifact(&image, &mut self.history);
        self.last_check = Some(result.clone());
        if !result.is_live {
            tracing::warn!(
                confidence = result.confidence,
                message = %result.message,
                "enroll: capture rejected"
            );
            self.captured = None;
            return Err(EnrollError::Rejected(result));
        }
        tracing::info!(confidence = result.confidence, bytes = image.len(), "enroll: capture accepted");
        Ok(self.captured.insert(image))
    }

    /// Discard the accepted capture so a new one can be taken.
    pub fn retake(&mut self) {
        self.captured = None;
        self.last_check = None;
    }

    /// Release the camera and forget everything captured.
    pub fn stop(&mut self) {
        self.source.stop();
        self.history.clear();
        self.retake();
    }

    pub fn captured(&self) -> Option<&CapturedImage> {
        self.captured.as_ref()
    }

    pub fn last_check(&self) -> Option<&LivenessResult> {
        self.last_check.as_ref()
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

/// Validate the form and send the accepted capture to the face service.
pub async fn submit<F: FaceService + ?Sized>(
    faces: &F,
    user_id: &str,
    allowed_rooms: &[String],
    image: Option<&CapturedImage>,
) -> Result<Enrollment, EnrollError> {
    if user_id.trim().is_empty() {
        return Err(EnrollError::MissingUser);
    }
    if allowed_rooms.is_empty() {
        return Err(EnrollError::MissingRooms);
    }
    let image = image.ok_or(EnrollError::NoCapture)?;

    let enrollment = faces.enroll(user_id, allowed_rooms, image).await?;
    tracing::info!(user_id, rooms = allowed_rooms.len(), face_id = ?enrollment.face_id, "face enrolled");
    Ok(enrollment)
}
