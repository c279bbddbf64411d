//! Collaborator services the gate talks to: face verification/enrollment
//! and door-lock device control. Implemented over HTTP by
//! `homegate-client`; faked in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::CapturedImage;

pub const NOT_RECOGNIZED_MESSAGE: &str = "Face not recognized. Please try again or enroll first.";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("not authorized; session token missing or expired")]
    Unauthorized,
    #[error("service returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed response: {0}")]
    Decode(String),
}

/// Body of a verification response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Recognition {
    #[serde(default)]
    pub matched: bool,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Rooms the matched person may open.
    #[serde(default)]
    pub allowed_rooms: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Recognition {
    /// Placeholder result shown while the "not recognized" notice is up.
    pub fn not_recognized(message: impl Into<String>) -> Self {
        Self {
            matched: false,
            message: Some(message.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    Matched(Recognition),
    /// The service answered but found no match; scanning simply goes on.
    Unmatched { message: Option<String> },
    /// The face is unknown to the service (404); the notice is shown and
    /// scanning restarts after a pause.
    NotRecognized { message: String },
}

/// Acknowledgement of a stored face.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Enrollment {
    #[serde(default)]
    pub face_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoorAction {
    Lock,
    Unlock,
}

impl DoorAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lock => "lock",
            Self::Unlock => "unlock",
        }
    }
}

impl std::fmt::Display for DoorAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomRef {
    pub id: Option<String>,
    pub name: String,
}

/// A door-lock device as the gate sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DoorLock {
    pub id: String,
    pub name: String,
    pub status: String,
    pub is_locked: bool,
    pub room: RoomRef,
}

#[async_trait]
pub trait FaceService: Send + Sync {
    /// Match the face in `image`, optionally scoped to the room being opened.
    async fn verify(
        &self,
        image: &CapturedImage,
        room_id: Option<&str>,
    ) -> Result<VerifyOutcome, ServiceError>;

    /// Store a face for `user_id` with the rooms it may open.
    async fn enroll(
        &self,
        user_id: &str,
        allowed_rooms: &[String],
        image: &CapturedImage,
    ) -> Result<Enrollment, ServiceError>;
}

#[async_trait]
pub trait DeviceService: Send + Sync {
    /// Every door-lock device known to the device service.
    async fn door_locks(&self) -> Result<Vec<DoorLock>, ServiceError>;

    async fn control(&self, device_id: &str, action: DoorAction) -> Result<(), ServiceError>;
}
