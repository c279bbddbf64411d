//! Response bodies of the collaborator services and their mapping onto
//! homegate-core types.
//!
//! Everything here works on a status code and a body string, so the HTTP
//! layer stays a thin shell around it.

use homegate_core::remote::NOT_RECOGNIZED_MESSAGE;
use homegate_core::{DoorLock, Enrollment, Recognition, RoomRef, ServiceError, VerifyOutcome};
use serde::de::DeserializeOwned;
use serde::Deserialize;

pub const DOOR_LOCK_TYPE: &str = "door_lock";
pub const UNASSIGNED_ROOM: &str = "No Room Assigned";

const MAX_ERROR_BODY: usize = 200;

/// Responses arrive either bare or wrapped as `{ "data": ... }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } => data,
            Self::Bare(inner) => inner,
        }
    }
}

/// Parse a successful body, unwrapping the envelope.
pub fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T, ServiceError> {
    serde_json::from_str::<Envelope<T>>(body)
        .map(Envelope::into_inner)
        .map_err(|e| ServiceError::Decode(e.to_string()))
}

/// Map non-success statuses to a `ServiceError`; `None` means 2xx.
pub fn status_error(status: u16, body: &str) -> Option<ServiceError> {
    match status {
        200..=299 => None,
        401 => Some(ServiceError::Unauthorized),
        _ => Some(ServiceError::Status {
            status,
            message: error_message(body),
        }),
    }
}

/// Human-readable reason from an error body.
pub fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["message", "error", "detail"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}

/// Interpret a `/faces/verify` response.
///
/// 404 means the face is unknown and the scan loop shows its notice; a
/// successful answer with `matched: false` only means this frame did not
/// match, and scanning continues.
pub fn classify_verify(status: u16, body: &str) -> Result<VerifyOutcome, ServiceError> {
    if status == 404 {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| NOT_RECOGNIZED_MESSAGE.to_string());
        return Ok(VerifyOutcome::NotRecognized { message });
    }
    if let Some(err) = status_error(status, body) {
        return Err(err);
    }

    let recognition: Recognition = parse_body(body)?;
    if !recognition.matched {
        return Ok(VerifyOutcome::Unmatched {
            message: recognition.message,
        });
    }
    Ok(VerifyOutcome::Matched(recognition))
}

/// Interpret a `/faces/enroll` response.
pub fn classify_enroll(status: u16, body: &str) -> Result<Enrollment, ServiceError> {
    if let Some(err) = status_error(status, body) {
        return Err(err);
    }
    if body.trim().is_empty() {
        return Ok(Enrollment::default());
    }
    parse_body(body)
}

/// Interpret a `/devices/{id}/control` response. The body is ignored on
/// success.
pub fn classify_control(status: u16, body: &str) -> Result<(), ServiceError> {
    match status_error(status, body) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Interpret a device listing, keeping door locks only.
pub fn classify_door_locks(status: u16, body: &str) -> Result<Vec<DoorLock>, ServiceError> {
    if let Some(err) = status_error(status, body) {
        return Err(err);
    }
    let devices: Vec<DeviceRecord> = parse_body(body)?;
    Ok(devices
        .into_iter()
        .filter(DeviceRecord::is_door_lock)
        .map(DoorLock::from)
        .collect())
}

/// A device as the device service lists it.
#[derive(Debug, Deserialize)]
pub struct DeviceRecord {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub state: DeviceState,
    #[serde(default)]
    pub room_id: Option<RoomField>,
}

impl DeviceRecord {
    fn is_door_lock(&self) -> bool {
        self.device_type
            .as_deref()
            .map_or(true, |kind| kind == DOOR_LOCK_TYPE)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DeviceState {
    #[serde(default)]
    pub is_locked: Option<bool>,
}

/// Room reference: a bare ID or the populated room document.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RoomField {
    Id(String),
    Populated {
        #[serde(rename = "_id", alias = "id", default)]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
    },
}

impl RoomField {
    /// Room reference for display and filtering; absent or empty IDs mean
    /// the door has no room.
    pub fn into_room_ref(field: Option<Self>) -> RoomRef {
        let (id, name) = match field {
            Some(Self::Id(id)) => (Some(id), None),
            Some(Self::Populated { id, name }) => (id, name),
            None => (None, None),
        };
        RoomRef {
            id: id.filter(|id| !id.is_empty()),
            name: name.unwrap_or_else(|| UNASSIGNED_ROOM.to_string()),
        }
    }
}

impl From<DeviceRecord> for DoorLock {
    fn from(record: DeviceRecord) -> Self {
        DoorLock {
            id: record.id,
            name: record.name,
            status: record.status,
            // unknown state counts as locked
            is_locked: record.state.is_locked.unwrap_or(true),
            room: RoomField::into_room_ref(record.room_id),
        }
    }
}
