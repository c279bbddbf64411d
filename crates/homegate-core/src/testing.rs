//! Synthetic frames and in-memory collaborators shared by unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{Rgba, RgbaImage};

use crate::capture::{CameraError, FrameSource};
use crate::frame::CapturedImage;
use crate::remote::{
    DeviceService, DoorAction, DoorLock, Enrollment, FaceService, Recognition, RoomRef,
    ServiceError, VerifyOutcome,
};

pub const SKIN: Rgba<u8> = Rgba([200, 140, 110, 255]);

/// 80×64 frame that passes sharpness, lighting and skin checks even after
/// JPEG compression: a 16px skin-tone strip on the left, 8×8 grey
/// checkerboard blocks elsewhere (both aligned to JPEG blocks).
pub fn live_frame() -> RgbaImage {
    RgbaImage::from_fn(80, 64, |x, y| {
        if x < 16 {
            SKIN
        } else if ((x / 8) + (y / 8)) % 2 == 0 {
            Rgba([30, 30, 30, 255])
        } else {
            Rgba([220, 220, 220, 255])
        }
    })
}

/// Flat mid-grey: well lit, nothing else.
pub fn grey_frame() -> RgbaImage {
    RgbaImage::from_pixel(80, 64, Rgba([128, 128, 128, 255]))
}

/// Camera double replaying a fixed list of frames.
pub struct ScriptedCamera {
    frames: Vec<RgbaImage>,
    start_error: Option<CameraError>,
    streaming: bool,
    pub starts: Arc<AtomicUsize>,
    pub grabs: Arc<AtomicUsize>,
}

impl ScriptedCamera {
    pub fn new(frames: Vec<RgbaImage>) -> Self {
        Self {
            frames,
            start_error: None,
            streaming: false,
            starts: Arc::new(AtomicUsize::new(0)),
            grabs: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(error: CameraError) -> Self {
        Self {
            start_error: Some(error),
            ..Self::new(Vec::new())
        }
    }
}

impl FrameSource for ScriptedCamera {
    fn start(&mut self) -> Result<(), CameraError> {
        if let Some(e) = &self.start_error {
            return Err(e.clone());
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.streaming = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.streaming = false;
    }

    fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn grab(&mut self) -> Option<RgbaImage> {
        if !self.streaming || self.frames.is_empty() {
            return None;
        }
        let n = self.grabs.fetch_add(1, Ordering::SeqCst);
        Some(self.frames[n % self.frames.len()].clone())
    }
}

#[derive(Default)]
struct FacesState {
    verify_script: VecDeque<Result<VerifyOutcome, ServiceError>>,
    verify_rooms: Vec<Option<String>>,
    enrolled: Vec<(String, Vec<String>)>,
    verify_delay: Option<std::time::Duration>,
}

/// Face service double. Clones share state, so a test can keep one and move
/// the other into the code under test.
#[derive(Clone, Default)]
pub struct FakeFaces {
    state: Arc<Mutex<FacesState>>,
}

impl FakeFaces {
    pub fn respond(self, outcome: Result<VerifyOutcome, ServiceError>) -> Self {
        self.state.lock().unwrap().verify_script.push_back(outcome);
        self
    }

    /// Make every verify call take this long.
    pub fn slow(self, delay: std::time::Duration) -> Self {
        self.state.lock().unwrap().verify_delay = Some(delay);
        self
    }

    pub fn verify_calls(&self) -> usize {
        self.state.lock().unwrap().verify_rooms.len()
    }

    pub fn verify_rooms(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().verify_rooms.clone()
    }

    pub fn enrolled(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().unwrap().enrolled.clone()
    }
}

#[async_trait]
impl FaceService for FakeFaces {
    async fn verify(
        &self,
        _image: &CapturedImage,
        room_id: Option<&str>,
    ) -> Result<VerifyOutcome, ServiceError> {
        let (delay, outcome) = {
            let mut state = self.state.lock().unwrap();
            state.verify_rooms.push(room_id.map(str::to_string));
            let outcome = state
                .verify_script
                .pop_front()
                .unwrap_or_else(|| Err(ServiceError::Transport("unscripted".into())));
            (state.verify_delay, outcome)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }

    async fn enroll(
        &self,
        user_id: &str,
        allowed_rooms: &[String],
        _image: &CapturedImage,
    ) -> Result<Enrollment, ServiceError> {
        self.state
            .lock()
            .unwrap()
            .enrolled
            .push((user_id.to_string(), allowed_rooms.to_vec()));
        Ok(Enrollment {
            face_id: Some("face-1".into()),
            user_id: Some(user_id.to_string()),
            message: None,
        })
    }
}

#[derive(Default)]
struct DevicesState {
    doors: Vec<DoorLock>,
    list_error: Option<ServiceError>,
    control_error: Option<ServiceError>,
    controls: Vec<(String, DoorAction)>,
}

#[derive(Clone, Default)]
pub struct FakeDevices {
    state: Arc<Mutex<DevicesState>>,
}

impl FakeDevices {
    pub fn with_doors(doors: Vec<DoorLock>) -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().doors = doors;
        fake
    }

    pub fn failing_list(self, error: ServiceError) -> Self {
        self.state.lock().unwrap().list_error = Some(error);
        self
    }

    pub fn failing_control(self, error: ServiceError) -> Self {
        self.state.lock().unwrap().control_error = Some(error);
        self
    }

    pub fn controls(&self) -> Vec<(String, DoorAction)> {
        self.state.lock().unwrap().controls.clone()
    }
}

#[async_trait]
impl DeviceService for FakeDevices {
    async fn door_locks(&self) -> Result<Vec<DoorLock>, ServiceError> {
        let state = self.state.lock().unwrap();
        match &state.list_error {
            Some(e) => Err(e.clone()),
            None => Ok(state.doors.clone()),
        }
    }

    async fn control(&self, device_id: &str, action: DoorAction) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.controls.push((device_id.to_string(), action));
        match &state.control_error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

pub fn door(id: &str, room: &str, is_locked: bool) -> DoorLock {
    DoorLock {
        id: id.to_string(),
        name: format!("Door {id}"),
        status: "online".to_string(),
        is_locked,
        room: RoomRef {
            id: Some(room.to_string()),
            name: room.to_string(),
        },
    }
}

pub fn matched(rooms: &[&str]) -> VerifyOutcome {
    VerifyOutcome::Matched(Recognition {
        matched: true,
        user_id: Some("u-1".into()),
        name: Some("Ada".into()),
        confidence: Some(0.93),
        allowed_rooms: rooms.iter().map(|r| r.to_string()).collect(),
        ..Recognition::default()
    })
}
