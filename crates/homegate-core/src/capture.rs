//! Camera seam and frame capture.

use std::io;
use std::path::{Path, PathBuf};

use image::RgbaImage;
use thiserror::Error;

use crate::frame::CapturedImage;

/// Camera acquisition failure. Fatal to the current session; never retried
/// automatically.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera found")]
    NotFound,
    #[error("camera is busy")]
    Busy,
    #[error("camera error: {0}")]
    Other(String),
}

impl CameraError {
    /// Classify an OS-level error from opening the device.
    pub fn from_io(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            io::ErrorKind::NotFound => Self::NotFound,
            // device held by another process
            _ if err.raw_os_error() == Some(libc::EBUSY) => Self::Busy,
            _ => Self::Other(err.to_string()),
        }
    }

    /// What the user should do about it.
    pub fn remediation(&self) -> String {
        match self {
            Self::PermissionDenied => "Camera permission denied. Please allow camera access.".into(),
            Self::NotFound => "No camera found on this device.".into(),
            Self::Busy => "Camera is being used by another application.".into(),
            Self::Other(msg) => msg.clone(),
        }
    }
}

/// A live video source.
///
/// Only one session may hold a source at a time; ownership of the value is
/// the lock.
pub trait FrameSource: Send {
    /// Begin streaming. Restarting an already started source is allowed.
    fn start(&mut self) -> Result<(), CameraError>;

    /// Release the stream.
    fn stop(&mut self);

    fn is_streaming(&self) -> bool;

    /// Render the current frame. `None` if the source is not streaming or
    /// has no frame yet.
    fn grab(&mut self) -> Option<RgbaImage>;
}

/// Grab the current frame and compress it into an upload artifact.
///
/// A missing frame, a zero-sized frame or an encoder failure all yield
/// `None`; the caller treats that as a failed liveness check.
pub fn capture(source: &mut dyn FrameSource, quality: u8) -> Option<CapturedImage> {
    let Some(frame) = source.grab() else {
        tracing::debug!("capture: no frame available");
        return None;
    };
    let (width, height) = frame.dimensions();
    if width == 0 || height == 0 {
        tracing::debug!(width, height, "capture: video has no dimensions yet");
        return None;
    }
    match CapturedImage::encode_jpeg(frame, quality) {
        Ok(image) => {
            tracing::debug!(bytes = image.len(), width, height, "frame captured");
            Some(image)
        }
        Err(e) => {
            tracing::warn!(error = %e, "capture: encode failed");
            None
        }
    }
}

const STILL_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

/// Replays a directory of still images as a looping video feed.
///
/// Files are read in name order when the source starts.
pub struct StillFrames {
    dir: PathBuf,
    frames: Vec<RgbaImage>,
    cursor: usize,
    streaming: bool,
}

impl StillFrames {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            frames: Vec::new(),
            cursor: 0,
            streaming: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn load(&self) -> Result<Vec<RgbaImage>, CameraError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| CameraError::from_io(&e))?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| STILL_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        let mut frames = Vec::with_capacity(paths.len());
        for path in &paths {
            match image::open(path) {
                Ok(img) => frames.push(img.into_rgba8()),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable frame")
                }
            }
        }

        if frames.is_empty() {
            return Err(CameraError::NotFound);
        }
        Ok(frames)
    }
}

impl FrameSource for StillFrames {
    fn start(&mut self) -> Result<(), CameraError> {
        self.frames = self.load()?;
        self.cursor = 0;
        self.streaming = true;
        tracing::info!(
            dir = %self.dir.display(),
            frames = self.frames.len(),
            "still-frame source started"
        );
        Ok(())
    }

    fn stop(&mut self) {
        if self.streaming {
            tracing::debug!(dir = %self.dir.display(), "still-frame source stopped");
        }
        self.streaming = false;
        self.frames.clear();
    }

    fn is_streaming(&self) -> bool {
        self.streaming
    }

    fn grab(&mut self) -> Option<RgbaImage> {
        if !self.streaming || self.frames.is_empty() {
            return None;
        }
        let frame = self.frames[self.cursor % self.frames.len()].clone();
        self.cursor += 1;
        Some(frame)
    }
}
