//! `homegate enroll`

use std::path::PathBuf;

use anyhow::{Context, Result};
use homegate_client::ApiClient;
use homegate_core::enroll::{self, EnrollmentCapture};
use homegate_core::StillFrames;

pub enum Input {
    /// An image file, used as an upload.
    Image(PathBuf),
    /// A frame directory; its first frame is captured.
    Frames(PathBuf),
}

pub async fn run(
    api: &ApiClient,
    user_id: &str,
    rooms: &[String],
    input: Input,
    quality: u8,
) -> Result<()> {
    let frames_dir = match &input {
        Input::Frames(dir) => dir.clone(),
        Input::Image(_) => PathBuf::new(),
    };
    let mut flow = EnrollmentCapture::new(StillFrames::new(frames_dir)).with_jpeg_quality(quality);

    match input {
        Input::Image(path) => {
            let bytes =
                std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
            flow.upload(bytes)?;
        }
        Input::Frames(_) => {
            flow.start()?;
            flow.capture()?;
        }
    }
    if let Some(check) = flow.last_check() {
        println!("liveness: {} ({}% confidence)", check.message, check.confidence);
    }

    let result = enroll::submit(api, user_id, rooms, flow.captured()).await;
    flow.stop();
    let enrollment = result?;

    println!(
        "enrolled face {} for {}",
        enrollment.face_id.as_deref().unwrap_or("-"),
        enrollment.user_id.as_deref().unwrap_or(user_id)
    );
    if let Some(message) = enrollment.message {
        println!("{message}");
    }
    Ok(())
}
