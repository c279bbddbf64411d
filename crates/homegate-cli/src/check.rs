//! `homegate check` — liveness verdicts for image files.
//!
//! Files are judged in argument order with one shared frame history, so a
//! sequence of stills exercises the motion check the same way a camera feed
//! does.

use std::path::{Path, PathBuf};

use anyhow::Result;
use homegate_core::liveness::{self, LivenessResult};
use homegate_core::{CapturedImage, FrameHistory};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct FileVerdict {
    pub file: String,
    #[serde(flatten)]
    pub result: LivenessResult,
}

pub fn run(images: &[PathBuf]) -> Result<()> {
    for verdict in check_files(images) {
        println!("{}", serde_json::to_string(&verdict)?);
    }
    Ok(())
}

pub fn check_files(images: &[PathBuf]) -> Vec<FileVerdict> {
    let mut history = FrameHistory::new();
    images
        .iter()
        .map(|path| FileVerdict {
            file: path.display().to_string(),
            result: check_file(path, &mut history),
        })
        .collect()
}

/// Unreadable or undecodable files fail closed and leave history alone.
fn check_file(path: &Path, history: &mut FrameHistory) -> LivenessResult {
    let image = std::fs::read(path)
        .map_err(anyhow::Error::from)
        .and_then(|bytes| Ok(CapturedImage::from_upload(bytes)?));
    match image {
        Ok(image) => liveness::check_artifact(&image, history),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "cannot read frame");
            LivenessResult::fail_closed()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    struct ScratchDir(PathBuf);

    impl ScratchDir {
        fn new() -> Self {
            let dir = std::env::temp_dir().join(format!("homegate-check-{}", uuid::Uuid::new_v4()));
            std::fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }
    }

    impl Drop for ScratchDir {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self.0).ok();
        }
    }

    #[test]
    fn test_grey_stills_are_spoofs() {
        let dir = ScratchDir::new();
        let grey = dir.0.join("grey.png");
        RgbaImage::from_pixel(40, 30, Rgba([128, 128, 128, 255]))
            .save(&grey)
            .unwrap();

        let verdicts = check_files(&[grey.clone(), grey]);
        assert_eq!(verdicts.len(), 2);
        for v in &verdicts {
            assert!(!v.result.is_live);
            // lighting passes; motion passes vacuously on a short history
            assert_eq!(v.result.confidence, 50);
        }
    }

    #[test]
    fn test_unreadable_files_fail_closed() {
        let dir = ScratchDir::new();
        let junk = dir.0.join("notes.txt");
        std::fs::write(&junk, "not an image").unwrap();

        let verdicts = check_files(&[junk, dir.0.join("missing.jpg")]);
        for v in &verdicts {
            assert_eq!(v.result, LivenessResult::fail_closed());
        }
        let json = serde_json::to_value(&verdicts[0]).unwrap();
        assert_eq!(json["confidence"], 0);
        assert_eq!(json["message"], "Unable to analyze frame");
    }
}
