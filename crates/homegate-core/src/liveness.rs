//! Passive liveness gate over captured frames.
//!
//! A printed photograph or a phone screen held up to the camera tends to
//! fail at least two of the pixel heuristics in [`crate::analyzers`]: it is
//! flat (low Laplacian energy), glare-washed or dark, frozen between frames,
//! or fills the frame with skin-coloured content. A live face usually
//! passes all four.
//!
//! The judge tolerates a single misfiring heuristic (for example a real
//! face that held perfectly still for one tick), so three of four checks
//! must pass.
//!
//! # Threat Coverage
//!
//! - **Blocks:** Static photos, blurry or badly exposed captures, frames
//!   with no face-like content.
//! - **Does not block:** High-quality video replay with natural motion,
//!   masks, or anything a coarse skin-tone heuristic cannot see.
//!
//! Anything that prevents analysis (no frame, undecodable artifact) yields a
//! failing result. The gate never fails open.

use serde::Serialize;

use crate::analyzers;
use crate::frame::{CapturedImage, DecodedFrame};
use crate::history::FrameHistory;

/// Checks that must pass for a frame to count as live.
pub const MIN_PASSED_CHECKS: u8 = 3;

pub const LIVE_MESSAGE: &str = "Live person detected";
pub const SPOOF_MESSAGE: &str = "Possible spoofing detected";
pub const UNAVAILABLE_MESSAGE: &str = "Unable to analyze frame";

/// Outcome of the four pixel heuristics for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct LivenessChecks {
    pub has_movement: bool,
    pub is_sharp: bool,
    pub is_well_lit: bool,
    pub has_face: bool,
}

impl LivenessChecks {
    /// Every check failed.
    pub const FAILED: Self = Self {
        has_movement: false,
        is_sharp: false,
        is_well_lit: false,
        has_face: false,
    };

    /// Run all four analyzers. `history` is read, not modified.
    pub fn evaluate(frame: &DecodedFrame, history: &FrameHistory) -> Self {
        Self {
            has_movement: analyzers::has_movement(frame, history),
            is_sharp: analyzers::is_sharp(frame),
            is_well_lit: analyzers::is_well_lit(frame),
            has_face: analyzers::has_face(frame),
        }
    }

    /// Number of checks that passed, 0 to 4.
    pub fn passed(&self) -> u8 {
        [
            self.has_movement,
            self.is_sharp,
            self.is_well_lit,
            self.has_face,
        ]
        .into_iter()
        .filter(|ok| *ok)
        .count() as u8
    }
}

/// Liveness verdict for one scan attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LivenessResult {
    pub is_live: bool,
    /// Percentage of passed checks: one of 0, 25, 50, 75, 100.
    pub confidence: u8,
    pub checks: LivenessChecks,
    pub message: String,
}

impl LivenessResult {
    /// Derive the verdict from a set of checks.
    pub fn judge(checks: LivenessChecks) -> Self {
        let passed = checks.passed();
        let is_live = passed >= MIN_PASSED_CHECKS;
        Self {
            is_live,
            confidence: passed * 25,
            checks,
            message: if is_live { LIVE_MESSAGE } else { SPOOF_MESSAGE }.to_string(),
        }
    }

    /// Result used whenever the frame could not be analyzed.
    pub fn fail_closed() -> Self {
        Self {
            is_live: false,
            confidence: 0,
            checks: LivenessChecks::FAILED,
            message: UNAVAILABLE_MESSAGE.to_string(),
        }
    }
}

/// Judge `frame`, then move it into `history` for the next motion check.
pub fn check_frame(frame: DecodedFrame, history: &mut FrameHistory) -> LivenessResult {
    let checks = LivenessChecks::evaluate(&frame, history);
    history.push(frame);
    let result = LivenessResult::judge(checks);
    tracing::debug!(
        live = result.is_live,
        confidence = result.confidence,
        movement = checks.has_movement,
        sharp = checks.is_sharp,
        lit = checks.is_well_lit,
        face = checks.has_face,
        history = history.len(),
        "liveness checked"
    );
    result
}

/// Decode a captured artifact and judge it. Undecodable input fails closed
/// and leaves `history` untouched.
pub fn check_artifact(image: &CapturedImage, history: &mut FrameHistory) -> LivenessResult {
    match DecodedFrame::decode(image) {
        Ok(frame) => check_frame(frame, history),
        Err(e) => {
            tracing::warn!(error = %e, "liveness: artifact could not be decoded");
            LivenessResult::fail_closed()
        }
    }
}
