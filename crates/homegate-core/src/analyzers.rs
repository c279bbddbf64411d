//! Pixel heuristics over a decoded RGBA frame.
//!
//! Sharpness, lighting and skin-tone coverage are pure functions of a single
//! frame. Motion is the one stateful check: it compares the frame against the
//! most recent entry of an explicit [`FrameHistory`].
//!
//! The thresholds are hand-tuned constants. They reject blurry or flat
//! captures (printed photos, screen glare), over- and under-exposed frames,
//! frames with implausible skin coverage, and sequences that are either
//! frozen (static photo) or changing too fast (replay flicker).

use crate::frame::DecodedFrame;
use crate::history::FrameHistory;

/// Minimum Laplacian variance for a frame to count as sharp.
pub const MIN_LAPLACIAN_VARIANCE: f64 = 100.0;
/// Exclusive bounds on mean frame luma.
pub const BRIGHTNESS_RANGE: (f64, f64) = (40.0, 220.0);
/// Exclusive bounds on the fraction of sampled pixels that look like skin.
pub const SKIN_RATIO_RANGE: (f64, f64) = (0.1, 0.6);
/// Exclusive bounds on mean per-sample luma change against the previous frame.
pub const MOTION_DELTA_RANGE: (f64, f64) = (2.0, 50.0);
/// Skin and motion checks sample every Nth pixel.
pub const SAMPLE_STRIDE: usize = 10;
/// Motion is only judged once this many frames are in the history.
pub const MIN_MOTION_HISTORY: usize = 2;

fn within(value: f64, (low, high): (f64, f64)) -> bool {
    low < value && value < high
}

/// Mean squared 4-neighbour Laplacian over the interior pixels.
///
/// Frames narrower or shorter than 3 pixels have no interior and score 0.
pub fn laplacian_variance(frame: &DecodedFrame) -> f64 {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    if width < 3 || height < 3 {
        return 0.0;
    }

    let luma: Vec<f64> = (0..frame.pixel_count()).map(|i| frame.luma(i)).collect();
    let mut sum = 0.0;
    let mut samples = 0usize;

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let i = y * width + x;
            let laplacian =
                4.0 * luma[i] - (luma[i - width] + luma[i + width] + luma[i - 1] + luma[i + 1]);
            sum += laplacian * laplacian;
            samples += 1;
        }
    }

    sum / samples as f64
}

pub fn is_sharp(frame: &DecodedFrame) -> bool {
    laplacian_variance(frame) > MIN_LAPLACIAN_VARIANCE
}

/// Mean luma over every pixel. An empty frame scores 0.
pub fn average_brightness(frame: &DecodedFrame) -> f64 {
    let pixels = frame.pixel_count();
    if pixels == 0 {
        return 0.0;
    }
    let total: f64 = (0..pixels).map(|i| frame.luma(i)).sum();
    total / pixels as f64
}

pub fn is_well_lit(frame: &DecodedFrame) -> bool {
    within(average_brightness(frame), BRIGHTNESS_RANGE)
}

/// Coarse RGB skin-tone predicate.
pub fn is_skin_like(r: u8, g: u8, b: u8) -> bool {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    r > 95
        && g > 40
        && b > 20
        && r > g
        && r > b
        && r.abs_diff(g) > 15
        && max - min > 15
}

/// Fraction of sampled pixels classified as skin-like.
pub fn skin_ratio(frame: &DecodedFrame) -> f64 {
    let mut samples = 0usize;
    let mut skin = 0usize;
    for i in (0..frame.pixel_count()).step_by(SAMPLE_STRIDE) {
        let (r, g, b) = frame.rgb(i);
        if is_skin_like(r, g, b) {
            skin += 1;
        }
        samples += 1;
    }
    if samples == 0 {
        return 0.0;
    }
    skin as f64 / samples as f64
}

/// Not face detection: only rejects frames with too little or too much
/// skin-coloured content.
pub fn has_face(frame: &DecodedFrame) -> bool {
    within(skin_ratio(frame), SKIN_RATIO_RANGE)
}

/// Mean absolute luma change over sampled pixels.
///
/// Returns `None` when the frames have different dimensions.
pub fn motion_delta(current: &DecodedFrame, previous: &DecodedFrame) -> Option<f64> {
    if current.width() != previous.width() || current.height() != previous.height() {
        return None;
    }
    let mut samples = 0usize;
    let mut total = 0.0;
    for i in (0..current.pixel_count()).step_by(SAMPLE_STRIDE) {
        total += (current.luma(i) - previous.luma(i)).abs();
        samples += 1;
    }
    if samples == 0 {
        return Some(0.0);
    }
    Some(total / samples as f64)
}

/// Compare `current` against the newest frame in `history`.
///
/// Passes vacuously until the history holds [`MIN_MOTION_HISTORY`] frames,
/// since motion cannot be judged on the first captures of a session.
pub fn has_movement(current: &DecodedFrame, history: &FrameHistory) -> bool {
    if history.len() < MIN_MOTION_HISTORY {
        return true;
    }
    let Some(previous) = history.latest() else {
        return true;
    };
    match motion_delta(current, previous) {
        Some(delta) => within(delta, MOTION_DELTA_RANGE),
        None => false,
    }
}
