//! `homegate verify` — one scan session against a frame directory.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};
use homegate_client::ApiClient;
use homegate_core::{CloseReason, ScanController, ScanEvent, ScanTimings, StillFrames};
use tokio::sync::mpsc;

/// What to do after printing an event.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    /// Nothing more will happen without an operator.
    Stop,
    Closed(CloseReason),
}

pub async fn run(
    api: ApiClient,
    room: &str,
    frames: &Path,
    max_wait: Duration,
    quality: u8,
) -> Result<()> {
    let (tx, mut events) = mpsc::unbounded_channel();
    let controller = ScanController::new(
        StillFrames::new(frames),
        api.clone(),
        api,
        room,
        ScanTimings::default(),
        tx,
    )
    .with_jpeg_quality(quality);

    let handle = controller.spawn();
    let deadline = tokio::time::sleep(max_wait);
    tokio::pin!(deadline);

    let mut camera_error = None;
    let outcome = loop {
        tokio::select! {
            _ = &mut deadline => break None,
            event = events.recv() => {
                let Some(event) = event else { break None };
                println!("{}", describe(&event));
                if let ScanEvent::CameraFailed(e) = &event {
                    camera_error = Some(e.remediation());
                }
                match flow(&event) {
                    Flow::Continue => {}
                    Flow::Stop => break Some(CloseReason::Aborted),
                    Flow::Closed(reason) => break Some(reason),
                }
            }
        }
    };

    let controller = match outcome {
        Some(CloseReason::Resolved) | Some(CloseReason::CameraFailed) => handle.wait().await?,
        _ => handle.close().await?,
    };
    tracing::debug!(session = %controller.session().id(), "verify session finished");

    match outcome {
        Some(CloseReason::Resolved) => Ok(()),
        Some(CloseReason::CameraFailed) => {
            bail!("{}", camera_error.unwrap_or_else(|| "camera failed".to_string()))
        }
        Some(CloseReason::Aborted) => bail!("face verified but no door was opened"),
        None => bail!("no face verified within {}s", max_wait.as_secs()),
    }
}

fn flow(event: &ScanEvent) -> Flow {
    match event {
        ScanEvent::Closed { reason } => Flow::Closed(*reason),
        ScanEvent::NoDoorAvailable
        | ScanEvent::DoorsUnavailable { .. }
        | ScanEvent::DoorControlFailed { .. } => Flow::Stop,
        _ => Flow::Continue,
    }
}

fn describe(event: &ScanEvent) -> String {
    match event {
        ScanEvent::Started { session, target } => format!("scanning for room {target} ({session})"),
        ScanEvent::LivenessRejected(result) => format!(
            "liveness: {} ({}% confidence)",
            result.message, result.confidence
        ),
        ScanEvent::VerifyFailed { error } => format!("verification failed: {error}"),
        ScanEvent::NotRecognized { message } => message.clone(),
        ScanEvent::Matched(rec) => format!(
            "matched {} ({})",
            rec.name.as_deref().unwrap_or("unknown"),
            rec.user_id.as_deref().unwrap_or("-")
        ),
        ScanEvent::DoorsUnavailable { error } => format!("door list unavailable: {error}"),
        ScanEvent::NoDoorAvailable => "no door available for this person here".to_string(),
        ScanEvent::DoorControlled { door, action } => {
            format!("{action} {} in {}", door.name, door.room.name)
        }
        ScanEvent::DoorControlFailed { door, action, error } => {
            format!("failed to {action} {}: {error}", door.name)
        }
        ScanEvent::CameraFailed(e) => e.remediation(),
        ScanEvent::Closed { reason } => format!("session closed ({reason:?})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use homegate_core::{CameraError, DoorAction, DoorLock, Recognition, RoomRef};

    fn front_door() -> DoorLock {
        DoorLock {
            id: "d1".into(),
            name: "Front".into(),
            status: "online".into(),
            is_locked: true,
            room: RoomRef {
                id: Some("r1".into()),
                name: "Hall".into(),
            },
        }
    }

    #[test]
    fn test_flow_stops_when_operator_is_needed() {
        assert_eq!(flow(&ScanEvent::NoDoorAvailable), Flow::Stop);
        assert_eq!(
            flow(&ScanEvent::DoorControlFailed {
                door: front_door(),
                action: DoorAction::Unlock,
                error: "offline".into(),
            }),
            Flow::Stop
        );
        assert_eq!(
            flow(&ScanEvent::NotRecognized {
                message: "nope".into()
            }),
            Flow::Continue
        );
        assert_eq!(
            flow(&ScanEvent::Closed {
                reason: CloseReason::Resolved
            }),
            Flow::Closed(CloseReason::Resolved)
        );
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(
            describe(&ScanEvent::DoorControlled {
                door: front_door(),
                action: DoorAction::Unlock,
            }),
            "unlock Front in Hall"
        );
        assert_eq!(
            describe(&ScanEvent::Matched(Recognition {
                matched: true,
                name: Some("Ada".into()),
                user_id: Some("u1".into()),
                ..Recognition::default()
            })),
            "matched Ada (u1)"
        );
        assert_eq!(
            describe(&ScanEvent::CameraFailed(CameraError::Busy)),
            "Camera is being used by another application."
        );
    }
}
