//! Door kiosk: scan sessions back to back against one room.

use std::time::Duration;

use anyhow::{bail, Result};
use homegate_core::{
    CameraError, CloseReason, DeviceService, FaceService, FrameSource, ScanController, ScanEvent,
};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// How a followed session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    /// The session closed itself.
    Closed(CloseReason),
    /// The session parked and the kiosk's grace period ran out.
    GraceElapsed,
    Shutdown,
}

pub struct Kiosk<S, F, D> {
    controller: ScanController<S, F, D>,
    events: mpsc::UnboundedReceiver<ScanEvent>,
    close_grace: Duration,
}

impl<S, F, D> Kiosk<S, F, D>
where
    S: FrameSource + 'static,
    F: FaceService + 'static,
    D: DeviceService + 'static,
{
    pub fn new(
        controller: ScanController<S, F, D>,
        events: mpsc::UnboundedReceiver<ScanEvent>,
        close_grace: Duration,
    ) -> Self {
        Self {
            controller,
            events,
            close_grace,
        }
    }

    /// Run sessions until `shutdown` flips to true or the camera fails.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let Self {
            mut controller,
            mut events,
            close_grace,
        } = self;
        let mut sessions: u64 = 0;

        loop {
            sessions += 1;
            let handle = controller.spawn();
            let (exit, camera_error) = follow(&mut events, &mut shutdown, close_grace).await;

            controller = match exit {
                Exit::Closed(_) => handle.wait().await?,
                Exit::GraceElapsed | Exit::Shutdown => handle.close().await?,
            };
            // Closed notices from the session just ended
            while events.try_recv().is_ok() {}

            match exit {
                Exit::Shutdown => {
                    tracing::info!(sessions, "kiosk stopped");
                    return Ok(());
                }
                Exit::Closed(CloseReason::CameraFailed) => {
                    let remedy = camera_error
                        .map(|e| e.remediation())
                        .unwrap_or_else(|| "camera failed to start".to_string());
                    bail!("{remedy}");
                }
                Exit::GraceElapsed => tracing::debug!("closing parked session"),
                Exit::Closed(_) => {}
            }
            controller = controller.renew();
        }
    }
}

async fn follow(
    events: &mut mpsc::UnboundedReceiver<ScanEvent>,
    shutdown: &mut watch::Receiver<bool>,
    grace: Duration,
) -> (Exit, Option<CameraError>) {
    let mut deadline: Option<Instant> = None;
    let mut camera_error = None;

    loop {
        let grace_timer = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = shutdown_requested(shutdown) => return (Exit::Shutdown, camera_error),
            _ = grace_timer => return (Exit::GraceElapsed, camera_error),
            event = events.recv() => {
                let Some(event) = event else {
                    return (Exit::Shutdown, camera_error);
                };
                report(&event);
                match event {
                    ScanEvent::Closed { reason } => return (Exit::Closed(reason), camera_error),
                    ScanEvent::CameraFailed(e) => camera_error = Some(e),
                    // The session waits for an operator; nobody is at a kiosk
                    ScanEvent::NoDoorAvailable
                    | ScanEvent::DoorsUnavailable { .. }
                    | ScanEvent::DoorControlFailed { .. } => {
                        deadline.get_or_insert_with(|| Instant::now() + grace);
                    }
                    _ => {}
                }
            }
        }
    }
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let requested = *shutdown.borrow_and_update();
        if requested {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn report(event: &ScanEvent) {
    match event {
        ScanEvent::Started { session, target } => {
            tracing::info!(%session, room = %target, "waiting for a face")
        }
        ScanEvent::LivenessRejected(result) => tracing::debug!(
            confidence = result.confidence,
            message = %result.message,
            "frame rejected"
        ),
        ScanEvent::VerifyFailed { error } => tracing::warn!(%error, "verification failed"),
        ScanEvent::NotRecognized { message } => tracing::info!(%message, "face not recognized"),
        ScanEvent::Matched(rec) => tracing::info!(
            user_id = ?rec.user_id,
            name = ?rec.name,
            confidence = ?rec.confidence,
            "face matched"
        ),
        ScanEvent::DoorsUnavailable { error } => tracing::warn!(%error, "door list unavailable"),
        ScanEvent::NoDoorAvailable => tracing::warn!("no permitted door in this room"),
        ScanEvent::DoorControlled { door, action } => {
            tracing::info!(door = %door.name, room = %door.room.name, %action, "door controlled")
        }
        ScanEvent::DoorControlFailed { door, action, error } => {
            tracing::warn!(door = %door.name, %action, %error, "door control failed")
        }
        ScanEvent::CameraFailed(e) => {
            tracing::error!(error = %e, remedy = %e.remediation(), "camera unavailable")
        }
        ScanEvent::Closed { reason } => tracing::info!(?reason, "session closed"),
    }
}
