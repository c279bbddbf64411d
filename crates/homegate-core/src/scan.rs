//! Scan loop controller.
//!
//! A scan session repeatedly captures a frame, gates it through the liveness
//! judge and, only for live frames, asks the face service for a match. A
//! match selects a door the person may open and toggles its lock; a miss
//! shows a "not recognized" notice and restarts scanning after a pause.
//!
//! ```text
//! Idle ─start─▶ Scanning ─live+match─▶ MatchPending ─door ok─▶ Resolved ─grace─▶ closed
//!                  ▲  │                     │
//!                  │  └─not recognized─▶ NoMatch
//!                  └──────── retry delay ───┘
//! ```
//!
//! Each step runs to completion before the next one is scheduled, so ticks
//! never overlap. The controller is driven either one [`ScanController::tick`]
//! at a time (tests) or by [`ScanController::spawn`], which schedules ticks
//! on a tokio task and hands back a [`ScanHandle`] for cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::capture::{self, CameraError, FrameSource};
use crate::doors;
use crate::frame::DEFAULT_JPEG_QUALITY;
use crate::history::FrameHistory;
use crate::liveness::{self, LivenessResult};
use crate::remote::{DeviceService, DoorAction, DoorLock, FaceService, Recognition, VerifyOutcome};

/// Delays between scheduled steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanTimings {
    /// Cadence of capture ticks while scanning.
    pub tick: Duration,
    /// How long the "not recognized" notice stays up before scanning resumes.
    pub no_match_retry: Duration,
    /// How long a resolved session stays open so the result can be read.
    pub close_grace: Duration,
    /// Pause between a match and the automatic door control request.
    pub door_control_delay: Duration,
}

impl Default for ScanTimings {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            no_match_retry: Duration::from_secs(3),
            close_grace: Duration::from_secs(3),
            door_control_delay: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Idle,
    Scanning,
    MatchPending,
    NoMatch,
    Resolved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Door control succeeded and the grace period elapsed.
    Resolved,
    /// The session was closed from outside.
    Aborted,
    /// The camera could not be started.
    CameraFailed,
}

/// Notifications for whatever renders the session.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Started { session: Uuid, target: String },
    LivenessRejected(LivenessResult),
    /// Transient verification failure; scanning continues.
    VerifyFailed { error: String },
    NotRecognized { message: String },
    Matched(Recognition),
    /// The door list could not be fetched after a match.
    DoorsUnavailable { error: String },
    /// Matched, but none of the person's rooms has a door here.
    NoDoorAvailable,
    DoorControlled { door: DoorLock, action: DoorAction },
    DoorControlFailed { door: DoorLock, action: DoorAction, error: String },
    CameraFailed(CameraError),
    Closed { reason: CloseReason },
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("scan task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// State of one verification attempt against a target room.
#[derive(Debug)]
pub struct ScanSession {
    id: Uuid,
    target: String,
    phase: ScanPhase,
    liveness: Option<LivenessResult>,
    recognition: Option<Recognition>,
    selected_door: Option<DoorLock>,
    door_pending: bool,
    history: FrameHistory,
}

impl ScanSession {
    fn new(target: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            target,
            phase: ScanPhase::Idle,
            liveness: None,
            recognition: None,
            selected_door: None,
            door_pending: false,
            history: FrameHistory::new(),
        }
    }

    /// Drop every transient result and the frame history.
    fn reset(&mut self) {
        self.liveness = None;
        self.recognition = None;
        self.selected_door = None;
        self.door_pending = false;
        self.history.clear();
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    pub fn is_scanning(&self) -> bool {
        self.phase == ScanPhase::Scanning
    }

    pub fn liveness_result(&self) -> Option<&LivenessResult> {
        self.liveness.as_ref()
    }

    pub fn recognition_result(&self) -> Option<&Recognition> {
        self.recognition.as_ref()
    }

    pub fn selected_door(&self) -> Option<&DoorLock> {
        self.selected_door.as_ref()
    }

    pub fn history(&self) -> &FrameHistory {
        &self.history
    }
}

/// What the driver should do after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Run the next step after this delay.
    After(Duration),
    /// Nothing more to do on its own; wait until the session is closed.
    Park,
    /// The session is over.
    Finish(CloseReason),
}

pub struct ScanController<S, F, D> {
    source: S,
    faces: F,
    devices: D,
    timings: ScanTimings,
    jpeg_quality: u8,
    session: ScanSession,
    events: mpsc::UnboundedSender<ScanEvent>,
    active: Arc<AtomicBool>,
    close_reason: Option<CloseReason>,
}

impl<S, F, D> ScanController<S, F, D>
where
    S: FrameSource,
    F: FaceService,
    D: DeviceService,
{
    pub fn new(
        source: S,
        faces: F,
        devices: D,
        target: impl Into<String>,
        timings: ScanTimings,
        events: mpsc::UnboundedSender<ScanEvent>,
    ) -> Self {
        Self {
            source,
            faces,
            devices,
            timings,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            session: ScanSession::new(target.into()),
            events,
            active: Arc::new(AtomicBool::new(true)),
            close_reason: None,
        }
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn timings(&self) -> ScanTimings {
        self.timings
    }

    /// Why the last session ended, once it has.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.close_reason
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Fresh session against the same target, reusing the camera and
    /// services of a closed one.
    pub fn renew(mut self) -> Self {
        self.session = ScanSession::new(self.session.target.clone());
        self.active = Arc::new(AtomicBool::new(true));
        self.close_reason = None;
        self
    }

    fn emit(&self, event: ScanEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    /// Idle → Scanning: release any previous stream, clear results and
    /// history, start the camera.
    pub fn start(&mut self) -> Step {
        self.source.stop();
        self.session.reset();

        if let Err(e) = self.source.start() {
            tracing::error!(error = %e, remedy = %e.remediation(), "camera start failed");
            self.session.phase = ScanPhase::Idle;
            self.emit(ScanEvent::CameraFailed(e));
            return Step::Finish(CloseReason::CameraFailed);
        }

        self.session.phase = ScanPhase::Scanning;
        tracing::info!(
            session = %self.session.id,
            room = %self.session.target,
            "scanning started"
        );
        self.emit(ScanEvent::Started {
            session: self.session.id,
            target: self.session.target.clone(),
        });
        Step::After(self.timings.tick)
    }

    /// Run whatever the current phase calls for.
    pub async fn tick(&mut self) -> Step {
        if !self.is_active() {
            return Step::Finish(CloseReason::Aborted);
        }
        match self.session.phase {
            ScanPhase::Idle => self.start(),
            ScanPhase::Scanning => self.scan_once().await,
            ScanPhase::MatchPending if self.session.door_pending => self.open_selected_door().await,
            ScanPhase::MatchPending => Step::Park,
            ScanPhase::NoMatch => {
                tracing::info!("restarting scan after miss");
                self.start()
            }
            ScanPhase::Resolved => Step::Finish(CloseReason::Resolved),
        }
    }

    async fn scan_once(&mut self) -> Step {
        let Some(image) = capture::capture(&mut self.source, self.jpeg_quality) else {
            return self.reject(LivenessResult::fail_closed());
        };

        let liveness = liveness::check_artifact(&image, &mut self.session.history);
        self.session.liveness = Some(liveness.clone());
        if !liveness.is_live {
            return self.reject(liveness);
        }

        tracing::info!(confidence = liveness.confidence, "live frame; verifying");
        let outcome = self.faces.verify(&image, Some(&self.session.target)).await;
        if !self.is_active() {
            tracing::debug!("session closed during verify; result dropped");
            return Step::Finish(CloseReason::Aborted);
        }

        match outcome {
            Ok(VerifyOutcome::Matched(recognition)) => self.on_match(recognition).await,
            Ok(VerifyOutcome::Unmatched { message }) => {
                tracing::debug!(message = ?message, "no match; still scanning");
                Step::After(self.timings.tick)
            }
            Ok(VerifyOutcome::NotRecognized { message }) => {
                tracing::info!(%message, "face not recognized");
                self.session.phase = ScanPhase::NoMatch;
                self.session.recognition = Some(Recognition::not_recognized(message.clone()));
                self.emit(ScanEvent::NotRecognized { message });
                Step::After(self.timings.no_match_retry)
            }
            Err(e) => {
                tracing::warn!(error = %e, "verify failed; retrying");
                self.emit(ScanEvent::VerifyFailed {
                    error: e.to_string(),
                });
                Step::After(self.timings.tick)
            }
        }
    }

    fn reject(&mut self, liveness: LivenessResult) -> Step {
        tracing::debug!(
            confidence = liveness.confidence,
            message = %liveness.message,
            "frame rejected by liveness gate"
        );
        self.session.liveness = Some(liveness.clone());
        self.emit(ScanEvent::LivenessRejected(liveness));
        Step::After(self.timings.tick)
    }

    async fn on_match(&mut self, recognition: Recognition) -> Step {
        tracing::info!(
            user_id = ?recognition.user_id,
            name = ?recognition.name,
            confidence = ?recognition.confidence,
            rooms = recognition.allowed_rooms.len(),
            "face matched"
        );
        self.session.phase = ScanPhase::MatchPending;
        self.session.recognition = Some(recognition.clone());
        self.emit(ScanEvent::Matched(recognition.clone()));

        if recognition.allowed_rooms.is_empty() {
            self.emit(ScanEvent::NoDoorAvailable);
            return Step::Park;
        }

        let all = match self.devices.door_locks().await {
            Ok(all) => all,
            Err(e) => {
                tracing::error!(error = %e, "door lookup failed");
                self.emit(ScanEvent::DoorsUnavailable {
                    error: e.to_string(),
                });
                return Step::Park;
            }
        };
        if !self.is_active() {
            return Step::Finish(CloseReason::Aborted);
        }

        let eligible = doors::filter_doors(
            all,
            &recognition.allowed_rooms,
            Some(&self.session.target),
        );
        let Some(door) = eligible.into_iter().next() else {
            tracing::warn!(room = %self.session.target, "no permitted door for matched user");
            self.emit(ScanEvent::NoDoorAvailable);
            return Step::Park;
        };

        tracing::info!(door_id = %door.id, door = %door.name, "door selected");
        self.session.selected_door = Some(door);
        self.session.door_pending = true;
        Step::After(self.timings.door_control_delay)
    }

    async fn open_selected_door(&mut self) -> Step {
        self.session.door_pending = false;
        let Some(door) = self.session.selected_door.clone() else {
            return Step::Park;
        };
        let action = doors::toggle_action(&door);

        let result = self.devices.control(&door.id, action).await;
        if !self.is_active() {
            return Step::Finish(CloseReason::Aborted);
        }

        match result {
            Ok(()) => {
                tracing::info!(door_id = %door.id, %action, "door controlled");
                self.session.phase = ScanPhase::Resolved;
                self.emit(ScanEvent::DoorControlled { door, action });
                Step::After(self.timings.close_grace)
            }
            Err(e) => {
                tracing::error!(door_id = %door.id, %action, error = %e, "door control failed");
                self.emit(ScanEvent::DoorControlFailed {
                    door,
                    action,
                    error: e.to_string(),
                });
                Step::Park
            }
        }
    }

    /// Stop the camera, drop history and results, and report the close.
    pub fn shutdown(&mut self, reason: CloseReason) {
        self.active.store(false, Ordering::SeqCst);
        self.source.stop();
        self.session.reset();
        self.session.phase = ScanPhase::Idle;
        self.close_reason = Some(reason);
        tracing::info!(session = %self.session.id, ?reason, "scan session closed");
        self.emit(ScanEvent::Closed { reason });
    }
}

impl<S, F, D> ScanController<S, F, D>
where
    S: FrameSource + 'static,
    F: FaceService + 'static,
    D: DeviceService + 'static,
{
    /// Run the session on a tokio task until it finishes or is closed.
    pub fn spawn(self) -> ScanHandle<S, F, D> {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let active = Arc::clone(&self.active);
        let span = tracing::info_span!(
            "scan",
            session = %self.session.id,
            room = %self.session.target
        );
        let task = tokio::spawn(self.run(cancel_rx).instrument(span));
        ScanHandle {
            active,
            cancel: cancel_tx,
            task,
        }
    }

    async fn run(mut self, mut cancel: watch::Receiver<bool>) -> Self {
        let mut step = self.start();
        let reason = loop {
            let delay = match step {
                Step::After(delay) => delay,
                Step::Park => {
                    cancelled(&mut cancel).await;
                    break CloseReason::Aborted;
                }
                Step::Finish(reason) => break reason,
            };

            tokio::select! {
                _ = cancelled(&mut cancel) => break CloseReason::Aborted,
                _ = tokio::time::sleep(delay) => {}
            }

            // A tick cancelled mid-flight is dropped along with its network call
            step = tokio::select! {
                _ = cancelled(&mut cancel) => break CloseReason::Aborted,
                step = self.tick() => step,
            };
        };
        self.shutdown(reason);
        self
    }
}

/// Resolves once the session has been asked to close (or its handle is gone).
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        let closed = *cancel.borrow_and_update();
        if closed || cancel.changed().await.is_err() {
            return;
        }
    }
}

/// Owner-side handle of a running session.
pub struct ScanHandle<S, F, D> {
    active: Arc<AtomicBool>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<ScanController<S, F, D>>,
}

impl<S, F, D> ScanHandle<S, F, D> {
    /// Whether the session loop has ended on its own.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Close the session: any scheduled tick becomes a no-op, an in-flight
    /// request is abandoned, the camera is released and history cleared.
    /// Returns the controller for reuse.
    pub async fn close(self) -> Result<ScanController<S, F, D>, ScanError> {
        self.active.store(false, Ordering::SeqCst);
        let _ = self.cancel.send(true);
        Ok(self.task.await?)
    }

    /// Wait for the session to end by itself (resolved or camera failure).
    pub async fn wait(self) -> Result<ScanController<S, F, D>, ScanError> {
        let Self { cancel, task, .. } = self;
        let controller = task.await?;
        drop(cancel);
        Ok(controller)
    }
}
