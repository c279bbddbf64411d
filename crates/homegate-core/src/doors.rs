//! Door selection after a positive match.

use futures::future::join_all;
use serde::Serialize;

use crate::remote::{DeviceService, DoorAction, DoorLock};

/// Doors the matched person may open.
///
/// A door is eligible when its room is in `allowed_rooms`; when a target
/// room was selected, only doors in that room are kept. Doors without a
/// room are never eligible. Input order is preserved.
pub fn filter_doors(
    doors: Vec<DoorLock>,
    allowed_rooms: &[String],
    selected_room: Option<&str>,
) -> Vec<DoorLock> {
    doors
        .into_iter()
        .filter(|door| {
            let Some(room_id) = door.room.id.as_deref() else {
                return false;
            };
            if !allowed_rooms.iter().any(|r| r == room_id) {
                return false;
            }
            selected_room.map_or(true, |selected| selected == room_id)
        })
        .collect()
}

/// Action that flips the door's current state.
pub fn toggle_action(door: &DoorLock) -> DoorAction {
    if door.is_locked {
        DoorAction::Unlock
    } else {
        DoorAction::Lock
    }
}

/// Per-door result of a bulk control request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlReport {
    pub door_id: String,
    pub success: bool,
    pub message: String,
}

/// Send `action` to every door at once and wait for all of them. A failure
/// on one door does not stop the others; reports keep the input order.
pub async fn control_many<D: DeviceService + ?Sized>(
    devices: &D,
    door_ids: &[String],
    action: DoorAction,
) -> Vec<ControlReport> {
    let requests = door_ids.iter().map(|door_id| async move {
        match devices.control(door_id, action).await {
            Ok(()) => ControlReport {
                door_id: door_id.clone(),
                success: true,
                message: format!("{action} succeeded"),
            },
            Err(e) => {
                tracing::warn!(door_id = %door_id, %action, error = %e, "door control failed");
                ControlReport {
                    door_id: door_id.clone(),
                    success: false,
                    message: format!("Failed: {e}"),
                }
            }
        }
    });
    join_all(requests).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{RoomRef, ServiceError};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    fn door(id: &str, room: Option<&str>, is_locked: bool) -> DoorLock {
        DoorLock {
            id: id.to_string(),
            name: format!("Door {id}"),
            status: "online".to_string(),
            is_locked,
            room: RoomRef {
                id: room.map(str::to_string),
                name: room.unwrap_or("No Room Assigned").to_string(),
            },
        }
    }

    fn rooms(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_filter_by_allowed_rooms() {
        let doors = vec![
            door("d1", Some("kitchen"), true),
            door("d2", Some("garage"), true),
            door("d3", None, true),
            door("d4", Some("hall"), true),
        ];
        let kept = filter_doors(doors, &rooms(&["kitchen", "hall"]), None);
        let ids: Vec<&str> = kept.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d4"]);
    }

    #[test]
    fn test_filter_by_selected_room() {
        let doors = vec![
            door("d1", Some("kitchen"), true),
            door("d2", Some("hall"), true),
        ];
        let kept = filter_doors(doors, &rooms(&["kitchen", "hall"]), Some("hall"));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "d2");
    }

    #[test]
    fn test_selected_room_must_also_be_allowed() {
        let doors = vec![door("d1", Some("garage"), true)];
        assert!(filter_doors(doors, &rooms(&["kitchen"]), Some("garage")).is_empty());
    }

    #[test]
    fn test_toggle() {
        assert_eq!(toggle_action(&door("d", Some("r"), true)), DoorAction::Unlock);
        assert_eq!(toggle_action(&door("d", Some("r"), false)), DoorAction::Lock);
    }

    struct FlakyDevices {
        fail: &'static str,
        calls: Mutex<Vec<String>>,
        latency: Duration,
    }

    #[async_trait]
    impl DeviceService for FlakyDevices {
        async fn door_locks(&self) -> Result<Vec<DoorLock>, ServiceError> {
            Ok(Vec::new())
        }

        async fn control(&self, device_id: &str, _action: DoorAction) -> Result<(), ServiceError> {
            self.calls.lock().unwrap().push(device_id.to_string());
            tokio::time::sleep(self.latency).await;
            if device_id == self.fail {
                return Err(ServiceError::Status {
                    status: 503,
                    message: "offline".into(),
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_control_many_settles_every_door() {
        let devices = FlakyDevices {
            fail: "d2",
            calls: Mutex::new(Vec::new()),
            latency: Duration::ZERO,
        };
        let reports = control_many(&devices, &rooms(&["d1", "d2", "d3"]), DoorAction::Unlock).await;

        assert_eq!(*devices.calls.lock().unwrap(), rooms(&["d1", "d2", "d3"]));
        let ok: Vec<bool> = reports.iter().map(|r| r.success).collect();
        assert_eq!(ok, vec![true, false, true]);
        assert!(reports[1].message.starts_with("Failed:"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_control_many_runs_requests_concurrently() {
        let devices = FlakyDevices {
            fail: "d3",
            calls: Mutex::new(Vec::new()),
            latency: Duration::from_secs(10),
        };
        let started = tokio::time::Instant::now();
        let reports =
            control_many(&devices, &rooms(&["d1", "d2", "d3", "d4"]), DoorAction::Lock).await;

        // one request's latency, not four
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10) && elapsed < Duration::from_secs(11));
        let ids: Vec<&str> = reports.iter().map(|r| r.door_id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2", "d3", "d4"]);
        assert!(!reports[2].success);
        assert!(reports[3].success);
    }
}
