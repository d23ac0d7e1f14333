//! Phase timer scheduling.
//!
//! One sleeping task per session. When it wakes it only reports the room and
//! the epoch it was armed for; the engine re-checks the epoch under the
//! session lock, so a late or cancelled timer can never apply a default.

use crate::session::PhaseTimer;
use log::{debug, trace};
use shared::RoomCode;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerFired {
    pub room_code: RoomCode,
    pub epoch: u64,
}

struct ArmedTimer {
    epoch: u64,
    handle: JoinHandle<()>,
}

pub struct Scheduler {
    armed: Mutex<HashMap<RoomCode, ArmedTimer>>,
    fired_tx: mpsc::UnboundedSender<TimerFired>,
}

impl Scheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler {
            armed: Mutex::new(HashMap::new()),
            fired_tx,
        };
        (scheduler, fired_rx)
    }

    /// Makes the running timer for `room_code` match `timer`. An unchanged
    /// epoch keeps the task that is already sleeping.
    pub async fn sync(&self, room_code: &str, timer: Option<PhaseTimer>) {
        let mut armed = self.armed.lock().await;

        let Some(timer) = timer else {
            if let Some(previous) = armed.remove(room_code) {
                previous.handle.abort();
                trace!("Room {}: timer {} cancelled", room_code, previous.epoch);
            }
            return;
        };

        if armed.get(room_code).map(|a| a.epoch) == Some(timer.epoch) {
            return;
        }
        if let Some(previous) = armed.remove(room_code) {
            previous.handle.abort();
        }

        let fired_tx = self.fired_tx.clone();
        let fired = TimerFired {
            room_code: room_code.to_string(),
            epoch: timer.epoch,
        };
        let delay = Duration::from_millis(timer.duration_ms());
        debug!(
            "Room {}: arming {} timer (epoch {}) for {:?}",
            room_code, timer.phase, timer.epoch, delay
        );

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if fired_tx.send(fired).is_err() {
                trace!("Timer fired after the engine shut down");
            }
        });
        armed.insert(
            room_code.to_string(),
            ArmedTimer {
                epoch: timer.epoch,
                handle,
            },
        );
    }

    pub async fn cancel(&self, room_code: &str) {
        self.sync(room_code, None).await;
    }

    /// Epoch of the timer currently sleeping for `room_code`.
    #[cfg(test)]
    async fn armed(&self, room_code: &str) -> Option<u64> {
        self.armed.lock().await.get(room_code).map(|a| a.epoch)
    }
}
