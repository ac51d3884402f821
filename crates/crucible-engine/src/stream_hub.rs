use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::mpsc;

use crucible_core::record::RunRecord;

/// One frame on a streaming run subscription.
///
/// Ordering per run: `connected` first, then any mix of `status`/`stdout`/
/// `stderr`, then exactly one terminal frame (`complete` or `error`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    Connected { run_id: String, timestamp: i64 },
    Status { stage: String },
    Stdout { text: String },
    Stderr { text: String },
    Complete { record: Box<RunRecord> },
    Error { message: String },
}

/// Registry from run id to its single subscriber. Frames emitted while no
/// subscriber is attached are dropped; there is no replay buffer, so a late
/// subscriber misses earlier frames (documented limitation).
#[derive(Debug, Default)]
pub struct StreamHub {
    inner: Mutex<HashMap<String, mpsc::UnboundedSender<Frame>>>,
}

impl StreamHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the (sole) subscriber for `run_id`, replacing any previous
    /// one. The `connected` frame is queued before this returns, so it is
    /// always the first frame the subscriber sees.
    pub fn attach(&self, run_id: &str) -> mpsc::UnboundedReceiver<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(Frame::Connected {
            run_id: run_id.to_string(),
            timestamp: OffsetDateTime::now_utc().unix_timestamp(),
        });
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Attaches are rare; use them to drop entries whose subscriber went
        // away after the run finished publishing.
        inner.retain(|_, tx| !tx.is_closed());
        inner.insert(run_id.to_string(), tx);
        rx
    }

    pub fn detach(&self, run_id: &str) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.remove(run_id);
    }

    /// Forward one frame to the current subscriber, if any. A closed
    /// receiver is pruned on the spot.
    pub fn publish(&self, run_id: &str, frame: Frame) {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(tx) = inner.get(run_id)
            && tx.send(frame).is_err()
        {
            inner.remove(run_id);
        }
    }
}

/// The sink a streaming run writes into. All frames for a run originate in
/// that run's task, which guarantees the per-run ordering.
#[derive(Debug, Clone)]
pub struct RunSink {
    hub: Arc<StreamHub>,
    run_id: String,
}

impl RunSink {
    pub fn new(hub: Arc<StreamHub>, run_id: String) -> Self {
        Self { hub, run_id }
    }

    pub fn status(&self, stage: &str) {
        self.hub.publish(
            &self.run_id,
            Frame::Status {
                stage: stage.to_string(),
            },
        );
    }

    pub fn stdout_chunk(&self, bytes: &[u8]) {
        self.hub.publish(
            &self.run_id,
            Frame::Stdout {
                text: String::from_utf8_lossy(bytes).into_owned(),
            },
        );
    }

    pub fn stderr_chunk(&self, bytes: &[u8]) {
        self.hub.publish(
            &self.run_id,
            Frame::Stderr {
                text: String::from_utf8_lossy(bytes).into_owned(),
            },
        );
    }

    /// Terminal frame; the registry entry is removed right after, so at most
    /// one terminal frame is ever delivered.
    pub fn complete(&self, record: RunRecord) {
        self.hub.publish(
            &self.run_id,
            Frame::Complete {
                record: Box::new(record),
            },
        );
        self.hub.detach(&self.run_id);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.hub.publish(
            &self.run_id,
            Frame::Error {
                message: message.into(),
            },
        );
        self.hub.detach(&self.run_id);
    }
}
