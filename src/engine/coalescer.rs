//! Parameter update coalescer
//!
//! Dragging a control produces far more edits than the Bluetooth link can carry.
//! Each (slot, parameter) key holds at most one pending edit; a newer edit aborts
//! the pending timer and takes its place, so only the resting value is sent.
//!
//! ## Epochs
//! A timer that already fired may have its due-event queued when a newer edit
//! arrives. Every scheduled edit therefore carries an epoch, and
//! [`Coalescer::take_due`] only releases an edit whose epoch is still current.

use crate::transport::FxParamChange;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::trace;

/// Default coalescing window
pub const DEFAULT_COALESCE_WINDOW_MS: u64 = 50;

/// Coalescing key: slot index and device parameter index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoalesceKey {
    pub slot: usize,
    pub index: u32,
}

/// Timer expiry for a key at a given epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueEdit {
    pub key: CoalesceKey,
    pub epoch: u64,
}

struct PendingEdit {
    /// Normalized device effect id
    dsp_id: String,
    value: f32,
    epoch: u64,
    timer: AbortHandle,
}

impl PendingEdit {
    fn to_change(&self, key: CoalesceKey) -> FxParamChange {
        FxParamChange {
            dsp_id: self.dsp_id.clone(),
            index: key.index,
            value: self.value,
        }
    }
}

/// Per-key debounce with replace-on-supersede
pub struct Coalescer {
    window: Duration,
    pending: HashMap<CoalesceKey, PendingEdit>,
    next_epoch: u64,
    due_tx: mpsc::UnboundedSender<DueEdit>,
}

impl Coalescer {
    /// Create a coalescer and the receiver its timers report to
    pub fn new(window: Duration) -> (Self, mpsc::UnboundedReceiver<DueEdit>) {
        let (due_tx, due_rx) = mpsc::unbounded_channel();
        let coalescer = Self {
            window,
            pending: HashMap::new(),
            next_epoch: 0,
            due_tx,
        };
        (coalescer, due_rx)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Schedule `value` for `key`, superseding any pending edit. Returns the epoch.
    pub fn schedule(&mut self, key: CoalesceKey, dsp_id: String, value: f32) -> u64 {
        self.next_epoch += 1;
        let epoch = self.next_epoch;

        if let Some(previous) = self.pending.remove(&key) {
            previous.timer.abort();
            trace!(
                slot = key.slot,
                index = key.index,
                superseded = previous.value,
                value,
                "Superseding pending parameter edit"
            );
        }

        let due_tx = self.due_tx.clone();
        let window = self.window;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = due_tx.send(DueEdit { key, epoch });
        })
        .abort_handle();

        self.pending.insert(
            key,
            PendingEdit {
                dsp_id,
                value,
                epoch,
                timer,
            },
        );
        epoch
    }

    /// Release the edit for an expired timer, unless it was superseded or cancelled
    pub fn take_due(&mut self, due: DueEdit) -> Option<FxParamChange> {
        match self.pending.get(&due.key) {
            Some(edit) if edit.epoch == due.epoch => {
                let edit = self.pending.remove(&due.key)?;
                Some(edit.to_change(due.key))
            }
            _ => {
                trace!(slot = due.key.slot, index = due.key.index, epoch = due.epoch, "Stale timer");
                None
            }
        }
    }

    /// Drop every pending edit for `slot`. Returns how many were dropped.
    pub fn cancel_slot(&mut self, slot: usize) -> usize {
        let before = self.pending.len();
        self.pending.retain(|key, edit| {
            if key.slot == slot {
                edit.timer.abort();
                false
            } else {
                true
            }
        });
        before - self.pending.len()
    }

    /// Drop every pending edit. Returns how many were dropped.
    pub fn cancel_all(&mut self) -> usize {
        let dropped = self.pending.len();
        for (_, edit) in self.pending.drain() {
            edit.timer.abort();
        }
        dropped
    }

    /// Take every pending edit immediately, ordered by key
    pub fn drain(&mut self) -> Vec<FxParamChange> {
        let mut edits: Vec<_> = self.pending.drain().collect();
        edits.sort_by_key(|(key, _)| (key.slot, key.index));
        edits
            .into_iter()
            .map(|(key, edit)| {
                edit.timer.abort();
                edit.to_change(key)
            })
            .collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Value waiting to be sent for `key`
    pub fn pending_value(&self, key: CoalesceKey) -> Option<f32> {
        self.pending.get(&key).map(|edit| edit.value)
    }
}

impl Drop for Coalescer {
    fn drop(&mut self) {
        for edit in self.pending.values() {
            edit.timer.abort();
        }
    }
}
