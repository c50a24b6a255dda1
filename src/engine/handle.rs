//! EngineHandle - public API of the engine
//!
//! Cheap to clone. Intent methods resolve once the actor has handled them; reads
//! go through the latest published [`MirrorSnapshot`].

use super::commands::{EngineCommand, NumericInput, Reply};
use super::mirror::MirrorSnapshot;
use crate::error::{EngineError, EngineResult};
use crate::storage::DeviceStore;
use crate::tone::Tone;
use crate::transport::DeviceInfo;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::UnboundedSender<EngineCommand>,
    snapshot_rx: watch::Receiver<MirrorSnapshot>,
    store: Arc<dyn DeviceStore>,
}

impl EngineHandle {
    pub(super) fn new(
        cmd_tx: mpsc::UnboundedSender<EngineCommand>,
        snapshot_rx: watch::Receiver<MirrorSnapshot>,
        store: Arc<dyn DeviceStore>,
    ) -> Self {
        Self {
            cmd_tx,
            snapshot_rx,
            store,
        }
    }

    async fn call<T>(&self, build: impl FnOnce(Reply<T>) -> EngineCommand) -> EngineResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(build(reply_tx))
            .map_err(|_| EngineError::Stopped)?;
        reply_rx.await.map_err(|_| EngineError::Stopped)?
    }

    // =========================================================================
    // Intents
    // =========================================================================

    /// Ask the amp for its active preset
    pub async fn request_preset(&self) -> EngineResult<()> {
        self.call(|reply| EngineCommand::RequestPreset { reply })
            .await
    }

    /// Send a whole tone to the amp
    pub async fn apply_preset(&self, tone: Tone) -> EngineResult<()> {
        self.call(|reply| EngineCommand::ApplyPreset {
            tone: Box::new(tone),
            reply,
        })
        .await
    }

    /// Switch hardware channel; the mirror follows once the amp reports the preset
    pub async fn set_channel(&self, channel: u8) -> EngineResult<()> {
        self.call(|reply| EngineCommand::SetChannel { channel, reply })
            .await
    }

    /// Change the effect in `slot`. Known types are applied locally with catalog
    /// defaults before the amp confirms.
    pub async fn change_fx_type(&self, slot: usize, type_id: impl Into<String>) -> EngineResult<()> {
        let type_id = type_id.into();
        self.call(|reply| EngineCommand::ChangeFxType {
            slot,
            type_id,
            reply,
        })
        .await
    }

    /// Change the amp model in `slot`
    pub async fn change_amp(&self, slot: usize, type_id: impl Into<String>) -> EngineResult<()> {
        let type_id = type_id.into();
        self.call(|reply| EngineCommand::ChangeAmp {
            slot,
            type_id,
            reply,
        })
        .await
    }

    /// Set a parameter. The mirror updates immediately; the amp gets the last
    /// value of a burst once the coalescing window passes.
    pub async fn set_param(
        &self,
        slot: usize,
        param: impl Into<NumericInput>,
        value: impl Into<NumericInput>,
    ) -> EngineResult<()> {
        let (param, value) = (param.into(), value.into());
        self.call(|reply| EngineCommand::SetParam {
            slot,
            param,
            value,
            reply,
        })
        .await
    }

    pub async fn toggle_fx(&self, slot: usize, enabled: bool) -> EngineResult<()> {
        self.call(|reply| EngineCommand::ToggleFx {
            slot,
            enabled,
            reply,
        })
        .await
    }

    /// Start a device scan; results arrive as a device list update
    pub async fn scan(&self) -> EngineResult<()> {
        self.call(|reply| EngineCommand::Scan { reply }).await
    }

    pub async fn connect(&self, device: DeviceInfo) -> EngineResult<()> {
        self.call(|reply| EngineCommand::Connect { device, reply })
            .await
    }

    pub async fn request_device_name(&self) -> EngineResult<()> {
        self.call(|reply| EngineCommand::GetDeviceName { reply })
            .await
    }

    pub async fn request_device_serial(&self) -> EngineResult<()> {
        self.call(|reply| EngineCommand::GetDeviceSerial { reply })
            .await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Receiver notified on every mirror change
    pub fn subscribe(&self) -> watch::Receiver<MirrorSnapshot> {
        self.snapshot_rx.clone()
    }

    pub fn snapshot(&self) -> MirrorSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Device of the last successful connection, from storage
    pub fn last_connected_device(&self) -> Option<DeviceInfo> {
        self.store.load_last_connected()
    }

    pub fn is_running(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    /// Flush pending edits and stop the actor. Waits until it has stopped.
    pub async fn shutdown(&self) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(EngineCommand::Shutdown { reply: reply_tx })
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }
}
