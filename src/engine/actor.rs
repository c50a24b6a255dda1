//! EngineActor - owns the device mirror
//!
//! Intents, coalescer timers and device notifications all arrive as messages and
//! are handled one at a time by a single task, so the mirror needs no locks.
//!
//! ```text
//!   EngineHandle ──commands──┐
//!   Coalescer timers ──due───┼──▶ EngineActor ──perform──▶ Transport
//!   Transport ──notifications┘        │
//!                                     └──watch──▶ MirrorSnapshot readers
//! ```

use super::coalescer::{Coalescer, DueEdit, DEFAULT_COALESCE_WINDOW_MS};
use super::commands::EngineCommand;
use super::handle::EngineHandle;
use super::mirror::{DeviceMirror, MirrorSnapshot};
use super::reconciler::{FollowUp, Reconciler};
use crate::catalog::FxCatalog;
use crate::error::{EngineError, EngineResult};
use crate::fx_id::FxIdNormalizer;
use crate::storage::DeviceStore;
use crate::transport::{Notification, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, trace, warn};

/// Default bound on a single transport call
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 3000;

/// Engine timing settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a parameter edit waits for a newer one before it is sent
    pub coalesce_window: Duration,
    /// Bound on each transport call
    pub command_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            coalesce_window: Duration::from_millis(DEFAULT_COALESCE_WINDOW_MS),
            command_timeout: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
        }
    }
}

/// Actor owning the [`DeviceMirror`]
pub struct EngineActor {
    pub(super) mirror: DeviceMirror,
    pub(super) reconciler: Reconciler,
    pub(super) coalescer: Coalescer,
    pub(super) ids: FxIdNormalizer,
    pub(super) catalog: Arc<FxCatalog>,
    pub(super) transport: Arc<dyn Transport>,
    pub(super) store: Arc<dyn DeviceStore>,
    pub(super) config: EngineConfig,

    command_rx: mpsc::UnboundedReceiver<EngineCommand>,
    due_rx: mpsc::UnboundedReceiver<DueEdit>,
    event_rx: mpsc::UnboundedReceiver<Notification>,

    snapshot_tx: watch::Sender<MirrorSnapshot>,
    published_version: u64,
}

impl EngineActor {
    /// Spawn the engine and return a handle to it.
    ///
    /// Takes the transport's notification stream and seeds the device list from
    /// `store`. Fails if another consumer already took the stream.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        store: Arc<dyn DeviceStore>,
        catalog: Arc<FxCatalog>,
        ids: FxIdNormalizer,
        config: EngineConfig,
    ) -> EngineResult<EngineHandle> {
        let event_rx = transport
            .take_event_receiver()
            .ok_or_else(|| EngineError::NoEventStream(transport.name().to_string()))?;

        let known_devices = store.load_known_devices();
        let mirror = DeviceMirror::new(Arc::clone(&catalog), known_devices);
        let (snapshot_tx, snapshot_rx) = watch::channel(mirror.snapshot());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (coalescer, due_rx) = Coalescer::new(config.coalesce_window);

        let actor = EngineActor {
            published_version: mirror.version(),
            mirror,
            reconciler: Reconciler::new(ids.clone(), Arc::clone(&catalog)),
            coalescer,
            ids,
            catalog,
            transport: Arc::clone(&transport),
            store: Arc::clone(&store),
            config,
            command_rx,
            due_rx,
            event_rx,
            snapshot_tx,
        };

        info!(
            transport = transport.name(),
            known_devices = actor.mirror.devices().len(),
            coalesce_ms = config.coalesce_window.as_millis() as u64,
            "EngineActor spawned"
        );
        tokio::spawn(actor.run());

        Ok(EngineHandle::new(command_tx, snapshot_rx, store))
    }

    async fn run(mut self) {
        debug!("EngineActor run loop started");

        loop {
            tokio::select! {
                biased;

                cmd = self.command_rx.recv() => match cmd {
                    Some(EngineCommand::Shutdown { reply }) => {
                        self.flush_pending().await;
                        self.publish();
                        let _ = reply.send(());
                        break;
                    }
                    Some(cmd) => {
                        trace!(command = cmd.name(), "Processing command");
                        self.handle_command(cmd).await;
                    }
                    None => {
                        // Every handle dropped
                        self.flush_pending().await;
                        break;
                    }
                },

                Some(due) = self.due_rx.recv() => {
                    self.handle_due(due).await;
                }

                Some(notification) = self.event_rx.recv() => {
                    self.handle_notification(notification).await;
                }
            }

            self.publish();
        }

        info!("EngineActor stopped");
    }

    async fn handle_notification(&mut self, notification: Notification) {
        let follow_up = self.reconciler.apply(&mut self.mirror, notification);

        match follow_up {
            Some(FollowUp::RequestPreset) => {
                let dropped = self.coalescer.cancel_all();
                if dropped > 0 {
                    debug!(dropped, "Dropped pending edits for the previous preset");
                }
                if let Err(e) = self.request_preset().await {
                    warn!("Follow-up preset request failed: {}", e);
                }
            }
            Some(FollowUp::SlotRetyped(slot)) => self.cancel_pending(slot),
            Some(FollowUp::PersistKnownDevices(devices)) => {
                self.store.save_known_devices(&devices);
            }
            None => {}
        }
    }

    /// Send edits still waiting in the coalescer
    pub(super) async fn flush_pending(&mut self) {
        let edits = self.coalescer.drain();
        if edits.is_empty() {
            return;
        }

        info!("Flushing {} pending parameter edit(s)", edits.len());
        for edit in edits {
            if let Err(e) = self.send_param(edit).await {
                warn!("Failed to flush parameter edit: {}", e);
            }
        }
    }

    /// Publish a snapshot if the mirror changed since the last one
    pub(super) fn publish(&mut self) {
        let version = self.mirror.version();
        if version != self.published_version {
            self.snapshot_tx.send_replace(self.mirror.snapshot());
            self.published_version = version;
            trace!(version, "Published mirror snapshot");
        }
    }
}
