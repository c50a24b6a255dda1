//! Console transport - logs every action and optionally plays the device's part
//!
//! Useful for:
//! - Driving the engine from the REPL without an amp nearby
//! - Recording outbound traffic in tests
//! - Injecting device notifications by hand

use super::inbound::{ConnectionEvent, Notification};
use super::{DeviceAction, DeviceInfo, Transport};
use crate::error::TransportError;
use crate::tone::{DevicePreset, WirePreset};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// In-memory stand-in for the amp, answering actions the way the hardware does
#[derive(Debug, Clone)]
struct SimulatedDevice {
    preset: DevicePreset,
    channel: u8,
    devices: Vec<DeviceInfo>,
}

impl SimulatedDevice {
    fn respond(&mut self, action: &DeviceAction) -> Option<Notification> {
        match action {
            DeviceAction::Scan => Some(Notification::DevicesDiscovered(self.devices.clone())),
            DeviceAction::Connect(_) => Some(Notification::Connection(ConnectionEvent::Connected)),
            DeviceAction::GetPreset(_) => Some(Notification::PresetSnapshot(WirePreset::Device(
                self.preset.clone(),
            ))),
            DeviceAction::ApplyPreset(preset) => {
                self.preset = preset.clone();
                None
            }
            DeviceAction::SetChannel(channel) => {
                self.channel = *channel;
                Some(Notification::ChannelChanged { channel: *channel })
            }
            DeviceAction::ChangeFx(change) | DeviceAction::ChangeAmp(change) => {
                let fx = self
                    .preset
                    .sigpath
                    .iter_mut()
                    .find(|fx| fx.dsp_id.starts_with(change.dsp_id_old.as_str()))?;
                fx.dsp_id = change.dsp_id_new.clone();

                // Amp swaps are reported back; effect swaps were already applied locally
                matches!(action, DeviceAction::ChangeAmp(_)).then(|| Notification::FxTypeChanged {
                    dsp_id_old: change.dsp_id_old.clone(),
                    dsp_id_new: change.dsp_id_new.clone(),
                })
            }
            DeviceAction::SetFxParam(change) => {
                let param = self
                    .preset
                    .sigpath
                    .iter_mut()
                    .find(|fx| fx.dsp_id.starts_with(change.dsp_id.as_str()))?
                    .params
                    .iter_mut()
                    .find(|p| p.index == change.index)?;
                param.value = change.value;
                None
            }
            DeviceAction::SetFxToggle(toggle) => {
                if let Some(fx) = self
                    .preset
                    .sigpath
                    .iter_mut()
                    .find(|fx| fx.dsp_id.starts_with(toggle.dsp_id.as_str()))
                {
                    fx.active = toggle.value == 1;
                }
                None
            }
            DeviceAction::GetDeviceName | DeviceAction::GetDeviceSerial => None,
        }
    }
}

/// Cloneable sender for pushing notifications as if the amp had sent them
#[derive(Clone)]
pub struct NotificationInjector {
    tx: mpsc::UnboundedSender<Notification>,
}

impl NotificationInjector {
    /// Returns false once the engine has stopped listening
    pub fn inject(&self, notification: Notification) -> bool {
        self.tx.send(notification).is_ok()
    }
}

/// ConsoleTransport logs all actions and keeps a history of them
pub struct ConsoleTransport {
    name: String,
    history: Arc<Mutex<Vec<DeviceAction>>>,
    /// Action names that are rejected instead of performed
    failing: Mutex<HashSet<&'static str>>,
    device: Option<Mutex<SimulatedDevice>>,
    event_tx: mpsc::UnboundedSender<Notification>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<Notification>>>,
}

impl ConsoleTransport {
    /// A transport that only logs and records
    pub fn new(name: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            history: Arc::new(Mutex::new(Vec::new())),
            failing: Mutex::new(HashSet::new()),
            device: None,
            event_tx,
            event_rx: Mutex::new(Some(event_rx)),
        }
    }

    /// Also answer actions like an amp holding `preset`, visible to a scan as `devices`
    pub fn with_simulated_device(mut self, preset: DevicePreset, devices: Vec<DeviceInfo>) -> Self {
        self.device = Some(Mutex::new(SimulatedDevice {
            channel: preset.preset_number.unwrap_or(0),
            preset,
            devices,
        }));
        self
    }

    /// Reject every subsequent action with this name (see [`DeviceAction::name`])
    pub fn fail_action(&self, name: &'static str) {
        self.failing.lock().insert(name);
    }

    /// Stop rejecting actions
    pub fn clear_failures(&self) {
        self.failing.lock().clear();
    }

    /// Actions performed so far, oldest first
    pub fn history(&self) -> Vec<DeviceAction> {
        self.history.lock().clone()
    }

    pub fn clear_history(&self) {
        self.history.lock().clear();
    }

    pub fn injector(&self) -> NotificationInjector {
        NotificationInjector {
            tx: self.event_tx.clone(),
        }
    }

    /// Channel the simulated device is on, if one is attached
    pub fn simulated_channel(&self) -> Option<u8> {
        self.device.as_ref().map(|d| d.lock().channel)
    }
}

#[async_trait]
impl Transport for ConsoleTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn perform(&self, action: DeviceAction) -> Result<(), TransportError> {
        let exec_num = {
            let mut history = self.history.lock();
            history.push(action.clone());
            history.len()
        };

        info!(
            "🎛️  [{}] Transport '{}' → {} [exec #{}]",
            chrono::Local::now().format("%H:%M:%S%.3f"),
            self.name,
            action,
            exec_num
        );
        debug!(transport = %self.name, action = ?action, "ConsoleTransport perform");

        if self.failing.lock().contains(action.name()) {
            return Err(TransportError::Rejected {
                action: action.name().to_string(),
                reason: "rejected by console transport".to_string(),
            });
        }

        let reply = self
            .device
            .as_ref()
            .and_then(|device| device.lock().respond(&action));
        if let Some(notification) = reply {
            debug!(kind = notification.kind(), "Simulated device reply");
            let _ = self.event_tx.send(notification);
        }

        Ok(())
    }

    fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<Notification>> {
        self.event_rx.lock().take()
    }
}
