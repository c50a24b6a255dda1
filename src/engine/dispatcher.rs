//! Command dispatcher - one handler per intent
//!
//! Each handler records the command marker before the transport call and applies
//! its optimistic mirror write (if any) first. Failed calls are reported to the
//! caller; optimistic writes are not rolled back, the next device notification
//! reconciles them.

use super::actor::EngineActor;
use super::coalescer::{CoalesceKey, DueEdit};
use super::commands::{EngineCommand, NumericInput, Reply};
use super::mirror::{CommandKind, ConnectionState};
use crate::error::{EngineError, EngineResult, TransportError};
use crate::tone::Tone;
use crate::transport::{DeviceAction, DeviceInfo, FxChange, FxParamChange, FxToggle};
use tracing::{debug, info, warn};

/// `GetPreset` argument addressing the preset currently active on the amp
pub const ACTIVE_PRESET: u8 = 0;

impl EngineActor {
    pub(super) async fn handle_command(&mut self, cmd: EngineCommand) {
        match cmd {
            EngineCommand::RequestPreset { reply } => {
                let result = self.request_preset().await;
                self.respond(reply, result);
            }
            EngineCommand::ApplyPreset { tone, reply } => {
                let result = self.apply_preset(&tone).await;
                self.respond(reply, result);
            }
            EngineCommand::SetChannel { channel, reply } => {
                let result = self.set_channel(channel).await;
                self.respond(reply, result);
            }
            EngineCommand::ChangeFxType {
                slot,
                type_id,
                reply,
            } => {
                let result = self.change_fx_type(slot, &type_id).await;
                self.respond(reply, result);
            }
            EngineCommand::ChangeAmp {
                slot,
                type_id,
                reply,
            } => {
                let result = self.change_amp(slot, &type_id).await;
                self.respond(reply, result);
            }
            EngineCommand::SetParam {
                slot,
                param,
                value,
                reply,
            } => {
                let result = self.set_param(slot, &param, &value);
                self.respond(reply, result);
            }
            EngineCommand::ToggleFx {
                slot,
                enabled,
                reply,
            } => {
                let result = self.toggle_fx(slot, enabled).await;
                self.respond(reply, result);
            }
            EngineCommand::Scan { reply } => {
                let result = self.scan().await;
                self.respond(reply, result);
            }
            EngineCommand::Connect { device, reply } => {
                let result = self.connect(device).await;
                self.respond(reply, result);
            }
            EngineCommand::GetDeviceName { reply } => {
                let result = self.perform(DeviceAction::GetDeviceName).await;
                self.respond(reply, result);
            }
            EngineCommand::GetDeviceSerial { reply } => {
                let result = self.perform(DeviceAction::GetDeviceSerial).await;
                self.respond(reply, result);
            }
            EngineCommand::Shutdown { reply } => {
                // Handled by the run loop
                let _ = reply.send(());
            }
        }
    }

    /// Publish first so the caller sees its own optimistic write
    fn respond<T>(&mut self, reply: Reply<T>, result: EngineResult<T>) {
        self.publish();
        let _ = reply.send(result);
    }

    /// Call the transport, bounded by the command timeout.
    ///
    /// Pending mirror changes are published before suspending.
    pub(super) async fn perform(&mut self, action: DeviceAction) -> EngineResult<()> {
        self.publish();

        let name = action.name();
        let timeout = self.config.command_timeout;
        match tokio::time::timeout(timeout, self.transport.perform(action)).await {
            Ok(Ok(())) => {
                debug!(action = name, "Transport call completed");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(action = name, "Transport call failed: {}", e);
                Err(e.into())
            }
            Err(_) => {
                warn!(action = name, ?timeout, "Transport call timed out");
                Err(TransportError::Timeout(timeout).into())
            }
        }
    }

    /// Type id of the effect in `slot`
    fn slot_type(&self, slot: usize) -> EngineResult<String> {
        let tone = self.mirror.tone().ok_or(EngineError::NoPreset)?;
        tone.slot(slot)
            .map(|fx| fx.type_id.clone())
            .ok_or(EngineError::UnknownSlot(slot))
    }

    fn mark(&mut self, kind: CommandKind) {
        self.mirror.set_last_command(kind);
    }

    pub(super) async fn request_preset(&mut self) -> EngineResult<()> {
        self.mark(CommandKind::PresetQuery);
        self.perform(DeviceAction::GetPreset(ACTIVE_PRESET)).await?;
        debug!("Completed preset query");
        Ok(())
    }

    async fn apply_preset(&mut self, tone: &Tone) -> EngineResult<()> {
        self.mark(CommandKind::PresetApply);
        let preset = self.reconciler.mapper().to_device(tone);
        info!(tone = %tone.name, slots = preset.sigpath.len(), "Applying preset");
        self.perform(DeviceAction::ApplyPreset(preset)).await
    }

    /// The device decides what the channel holds, so nothing is assumed locally:
    /// a successful switch is followed by a fresh preset query. Pending edits still
    /// belong to the current channel and are sent before switching.
    async fn set_channel(&mut self, channel: u8) -> EngineResult<()> {
        self.flush_pending().await;
        self.mark(CommandKind::ChannelChange);
        self.perform(DeviceAction::SetChannel(channel)).await?;
        debug!(channel, "Completed setting channel");
        self.request_preset().await
    }

    async fn change_fx_type(&mut self, slot: usize, new_type: &str) -> EngineResult<()> {
        let old_type = self.slot_type(slot)?;
        let new_type = self.ids.expand(new_type);
        self.mark(CommandKind::FxTypeChange);
        self.cancel_pending(slot);

        match self.catalog.resolve(&new_type).cloned() {
            Some(entry) => {
                let type_id = new_type.clone();
                self.mirror.edit_tone(|tone| {
                    let fx = tone.slot_mut(slot)?;
                    fx.type_id = type_id;
                    fx.name = entry.name.clone();
                    fx.params = entry.default_params();
                    Some(())
                });
            }
            None => {
                warn!(
                    type_id = %new_type,
                    slot,
                    "Effect not in catalog, sending change without local update"
                );
            }
        }

        let change = FxChange {
            dsp_id_old: self.ids.normalize(&old_type),
            dsp_id_new: self.ids.normalize(&new_type),
        };
        self.perform(DeviceAction::ChangeFx(change)).await
    }

    /// Amp swaps wait for the device to report the new model back
    async fn change_amp(&mut self, slot: usize, new_type: &str) -> EngineResult<()> {
        let old_type = self.slot_type(slot)?;
        self.mark(CommandKind::AmpChange);
        self.cancel_pending(slot);

        let change = FxChange {
            dsp_id_old: self.ids.normalize(&old_type),
            dsp_id_new: self.ids.normalize(new_type),
        };
        self.perform(DeviceAction::ChangeAmp(change)).await
    }

    /// Optimistic write now, transmission after the coalescing window
    fn set_param(
        &mut self,
        slot: usize,
        param: &NumericInput,
        value: &NumericInput,
    ) -> EngineResult<()> {
        let index = param.as_index()?;
        let value = value.as_value()?;
        let type_id = self.slot_type(slot)?;
        self.mark(CommandKind::FxParamChange);

        let param_id = index.to_string();
        let written = self.mirror.edit_tone(|tone| {
            tone.slot_mut(slot)?.param_mut(&param_id)?.value = value;
            Some(())
        });
        if written.is_none() {
            warn!(slot, index, fx = %type_id, "Parameter not in mirror, sending without local update");
        }

        self.coalescer.schedule(
            CoalesceKey { slot, index },
            self.ids.normalize(&type_id),
            value,
        );
        Ok(())
    }

    pub(super) async fn handle_due(&mut self, due: DueEdit) {
        let Some(edit) = self.coalescer.take_due(due) else {
            return;
        };

        if let Err(e) = self.send_param(edit).await {
            warn!("Coalesced parameter edit was not delivered: {}", e);
        }
    }

    pub(super) async fn send_param(&mut self, edit: FxParamChange) -> EngineResult<()> {
        self.mark(CommandKind::FxParamChange);
        debug!(dsp_id = %edit.dsp_id, index = edit.index, value = edit.value, "Sending parameter edit");
        self.perform(DeviceAction::SetFxParam(edit)).await
    }

    async fn toggle_fx(&mut self, slot: usize, enabled: bool) -> EngineResult<()> {
        let type_id = self.slot_type(slot)?;
        self.mark(CommandKind::FxToggle);

        self.mirror.edit_tone(|tone| {
            tone.slot_mut(slot)?.enabled = enabled;
            Some(())
        });

        let toggle = FxToggle {
            dsp_id: self.ids.normalize(&type_id),
            value: u8::from(enabled),
        };
        self.perform(DeviceAction::SetFxToggle(toggle)).await?;
        debug!(slot, enabled, "Sent fx toggle change");
        Ok(())
    }

    async fn scan(&mut self) -> EngineResult<()> {
        self.mirror.set_scan_in_progress(true);
        let result = self.perform(DeviceAction::Scan).await;
        if result.is_err() {
            self.mirror.set_scan_in_progress(false);
        }
        result
    }

    async fn connect(&mut self, device: DeviceInfo) -> EngineResult<()> {
        info!(device = %device.name, address = %device.address, "Connecting");
        self.mirror.update_connection(|conn| {
            conn.state = ConnectionState::Connecting;
            conn.last_attempted = Some(device.clone());
        });

        match self.perform(DeviceAction::Connect(device.clone())).await {
            Ok(()) => {
                self.mirror.update_connection(|conn| {
                    conn.state = ConnectionState::Connected;
                    conn.connected_device = Some(device.clone());
                    conn.last_attempted = None;
                });
                self.store.save_last_connected(&device);
                info!(device = %device.name, "Connected");
                Ok(())
            }
            Err(e) => {
                self.mirror.update_connection(|conn| {
                    conn.state = ConnectionState::Disconnected;
                    if let Some(attempted) = conn.last_attempted.as_mut() {
                        attempted.connection_failed = true;
                    }
                });
                Err(e)
            }
        }
    }

    pub(super) fn cancel_pending(&mut self, slot: usize) {
        let dropped = self.coalescer.cancel_slot(slot);
        if dropped > 0 {
            debug!(slot, dropped, "Dropped pending edits for retyped slot");
        }
    }
}
