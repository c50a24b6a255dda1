//! Inbound reconciler
//!
//! Applies one device notification to the mirror. Pure with respect to I/O: any
//! follow-up (re-requesting the preset, persisting devices) is returned to the
//! actor instead of performed here.

use super::mirror::{ConnectionState, DeviceMirror};
use crate::catalog::FxCatalog;
use crate::fx_id::FxIdNormalizer;
use crate::tone::{Tone, ToneMapper, WirePreset};
use crate::transport::{ConnectionEvent, DeviceInfo, Notification};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Work the actor must do after a notification was applied
#[derive(Debug, Clone, PartialEq)]
pub enum FollowUp {
    /// The device switched to another preset: pending edits are void, fetch it
    RequestPreset,
    /// The effect in this slot changed type; its pending edits are void
    SlotRetyped(usize),
    /// Cache the discovered devices for later sessions
    PersistKnownDevices(Vec<DeviceInfo>),
}

pub struct Reconciler {
    ids: FxIdNormalizer,
    catalog: Arc<FxCatalog>,
    mapper: ToneMapper,
}

impl Reconciler {
    pub fn new(ids: FxIdNormalizer, catalog: Arc<FxCatalog>) -> Self {
        let mapper = ToneMapper::new(ids.clone(), Arc::clone(&catalog));
        Self {
            ids,
            catalog,
            mapper,
        }
    }

    pub fn mapper(&self) -> &ToneMapper {
        &self.mapper
    }

    /// Apply `notification` to `mirror`
    pub fn apply(&self, mirror: &mut DeviceMirror, notification: Notification) -> Option<FollowUp> {
        debug!(kind = notification.kind(), "Reconciling notification");

        match notification {
            Notification::Connection(event) => {
                self.on_connection(mirror, event);
                None
            }
            Notification::DevicesDiscovered(devices) => self.on_devices(mirror, devices),
            Notification::PresetSnapshot(preset) => {
                self.on_preset(mirror, preset);
                None
            }
            Notification::ChannelChanged { channel } => self.on_channel(mirror, channel),
            Notification::ParamChanged {
                dsp_id,
                index,
                value,
            } => self.on_param(mirror, &dsp_id, index, value),
            Notification::FxTypeChanged {
                dsp_id_old,
                dsp_id_new,
            } => self.on_fx_type(mirror, &dsp_id_old, &dsp_id_new),
        }
    }

    fn on_connection(&self, mirror: &mut DeviceMirror, event: ConnectionEvent) {
        info!(?event, "Device connection changed");
        mirror.update_connection(|conn| match event {
            ConnectionEvent::Connected => conn.state = ConnectionState::Connected,
            ConnectionEvent::Failed => {
                conn.state = ConnectionState::Disconnected;
                conn.connected_device = None;
            }
        });
    }

    fn on_devices(&self, mirror: &mut DeviceMirror, devices: Vec<DeviceInfo>) -> Option<FollowUp> {
        info!("Discovered {} device(s)", devices.len());
        mirror.set_devices(devices.clone());
        (!devices.is_empty()).then_some(FollowUp::PersistKnownDevices(devices))
    }

    fn on_preset(&self, mirror: &mut DeviceMirror, preset: WirePreset) {
        let marker = mirror.last_command();
        if marker.is_fx_focused() {
            debug!(%marker, "Ignoring preset snapshot while an effect edit is outstanding");
            return;
        }

        let tone = self.mapper.to_tone(preset);
        debug!(tone = %tone.name, slots = tone.fx.len(), "Preset snapshot applied");
        mirror.replace_tone(tone);
    }

    fn on_channel(&self, mirror: &mut DeviceMirror, channel: u8) -> Option<FollowUp> {
        if mirror.selected_channel() == Some(channel) {
            return None;
        }

        info!(channel, "Channel changed on device");
        mirror.set_selected_channel(channel);
        Some(FollowUp::RequestPreset)
    }

    fn on_param(
        &self,
        mirror: &mut DeviceMirror,
        dsp_id: &str,
        index: u32,
        value: f32,
    ) -> Option<FollowUp> {
        if mirror.tone().is_none() {
            debug!(dsp_id, index, "Parameter change before any preset, dropping");
            return None;
        }

        let param_id = index.to_string();
        let applied = mirror.edit_tone(|tone| {
            let (slot, synthesized) = match self.find_slot(tone, dsp_id) {
                Some(slot) => (slot, false),
                None => (self.synthesize(tone, dsp_id)?, true),
            };

            let fx = &mut tone.fx[slot];
            match fx.param_mut(&param_id) {
                Some(param) => {
                    param.value = value;
                    Some((slot, synthesized))
                }
                None => {
                    debug!(dsp_id, index, fx = %fx.type_id, "Parameter not in effect, dropping");
                    None
                }
            }
        });

        let (slot, synthesized) = applied?;
        debug!(dsp_id, index, value, slot, "Parameter changed on device");
        synthesized.then_some(FollowUp::SlotRetyped(slot))
    }

    fn on_fx_type(
        &self,
        mirror: &mut DeviceMirror,
        dsp_id_old: &str,
        dsp_id_new: &str,
    ) -> Option<FollowUp> {
        if mirror.tone().is_none() {
            debug!(dsp_id_old, dsp_id_new, "Effect type change before any preset, dropping");
            return None;
        }

        let type_id = self.ids.expand(dsp_id_new);
        let slot = mirror.edit_tone(|tone| {
            let Some(slot) = self.find_slot(tone, dsp_id_old) else {
                debug!(dsp_id_old, dsp_id_new, "Effect type change for untracked effect, dropping");
                return None;
            };

            let name = match self.catalog.resolve(&type_id) {
                Some(entry) => entry.name.clone(),
                None => {
                    warn!(dsp_id = dsp_id_new, "Effect not in catalog, using id as name");
                    self.ids.strip(&type_id).to_string()
                }
            };

            let fx = &mut tone.fx[slot];
            fx.type_id = type_id;
            fx.name = name;
            Some(slot)
        })?;

        info!(dsp_id_old, dsp_id_new, slot, "Effect type changed on device");
        Some(FollowUp::SlotRetyped(slot))
    }

    /// Slot holding the effect `dsp_id` refers to
    fn find_slot(&self, tone: &Tone, dsp_id: &str) -> Option<usize> {
        tone.fx
            .iter()
            .position(|fx| self.ids.same_effect(&fx.type_id, dsp_id))
    }

    /// Put a catalogued effect the mirror did not know about into the slot of the
    /// same signal chain stage, with catalog defaults. Slots are never added.
    fn synthesize(&self, tone: &mut Tone, dsp_id: &str) -> Option<usize> {
        let Some(entry) = self.catalog.resolve(dsp_id) else {
            debug!(dsp_id, "Effect neither in preset nor in catalog, dropping");
            return None;
        };

        let Some(slot) = tone.fx.iter().position(|fx| {
            self.catalog
                .resolve(&fx.type_id)
                .is_some_and(|current| current.category == entry.category)
        }) else {
            debug!(dsp_id, category = %entry.category, "No slot for effect category, dropping");
            return None;
        };

        let enabled = tone.fx[slot].enabled;
        let mut fx = entry.instantiate(enabled);
        fx.type_id = self.ids.expand(dsp_id);
        debug!(dsp_id, slot, replaced = %tone.fx[slot].type_id, "Synthesized effect from catalog");
        tone.fx[slot] = fx;
        Some(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::load_default_catalog;
    use crate::engine::mirror::CommandKind;
    use crate::tone::DevicePreset;

    fn setup() -> (Reconciler, DeviceMirror) {
        let ids = FxIdNormalizer::default();
        let catalog = Arc::new(load_default_catalog(ids.clone()).unwrap());
        let reconciler = Reconciler::new(ids, Arc::clone(&catalog));
        let mut mirror = DeviceMirror::new(catalog, vec![]);

        let preset: DevicePreset =
            serde_json::from_str(include_str!("../../assets/demo_preset.json")).unwrap();
        reconciler.apply(&mut mirror, Notification::PresetSnapshot(preset.into()));
        (reconciler, mirror)
    }

    fn param(mirror: &DeviceMirror, slot: usize, id: &str) -> Option<f32> {
        mirror.snapshot().param_value(slot, id)
    }

    #[test]
    fn test_snapshot_replaces_tone() {
        let (_, mirror) = setup();
        let tone = mirror.tone().unwrap();
        assert_eq!(tone.name, "Silver Clean");
        assert_eq!(tone.fx.len(), 7);
    }

    #[test]
    fn test_snapshot_ignored_while_fx_edit_outstanding() {
        let (reconciler, mut mirror) = setup();
        let version = mirror.version();

        for kind in [
            CommandKind::FxTypeChange,
            CommandKind::FxParamChange,
            CommandKind::FxToggle,
        ] {
            mirror.set_last_command(kind);
            let mut other = reconciler.mapper().to_device(mirror.tone().unwrap());
            other.meta.name = "Something else".to_string();
            reconciler.apply(&mut mirror, Notification::PresetSnapshot(other.into()));
            assert_eq!(mirror.version(), version);
            assert_eq!(mirror.tone().unwrap().name, "Silver Clean");
        }

        mirror.set_last_command(CommandKind::AmpChange);
        let mut other = reconciler.mapper().to_device(mirror.tone().unwrap());
        other.meta.name = "Something else".to_string();
        reconciler.apply(&mut mirror, Notification::PresetSnapshot(other.into()));
        assert_eq!(mirror.tone().unwrap().name, "Something else");
    }

    #[test]
    fn test_channel_change_requests_preset() {
        let (reconciler, mut mirror) = setup();
        reconciler.apply(&mut mirror, Notification::ChannelChanged { channel: 2 });

        let follow_up = reconciler.apply(&mut mirror, Notification::ChannelChanged { channel: 3 });
        assert_eq!(follow_up, Some(FollowUp::RequestPreset));
        assert_eq!(mirror.selected_channel(), Some(3));

        // Same channel again is not a change
        let version = mirror.version();
        assert_eq!(
            reconciler.apply(&mut mirror, Notification::ChannelChanged { channel: 3 }),
            None
        );
        assert_eq!(mirror.version(), version);
    }

    #[test]
    fn test_param_change_in_place() {
        let (reconciler, mut mirror) = setup();
        let follow_up = reconciler.apply(
            &mut mirror,
            Notification::ParamChanged {
                dsp_id: "Twin".to_string(),
                index: 2,
                value: 0.9,
            },
        );
        assert_eq!(follow_up, None);
        assert_eq!(param(&mirror, 3, "2"), Some(0.9));
        assert_eq!(param(&mirror, 3, "1"), Some(0.62));
    }

    #[test]
    fn test_reverb_variant_matches_family_notification() {
        let (reconciler, mut mirror) = setup();
        reconciler.apply(
            &mut mirror,
            Notification::ParamChanged {
                dsp_id: "bias.reverb".to_string(),
                index: 0,
                value: 0.8,
            },
        );
        assert_eq!(param(&mirror, 6, "0"), Some(0.8));
        assert_eq!(
            mirror.tone().unwrap().fx[6].type_id,
            "pg.spark40.bias.reverb.2"
        );
    }

    #[test]
    fn test_missing_param_is_dropped() {
        let (reconciler, mut mirror) = setup();
        let version = mirror.version();
        reconciler.apply(
            &mut mirror,
            Notification::ParamChanged {
                dsp_id: "Booster".to_string(),
                index: 7,
                value: 0.1,
            },
        );
        assert_eq!(mirror.version(), version);
    }

    #[test]
    fn test_unknown_effect_is_synthesized_from_catalog() {
        let (reconciler, mut mirror) = setup();
        let follow_up = reconciler.apply(
            &mut mirror,
            Notification::ParamChanged {
                dsp_id: "Flanger".to_string(),
                index: 1,
                value: 0.9,
            },
        );

        assert_eq!(follow_up, Some(FollowUp::SlotRetyped(4)));
        let tone = mirror.tone().unwrap();
        let fx = &tone.fx[4];
        assert_eq!(fx.type_id, "pg.spark40.Flanger");
        assert_eq!(fx.name, "Flanger");
        assert!(fx.enabled);
        assert_eq!(fx.params.len(), 3);
        assert_eq!(fx.param("0").map(|p| p.value), Some(0.4));
        assert_eq!(fx.param("1").map(|p| p.value), Some(0.9));
        assert_eq!(fx.param("2").map(|p| p.value), Some(0.6));

        // Other slots untouched
        assert_eq!(tone.fx[3].type_id, "pg.spark40.Twin");
        assert_eq!(tone.fx.len(), 7);
    }

    #[test]
    fn test_uncatalogued_unknown_effect_is_dropped() {
        let (reconciler, mut mirror) = setup();
        let version = mirror.version();
        reconciler.apply(
            &mut mirror,
            Notification::ParamChanged {
                dsp_id: "MysteryFuzz".to_string(),
                index: 0,
                value: 0.5,
            },
        );
        assert_eq!(mirror.version(), version);
    }

    #[test]
    fn test_fx_type_change_keeps_params() {
        let (reconciler, mut mirror) = setup();
        let follow_up = reconciler.apply(
            &mut mirror,
            Notification::FxTypeChanged {
                dsp_id_old: "Twin".to_string(),
                dsp_id_new: "94MatchDCV2".to_string(),
            },
        );

        assert_eq!(follow_up, Some(FollowUp::SlotRetyped(3)));
        let fx = &mirror.tone().unwrap().fx[3];
        assert_eq!(fx.type_id, "pg.spark40.94MatchDCV2");
        assert_eq!(fx.name, "Match DC");
        assert_eq!(fx.param("0").map(|p| p.value), Some(0.25));
    }

    #[test]
    fn test_fx_type_change_for_untracked_effect_is_dropped() {
        let (reconciler, mut mirror) = setup();
        let before = Arc::clone(mirror.tone().unwrap());
        let version = mirror.version();

        let follow_up = reconciler.apply(
            &mut mirror,
            Notification::FxTypeChanged {
                dsp_id_old: "MysteryFuzz".to_string(),
                dsp_id_new: "Booster".to_string(),
            },
        );

        assert_eq!(follow_up, None);
        assert_eq!(mirror.version(), version);
        assert!(Arc::ptr_eq(&before, mirror.tone().unwrap()));
    }

    #[test]
    fn test_effect_notifications_before_any_preset_are_dropped() {
        let ids = FxIdNormalizer::default();
        let catalog = Arc::new(load_default_catalog(ids.clone()).unwrap());
        let reconciler = Reconciler::new(ids, Arc::clone(&catalog));
        let mut mirror = DeviceMirror::new(catalog, vec![]);

        let param = reconciler.apply(
            &mut mirror,
            Notification::ParamChanged {
                dsp_id: "Flanger".to_string(),
                index: 0,
                value: 0.5,
            },
        );
        let retype = reconciler.apply(
            &mut mirror,
            Notification::FxTypeChanged {
                dsp_id_old: "Twin".to_string(),
                dsp_id_new: "94MatchDCV2".to_string(),
            },
        );

        assert_eq!(param, None);
        assert_eq!(retype, None);
        assert!(mirror.tone().is_none());
        assert_eq!(mirror.version(), 0);
    }

    #[test]
    fn test_connection_failure_clears_device() {
        let (reconciler, mut mirror) = setup();
        let device = DeviceInfo::new("Spark 40", "AA:BB");
        mirror.update_connection(|c| {
            c.state = ConnectionState::Connected;
            c.connected_device = Some(device);
        });

        reconciler.apply(&mut mirror, Notification::Connection(ConnectionEvent::Failed));
        assert_eq!(mirror.connection().state, ConnectionState::Disconnected);
        assert!(mirror.connection().connected_device.is_none());
    }

    #[test]
    fn test_discovered_devices() {
        let (reconciler, mut mirror) = setup();
        mirror.set_scan_in_progress(true);

        let devices = vec![DeviceInfo::new("Spark 40", "AA:BB")];
        let follow_up =
            reconciler.apply(&mut mirror, Notification::DevicesDiscovered(devices.clone()));
        assert_eq!(follow_up, Some(FollowUp::PersistKnownDevices(devices.clone())));
        assert_eq!(mirror.devices(), devices.as_slice());
        assert!(!mirror.scan_in_progress());

        // Empty results are shown but not cached
        assert_eq!(
            reconciler.apply(&mut mirror, Notification::DevicesDiscovered(vec![])),
            None
        );
        assert!(mirror.devices().is_empty());
    }
}
