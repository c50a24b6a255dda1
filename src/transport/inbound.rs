//! Inbound device notifications
//!
//! The driver reports device state as loosely shaped payloads whose meaning depends
//! on which fields are present. They are classified here, once, into
//! [`Notification`] variants so the engine never inspects field presence.
//!
//! A driver feeds each payload through [`RawDeviceState::into_notifications`]; the
//! REPL's `sim` commands take the same path.

use super::DeviceInfo;
use crate::tone::WirePreset;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Outcome of a connection attempt reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionEvent {
    Connected,
    Failed,
}

/// A classified notification from the device
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Connection(ConnectionEvent),
    DevicesDiscovered(Vec<DeviceInfo>),
    PresetSnapshot(WirePreset),
    /// Active channel (hardware preset slot) changed
    ChannelChanged { channel: u8 },
    /// A knob moved on the amp
    ParamChanged { dsp_id: String, index: u32, value: f32 },
    /// The effect in a slot was swapped on the amp
    FxTypeChanged { dsp_id_old: String, dsp_id_new: String },
}

impl Notification {
    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Connection(_) => "connection",
            Notification::DevicesDiscovered(_) => "devices-discovered",
            Notification::PresetSnapshot(_) => "preset-snapshot",
            Notification::ChannelChanged { .. } => "channel-changed",
            Notification::ParamChanged { .. } => "param-changed",
            Notification::FxTypeChanged { .. } => "fx-type-changed",
        }
    }

    /// Parse the driver's connection status string (`"connected"` / `"failed"`)
    pub fn from_connection_status(status: &str) -> Option<Self> {
        match status.trim() {
            "connected" => Some(Notification::Connection(ConnectionEvent::Connected)),
            "failed" => Some(Notification::Connection(ConnectionEvent::Failed)),
            other => {
                debug!(status = other, "Ignoring unknown connection status");
                None
            }
        }
    }
}

/// Last message the driver decoded from the amp
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDeviceMessage {
    #[serde(default)]
    pub preset_number: Option<u8>,
    #[serde(default)]
    pub dsp_id: Option<String>,
    #[serde(default)]
    pub index: Option<u32>,
    #[serde(default)]
    pub value: Option<f32>,
    #[serde(default)]
    pub dsp_id_old: Option<String>,
    #[serde(default)]
    pub dsp_id_new: Option<String>,
}

/// Device state payload as emitted by the driver
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDeviceState {
    #[serde(default)]
    pub preset_config: Option<WirePreset>,
    #[serde(default)]
    pub last_message_received: Option<RawDeviceMessage>,
}

impl RawDeviceState {
    /// Classify into notifications, preset first, in the order they must be applied
    pub fn into_notifications(self) -> Vec<Notification> {
        let mut out = Vec::with_capacity(2);

        if let Some(preset) = self.preset_config {
            out.push(Notification::PresetSnapshot(preset));
        }

        if let Some(msg) = self.last_message_received {
            if let Some(notification) = msg.classify() {
                out.push(notification);
            }
        }

        out
    }
}

impl RawDeviceMessage {
    /// A preset number means a channel change; an effect id with an index is a
    /// parameter change; an old/new id pair is an effect swap.
    fn classify(self) -> Option<Notification> {
        if let Some(channel) = self.preset_number {
            return Some(Notification::ChannelChanged { channel });
        }

        if let Some(dsp_id) = self.dsp_id {
            return match (self.index, self.value) {
                (Some(index), Some(value)) => {
                    Some(Notification::ParamChanged { dsp_id, index, value })
                }
                _ => {
                    debug!(%dsp_id, "Parameter message without index/value, dropping");
                    None
                }
            };
        }

        match (self.dsp_id_old, self.dsp_id_new) {
            (Some(dsp_id_old), Some(dsp_id_new)) => Some(Notification::FxTypeChanged {
                dsp_id_old,
                dsp_id_new,
            }),
            (None, None) => None,
            _ => {
                debug!("Effect change message missing old or new id, dropping");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classify(value: serde_json::Value) -> Vec<Notification> {
        serde_json::from_value::<RawDeviceState>(value)
            .unwrap()
            .into_notifications()
    }

    #[test]
    fn test_preset_number_is_channel_change() {
        let out = classify(json!({"lastMessageReceived": {"presetNumber": 3}}));
        assert_eq!(out, vec![Notification::ChannelChanged { channel: 3 }]);
    }

    #[test]
    fn test_param_change() {
        let out = classify(json!({
            "lastMessageReceived": {"dspId": "Twin", "index": 1, "value": 0.75}
        }));
        assert_eq!(
            out,
            vec![Notification::ParamChanged {
                dsp_id: "Twin".to_string(),
                index: 1,
                value: 0.75
            }]
        );
    }

    #[test]
    fn test_fx_type_change() {
        let out = classify(json!({
            "lastMessageReceived": {"dspIdOld": "Twin", "dspIdNew": "94MatchDCV2"}
        }));
        assert_eq!(
            out,
            vec![Notification::FxTypeChanged {
                dsp_id_old: "Twin".to_string(),
                dsp_id_new: "94MatchDCV2".to_string()
            }]
        );
    }

    #[test]
    fn test_preset_comes_before_message() {
        let out = classify(json!({
            "presetConfig": {"toneId": "t", "name": "n", "fx": []},
            "lastMessageReceived": {"presetNumber": 1}
        }));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].kind(), "preset-snapshot");
        assert_eq!(out[1].kind(), "channel-changed");
    }

    #[test]
    fn test_incomplete_messages_are_dropped() {
        assert!(classify(json!({"lastMessageReceived": {"dspId": "Twin"}})).is_empty());
        assert!(classify(json!({"lastMessageReceived": {"dspIdOld": "Twin"}})).is_empty());
        assert!(classify(json!({})).is_empty());
    }

    #[test]
    fn test_connection_status() {
        assert_eq!(
            Notification::from_connection_status("connected"),
            Some(Notification::Connection(ConnectionEvent::Connected))
        );
        assert_eq!(
            Notification::from_connection_status("failed"),
            Some(Notification::Connection(ConnectionEvent::Failed))
        );
        assert_eq!(Notification::from_connection_status("pairing"), None);
    }
}
