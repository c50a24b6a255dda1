//! Transport boundary to the Bluetooth driver
//!
//! The driver is an opaque capability: it performs one action at a time and
//! independently pushes device notifications. Nothing here assumes that a
//! notification answers a particular action.

pub mod console;
pub mod inbound;

use crate::error::TransportError;
use crate::tone::DevicePreset;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

pub use console::{ConsoleTransport, NotificationInjector};
pub use inbound::{ConnectionEvent, Notification, RawDeviceMessage, RawDeviceState};

/// A device seen during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub name: String,
    /// Bluetooth address
    pub address: String,
    /// Set when the last connection attempt to this device failed
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub connection_failed: bool,
}

impl DeviceInfo {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            connection_failed: false,
        }
    }
}

/// Effect swap: old and new device ids
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FxChange {
    pub dsp_id_old: String,
    pub dsp_id_new: String,
}

/// Single parameter write in the transport's numeric representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FxParamChange {
    pub dsp_id: String,
    pub index: u32,
    pub value: f32,
}

/// Effect on/off switch (`value` is 1 or 0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FxToggle {
    pub dsp_id: String,
    pub value: u8,
}

/// Outbound request, serialized as `{"action": ..., "data": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "camelCase")]
pub enum DeviceAction {
    Scan,
    Connect(DeviceInfo),
    /// Ask for the current preset (0 = the active one)
    GetPreset(u8),
    ApplyPreset(DevicePreset),
    SetChannel(u8),
    ChangeAmp(FxChange),
    ChangeFx(FxChange),
    SetFxParam(FxParamChange),
    SetFxToggle(FxToggle),
    GetDeviceName,
    GetDeviceSerial,
}

impl DeviceAction {
    /// Action name as the driver knows it
    pub fn name(&self) -> &'static str {
        match self {
            DeviceAction::Scan => "scan",
            DeviceAction::Connect(_) => "connect",
            DeviceAction::GetPreset(_) => "getPreset",
            DeviceAction::ApplyPreset(_) => "applyPreset",
            DeviceAction::SetChannel(_) => "setChannel",
            DeviceAction::ChangeAmp(_) => "changeAmp",
            DeviceAction::ChangeFx(_) => "changeFx",
            DeviceAction::SetFxParam(_) => "setFxParam",
            DeviceAction::SetFxToggle(_) => "setFxToggle",
            DeviceAction::GetDeviceName => "getDeviceName",
            DeviceAction::GetDeviceSerial => "getDeviceSerial",
        }
    }
}

impl std::fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Transport trait - the Bluetooth driver (or a stand-in) implements this
///
/// All methods take `&self` so a transport can be shared as `Arc<dyn Transport>`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for logs
    fn name(&self) -> &str;

    /// Perform an action and wait for the driver's outcome
    async fn perform(&self, action: DeviceAction) -> Result<(), TransportError>;

    /// Take the inbound notification stream. Only the first caller gets it.
    fn take_event_receiver(&self) -> Option<mpsc::UnboundedReceiver<Notification>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_wire_shape() {
        let action = DeviceAction::SetFxParam(FxParamChange {
            dsp_id: "Twin".to_string(),
            index: 2,
            value: 0.5,
        });
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            json!({"action": "setFxParam", "data": {"dspId": "Twin", "index": 2, "value": 0.5}})
        );
        assert_eq!(action.name(), "setFxParam");

        assert_eq!(
            serde_json::to_value(DeviceAction::Scan).unwrap(),
            json!({"action": "scan"})
        );
        assert_eq!(
            serde_json::to_value(DeviceAction::SetChannel(3)).unwrap(),
            json!({"action": "setChannel", "data": 3})
        );
    }

    #[test]
    fn test_device_info_failure_flag_is_optional() {
        let device: DeviceInfo =
            serde_json::from_value(json!({"name": "Spark 40", "address": "AA:BB"})).unwrap();
        assert!(!device.connection_failed);
        assert_eq!(
            serde_json::to_value(&device).unwrap(),
            json!({"name": "Spark 40", "address": "AA:BB"})
        );
    }
}
