//! Preset payloads as they cross the transport boundary
//!
//! The driver reports presets in one of two dialects: the amp's own layout, which
//! always carries a `meta` block and a `sigpath`, or a tone that is already in domain
//! shape (for example one the host pushed earlier and the driver replays).

use super::Tone;
use serde::{Deserialize, Serialize};

/// Preset metadata block of the device dialect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresetMeta {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub icon: String,
}

/// Parameter entry of a signal path effect
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceParam {
    pub index: u32,
    pub value: f32,
}

/// One effect in the device's signal path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalPathFx {
    /// Bare effect id
    pub dsp_id: String,
    pub active: bool,
    #[serde(default)]
    pub params: Vec<DeviceParam>,
}

/// Preset in the amp's native layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePreset {
    pub meta: PresetMeta,
    #[serde(default = "default_bpm")]
    pub bpm: f32,
    pub sigpath: Vec<SignalPathFx>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset_number: Option<u8>,
}

/// Either dialect of an inbound preset payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WirePreset {
    /// Carries the `meta` marker and needs field remapping
    Device(DevicePreset),
    /// Already a domain tone, passed through as is
    Domain(Tone),
}

impl WirePreset {
    /// Whether the payload needs remapping into domain shape
    pub fn is_device_dialect(&self) -> bool {
        matches!(self, WirePreset::Device(_))
    }
}

impl From<DevicePreset> for WirePreset {
    fn from(preset: DevicePreset) -> Self {
        WirePreset::Device(preset)
    }
}

impl From<Tone> for WirePreset {
    fn from(tone: Tone) -> Self {
        WirePreset::Domain(tone)
    }
}

pub(crate) const DEFAULT_BPM: f32 = 120.0;
const DEFAULT_VERSION: &str = "0.7";

fn default_bpm() -> f32 {
    DEFAULT_BPM
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_marker_selects_device_dialect() {
        let device = r#"{
            "meta": {"id": "abc", "name": "Crunch"},
            "sigpath": [{"dspId": "bias.noisegate", "active": true,
                         "params": [{"index": 0, "value": 0.3}]}]
        }"#;
        let wire: WirePreset = serde_json::from_str(device).unwrap();
        assert!(wire.is_device_dialect());

        let domain = r#"{"toneId": "abc", "name": "Crunch", "fx": []}"#;
        let wire: WirePreset = serde_json::from_str(domain).unwrap();
        assert!(!wire.is_device_dialect());
    }

    #[test]
    fn test_device_defaults() {
        let device = r#"{"meta": {"id": "x", "name": "y"}, "sigpath": []}"#;
        let WirePreset::Device(preset) = serde_json::from_str(device).unwrap() else {
            panic!("expected device dialect");
        };
        assert_eq!(preset.bpm, DEFAULT_BPM);
        assert_eq!(preset.meta.version, DEFAULT_VERSION);
        assert!(preset.preset_number.is_none());
    }
}
