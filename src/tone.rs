//! Tone domain model shared with the UI and tone-library features
//!
//! A [`Tone`] is the application's view of a preset: an ordered chain of effect slots
//! plus descriptive metadata. The device dialect lives in [`wire`] and the conversion
//! between the two in [`mapper`].

pub mod mapper;
pub mod wire;

use serde::{Deserialize, Serialize};

pub use mapper::ToneMapper;
pub use wire::{DeviceParam, DevicePreset, PresetMeta, SignalPathFx, WirePreset};

/// Where a tone came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToneSource {
    /// Read back from the connected amp
    Device,
    /// Authored or downloaded on the host
    #[default]
    Library,
}

/// A preset in domain shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tone {
    pub tone_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub source: ToneSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f32>,
    /// Signal chain; slot order is fixed by the device topology
    pub fx: Vec<ToneFx>,
}

impl Tone {
    /// Effect in `slot`, if the chain is that long
    pub fn slot(&self, slot: usize) -> Option<&ToneFx> {
        self.fx.get(slot)
    }

    pub fn slot_mut(&mut self, slot: usize) -> Option<&mut ToneFx> {
        self.fx.get_mut(slot)
    }
}

/// One effect slot of a tone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToneFx {
    /// Qualified effect type id
    #[serde(rename = "type")]
    pub type_id: String,
    pub name: String,
    pub enabled: bool,
    /// Only meaningful for the current `type_id`
    pub params: Vec<ToneFxParam>,
}

impl ToneFx {
    pub fn param(&self, param_id: &str) -> Option<&ToneFxParam> {
        self.params.iter().find(|p| p.param_id == param_id)
    }

    pub fn param_mut(&mut self, param_id: &str) -> Option<&mut ToneFxParam> {
        self.params.iter_mut().find(|p| p.param_id == param_id)
    }
}

/// A parameter of an effect slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToneFxParam {
    /// Device parameter index in string form
    pub param_id: String,
    pub value: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}
