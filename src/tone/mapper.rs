//! Conversion between device presets and domain tones

use super::wire::{DeviceParam, DevicePreset, PresetMeta, SignalPathFx, WirePreset, DEFAULT_BPM};
use super::{Tone, ToneFx, ToneFxParam, ToneSource};
use crate::catalog::FxCatalog;
use crate::fx_id::FxIdNormalizer;
use std::sync::Arc;
use tracing::debug;

const DEFAULT_ICON: &str = "icon.png";
const PRESET_FORMAT_VERSION: &str = "0.7";

/// Maps presets between the device dialect and the domain model.
///
/// Both directions are pure and total; unknown effect types keep their id as the
/// display name.
#[derive(Debug, Clone)]
pub struct ToneMapper {
    ids: FxIdNormalizer,
    catalog: Arc<FxCatalog>,
}

impl ToneMapper {
    pub fn new(ids: FxIdNormalizer, catalog: Arc<FxCatalog>) -> Self {
        Self { ids, catalog }
    }

    /// Domain tone for an inbound preset payload
    pub fn to_tone(&self, wire: WirePreset) -> Tone {
        match wire {
            WirePreset::Domain(tone) => tone,
            WirePreset::Device(preset) => self.device_to_tone(&preset),
        }
    }

    /// Remap a device-dialect preset field by field
    pub fn device_to_tone(&self, preset: &DevicePreset) -> Tone {
        Tone {
            tone_id: preset.meta.id.clone(),
            name: preset.meta.name.clone(),
            description: non_empty(&preset.meta.description),
            image_url: non_empty(&preset.meta.icon),
            source: ToneSource::Device,
            bpm: Some(preset.bpm),
            fx: preset.sigpath.iter().map(|fx| self.map_fx(fx)).collect(),
        }
    }

    fn map_fx(&self, fx: &SignalPathFx) -> ToneFx {
        let type_id = self.ids.expand(&fx.dsp_id);
        let entry = self.catalog.resolve(&type_id);
        if entry.is_none() {
            debug!(dsp_id = %fx.dsp_id, "Effect not in catalog, keeping raw id as name");
        }

        let params = fx
            .params
            .iter()
            .map(|p| ToneFxParam {
                param_id: p.index.to_string(),
                value: p.value,
                name: entry
                    .and_then(|e| e.param_name(p.index))
                    .map(str::to_string),
                enabled: true,
            })
            .collect();

        ToneFx {
            name: entry
                .map(|e| e.name.clone())
                .unwrap_or_else(|| fx.dsp_id.clone()),
            type_id,
            enabled: fx.active,
            params,
        }
    }

    /// Device-dialect preset for a tone.
    ///
    /// Effect ids keep their variant (only the namespace is stripped). Parameters
    /// whose id is not a device index are left out.
    pub fn to_device(&self, tone: &Tone) -> DevicePreset {
        let sigpath = tone
            .fx
            .iter()
            .map(|fx| SignalPathFx {
                dsp_id: self.ids.strip(&fx.type_id).to_string(),
                active: fx.enabled,
                params: fx
                    .params
                    .iter()
                    .filter_map(|p| match p.param_id.trim().parse::<u32>() {
                        Ok(index) => Some(DeviceParam {
                            index,
                            value: p.value,
                        }),
                        Err(_) => {
                            debug!(param_id = %p.param_id, fx = %fx.type_id, "Skipping non-index parameter");
                            None
                        }
                    })
                    .collect(),
            })
            .collect();

        DevicePreset {
            meta: PresetMeta {
                id: tone.tone_id.clone(),
                name: tone.name.clone(),
                description: tone.description.clone().unwrap_or_default(),
                version: PRESET_FORMAT_VERSION.to_string(),
                icon: tone
                    .image_url
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ICON.to_string()),
            },
            bpm: tone.bpm.unwrap_or(DEFAULT_BPM),
            sigpath,
            preset_number: None,
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
