//! Commands accepted by the engine actor
//!
//! Every intent carries a oneshot reply so callers learn whether the device
//! accepted it.

use crate::error::{EngineError, EngineResult};
use crate::tone::Tone;
use crate::transport::DeviceInfo;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// Reply channel for an intent
pub type Reply<T> = oneshot::Sender<EngineResult<T>>;

/// Messages handled by the engine actor
#[derive(Debug)]
pub enum EngineCommand {
    RequestPreset {
        reply: Reply<()>,
    },
    ApplyPreset {
        tone: Box<Tone>,
        reply: Reply<()>,
    },
    SetChannel {
        channel: u8,
        reply: Reply<()>,
    },
    /// Swap the effect in `slot` for `type_id`
    ChangeFxType {
        slot: usize,
        type_id: String,
        reply: Reply<()>,
    },
    /// Swap the amp model in `slot` for `type_id`
    ChangeAmp {
        slot: usize,
        type_id: String,
        reply: Reply<()>,
    },
    /// Coalesced parameter edit; replies once the edit is accepted, not when sent
    SetParam {
        slot: usize,
        param: NumericInput,
        value: NumericInput,
        reply: Reply<()>,
    },
    ToggleFx {
        slot: usize,
        enabled: bool,
        reply: Reply<()>,
    },
    Scan {
        reply: Reply<()>,
    },
    Connect {
        device: DeviceInfo,
        reply: Reply<()>,
    },
    GetDeviceName {
        reply: Reply<()>,
    },
    GetDeviceSerial {
        reply: Reply<()>,
    },
    /// Flush pending edits and stop
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

impl EngineCommand {
    pub fn name(&self) -> &'static str {
        match self {
            EngineCommand::RequestPreset { .. } => "request_preset",
            EngineCommand::ApplyPreset { .. } => "apply_preset",
            EngineCommand::SetChannel { .. } => "set_channel",
            EngineCommand::ChangeFxType { .. } => "change_fx_type",
            EngineCommand::ChangeAmp { .. } => "change_amp",
            EngineCommand::SetParam { .. } => "set_param",
            EngineCommand::ToggleFx { .. } => "toggle_fx",
            EngineCommand::Scan { .. } => "scan",
            EngineCommand::Connect { .. } => "connect",
            EngineCommand::GetDeviceName { .. } => "get_device_name",
            EngineCommand::GetDeviceSerial { .. } => "get_device_serial",
            EngineCommand::Shutdown { .. } => "shutdown",
        }
    }
}

/// Number that may arrive as text from a UI control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumericInput {
    Number(f64),
    Text(String),
}

impl NumericInput {
    /// Parameter index: a non-negative integer
    pub fn as_index(&self) -> EngineResult<u32> {
        match self {
            NumericInput::Number(n) if n.fract() == 0.0 && *n >= 0.0 && *n <= f64::from(u32::MAX) => {
                Ok(*n as u32)
            }
            NumericInput::Number(n) => Err(EngineError::InvalidInput(format!(
                "parameter index {n} is not a non-negative integer"
            ))),
            NumericInput::Text(s) => s.trim().parse::<u32>().map_err(|_| {
                EngineError::InvalidInput(format!("parameter index '{s}' is not an integer"))
            }),
        }
    }

    /// Parameter value; device values are normalized floats
    pub fn as_value(&self) -> EngineResult<f32> {
        let value = match self {
            NumericInput::Number(n) => *n as f32,
            NumericInput::Text(s) => s.trim().parse::<f32>().map_err(|_| {
                EngineError::InvalidInput(format!("parameter value '{s}' is not a number"))
            })?,
        };

        if value.is_finite() {
            Ok(value)
        } else {
            Err(EngineError::InvalidInput(format!(
                "parameter value {value} is not finite"
            )))
        }
    }
}

impl From<f64> for NumericInput {
    fn from(n: f64) -> Self {
        NumericInput::Number(n)
    }
}

impl From<f32> for NumericInput {
    fn from(n: f32) -> Self {
        NumericInput::Number(f64::from(n))
    }
}

impl From<u32> for NumericInput {
    fn from(n: u32) -> Self {
        NumericInput::Number(f64::from(n))
    }
}

impl From<i32> for NumericInput {
    fn from(n: i32) -> Self {
        NumericInput::Number(f64::from(n))
    }
}

impl From<&str> for NumericInput {
    fn from(s: &str) -> Self {
        NumericInput::Text(s.to_string())
    }
}

impl From<String> for NumericInput {
    fn from(s: String) -> Self {
        NumericInput::Text(s)
    }
}
