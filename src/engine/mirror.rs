//! Device state mirror
//!
//! The engine actor owns the only [`DeviceMirror`]; everything else sees
//! [`MirrorSnapshot`] values published on a watch channel.

use crate::catalog::FxCatalog;
use crate::tone::Tone;
use crate::transport::DeviceInfo;
use serde::Serialize;
use std::sync::Arc;

/// Link state with the amp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Connection state plus the devices involved
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub state: ConnectionState,
    pub connected_device: Option<DeviceInfo>,
    /// Device of the last connection attempt; `connection_failed` is set when it failed
    pub last_attempted: Option<DeviceInfo>,
}

impl ConnectionInfo {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

/// Kind of the last command sent to the amp.
///
/// This is a hint for telling echoes from device-side changes, not a lock: the
/// transport gives no correlation between actions and notifications, and only the
/// most recent command is remembered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandKind {
    #[default]
    None,
    PresetQuery,
    PresetApply,
    ChannelChange,
    AmpChange,
    FxTypeChange,
    FxParamChange,
    FxToggle,
}

impl CommandKind {
    /// Commands after which a full preset snapshot would be stale
    pub fn is_fx_focused(self) -> bool {
        matches!(
            self,
            CommandKind::FxTypeChange | CommandKind::FxParamChange | CommandKind::FxToggle
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::None => "none",
            CommandKind::PresetQuery => "preset-query",
            CommandKind::PresetApply => "preset-apply",
            CommandKind::ChannelChange => "channel-change",
            CommandKind::AmpChange => "amp-change",
            CommandKind::FxTypeChange => "fx-type-change",
            CommandKind::FxParamChange => "fx-param-change",
            CommandKind::FxToggle => "fx-toggle",
        }
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of the mirror at one version
#[derive(Debug, Clone)]
pub struct MirrorSnapshot {
    /// Increases on every mirror change
    pub version: u64,
    pub connection: ConnectionInfo,
    pub devices: Vec<DeviceInfo>,
    pub scan_in_progress: bool,
    pub selected_channel: Option<u8>,
    pub tone: Option<Arc<Tone>>,
    pub catalog: Arc<FxCatalog>,
    pub last_command: CommandKind,
}

impl MirrorSnapshot {
    /// Current value of a parameter, if the slot and parameter exist
    pub fn param_value(&self, slot: usize, param_id: &str) -> Option<f32> {
        self.tone
            .as_ref()?
            .slot(slot)?
            .param(param_id)
            .map(|p| p.value)
    }
}

/// Live state of the amp as last known on the host
#[derive(Debug)]
pub struct DeviceMirror {
    connection: ConnectionInfo,
    devices: Vec<DeviceInfo>,
    scan_in_progress: bool,
    selected_channel: Option<u8>,
    tone: Option<Arc<Tone>>,
    catalog: Arc<FxCatalog>,
    last_command: CommandKind,
    version: u64,
}

impl DeviceMirror {
    /// Empty mirror seeded with previously known devices
    pub fn new(catalog: Arc<FxCatalog>, known_devices: Vec<DeviceInfo>) -> Self {
        Self {
            connection: ConnectionInfo::default(),
            devices: known_devices,
            scan_in_progress: false,
            selected_channel: None,
            tone: None,
            catalog,
            last_command: CommandKind::None,
            version: 0,
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    fn touch(&mut self) {
        self.version += 1;
    }

    pub fn connection(&self) -> &ConnectionInfo {
        &self.connection
    }

    /// Mutate connection info
    pub fn update_connection(&mut self, update: impl FnOnce(&mut ConnectionInfo)) {
        update(&mut self.connection);
        self.touch();
    }

    pub fn devices(&self) -> &[DeviceInfo] {
        &self.devices
    }

    /// Replace the discovered device list; ends any scan in progress
    pub fn set_devices(&mut self, devices: Vec<DeviceInfo>) {
        self.devices = devices;
        self.scan_in_progress = false;
        self.touch();
    }

    pub fn scan_in_progress(&self) -> bool {
        self.scan_in_progress
    }

    pub fn set_scan_in_progress(&mut self, scanning: bool) {
        if self.scan_in_progress != scanning {
            self.scan_in_progress = scanning;
            self.touch();
        }
    }

    pub fn selected_channel(&self) -> Option<u8> {
        self.selected_channel
    }

    pub fn set_selected_channel(&mut self, channel: u8) {
        self.selected_channel = Some(channel);
        self.touch();
    }

    pub fn tone(&self) -> Option<&Arc<Tone>> {
        self.tone.as_ref()
    }

    /// Swap in a whole new tone
    pub fn replace_tone(&mut self, tone: Tone) {
        self.tone = Some(Arc::new(tone));
        self.touch();
    }

    /// Edit a deep copy of the current tone and swap it in.
    ///
    /// The copy is discarded if `edit` returns `None`, so a rejected edit leaves
    /// both the tone and the version untouched. Returns `None` when no tone is loaded.
    pub fn edit_tone<R>(&mut self, edit: impl FnOnce(&mut Tone) -> Option<R>) -> Option<R> {
        let mut draft = Tone::clone(self.tone.as_ref()?);
        let result = edit(&mut draft)?;
        self.tone = Some(Arc::new(draft));
        self.touch();
        Some(result)
    }

    pub fn catalog(&self) -> &Arc<FxCatalog> {
        &self.catalog
    }

    pub fn last_command(&self) -> CommandKind {
        self.last_command
    }

    /// Record the command about to be sent. Not a visible change on its own.
    pub fn set_last_command(&mut self, kind: CommandKind) {
        self.last_command = kind;
    }

    pub fn snapshot(&self) -> MirrorSnapshot {
        MirrorSnapshot {
            version: self.version,
            connection: self.connection.clone(),
            devices: self.devices.clone(),
            scan_in_progress: self.scan_in_progress,
            selected_channel: self.selected_channel,
            tone: self.tone.clone(),
            catalog: Arc::clone(&self.catalog),
            last_command: self.last_command,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::load_default_catalog;
    use crate::fx_id::FxIdNormalizer;
    use crate::tone::{ToneFx, ToneSource};

    fn mirror_with_tone() -> DeviceMirror {
        let catalog = Arc::new(load_default_catalog(FxIdNormalizer::default()).unwrap());
        let mut mirror = DeviceMirror::new(catalog, vec![]);
        mirror.replace_tone(Tone {
            tone_id: "t".to_string(),
            name: "Test".to_string(),
            description: None,
            image_url: None,
            source: ToneSource::Device,
            bpm: None,
            fx: vec![ToneFx {
                type_id: "pg.spark40.Booster".to_string(),
                name: "Booster".to_string(),
                enabled: false,
                params: vec![],
            }],
        });
        mirror
    }

    #[test]
    fn test_fx_focused_kinds() {
        assert!(CommandKind::FxTypeChange.is_fx_focused());
        assert!(CommandKind::FxParamChange.is_fx_focused());
        assert!(CommandKind::FxToggle.is_fx_focused());
        assert!(!CommandKind::AmpChange.is_fx_focused());
        assert!(!CommandKind::PresetQuery.is_fx_focused());
        assert!(!CommandKind::None.is_fx_focused());
    }

    #[test]
    fn test_edit_tone_swaps_copy() {
        let mut mirror = mirror_with_tone();
        let before = Arc::clone(mirror.tone().unwrap());
        let version = mirror.version();

        mirror.edit_tone(|tone| {
            tone.fx[0].enabled = true;
            Some(())
        });

        // Earlier readers keep their copy
        assert!(!before.fx[0].enabled);
        assert!(mirror.tone().unwrap().fx[0].enabled);
        assert_eq!(mirror.version(), version + 1);
    }

    #[test]
    fn test_rejected_edit_leaves_mirror_alone() {
        let mut mirror = mirror_with_tone();
        let before = Arc::clone(mirror.tone().unwrap());
        let version = mirror.version();

        let out: Option<()> = mirror.edit_tone(|tone| {
            tone.fx[0].enabled = true;
            None
        });

        assert!(out.is_none());
        assert!(Arc::ptr_eq(&before, mirror.tone().unwrap()));
        assert_eq!(mirror.version(), version);
    }

    #[test]
    fn test_edit_without_tone() {
        let catalog = Arc::new(load_default_catalog(FxIdNormalizer::default()).unwrap());
        let mut mirror = DeviceMirror::new(catalog, vec![]);
        assert_eq!(mirror.edit_tone(|_| Some(1)), None);
        assert_eq!(mirror.version(), 0);
    }

    #[test]
    fn test_marker_does_not_bump_version() {
        let mut mirror = mirror_with_tone();
        let version = mirror.version();
        mirror.set_last_command(CommandKind::FxToggle);
        assert_eq!(mirror.version(), version);
        assert_eq!(mirror.snapshot().last_command, CommandKind::FxToggle);
    }
}
