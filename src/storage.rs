//! Durable cache of known devices using sled
//!
//! Holds two records between sessions: the devices seen in the last scan and the
//! device that was last connected successfully. Reads never fail: missing or
//! unreadable records come back empty, and write failures are logged.

use crate::transport::DeviceInfo;
use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, info, warn};

/// Key of the last scan result
pub const KNOWN_DEVICES_KEY: &str = "last_known_devices";

/// Key of the last successfully connected device
pub const LAST_CONNECTED_KEY: &str = "last_connected_device";

/// Persistence boundary for device records
pub trait DeviceStore: Send + Sync {
    fn load_known_devices(&self) -> Vec<DeviceInfo>;
    fn save_known_devices(&self, devices: &[DeviceInfo]);
    fn load_last_connected(&self) -> Option<DeviceInfo>;
    fn save_last_connected(&self, device: &DeviceInfo);
}

/// Stored record wrapper
#[derive(Debug, Serialize, Deserialize)]
struct Record<T> {
    /// Version of the record format
    version: String,
    /// Milliseconds since epoch
    timestamp: u64,
    data: T,
}

impl<T> Record<T> {
    const VERSION: &'static str = "1.0.0";

    fn new(data: T) -> Self {
        Self {
            version: Self::VERSION.to_string(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            data,
        }
    }
}

fn encode<T: Serialize>(data: T) -> Option<Vec<u8>> {
    match serde_json::to_vec(&Record::new(data)) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            error!("Failed to serialize device record: {}", e);
            None
        }
    }
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Option<T> {
    match serde_json::from_slice::<Record<T>>(bytes) {
        Ok(record) => {
            debug!(key, version = %record.version, timestamp = record.timestamp, "Loaded device record");
            Some(record.data)
        }
        Err(e) => {
            warn!(key, "Discarding unreadable device record: {}", e);
            None
        }
    }
}

/// sled-backed device store
pub struct SledDeviceStore {
    db: sled::Db,
}

impl SledDeviceStore {
    /// Open (or create) the database at `db_path`
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        let db = sled::open(db_path)
            .with_context(|| format!("Failed to open sled database at: {}", db_path.display()))?;

        info!("Device store opened database at: {}", db_path.display());
        Ok(Self { db })
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush().context("Failed to flush sled database")?;
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.db.get(key) {
            Ok(Some(bytes)) => decode(key, &bytes),
            Ok(None) => {
                debug!(key, "No device record found");
                None
            }
            Err(e) => {
                error!(key, "Failed to read device record from sled: {}", e);
                None
            }
        }
    }

    fn write<T: Serialize>(&self, key: &str, data: T) {
        let Some(bytes) = encode(data) else {
            return;
        };
        if let Err(e) = self.db.insert(key, bytes) {
            error!(key, "Failed to write device record to sled: {}", e);
        }
    }
}

impl DeviceStore for SledDeviceStore {
    fn load_known_devices(&self) -> Vec<DeviceInfo> {
        self.read(KNOWN_DEVICES_KEY).unwrap_or_default()
    }

    fn save_known_devices(&self, devices: &[DeviceInfo]) {
        self.write(KNOWN_DEVICES_KEY, devices);
    }

    fn load_last_connected(&self) -> Option<DeviceInfo> {
        self.read(LAST_CONNECTED_KEY)
    }

    fn save_last_connected(&self, device: &DeviceInfo) {
        self.write(LAST_CONNECTED_KEY, device);
    }
}

/// Non-durable store for tests and for running without a state directory
#[derive(Default)]
pub struct MemoryDeviceStore {
    records: Mutex<HashMap<&'static str, Vec<u8>>>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite a raw record (for simulating corrupt data)
    pub fn put_raw(&self, key: &'static str, bytes: Vec<u8>) {
        self.records.lock().insert(key, bytes);
    }

    fn read<T: DeserializeOwned>(&self, key: &'static str) -> Option<T> {
        let records = self.records.lock();
        records.get(key).and_then(|bytes| decode(key, bytes))
    }

    fn write<T: Serialize>(&self, key: &'static str, data: T) {
        if let Some(bytes) = encode(data) {
            self.records.lock().insert(key, bytes);
        }
    }
}

impl DeviceStore for MemoryDeviceStore {
    fn load_known_devices(&self) -> Vec<DeviceInfo> {
        self.read(KNOWN_DEVICES_KEY).unwrap_or_default()
    }

    fn save_known_devices(&self, devices: &[DeviceInfo]) {
        self.write(KNOWN_DEVICES_KEY, devices);
    }

    fn load_last_connected(&self) -> Option<DeviceInfo> {
        self.read(LAST_CONNECTED_KEY)
    }

    fn save_last_connected(&self, device: &DeviceInfo) {
        self.write(LAST_CONNECTED_KEY, device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn devices() -> Vec<DeviceInfo> {
        vec![
            DeviceInfo::new("Spark 40", "AA:BB:CC:DD:EE:01"),
            DeviceInfo::new("Spark Mini", "AA:BB:CC:DD:EE:02"),
        ]
    }

    #[test]
    fn test_sled_round_trip() {
        let temp = tempdir().unwrap();
        let store = SledDeviceStore::open(temp.path().join("devices.sled")).unwrap();

        store.save_known_devices(&devices());
        store.save_last_connected(&devices()[1]);
        store.flush().unwrap();

        assert_eq!(store.load_known_devices(), devices());
        assert_eq!(store.load_last_connected(), Some(devices()[1].clone()));
    }

    #[test]
    fn test_sled_survives_reopen() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("devices.sled");
        {
            let store = SledDeviceStore::open(&path).unwrap();
            store.save_known_devices(&devices());
            store.flush().unwrap();
        }

        let store = SledDeviceStore::open(&path).unwrap();
        assert_eq!(store.load_known_devices().len(), 2);
    }

    #[test]
    fn test_empty_store_reads_empty() {
        let temp = tempdir().unwrap();
        let store = SledDeviceStore::open(temp.path().join("devices.sled")).unwrap();
        assert!(store.load_known_devices().is_empty());
        assert!(store.load_last_connected().is_none());
    }

    #[test]
    fn test_corrupt_sled_record_reads_empty() {
        let temp = tempdir().unwrap();
        let store = SledDeviceStore::open(temp.path().join("devices.sled")).unwrap();
        store.db.insert(KNOWN_DEVICES_KEY, &b"{not json"[..]).unwrap();
        store.db.insert(LAST_CONNECTED_KEY, &b"[]"[..]).unwrap();

        assert!(store.load_known_devices().is_empty());
        assert!(store.load_last_connected().is_none());
    }

    #[test]
    fn test_memory_store_corrupt_record() {
        let store = MemoryDeviceStore::new();
        store.save_known_devices(&devices());
        assert_eq!(store.load_known_devices().len(), 2);

        store.put_raw(KNOWN_DEVICES_KEY, b"garbage".to_vec());
        assert!(store.load_known_devices().is_empty());
    }
}
