use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::StorageError;
use crate::units::{format_altitude, format_velocity, AltitudeUnit, UnitPreference, VelocityUnit};

/// Key holding the flight log in the key-value store
pub const LOGS_KEY: &str = "logs";

/// One persisted vario/altitude observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Vertical speed tagged with its unit, e.g. `"1.25 m/s"`
    pub speed: String,
    /// Altitude tagged with its unit, e.g. `"328.08 ft"`
    pub alt: String,
    /// Epoch milliseconds
    pub timestamp: i64,
}

impl LogRecord {
    pub fn new(speed: String, alt: String, timestamp: i64) -> Self {
        Self { speed, alt, timestamp }
    }

    /// Build a record from raw SI readings, converted into the given units.
    /// An undefined rate is logged as zero.
    pub fn from_reading(
        rate_mps: Option<f64>,
        altitude_m: f64,
        units: UnitPreference,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            speed: format_velocity(rate_mps.unwrap_or(0.0), units.velocity),
            alt: format_altitude(altitude_m, units.altitude),
            timestamp: at.timestamp_millis(),
        }
    }

    /// Unit the speed was recorded in; untagged values are m/s
    pub fn speed_unit(&self) -> VelocityUnit {
        if self.speed.contains("ft") {
            VelocityUnit::FeetPerSecond
        } else {
            VelocityUnit::MetersPerSecond
        }
    }

    /// Unit the altitude was recorded in; untagged values are meters
    pub fn alt_unit(&self) -> AltitudeUnit {
        if self.alt.contains("ft") {
            AltitudeUnit::Feet
        } else {
            AltitudeUnit::Meters
        }
    }

    pub fn recorded_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }

    /// Local date and time for the log review screen
    pub fn formatted_time(&self) -> String {
        match self.recorded_at() {
            Some(at) => at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string(),
            None => format!("invalid timestamp {}", self.timestamp),
        }
    }
}

/// Persistent string key-value store backing the flight log.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Directory-backed store, one `<key>.json` file per key.
///
/// Values are written to a temporary file and renamed into place, so a reader
/// sees either the old or the new value. No cross-process locking.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// In-process store for ephemeral sessions and tests
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the backend going away; every call fails with `IoFailure`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::IoFailure("memory store unavailable".to_string()));
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check_available()?;
        let values = self
            .values
            .lock()
            .map_err(|_| StorageError::IoFailure("memory store lock poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_available()?;
        let mut values = self
            .values
            .lock()
            .map_err(|_| StorageError::IoFailure("memory store lock poisoned".to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Append-only flight log stored as a JSON array under a single key.
///
/// Appends are read-modify-write over the whole array and are serialized by an
/// async mutex, so concurrent appenders in this process never lose records.
pub struct FlightLog {
    store: Arc<dyn KeyValueStore>,
    key: String,
    lock: tokio::sync::Mutex<()>,
}

impl FlightLog {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_key(store, LOGS_KEY)
    }

    pub fn with_key(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Append one record.
    ///
    /// If the stored log cannot be decoded the append fails with `DecodeFailure`
    /// and the stored data is left untouched.
    pub async fn append(&self, record: LogRecord) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;

        let mut records = self.load()?;
        records.push(record);

        let encoded = serde_json::to_string(&records)
            .map_err(|e| StorageError::EncodeFailure(e.to_string()))?;
        self.store.set(&self.key, &encoded)
    }

    /// All records in insertion order; empty if nothing was ever appended
    pub async fn read_all(&self) -> Result<Vec<LogRecord>, StorageError> {
        let _guard = self.lock.lock().await;
        self.load()
    }

    pub async fn len(&self) -> Result<usize, StorageError> {
        Ok(self.read_all().await?.len())
    }

    fn load(&self) -> Result<Vec<LogRecord>, StorageError> {
        match self.store.get(&self.key)? {
            Some(raw) => decode_records(&raw),
            None => Ok(Vec::new()),
        }
    }
}

fn decode_records(raw: &str) -> Result<Vec<LogRecord>, StorageError> {
    serde_json::from_str(raw).map_err(|e| StorageError::DecodeFailure(e.to_string()))
}
