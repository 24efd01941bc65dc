//! Reading store backed by JSON files and parking_lot::RwLock
//!
//! Holds the readings, settings and coach conversation for one data
//! directory. Every mutation is written through to disk and announced on
//! the [`EventBus`]; the forecasting engine only ever sees snapshots.
//!
//! Files (all in the data directory):
//! - `readings.json`: `{ "next_id": n, "readings": [...] }`
//! - `settings.json`: [`Settings`]
//! - `chat-history.json`: `[ChatMessage]`

use crate::analytics::UsageReport;
use crate::error::{CoreError, DegradedState, LoadError, LoadReport};
use crate::event::{DataEvent, EventBus};
use chrono::{DateTime, Utc};
use meterwise_types::{ChatMessage, Reading, ReadingId, Settings};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const READINGS_FILE: &str = "readings.json";
pub const SETTINGS_FILE: &str = "settings.json";
pub const CHAT_FILE: &str = "chat-history.json";

/// On-disk layout of `readings.json`
///
/// Unknown fields are rejected so an unrelated JSON object is reported as
/// unreadable instead of loading as an empty log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReadingLog {
    #[serde(default = "first_reading_id")]
    next_id: ReadingId,
    readings: Vec<Reading>,
}

fn first_reading_id() -> ReadingId {
    ReadingId(1)
}

impl Default for ReadingLog {
    fn default() -> Self {
        Self {
            next_id: first_reading_id(),
            readings: Vec::new(),
        }
    }
}

/// `readings.json` as found on disk
///
/// A bare array is accepted too (exports and hand-edited files); the id
/// sequence is then rebuilt from the largest id.
#[derive(Deserialize)]
#[serde(untagged)]
enum ReadingsFile {
    Log(ReadingLog),
    Bare(Vec<Reading>),
}

impl ReadingsFile {
    fn into_log(self) -> ReadingLog {
        match self {
            ReadingsFile::Log(log) => log,
            ReadingsFile::Bare(readings) => ReadingLog {
                next_id: ReadingId(1),
                readings,
            },
        }
    }
}

/// Central store for one data directory
///
/// Readings are kept in insertion order; the engine sorts its own copy.
pub struct ReadingStore {
    data_dir: PathBuf,
    log: RwLock<ReadingLog>,
    settings: RwLock<Settings>,
    chat: RwLock<Vec<ChatMessage>>,
    event_bus: EventBus,
    degraded_state: RwLock<DegradedState>,
}

impl ReadingStore {
    /// Create an empty store rooted at `data_dir` (nothing is read yet)
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            log: RwLock::new(ReadingLog::default()),
            settings: RwLock::new(Settings::default()),
            chat: RwLock::new(ChatMessage::default_history()),
            event_bus: EventBus::default_capacity(),
            degraded_state: RwLock::new(DegradedState::Healthy),
        }
    }

    /// Default data directory (`<platform data dir>/meterwise`)
    pub fn default_data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("meterwise"))
    }

    /// Open the store at `data_dir` and load everything found there
    pub async fn open(data_dir: PathBuf) -> (Self, LoadReport) {
        let store = Self::new(data_dir);
        let report = store.initial_load().await;
        (store, report)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Get the event bus for subscribing to updates
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Get current degraded state
    pub fn degraded_state(&self) -> DegradedState {
        self.degraded_state.read().clone()
    }

    /// Initial load of all files with LoadReport for graceful degradation
    ///
    /// Missing files are warnings, corrupt files are errors; both leave the
    /// defaults in place.
    pub async fn initial_load(&self) -> LoadReport {
        let mut report = LoadReport::new();

        info!(data_dir = %self.data_dir.display(), "Loading meter data");

        if let Err(e) = tokio::fs::create_dir_all(&self.data_dir).await {
            report.add_error(
                LoadError::fatal(
                    "data_dir",
                    format!("Cannot create {}: {}", self.data_dir.display(), e),
                )
                .with_suggestion("Pass --data-dir or set METERWISE_DATA_DIR"),
            );
        }

        self.load_readings(&mut report).await;
        self.load_settings(&mut report).await;
        self.load_chat(&mut report).await;

        self.update_degraded_state(&report);
        self.event_bus.publish(DataEvent::LoadCompleted);

        info!(
            readings = report.reading_count,
            skipped = report.readings_skipped,
            settings_loaded = report.settings_loaded,
            errors = report.errors.len(),
            "Initial load complete"
        );

        report
    }

    async fn load_readings(&self, report: &mut LoadReport) {
        let path = self.data_dir.join(READINGS_FILE);
        let Some(file) = read_json_graceful::<ReadingsFile>(&path, "readings", report).await else {
            return;
        };

        let mut log = file.into_log();
        let before = log.readings.len();
        log.readings.retain(|r| r.value.is_finite() && r.value >= 0.0);
        let skipped = before - log.readings.len();
        if skipped > 0 {
            report.add_warning(
                "readings",
                format!("Skipped {} readings with invalid values", skipped),
            );
        }

        // Never hand out an id that is already taken
        let max_id = log.readings.iter().map(|r| r.id).max();
        if let Some(max_id) = max_id {
            if log.next_id <= max_id {
                debug!(next_id = %log.next_id, max_id = %max_id, "Repairing reading id sequence");
                log.next_id = max_id.next();
            }
        }

        report.readings_loaded = true;
        report.reading_count = log.readings.len();
        report.readings_skipped = skipped;
        *self.log.write() = log;
    }

    async fn load_settings(&self, report: &mut LoadReport) {
        let path = self.data_dir.join(SETTINGS_FILE);
        let Some(settings) = read_json_graceful::<Settings>(&path, "settings", report).await else {
            return;
        };

        if let Err(e) = settings.tariffs.validate() {
            report.add_error(
                LoadError::error("settings", format!("Invalid tariff schedule: {}", e))
                    .with_suggestion("Reset it with `meterwise tariff preset <country>`"),
            );
        }

        report.settings_loaded = true;
        *self.settings.write() = settings;
    }

    async fn load_chat(&self, report: &mut LoadReport) {
        let path = self.data_dir.join(CHAT_FILE);
        let Some(chat) = read_json_graceful::<Vec<ChatMessage>>(&path, "chat", report).await else {
            return;
        };

        report.chat_loaded = true;
        if !chat.is_empty() {
            *self.chat.write() = chat;
        }
    }

    /// Update degraded state based on load report
    fn update_degraded_state(&self, report: &LoadReport) {
        let mut state = self.degraded_state.write();

        // A missing file on first run is not degradation; a corrupt one is
        let failed: Vec<String> = report.problems().map(|e| e.source.clone()).collect();

        if failed.is_empty() {
            *state = DegradedState::Healthy;
        } else {
            *state = DegradedState::PartialData {
                reason: format!("Using defaults for: {}", failed.join(", ")),
                missing: failed,
            };
        }
    }

    // ===================
    // Read accessors
    // ===================

    /// Snapshot of all readings in insertion order
    pub fn readings(&self) -> Vec<Reading> {
        self.log.read().readings.clone()
    }

    /// Readings sorted by timestamp (oldest first)
    pub fn readings_chronological(&self) -> Vec<Reading> {
        let mut readings = self.readings();
        readings.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        readings
    }

    pub fn reading_count(&self) -> usize {
        self.log.read().readings.len()
    }

    /// Most recent reading by timestamp
    pub fn last_reading(&self) -> Option<Reading> {
        self.log
            .read()
            .readings
            .iter()
            .max_by(|a, b| a.timestamp.cmp(&b.timestamp))
            .cloned()
    }

    pub fn get_reading(&self, id: ReadingId) -> Option<Reading> {
        self.log.read().readings.iter().find(|r| r.id == id).cloned()
    }

    pub fn settings(&self) -> Settings {
        self.settings.read().clone()
    }

    pub fn chat_history(&self) -> Vec<ChatMessage> {
        self.chat.read().clone()
    }

    /// Usage report over the current snapshot at `now`
    pub fn report_at<Tz: chrono::TimeZone>(&self, now: &DateTime<Tz>) -> UsageReport {
        let readings = self.log.read().readings.clone();
        let settings = self.settings.read().clone();
        UsageReport::compute(&readings, &settings, now)
    }

    // ===================
    // Mutations
    // ===================

    /// Append a reading taken at `timestamp`
    ///
    /// The value must be a finite, non-negative counter. A value below the
    /// previous reading is accepted (meter replacement); callers decide
    /// whether to confirm it first.
    pub fn add_reading(&self, value: f64, timestamp: DateTime<Utc>) -> Result<Reading, CoreError> {
        if !(value.is_finite() && value >= 0.0) {
            return Err(CoreError::InvalidReading { value });
        }

        let reading = self.modify_log(|log| {
            let reading = Reading::new(log.next_id, timestamp, value);
            log.next_id = log.next_id.next();
            log.readings.push(reading.clone());
            Ok(reading)
        })?;

        info!(id = %reading.id, value, "Reading added");
        self.event_bus.publish(DataEvent::ReadingAdded(reading.id));
        Ok(reading)
    }

    /// Remove one reading by id
    pub fn delete_reading(&self, id: ReadingId) -> Result<Reading, CoreError> {
        let removed = self.modify_log(|log| {
            let index = log
                .readings
                .iter()
                .position(|r| r.id == id)
                .ok_or(CoreError::ReadingNotFound { id: id.0 })?;
            Ok(log.readings.remove(index))
        })?;

        info!(id = %id, "Reading deleted");
        self.event_bus.publish(DataEvent::ReadingDeleted(id));
        Ok(removed)
    }

    /// Remove every reading; the id sequence keeps counting
    pub fn clear_readings(&self) -> Result<usize, CoreError> {
        let count = self.modify_log(|log| {
            let count = log.readings.len();
            log.readings.clear();
            Ok(count)
        })?;

        info!(count, "Readings cleared");
        self.event_bus.publish(DataEvent::ReadingsCleared);
        Ok(count)
    }

    /// Replace the settings after validating the tariff schedule
    pub fn set_settings(&self, settings: Settings) -> Result<(), CoreError> {
        settings
            .tariffs
            .validate()
            .map_err(|e| CoreError::InvalidConfig {
                message: format!("tariff schedule: {}", e),
            })?;
        if !settings.goal.is_finite() || settings.goal < 0.0 {
            return Err(CoreError::InvalidConfig {
                message: format!("goal must be a non-negative amount, got {}", settings.goal),
            });
        }

        write_json_atomic(&self.data_dir.join(SETTINGS_FILE), &settings)?;
        *self.settings.write() = settings;

        info!("Settings saved");
        self.event_bus.publish(DataEvent::SettingsChanged);
        Ok(())
    }

    /// Edit a copy of the settings and save it
    pub fn update_settings<F>(&self, edit: F) -> Result<Settings, CoreError>
    where
        F: FnOnce(&mut Settings),
    {
        let mut settings = self.settings();
        edit(&mut settings);
        self.set_settings(settings.clone())?;
        Ok(settings)
    }

    /// Append messages to the coach conversation
    pub fn append_chat(&self, messages: impl IntoIterator<Item = ChatMessage>) -> Result<(), CoreError> {
        {
            let mut chat = self.chat.write();
            let mut next = chat.clone();
            next.extend(messages);
            write_json_atomic(&self.data_dir.join(CHAT_FILE), &next)?;
            *chat = next;
        }

        self.event_bus.publish(DataEvent::ChatUpdated);
        Ok(())
    }

    /// Reset the coach conversation to the greeting
    pub fn reset_chat(&self) -> Result<(), CoreError> {
        let history = ChatMessage::default_history();
        write_json_atomic(&self.data_dir.join(CHAT_FILE), &history)?;
        *self.chat.write() = history;

        self.event_bus.publish(DataEvent::ChatUpdated);
        Ok(())
    }

    /// Apply `edit` to a copy of the log, persist it, then publish it in memory
    ///
    /// The write lock is held throughout so concurrent edits serialize; a
    /// failed write leaves the in-memory log untouched.
    fn modify_log<T, F>(&self, edit: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut ReadingLog) -> Result<T, CoreError>,
    {
        let mut guard = self.log.write();
        let mut next = guard.clone();
        let out = edit(&mut next)?;
        write_json_atomic(&self.data_dir.join(READINGS_FILE), &next)?;
        *guard = next;
        Ok(out)
    }
}

/// Read and parse a JSON file, recording problems in `report`
async fn read_json_graceful<T: DeserializeOwned>(
    path: &Path,
    source: &str,
    report: &mut LoadReport,
) -> Option<T> {
    match read_json(path).await {
        Ok(value) => Some(value),
        Err(CoreError::FileNotFound { .. }) => {
            debug!(path = %path.display(), "File not found, using defaults");
            report.add_warning(source, format!("{} not found, using defaults", path.display()));
            None
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to load file, using defaults");
            report.add_error(LoadError::from_core_error(source, &e));
            if matches!(e, CoreError::JsonParse { .. }) {
                preserve_unreadable(path, source, report).await;
            }
            None
        }
    }
}

/// Copy an unparseable file aside so the next save cannot destroy it
async fn preserve_unreadable(path: &Path, source: &str, report: &mut LoadReport) {
    let backup = unreadable_backup_path(path);
    match tokio::fs::copy(path, &backup).await {
        Ok(_) => {
            info!(backup = %backup.display(), "Kept a copy of the unreadable file");
            report.add_warning(
                source,
                format!("Unreadable file kept as {}", backup.display()),
            );
        }
        Err(e) => warn!(path = %path.display(), error = %e, "Could not back up unreadable file"),
    }
}

/// `readings.json` -> `readings.json.unreadable`
pub(crate) fn unreadable_backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".unreadable");
    path.with_file_name(name)
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CoreError> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CoreError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            CoreError::FileRead {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })?;

    serde_json::from_str(&content).map_err(|e| CoreError::JsonParse {
        path: path.to_path_buf(),
        message: e.to_string(),
        source: e,
    })
}

/// Write JSON through a temp file + rename so a crash never leaves half a file
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CoreError> {
    let content = serde_json::to_string_pretty(value).map_err(|e| CoreError::JsonSerialize {
        path: path.to_path_buf(),
        source: e,
    })?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CoreError::FileWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, content).map_err(|e| CoreError::FileWrite {
        path: tmp.clone(),
        source: e,
    })?;
    std::fs::rename(&tmp, path).map_err(|e| CoreError::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })?;

    debug!(path = %path.display(), "File written");
    Ok(())
}
