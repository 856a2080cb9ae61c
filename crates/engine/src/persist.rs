use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::session::ProcessOptions;
use crate::timeline::{Clip, validate_clips, validate_keyframes};

pub const CLIPS_KEY: &str = "clips";
pub const KEYFRAMES_KEY: &str = "keyframes";
pub const INPUT_DURATION_KEY: &str = "inputDuration";
pub const INPUT_KEY: &str = "input";
pub const OPTIONS_KEY: &str = "options";

/// Durable string key/value storage. A missing key means "no prior value".
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&mut self, key: &str, value: String) -> Result<()>;

    fn remove(&mut self, key: &str) -> Result<()>;
}

/// In-process store used by tests and headless runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_owned(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Store persisted as one JSON object file, rewritten on every change.
///
/// # Example
/// ```no_run
/// use clip_engine::persist::{JsonFileStore, KeyValueStore};
///
/// let mut store = JsonFileStore::open("clipper-state.json").expect("open store");
/// store.set("input", "match.mp4".to_owned()).expect("write store");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl JsonFileStore {
    /// Opens the store at `path`. A missing file starts an empty store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| {
                EngineError::StoreSerialization {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = ?path, "store file missing, starting empty");
                BTreeMap::new()
            }
            Err(source) => {
                return Err(EngineError::StoreIo {
                    context: "read store file",
                    path,
                    source,
                });
            }
        };

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        let contents = serde_json::to_string_pretty(&self.entries).map_err(|source| {
            EngineError::StoreSerialization {
                path: self.path.clone(),
                source,
            }
        })?;
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| EngineError::StoreIo {
                context: "create store directory",
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&self.path, contents).map_err(|source| EngineError::StoreIo {
            context: "write store file",
            path: self.path.clone(),
            source,
        })
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_owned(), value);
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        if self.entries.remove(key).is_some() {
            self.flush()?;
        }
        Ok(())
    }
}

/// Timeline fields restored from the store at startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredTimeline {
    pub clips: Vec<Clip>,
    pub keyframes: Vec<f64>,
    pub input_duration: Option<f64>,
}

/// Reads the persisted timeline.
///
/// Returns `MalformedPersistedState` when a value fails to parse or the clip
/// list violates ordering; callers degrade that to an empty timeline.
pub fn load_timeline(store: &impl KeyValueStore) -> Result<StoredTimeline> {
    let clips: Vec<Clip> = read_json(store, CLIPS_KEY)?.unwrap_or_default();
    validate_clips(&clips).map_err(|reason| EngineError::MalformedPersistedState {
        key: CLIPS_KEY,
        reason,
    })?;

    let keyframes: Vec<f64> = read_json(store, KEYFRAMES_KEY)?.unwrap_or_default();
    validate_keyframes(&keyframes).map_err(|reason| EngineError::MalformedPersistedState {
        key: KEYFRAMES_KEY,
        reason,
    })?;

    let input_duration = match store.get(INPUT_DURATION_KEY)? {
        Some(raw) => Some(raw.trim().parse::<f64>().map_err(|error| {
            EngineError::MalformedPersistedState {
                key: INPUT_DURATION_KEY,
                reason: format!("{raw:?}: {error}"),
            }
        })?),
        None => None,
    };

    Ok(StoredTimeline {
        clips,
        keyframes,
        input_duration,
    })
}

pub fn save_clips(store: &mut impl KeyValueStore, clips: &[Clip]) -> Result<()> {
    write_json(store, CLIPS_KEY, &clips)
}

/// Persists everything a processing run produced.
pub fn save_timeline(
    store: &mut impl KeyValueStore,
    clips: &[Clip],
    keyframes: &[f64],
    input_duration: Option<f64>,
) -> Result<()> {
    save_clips(store, clips)?;
    write_json(store, KEYFRAMES_KEY, &keyframes)?;
    match input_duration {
        Some(duration) => store.set(INPUT_DURATION_KEY, duration.to_string()),
        None => store.remove(INPUT_DURATION_KEY),
    }
}

pub fn load_input(store: &impl KeyValueStore) -> Result<Option<PathBuf>> {
    Ok(store
        .get(INPUT_KEY)?
        .filter(|value| !value.is_empty())
        .map(PathBuf::from))
}

/// Stores the last-used input path, or forgets it when `input` is `None`.
pub fn save_input(store: &mut impl KeyValueStore, input: Option<&Path>) -> Result<()> {
    match input {
        Some(path) => store.set(INPUT_KEY, path.to_string_lossy().into_owned()),
        None => store.remove(INPUT_KEY),
    }
}

/// Reads persisted options, falling back to defaults on absence or damage.
pub fn load_options(store: &impl KeyValueStore) -> ProcessOptions {
    match read_json(store, OPTIONS_KEY) {
        Ok(Some(options)) => options,
        Ok(None) => ProcessOptions::default(),
        Err(error) => {
            warn!(%error, "stored options ignored");
            ProcessOptions::default()
        }
    }
}

pub fn save_options(store: &mut impl KeyValueStore, options: &ProcessOptions) -> Result<()> {
    write_json(store, OPTIONS_KEY, options)
}

fn read_json<T: DeserializeOwned>(
    store: &impl KeyValueStore,
    key: &'static str,
) -> Result<Option<T>> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|error| EngineError::MalformedPersistedState {
            key,
            reason: error.to_string(),
        })
}

fn write_json<T: Serialize + ?Sized>(
    store: &mut impl KeyValueStore,
    key: &'static str,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_string(value).map_err(|error| EngineError::MalformedPersistedState {
        key,
        reason: error.to_string(),
    })?;
    store.set(key, raw)
}
