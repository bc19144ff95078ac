use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};
use tracing::warn;

use super::{KeyValueStore, StoreError};

/// Stores every key as a top-level field of one JSON object file.
///
/// Writes go to a sibling temp file which is then renamed over the target, so a
/// crash mid-write leaves the previous record intact.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    fn load_object(&self) -> Result<Option<Map<String, Value>>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.display_path(),
                    source,
                });
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            Ok(_) => Err(StoreError::Corrupt {
                path: self.display_path(),
                reason: "top-level value is not an object".to_string(),
            }),
            Err(err) => Err(StoreError::Corrupt {
                path: self.display_path(),
                reason: err.to_string(),
            }),
        }
    }

    fn persist_object(&self, object: Map<String, Value>) -> Result<(), StoreError> {
        let encoded = serde_json::to_vec_pretty(&Value::Object(object)).map_err(|err| {
            StoreError::Write {
                path: self.display_path(),
                source: std::io::Error::other(err),
            }
        })?;

        let mut temp_name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        temp_name.push(".tmp");
        let temp_path = self.path.with_file_name(temp_name);

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: self.display_path(),
                source,
            })?;
        }

        fs::write(&temp_path, encoded).map_err(|source| StoreError::Write {
            path: temp_path.display().to_string(),
            source,
        })?;
        fs::rename(&temp_path, &self.path).map_err(|source| StoreError::Write {
            path: self.display_path(),
            source,
        })
    }
}

impl KeyValueStore for JsonFileStore {
    fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .load_object()?
            .and_then(|mut object| object.remove(key)))
    }

    fn write(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.write_many(vec![(key.to_string(), value)])
    }

    fn write_many(&self, entries: Vec<(String, Value)>) -> Result<(), StoreError> {
        let _guard = match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut object = match self.load_object() {
            Ok(existing) => existing.unwrap_or_default(),
            Err(err @ StoreError::Corrupt { .. }) => {
                warn!(error = %err, "replacing unreadable record file");
                Map::new()
            }
            Err(err) => return Err(err),
        };
        for (key, value) in entries {
            object.insert(key, value);
        }

        self.persist_object(object)
    }
}
