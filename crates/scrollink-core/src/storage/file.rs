//! File-based storage implementation for native platforms.

use super::{BoxFuture, StorageError, StorageResult, StrokeRow, StrokeStore, visible_rows};
use crate::config::PersistConfig;
use crate::stroke::StrokeId;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// File-based storage for native platforms.
///
/// Each room is one JSON file holding its rows keyed by stroke id.
pub struct FileStore {
    base_path: PathBuf,
    /// Serializes read-modify-write cycles on room files.
    write_lock: Mutex<()>,
}

type RoomTable = BTreeMap<StrokeId, StrokeRow>;

impl FileStore {
    /// Create a new file store with the given base directory.
    ///
    /// Creates the directory if it doesn't exist.
    pub fn new(base_path: PathBuf) -> StorageResult<Self> {
        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(|e| {
                StorageError::Io(format!("Failed to create storage directory: {e}"))
            })?;
        }
        Ok(Self {
            base_path,
            write_lock: Mutex::new(()),
        })
    }

    /// Create a file store in the platform data directory, e.g.
    /// `~/.local/share/scrollink` on Linux.
    pub fn default_location() -> StorageResult<Self> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| StorageError::Io("Could not determine home directory".to_string()))?;
        Self::new(base.join("scrollink"))
    }

    /// Use `data_dir` from the configuration, or the default location.
    pub fn from_config(config: &PersistConfig) -> StorageResult<Self> {
        match &config.data_dir {
            Some(dir) => Self::new(dir.clone()),
            None => Self::default_location(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn room_path(&self, room: &str) -> PathBuf {
        let safe: String = room
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.base_path.join(format!("{safe}.json"))
    }
}

fn read_table(path: &Path) -> StorageResult<Option<RoomTable>> {
    if !path.exists() {
        return Ok(None);
    }
    let json = fs::read_to_string(path)
        .map_err(|e| StorageError::Io(format!("Failed to read {}: {e}", path.display())))?;
    serde_json::from_str(&json)
        .map(Some)
        .map_err(|e| StorageError::Serialization(format!("Failed to parse {}: {e}", path.display())))
}

impl StrokeStore for FileStore {
    fn upsert(&self, room: &str, rows: &[StrokeRow]) -> BoxFuture<'_, StorageResult<()>> {
        let path = self.room_path(room);
        let rows = rows.to_vec();
        Box::pin(async move {
            let _guard = self
                .write_lock
                .lock()
                .map_err(|e| StorageError::Other(format!("Lock error: {e}")))?;
            let mut table = read_table(&path)?.unwrap_or_default();
            for row in rows {
                table.insert(row.id.clone(), row);
            }
            let json = serde_json::to_string(&table)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            fs::write(&path, json)
                .map_err(|e| StorageError::Io(format!("Failed to write {}: {e}", path.display())))
        })
    }

    fn load_visible(&self, room: &str, min_y: f64) -> BoxFuture<'_, StorageResult<Vec<StrokeRow>>> {
        let path = self.room_path(room);
        let room = room.to_string();
        Box::pin(async move {
            let table = read_table(&path)?.ok_or(StorageError::NotFound(room))?;
            Ok(visible_rows(table.into_values(), min_y))
        })
    }

    fn rooms(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        let base = self.base_path.clone();
        Box::pin(async move {
            if !base.exists() {
                return Ok(vec![]);
            }
            let entries = fs::read_dir(&base)
                .map_err(|e| StorageError::Io(format!("Failed to read directory: {e}")))?;
            let mut rooms: Vec<String> = entries
                .flatten()
                .map(|entry| entry.path())
                .filter(|path| path.extension().is_some_and(|e| e == "json"))
                .filter_map(|path| path.file_stem()?.to_str().map(str::to_string))
                .collect();
            rooms.sort();
            Ok(rooms)
        })
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("base_path", &self.base_path)
            .finish()
    }
}
