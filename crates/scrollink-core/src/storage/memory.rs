//! In-memory storage implementation.

use super::{BoxFuture, StorageError, StorageResult, StrokeRow, StrokeStore, visible_rows};
use crate::stroke::StrokeId;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory storage for testing and ephemeral use.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rooms: RwLock<HashMap<String, HashMap<StrokeId, StrokeRow>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows stored for `room`.
    pub fn len(&self, room: &str) -> usize {
        self.rooms
            .read()
            .map(|rooms| rooms.get(room).map_or(0, HashMap::len))
            .unwrap_or(0)
    }
}

fn lock_error(e: impl std::fmt::Display) -> StorageError {
    StorageError::Other(format!("Lock error: {e}"))
}

impl StrokeStore for MemoryStore {
    fn upsert(&self, room: &str, rows: &[StrokeRow]) -> BoxFuture<'_, StorageResult<()>> {
        let room = room.to_string();
        let rows = rows.to_vec();
        Box::pin(async move {
            let mut rooms = self.rooms.write().map_err(lock_error)?;
            let table = rooms.entry(room).or_default();
            for row in rows {
                table.insert(row.id.clone(), row);
            }
            Ok(())
        })
    }

    fn load_visible(&self, room: &str, min_y: f64) -> BoxFuture<'_, StorageResult<Vec<StrokeRow>>> {
        let room = room.to_string();
        Box::pin(async move {
            let rooms = self.rooms.read().map_err(lock_error)?;
            let table = rooms.get(&room).ok_or(StorageError::NotFound(room))?;
            Ok(visible_rows(table.values().cloned(), min_y))
        })
    }

    fn rooms(&self) -> BoxFuture<'_, StorageResult<Vec<String>>> {
        Box::pin(async move {
            let rooms = self.rooms.read().map_err(lock_error)?;
            let mut names: Vec<String> = rooms.keys().cloned().collect();
            names.sort();
            Ok(names)
        })
    }
}
