//! Loro document schema and operations.

use super::CrdtError;
use super::convert::{stroke_from_loro, stroke_to_loro};
use crate::stroke::{Stroke, StrokeId};
use loro::{Container, ExportMode, LoroDoc, LoroMap, LoroValue, ValueOrContainer, VersionVector};
use std::collections::{BTreeMap, BTreeSet};

/// Key for the strokes map in the document.
pub const STROKES_KEY: &str = "strokes";

/// Ids whose entries changed during an import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    /// Added or modified entries.
    pub changed: Vec<StrokeId>,
    /// Entries that disappeared.
    pub removed: Vec<StrokeId>,
    /// Some imported changes depend on history this document never saw and
    /// were parked. The document needs a fresh snapshot to catch up.
    pub pending: bool,
}

impl ImportOutcome {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

fn decode_error(id: &str, reason: &str) -> CrdtError {
    CrdtError::Decode {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

/// The shared stroke map.
///
/// Each entry is a field map keyed by stroke id. Local writes replace the
/// whole entry with a fresh container, so an entry's container id changes
/// exactly when its content is rewritten. Merging happens inside Loro.
pub struct StrokeDocument {
    doc: LoroDoc,
}

impl StrokeDocument {
    pub fn new() -> Self {
        Self { doc: LoroDoc::new() }
    }

    /// Create a document from a snapshot.
    pub fn from_snapshot(bytes: &[u8]) -> Result<Self, CrdtError> {
        let doc = LoroDoc::new();
        doc.import(bytes)?;
        Ok(Self { doc })
    }

    pub fn loro_doc(&self) -> &LoroDoc {
        &self.doc
    }

    fn strokes_map(&self) -> LoroMap {
        self.doc.get_map(STROKES_KEY)
    }

    /// Entry ids mapped to their shallow value (the entry's container id).
    /// Point lists are not copied.
    fn shallow_entries(&self) -> BTreeMap<StrokeId, LoroValue> {
        match self.strokes_map().get_value() {
            LoroValue::Map(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            _ => BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.strokes_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.strokes_map().get(id).is_some()
    }

    /// All stroke ids, sorted.
    pub fn ids(&self) -> Vec<StrokeId> {
        self.shallow_entries().into_keys().collect()
    }

    /// Overwrite the entry for `stroke.id` with the full stroke.
    pub fn set(&mut self, stroke: &Stroke) -> Result<(), CrdtError> {
        let strokes = self.strokes_map();
        strokes.delete(&stroke.id)?;
        let entry = strokes.insert_container(&stroke.id, LoroMap::new())?;
        stroke_to_loro(stroke, &entry)?;
        self.doc.commit();
        Ok(())
    }

    /// Remove an entry. Returns whether it existed.
    pub fn delete(&mut self, id: &str) -> Result<bool, CrdtError> {
        if !self.contains(id) {
            return Ok(false);
        }
        self.strokes_map().delete(id)?;
        self.doc.commit();
        Ok(true)
    }

    /// Read one entry. `Ok(None)` when absent, `Err` when it does not decode.
    pub fn get(&self, id: &str) -> Result<Option<Stroke>, CrdtError> {
        match self.strokes_map().get(id) {
            Some(ValueOrContainer::Container(Container::Map(entry))) => match entry.get_deep_value() {
                LoroValue::Map(map) => stroke_from_loro(id, &map).map(Some),
                _ => Err(decode_error(id, "entry is not a map")),
            },
            Some(_) => Err(decode_error(id, "entry is not a map")),
            None => Ok(None),
        }
    }

    /// Visit every entry, decoded.
    pub fn for_each(&self, mut f: impl FnMut(&str, Result<Stroke, CrdtError>)) {
        for id in self.ids() {
            match self.get(&id) {
                Ok(Some(stroke)) => f(&id, Ok(stroke)),
                Ok(None) => {}
                Err(e) => f(&id, Err(e)),
            }
        }
    }

    /// Export the document as a snapshot (full state and history).
    pub fn export_snapshot(&self) -> Vec<u8> {
        self.doc.export(ExportMode::Snapshot).unwrap_or_default()
    }

    /// Export the current state without the history that led to it. A
    /// document built from it can apply every later update.
    pub fn export_shallow_snapshot(&self) -> Vec<u8> {
        let frontiers = self.doc.oplog_frontiers();
        self.doc
            .export(ExportMode::shallow_snapshot(&frontiers))
            .unwrap_or_default()
    }

    /// Whether any change was ever recorded, including entries since deleted.
    pub fn has_history(&self) -> bool {
        self.version() != VersionVector::default()
    }

    /// Drop all history. Later updates must build on the current version.
    pub fn compact(&mut self) -> Result<(), CrdtError> {
        if !self.has_history() {
            return Ok(());
        }
        let doc = LoroDoc::new();
        doc.import(&self.export_shallow_snapshot())?;
        self.doc = doc;
        Ok(())
    }

    /// Export incremental updates since a version.
    pub fn export_updates(&self, since: &VersionVector) -> Vec<u8> {
        self.doc.export(ExportMode::updates(since)).unwrap_or_default()
    }

    /// Get the current version vector.
    pub fn version(&self) -> VersionVector {
        self.doc.oplog_vv()
    }

    /// Import remote changes without working out what they touched.
    /// Returns whether some of them are parked waiting for missing history.
    pub fn merge(&mut self, bytes: &[u8]) -> Result<bool, CrdtError> {
        let status = self.doc.import(bytes)?;
        Ok(status.pending.is_some())
    }

    /// Import remote changes and report which entries they touched.
    pub fn import(&mut self, bytes: &[u8]) -> Result<ImportOutcome, CrdtError> {
        let before = self.shallow_entries();
        let pending = self.merge(bytes)?;
        let after = self.shallow_entries();

        let keys: BTreeSet<&StrokeId> = before.keys().chain(after.keys()).collect();
        let mut outcome = ImportOutcome {
            pending,
            ..ImportOutcome::default()
        };
        for key in keys {
            match (before.get(key), after.get(key)) {
                (_, None) => outcome.removed.push(key.clone()),
                (Some(old), Some(new)) if old == new => {}
                (_, Some(_)) => outcome.changed.push(key.clone()),
            }
        }
        Ok(outcome)
    }
}

impl Default for StrokeDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StrokeDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrokeDocument")
            .field("strokes", &self.len())
            .finish()
    }
}
