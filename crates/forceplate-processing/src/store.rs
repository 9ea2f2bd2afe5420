//! Participant configuration store
//!
//! The store holds one key/value document per participant. The pipeline
//! reads the `analogs` section and writes back `onset.<trial>` only; every
//! other field of the document is left untouched.

use crate::assignment::AssignmentAttempt;
use forceplate_core::{ForceError, ForceResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The `analogs` section of a participant document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogsConfig {
    /// Directories holding the trial files; the first one is processed
    pub data: Vec<PathBuf>,
    /// Assignment attempts in priority order
    #[serde(default)]
    pub assigned: Vec<AssignmentAttempt>,
    /// Canonical target labels
    #[serde(default)]
    pub targets: Vec<String>,
}

impl AnalogsConfig {
    /// Directory the trials are enumerated from
    pub fn trial_directory(&self) -> Option<&Path> {
        self.data.first().map(PathBuf::as_path)
    }
}

/// Per-participant configuration access
pub trait ConfigStore {
    /// Participants with a document, in sorted order
    fn participants(&self) -> ForceResult<Vec<String>>;

    /// Read the participant's `analogs` section
    fn analogs(&self, participant: &str) -> ForceResult<AnalogsConfig>;

    /// Record `onset.<trial> = [onset, offset]` in seconds
    fn record_onset(&mut self, participant: &str, trial: &str, onset: f64, offset: f64) -> ForceResult<()>;

    /// Previously recorded onset and offset of a trial
    fn onset(&self, participant: &str, trial: &str) -> ForceResult<Option<(f64, f64)>>;
}

/// Sibling of `path` that a replacement is written to before it is renamed
/// into place
pub(crate) fn staging_path(path: &Path) -> PathBuf {
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or("staged");
    path.with_file_name(format!(".{}.tmp.{}", name, std::process::id()))
}

fn store_error(participant: &str, reason: impl Into<String>) -> ForceError {
    ForceError::Store {
        participant: participant.to_string(),
        reason: reason.into(),
    }
}

fn analogs_from_document(participant: &str, document: &Value) -> ForceResult<AnalogsConfig> {
    let analogs = document
        .get("analogs")
        .cloned()
        .ok_or_else(|| store_error(participant, "missing analogs section"))?;
    serde_json::from_value(analogs)
        .map_err(|e| store_error(participant, format!("malformed analogs section: {}", e)))
}

fn onset_from_document(document: &Value, trial: &str) -> Option<(f64, f64)> {
    let pair = document.get("onset")?.get(trial)?.as_array()?;
    match pair.as_slice() {
        [onset, offset] => Some((onset.as_f64()?, offset.as_f64()?)),
        _ => None,
    }
}

fn write_onset(participant: &str, document: &mut Value, trial: &str, onset: f64, offset: f64) -> ForceResult<()> {
    let root = document
        .as_object_mut()
        .ok_or_else(|| store_error(participant, "document is not an object"))?;
    let section = root
        .entry("onset")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| store_error(participant, "onset field is not an object"))?;
    section.insert(trial.to_string(), json!([onset, offset]));
    Ok(())
}

/// Store backed by `<root>/<participant>.json` documents
#[derive(Debug, Clone)]
pub struct JsonConfigStore {
    root: PathBuf,
    base_dir: PathBuf,
}

impl JsonConfigStore {
    /// Relative data directories resolve against `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            base_dir: root.clone(),
            root,
        }
    }

    /// Resolve relative data directories against `base_dir` instead
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn document_path(&self, participant: &str) -> PathBuf {
        self.root.join(format!("{}.json", participant))
    }

    fn read_document(&self, participant: &str) -> ForceResult<Value> {
        let path = self.document_path(participant);
        let text = std::fs::read_to_string(&path)
            .map_err(|e| store_error(participant, format!("cannot read {}: {}", path.display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| store_error(participant, format!("cannot parse {}: {}", path.display(), e)))
    }

    fn write_document(&self, participant: &str, document: &Value) -> ForceResult<()> {
        let path = self.document_path(participant);
        let text = serde_json::to_string_pretty(document)
            .map_err(|e| store_error(participant, e.to_string()))?;
        let staging = staging_path(&path);
        let result = std::fs::write(&staging, text).and_then(|()| std::fs::rename(&staging, &path));
        result.map_err(|e| {
            let _ = std::fs::remove_file(&staging);
            store_error(participant, format!("cannot write {}: {}", path.display(), e))
        })
    }
}

impl ConfigStore for JsonConfigStore {
    fn participants(&self) -> ForceResult<Vec<String>> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| ForceError::io(&self.root, e))?;
        let mut participants = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| ForceError::io(&self.root, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                participants.push(stem.to_string());
            }
        }
        participants.sort();
        Ok(participants)
    }

    fn analogs(&self, participant: &str) -> ForceResult<AnalogsConfig> {
        let mut analogs = analogs_from_document(participant, &self.read_document(participant)?)?;
        for dir in &mut analogs.data {
            if dir.is_relative() {
                *dir = self.base_dir.join(&*dir);
            }
        }
        Ok(analogs)
    }

    fn record_onset(&mut self, participant: &str, trial: &str, onset: f64, offset: f64) -> ForceResult<()> {
        let mut document = self.read_document(participant)?;
        write_onset(participant, &mut document, trial, onset, offset)?;
        self.write_document(participant, &document)?;
        debug!(participant, trial, onset, offset, "onset recorded");
        Ok(())
    }

    fn onset(&self, participant: &str, trial: &str) -> ForceResult<Option<(f64, f64)>> {
        Ok(onset_from_document(&self.read_document(participant)?, trial))
    }
}

/// In-memory store holding the same documents as [`JsonConfigStore`]
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
    documents: BTreeMap<String, Value>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a participant with the given `analogs` section
    pub fn insert_analogs(&mut self, participant: &str, analogs: &AnalogsConfig) -> ForceResult<()> {
        let section = serde_json::to_value(analogs).map_err(|e| store_error(participant, e.to_string()))?;
        let document = self
            .documents
            .entry(participant.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        let root = document
            .as_object_mut()
            .ok_or_else(|| store_error(participant, "document is not an object"))?;
        root.insert("analogs".to_string(), section);
        Ok(())
    }

    /// Add a raw participant document
    pub fn insert_document(&mut self, participant: &str, document: Value) {
        self.documents.insert(participant.to_string(), document);
    }

    pub fn document(&self, participant: &str) -> Option<&Value> {
        self.documents.get(participant)
    }

    fn get(&self, participant: &str) -> ForceResult<&Value> {
        self.documents
            .get(participant)
            .ok_or_else(|| store_error(participant, "unknown participant"))
    }
}

impl ConfigStore for MemoryConfigStore {
    fn participants(&self) -> ForceResult<Vec<String>> {
        Ok(self.documents.keys().cloned().collect())
    }

    fn analogs(&self, participant: &str) -> ForceResult<AnalogsConfig> {
        analogs_from_document(participant, self.get(participant)?)
    }

    fn record_onset(&mut self, participant: &str, trial: &str, onset: f64, offset: f64) -> ForceResult<()> {
        let document = self
            .documents
            .get_mut(participant)
            .ok_or_else(|| store_error(participant, "unknown participant"))?;
        write_onset(participant, document, trial, onset, offset)
    }

    fn onset(&self, participant: &str, trial: &str) -> ForceResult<Option<(f64, f64)>> {
        Ok(onset_from_document(self.get(participant)?, trial))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("forceplate-store-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn analogs() -> AnalogsConfig {
        AnalogsConfig {
            data: vec![PathBuf::from("trials")],
            assigned: vec![AssignmentAttempt::from_names(&["Fx", "", "Fz"])],
            targets: vec!["Fx".into(), "Fy".into(), "Fz".into()],
        }
    }

    #[test]
    fn test_json_store_preserves_unknown_fields() {
        let dir = temp_dir();
        let document = json!({
            "emg": {"data": ["trials", "mvc"]},
            "analogs": {
                "data": ["trials"],
                "assigned": [["Fx", null, "Fz"]],
                "targets": ["Fx", "Fy", "Fz"]
            },
            "onset": {"old_trial": [0.5, 2.0]}
        });
        std::fs::write(dir.join("p1.json"), document.to_string()).unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let mut store = JsonConfigStore::new(&dir);
        assert_eq!(store.participants().unwrap(), vec!["p1".to_string()]);

        let loaded = store.analogs("p1").unwrap();
        assert_eq!(loaded.trial_directory(), Some(dir.join("trials").as_path()));
        assert_eq!(loaded.assigned[0].empty_slots(), vec![1]);

        store.record_onset("p1", "trial_1", 1.25, 4.5).unwrap();
        assert_eq!(store.onset("p1", "trial_1").unwrap(), Some((1.25, 4.5)));
        assert_eq!(store.onset("p1", "old_trial").unwrap(), Some((0.5, 2.0)));

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("p1.json")).unwrap()).unwrap();
        assert_eq!(written["emg"]["data"][1], "mvc");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_json_store_errors() {
        let dir = temp_dir();
        std::fs::write(dir.join("broken.json"), "{not json").unwrap();
        std::fs::write(dir.join("empty.json"), "{}").unwrap();
        let store = JsonConfigStore::new(&dir);

        assert!(matches!(store.analogs("broken"), Err(ForceError::Store { .. })));
        assert!(matches!(store.analogs("empty"), Err(ForceError::Store { .. })));
        assert!(matches!(store.analogs("missing"), Err(ForceError::Store { .. })));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_failed_write_keeps_previous_document() {
        let dir = temp_dir();
        let document = json!({"analogs": {"data": ["trials"]}, "onset": {"t": [1.0, 2.0]}});
        std::fs::write(dir.join("p1.json"), document.to_string()).unwrap();
        let mut store = JsonConfigStore::new(&dir);

        store.record_onset("p1", "t", 1.5, 2.5).unwrap();
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 1);

        // a directory in the staging location makes the write fail
        let staging = staging_path(&store.document_path("p1"));
        std::fs::create_dir_all(&staging).unwrap();
        let result = store.record_onset("p1", "t", 3.0, 4.0);
        assert!(matches!(result, Err(ForceError::Store { .. })));
        assert_eq!(store.onset("p1", "t").unwrap(), Some((1.5, 2.5)));
        assert_eq!(store.participants().unwrap(), vec!["p1".to_string()]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryConfigStore::new();
        store.insert_analogs("p2", &analogs()).unwrap();
        store.insert_analogs("p1", &analogs()).unwrap();
        assert_eq!(store.participants().unwrap(), vec!["p1", "p2"]);
        assert_eq!(store.analogs("p1").unwrap(), analogs());

        assert_eq!(store.onset("p1", "t").unwrap(), None);
        store.record_onset("p1", "t", 0.5, 3.0).unwrap();
        assert_eq!(store.onset("p1", "t").unwrap(), Some((0.5, 3.0)));
        assert!(store.record_onset("unknown", "t", 0.5, 3.0).is_err());
    }
}
