use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::CheckpointError;

pub mod log;

pub use log::LogCheckpoint;

/// A flat bag of persisted properties. Keys serialize in sorted order, so the
/// on-disk form of a snapshot is stable across writes.
pub type Properties = serde_json::Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointKind {
    Snapshot,
    Log,
}

impl CheckpointKind {
    pub fn extension(&self) -> &'static str {
        match self {
            CheckpointKind::Snapshot => "json",
            CheckpointKind::Log => "txt",
        }
    }
}

/// Root directory under which every checkpoint lives, addressed by a relative,
/// `/`-separated path such as `account-refs/<id>`.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, path: &str, kind: CheckpointKind) -> Result<PathBuf, CheckpointError> {
        let relative = Path::new(path);
        let valid = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(CheckpointError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(format!("{path}.{}", kind.extension())))
    }

    // A missing file is "no prior state", any other read failure is surfaced
    pub(crate) fn read(&self, path: &Path) -> Result<Option<String>, CheckpointError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CheckpointError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub(crate) async fn read_async(&self, path: &Path) -> Result<Option<String>, CheckpointError> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CheckpointError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub(crate) fn write(&self, path: &Path, content: &str) -> Result<(), CheckpointError> {
        let write_err = |source| CheckpointError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, content).map_err(write_err)
    }

    pub(crate) async fn write_async(&self, path: &Path, content: &str) -> Result<(), CheckpointError> {
        let write_err = |source| CheckpointError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        tokio::fs::write(path, content).await.map_err(write_err)
    }

    pub(crate) fn read_properties(&self, path: &Path) -> Result<Properties, CheckpointError> {
        parse_properties(path, self.read(path)?)
    }

    pub(crate) async fn read_properties_async(
        &self,
        path: &Path,
    ) -> Result<Properties, CheckpointError> {
        parse_properties(path, self.read_async(path).await?)
    }
}

fn parse_properties(path: &Path, content: Option<String>) -> Result<Properties, CheckpointError> {
    match content {
        Some(content) if !content.trim().is_empty() => {
            serde_json::from_str(&content).map_err(|source| CheckpointError::Corrupt {
                path: path.to_path_buf(),
                source,
            })
        }
        _ => Ok(Properties::new()),
    }
}

/// Snapshot checkpoint capability. An implementor names where it lives and which of
/// its serialized fields are persisted. Saving writes exactly those fields; restoring
/// applies whatever was persisted on top of the current value.
#[async_trait]
pub trait JsonCheckpoint: Serialize + DeserializeOwned + Send + Sync {
    const PROPERTIES: &'static [&'static str];

    fn checkpoint_path(&self) -> String;

    fn properties(&self) -> Result<Properties, CheckpointError> {
        let Value::Object(all) = serde_json::to_value(self)? else {
            return Err(CheckpointError::NotAnObject);
        };
        Ok(Self::PROPERTIES
            .iter()
            .filter_map(|key| all.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect())
    }

    fn set_properties(&mut self, props: Properties) -> Result<(), CheckpointError> {
        if props.is_empty() {
            return Ok(());
        }
        let Value::Object(mut current) = serde_json::to_value(&*self)? else {
            return Err(CheckpointError::NotAnObject);
        };
        current.extend(props);
        *self = serde_json::from_value(Value::Object(current))?;
        Ok(())
    }

    fn save(&self, store: &CheckpointStore) -> Result<PathBuf, CheckpointError> {
        let path = store.path_for(&self.checkpoint_path(), CheckpointKind::Snapshot)?;
        let content = serde_json::to_string_pretty(&self.properties()?)?;
        store.write(&path, &content)?;
        debug!("Saved checkpoint {:?}", path);
        Ok(path)
    }

    async fn save_async(&self, store: &CheckpointStore) -> Result<PathBuf, CheckpointError> {
        let path = store.path_for(&self.checkpoint_path(), CheckpointKind::Snapshot)?;
        let content = serde_json::to_string_pretty(&self.properties()?)?;
        store.write_async(&path, &content).await?;
        debug!("Saved checkpoint {:?}", path);
        Ok(path)
    }

    fn restore(&mut self, store: &CheckpointStore) -> Result<(), CheckpointError> {
        let path = store.path_for(&self.checkpoint_path(), CheckpointKind::Snapshot)?;
        let props = store.read_properties(&path)?;
        self.set_properties(props)
    }

    async fn restore_async(&mut self, store: &CheckpointStore) -> Result<(), CheckpointError> {
        let path = store.path_for(&self.checkpoint_path(), CheckpointKind::Snapshot)?;
        let props = store.read_properties_async(&path).await?;
        self.set_properties(props)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
    struct Cursor {
        name: String,
        offset: u64,
        tags: Vec<String>,
        // Not persisted
        scratch: Option<String>,
    }

    impl JsonCheckpoint for Cursor {
        const PROPERTIES: &'static [&'static str] = &["name", "offset", "tags"];

        fn checkpoint_path(&self) -> String {
            format!("cursors/{}", self.name)
        }
    }

    fn cursor() -> Cursor {
        Cursor {
            name: "accounts".to_string(),
            offset: 42,
            tags: vec!["b".to_string(), "a".to_string()],
            scratch: Some("in memory only".to_string()),
        }
    }

    #[test]
    fn test_path_for() {
        let store = CheckpointStore::new("/tmp/checkpoints");
        assert_eq!(
            store
                .path_for("account-refs/abc", CheckpointKind::Snapshot)
                .unwrap(),
            PathBuf::from("/tmp/checkpoints/account-refs/abc.json")
        );
        assert_eq!(
            store.path_for("processed", CheckpointKind::Log).unwrap(),
            PathBuf::from("/tmp/checkpoints/processed.txt")
        );
    }

    #[test]
    fn test_invalid_paths_are_rejected() {
        let store = CheckpointStore::new("/tmp/checkpoints");
        for path in ["", "/etc/passwd", "../escape", "a/../../b"] {
            let result = store.path_for(path, CheckpointKind::Snapshot);
            assert!(
                matches!(result, Err(CheckpointError::InvalidPath(_))),
                "{path}"
            );
        }
    }

    #[test]
    fn test_save_writes_only_declared_properties() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let path = cursor().save(&store).unwrap();

        let written = std::fs::read_to_string(path).unwrap();
        let props: Properties = serde_json::from_str(&written).unwrap();
        let keys: Vec<_> = props.keys().cloned().collect();
        assert_eq!(keys, vec!["name", "offset", "tags"]);
        assert!(!written.contains("scratch"));
    }

    #[test]
    fn test_round_trip_restores_declared_properties() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let original = cursor();
        original.save(&store).unwrap();

        let mut restored = Cursor {
            name: "accounts".to_string(),
            ..Default::default()
        };
        restored.restore(&store).unwrap();
        assert_eq!(restored.properties().unwrap(), original.properties().unwrap());
        assert_eq!(restored.scratch, None);
    }

    #[test]
    fn test_round_trip_is_idempotent_on_disk() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let path = cursor().save(&store).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();

        let mut restored = Cursor {
            name: "accounts".to_string(),
            ..Default::default()
        };
        restored.restore(&store).unwrap();
        restored.save(&store).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn test_restore_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("never-created"));
        let mut c = cursor();
        c.restore(&store).unwrap();
        assert_eq!(c, cursor());

        let path = store
            .path_for("cursors/accounts", CheckpointKind::Snapshot)
            .unwrap();
        assert!(store.read_properties(&path).unwrap().is_empty());
    }

    #[test]
    fn test_restore_corrupt_file_is_distinguishable() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let path = store
            .path_for("cursors/accounts", CheckpointKind::Snapshot)
            .unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let result = cursor().restore(&store);
        assert!(matches!(result, Err(CheckpointError::Corrupt { .. })));
    }

    #[tokio::test]
    async fn test_async_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        cursor().save_async(&store).await.unwrap();

        let mut restored = Cursor {
            name: "accounts".to_string(),
            ..Default::default()
        };
        restored.restore_async(&store).await.unwrap();
        assert_eq!(restored.offset, 42);
        assert_eq!(restored.tags, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_async_restore_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path());
        let mut c = Cursor {
            name: "missing".to_string(),
            ..Default::default()
        };
        c.restore_async(&store).await.unwrap();
        assert_eq!(c.offset, 0);
    }
}
