use std::{future::Future, path::Path};

use tracing::info;

use super::{CheckpointKind, CheckpointStore};
use crate::{
    error::CheckpointError, pool::ConcurrencyPool, source::directory::DEFAULT_FILE_OPEN_LIMIT,
};

/// Append-only list of completed work items, one per line.
///
/// Items are buffered with `add` and only reach disk on `save`. Anything still
/// pending when the process dies is lost, so callers re-process it on the next run.
/// Items must not contain newlines.
#[derive(Debug)]
pub struct LogCheckpoint {
    path: String,
    pending: Vec<String>,
    limit: usize,
}

impl LogCheckpoint {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            pending: Vec::new(),
            limit: DEFAULT_FILE_OPEN_LIMIT,
        }
    }

    /// Default bound for `process_async` when the caller passes none.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn add(&mut self, item: impl Into<String>) {
        self.pending.push(item.into());
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Appends every pending item to the log file, creating it if needed, then clears
    /// the buffer. Existing content is never rewritten.
    pub fn save(&mut self, store: &CheckpointStore) -> Result<(), CheckpointError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let path = store.path_for(&self.path, CheckpointKind::Log)?;
        append(&path, &self.pending.join("\n"))?;
        self.pending.clear();
        Ok(())
    }

    pub async fn save_async(&mut self, store: &CheckpointStore) -> Result<(), CheckpointError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let path = store.path_for(&self.path, CheckpointKind::Log)?;
        append_async(&path, &self.pending.join("\n")).await?;
        self.pending.clear();
        Ok(())
    }

    /// Every persisted item, in append order, blank lines dropped.
    pub fn read(&self, store: &CheckpointStore) -> Result<Vec<String>, CheckpointError> {
        let path = store.path_for(&self.path, CheckpointKind::Log)?;
        Ok(parse_items(store.read(&path)?))
    }

    pub async fn read_async(&self, store: &CheckpointStore) -> Result<Vec<String>, CheckpointError> {
        let path = store.path_for(&self.path, CheckpointKind::Log)?;
        Ok(parse_items(store.read_async(&path).await?))
    }

    /// Calls `f` once per persisted item, in order. Returns the number of items visited.
    pub fn process<F, E>(&self, store: &CheckpointStore, mut f: F) -> Result<usize, E>
    where
        F: FnMut(&str) -> Result<(), E>,
        E: From<CheckpointError>,
    {
        info!("Loading log checkpoint file {}", self.path);
        let items = self.read(store)?;
        if items.is_empty() {
            return Ok(0);
        }

        info!("Processing {} log items", items.len());
        for item in &items {
            f(item)?;
        }
        Ok(items.len())
    }

    /// Like `process`, with at most `limit` handlers in flight (the log's own limit
    /// when `None`). Handlers may complete in any order.
    pub async fn process_async<F, Fut, E>(
        &self,
        store: &CheckpointStore,
        f: F,
        limit: Option<usize>,
    ) -> Result<usize, E>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: From<CheckpointError>,
    {
        info!("Loading log checkpoint file {}", self.path);
        let items = self.read_async(store).await?;
        if items.is_empty() {
            return Ok(0);
        }

        let count = items.len();
        info!("Processing {} log items", count);
        ConcurrencyPool::new(limit.unwrap_or(self.limit))
            .each(items, f)
            .await?;
        Ok(count)
    }
}

fn parse_items(content: Option<String>) -> Vec<String> {
    content
        .unwrap_or_default()
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

fn append(path: &Path, content: &str) -> Result<(), CheckpointError> {
    use std::io::Write;

    let write_err = |source| CheckpointError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    let exists = path.exists();
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(write_err)?;
    let data = if exists {
        format!("\n{content}")
    } else {
        content.to_string()
    };
    file.write_all(data.as_bytes()).map_err(write_err)?;
    file.sync_data().map_err(write_err)
}

async fn append_async(path: &Path, content: &str) -> Result<(), CheckpointError> {
    use tokio::io::AsyncWriteExt;

    let write_err = |source| CheckpointError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }
    let exists = tokio::fs::try_exists(path).await.map_err(write_err)?;
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(write_err)?;
    let data = if exists {
        format!("\n{content}")
    } else {
        content.to_string()
    };
    file.write_all(data.as_bytes()).await.map_err(write_err)?;
    file.sync_data().await.map_err(write_err)
}
