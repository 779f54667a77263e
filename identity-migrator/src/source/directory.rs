use std::{
    collections::{HashMap, HashSet},
    future::Future,
    hash::Hash,
    path::{Path, PathBuf},
};

use anyhow::{Context, Error};
use tracing::{debug, info};

use super::{load_record, ExportRecord, Initializer, RECORD_EXTENSION};
use crate::{error::LoadError, pool::ConcurrencyPool};

pub const DEFAULT_FILE_OPEN_LIMIT: usize = 100;

/// The eligible record files of one export directory, loaded on demand under a
/// concurrency bound.
pub struct RecordDirectory<T> {
    dir: PathBuf,
    files: Vec<String>,
    limit: usize,
    initializer: Option<Initializer<T>>,
}

impl<T: ExportRecord> RecordDirectory<T> {
    /// Lists `dir`, keeping `.json` files whose stem is not in `skip`, in natural
    /// name order, capped at `max_files`. A missing directory holds no files.
    pub fn new(
        dir: impl Into<PathBuf>,
        skip: &HashSet<String>,
        max_files: Option<usize>,
    ) -> Result<Self, Error> {
        let dir = dir.into();
        let mut files = Vec::new();

        if dir.exists() {
            let entries = std::fs::read_dir(&dir)
                .with_context(|| format!("Failed to list export directory {dir:?}"))?;
            for entry in entries {
                let entry = entry?;
                if entry.file_type()?.is_dir() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                let path = Path::new(&name);
                if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                    continue;
                }
                let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
                if skip.contains(stem) {
                    continue;
                }
                files.push(name);
            }
        } else {
            info!("Export directory {:?} does not exist, nothing to load", dir);
        }

        files.sort_by(|a, b| natord::compare(a, b));
        if let Some(max) = max_files {
            files.truncate(max);
        }
        debug!("Found {} eligible files in {:?}", files.len(), dir);

        Ok(Self {
            dir,
            files,
            limit: DEFAULT_FILE_OPEN_LIMIT,
            initializer: None,
        })
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_initializer(mut self, initializer: Initializer<T>) -> Self {
        self.initializer = Some(initializer);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub async fn load(&self, file: &str) -> Result<T, LoadError> {
        let mut instance = load_record::<T>(&self.dir.join(file)).await?;
        if let Some(initialize) = &self.initializer {
            initialize(&mut instance);
        }
        Ok(instance)
    }

    fn pool(&self, limit: Option<usize>) -> ConcurrencyPool {
        ConcurrencyPool::new(limit.unwrap_or(self.limit))
    }

    /// Loads a slice of this directory's files concurrently, returned in slice order.
    pub async fn load_many(
        &self,
        files: &[String],
        limit: Option<usize>,
    ) -> Result<Vec<T>, LoadError> {
        self.pool(limit)
            .map_ordered(files, |file| self.load(file))
            .await
    }

    /// Loads every file and hands each record to `f`, in completion order.
    pub async fn each<F, Fut, E>(&self, f: F, limit: Option<usize>) -> Result<(), E>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<(), E>>,
        E: From<LoadError>,
    {
        let f = &f;
        self.pool(limit)
            .each(&self.files, |file| async move {
                let instance = self.load(file).await?;
                f(instance).await
            })
            .await
    }

    /// Loads every file and folds the keyed contributions `f` returns for each
    /// record into one map.
    pub async fn map_to_object<F, Fut, C, K, V, E>(
        &self,
        f: F,
        limit: Option<usize>,
    ) -> Result<HashMap<K, V>, E>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<C, E>>,
        C: IntoIterator<Item = (K, V)>,
        K: Eq + Hash,
        E: From<LoadError>,
    {
        let f = &f;
        self.pool(limit)
            .map_to_object(&self.files, |file| async move {
                let instance = self.load(file).await?;
                f(instance).await
            })
            .await
    }

    /// Loads files concurrently but hands records to `f` one at a time, in file
    /// order. Use this when `f` mutates order-sensitive state.
    pub async fn for_each_in_order<F, E>(&self, f: F, limit: Option<usize>) -> Result<(), E>
    where
        F: FnMut(T) -> Result<(), E>,
        E: From<LoadError>,
    {
        self.pool(limit)
            .each_ordered(
                &self.files,
                |file| async move { self.load(file).await.map_err(E::from) },
                f,
            )
            .await
    }
}
