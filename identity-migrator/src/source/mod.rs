use std::path::Path;

use crate::{checkpoint::Properties, error::LoadError};

pub mod directory;

pub use directory::RecordDirectory;

/// Extension every loadable record file carries.
pub const RECORD_EXTENSION: &str = "json";

/// A typed entity built from one exported record file.
pub trait ExportRecord: Sized + Send {
    fn from_export(path: &Path, props: Properties) -> Result<Self, serde_json::Error>;
}

/// Post-load step applied to every record before it is handed to a caller.
pub type Initializer<T> = std::sync::Arc<dyn Fn(&mut T) + Send + Sync>;

fn build<T: ExportRecord>(path: &Path, contents: &str) -> Result<T, LoadError> {
    let props: Properties = serde_json::from_str(contents).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    T::from_export(path, props).map_err(|source| LoadError::Build {
        path: path.to_path_buf(),
        source,
    })
}

pub async fn load_record<T: ExportRecord>(path: &Path) -> Result<T, LoadError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    build(path, &contents)
}

pub fn load_record_sync<T: ExportRecord>(path: &Path) -> Result<T, LoadError> {
    let contents = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    build(path, &contents)
}
