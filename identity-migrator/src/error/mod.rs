use std::path::PathBuf;

use thiserror::Error;

// Use .user_error() to inject an operator facing message into the error chain.
// The binary extracts it from the chain when a run aborts.
#[derive(Error, Debug, Clone)]
#[error("User Error: {msg}")]
pub struct UserError {
    pub msg: String,
}

impl UserError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { msg: msg.into() }
    }
}

pub trait ToUserError<T> {
    fn user_error(self, msg: impl Into<String>) -> anyhow::Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ToUserError<T> for Result<T, E> {
    fn user_error(self, msg: impl Into<String>) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::Error::from(e).context(UserError::new(msg)))
    }
}

pub fn get_user_message(error: &anyhow::Error) -> &str {
    for cause in error.chain() {
        if let Some(user_error) = cause.downcast_ref::<UserError>() {
            return &user_error.msg;
        }
    }
    "An unknown error occurred"
}

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("Invalid checkpoint path {0:?}: must be a non-empty relative path")]
    InvalidPath(String),
    #[error("Failed to read checkpoint {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write checkpoint {path:?}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Checkpoint {path:?} is present but cannot be parsed")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Checkpoint entity must serialize to a JSON object")]
    NotAnObject,
    #[error("Failed to serialize checkpoint properties")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read record file {path:?}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse record file {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Record file {path:?} does not describe a valid record")]
    Build {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl LoadError {
    pub fn path(&self) -> &PathBuf {
        match self {
            LoadError::Read { path, .. }
            | LoadError::Parse { path, .. }
            | LoadError::Build { path, .. } => path,
        }
    }
}
