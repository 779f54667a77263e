use anyhow::Error;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::account::Account;

/// Where unified identities go once reconciliation is done. Provisioning against a
/// real identity provider plugs in here.
#[async_trait]
pub trait IdentitySink: Send + Sync {
    async fn emit(&mut self, accounts: &[Account]) -> Result<(), Error>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    Stdout { as_json: bool },
    File { path: String, cleanup: bool },
    NoOp,
}

impl SinkConfig {
    pub async fn construct(&self) -> Result<Box<dyn IdentitySink>, Error> {
        match self {
            SinkConfig::Stdout { as_json } => Ok(Box::new(StdoutSink { as_json: *as_json })),
            SinkConfig::File { path, cleanup } => {
                Ok(Box::new(FileSink::new(path.clone(), *cleanup).await?))
            }
            SinkConfig::NoOp => Ok(Box::new(NoOpSink)),
        }
    }
}

pub struct StdoutSink {
    pub as_json: bool,
}

#[async_trait]
impl IdentitySink for StdoutSink {
    async fn emit(&mut self, accounts: &[Account]) -> Result<(), Error> {
        for account in accounts {
            if self.as_json {
                println!("{}", serde_json::to_string(account)?);
            } else {
                println!("{account:?}");
            }
        }
        Ok(())
    }
}

pub struct NoOpSink;

#[async_trait]
impl IdentitySink for NoOpSink {
    async fn emit(&mut self, _accounts: &[Account]) -> Result<(), Error> {
        Ok(())
    }
}

/// Writes one JSON identity per line.
pub struct FileSink {
    pub path: String,
}

impl FileSink {
    pub async fn new(path: String, cleanup: bool) -> Result<Self, Error> {
        info!("Creating file sink at {}", path);
        if cleanup {
            tokio::fs::remove_file(&path).await.ok();
        }
        if let Some(parent) = std::path::Path::new(&path).parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(Self { path })
    }
}

#[async_trait]
impl IdentitySink for FileSink {
    async fn emit(&mut self, accounts: &[Account]) -> Result<(), Error> {
        info!("Writing {} identities to file {}", accounts.len(), self.path);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        for account in accounts {
            let line = format!("{}\n", serde_json::to_string(account)?);
            file.write_all(line.as_bytes()).await?;
        }
        file.flush().await?;
        Ok(())
    }
}
