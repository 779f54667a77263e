use std::path::PathBuf;

use envconfig::Envconfig;

use crate::emit::SinkConfig;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "EXPORT_DIR", default = "./export")]
    pub export_dir: String,

    #[envconfig(from = "CHECKPOINT_DIR", default = "./tmp/checkpoints")]
    pub checkpoint_dir: String,

    // 0 means every eligible file is processed
    #[envconfig(from = "MAX_FILES", default = "0")]
    pub max_files: usize,

    // Upper bound on concurrently open export files
    #[envconfig(from = "FILE_OPEN_LIMIT", default = "100")]
    pub file_open_limit: usize,

    #[envconfig(from = "CHECKPOINT_FLUSH_INTERVAL", default = "100")]
    pub checkpoint_flush_interval: usize,

    #[envconfig(from = "SINK", default = "noop")]
    pub sink: String,

    #[envconfig(from = "SINK_PATH", default = "./tmp/unified-accounts.jsonl")]
    pub sink_path: String,
}

impl Config {
    pub fn max_files(&self) -> Option<usize> {
        match self.max_files {
            0 => None,
            n => Some(n),
        }
    }

    pub fn accounts_dir(&self) -> PathBuf {
        PathBuf::from(&self.export_dir).join("accounts")
    }

    pub fn account_links_dir(&self) -> PathBuf {
        PathBuf::from(&self.export_dir).join("accountLinks")
    }

    pub fn sink_config(&self) -> Result<SinkConfig, anyhow::Error> {
        match self.sink.as_str() {
            "noop" => Ok(SinkConfig::NoOp),
            "stdout" => Ok(SinkConfig::Stdout { as_json: true }),
            "file" => Ok(SinkConfig::File {
                path: self.sink_path.clone(),
                cleanup: true,
            }),
            other => Err(anyhow::Error::msg(format!("Unknown sink: {other}"))),
        }
    }
}
