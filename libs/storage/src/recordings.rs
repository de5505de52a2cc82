use anyhow::{Result, bail};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use opendal::Operator;

use crate::config::StorageConfig;
use crate::operator::init_operator;
use crate::path::{generate_path, validate_path};

/// Local archive of assembled broadcast recordings.
#[derive(Clone)]
pub struct Recordings {
    op: Operator,
    url_prefix: String,
}

impl Recordings {
    pub async fn open(config: &StorageConfig) -> Result<Self> {
        Ok(Self {
            op: init_operator(config).await?,
            url_prefix: config.url_prefix(),
        })
    }

    /// Writes the recording and returns its storage path.
    pub async fn save(
        &self,
        live_id: &str,
        started_at: DateTime<Utc>,
        extension: &str,
        data: Bytes,
    ) -> Result<String> {
        let filename = format!("{}.{}", started_at.timestamp(), extension);
        let path = generate_path(live_id, started_at, &filename);
        if !validate_path(&path) {
            bail!("invalid recording path {}", path);
        }
        let size = data.len();
        self.op.write(&path, data).await?;
        tracing::info!("[storage] recording saved: {} ({} bytes)", path, size);
        Ok(path)
    }

    pub async fn read(&self, path: &str) -> Result<Bytes> {
        Ok(self.op.read(path).await?.to_bytes())
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.url_prefix, path)
    }
}
