use serde::{Deserialize, Serialize};

/// Where assembled recordings are preserved before upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage
    Fs {
        /// Root path for storage
        #[serde(default = "default_fs_root")]
        root: String,
    },
    /// S3 compatible storage
    S3 {
        bucket: String,
        #[serde(default = "default_s3_root")]
        root: String,
        #[serde(default)]
        region: Option<String>,
        /// Custom endpoint for S3-compatible services
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default)]
        access_key_id: Option<String>,
        #[serde(default)]
        secret_access_key: Option<String>,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Fs {
            root: default_fs_root(),
        }
    }
}

impl StorageConfig {
    /// Prefix turning a stored path into a locator a player can open.
    pub fn url_prefix(&self) -> String {
        match self {
            StorageConfig::Fs { root } => {
                let root = std::path::Path::new(root);
                let abs = if root.is_absolute() {
                    root.to_path_buf()
                } else {
                    std::env::current_dir()
                        .map(|d| d.join(root))
                        .unwrap_or_else(|_| root.to_path_buf())
                };
                format!("file://{}/", abs.display().to_string().trim_end_matches('/'))
            }
            StorageConfig::S3 {
                bucket,
                root,
                endpoint,
                ..
            } => {
                let root = root.trim_matches('/');
                let base = match endpoint {
                    Some(e) => format!("{}/{}", e.trim_end_matches('/'), bucket),
                    None => format!("s3://{}", bucket),
                };
                if root.is_empty() {
                    format!("{}/", base)
                } else {
                    format!("{}/{}/", base, root)
                }
            }
        }
    }
}

fn default_fs_root() -> String {
    "./recordings".to_string()
}

fn default_s3_root() -> String {
    "/".to_string()
}
