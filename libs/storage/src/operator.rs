use crate::config::StorageConfig;
use anyhow::Result;
use opendal::Operator;
use opendal::services;

/// Create storage operator based on storage configuration
pub fn create_operator(config: &StorageConfig) -> Result<Operator> {
    match config {
        StorageConfig::Fs { root } => {
            tracing::info!("[storage] filesystem root: {}", root);
            let builder = services::Fs::default().root(root);
            Ok(Operator::new(builder)?.finish())
        }
        StorageConfig::S3 {
            bucket,
            root,
            region,
            endpoint,
            access_key_id,
            secret_access_key,
        } => {
            tracing::info!("[storage] s3 bucket: {}, region: {:?}", bucket, region);

            let mut builder = services::S3::default()
                .bucket(bucket)
                .root(root.trim_start_matches('/'));

            if let Some(region) = region {
                builder = builder.region(region);
            }
            if let Some(endpoint) = endpoint {
                builder = builder.endpoint(endpoint);
            }
            if let Some(access_key_id) = access_key_id {
                builder = builder.access_key_id(access_key_id);
            }
            if let Some(secret_access_key) = secret_access_key {
                builder = builder.secret_access_key(secret_access_key);
            }

            Ok(Operator::new(builder)?.finish())
        }
    }
}

/// Test storage connection
pub async fn test_connection(operator: &Operator) -> Result<()> {
    operator.check().await?;
    Ok(())
}

/// Create the operator and check that it answers. A failed check is only
/// logged: losing the local copy must never block a broadcast.
pub async fn init_operator(config: &StorageConfig) -> Result<Operator> {
    let operator = create_operator(config)?;
    if let Err(e) = test_connection(&operator).await {
        tracing::warn!("[storage] connection test failed: {}, continuing anyway", e);
    }
    Ok(operator)
}
