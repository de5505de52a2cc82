use crate::{Recordings, StorageConfig, create_operator};
use bytes::Bytes;
use chrono::{TimeZone, Utc};

#[tokio::test]
async fn test_fs_storage_config() {
    let config = StorageConfig::Fs {
        root: "./test_records".to_string(),
    };

    let result = create_operator(&config);
    assert!(result.is_ok(), "Failed to create FS storage operator");
}

#[tokio::test]
async fn test_s3_storage_config() {
    let config = StorageConfig::S3 {
        bucket: "test-bucket".to_string(),
        root: "/test".to_string(),
        region: Some("us-east-1".to_string()),
        endpoint: Some("http://localhost:9000".to_string()),
        access_key_id: Some("minioadmin".to_string()),
        secret_access_key: Some("minioadmin".to_string()),
    };

    assert!(create_operator(&config).is_ok());
    assert_eq!(config.url_prefix(), "http://localhost:9000/test-bucket/test/");
}

#[test]
fn test_storage_config_from_toml() {
    let config: StorageConfig = toml::from_str(
        r#"
        type = "fs"
        root = "/var/lib/livecast"
        "#,
    )
    .expect("Failed to parse storage config");

    match config {
        StorageConfig::Fs { ref root } => assert_eq!(root, "/var/lib/livecast"),
        _ => panic!("expected fs storage"),
    }
    assert_eq!(config.url_prefix(), "file:///var/lib/livecast/");
}

#[tokio::test]
async fn test_recordings_save_and_read_back() {
    let tmp = tempfile::TempDir::new().unwrap();
    let config = StorageConfig::Fs {
        root: tmp.path().to_string_lossy().into_owned(),
    };
    let recordings = Recordings::open(&config).await.unwrap();
    let started_at = Utc.with_ymd_and_hms(2024, 3, 2, 8, 30, 0).unwrap();

    let path = recordings
        .save("L1", started_at, "webm", Bytes::from_static(b"abc"))
        .await
        .unwrap();

    assert_eq!(path, format!("L1/2024/03/02/{}.webm", started_at.timestamp()));
    assert_eq!(recordings.read(&path).await.unwrap(), Bytes::from_static(b"abc"));
    assert!(tmp.path().join(&path).exists());
    assert!(recordings.url(&path).starts_with("file://"));
}
