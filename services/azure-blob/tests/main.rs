use std::env;

use azfile_azure_blob::{AzureBlobStorage, Config, ContainerAccessLevel, UrlExpiration};
use azfile_core::{Context, ErrorKind, IncomingFile, OsEnv, StorageEngine};
use azfile_http_send_reqwest::ReqwestHttpSend;
use bytes::Bytes;
use http::StatusCode;
use log::debug;

/// Storage built from the environment.
///
/// Credentials come from the usual `AZURE_STORAGE_*` variables, the container
/// from `AZFILE_AZURE_BLOB_CONTAINER`.
fn init_storage(expiration: UrlExpiration) -> Option<AzureBlobStorage> {
    let _ = env_logger::builder().is_test(true).try_init();
    let _ = dotenv::dotenv();

    if env::var("AZFILE_AZURE_BLOB_TEST").unwrap_or_default() != "on" {
        return None;
    }

    let ctx = Context::new()
        .with_http_send(ReqwestHttpSend::default())
        .with_env(OsEnv);
    let container =
        env::var("AZFILE_AZURE_BLOB_CONTAINER").unwrap_or_else(|_| "azfile-test".to_string());

    let storage = AzureBlobStorage::try_new(
        ctx,
        Config::default()
            .with_container_name(container)
            .with_container_access_level(ContainerAccessLevel::Private)
            .with_url_expiration(expiration),
    )
    .expect("azure blob config must be valid");
    Some(storage)
}

fn parts() -> http::request::Parts {
    http::Request::post("/upload")
        .body(())
        .unwrap()
        .into_parts()
        .0
}

#[tokio::test]
async fn test_store_and_remove() {
    let Some(storage) = init_storage(UrlExpiration::Minutes(5)) else {
        eprintln!("Skipping test: AZFILE_AZURE_BLOB_TEST is not enabled");
        return;
    };

    let content = Bytes::from_static(b"hello from azfile");
    let file = IncomingFile::from_bytes("doc", "hello.txt", "text/plain", content.clone());

    let stored = storage.handle_file(&parts(), file).await.unwrap();
    debug!("stored: {stored:?}");
    assert!(stored.blob_name.ends_with(".txt"));
    assert_eq!(stored.blob_size, content.len().to_string());
    assert_eq!(stored.blob_type, "BlockBlob");

    // The returned url is readable without further credentials.
    let resp = reqwest::get(&stored.url).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.bytes().await.unwrap(), content);

    storage.remove_file(&parts(), &stored).await.unwrap();

    let resp = reqwest::get(&stored.url).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Removing twice is not an error.
    storage.remove_file(&parts(), &stored).await.unwrap();
}

#[tokio::test]
async fn test_store_in_blocks() {
    let Some(storage) = init_storage(UrlExpiration::Never) else {
        eprintln!("Skipping test: AZFILE_AZURE_BLOB_TEST is not enabled");
        return;
    };

    // Two full blocks and a short one.
    let content: Bytes = (0..(9 * 1024 * 1024))
        .map(|i| (i % 251) as u8)
        .collect::<Vec<u8>>()
        .into();
    let file = IncomingFile::from_bytes(
        "doc",
        "large.bin",
        "application/octet-stream",
        content.clone(),
    );

    let stored = storage.handle_file(&parts(), file).await.unwrap();
    assert_eq!(stored.blob_size, content.len().to_string());
    assert!(!stored.url.contains('?'));

    storage.remove_file(&parts(), &stored).await.unwrap();
}

#[tokio::test]
async fn test_missing_credentials() {
    let _ = env_logger::builder().is_test(true).try_init();

    let storage = AzureBlobStorage::new(
        Context::new().with_http_send(ReqwestHttpSend::default()),
        Config::default(),
    );

    let file = IncomingFile::from_bytes("doc", "a.txt", "text/plain", Bytes::new());
    let err = storage.handle_file(&parts(), file).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    assert_eq!(
        err.causes(),
        [
            "Missing required parameter: Azure container name.".to_string(),
            "Missing required parameter: no authentication information found.".to_string(),
        ]
    );
}
