use azfile::azure::{default_storage, Config, UrlExpiration};
use azfile::{IncomingFile, StorageEngine};
use bytes::Bytes;

#[tokio::main]
async fn main() -> azfile::Result<()> {
    env_logger::init();

    // Credentials are read from AZURE_STORAGE_CONNECTION_STRING, or from
    // AZURE_STORAGE_ACCOUNT and AZURE_STORAGE_ACCESS_KEY.
    let storage = default_storage(
        Config::default()
            .with_container_name("azfile-example")
            .with_url_expiration(UrlExpiration::Minutes(10)),
    );

    let (req, _) = http::Request::post("/upload").body(())?.into_parts();
    let file = IncomingFile::from_bytes(
        "note",
        "hello.txt",
        "text/plain",
        Bytes::from_static(b"hello, blob"),
    );

    let stored = storage.handle_file(&req, file).await?;
    println!("stored {} ({} bytes)", stored.blob_name, stored.blob_size);
    println!("download: {}", stored.url);

    storage.remove_file(&req, &stored).await?;
    println!("removed {}", stored.blob_name);

    Ok(())
}
