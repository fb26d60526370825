use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use azfile_core::{Error, IncomingFile, OutgoingFile, Result, StorageEngine};
use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use http::request::Parts;

// A storage engine keeping files in memory, keyed by field and original name.
#[derive(Debug, Default)]
struct MemoryStorage {
    files: Mutex<HashMap<String, Bytes>>,
}

impl MemoryStorage {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Bytes>>> {
        self.files
            .lock()
            .map_err(|_| Error::unexpected("memory storage lock poisoned"))
    }
}

#[async_trait]
impl StorageEngine for MemoryStorage {
    async fn handle_file(&self, _: &Parts, file: IncomingFile) -> Result<OutgoingFile> {
        let IncomingFile { info, source } = file;
        let data = source
            .into_stream()
            .try_fold(BytesMut::new(), |mut buf, chunk| async move {
                buf.extend_from_slice(&chunk);
                Ok(buf)
            })
            .await?
            .freeze();

        let key = format!("{}/{}", info.field_name, info.original_name);
        let size = data.len();
        self.lock()?.insert(key.clone(), data);

        Ok(OutgoingFile {
            file: info,
            url: format!("memory://{key}"),
            blob_name: key,
            container: "memory".to_string(),
            etag: String::new(),
            blob_type: "Memory".to_string(),
            blob_size: size.to_string(),
            metadata: BTreeMap::new(),
        })
    }

    async fn remove_file(&self, _: &Parts, file: &OutgoingFile) -> Result<()> {
        self.lock()?.remove(&file.blob_name);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let storage = MemoryStorage::default();
    let (req, _) = http::Request::post("/upload").body(())?.into_parts();

    let file = IncomingFile::from_bytes(
        "avatar",
        "me.png",
        "image/png",
        Bytes::from_static(b"not really a png"),
    );
    let stored = storage.handle_file(&req, file).await?;
    println!("{}", serde_json::to_string_pretty(&stored).unwrap_or_default());

    storage.remove_file(&req, &stored).await?;
    println!("stored files left: {}", storage.lock()?.len());
    Ok(())
}
