use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use azfile_core::{
    ConfigError, Context, Error, FileSource, IncomingFile, OutgoingFile, Result, Signer,
    StorageEngine,
};
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use http::request::Parts;
use log::{debug, warn};

use crate::client::{block_id, BlobClient};
use crate::config::{ResolvedAuth, ResolvedConfig};
use crate::constants::*;
use crate::provide_credential::{ImdsCredentialProvider, StaticCredentialProvider};
use crate::resolver::default_blob_name;
use crate::{Config, ContentSettings, RequestSigner};

/// Storage engine that uploads files to Azure Blob Storage.
///
/// ```no_run
/// use azfile_azure_blob::{AzureBlobStorage, Config, ContainerAccessLevel};
/// use azfile_core::Context;
///
/// # fn build(ctx: Context) -> azfile_core::Result<()> {
/// let storage = AzureBlobStorage::try_new(
///     ctx,
///     Config::default()
///         .with_container_name("uploads")
///         .with_container_access_level(ContainerAccessLevel::Private)
///         .with_url_expiration(15i64),
/// )?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AzureBlobStorage {
    state: std::result::Result<Arc<Inner>, ConfigError>,
}

#[derive(Debug)]
struct Inner {
    client: BlobClient,
    config: ResolvedConfig,
    block_size: usize,
}

impl AzureBlobStorage {
    /// Build the engine. Never fails.
    ///
    /// An invalid configuration is kept and returned by every operation.
    pub fn new(ctx: Context, config: Config) -> Self {
        let state = config.resolve(&ctx).map(|c| Arc::new(Inner::new(ctx, c)));
        if let Err(err) = &state {
            warn!("azure blob storage is not usable: {err} {:?}", err.causes());
        }
        Self { state }
    }

    /// Build the engine, failing on an invalid configuration.
    pub fn try_new(ctx: Context, config: Config) -> Result<Self> {
        let resolved = config.resolve(&ctx)?;
        Ok(Self {
            state: Ok(Arc::new(Inner::new(ctx, resolved))),
        })
    }

    /// The configuration error, if the engine was built with an invalid configuration.
    pub fn config_error(&self) -> Option<&ConfigError> {
        self.state.as_ref().err()
    }

    #[cfg(test)]
    fn with_block_size(mut self, block_size: usize) -> Self {
        if let Ok(inner) = &mut self.state {
            if let Some(inner) = Arc::get_mut(inner) {
                inner.block_size = block_size;
            }
        }
        self
    }

    fn inner(&self) -> Result<&Inner> {
        self.state.as_deref().map_err(Error::from)
    }
}

impl Inner {
    fn new(ctx: Context, config: ResolvedConfig) -> Self {
        let signer = match &config.auth {
            ResolvedAuth::SharedKey {
                account_name,
                account_key,
                ..
            } => Signer::new(
                ctx.clone(),
                StaticCredentialProvider::new_shared_key(account_name, account_key),
                RequestSigner::new(),
            ),
            ResolvedAuth::SasToken { token, .. } => Signer::new(
                ctx.clone(),
                StaticCredentialProvider::new_sas_token(token),
                RequestSigner::new(),
            ),
            ResolvedAuth::ManagedIdentity { .. } => {
                Signer::new(ctx.clone(), ImdsCredentialProvider::new(), RequestSigner::new())
            }
        };

        debug!("azure blob storage using {:?}", config.auth);
        Self {
            client: BlobClient::new(ctx, config.auth.endpoint(), signer),
            config,
            block_size: UPLOAD_BLOCK_SIZE,
        }
    }

    /// Upload the file as one Put Blob if it fits in a block, otherwise as staged blocks.
    async fn upload(
        &self,
        container: &str,
        blob: &str,
        source: FileSource,
        settings: &ContentSettings,
        metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut blocks = into_blocks(source.into_stream(), self.block_size);

        let first = blocks.try_next().await?.unwrap_or_default();
        let Some(second) = blocks.try_next().await? else {
            return self
                .client
                .put_blob(container, blob, first, settings, metadata)
                .await;
        };

        let block_ids: Vec<String> = stream::iter([Ok(first), Ok(second)])
            .chain(blocks)
            .enumerate()
            .map(|(idx, block)| async move {
                let id = block_id(idx);
                self.client.put_block(container, blob, &id, block?).await?;
                Ok::<_, Error>(id)
            })
            .buffered(UPLOAD_MAX_BUFFERS)
            .try_collect()
            .await?;

        self.client
            .put_block_list(container, blob, &block_ids, settings, metadata)
            .await
    }
}

/// Regroup an arbitrary chunked stream into blocks of exactly `block_size` bytes,
/// the last one possibly shorter. An empty stream yields no block.
fn into_blocks(
    stream: BoxStream<'static, Result<Bytes>>,
    block_size: usize,
) -> BoxStream<'static, Result<Bytes>> {
    stream::try_unfold(
        (stream, BytesMut::new(), false),
        move |(mut stream, mut buf, mut done)| async move {
            while !done && buf.len() < block_size {
                match stream.try_next().await? {
                    Some(bs) => buf.extend_from_slice(&bs),
                    None => done = true,
                }
            }
            if buf.is_empty() {
                return Ok::<_, Error>(None);
            }

            let block = buf.split_to(buf.len().min(block_size)).freeze();
            Ok::<_, Error>(Some((block, (stream, buf, done))))
        },
    )
    .boxed()
}

#[async_trait]
impl StorageEngine for AzureBlobStorage {
    async fn handle_file(&self, req: &Parts, file: IncomingFile) -> Result<OutgoingFile> {
        let inner = self.inner()?;
        let config = &inner.config;
        let IncomingFile { info, source } = file;

        let blob_name = match &config.blob_name {
            Some(resolver) => resolver.resolve("blob name", req, &info).await?,
            None => default_blob_name(&info),
        };
        let container = config
            .container_name
            .resolve("container name", req, &info)
            .await?;

        inner
            .client
            .create_container_if_not_exists(&container, config.container_access_level)
            .await?;

        let settings = match &config.content_settings {
            Some(resolver) => resolver.resolve("content settings", req, &info).await?,
            None => ContentSettings::inline(&info.mime_type),
        };
        let metadata = match &config.metadata {
            Some(resolver) => resolver.resolve("metadata", req, &info).await?,
            None => BTreeMap::new(),
        };

        debug!("uploading {} to {container}/{blob_name}", info.original_name);
        inner
            .upload(&container, &blob_name, source, &settings, &metadata)
            .await?;

        let props = inner
            .client
            .get_blob_properties(&container, &blob_name)
            .await?;
        let url = inner
            .client
            .blob_url(&container, &blob_name, config.url_expiration)
            .await?;

        Ok(OutgoingFile {
            file: info,
            url,
            blob_name,
            container,
            etag: props.etag,
            blob_type: props.blob_type,
            blob_size: props.content_length.to_string(),
            metadata: props.metadata,
        })
    }

    async fn remove_file(&self, req: &Parts, file: &OutgoingFile) -> Result<()> {
        let inner = self.inner()?;

        let container = inner
            .config
            .container_name
            .resolve("container name", req, &file.file)
            .await?;

        if !inner.client.container_exists(&container).await? {
            return Err(Error::container_not_found(format!(
                "Cannot use container \"{container}\". Check if provided options are correct."
            )));
        }

        debug!("removing {container}/{}", file.blob_name);
        inner
            .client
            .delete_blob_if_exists(&container, &file.blob_name)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeBlobService, Op};
    use crate::{AuthenticationType, ContainerAccessLevel, UrlExpiration, ValueSource};
    use azfile_core::hash::base64_encode;
    use azfile_core::{ErrorKind, FileInfo, StaticEnv};
    use http::StatusCode;
    use pretty_assertions::assert_eq;

    const ENDPOINT: &str = "https://acc.blob.core.windows.net";

    fn parts() -> Parts {
        http::Request::post("/upload")
            .header("x-user", "alice")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    fn ctx(fake: &FakeBlobService) -> Context {
        Context::new()
            .with_http_send(fake.clone())
            .with_env(StaticEnv::default())
    }

    fn config() -> Config {
        Config::default()
            .with_account_name("acc")
            .with_access_key(base64_encode(b"key"))
            .with_container_name("photos")
    }

    fn png(data: &'static [u8]) -> IncomingFile {
        IncomingFile::from_bytes("avatar", "me.png", "image/png", Bytes::from_static(data))
    }

    #[tokio::test]
    async fn test_store_buffer() {
        let _ = env_logger::builder().is_test(true).try_init();

        let fake = FakeBlobService::new(ENDPOINT);
        let storage = AzureBlobStorage::new(ctx(&fake), config());

        let out = storage.handle_file(&parts(), png(b"hello")).await.unwrap();

        assert_eq!(out.container, "photos");
        assert!(out.blob_name.ends_with(".png"), "{}", out.blob_name);
        assert_eq!(out.blob_size, "5");
        assert_eq!(out.blob_type, "BlockBlob");
        assert!(!out.etag.is_empty());
        assert_eq!(out.file.field_name, "avatar");
        assert_eq!(out.file.original_name, "me.png");
        assert!(out.url.starts_with(&format!("{ENDPOINT}/photos/{}?sv=", out.blob_name)));

        let blob = fake.blob("photos", &out.blob_name).unwrap();
        assert_eq!(blob.data, Bytes::from_static(b"hello"));
        assert_eq!(blob.headers["x-ms-blob-content-type"], "image/png");
        assert_eq!(blob.headers["x-ms-blob-content-disposition"], "inline");
        assert_eq!(
            fake.ops(),
            vec![Op::CreateContainer, Op::PutBlob, Op::GetProperties]
        );
    }

    #[tokio::test]
    async fn test_store_creates_container_with_access_level() {
        let fake = FakeBlobService::new(ENDPOINT);
        let storage = AzureBlobStorage::new(
            ctx(&fake),
            config().with_container_access_level(ContainerAccessLevel::Private),
        );

        storage.handle_file(&parts(), png(b"x")).await.unwrap();
        storage.handle_file(&parts(), png(b"y")).await.unwrap();

        assert_eq!(fake.container_access("photos"), Some(None));
        assert_eq!(fake.count(Op::CreateContainer), 2);
    }

    #[tokio::test]
    async fn test_store_with_resolvers() {
        let fake = FakeBlobService::new(ENDPOINT);
        let storage = AzureBlobStorage::new(
            ctx(&fake),
            config()
                .with_container_name(ValueSource::from_fn(|req, _| {
                    let user = req.headers["x-user"].to_str().unwrap_or_default().to_string();
                    async move { Ok(format!("user-{user}")) }
                }))
                .with_blob_name(ValueSource::from_fn(|_, file: &FileInfo| {
                    let name = format!("originals/{}", file.original_name);
                    async move { Ok(name) }
                }))
                .with_metadata(BTreeMap::from([(
                    "source".to_string(),
                    "test".to_string(),
                )]))
                .with_content_settings(ContentSettings {
                    content_type: Some("application/octet-stream".to_string()),
                    cache_control: Some("no-cache".to_string()),
                    ..Default::default()
                })
                .with_url_expiration(UrlExpiration::Never),
        );

        let out = storage.handle_file(&parts(), png(b"data")).await.unwrap();

        assert_eq!(out.container, "user-alice");
        assert_eq!(out.blob_name, "originals/me.png");
        assert_eq!(
            out.url,
            "https://acc.blob.core.windows.net/user-alice/originals/me.png"
        );
        assert_eq!(
            out.metadata,
            BTreeMap::from([("source".to_string(), "test".to_string())])
        );

        let blob = fake.blob("user-alice", "originals/me.png").unwrap();
        assert_eq!(
            blob.headers["x-ms-blob-content-type"],
            "application/octet-stream"
        );
        assert_eq!(blob.headers["x-ms-blob-cache-control"], "no-cache");
        assert!(!blob.headers.contains_key("x-ms-blob-content-disposition"));
    }

    #[tokio::test]
    async fn test_store_stream_in_blocks() {
        let fake = FakeBlobService::new(ENDPOINT);
        let storage = AzureBlobStorage::new(ctx(&fake), config()).with_block_size(4);

        // 50 blocks of 4 bytes, delivered in uneven chunks.
        let data: Vec<u8> = (0..200u8).collect();
        let chunks: Vec<std::io::Result<Bytes>> = data
            .chunks(7)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        let file = IncomingFile::from_stream(
            FileInfo {
                field_name: "doc".to_string(),
                original_name: "numbers.bin".to_string(),
                mime_type: "application/octet-stream".to_string(),
                ..Default::default()
            },
            FileSource::from_stream(stream::iter(chunks)),
        );

        let out = storage.handle_file(&parts(), file).await.unwrap();

        assert_eq!(out.blob_size, "200");
        assert_eq!(
            fake.blob("photos", &out.blob_name).unwrap().data,
            Bytes::from(data)
        );
        assert_eq!(fake.count(Op::PutBlock), 50);
        assert_eq!(fake.count(Op::PutBlockList), 1);
        assert_eq!(fake.count(Op::PutBlob), 0);
        assert!(fake.max_in_flight() <= UPLOAD_MAX_BUFFERS);
        assert!(fake.max_in_flight() > 1);
    }

    #[tokio::test]
    async fn test_store_empty_file() {
        let fake = FakeBlobService::new(ENDPOINT);
        let storage = AzureBlobStorage::new(ctx(&fake), config());

        let out = storage.handle_file(&parts(), png(b"")).await.unwrap();

        assert_eq!(out.blob_size, "0");
        assert_eq!(fake.count(Op::PutBlob), 1);
    }

    #[tokio::test]
    async fn test_store_with_sas_token_url() {
        let fake = FakeBlobService::new(ENDPOINT);
        let storage = AzureBlobStorage::new(
            ctx(&fake),
            Config::default()
                .with_authentication_type(AuthenticationType::SasToken)
                .with_account_name("acc")
                .with_sas_token("?sv=2021-08-06&sig=abc")
                .with_container_name("photos")
                .with_blob_name("a.png"),
        );

        let out = storage.handle_file(&parts(), png(b"x")).await.unwrap();
        assert_eq!(
            out.url,
            "https://acc.blob.core.windows.net/photos/a.png?sv=2021-08-06&sig=abc"
        );
        assert!(fake.last_authorization().is_none());
    }

    #[tokio::test]
    async fn test_config_error_short_circuits() {
        let fake = FakeBlobService::new(ENDPOINT);
        let storage = AzureBlobStorage::new(
            ctx(&fake),
            Config::default().with_authentication_type(AuthenticationType::SharedKey),
        );
        assert_eq!(storage.config_error().unwrap().causes().len(), 3);

        let err = storage.handle_file(&parts(), png(b"x")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        assert_eq!(err.to_string(), "There are 3 missing required parameters.");
        assert_eq!(err.causes().len(), 3);

        let out = OutgoingFile {
            file: png(b"x").info,
            url: String::new(),
            blob_name: "a.png".to_string(),
            container: "photos".to_string(),
            etag: String::new(),
            blob_type: String::new(),
            blob_size: "1".to_string(),
            metadata: BTreeMap::new(),
        };
        let err = storage.remove_file(&parts(), &out).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);

        assert!(fake.ops().is_empty());
    }

    #[test]
    fn test_try_new_fails_eagerly() {
        let fake = FakeBlobService::new(ENDPOINT);
        let err = AzureBlobStorage::try_new(ctx(&fake), Config::default()).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
        assert_eq!(err.to_string(), "There are 2 missing required parameters.");
    }

    #[tokio::test]
    async fn test_resolver_failure_stops_before_io() {
        let fake = FakeBlobService::new(ENDPOINT);
        let storage = AzureBlobStorage::new(
            ctx(&fake),
            config().with_container_name(ValueSource::from_fn(|_, _| async {
                Err(Error::unexpected("tenant lookup failed"))
            })),
        );

        let err = storage.handle_file(&parts(), png(b"x")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResolveFailed);
        assert!(fake.ops().is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure_is_not_retried() {
        let fake = FakeBlobService::new(ENDPOINT);
        fake.fail_on(Op::PutBlob, StatusCode::INTERNAL_SERVER_ERROR);
        let storage = AzureBlobStorage::new(ctx(&fake), config());

        let err = storage.handle_file(&parts(), png(b"x")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unexpected);
        assert_eq!(fake.count(Op::PutBlob), 1);
        assert_eq!(fake.count(Op::GetProperties), 0);
    }

    #[tokio::test]
    async fn test_remove_file() {
        let fake = FakeBlobService::new(ENDPOINT);
        let storage = AzureBlobStorage::new(ctx(&fake), config());

        let out = storage.handle_file(&parts(), png(b"hello")).await.unwrap();
        storage.remove_file(&parts(), &out).await.unwrap();
        assert!(fake.blob("photos", &out.blob_name).is_none());

        // Removing again is fine.
        storage.remove_file(&parts(), &out).await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_file_missing_container() {
        let fake = FakeBlobService::new(ENDPOINT);
        fake.insert_blob("other", "a.png", b"x");
        let storage = AzureBlobStorage::new(ctx(&fake), config());

        let out = OutgoingFile {
            file: png(b"x").info,
            url: String::new(),
            blob_name: "a.png".to_string(),
            container: "other".to_string(),
            etag: String::new(),
            blob_type: String::new(),
            blob_size: "1".to_string(),
            metadata: BTreeMap::new(),
        };

        let err = storage.remove_file(&parts(), &out).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ContainerNotFound);
        assert_eq!(
            err.to_string(),
            "Cannot use container \"photos\". Check if provided options are correct."
        );
        assert_eq!(fake.count(Op::DeleteBlob), 0);
    }

    #[tokio::test]
    async fn test_into_blocks() {
        let source = stream::iter(vec![
            Ok(Bytes::from_static(b"ab")),
            Ok(Bytes::from_static(b"cdefg")),
            Ok(Bytes::from_static(b"h")),
        ])
        .boxed();

        let blocks: Vec<Bytes> = into_blocks(source, 3).try_collect().await.unwrap();
        assert_eq!(
            blocks,
            vec![
                Bytes::from_static(b"abc"),
                Bytes::from_static(b"def"),
                Bytes::from_static(b"gh"),
            ]
        );
    }
}
