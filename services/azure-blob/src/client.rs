use std::collections::BTreeMap;

use azfile_core::hash::base64_encode;
use azfile_core::time::now;
use azfile_core::{Context, Error, Result, Signer};
use bytes::Bytes;
use http::{header, Method, Request, Response, StatusCode};
use log::debug;
use percent_encoding::utf8_percent_encode;
use serde::Serialize;

use crate::constants::*;
use crate::sas::BlobSharedAccessSignature;
use crate::{ContainerAccessLevel, ContentSettings, Credential, UrlExpiration};

/// Properties returned by a `HEAD` on a blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlobProperties {
    /// ETag of the blob, quotes included.
    pub etag: String,
    /// Blob type, e.g. `BlockBlob`.
    pub blob_type: String,
    /// Size of the blob in bytes.
    pub content_length: u64,
    /// Content type stored with the blob.
    pub content_type: Option<String>,
    /// User metadata, from the `x-ms-meta-*` headers.
    pub metadata: BTreeMap<String, String>,
}

/// Minimal client for the Blob service REST API.
///
/// Every request is signed by the [`Signer`] and sent through the [`Context`].
/// Nothing is retried.
#[derive(Debug, Clone)]
pub struct BlobClient {
    ctx: Context,
    endpoint: String,
    signer: Signer<Credential>,
}

impl BlobClient {
    /// Create a client for the blob service at `endpoint`.
    pub fn new(ctx: Context, endpoint: &str, signer: Signer<Credential>) -> Self {
        Self {
            ctx,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            signer,
        }
    }

    /// Endpoint requests are sent to, without trailing `/`.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn container_url(&self, container: &str) -> String {
        format!(
            "{}/{}",
            self.endpoint,
            utf8_percent_encode(container, &AZURE_QUERY_ENCODE_SET)
        )
    }

    fn object_url(&self, container: &str, blob: &str) -> String {
        format!(
            "{}/{}",
            self.container_url(container),
            utf8_percent_encode(blob, &AZURE_QUERY_ENCODE_SET)
        )
    }

    fn request(&self, method: Method, url: &str, body_len: usize) -> http::request::Builder {
        Request::builder()
            .method(method)
            .uri(url)
            .header(X_MS_VERSION, AZURE_VERSION)
            .header(header::CONTENT_LENGTH, body_len.to_string())
    }

    async fn send(&self, req: Request<Bytes>) -> Result<Response<Bytes>> {
        let (mut parts, body) = req.into_parts();
        self.signer.sign(&mut parts, None).await?;
        self.ctx.http_send(Request::from_parts(parts, body)).await
    }

    /// Create the container unless it exists.
    ///
    /// Returns `true` when the container was created by this call.
    pub async fn create_container_if_not_exists(
        &self,
        container: &str,
        access: ContainerAccessLevel,
    ) -> Result<bool> {
        let url = format!("{}?restype=container", self.container_url(container));
        let mut req = self.request(Method::PUT, &url, 0);
        if let Some(access) = access.header_value() {
            req = req.header(X_MS_BLOB_PUBLIC_ACCESS, access);
        }

        let resp = self.send(req.body(Bytes::new())?).await?;
        match resp.status() {
            StatusCode::CREATED => {
                debug!("created container {container} with access {access:?}");
                Ok(true)
            }
            StatusCode::CONFLICT if error_code(&resp) == Some("ContainerAlreadyExists") => Ok(false),
            _ => Err(parse_error(resp)),
        }
    }

    /// Check whether the container exists.
    pub async fn container_exists(&self, container: &str) -> Result<bool> {
        let url = format!("{}?restype=container", self.container_url(container));
        let req = self.request(Method::GET, &url, 0).body(Bytes::new())?;

        let resp = self.send(req).await?;
        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(parse_error(resp)),
        }
    }

    /// Upload a whole block blob in one request.
    pub async fn put_blob(
        &self,
        container: &str,
        blob: &str,
        body: Bytes,
        settings: &ContentSettings,
        metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        let url = self.object_url(container, blob);
        let mut req = self
            .request(Method::PUT, &url, body.len())
            .header(X_MS_BLOB_TYPE, "BlockBlob");
        req = with_blob_headers(req, settings, metadata);

        debug!("put blob {container}/{blob} with {} bytes", body.len());
        let resp = self.send(req.body(body)?).await?;
        match resp.status() {
            StatusCode::CREATED => Ok(()),
            _ => Err(parse_error(resp)),
        }
    }

    /// Stage one block of a block blob.
    pub async fn put_block(
        &self,
        container: &str,
        blob: &str,
        block_id: &str,
        body: Bytes,
    ) -> Result<()> {
        let url = format!(
            "{}?comp=block&blockid={}",
            self.object_url(container, blob),
            utf8_percent_encode(block_id, &AZURE_QUERY_ENCODE_SET)
        );
        let req = self.request(Method::PUT, &url, body.len()).body(body)?;

        let resp = self.send(req).await?;
        match resp.status() {
            StatusCode::CREATED => Ok(()),
            _ => Err(parse_error(resp)),
        }
    }

    /// Commit staged blocks, in the given order, as the content of the blob.
    pub async fn put_block_list(
        &self,
        container: &str,
        blob: &str,
        block_ids: &[String],
        settings: &ContentSettings,
        metadata: &BTreeMap<String, String>,
    ) -> Result<()> {
        let body = Bytes::from(block_list_xml(block_ids)?);
        let url = format!("{}?comp=blocklist", self.object_url(container, blob));
        let mut req = self
            .request(Method::PUT, &url, body.len())
            .header(header::CONTENT_TYPE, "application/xml");
        req = with_blob_headers(req, settings, metadata);

        debug!(
            "put block list {container}/{blob} with {} blocks",
            block_ids.len()
        );
        let resp = self.send(req.body(body)?).await?;
        match resp.status() {
            StatusCode::CREATED => Ok(()),
            _ => Err(parse_error(resp)),
        }
    }

    /// Fetch the properties of a blob.
    pub async fn get_blob_properties(&self, container: &str, blob: &str) -> Result<BlobProperties> {
        let url = self.object_url(container, blob);
        let req = self.request(Method::HEAD, &url, 0).body(Bytes::new())?;

        let resp = self.send(req).await?;
        if resp.status() != StatusCode::OK {
            return Err(parse_error(resp));
        }

        let headers = resp.headers();
        let get = |name: &str| -> Result<Option<String>> {
            headers
                .get(name)
                .map(|v| v.to_str().map(str::to_string).map_err(Error::from))
                .transpose()
        };

        let content_length = match get(header::CONTENT_LENGTH.as_str())? {
            Some(v) => v.parse::<u64>().map_err(|e| {
                Error::unexpected(format!("invalid content-length {v}")).with_source(e)
            })?,
            None => 0,
        };

        let mut metadata = BTreeMap::new();
        for (name, value) in headers {
            if let Some(key) = name.as_str().strip_prefix(X_MS_META_PREFIX) {
                metadata.insert(key.to_string(), value.to_str()?.to_string());
            }
        }

        Ok(BlobProperties {
            etag: get(header::ETAG.as_str())?.unwrap_or_default(),
            blob_type: get(X_MS_BLOB_TYPE)?.unwrap_or_default(),
            content_length,
            content_type: get(header::CONTENT_TYPE.as_str())?,
            metadata,
        })
    }

    /// Delete a blob. A blob that is already gone is not an error.
    ///
    /// Returns `true` when the blob was deleted by this call.
    pub async fn delete_blob_if_exists(&self, container: &str, blob: &str) -> Result<bool> {
        let url = self.object_url(container, blob);
        let req = self.request(Method::DELETE, &url, 0).body(Bytes::new())?;

        let resp = self.send(req).await?;
        match resp.status() {
            StatusCode::ACCEPTED => {
                debug!("deleted blob {container}/{blob}");
                Ok(true)
            }
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(parse_error(resp)),
        }
    }

    /// URL a client can read the blob from.
    ///
    /// - Shared key: signed with a read-only blob SAS valid for the configured minutes.
    /// - SAS token: the configured token is appended.
    /// - Bearer token, or [`UrlExpiration::Never`]: the plain blob URL.
    pub async fn blob_url(
        &self,
        container: &str,
        blob: &str,
        expiration: UrlExpiration,
    ) -> Result<String> {
        let url = self.object_url(container, blob);
        let UrlExpiration::Minutes(minutes) = expiration else {
            return Ok(url);
        };

        match self.signer.credential().await? {
            Some(Credential::SharedKey {
                account_name,
                account_key,
            }) => {
                let expiry = now() + chrono::TimeDelta::minutes(i64::from(minutes));
                let mut sas = BlobSharedAccessSignature::new(
                    &account_name,
                    &account_key,
                    container,
                    blob,
                    expiry,
                );
                if self.endpoint.starts_with("https://") {
                    sas = sas.with_protocol("https");
                }
                Ok(format!("{url}?{}", sas.query()?))
            }
            Some(Credential::SasToken { token }) => Ok(format!("{url}?{token}")),
            Some(Credential::BearerToken { .. }) | None => Ok(url),
        }
    }
}

/// Block id for the block at `index`.
///
/// All ids of a blob must have the same length, so the index is zero padded.
pub fn block_id(index: usize) -> String {
    base64_encode(format!("{index:032}").as_bytes())
}

#[derive(Serialize)]
#[serde(rename = "BlockList")]
struct BlockList<'a> {
    #[serde(rename = "Latest")]
    latest: &'a [String],
}

fn block_list_xml(block_ids: &[String]) -> Result<String> {
    let body = quick_xml::se::to_string(&BlockList { latest: block_ids })
        .map_err(|e| Error::unexpected("failed to serialize block list").with_source(e))?;
    Ok(format!("<?xml version=\"1.0\" encoding=\"utf-8\"?>{body}"))
}

fn with_blob_headers(
    mut req: http::request::Builder,
    settings: &ContentSettings,
    metadata: &BTreeMap<String, String>,
) -> http::request::Builder {
    for (name, value) in settings.to_headers() {
        req = req.header(name, value);
    }
    for (key, value) in metadata {
        req = req.header(format!("{X_MS_META_PREFIX}{key}"), value);
    }
    req
}

fn error_code(resp: &Response<Bytes>) -> Option<&str> {
    resp.headers()
        .get(X_MS_ERROR_CODE)
        .and_then(|v| v.to_str().ok())
}

fn parse_error(resp: Response<Bytes>) -> Error {
    let status = resp.status();
    let code = error_code(&resp).unwrap_or("Unknown").to_string();
    let body = String::from_utf8_lossy(resp.body());
    Error::unexpected(format!(
        "blob service responded {status} ({code}): {body}"
    ))
}
