//! The contract between an upload pipeline and a storage backend.

use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};

use bytes::Bytes;
use futures::stream::{self, BoxStream};
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// StorageEngine is implemented by storage backends and invoked by the upload pipeline.
///
/// The pipeline calls [`StorageEngine::handle_file`] once per uploaded file, and
/// [`StorageEngine::remove_file`] with a previously returned [`OutgoingFile`] when the
/// upload has to be rolled back.
#[async_trait::async_trait]
pub trait StorageEngine: Send + Sync + 'static {
    /// Store the incoming file and describe where it went.
    async fn handle_file(
        &self,
        req: &http::request::Parts,
        file: IncomingFile,
    ) -> Result<OutgoingFile>;

    /// Remove a file previously stored by [`StorageEngine::handle_file`].
    async fn remove_file(&self, req: &http::request::Parts, file: &OutgoingFile) -> Result<()>;
}

/// Descriptive fields of an uploaded file, as reported by the upload pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// Name of the form field the file was sent in.
    pub field_name: String,
    /// Name of the file on the client.
    pub original_name: String,
    /// Transfer encoding of the part, if the client sent one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    /// MIME type declared by the client.
    pub mime_type: String,
    /// Size in bytes, if known before the body is read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl FileInfo {
    /// Extension of the original file name, including the leading dot.
    ///
    /// Returns an empty string when there is no extension. Dot files such as
    /// `.env` have no extension.
    ///
    /// ```
    /// use azfile_core::IncomingFile;
    /// use bytes::Bytes;
    ///
    /// let file = IncomingFile::from_bytes("doc", "report.final.pdf", "application/pdf", Bytes::new());
    /// assert_eq!(file.info.extension(), ".pdf");
    /// ```
    pub fn extension(&self) -> &str {
        let base = self
            .original_name
            .rsplit(&['/', '\\'][..])
            .next()
            .unwrap_or_default();
        if base.trim_start_matches('.').is_empty() {
            return "";
        }

        match base.rfind('.') {
            None | Some(0) => "",
            Some(idx) => &base[idx..],
        }
    }
}

/// Bytes of an uploaded file.
pub enum FileSource {
    /// The whole file, already buffered in memory.
    Buffer(Bytes),
    /// A stream of chunks, read exactly once.
    Stream(BoxStream<'static, Result<Bytes>>),
}

impl Debug for FileSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FileSource::Buffer(bs) => f.debug_tuple("Buffer").field(&bs.len()).finish(),
            FileSource::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl FileSource {
    /// Wrap any fallible byte stream, for example a multipart field.
    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: futures::Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
        E: Into<anyhow::Error>,
    {
        FileSource::Stream(
            stream
                .map_err(|e| {
                    let e: anyhow::Error = e.into();
                    Error::unexpected(format!("read upload stream: {e}")).with_source(e)
                })
                .boxed(),
        )
    }

    /// Turn the source into a stream regardless of its variant.
    pub fn into_stream(self) -> BoxStream<'static, Result<Bytes>> {
        match self {
            FileSource::Buffer(bs) => stream::once(async move { Ok(bs) }).boxed(),
            FileSource::Stream(s) => s,
        }
    }
}

/// A file handed to [`StorageEngine::handle_file`].
#[derive(Debug)]
pub struct IncomingFile {
    /// Descriptive fields, visible to name and metadata resolvers.
    pub info: FileInfo,
    /// The file content.
    pub source: FileSource,
}

impl IncomingFile {
    /// Build an incoming file from a fully buffered body.
    pub fn from_bytes(
        field_name: impl Into<String>,
        original_name: impl Into<String>,
        mime_type: impl Into<String>,
        data: Bytes,
    ) -> Self {
        Self {
            info: FileInfo {
                field_name: field_name.into(),
                original_name: original_name.into(),
                encoding: None,
                mime_type: mime_type.into(),
                size: Some(data.len() as u64),
            },
            source: FileSource::Buffer(data),
        }
    }

    /// Build an incoming file from descriptive fields and a stream.
    pub fn from_stream(info: FileInfo, source: FileSource) -> Self {
        Self { info, source }
    }
}

/// The result of a successful [`StorageEngine::handle_file`].
///
/// It carries every field of the incoming file plus the location of the stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingFile {
    /// Fields copied from the incoming file.
    #[serde(flatten)]
    pub file: FileInfo,
    /// URL the blob can be fetched from.
    pub url: String,
    /// Name of the blob inside its container.
    pub blob_name: String,
    /// Container holding the blob.
    pub container: String,
    /// ETag assigned by the service.
    pub etag: String,
    /// Blob type reported by the service, e.g. `BlockBlob`.
    pub blob_type: String,
    /// Stored size in bytes, as a decimal string.
    pub blob_size: String,
    /// Metadata stored with the blob.
    pub metadata: BTreeMap<String, String>,
}
