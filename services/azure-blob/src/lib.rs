//! Azure Blob Storage backend for azfile
//!
//! This crate stores uploaded files as block blobs. It supports:
//! - Shared Key authentication, from options, environment or a connection string
//! - SAS (Shared Access Signature) token authentication
//! - Managed identity (IMDS and App Service) bearer tokens
//!
//! # Example
//!
//! ```rust,no_run
//! use azfile_azure_blob::{AzureBlobStorage, Config, ValueSource};
//! use azfile_core::{Context, IncomingFile, OsEnv, StorageEngine};
//! use azfile_http_send_reqwest::ReqwestHttpSend;
//! use bytes::Bytes;
//!
//! #[tokio::main]
//! async fn main() -> azfile_core::Result<()> {
//!     let ctx = Context::new()
//!         .with_http_send(ReqwestHttpSend::default())
//!         .with_env(OsEnv);
//!
//!     // Account name and key are read from AZURE_STORAGE_ACCOUNT and
//!     // AZURE_STORAGE_ACCESS_KEY when not given here.
//!     let storage = AzureBlobStorage::try_new(
//!         ctx,
//!         Config::default().with_container_name(ValueSource::from_fn(|req, _| {
//!             let tenant = req.uri.path().trim_matches('/').to_string();
//!             async move { Ok(format!("tenant-{tenant}")) }
//!         })),
//!     )?;
//!
//!     let (req, _) = http::Request::post("/acme").body(())?.into_parts();
//!     let file = IncomingFile::from_bytes("avatar", "me.png", "image/png", Bytes::from("..."));
//!
//!     let stored = storage.handle_file(&req, file).await?;
//!     println!("stored at {}", stored.url);
//!
//!     storage.remove_file(&req, &stored).await?;
//!     Ok(())
//! }
//! ```

mod constants;

mod credential;
pub use credential::Credential;

mod connection_string;

mod resolver;
pub use resolver::{default_blob_name, ValueSource};

mod config;
pub use config::{AuthenticationType, Config, ContainerAccessLevel, ContentSettings, UrlExpiration};

mod provide_credential;
pub use provide_credential::*;

mod sign_request;
pub use sign_request::RequestSigner;

mod sas;
pub use sas::BlobSharedAccessSignature;

mod client;
pub use client::{block_id, BlobClient, BlobProperties};

mod storage;
pub use storage::AzureBlobStorage;

#[cfg(test)]
mod fake;
