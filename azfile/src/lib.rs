//! Store uploaded files in cloud object storage without effort.
//!
//! `azfile` re-exports [`azfile_core`] and the storage backends behind features:
//!
//! - `azure` (default): Azure Blob Storage, see [`azure::AzureBlobStorage`].
//! - `default-context` (default): [`default_context`], a [`Context`] backed by
//!   reqwest and the process environment.
//!
//! ```no_run
//! use azfile::azure::{AzureBlobStorage, Config};
//! use azfile::{default_context, IncomingFile, StorageEngine};
//!
//! # async fn upload(req: http::request::Parts, file: IncomingFile) -> azfile::Result<()> {
//! let storage = AzureBlobStorage::try_new(
//!     default_context(),
//!     Config::default().with_container_name("uploads"),
//! )?;
//! let stored = storage.handle_file(&req, file).await?;
//! println!("{}", stored.url);
//! # Ok(())
//! # }
//! ```
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub use azfile_core::*;

#[cfg(feature = "default-context")]
mod context;
#[cfg(feature = "default-context")]
pub use context::{default_context, default_context_with_client};

#[cfg(feature = "azure")]
pub mod azure;
