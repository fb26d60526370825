//! Core components for storing uploaded files.
//!
//! This crate provides the foundational types and traits for the azfile ecosystem.
//! It defines the abstractions shared by storage backends and the upload pipelines
//! that drive them.
//!
//! ## Overview
//!
//! The crate is built around several key concepts:
//!
//! - **Context**: A container that holds implementations for HTTP sending and environment access
//! - **Signing**: Abstract interfaces for credential loading (`ProvideCredential`) and request
//!   signing (`SignRequest`), orchestrated by [`Signer`]
//! - **Storage engine**: The two hooks an upload pipeline invokes, [`StorageEngine::handle_file`]
//!   and [`StorageEngine::remove_file`]
//!
//! ## Example
//!
//! ```no_run
//! use azfile_core::{IncomingFile, StorageEngine};
//! use bytes::Bytes;
//!
//! # async fn example(engine: impl StorageEngine) -> azfile_core::Result<()> {
//! let (req, _) = http::Request::post("/upload").body(()).unwrap().into_parts();
//! let file = IncomingFile::from_bytes("avatar", "me.png", "image/png", Bytes::from_static(b"png"));
//!
//! let stored = engine.handle_file(&req, file).await?;
//! println!("stored at {}", stored.url);
//!
//! engine.remove_file(&req, &stored).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Traits
//!
//! - [`HttpSend`]: For sending HTTP requests
//! - [`Env`]: For environment variable access
//! - [`ProvideCredential`]: For loading credentials from various sources
//! - [`SignRequest`]: For building service-specific signing requests
//! - [`SigningCredential`]: For validating credentials
//! - [`StorageEngine`]: For storing and removing uploaded files
//!
//! ## Utilities
//!
//! - [`hash`]: Cryptographic hashing utilities
//! - [`time`]: Time manipulation utilities
//! - [`utils`]: General utilities including data redaction

// Make sure all our public APIs have docs.
#![warn(missing_docs)]

pub mod hash;
pub mod time;
pub mod utils;

mod context;
pub use context::{Context, Env, HttpSend, NoopEnv, NoopHttpSend, OsEnv, StaticEnv};

mod error;
pub use error::{ConfigError, Error, ErrorKind, Result};

mod api;
pub use api::{ProvideCredential, SignRequest, SigningCredential};
mod request;
pub use request::{SigningMethod, SigningRequest};
mod signer;
pub use signer::Signer;

mod engine;
pub use engine::{FileInfo, FileSource, IncomingFile, OutgoingFile, StorageEngine};
