//! Azure Blob Storage backend.

pub use azfile_azure_blob::*;

#[cfg(feature = "default-context")]
use crate::default_context;

/// Azure Blob storage using [`default_context`].
///
/// Configuration errors are kept and reported by every operation, so this never fails.
///
/// ```no_run
/// use azfile::azure::{default_storage, Config, ContainerAccessLevel};
///
/// let storage = default_storage(
///     Config::default()
///         .with_container_name("avatars")
///         .with_container_access_level(ContainerAccessLevel::Private),
/// );
/// if let Some(err) = storage.config_error() {
///     eprintln!("azure blob storage misconfigured: {err}");
/// }
/// ```
#[cfg(feature = "default-context")]
pub fn default_storage(config: Config) -> AzureBlobStorage {
    AzureBlobStorage::new(default_context(), config)
}
