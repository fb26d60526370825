use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};

// Headers used in azure services.
pub const X_MS_DATE: &str = "x-ms-date";
pub const X_MS_VERSION: &str = "x-ms-version";
pub const X_MS_BLOB_TYPE: &str = "x-ms-blob-type";
pub const X_MS_BLOB_PUBLIC_ACCESS: &str = "x-ms-blob-public-access";
pub const X_MS_BLOB_CONTENT_TYPE: &str = "x-ms-blob-content-type";
pub const X_MS_BLOB_CONTENT_DISPOSITION: &str = "x-ms-blob-content-disposition";
pub const X_MS_BLOB_CONTENT_ENCODING: &str = "x-ms-blob-content-encoding";
pub const X_MS_BLOB_CONTENT_LANGUAGE: &str = "x-ms-blob-content-language";
pub const X_MS_BLOB_CACHE_CONTROL: &str = "x-ms-blob-cache-control";
pub const X_MS_ERROR_CODE: &str = "x-ms-error-code";
pub const X_MS_META_PREFIX: &str = "x-ms-meta-";

/// Blob service REST version sent with every request.
pub const AZURE_VERSION: &str = "2021-08-06";

// Env values used to fill in missing options.
pub const AZURE_STORAGE_ACCESS_KEY: &str = "AZURE_STORAGE_ACCESS_KEY";
pub const AZURE_STORAGE_ACCOUNT_KEY: &str = "AZURE_STORAGE_ACCOUNT_KEY";
pub const AZURE_STORAGE_ACCOUNT: &str = "AZURE_STORAGE_ACCOUNT";
pub const AZURE_STORAGE_ACCOUNT_NAME: &str = "AZURE_STORAGE_ACCOUNT_NAME";
pub const AZURE_STORAGE_SAS_TOKEN: &str = "AZURE_STORAGE_SAS_TOKEN";
pub const AZURE_STORAGE_CONNECTION_STRING: &str = "AZURE_STORAGE_CONNECTION_STRING";
pub const AZURE_STORAGE_BLOB_ENDPOINT: &str = "AZURE_STORAGE_BLOB_ENDPOINT";

// Env values used by managed identity.
pub const AZURE_CLIENT_ID: &str = "AZURE_CLIENT_ID";
pub const IDENTITY_ENDPOINT: &str = "IDENTITY_ENDPOINT";
pub const IDENTITY_HEADER: &str = "IDENTITY_HEADER";
pub const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
pub const STORAGE_RESOURCE: &str = "https://storage.azure.com/";

// Defaults applied when options are absent.
pub const DEFAULT_URL_EXPIRATION_MINUTES: u32 = 60;
pub const DEFAULT_CONTENT_DISPOSITION: &str = "inline";

/// Size of each staged block.
pub const UPLOAD_BLOCK_SIZE: usize = 4 * 1024 * 1024;
/// Number of blocks uploaded concurrently.
pub const UPLOAD_MAX_BUFFERS: usize = 20;

/// AsciiSet for [Azure UriEncode](https://learn.microsoft.com/en-us/rest/api/storageservices/naming-and-referencing-containers--blobs--and-metadata)
///
/// - `/` is kept so that virtual directories stay readable.
pub static AZURE_QUERY_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'/')
    .remove(b'~');
