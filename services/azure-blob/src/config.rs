use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::str::FromStr;

use azfile_core::utils::Redact;
use azfile_core::{ConfigError, Context};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::connection_string;
use crate::constants::*;
use crate::resolver::ValueSource;

const MISSING_ACCOUNT_NAME: &str = "Missing required parameter: Azure blob storage account name.";
const MISSING_ACCESS_KEY: &str = "Missing required parameter: Azure blob storage access key.";
const MISSING_SAS_TOKEN: &str = "Missing required parameter: Azure blob storage SAS token.";
const MISSING_CONNECTION_STRING: &str =
    "Missing required parameter: Azure blob storage connection string.";
const MISSING_CONTAINER_NAME: &str = "Missing required parameter: Azure container name.";
const MISSING_AUTHENTICATION: &str =
    "Missing required parameter: no authentication information found.";

/// How the storage engine authenticates against the blob service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthenticationType {
    /// Account name and access key.
    SharedKey,
    /// A full connection string.
    ConnectionString,
    /// Account name and a SAS token.
    SasToken,
    /// Managed identity of the host (Azure AD).
    ManagedIdentity,
}

impl FromStr for AuthenticationType {
    type Err = azfile_core::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "shared key" | "shared-key" | "account name and key" => Ok(Self::SharedKey),
            "connection string" | "connection-string" => Ok(Self::ConnectionString),
            "sas token" | "sas-token" | "sas" => Ok(Self::SasToken),
            "managed identity" | "managed-identity" | "azure ad" | "app registration" => {
                Ok(Self::ManagedIdentity)
            }
            _ => Err(azfile_core::Error::config_invalid(format!(
                "unknown authentication type: {s}"
            ))),
        }
    }
}

/// Public access level of containers created by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContainerAccessLevel {
    /// No anonymous access.
    Private,
    /// Anonymous read access to blobs only.
    #[default]
    Blob,
    /// Anonymous read access to blobs and container listing.
    Container,
}

impl ContainerAccessLevel {
    /// Value of the `x-ms-blob-public-access` header, `None` for private containers.
    pub fn header_value(&self) -> Option<&'static str> {
        match self {
            ContainerAccessLevel::Private => None,
            ContainerAccessLevel::Blob => Some("blob"),
            ContainerAccessLevel::Container => Some("container"),
        }
    }
}

impl FromStr for ContainerAccessLevel {
    type Err = std::convert::Infallible;

    /// Unknown values fall back to [`ContainerAccessLevel::Blob`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "private" => Self::Private,
            "container" => Self::Container,
            _ => Self::Blob,
        })
    }
}

/// How long generated blob URLs stay usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlExpiration {
    /// URL is signed for this many minutes.
    Minutes(u32),
    /// URL is returned without an expiring signature.
    Never,
}

impl Default for UrlExpiration {
    fn default() -> Self {
        UrlExpiration::Minutes(DEFAULT_URL_EXPIRATION_MINUTES)
    }
}

impl From<i64> for UrlExpiration {
    /// `-1` means never, positive values are minutes, anything else is the default.
    fn from(v: i64) -> Self {
        match v {
            -1 => UrlExpiration::Never,
            n if n > 0 => UrlExpiration::Minutes(u32::try_from(n).unwrap_or(u32::MAX)),
            _ => UrlExpiration::default(),
        }
    }
}

/// HTTP properties stored with a blob and returned when it is downloaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSettings {
    /// `Content-Type` of the blob.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// `Content-Disposition` of the blob.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_disposition: Option<String>,
    /// `Content-Encoding` of the blob.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    /// `Content-Language` of the blob.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_language: Option<String>,
    /// `Cache-Control` of the blob.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<String>,
}

impl ContentSettings {
    /// Settings used when none are configured: the declared MIME type, shown inline.
    pub fn inline(mime_type: &str) -> Self {
        Self {
            content_type: Some(mime_type.to_string()),
            content_disposition: Some(DEFAULT_CONTENT_DISPOSITION.to_string()),
            ..Default::default()
        }
    }

    /// `x-ms-blob-*` headers carrying these settings.
    pub(crate) fn to_headers(&self) -> Vec<(&'static str, &str)> {
        [
            (X_MS_BLOB_CONTENT_TYPE, &self.content_type),
            (X_MS_BLOB_CONTENT_DISPOSITION, &self.content_disposition),
            (X_MS_BLOB_CONTENT_ENCODING, &self.content_encoding),
            (X_MS_BLOB_CONTENT_LANGUAGE, &self.content_language),
            (X_MS_BLOB_CACHE_CONTROL, &self.cache_control),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.as_deref().map(|v| (k, v)))
        .collect()
    }
}

/// Options of [`AzureBlobStorage`](crate::AzureBlobStorage).
///
/// Credentials left empty are read from the environment of the [`Context`]:
///
/// - `access_key`: `AZURE_STORAGE_ACCESS_KEY`, then `AZURE_STORAGE_ACCOUNT_KEY`
/// - `account_name`: `AZURE_STORAGE_ACCOUNT`, then `AZURE_STORAGE_ACCOUNT_NAME`
/// - `sas_token`: `AZURE_STORAGE_SAS_TOKEN`
/// - `connection_string`: `AZURE_STORAGE_CONNECTION_STRING`
/// - `endpoint`: `AZURE_STORAGE_BLOB_ENDPOINT`
#[derive(Clone, Default)]
pub struct Config {
    /// Authentication mode, inferred from the credentials when unset.
    pub authentication_type: Option<AuthenticationType>,
    /// Storage account name.
    pub account_name: Option<String>,
    /// Storage account access key.
    pub access_key: Option<String>,
    /// SAS token, with or without the leading `?`.
    pub sas_token: Option<String>,
    /// Storage account connection string.
    pub connection_string: Option<String>,
    /// Blob service endpoint, `https://{account}.blob.core.windows.net` when unset.
    pub endpoint: Option<String>,
    /// Lifetime of returned URLs.
    pub url_expiration: UrlExpiration,
    /// Destination container. Required.
    pub container_name: Option<ValueSource<String>>,
    /// Destination blob name, generated when unset.
    pub blob_name: Option<ValueSource<String>>,
    /// Access level of containers created on upload.
    pub container_access_level: ContainerAccessLevel,
    /// Metadata stored with every blob.
    pub metadata: Option<ValueSource<BTreeMap<String, String>>>,
    /// Content settings stored with every blob.
    pub content_settings: Option<ValueSource<ContentSettings>>,
}

impl Debug for Config {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("authentication_type", &self.authentication_type)
            .field("account_name", &self.account_name)
            .field("access_key", &Redact::from(&self.access_key))
            .field("sas_token", &Redact::from(&self.sas_token))
            .field("connection_string", &Redact::from(&self.connection_string))
            .field("endpoint", &self.endpoint)
            .field("url_expiration", &self.url_expiration)
            .field("container_name", &self.container_name)
            .field("blob_name", &self.blob_name)
            .field("container_access_level", &self.container_access_level)
            .field("metadata", &self.metadata)
            .field("content_settings", &self.content_settings)
            .finish()
    }
}

impl Config {
    /// Set the authentication type.
    pub fn with_authentication_type(mut self, v: AuthenticationType) -> Self {
        self.authentication_type = Some(v);
        self
    }

    /// Set the account name.
    pub fn with_account_name(mut self, v: impl Into<String>) -> Self {
        self.account_name = Some(v.into());
        self
    }

    /// Set the access key.
    pub fn with_access_key(mut self, v: impl Into<String>) -> Self {
        self.access_key = Some(v.into());
        self
    }

    /// Set the SAS token.
    pub fn with_sas_token(mut self, v: impl Into<String>) -> Self {
        self.sas_token = Some(v.into());
        self
    }

    /// Set the connection string.
    pub fn with_connection_string(mut self, v: impl Into<String>) -> Self {
        self.connection_string = Some(v.into());
        self
    }

    /// Set the blob service endpoint.
    pub fn with_endpoint(mut self, v: impl Into<String>) -> Self {
        self.endpoint = Some(v.into());
        self
    }

    /// Set the URL expiration.
    pub fn with_url_expiration(mut self, v: impl Into<UrlExpiration>) -> Self {
        self.url_expiration = v.into();
        self
    }

    /// Set the container name source.
    pub fn with_container_name(mut self, v: impl Into<ValueSource<String>>) -> Self {
        self.container_name = Some(v.into());
        self
    }

    /// Set the blob name source.
    pub fn with_blob_name(mut self, v: impl Into<ValueSource<String>>) -> Self {
        self.blob_name = Some(v.into());
        self
    }

    /// Set the container access level.
    pub fn with_container_access_level(mut self, v: ContainerAccessLevel) -> Self {
        self.container_access_level = v;
        self
    }

    /// Set the metadata source.
    pub fn with_metadata(mut self, v: impl Into<ValueSource<BTreeMap<String, String>>>) -> Self {
        self.metadata = Some(v.into());
        self
    }

    /// Set the content settings source.
    pub fn with_content_settings(mut self, v: impl Into<ValueSource<ContentSettings>>) -> Self {
        self.content_settings = Some(v.into());
        self
    }

    /// Validate the options, fill in environment values and pick the authentication mode.
    ///
    /// Every check runs, so the error lists all problems at once.
    pub(crate) fn resolve(self, ctx: &Context) -> Result<ResolvedConfig, ConfigError> {
        let mut causes = Vec::new();

        let container_name = match self.container_name {
            Some(ValueSource::Static(name)) if name.is_empty() => None,
            other => other,
        };
        if container_name.is_none() {
            causes.push(MISSING_CONTAINER_NAME.to_string());
        }

        let account_name = non_empty(self.account_name)
            .or_else(|| ctx.env_var_any(&[AZURE_STORAGE_ACCOUNT, AZURE_STORAGE_ACCOUNT_NAME]));
        let access_key = non_empty(self.access_key)
            .or_else(|| ctx.env_var_any(&[AZURE_STORAGE_ACCESS_KEY, AZURE_STORAGE_ACCOUNT_KEY]));
        let sas_token = non_empty(self.sas_token)
            .or_else(|| ctx.env_var_any(&[AZURE_STORAGE_SAS_TOKEN]));
        let connection_string = non_empty(self.connection_string)
            .or_else(|| ctx.env_var_any(&[AZURE_STORAGE_CONNECTION_STRING]));
        let endpoint =
            non_empty(self.endpoint).or_else(|| ctx.env_var_any(&[AZURE_STORAGE_BLOB_ENDPOINT]));

        let authentication_type = self.authentication_type.or_else(|| {
            if sas_token.is_some() {
                Some(AuthenticationType::SasToken)
            } else if connection_string.is_some() {
                Some(AuthenticationType::ConnectionString)
            } else if access_key.is_some() {
                Some(AuthenticationType::SharedKey)
            } else {
                None
            }
        });
        debug!("azure blob authentication type: {authentication_type:?}");

        let auth = match authentication_type {
            None => {
                causes.push(MISSING_AUTHENTICATION.to_string());
                None
            }
            Some(AuthenticationType::SharedKey) => {
                if access_key.is_none() {
                    causes.push(MISSING_ACCESS_KEY.to_string());
                }
                if account_name.is_none() {
                    causes.push(MISSING_ACCOUNT_NAME.to_string());
                }
                match (account_name, access_key) {
                    (Some(account_name), Some(account_key)) => Some(ResolvedAuth::SharedKey {
                        endpoint: endpoint.unwrap_or_else(|| default_endpoint(&account_name)),
                        account_name,
                        account_key,
                    }),
                    _ => None,
                }
            }
            Some(AuthenticationType::SasToken) => {
                if account_name.is_none() {
                    causes.push(MISSING_ACCOUNT_NAME.to_string());
                }
                if sas_token.is_none() {
                    causes.push(MISSING_SAS_TOKEN.to_string());
                }
                match (account_name, sas_token) {
                    (Some(account_name), Some(token)) => Some(ResolvedAuth::SasToken {
                        endpoint: endpoint.unwrap_or_else(|| default_endpoint(&account_name)),
                        token,
                    }),
                    _ => None,
                }
            }
            Some(AuthenticationType::ManagedIdentity) => match account_name {
                Some(account_name) => Some(ResolvedAuth::ManagedIdentity {
                    endpoint: endpoint.unwrap_or_else(|| default_endpoint(&account_name)),
                }),
                None => {
                    causes.push(MISSING_ACCOUNT_NAME.to_string());
                    None
                }
            },
            Some(AuthenticationType::ConnectionString) => match connection_string {
                None => {
                    causes.push(MISSING_CONNECTION_STRING.to_string());
                    None
                }
                Some(conn_str) => match from_connection_string(&conn_str, endpoint) {
                    Ok(auth) => Some(auth),
                    Err(cause) => {
                        causes.push(cause);
                        None
                    }
                },
            },
        };

        match (auth, container_name) {
            (Some(auth), Some(container_name)) if causes.is_empty() => Ok(ResolvedConfig {
                auth,
                url_expiration: self.url_expiration,
                container_name,
                blob_name: self.blob_name,
                container_access_level: self.container_access_level,
                metadata: self.metadata,
                content_settings: self.content_settings,
            }),
            _ => Err(ConfigError::new(causes)),
        }
    }
}

/// Authentication settled by [`Config::resolve`].
#[derive(Clone, PartialEq, Eq)]
pub(crate) enum ResolvedAuth {
    SharedKey {
        endpoint: String,
        account_name: String,
        account_key: String,
    },
    SasToken {
        endpoint: String,
        token: String,
    },
    ManagedIdentity {
        endpoint: String,
    },
}

impl ResolvedAuth {
    pub fn endpoint(&self) -> &str {
        match self {
            ResolvedAuth::SharedKey { endpoint, .. }
            | ResolvedAuth::SasToken { endpoint, .. }
            | ResolvedAuth::ManagedIdentity { endpoint } => endpoint,
        }
    }
}

impl Debug for ResolvedAuth {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedAuth::SharedKey {
                endpoint,
                account_name,
                ..
            } => f
                .debug_struct("SharedKey")
                .field("endpoint", endpoint)
                .field("account_name", account_name)
                .finish_non_exhaustive(),
            ResolvedAuth::SasToken { endpoint, .. } => f
                .debug_struct("SasToken")
                .field("endpoint", endpoint)
                .finish_non_exhaustive(),
            ResolvedAuth::ManagedIdentity { endpoint } => f
                .debug_struct("ManagedIdentity")
                .field("endpoint", endpoint)
                .finish(),
        }
    }
}

/// A validated [`Config`].
#[derive(Debug, Clone)]
pub(crate) struct ResolvedConfig {
    pub auth: ResolvedAuth,
    pub url_expiration: UrlExpiration,
    pub container_name: ValueSource<String>,
    pub blob_name: Option<ValueSource<String>>,
    pub container_access_level: ContainerAccessLevel,
    pub metadata: Option<ValueSource<BTreeMap<String, String>>>,
    pub content_settings: Option<ValueSource<ContentSettings>>,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|v| !v.is_empty())
}

fn default_endpoint(account_name: &str) -> String {
    format!("https://{account_name}.blob.core.windows.net")
}

fn from_connection_string(
    conn_str: &str,
    endpoint: Option<String>,
) -> Result<ResolvedAuth, String> {
    let parsed = connection_string::parse(conn_str)
        .map_err(|e| format!("Invalid connection string: {e}."))?;
    if !parsed.has_credential() {
        return Err(
            "Invalid connection string: no account key or shared access signature found."
                .to_string(),
        );
    }

    let endpoint = endpoint
        .or(parsed.endpoint)
        .or_else(|| parsed.account_name.as_deref().map(default_endpoint))
        .ok_or_else(|| "Invalid connection string: no blob endpoint found.".to_string())?;

    Ok(match (parsed.sas_token, parsed.account_name, parsed.account_key) {
        (Some(token), _, _) => ResolvedAuth::SasToken { endpoint, token },
        (None, account_name, account_key) => ResolvedAuth::SharedKey {
            endpoint,
            account_name: account_name.unwrap_or_default(),
            account_key: account_key.unwrap_or_default(),
        },
    })
}
