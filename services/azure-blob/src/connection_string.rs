use std::collections::HashMap;

use anyhow::{anyhow, Result};

// Azurite defaults.
const AZURITE_DEFAULT_STORAGE_ACCOUNT_NAME: &str = "devstoreaccount1";
const AZURITE_DEFAULT_STORAGE_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const AZURITE_DEFAULT_BLOB_URI: &str = "http://127.0.0.1:10000";

/// Values read from a blob storage connection string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ConnectionString {
    pub account_name: Option<String>,
    pub account_key: Option<String>,
    pub sas_token: Option<String>,
    pub endpoint: Option<String>,
}

impl ConnectionString {
    /// Whether the connection string carries something a client can authenticate with.
    pub fn has_credential(&self) -> bool {
        self.sas_token.is_some() || (self.account_name.is_some() && self.account_key.is_some())
    }
}

/// Parses an [Azure connection string][1] for the blob service.
///
/// [1]: https://learn.microsoft.com/en-us/azure/storage/common/storage-configure-connection-string
pub(crate) fn parse(conn_str: &str) -> Result<ConnectionString> {
    let key_values = parse_into_key_values(conn_str)?;

    if let Some(development) = collect_development_config(&key_values) {
        return Ok(development);
    }

    let mut parsed = ConnectionString {
        account_name: key_values.get("AccountName").cloned(),
        endpoint: collect_endpoint(&key_values)?,
        ..Default::default()
    };

    // A SAS token wins over the account key when both are present.
    if let Some(token) = key_values.get("SharedAccessSignature") {
        parsed.sas_token = Some(token.clone());
    } else if parsed.account_name.is_some() {
        parsed.account_key = key_values.get("AccountKey").cloned();
    }

    Ok(parsed)
}

fn parse_into_key_values(conn_str: &str) -> Result<HashMap<String, String>> {
    conn_str
        .trim()
        .replace('\n', "")
        .split(';')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .map(|field| {
            let (key, value) = field
                .split_once('=')
                .ok_or_else(|| anyhow!("expected '=' in field: {field}"))?;
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

fn collect_development_config(key_values: &HashMap<String, String>) -> Option<ConnectionString> {
    if key_values.get("UseDevelopmentStorage").map(String::as_str) != Some("true") {
        return None;
    }

    let account_name = key_values
        .get("AccountName")
        .cloned()
        .unwrap_or_else(|| AZURITE_DEFAULT_STORAGE_ACCOUNT_NAME.to_string());
    let account_key = key_values
        .get("AccountKey")
        .cloned()
        .unwrap_or_else(|| AZURITE_DEFAULT_STORAGE_ACCOUNT_KEY.to_string());
    let proxy_uri = key_values
        .get("DevelopmentStorageProxyUri")
        .map(String::as_str)
        .unwrap_or(AZURITE_DEFAULT_BLOB_URI);

    Some(ConnectionString {
        endpoint: Some(format!("{proxy_uri}/{account_name}")),
        account_name: Some(account_name),
        account_key: Some(account_key),
        sas_token: None,
    })
}

/// Parses the blob endpoint from the key-value pairs if possible.
///
/// An explicit `BlobEndpoint` wins, otherwise the endpoint is built from
/// `DefaultEndpointsProtocol`, `AccountName` and `EndpointSuffix`.
fn collect_endpoint(key_values: &HashMap<String, String>) -> Result<Option<String>> {
    if let Some(endpoint) = key_values.get("BlobEndpoint") {
        return Ok(Some(endpoint.clone()));
    }

    let (account_name, endpoint_suffix) = match (
        key_values.get("AccountName"),
        key_values.get("EndpointSuffix"),
    ) {
        (Some(name), Some(suffix)) => (name, suffix),
        _ => return Ok(None),
    };

    let protocol = key_values
        .get("DefaultEndpointsProtocol")
        .map(String::as_str)
        .unwrap_or("https");
    if protocol != "http" && protocol != "https" {
        return Err(anyhow!("invalid DefaultEndpointsProtocol: {protocol}"));
    }

    Ok(Some(format!(
        "{protocol}://{account_name}.blob.{endpoint_suffix}"
    )))
}
