use crate::constants::*;
use crate::Credential;
use async_trait::async_trait;
use azfile_core::time::{now, parse_rfc3339, parse_unix_seconds, DateTime};
use azfile_core::{Context, Error, ProvideCredential, Result};
use log::debug;
use serde::Deserialize;

/// Load a bearer token for the managed identity of the host.
///
/// On App Service and Functions the token comes from `IDENTITY_ENDPOINT`,
/// authenticated with `IDENTITY_HEADER`. Everywhere else the Azure Instance
/// Metadata Service is queried. `AZURE_CLIENT_ID` selects a user-assigned identity.
///
/// Reference: <https://learn.microsoft.com/en-us/azure/app-service/overview-managed-identity?tabs=portal,http#using-the-rest-protocol>
#[derive(Debug, Default)]
pub struct ImdsCredentialProvider;

impl ImdsCredentialProvider {
    /// Create a new IMDS loader.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProvideCredential for ImdsCredentialProvider {
    type Credential = Credential;

    async fn provide_credential(&self, ctx: &Context) -> Result<Option<Self::Credential>> {
        let token = get_access_token(STORAGE_RESOURCE, ctx).await?;
        let expires_on = token.expires_on()?;

        Ok(Some(Credential::with_bearer_token(
            &token.access_token,
            Some(expires_on),
        )))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExpiresOn {
    Text(String),
    Seconds(i64),
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_on: Option<ExpiresOn>,
}

impl AccessTokenResponse {
    /// Identity endpoints report unix seconds; older ones an RFC3339 timestamp.
    fn expires_on(&self) -> Result<DateTime> {
        match &self.expires_on {
            None => Ok(now() + chrono::TimeDelta::minutes(10)),
            Some(ExpiresOn::Text(s)) if s.is_empty() => Ok(now() + chrono::TimeDelta::minutes(10)),
            Some(ExpiresOn::Text(s)) => parse_unix_seconds(s).or_else(|_| parse_rfc3339(s)),
            Some(ExpiresOn::Seconds(secs)) => parse_unix_seconds(&secs.to_string()),
        }
    }
}

async fn get_access_token(resource: &str, ctx: &Context) -> Result<AccessTokenResponse> {
    let client_id = ctx.env_var_any(&[AZURE_CLIENT_ID]);

    let req = match (
        ctx.env_var_any(&[IDENTITY_ENDPOINT]),
        ctx.env_var_any(&[IDENTITY_HEADER]),
    ) {
        (Some(endpoint), Some(secret)) => {
            debug!("loading managed identity token from app service endpoint");
            let mut url = format!("{endpoint}?api-version=2019-08-01&resource={resource}");
            if let Some(client_id) = &client_id {
                url.push_str(&format!("&client_id={client_id}"));
            }
            http::Request::get(url).header("X-IDENTITY-HEADER", secret)
        }
        _ => {
            debug!("loading managed identity token from instance metadata service");
            let mut url = format!("{IMDS_ENDPOINT}?api-version=2018-02-01&resource={resource}");
            if let Some(client_id) = &client_id {
                url.push_str(&format!("&client_id={client_id}"));
            }
            http::Request::get(url).header("Metadata", "true")
        }
    };

    let req = req
        .body(bytes::Bytes::new())
        .map_err(|e| Error::credential_invalid("failed to build identity request").with_source(e))?;

    let resp = ctx.http_send(req).await?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = String::from_utf8_lossy(resp.body());
        return Err(Error::credential_invalid(format!(
            "identity request failed with status {status}: {body}"
        )));
    }

    serde_json::from_slice(resp.body())
        .map_err(|e| Error::credential_invalid("failed to parse identity response").with_source(e))
}
