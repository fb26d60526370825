use crate::constants::*;
use crate::Credential;
use async_trait::async_trait;
use azfile_core::hash::{base64_decode, base64_hmac_sha256};
use azfile_core::time::{format_http_date, now, DateTime};
use azfile_core::{Context, Error, Result, SignRequest, SigningMethod, SigningRequest};
use http::request::Parts;
use http::{header, HeaderName, HeaderValue};
use log::debug;
use percent_encoding::percent_encode;
use std::time::Duration;

/// RequestSigner that implements Azure Storage authorization for blob requests.
///
/// - Shared key: `Authorization: SharedKey {account}:{signature}`
/// - SAS token: the token is appended to the query
/// - Bearer token: `Authorization: Bearer {token}`
///
/// - [Authorize with Shared Key](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key)
#[derive(Debug, Default)]
pub struct RequestSigner {
    time: Option<DateTime>,
}

impl RequestSigner {
    /// Create a new builder for Azure Storage signer.
    pub fn new() -> Self {
        Self { time: None }
    }

    /// Specify the signing time.
    ///
    /// # Note
    ///
    /// We should always take current time to sign requests.
    /// Only use this function for testing.
    #[cfg(test)]
    pub fn with_time(mut self, time: DateTime) -> Self {
        self.time = Some(time);
        self
    }
}

#[async_trait]
impl SignRequest for RequestSigner {
    type Credential = Credential;

    async fn sign_request(
        &self,
        _: &Context,
        req: &mut Parts,
        credential: Option<&Self::Credential>,
        expires_in: Option<Duration>,
    ) -> Result<()> {
        let Some(cred) = credential else {
            return Err(Error::credential_invalid("credential is required"));
        };

        let method = match expires_in {
            Some(d) => SigningMethod::Query(d),
            None => SigningMethod::Header,
        };

        let mut ctx = SigningRequest::build(req)?;
        let now_time = self.time.unwrap_or_else(now);
        ctx.headers
            .insert(X_MS_DATE, format_http_date(now_time).parse()?);

        match (cred, method) {
            (Credential::SasToken { token }, _) => {
                ctx.query_append(token);
            }
            (Credential::BearerToken { .. }, SigningMethod::Query(_)) => {
                return Err(Error::request_invalid(
                    "BearerToken can't be used in query string",
                ));
            }
            (Credential::BearerToken { token, .. }, SigningMethod::Header) => {
                ctx.headers
                    .insert(header::AUTHORIZATION, sensitive(format!("Bearer {token}"))?);
            }
            (Credential::SharedKey { .. }, SigningMethod::Query(_)) => {
                return Err(Error::request_invalid(
                    "SharedKey can't be used in query string, generate a blob SAS instead",
                ));
            }
            (
                Credential::SharedKey {
                    account_name,
                    account_key,
                },
                SigningMethod::Header,
            ) => {
                let string_to_sign = string_to_sign(&ctx, account_name)?;
                let key = base64_decode(account_key).map_err(|e| {
                    Error::credential_invalid("account key is not valid base64").with_source(e)
                })?;
                let signature = base64_hmac_sha256(&key, string_to_sign.as_bytes());

                ctx.headers.insert(
                    header::AUTHORIZATION,
                    sensitive(format!("SharedKey {account_name}:{signature}"))?,
                );
            }
        }

        // Apply percent encoding for query parameters
        for (_, v) in ctx.query.iter_mut() {
            *v = percent_encode(v.as_bytes(), &AZURE_QUERY_ENCODE_SET).to_string();
        }

        ctx.apply(req)
    }
}

fn sensitive(value: String) -> Result<HeaderValue> {
    let mut value: HeaderValue = value.parse()?;
    value.set_sensitive(true);
    Ok(value)
}

/// Construct string to sign
///
/// ## Format
///
/// ```text
/// VERB + "\n" +
/// Content-Encoding + "\n" +
/// Content-Language + "\n" +
/// Content-Length + "\n" +
/// Content-MD5 + "\n" +
/// Content-Type + "\n" +
/// Date + "\n" +
/// If-Modified-Since + "\n" +
/// If-Match + "\n" +
/// If-None-Match + "\n" +
/// If-Unmodified-Since + "\n" +
/// Range + "\n" +
/// CanonicalizedHeaders +
/// CanonicalizedResource;
/// ```
///
/// ## Reference
///
/// - [Blob, Queue, and File Services (Shared Key authorization)](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key)
fn string_to_sign(ctx: &SigningRequest, account_name: &str) -> Result<String> {
    let content_md5 = HeaderName::from_static("content-md5");
    let standard_headers = [
        &header::CONTENT_ENCODING,
        &header::CONTENT_LANGUAGE,
        &header::CONTENT_LENGTH,
        &content_md5,
        &header::CONTENT_TYPE,
        &header::DATE,
        &header::IF_MODIFIED_SINCE,
        &header::IF_MATCH,
        &header::IF_NONE_MATCH,
        &header::IF_UNMODIFIED_SINCE,
        &header::RANGE,
    ];

    let mut s = String::with_capacity(256);
    s.push_str(ctx.method.as_str());
    s.push('\n');

    for name in standard_headers {
        let value = ctx.header_get_or_default(name)?;
        // Zero length is signed as an empty string since 2015-02-21.
        if !(*name == header::CONTENT_LENGTH && value == "0") {
            s.push_str(value);
        }
        s.push('\n');
    }

    s.push_str(&canonicalize_header(ctx)?);
    s.push('\n');
    s.push_str(&canonicalize_resource(ctx, account_name));

    debug!("string to sign: {}", &s);

    Ok(s)
}

/// ## Reference
///
/// - [Constructing the canonicalized headers string](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key#constructing-the-canonicalized-headers-string)
fn canonicalize_header(ctx: &SigningRequest) -> Result<String> {
    Ok(SigningRequest::header_to_string(
        ctx.header_to_vec_with_prefix("x-ms-")?,
        ":",
        "\n",
    ))
}

/// ## Reference
///
/// - [Constructing the canonicalized resource string](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key#constructing-the-canonicalized-resource-string)
fn canonicalize_resource(ctx: &SigningRequest, account_name: &str) -> String {
    if ctx.query.is_empty() {
        return format!("/{}{}", account_name, ctx.path);
    }

    let query = ctx
        .query
        .iter()
        .map(|(k, v)| (k.to_lowercase(), v.clone()))
        .collect();

    format!(
        "/{}{}\n{}",
        account_name,
        ctx.path,
        SigningRequest::query_to_percent_decoded_string(query, ":", "\n")
    )
}
