use azfile_core::hash;
use azfile_core::time::{self, DateTime};
use azfile_core::Result;

/// Service SAS version. The string to sign below is the one defined for it.
const BLOB_SAS_VERSION: &str = "2018-11-09";
/// Signed resource: a single blob.
const BLOB_SAS_RESOURCE: &str = "b";
/// Read only.
const BLOB_SAS_PERMISSIONS: &str = "r";

/// Service SAS granting read access to one blob.
///
/// - [Create a service SAS](https://learn.microsoft.com/en-us/rest/api/storageservices/create-service-sas)
pub struct BlobSharedAccessSignature {
    account: String,
    key: String,
    container: String,
    blob: String,
    expiry: DateTime,
    start: Option<DateTime>,
    protocol: Option<String>,
}

impl BlobSharedAccessSignature {
    /// Create a read-only SAS for `container/blob` that expires at `expiry`.
    pub fn new(account: &str, key: &str, container: &str, blob: &str, expiry: DateTime) -> Self {
        Self {
            account: account.to_string(),
            key: key.to_string(),
            container: container.to_string(),
            blob: blob.to_string(),
            expiry,
            start: None,
            protocol: None,
        }
    }

    /// Make the SAS valid from `start` only.
    #[cfg(test)]
    pub(crate) fn with_start(mut self, start: DateTime) -> Self {
        self.start = Some(start);
        self
    }

    /// Restrict the SAS to a protocol, `https` or `https,http`.
    pub fn with_protocol(mut self, protocol: &str) -> Self {
        self.protocol = Some(protocol.to_string());
        self
    }

    // Azure documentation: https://learn.microsoft.com/en-us/rest/api/storageservices/create-service-sas#version-2018-11-09-and-later
    fn signature(&self) -> Result<String> {
        let string_to_sign = [
            BLOB_SAS_PERMISSIONS.to_string(),
            self.start.map(time::format_rfc3339).unwrap_or_default(),
            time::format_rfc3339(self.expiry),
            format!("/blob/{}/{}/{}", self.account, self.container, self.blob),
            // signed identifier, ip
            String::new(),
            String::new(),
            self.protocol.clone().unwrap_or_default(),
            BLOB_SAS_VERSION.to_string(),
            BLOB_SAS_RESOURCE.to_string(),
            // snapshot time, rscc, rscd, rsce, rscl, rsct
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
            String::new(),
        ]
        .join("\n");

        let decode_content = hash::base64_decode(&self.key)?;

        Ok(hash::base64_hmac_sha256(
            &decode_content,
            string_to_sign.as_bytes(),
        ))
    }

    /// Query pairs of the SAS, values already url encoded.
    pub fn token(&self) -> Result<Vec<(String, String)>> {
        let mut elements: Vec<(String, String)> = vec![
            ("sv".to_string(), BLOB_SAS_VERSION.to_string()),
            ("sr".to_string(), BLOB_SAS_RESOURCE.to_string()),
            ("sp".to_string(), BLOB_SAS_PERMISSIONS.to_string()),
        ];

        if let Some(start) = self.start {
            elements.push(("st".to_string(), urlencoded(time::format_rfc3339(start))));
        }
        elements.push((
            "se".to_string(),
            urlencoded(time::format_rfc3339(self.expiry)),
        ));
        if let Some(protocol) = &self.protocol {
            elements.push(("spr".to_string(), urlencoded(protocol.clone())));
        }

        elements.push(("sig".to_string(), urlencoded(self.signature()?)));

        Ok(elements)
    }

    /// The SAS as a query string without the leading `?`.
    pub fn query(&self) -> Result<String> {
        Ok(self
            .token()?
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&"))
    }
}

fn urlencoded(s: String) -> String {
    form_urlencoded::byte_serialize(s.as_bytes()).collect()
}
