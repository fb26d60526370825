use azfile_core::{Context, OsEnv};
use azfile_http_send_reqwest::ReqwestHttpSend;

/// Context sending requests with a default reqwest client and reading the OS environment.
pub fn default_context() -> Context {
    default_context_with_client(reqwest::Client::new())
}

/// Like [`default_context`], with a caller configured client for timeouts or proxies.
pub fn default_context_with_client(client: reqwest::Client) -> Context {
    Context::new()
        .with_http_send(ReqwestHttpSend::new(client))
        .with_env(OsEnv)
}
