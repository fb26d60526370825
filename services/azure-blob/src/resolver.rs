use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::Arc;

use azfile_core::{Error, ErrorKind, FileInfo, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use http::request::Parts;

use crate::ContentSettings;

type ResolveFn<T> = dyn Fn(&Parts, &FileInfo) -> BoxFuture<'static, Result<T>> + Send + Sync;

/// A value that is either fixed at construction or computed per upload.
///
/// Dynamic values see the request the file arrived with and the file's
/// descriptive fields.
///
/// ```
/// use azfile_azure_blob::ValueSource;
///
/// let fixed: ValueSource<String> = "avatars".into();
/// let per_user = ValueSource::from_fn(|req, _file| {
///     let user = req
///         .headers
///         .get("x-user-id")
///         .and_then(|v| v.to_str().ok())
///         .unwrap_or("anonymous")
///         .to_string();
///     async move { Ok(format!("user-{user}")) }
/// });
/// # let _ = (fixed, per_user);
/// ```
pub enum ValueSource<T> {
    /// The same value for every upload.
    Static(T),
    /// A resolver invoked for every upload.
    Dynamic(Arc<ResolveFn<T>>),
}

impl<T> ValueSource<T> {
    /// Build a dynamic source from an async function.
    ///
    /// The returned future must own everything it needs: copy values out of
    /// the request or the file before the `async` block.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(&Parts, &FileInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        ValueSource::Dynamic(Arc::new(move |req, file| f(req, file).boxed()))
    }
}

impl<T: Clone + Send + 'static> ValueSource<T> {
    /// Resolve the value for one upload.
    ///
    /// Failures of a dynamic resolver are reported as [`ErrorKind::ResolveFailed`].
    pub async fn resolve(&self, what: &str, req: &Parts, file: &FileInfo) -> Result<T> {
        match self {
            ValueSource::Static(v) => Ok(v.clone()),
            ValueSource::Dynamic(f) => f(req, file).await.map_err(|err| {
                if err.kind() == ErrorKind::ResolveFailed {
                    err
                } else {
                    Error::resolve_failed(format!("failed to resolve {what}: {err}"))
                        .with_source(err)
                }
            }),
        }
    }
}

impl<T> Clone for ValueSource<T>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        match self {
            ValueSource::Static(v) => ValueSource::Static(v.clone()),
            ValueSource::Dynamic(f) => ValueSource::Dynamic(f.clone()),
        }
    }
}

impl<T: Debug> Debug for ValueSource<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::Static(v) => f.debug_tuple("Static").field(v).finish(),
            ValueSource::Dynamic(_) => f.write_str("Dynamic"),
        }
    }
}

impl From<&str> for ValueSource<String> {
    fn from(v: &str) -> Self {
        ValueSource::Static(v.to_string())
    }
}

impl From<String> for ValueSource<String> {
    fn from(v: String) -> Self {
        ValueSource::Static(v)
    }
}

impl From<BTreeMap<String, String>> for ValueSource<BTreeMap<String, String>> {
    fn from(v: BTreeMap<String, String>) -> Self {
        ValueSource::Static(v)
    }
}

impl From<ContentSettings> for ValueSource<ContentSettings> {
    fn from(v: ContentSettings) -> Self {
        ValueSource::Static(v)
    }
}

/// Blob name used when none is configured: `<unix millis>-<uuid v4><extension>`.
pub fn default_blob_name(file: &FileInfo) -> String {
    format!(
        "{}-{}{}",
        azfile_core::time::now().timestamp_millis(),
        uuid::Uuid::new_v4(),
        file.extension()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parts() -> Parts {
        http::Request::post("/upload")
            .header("x-tenant", "acme")
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    fn file(name: &str) -> FileInfo {
        FileInfo {
            field_name: "doc".to_string(),
            original_name: name.to_string(),
            mime_type: "text/plain".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_static_value() {
        let source: ValueSource<String> = "photos".into();
        let v = source
            .resolve("container name", &parts(), &file("a.txt"))
            .await
            .unwrap();
        assert_eq!(v, "photos");
    }

    #[tokio::test]
    async fn test_dynamic_value_sees_request_and_file() {
        let source = ValueSource::from_fn(|req, file| {
            let tenant = req.headers["x-tenant"].to_str().unwrap_or_default().to_string();
            let name = file.original_name.clone();
            async move { Ok(format!("{tenant}/{name}")) }
        });

        let v = source
            .resolve("blob name", &parts(), &file("report.pdf"))
            .await
            .unwrap();
        assert_eq!(v, "acme/report.pdf");
    }

    #[tokio::test]
    async fn test_dynamic_failure_is_resolve_failed() {
        let source: ValueSource<String> =
            ValueSource::from_fn(|_, _| async { Err(Error::unexpected("lookup failed")) });

        let err = source
            .resolve("container name", &parts(), &file("a.txt"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResolveFailed);
        assert_eq!(
            err.to_string(),
            "failed to resolve container name: lookup failed"
        );
    }

    #[test]
    fn test_default_blob_name() {
        let name = default_blob_name(&file("photo.final.png"));
        let (millis, rest) = name.split_once('-').unwrap();

        assert!(millis.parse::<i64>().unwrap() > 0);
        assert!(rest.ends_with(".png"));
        assert!(uuid::Uuid::parse_str(rest.trim_end_matches(".png")).is_ok());

        let bare = default_blob_name(&file("Makefile"));
        let (_, rest) = bare.split_once('-').unwrap();
        assert!(uuid::Uuid::parse_str(rest).is_ok());
    }

    #[test]
    fn test_default_blob_names_are_unique() {
        let info = file("a.txt");
        assert_ne!(default_blob_name(&info), default_blob_name(&info));
    }
}
