//! In-memory stand-in for the Blob service, used by unit tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use azfile_core::{HttpSend, Result};
use bytes::{Bytes, BytesMut};
use http::{header, Method, Request, Response, StatusCode};
use percent_encoding::percent_decode_str;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CreateContainer,
    GetContainer,
    PutBlob,
    PutBlock,
    PutBlockList,
    GetProperties,
    DeleteBlob,
    Unknown,
}

#[derive(Debug, Clone, Default)]
pub struct FakeBlob {
    pub data: Bytes,
    /// `x-ms-blob-*` and `x-ms-meta-*` headers sent on upload.
    pub headers: BTreeMap<String, String>,
    pub etag: String,
}

#[derive(Debug, Default)]
struct FakeContainer {
    access: Option<String>,
    blobs: BTreeMap<String, FakeBlob>,
}

#[derive(Debug, Default)]
struct State {
    containers: BTreeMap<String, FakeContainer>,
    staged: HashMap<(String, String, String), Bytes>,
    ops: Vec<Op>,
    authorization: Option<String>,
    failures: HashMap<Op, StatusCode>,
    in_flight: usize,
    max_in_flight: usize,
    etag: u64,
}

#[derive(Deserialize)]
struct BlockListBody {
    #[serde(rename = "Latest", default)]
    latest: Vec<String>,
}

/// Blob service kept in memory, reachable through [`HttpSend`].
#[derive(Debug, Clone)]
pub struct FakeBlobService {
    prefix: String,
    state: Arc<Mutex<State>>,
}

impl FakeBlobService {
    /// Serve requests sent to `endpoint`.
    pub fn new(endpoint: &str) -> Self {
        let prefix = endpoint
            .parse::<http::Uri>()
            .map(|uri| uri.path().trim_end_matches('/').to_string())
            .unwrap_or_default();
        Self {
            prefix,
            state: Arc::default(),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("fake state lock poisoned")
    }

    pub fn create_container(&self, name: &str) {
        self.state()
            .containers
            .entry(name.to_string())
            .or_default();
    }

    /// `None` if the container doesn't exist, otherwise its public access level.
    pub fn container_access(&self, name: &str) -> Option<Option<String>> {
        self.state().containers.get(name).map(|c| c.access.clone())
    }

    pub fn blob(&self, container: &str, blob: &str) -> Option<FakeBlob> {
        self.state()
            .containers
            .get(container)
            .and_then(|c| c.blobs.get(blob).cloned())
    }

    pub fn insert_blob(&self, container: &str, blob: &str, data: &'static [u8]) {
        let mut state = self.state();
        state.etag += 1;
        let etag = format!("\"0x{:X}\"", state.etag);
        state
            .containers
            .entry(container.to_string())
            .or_default()
            .blobs
            .insert(
                blob.to_string(),
                FakeBlob {
                    data: Bytes::from_static(data),
                    headers: BTreeMap::new(),
                    etag,
                },
            );
    }

    /// Operations received so far, in order.
    pub fn ops(&self) -> Vec<Op> {
        self.state().ops.clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.state().ops.iter().filter(|o| **o == op).count()
    }

    pub fn last_authorization(&self) -> Option<String> {
        self.state().authorization.clone()
    }

    /// Answer every request of kind `op` with `status`.
    pub fn fail_on(&self, op: Op, status: StatusCode) {
        self.state().failures.insert(op, status);
    }

    pub fn max_in_flight(&self) -> usize {
        self.state().max_in_flight
    }

    fn classify(method: &Method, has_blob: bool, query: &HashMap<String, String>) -> Op {
        let restype = query.get("restype").map(String::as_str);
        let comp = query.get("comp").map(String::as_str);
        match (method.as_str(), has_blob, restype, comp) {
            ("PUT", false, Some("container"), None) => Op::CreateContainer,
            ("GET", false, Some("container"), None) => Op::GetContainer,
            ("PUT", true, None, None) => Op::PutBlob,
            ("PUT", true, None, Some("block")) => Op::PutBlock,
            ("PUT", true, None, Some("blocklist")) => Op::PutBlockList,
            ("HEAD", true, None, None) => Op::GetProperties,
            ("DELETE", true, None, None) => Op::DeleteBlob,
            _ => Op::Unknown,
        }
    }
}

fn respond(status: StatusCode, code: Option<&str>) -> Response<Bytes> {
    let mut builder = Response::builder().status(status);
    if let Some(code) = code {
        builder = builder.header("x-ms-error-code", code);
    }
    builder
        .body(Bytes::from(code.unwrap_or_default().to_string()))
        .expect("response must be valid")
}

fn stored_headers(headers: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter(|(k, _)| {
            k.starts_with("x-ms-meta-")
                || (k.starts_with("x-ms-blob-") && k.as_str() != "x-ms-blob-type")
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

impl State {
    fn store(
        &mut self,
        container: &str,
        blob: &str,
        data: Bytes,
        headers: &BTreeMap<String, String>,
    ) -> Response<Bytes> {
        self.etag += 1;
        let etag = format!("\"0x{:X}\"", self.etag);
        let Some(c) = self.containers.get_mut(container) else {
            return respond(StatusCode::NOT_FOUND, Some("ContainerNotFound"));
        };
        c.blobs.insert(
            blob.to_string(),
            FakeBlob {
                data,
                headers: stored_headers(headers),
                etag: etag.clone(),
            },
        );
        Response::builder()
            .status(StatusCode::CREATED)
            .header(header::ETAG, etag)
            .body(Bytes::new())
            .expect("response must be valid")
    }

    fn handle(
        &mut self,
        op: Op,
        container: &str,
        blob: &str,
        query: &HashMap<String, String>,
        headers: &BTreeMap<String, String>,
        body: Bytes,
    ) -> Response<Bytes> {
        match op {
            Op::CreateContainer => {
                if self.containers.contains_key(container) {
                    return respond(StatusCode::CONFLICT, Some("ContainerAlreadyExists"));
                }
                self.containers.insert(
                    container.to_string(),
                    FakeContainer {
                        access: headers.get("x-ms-blob-public-access").cloned(),
                        blobs: BTreeMap::new(),
                    },
                );
                respond(StatusCode::CREATED, None)
            }
            Op::GetContainer => match self.containers.contains_key(container) {
                true => respond(StatusCode::OK, None),
                false => respond(StatusCode::NOT_FOUND, Some("ContainerNotFound")),
            },
            Op::PutBlob => self.store(container, blob, body, headers),
            Op::PutBlock => {
                if !self.containers.contains_key(container) {
                    return respond(StatusCode::NOT_FOUND, Some("ContainerNotFound"));
                }
                let id = query.get("blockid").cloned().unwrap_or_default();
                self.staged
                    .insert((container.to_string(), blob.to_string(), id), body);
                respond(StatusCode::CREATED, None)
            }
            Op::PutBlockList => {
                let list: BlockListBody =
                    match quick_xml::de::from_str(&String::from_utf8_lossy(&body)) {
                        Ok(list) => list,
                        Err(_) => return respond(StatusCode::BAD_REQUEST, Some("InvalidXmlDocument")),
                    };
                let mut data = BytesMut::new();
                for id in list.latest {
                    let key = (container.to_string(), blob.to_string(), id);
                    match self.staged.remove(&key) {
                        Some(block) => data.extend_from_slice(&block),
                        None => return respond(StatusCode::BAD_REQUEST, Some("InvalidBlockList")),
                    }
                }
                self.store(container, blob, data.freeze(), headers)
            }
            Op::GetProperties => {
                let Some(b) = self
                    .containers
                    .get(container)
                    .and_then(|c| c.blobs.get(blob))
                else {
                    return respond(StatusCode::NOT_FOUND, Some("BlobNotFound"));
                };
                let mut builder = Response::builder()
                    .status(StatusCode::OK)
                    .header(header::ETAG, &b.etag)
                    .header("x-ms-blob-type", "BlockBlob")
                    .header(header::CONTENT_LENGTH, b.data.len().to_string());
                // Content settings come back as plain headers, metadata as sent.
                for (k, v) in &b.headers {
                    let name = k.strip_prefix("x-ms-blob-").unwrap_or(k);
                    builder = builder.header(name, v);
                }
                builder.body(Bytes::new()).expect("response must be valid")
            }
            Op::DeleteBlob => {
                let removed = self
                    .containers
                    .get_mut(container)
                    .and_then(|c| c.blobs.remove(blob));
                match removed {
                    Some(_) => respond(StatusCode::ACCEPTED, None),
                    None => respond(StatusCode::NOT_FOUND, Some("BlobNotFound")),
                }
            }
            Op::Unknown => respond(StatusCode::BAD_REQUEST, Some("UnsupportedHttpVerb")),
        }
    }
}

#[async_trait]
impl HttpSend for FakeBlobService {
    async fn http_send(&self, req: Request<Bytes>) -> Result<Response<Bytes>> {
        let (parts, body) = req.into_parts();

        let path = parts.uri.path();
        let rel = path
            .strip_prefix(self.prefix.as_str())
            .unwrap_or(path)
            .trim_start_matches('/');
        let rel = percent_decode_str(rel).decode_utf8_lossy().to_string();
        let (container, blob) = match rel.split_once('/') {
            Some((c, b)) => (c.to_string(), b.to_string()),
            None => (rel, String::new()),
        };
        let query: HashMap<String, String> =
            form_urlencoded::parse(parts.uri.query().unwrap_or_default().as_bytes())
                .into_owned()
                .collect();
        let headers: BTreeMap<String, String> = parts
            .headers
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();

        let op = Self::classify(&parts.method, !blob.is_empty(), &query);
        {
            let mut state = self.state();
            state.ops.push(op);
            state.authorization = headers.get("authorization").cloned();
            if let Some(status) = state.failures.get(&op).copied() {
                return Ok(respond(status, Some("InternalError")));
            }
            if op == Op::PutBlock {
                state.in_flight += 1;
                state.max_in_flight = state.max_in_flight.max(state.in_flight);
            }
        }

        // Let other uploads make progress so concurrency is observable.
        if op == Op::PutBlock {
            tokio::task::yield_now().await;
        }

        let mut state = self.state();
        if op == Op::PutBlock {
            state.in_flight -= 1;
        }
        Ok(state.handle(op, &container, &blob, &query, &headers, body))
    }
}
