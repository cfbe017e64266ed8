//! Transports
//!
//! Byte retrieval for resources. Fetches are asynchronous; a transport
//! may also offer a synchronous path, which lazy mode uses to complete
//! loads on the caller's stack.

use smol::future::BoxedLocal;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::error::TransportError;
use crate::path;

/// One file to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Manifest path, without the leading slash.
    pub path: String,
    /// Full URL including domain, base path and build id.
    pub url: String,
}

impl FetchRequest {
    pub fn new(path: &str, url: String) -> Self {
        Self {
            path: path.trim_start_matches('/').to_string(),
            url,
        }
    }
}

/// Fetches file content
pub trait Transport: 'static {
    /// Fetch asynchronously.
    fn fetch(&self, request: &FetchRequest) -> BoxedLocal<Result<String, TransportError>>;

    /// Fetch on the caller's stack, if this transport can.
    fn fetch_now(&self, _request: &FetchRequest) -> Option<Result<String, TransportError>> {
        None
    }
}

impl<T: Transport + ?Sized> Transport for Rc<T> {
    fn fetch(&self, request: &FetchRequest) -> BoxedLocal<Result<String, TransportError>> {
        (**self).fetch(request)
    }

    fn fetch_now(&self, request: &FetchRequest) -> Option<Result<String, TransportError>> {
        (**self).fetch_now(request)
    }
}

/// Reads files below a local build directory
#[derive(Debug, Clone)]
pub struct FsTransport {
    root: PathBuf,
}

impl FsTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file(&self, request: &FetchRequest) -> PathBuf {
        self.root.join(&request.path)
    }
}

fn io_error(file: &Path, err: std::io::Error) -> TransportError {
    if err.kind() == std::io::ErrorKind::NotFound {
        TransportError::NotFound(file.display().to_string())
    } else {
        TransportError::Io {
            path: file.display().to_string(),
            message: err.to_string(),
        }
    }
}

impl Transport for FsTransport {
    fn fetch(&self, request: &FetchRequest) -> BoxedLocal<Result<String, TransportError>> {
        let file = self.file(request);
        Box::pin(async move {
            smol::fs::read_to_string(&file)
                .await
                .map_err(|err| io_error(&file, err))
        })
    }

    fn fetch_now(&self, request: &FetchRequest) -> Option<Result<String, TransportError>> {
        let file = self.file(request);
        Some(std::fs::read_to_string(&file).map_err(|err| io_error(&file, err)))
    }
}

/// In-memory files with fetch accounting
#[derive(Debug, Default)]
pub struct MemoryTransport {
    files: RefCell<HashMap<String, String>>,
    fetches: RefCell<HashMap<String, usize>>,
    synchronous: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also answer through the synchronous path.
    pub fn synchronous(mut self) -> Self {
        self.synchronous = true;
        self
    }

    pub fn with_file(self, file: &str, content: &str) -> Self {
        self.insert(file, content);
        self
    }

    pub fn insert(&self, file: &str, content: &str) {
        self.files
            .borrow_mut()
            .insert(path::canonical(file), content.to_string());
    }

    /// How many times `file` was fetched.
    pub fn fetch_count(&self, file: &str) -> usize {
        self.fetches
            .borrow()
            .get(&path::canonical(file))
            .copied()
            .unwrap_or(0)
    }

    /// Fetches across all files.
    pub fn total_fetches(&self) -> usize {
        self.fetches.borrow().values().sum()
    }

    fn take(&self, request: &FetchRequest) -> Result<String, TransportError> {
        let key = path::canonical(&request.path);
        *self.fetches.borrow_mut().entry(key.clone()).or_insert(0) += 1;

        self.files
            .borrow()
            .get(&key)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(request.path.clone()))
    }
}

impl Transport for MemoryTransport {
    fn fetch(&self, request: &FetchRequest) -> BoxedLocal<Result<String, TransportError>> {
        let result = self.take(request);
        Box::pin(async move {
            smol::future::yield_now().await;
            result
        })
    }

    fn fetch_now(&self, request: &FetchRequest) -> Option<Result<String, TransportError>> {
        self.synchronous.then(|| self.take(request))
    }
}

/// HTTP transport on a blocking `reqwest` client, off the loader thread
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent("fOS-Elem/0.1")
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;

        Ok(Self { client })
    }
}

#[cfg(feature = "http")]
impl Transport for HttpTransport {
    fn fetch(&self, request: &FetchRequest) -> BoxedLocal<Result<String, TransportError>> {
        let client = self.client.clone();
        let url = request.url.clone();

        tracing::info!("HTTP GET {}", url);

        Box::pin(smol::unblock(move || {
            let response = client
                .get(&url)
                .send()
                .map_err(|err| TransportError::Network(err.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(TransportError::Http {
                    status: status.as_u16(),
                });
            }

            response
                .text()
                .map_err(|err| TransportError::Network(err.to_string()))
        }))
    }
}
