//! Remote storage backends for uploading run artifacts.
//!
//! Uploads are best effort: `upload_file` reports success as a bool and
//! logs the cause of a failure instead of returning it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::{Method, StatusCode, Url};
use thiserror::Error;

use crate::config::StorageSettings;
use crate::models::StorageBackend;

/// Errors from storage setup and individual transfers.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid storage configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {url} returned {status}")]
    Status {
        method: String,
        url: String,
        status: StatusCode,
    },
}

/// A place run artifacts can be uploaded to.
pub trait RemoteStorage: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    fn backend(&self) -> StorageBackend;

    /// Upload one file to a `/`-separated remote path. Never fails loudly.
    fn upload_file(&self, local_path: &Path, remote_path: &str) -> bool;

    /// Check that the backend is reachable with the configured credentials.
    fn test_connection(&self) -> bool;
}

/// Build the configured storage backend.
pub fn create_storage(settings: &StorageSettings) -> Result<Box<dyn RemoteStorage>, StorageError> {
    match settings.backend {
        StorageBackend::Local => Ok(Box::new(LocalStorage::new(&settings.local_root))),
        StorageBackend::WebDav => Ok(Box::new(WebDavStorage::new(
            &settings.webdav_url,
            &settings.webdav_username,
            &settings.webdav_password,
        )?)),
    }
}

/// Copies files under a local root directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn copy(&self, local_path: &Path, remote_path: &str) -> Result<PathBuf, StorageError> {
        let target = remote_path
            .split('/')
            .filter(|s| !s.is_empty() && *s != "..")
            .fold(self.root.clone(), |acc, seg| acc.join(seg));

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| StorageError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::copy(local_path, &target).map_err(|source| StorageError::Io {
            path: local_path.to_path_buf(),
            source,
        })?;
        Ok(target)
    }
}

impl RemoteStorage for LocalStorage {
    fn name(&self) -> &str {
        "local"
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::Local
    }

    fn upload_file(&self, local_path: &Path, remote_path: &str) -> bool {
        match self.copy(local_path, remote_path) {
            Ok(target) => {
                tracing::debug!("Copied {} to {}", local_path.display(), target.display());
                true
            }
            Err(e) => {
                tracing::warn!("Local upload of {} failed: {}", local_path.display(), e);
                false
            }
        }
    }

    fn test_connection(&self) -> bool {
        fs::create_dir_all(&self.root).is_ok()
    }
}

/// Uploads over WebDAV with basic auth.
pub struct WebDavStorage {
    client: Client,
    base_url: Url,
    username: String,
    password: String,
}

impl WebDavStorage {
    pub fn new(base_url: &str, username: &str, password: &str) -> Result<Self, StorageError> {
        if base_url.trim().is_empty() {
            return Err(StorageError::InvalidConfig(
                "webdav_url is not set".to_string(),
            ));
        }
        let base_url = Url::parse(base_url.trim())
            .map_err(|e| StorageError::InvalidConfig(format!("webdav_url: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(StorageError::InvalidConfig(format!(
                "webdav_url cannot hold paths: {}",
                base_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .connect_timeout(Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            base_url,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// URL of a remote path under the base URL, percent-encoded per segment.
    fn url_for(&self, remote_path: &str) -> Url {
        url_for(&self.base_url, remote_path)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::blocking::RequestBuilder {
        let password = (!self.password.is_empty()).then_some(self.password.as_str());
        self.client
            .request(method, url)
            .basic_auth(&self.username, password)
    }

    /// Create every collection along the remote directory path.
    fn ensure_collections(&self, remote_dir: &str) -> Result<(), StorageError> {
        let mkcol = Method::from_bytes(b"MKCOL")
            .map_err(|e| StorageError::InvalidConfig(e.to_string()))?;

        let mut path = String::new();
        for segment in remote_dir.split('/').filter(|s| !s.is_empty()) {
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(segment);

            let mut url = self.url_for(&path);
            // Collections are addressed with a trailing slash
            if let Ok(mut segments) = url.path_segments_mut() {
                segments.push("");
            }
            let status = self.request(mkcol.clone(), url.clone()).send()?.status();
            // 405 means the collection already exists
            if !(status.is_success() || status == StatusCode::METHOD_NOT_ALLOWED) {
                return Err(StorageError::Status {
                    method: "MKCOL".to_string(),
                    url: url.to_string(),
                    status,
                });
            }
        }
        Ok(())
    }

    fn put(&self, local_path: &Path, remote_path: &str) -> Result<(), StorageError> {
        if let Some((dir, _)) = remote_path.rsplit_once('/') {
            self.ensure_collections(dir)?;
        }

        let file = fs::File::open(local_path).map_err(|source| StorageError::Io {
            path: local_path.to_path_buf(),
            source,
        })?;
        let url = self.url_for(remote_path);
        let status = self.request(Method::PUT, url.clone()).body(file).send()?.status();
        if !status.is_success() {
            return Err(StorageError::Status {
                method: "PUT".to_string(),
                url: url.to_string(),
                status,
            });
        }
        Ok(())
    }
}

impl RemoteStorage for WebDavStorage {
    fn name(&self) -> &str {
        "webdav"
    }

    fn backend(&self) -> StorageBackend {
        StorageBackend::WebDav
    }

    fn upload_file(&self, local_path: &Path, remote_path: &str) -> bool {
        match self.put(local_path, remote_path) {
            Ok(()) => {
                tracing::debug!("Uploaded {} to {}", local_path.display(), remote_path);
                true
            }
            Err(e) => {
                tracing::warn!("WebDAV upload of {} failed: {}", local_path.display(), e);
                false
            }
        }
    }

    fn test_connection(&self) -> bool {
        let Ok(propfind) = Method::from_bytes(b"PROPFIND") else {
            return false;
        };
        match self
            .request(propfind, self.base_url.clone())
            .header("Depth", "0")
            .send()
        {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::warn!("WebDAV connection test returned {}", resp.status());
                false
            }
            Err(e) => {
                tracing::warn!("WebDAV connection test failed: {}", e);
                false
            }
        }
    }
}

fn url_for(base: &Url, remote_path: &str) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments
            .pop_if_empty()
            .extend(remote_path.split('/').filter(|s| !s.is_empty()));
    }
    url
}
