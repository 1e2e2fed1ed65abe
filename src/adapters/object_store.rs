//! Snapshot upload targets.

use crate::domain::error::EtlError;
use crate::ports::http_port::{HttpPort, HttpRequest};
use crate::ports::object_store_port::ObjectStorePort;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Copies files under a local root, mirroring the remote key as a path.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ObjectStorePort for FsObjectStore {
    fn upload(&self, local_file: &Path, remote_key: &str) -> Result<(), EtlError> {
        let target = self.root.join(remote_key.trim_start_matches('/'));
        let copy = || -> std::io::Result<u64> {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(local_file, &target)
        };
        let bytes = copy().map_err(|e| EtlError::Upload {
            key: remote_key.to_string(),
            reason: e.to_string(),
        })?;
        info!(key = remote_key, bytes, target = %target.display(), "snapshot stored");
        Ok(())
    }
}

/// PUTs the file body to `{endpoint}/{bucket}/{key}`.
pub struct HttpObjectStore {
    http: Arc<dyn HttpPort>,
    endpoint: String,
    bucket: String,
    token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(http: Arc<dyn HttpPort>, endpoint: &str, bucket: &str, token: Option<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.trim_matches('/').to_string(),
            token,
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key.trim_start_matches('/'))
    }
}

impl ObjectStorePort for HttpObjectStore {
    fn upload(&self, local_file: &Path, remote_key: &str) -> Result<(), EtlError> {
        let upload_err = |reason: String| EtlError::Upload {
            key: remote_key.to_string(),
            reason,
        };
        let body = fs::read(local_file).map_err(|e| upload_err(e.to_string()))?;
        let bytes = body.len();
        let mut request = HttpRequest::put(self.object_url(remote_key), body)
            .header("Content-Type", "application/octet-stream");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        let resp = self.http.send(&request).map_err(|e| upload_err(e.to_string()))?;
        if !resp.is_success() {
            return Err(upload_err(format!("HTTP {}", resp.status)));
        }
        info!(key = remote_key, bytes, bucket = %self.bucket, "snapshot uploaded");
        Ok(())
    }
}
