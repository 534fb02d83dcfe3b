//! Storage locations (S3, GCS, Azure, local filesystem)

use super::retry::RetryPolicy;
use crate::error::{Error, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore, PutPayload};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

/// A storage prefix resolved to an object store
#[derive(Debug, Clone)]
pub struct StorageLocation {
    /// The object store implementation
    store: Arc<dyn ObjectStore>,
    /// Key prefix within the bucket/container (empty for local roots)
    prefix: ObjectPath,
    /// URL scheme (s3, gs, az, file)
    scheme: String,
    /// Human-readable root for log lines (`s3://bucket` or a directory)
    base: String,
    /// Directory backing a local store, used to prune empty directories
    local_root: Option<PathBuf>,
    /// Retry policy for transient failures
    retry: RetryPolicy,
}

impl StorageLocation {
    /// Resolve a location that is only read from
    ///
    /// Supported formats:
    /// - `s3://bucket/path/` (also `s3a://`) - AWS S3 or S3-compatible
    /// - `gs://bucket/path/` - Google Cloud Storage
    /// - `az://container/path/` - Azure Blob Storage
    /// - `file:///local/path` or `/local/path` - Local filesystem (must exist)
    pub fn parse(url: &str) -> Result<Self> {
        Self::resolve(url, false)
    }

    /// Resolve a location that will be written to, creating local directories
    pub fn parse_for_write(url: &str) -> Result<Self> {
        Self::resolve(url, true)
    }

    fn resolve(url: &str, create: bool) -> Result<Self> {
        let url = url.trim();
        if url.is_empty() {
            return Err(Error::config("Storage location cannot be empty"));
        }

        if !url.contains("://") {
            return Self::parse_local(Path::new(url), create);
        }

        let parsed = Url::parse(url)?;
        match parsed.scheme() {
            "s3" | "s3a" => Self::parse_s3(&parsed),
            "gs" => Self::parse_gcs(&parsed),
            "az" => Self::parse_azure(&parsed),
            "file" => {
                let path = parsed
                    .to_file_path()
                    .map_err(|()| Error::config(format!("Invalid file URL: {url}")))?;
                Self::parse_local(&path, create)
            }
            other => Err(Error::config(format!(
                "Unsupported storage scheme '{other}' in {url}"
            ))),
        }
    }

    /// Split a cloud URL into bucket and key prefix
    fn bucket_and_prefix(url: &Url) -> Result<(String, ObjectPath)> {
        let bucket = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::config(format!("Missing bucket in {url}")))?;
        let prefix = ObjectPath::parse(url.path().trim_matches('/'))
            .map_err(|e| Error::config(format!("Invalid key prefix in {url}: {e}")))?;
        Ok((bucket.to_string(), prefix))
    }

    /// Parse S3 URL
    fn parse_s3(url: &Url) -> Result<Self> {
        let (bucket, prefix) = Self::bucket_and_prefix(url)?;

        // AWS_ENDPOINT, AWS_REGION and credentials are read by from_env()
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(&bucket)
            .build()
            .map_err(|e| Error::config(format!("Failed to create s3 client: {e}")))?;

        Ok(Self::remote(Arc::new(store), "s3", &bucket, prefix))
    }

    /// Parse GCS URL
    fn parse_gcs(url: &Url) -> Result<Self> {
        let (bucket, prefix) = Self::bucket_and_prefix(url)?;

        let store = GoogleCloudStorageBuilder::from_env()
            .with_bucket_name(&bucket)
            .build()
            .map_err(|e| Error::config(format!("Failed to create GCS client: {e}")))?;

        Ok(Self::remote(Arc::new(store), "gs", &bucket, prefix))
    }

    /// Parse Azure Blob URL
    fn parse_azure(url: &Url) -> Result<Self> {
        let (container, prefix) = Self::bucket_and_prefix(url)?;

        let store = MicrosoftAzureBuilder::from_env()
            .with_container_name(&container)
            .build()
            .map_err(|e| Error::config(format!("Failed to create Azure client: {e}")))?;

        Ok(Self::remote(Arc::new(store), "az", &container, prefix))
    }

    fn remote(store: Arc<dyn ObjectStore>, scheme: &str, bucket: &str, prefix: ObjectPath) -> Self {
        Self {
            store,
            prefix,
            scheme: scheme.to_string(),
            base: format!("{scheme}://{bucket}"),
            local_root: None,
            retry: RetryPolicy::default(),
        }
    }

    /// Parse local filesystem path
    ///
    /// A path naming a single file is rooted at its parent directory with the
    /// file name as prefix, so listing falls through to that one object.
    fn parse_local(path: &Path, create: bool) -> Result<Self> {
        if create {
            std::fs::create_dir_all(path).map_err(|e| {
                Error::config(format!("Failed to create directory {}: {e}", path.display()))
            })?;
        }

        let (root, prefix) = if path.is_file() {
            let parent = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            (parent.to_path_buf(), ObjectPath::from(name))
        } else if path.is_dir() {
            (path.to_path_buf(), ObjectPath::default())
        } else {
            return Err(Error::config(format!(
                "Local path does not exist: {}",
                path.display()
            )));
        };

        let root = root
            .canonicalize()
            .map_err(|e| Error::config(format!("Failed to resolve {}: {e}", root.display())))?;
        let store = LocalFileSystem::new_with_prefix(&root)
            .map_err(|e| Error::config(format!("Failed to create local store: {e}")))?;

        Ok(Self {
            store: Arc::new(store),
            prefix,
            scheme: "file".to_string(),
            base: root.display().to_string(),
            local_root: Some(root),
            retry: RetryPolicy::default(),
        })
    }

    /// Set the retry policy for storage calls
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check if this is a cloud destination (not local)
    pub fn is_cloud(&self) -> bool {
        self.scheme != "file"
    }

    /// Get the scheme (s3, gs, az, file)
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Key prefix of this location within its store
    pub fn prefix(&self) -> &ObjectPath {
        &self.prefix
    }

    /// Resolve a `/`-separated path relative to this location
    pub fn path(&self, relative: &str) -> ObjectPath {
        let relative = relative.trim_matches('/');
        let full = match (self.prefix.as_ref(), relative) {
            ("", rel) => rel.to_string(),
            (prefix, "") => prefix.to_string(),
            (prefix, rel) => format!("{prefix}/{rel}"),
        };
        ObjectPath::parse(&full).unwrap_or_else(|_| ObjectPath::from(full.as_str()))
    }

    /// Path of `path` relative to this location, if it lies beneath it
    pub fn relative<'a>(&self, path: &'a ObjectPath) -> Option<&'a str> {
        let prefix = self.prefix.as_ref();
        if prefix.is_empty() {
            return Some(path.as_ref());
        }
        path.as_ref()
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
    }

    /// Full display form of a path for logs and lineage
    pub fn display(&self, path: &ObjectPath) -> String {
        format!("{}/{path}", self.base)
    }

    /// Display form of the location itself
    pub fn url(&self) -> String {
        if self.prefix.as_ref().is_empty() {
            self.base.clone()
        } else {
            format!("{}/{}", self.base, self.prefix)
        }
    }

    /// List files under a relative directory, sorted by path
    ///
    /// With `recurse` every nested object is returned, otherwise only direct children.
    pub async fn list(&self, relative: &str, recurse: bool) -> Result<Vec<ObjectMeta>> {
        let dir = self.path(relative);
        let dir = (!dir.as_ref().is_empty()).then_some(dir);

        let mut objects: Vec<ObjectMeta> = if recurse {
            self.store.list(dir.as_ref()).try_collect().await?
        } else {
            self.store.list_with_delimiter(dir.as_ref()).await?.objects
        };

        objects.sort_by(|a, b| a.location.cmp(&b.location));
        Ok(objects)
    }

    /// Metadata for a single object, `None` when it does not exist
    pub async fn head(&self, path: &ObjectPath) -> Result<Option<ObjectMeta>> {
        match self.store.head(path).await {
            Ok(meta) => Ok(Some(meta)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Read a whole object into memory
    pub async fn get(&self, path: &ObjectPath) -> Result<Bytes> {
        let display = self.display(path);
        let shown = display.as_str();
        self.retry
            .run(&format!("read {shown}"), || async move {
                let result = self
                    .store
                    .get(path)
                    .await
                    .map_err(|e| classify(shown, e, false))?;
                result.bytes().await.map_err(|e| classify(shown, e, false))
            })
            .await
    }

    /// Write bytes to a path, replacing any existing object
    pub async fn put(&self, path: &ObjectPath, data: Bytes) -> Result<()> {
        let display = self.display(path);
        let shown = display.as_str();
        self.retry
            .run(&format!("write {shown}"), || {
                let payload = PutPayload::from(data.clone());
                async move {
                    self.store
                        .put(path, payload)
                        .await
                        .map(|_| ())
                        .map_err(|e| classify(shown, e, true))
                }
            })
            .await
    }

    /// Move an object, used to promote staged files
    pub async fn rename(&self, from: &ObjectPath, to: &ObjectPath) -> Result<()> {
        let display = self.display(to);
        let shown = display.as_str();
        self.retry
            .run(&format!("promote {shown}"), || async move {
                self.store
                    .rename(from, to)
                    .await
                    .map_err(|e| classify(shown, e, true))
            })
            .await
    }

    /// Delete a single object, ignoring objects that are already gone
    pub async fn delete(&self, path: &ObjectPath) -> Result<()> {
        match self.store.delete(path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(classify(&self.display(path), e, true)),
        }
    }

    /// Delete everything under a relative directory, returning the number of objects removed
    pub async fn delete_prefix(&self, relative: &str) -> Result<usize> {
        let objects = self.list(relative, true).await?;
        for meta in &objects {
            self.delete(&meta.location).await?;
        }

        // Local stores leave empty directories behind
        if let Some(root) = &self.local_root {
            let dir = root.join(self.path(relative).as_ref());
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(objects.len())
    }
}

/// Whether a relative path lies in a hidden file or directory
///
/// Any segment starting with `_` or `.` hides the path, which covers
/// `_SUCCESS`, `_temporary/` and checksum files such as `.part.crc`.
pub fn is_hidden(relative: &str) -> bool {
    relative
        .split('/')
        .any(|segment| segment.starts_with('_') || segment.starts_with('.'))
}

/// Wrap store errors with the path they concern, keeping permanent ones as-is
fn classify(path: &str, err: object_store::Error, writing: bool) -> Error {
    let wrapped = Error::ObjectStore(err);
    if !wrapped.is_retryable() {
        return wrapped;
    }
    if writing {
        Error::write(path, wrapped.to_string())
    } else {
        Error::read(path, wrapped.to_string())
    }
}
