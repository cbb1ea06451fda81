//! Local filesystem backend implementation
//!
//! Reads inputs from local files and stores uploads as files under
//! `<root>/<container>/<key>`, using Tokio's async I/O.

use super::error::{BackendError, BackendResult};
use super::location::Location;
use super::types::{ObjectRef, ObjectTarget, ReadStream, UploadBody};
use super::ObjectStore;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Chunk size for streamed reads
const CHUNK_SIZE: usize = 64 * 1024;

/// Local filesystem backend
///
/// # Example
///
/// ```no_run
/// use switchyard::backend::{LocalBackend, ObjectStore, ObjectTarget};
/// use bytes::Bytes;
/// use futures::stream;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let backend = LocalBackend::with_root("/var/lib/switchyard");
///     let body = Box::pin(stream::iter(vec![Bytes::from_static(b"[]")]));
///     let object = backend.upload(&ObjectTarget::new("results", "run-1.json"), body).await?;
///     println!("stored at {}", object);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct LocalBackend {
    /// Base directory for uploads (relative paths resolve against the cwd when unset)
    root: Option<PathBuf>,
}

impl LocalBackend {
    /// Create a new local backend with no root constraint
    pub fn new() -> Self {
        Self { root: None }
    }

    /// Create a new local backend whose uploads land under `root`
    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn container_dir(&self, container: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(container),
            None => PathBuf::from(container),
        }
    }

    /// Final path of `target`, confined to the container directory
    fn object_path(&self, target: &ObjectTarget) -> BackendResult<PathBuf> {
        ensure_relative(&target.container, "container")?;
        ensure_relative(&target.key, "key")?;
        Ok(self.container_dir(&target.container).join(&target.key))
    }

    async fn open_file(&self, path: &Path) -> BackendResult<fs::File> {
        fs::File::open(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BackendError::NotFound {
                    location: path.display().to_string(),
                    backend: "local".to_string(),
                }
            } else {
                BackendError::from(e)
            }
        })
    }
}

#[async_trait]
impl ObjectStore for LocalBackend {
    async fn read(&self, location: &Location) -> BackendResult<ReadStream> {
        let path = match location {
            Location::File(path) => path,
            other => {
                return Err(BackendError::Unsupported {
                    backend: "local".to_string(),
                    operation: format!("read {}", other.scheme()),
                })
            }
        };

        let file = self.open_file(path).await?;

        let stream = stream::unfold(
            (file, vec![0u8; CHUNK_SIZE]),
            |(mut file, mut buffer)| async move {
                match file.read(&mut buffer).await {
                    Ok(0) => None, // EOF
                    Ok(n) => {
                        let data = Bytes::copy_from_slice(&buffer[..n]);
                        Some((Ok(data), (file, buffer)))
                    }
                    Err(e) => Some((Err(e), (file, buffer))),
                }
            },
        );

        Ok(Box::pin(stream))
    }

    async fn upload(&self, target: &ObjectTarget, mut body: UploadBody) -> BackendResult<ObjectRef> {
        let final_path = self.object_path(target)?;
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // The object only appears under its final name once fully written
        let mut partial_path = final_path.clone().into_os_string();
        partial_path.push(".partial");
        let partial_path = PathBuf::from(partial_path);
        let mut file = fs::File::create(&partial_path).await?;
        while let Some(chunk) = body.next().await {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&partial_path, &final_path).await?;

        Ok(self.object_ref(target))
    }

    fn object_ref(&self, target: &ObjectTarget) -> ObjectRef {
        ObjectRef::new(
            "file",
            self.container_dir(&target.container).display().to_string(),
            target.key.clone(),
        )
    }

    fn check_target(&self, target: &ObjectTarget) -> BackendResult<()> {
        self.object_path(target).map(|_| ())
    }

    fn backend_name(&self) -> &str {
        "local"
    }
}

/// Only plain path segments may come from a request; anything else could
/// resolve outside the root
fn ensure_relative(part: &str, what: &str) -> BackendResult<()> {
    let path = Path::new(part);
    let plain = path.components().next().is_some()
        && path.components().all(|c| matches!(c, Component::Normal(_)));
    if plain {
        Ok(())
    } else {
        Err(BackendError::InvalidLocation {
            location: part.to_string(),
            reason: format!("{} must be a relative path without '..' segments", what),
        })
    }
}
