//! In-memory object store
//!
//! Holds objects in a shared map so pipelines can be exercised without a
//! filesystem or network. Failure and latency can be injected for tests.

use super::error::{BackendError, BackendResult};
use super::location::Location;
use super::types::{ObjectRef, ObjectTarget, ReadStream, UploadBody};
use super::ObjectStore;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{stream, StreamExt};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, RwLock};
use std::time::Duration;

const DEFAULT_READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    /// Emit an I/O error after `data` instead of ending cleanly
    fail_after_data: bool,
}

#[derive(Debug, Default)]
struct Behaviour {
    fail_uploads: Option<String>,
    reject_uploads: Option<String>,
    upload_delay: Option<Duration>,
}

/// In-memory object store
///
/// # Example
///
/// ```rust
/// use switchyard::backend::MemoryBackend;
///
/// let store = MemoryBackend::new();
/// store.insert("inputs", "batch.json", br#"[{"id": 1}]"#.to_vec());
/// assert!(store.get("inputs", "batch.json").is_some());
/// ```
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    objects: Arc<RwLock<HashMap<(String, String), StoredObject>>>,
    behaviour: Arc<RwLock<Behaviour>>,
    read_chunk: usize,
}

impl MemoryBackend {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            behaviour: Arc::new(RwLock::new(Behaviour::default())),
            read_chunk: DEFAULT_READ_CHUNK,
        }
    }

    /// Builder pattern: split reads into chunks of `size` bytes
    pub fn with_read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk = size.max(1);
        self
    }

    /// Store an object
    pub fn insert(&self, container: &str, key: &str, data: impl Into<Bytes>) {
        self.put(container, key, data.into(), false);
    }

    /// Store an object whose reads fail with an I/O error after its data
    pub fn insert_with_read_error(&self, container: &str, key: &str, data: impl Into<Bytes>) {
        self.put(container, key, data.into(), true);
    }

    fn put(&self, container: &str, key: &str, data: Bytes, fail_after_data: bool) {
        let object = StoredObject {
            data,
            content_type: super::types::DEFAULT_CONTENT_TYPE.to_string(),
            fail_after_data,
        };
        if let Ok(mut objects) = self.objects.write() {
            objects.insert((container.to_string(), key.to_string()), object);
        }
    }

    /// Fetch an object's bytes
    pub fn get(&self, container: &str, key: &str) -> Option<Bytes> {
        self.objects
            .read()
            .ok()?
            .get(&(container.to_string(), key.to_string()))
            .map(|o| o.data.clone())
    }

    /// Content type recorded for an object
    pub fn content_type(&self, container: &str, key: &str) -> Option<String> {
        self.objects
            .read()
            .ok()?
            .get(&(container.to_string(), key.to_string()))
            .map(|o| o.content_type.clone())
    }

    /// Keys stored in a container, sorted
    pub fn keys(&self, container: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .map(|objects| {
                objects
                    .keys()
                    .filter(|(c, _)| c == container)
                    .map(|(_, k)| k.clone())
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Make every subsequent upload fail with `message`
    pub fn fail_uploads(&self, message: impl Into<String>) {
        if let Ok(mut behaviour) = self.behaviour.write() {
            behaviour.fail_uploads = Some(message.into());
        }
    }

    /// Make every subsequent upload fail with `message` before reading its body
    pub fn reject_uploads(&self, message: impl Into<String>) {
        if let Ok(mut behaviour) = self.behaviour.write() {
            behaviour.reject_uploads = Some(message.into());
        }
    }

    /// Delay the acknowledgement of every subsequent upload
    pub fn delay_uploads(&self, delay: Duration) {
        if let Ok(mut behaviour) = self.behaviour.write() {
            behaviour.upload_delay = Some(delay);
        }
    }

    fn behaviour(&self) -> (Option<String>, Option<Duration>) {
        self.behaviour
            .read()
            .map(|b| (b.fail_uploads.clone(), b.upload_delay))
            .unwrap_or((None, None))
    }

    fn rejection(&self) -> Option<String> {
        self.behaviour.read().ok()?.reject_uploads.clone()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryBackend {
    async fn read(&self, location: &Location) -> BackendResult<ReadStream> {
        let (container, key) = match location {
            Location::Memory { container, key } => (container, key),
            other => {
                return Err(BackendError::Unsupported {
                    backend: "memory".to_string(),
                    operation: format!("read {}", other.scheme()),
                })
            }
        };

        let object = self
            .objects
            .read()
            .map_err(|_| BackendError::Other {
                backend: "memory".to_string(),
                message: "object map lock poisoned".to_string(),
            })?
            .get(&(container.clone(), key.clone()))
            .cloned()
            .ok_or_else(|| BackendError::NotFound {
                location: location.to_string(),
                backend: "memory".to_string(),
            })?;

        let mut chunks: Vec<io::Result<Bytes>> = object
            .data
            .chunks(self.read_chunk)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        if object.fail_after_data {
            chunks.push(Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection reset while reading object",
            )));
        }

        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn upload(&self, target: &ObjectTarget, mut body: UploadBody) -> BackendResult<ObjectRef> {
        if let Some(message) = self.rejection() {
            // Take a little of the body first, then drop the rest
            let _ = body.next().await;
            return Err(BackendError::UploadFailed {
                backend: "memory".to_string(),
                message,
            });
        }

        let mut data = BytesMut::new();
        while let Some(chunk) = body.next().await {
            data.extend_from_slice(&chunk);
        }

        let (failure, delay) = self.behaviour();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = failure {
            return Err(BackendError::UploadFailed {
                backend: "memory".to_string(),
                message,
            });
        }

        let object = StoredObject {
            data: data.freeze(),
            content_type: target.content_type.clone(),
            fail_after_data: false,
        };
        self.objects
            .write()
            .map_err(|_| BackendError::Other {
                backend: "memory".to_string(),
                message: "object map lock poisoned".to_string(),
            })?
            .insert((target.container.clone(), target.key.clone()), object);

        Ok(self.object_ref(target))
    }

    fn object_ref(&self, target: &ObjectTarget) -> ObjectRef {
        ObjectRef::new("memory", target.container.clone(), target.key.clone())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_in_chunks() {
        let store = MemoryBackend::new().with_read_chunk_size(3);
        store.insert("in", "a.json", b"[1,2,3]".to_vec());

        let location = Location::parse("memory://in/a.json").unwrap();
        let chunks: Vec<_> = store.read(&location).await.unwrap().collect().await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].as_ref().unwrap().as_ref(), b"[1,");
    }

    #[tokio::test]
    async fn test_read_error_after_data() {
        let store = MemoryBackend::new();
        store.insert_with_read_error("in", "a.json", b"[1,".to_vec());

        let location = Location::parse("memory://in/a.json").unwrap();
        let chunks: Vec<_> = store.read(&location).await.unwrap().collect().await;
        assert!(chunks[0].is_ok());
        assert!(chunks.last().unwrap().is_err());
    }

    #[tokio::test]
    async fn test_missing_object() {
        let store = MemoryBackend::new();
        let location = Location::parse("memory://in/missing").unwrap();
        assert!(store.read(&location).await.err().unwrap().is_not_found());
    }

    #[tokio::test]
    async fn test_upload_and_failure_injection() {
        let store = MemoryBackend::new();
        let body: UploadBody = Box::pin(stream::iter(vec![Bytes::from_static(b"[]")]));
        let object = store
            .upload(&ObjectTarget::new("out", "k1"), body)
            .await
            .unwrap();
        assert_eq!(object.uri(), "memory://out/k1");
        assert_eq!(store.get("out", "k1").unwrap().as_ref(), b"[]");

        store.fail_uploads("bucket is read-only");
        let body: UploadBody = Box::pin(stream::iter(vec![Bytes::from_static(b"[]")]));
        let err = store
            .upload(&ObjectTarget::new("out", "k2"), body)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("bucket is read-only"));
        assert_eq!(store.keys("out"), vec!["k1".to_string()]);
    }
}
