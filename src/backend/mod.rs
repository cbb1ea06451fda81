//! Storage collaborators for record sources and durable sinks
//!
//! Sources read a JSON array from an external location; durable sinks stream
//! a JSON array of matched records to an object store. Both go through the
//! [`ObjectStore`] trait so the pipeline never depends on a concrete store.
//!
//! # Features
//!
//! - **Async-first design**: All operations use `async/await` with Tokio runtime
//! - **Streaming I/O**: reads and uploads move data in chunks
//! - **Multiple implementations**: local filesystem, in-memory, and S3
//!   (`s3-native` feature)
//!
//! # Example
//!
//! ```no_run
//! use switchyard::backend::{Location, LocalBackend, ObjectStore};
//! use futures::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let backend = LocalBackend::new();
//!     let location = Location::parse("/tmp/input.json")?;
//!     let mut stream = backend.read(&location).await?;
//!     while let Some(chunk) = stream.next().await {
//!         println!("read {} bytes", chunk?.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod location;
pub mod types;

mod local;
mod memory;
mod registry;

#[cfg(feature = "s3-native")]
mod s3;

// Re-export main types
pub use error::{BackendError, BackendResult};
pub use local::LocalBackend;
pub use location::Location;
pub use memory::MemoryBackend;
pub use registry::BackendRegistry;
pub use types::{ByteRange, ObjectRef, ObjectTarget, ReadStream, UploadBody, DEFAULT_CONTENT_TYPE};

#[cfg(feature = "s3-native")]
pub use s3::{S3Backend, S3Settings};

use async_trait::async_trait;

/// Object store used by sources and durable sinks
///
/// Implementors must be `Send + Sync`; one store is shared by every branch of
/// a run and by concurrent runs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open a location for reading as a stream of byte chunks
    ///
    /// The returned stream owns the underlying handle and releases it when
    /// dropped, whether or not it was read to the end.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` if nothing exists at the location.
    /// Returns `BackendError::Unsupported` if the location's scheme is not
    /// served by this store.
    async fn read(&self, location: &Location) -> BackendResult<ReadStream>;

    /// Upload a streamed body to `target`
    ///
    /// Resolves once the store has acknowledged the object, returning its
    /// reference. The body stream ending marks the end of the object.
    async fn upload(&self, target: &ObjectTarget, body: UploadBody) -> BackendResult<ObjectRef>;

    /// Reference `upload` returns once `target` is stored
    fn object_ref(&self, target: &ObjectTarget) -> ObjectRef;

    /// Reject targets this store cannot hold
    ///
    /// Called before any upload starts, so a bad destination fails the run
    /// without leaving partial objects behind.
    fn check_target(&self, _target: &ObjectTarget) -> BackendResult<()> {
        Ok(())
    }

    /// Get the backend name/type (e.g., "local", "memory", "s3")
    fn backend_name(&self) -> &str;
}
