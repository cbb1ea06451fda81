/*!
 * Branch sinks
 *
 * A sink collects the records that passed one case. Two kinds exist:
 *
 * - [`MemorySink`] keeps the records and returns them as the branch output
 * - [`DurableSink`] streams them as a JSON array to an object store and
 *   returns a reference to the stored object
 *
 * A durable sink separates "finished" (the last record was handed over) from
 * "durable" (the store acknowledged the object). Finishing yields a
 * [`PendingOutput`] that the pipeline resolves under a shared deadline.
 */

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{timeout_at, Instant};
use uuid::Uuid;

use super::{BranchOutput, Record};
use crate::backend::{
    BackendResult, ObjectRef, ObjectStore, ObjectTarget, UploadBody, DEFAULT_CONTENT_TYPE,
};
use crate::error::{Result, SwitchError};
use crate::request::Destination;

/// Chunks buffered between a durable sink and its upload
const UPLOAD_CHANNEL_CAPACITY: usize = 16;

/// Accumulates one branch's matching records
#[async_trait]
pub trait RecordSink: Send {
    /// Take one record that passed the branch's case
    async fn accept(&mut self, record: Record) -> Result<()>;

    /// Signal that no more records will arrive
    async fn finish(self: Box<Self>) -> Result<PendingOutput>;
}

/// How branch sinks are created for a run
#[derive(Clone)]
pub enum SinkMode {
    Memory,
    Durable(DurableTarget),
}

impl SinkMode {
    pub fn open(&self, case_index: usize) -> Box<dyn RecordSink> {
        match self {
            SinkMode::Memory => Box::new(MemorySink::new()),
            SinkMode::Durable(target) => Box::new(DurableSink::open(target, case_index)),
        }
    }
}

impl std::fmt::Debug for SinkMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkMode::Memory => f.write_str("Memory"),
            SinkMode::Durable(target) => f
                .debug_struct("Durable")
                .field("backend", &target.store.backend_name())
                .field("destination", &target.destination)
                .finish(),
        }
    }
}

/// Store and destination for durable sinks
#[derive(Clone)]
pub struct DurableTarget {
    store: Arc<dyn ObjectStore>,
    destination: Destination,
}

impl DurableTarget {
    pub fn new(store: Arc<dyn ObjectStore>, destination: Destination) -> Self {
        Self { store, destination }
    }

    /// Ask the store whether it can hold objects under this destination
    pub fn check(&self) -> BackendResult<()> {
        self.store.check_target(&self.next_target())
    }

    /// Fresh object target: the key prefix followed by a random UUID
    fn next_target(&self) -> ObjectTarget {
        let key = format!("{}{}", self.destination.key_prefix, Uuid::new_v4());
        let content_type = self
            .destination
            .content_type
            .as_deref()
            .unwrap_or(DEFAULT_CONTENT_TYPE);
        ObjectTarget::new(&self.destination.container, key).with_content_type(content_type)
    }
}

/// Keeps matching records in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Vec<Record>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn accept(&mut self, record: Record) -> Result<()> {
        self.records.push(record);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<PendingOutput> {
        let this = *self;
        let records = this
            .records
            .into_iter()
            .map(Arc::unwrap_or_clone)
            .collect();
        Ok(PendingOutput::Ready(BranchOutput::Records(records)))
    }
}

/// Upload task handle; aborts the upload if dropped while still attached
#[derive(Debug)]
pub struct UploadHandle {
    inner: Option<JoinHandle<BackendResult<ObjectRef>>>,
}

impl UploadHandle {
    fn new(handle: JoinHandle<BackendResult<ObjectRef>>) -> Self {
        Self {
            inner: Some(handle),
        }
    }

    async fn wait(&mut self) -> Option<std::result::Result<BackendResult<ObjectRef>, JoinError>> {
        let handle = self.inner.as_mut()?;
        let result = handle.await;
        self.inner = None;
        Some(result)
    }

    /// Let the upload run to completion on its own
    fn detach(mut self) {
        self.inner.take();
    }

    /// The error that made the upload stop accepting body chunks
    async fn failure(&mut self, case_index: usize) -> SwitchError {
        match self.wait().await {
            Some(Ok(Err(e))) => SwitchError::sink(case_index, e),
            Some(Ok(Ok(_))) | None => {
                SwitchError::sink(case_index, "upload ended before the output was complete")
            }
            Some(Err(e)) => SwitchError::Internal(format!("upload task failed: {}", e)),
        }
    }
}

impl Drop for UploadHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.inner.take() {
            handle.abort();
        }
    }
}

/// Streams matching records to an object store as a JSON array
#[derive(Debug)]
pub struct DurableSink {
    case_index: usize,
    object: ObjectRef,
    // Declared before `tx`: a dropped sink aborts the upload before its body ends
    upload: UploadHandle,
    tx: Option<mpsc::Sender<Bytes>>,
    written: u64,
}

impl DurableSink {
    /// Start the upload; the body is fed as records arrive
    pub fn open(target: &DurableTarget, case_index: usize) -> Self {
        let object_target = target.next_target();
        let object = target.store.object_ref(&object_target);

        let (tx, rx) = mpsc::channel::<Bytes>(UPLOAD_CHANNEL_CAPACITY);
        let body: UploadBody = Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|chunk| (chunk, rx))
        }));

        let store = Arc::clone(&target.store);
        let handle = tokio::spawn(async move { store.upload(&object_target, body).await });

        tracing::debug!("Case {} streaming output to {}", case_index, object);

        Self {
            case_index,
            object,
            upload: UploadHandle::new(handle),
            tx: Some(tx),
            written: 0,
        }
    }

    /// Planned reference of the stored object
    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    async fn send(&mut self, chunk: Bytes) -> Result<()> {
        let Some(tx) = &self.tx else {
            return Err(SwitchError::Internal("sink already finished".to_string()));
        };
        if tx.send(chunk).await.is_ok() {
            return Ok(());
        }
        self.tx = None;
        Err(self.upload.failure(self.case_index).await)
    }
}

#[async_trait]
impl RecordSink for DurableSink {
    async fn accept(&mut self, record: Record) -> Result<()> {
        let mut chunk = Vec::with_capacity(128);
        chunk.push(if self.written == 0 { b'[' } else { b',' });
        serde_json::to_writer(&mut chunk, record.as_ref())?;
        self.send(Bytes::from(chunk)).await?;
        self.written += 1;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<PendingOutput> {
        let mut this = *self;
        let closing: &'static [u8] = if this.written == 0 { b"[]" } else { b"]" };
        this.send(Bytes::from_static(closing)).await?;
        // Dropping the sender ends the upload body
        this.tx = None;

        tracing::debug!(
            "Case {} finished with {} records, awaiting acknowledgement",
            this.case_index,
            this.written
        );

        Ok(PendingOutput::Uploading {
            case_index: this.case_index,
            object: this.object,
            upload: this.upload,
        })
    }
}

/// A finished branch whose output may still be in flight
#[derive(Debug)]
pub enum PendingOutput {
    Ready(BranchOutput),
    Uploading {
        case_index: usize,
        object: ObjectRef,
        upload: UploadHandle,
    },
}

impl PendingOutput {
    /// Wait for the output to become durable, at most until `deadline`
    ///
    /// Past the deadline the planned object reference is returned and the
    /// upload is left running.
    pub async fn resolve(self, deadline: Instant) -> Result<BranchOutput> {
        let (case_index, object, mut upload) = match self {
            PendingOutput::Ready(output) => return Ok(output),
            PendingOutput::Uploading {
                case_index,
                object,
                upload,
            } => (case_index, object, upload),
        };

        let outcome = timeout_at(deadline, upload.wait()).await;
        match outcome {
            Ok(Some(Ok(Ok(stored)))) => {
                tracing::info!("Case {} output stored at {}", case_index, stored);
                Ok(BranchOutput::Stored(stored))
            }
            Ok(Some(Ok(Err(e)))) => Err(SwitchError::sink(case_index, e)),
            Ok(Some(Err(e))) => Err(SwitchError::Internal(format!("upload task failed: {}", e))),
            Ok(None) => Err(SwitchError::Internal(format!(
                "upload for case {} already consumed",
                case_index
            ))),
            Err(_) => {
                tracing::warn!(
                    "Durability not confirmed for case {} before deadline, returning {}",
                    case_index,
                    object
                );
                upload.detach();
                Ok(BranchOutput::Stored(object))
            }
        }
    }
}
