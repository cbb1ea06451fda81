/*!
 * Record broadcaster
 *
 * Reads the source once and delivers every record, in source order, to each
 * branch through its own bounded channel. The producer waits for room in a
 * branch's channel before moving on, so no branch can fall arbitrarily far
 * behind and memory stays bounded by `branches * capacity` records.
 *
 * A source failure is forwarded to every branch as a terminal message after
 * the records that preceded it.
 */

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::source::RecordStream;
use super::Record;
use crate::error::{Result, SwitchError};

/// What a branch receives from the broadcaster
#[derive(Debug, Clone)]
enum Delivery {
    Record(Record),
    SourceFailed(Arc<str>),
}

/// One branch's view of the broadcast
#[derive(Debug)]
pub struct BranchFeed {
    rx: mpsc::Receiver<Delivery>,
}

impl BranchFeed {
    /// Next record, `None` once the source is exhausted
    ///
    /// A source failure arrives as `Some(Err(SwitchError::Source))` after
    /// every record read before it.
    pub async fn next(&mut self) -> Option<Result<Record>> {
        match self.rx.recv().await? {
            Delivery::Record(record) => Some(Ok(record)),
            Delivery::SourceFailed(message) => Some(Err(SwitchError::Source(message.to_string()))),
        }
    }
}

/// Running broadcast: the branch feeds plus the producer task
pub struct Broadcast {
    pub feeds: Vec<BranchFeed>,
    /// Resolves to the number of records read from the source
    pub producer: JoinHandle<Result<u64>>,
}

/// Spawn a producer delivering `source` to `branches` feeds
pub fn broadcast(source: RecordStream, branches: usize, capacity: usize) -> Broadcast {
    let mut senders = Vec::with_capacity(branches);
    let mut feeds = Vec::with_capacity(branches);
    for _ in 0..branches {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        senders.push(Some(tx));
        feeds.push(BranchFeed { rx });
    }

    let producer = tokio::spawn(produce(source, senders));
    Broadcast { feeds, producer }
}

async fn produce(
    mut source: RecordStream,
    mut senders: Vec<Option<mpsc::Sender<Delivery>>>,
) -> Result<u64> {
    let mut count = 0u64;

    while let Some(item) = source.next().await {
        match item {
            Ok(record) => {
                count += 1;
                let mut live = 0;
                for slot in senders.iter_mut() {
                    let Some(tx) = slot else { continue };
                    if tx.send(Delivery::Record(Arc::clone(&record))).await.is_err() {
                        // Branch stopped consuming; it reports its own error
                        *slot = None;
                    } else {
                        live += 1;
                    }
                }
                if live == 0 {
                    tracing::debug!("All branches closed after {} records", count);
                    return Ok(count);
                }
            }
            Err(e) => {
                tracing::warn!("Source failed after {} records: {}", count, e);
                let message: Arc<str> = Arc::from(e.to_string());
                for tx in senders.iter().flatten() {
                    let _ = tx.send(Delivery::SourceFailed(Arc::clone(&message))).await;
                }
                return Err(e);
            }
        }
    }

    tracing::debug!("Source exhausted after {} records", count);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::source::from_records;
    use futures::stream;
    use serde_json::json;
    use std::time::Duration;

    async fn collect(mut feed: BranchFeed) -> (Vec<serde_json::Value>, Option<SwitchError>) {
        let mut out = Vec::new();
        while let Some(item) = feed.next().await {
            match item {
                Ok(record) => out.push((*record).clone()),
                Err(e) => return (out, Some(e)),
            }
        }
        (out, None)
    }

    #[tokio::test]
    async fn test_every_branch_sees_every_record_in_order() {
        let records: Vec<_> = (0..100).map(|i| json!({ "id": i })).collect();
        let Broadcast { feeds, producer } = broadcast(from_records(records.clone()), 3, 4);

        let handles: Vec<_> = feeds.into_iter().map(|f| tokio::spawn(collect(f))).collect();
        for handle in handles {
            let (seen, err) = handle.await.unwrap();
            assert_eq!(seen, records);
            assert!(err.is_none());
        }
        assert_eq!(producer.await.unwrap().unwrap(), 100);
    }

    #[tokio::test]
    async fn test_records_are_shared_not_copied() {
        let Broadcast { mut feeds, producer } = broadcast(from_records(vec![json!({"id": 1})]), 2, 1);
        let a = feeds[0].next().await.unwrap().unwrap();
        let b = feeds[1].next().await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        drop(feeds);
        producer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_slow_branch_applies_backpressure() {
        let records: Vec<_> = (0..10).map(|i| json!(i)).collect();
        let Broadcast { mut feeds, producer } = broadcast(from_records(records), 2, 2);

        // Neither branch reads, so the producer stalls once both channels fill
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());

        let second = feeds.pop().unwrap();
        let first = feeds.pop().unwrap();
        let ((first_seen, _), (second_seen, _)) = tokio::join!(collect(first), collect(second));
        assert_eq!(first_seen.len(), 10);
        assert_eq!(second_seen.len(), 10);
        assert_eq!(producer.await.unwrap().unwrap(), 10);
    }

    #[tokio::test]
    async fn test_source_failure_reaches_every_branch() {
        let source = stream::iter(vec![
            Ok(Arc::new(json!(1))),
            Ok(Arc::new(json!(2))),
            Err(SwitchError::Source("connection reset".to_string())),
        ])
        .boxed();
        let Broadcast { feeds, producer } = broadcast(source, 2, 8);

        for feed in feeds {
            let (seen, err) = collect(feed).await;
            assert_eq!(seen, vec![json!(1), json!(2)]);
            assert!(err.unwrap().to_string().contains("connection reset"));
        }
        assert!(producer.await.unwrap().unwrap_err().is_source());
    }
}
