use crate::errors::FileStoreError;
use crate::protocol::{UploadOutcome, UploadStream};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Streams exactly `part_size` bytes from a reader to a node's upload
/// stream, `chunk_size` bytes at a time.
///
/// A producer future reads fixed-size chunks and hands them to a
/// consumer future over a capacity-1 channel; a sibling error channel
/// carries a fatal read error (in particular a short read, which can't
/// be retried once the node's stream has already consumed prior
/// chunks). Both sides share a cancellation scope so a fatal error on
/// either side tears down the other promptly.
pub struct ChunkedStreamSender {
    chunk_size: usize,
}

impl Default for ChunkedStreamSender {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl ChunkedStreamSender {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub async fn send<R>(
        &self,
        mut reader: R,
        part_size: u64,
        mut stream: Box<dyn UploadStream>,
        cancel: CancellationToken,
    ) -> Result<UploadOutcome, FileStoreError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let chunk_size = self.chunk_size;
        let scope = cancel.child_token();

        let (data_tx, mut data_rx) = mpsc::channel::<Bytes>(1);
        let (err_tx, mut err_rx) = mpsc::channel::<FileStoreError>(2);

        // The consumer owns the (`'static`) stream and is spawned so it
        // runs concurrently with the producer below; the producer owns
        // the (possibly borrowed, non-`'static`) reader and runs inline.
        // `data_tx`/`err_tx` are moved into the spawned task only for the
        // duration it needs them — the producer's own copies are dropped
        // when it returns, which is what lets `data_rx.recv()` observe
        // end-of-stream and the consumer reach `close_and_recv`.
        let consumer_scope = scope.clone();
        let consumer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    Some(err) = err_rx.recv() => return Err(err),
                    maybe_chunk = data_rx.recv() => {
                        match maybe_chunk {
                            Some(chunk) => stream.send(chunk).await?,
                            None => break,
                        }
                    }
                    _ = consumer_scope.cancelled() => return Err(FileStoreError::Cancelled),
                }
            }
            stream.close_and_recv().await
        });

        let mut remaining = part_size;
        let mut buf = vec![0u8; chunk_size];
        while remaining > 0 {
            let want = chunk_size.min(remaining as usize);
            if let Err(e) = reader.read_exact(&mut buf[..want]).await {
                let _ = err_tx.send(map_read_error(e)).await;
                break;
            }
            let chunk = Bytes::copy_from_slice(&buf[..want]);
            tokio::select! {
                _ = scope.cancelled() => break,
                send_res = data_tx.send(chunk) => {
                    if send_res.is_err() {
                        // Consumer already gone; its own error surfaces below.
                        break;
                    }
                }
            }
            remaining -= want as u64;
        }
        drop(data_tx);
        drop(err_tx);

        let outcome = consumer
            .await
            .map_err(|e| FileStoreError::Transport(e.to_string()))??;

        if outcome.size != part_size {
            return Err(FileStoreError::SizeMismatch {
                expected: part_size,
                actual: outcome.size,
            });
        }
        Ok(outcome)
    }
}

fn map_read_error(err: std::io::Error) -> FileStoreError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        FileStoreError::UnexpectedEof
    } else {
        FileStoreError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mock::MockStorageNode;
    use crate::protocol::StorageNodeClient;
    use std::io::Cursor;

    #[tokio::test]
    async fn sends_exact_part_size_and_matches_hash() {
        let node = MockStorageNode::new(1024);
        let ready = node.check_readiness(11).await.unwrap();
        assert!(ready.ready);
        let stream = node.upload_file(&ready.id).await.unwrap();

        let sender = ChunkedStreamSender::new(4);
        let reader = Cursor::new(b"hello world".to_vec());
        let outcome = sender
            .send(reader, 11, stream, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.size, 11);
        assert!(node.check_file_part_existence(&outcome.id).await.unwrap());
    }

    #[tokio::test]
    async fn short_read_is_fatal() {
        let node = MockStorageNode::new(1024);
        let ready = node.check_readiness(100).await.unwrap();
        let stream = node.upload_file(&ready.id).await.unwrap();
        let sender = ChunkedStreamSender::new(4);
        let reader = Cursor::new(b"short".to_vec());
        let err = sender
            .send(reader, 100, stream, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FileStoreError::UnexpectedEof));
    }
}
