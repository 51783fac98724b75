use crate::errors::FileStoreError;
use crate::protocol::DownloadStream;
use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Streams a node's download stream into a writer, enforcing that the
/// total bytes received equals `expected_size` exactly — neither more
/// (an overrun, caught mid-stream before it fills memory further) nor
/// less (caught once the stream ends).
pub struct ChunkedStreamReceiver;

impl Default for ChunkedStreamReceiver {
    fn default() -> Self {
        Self
    }
}

impl ChunkedStreamReceiver {
    pub async fn recv<W>(
        &self,
        seq: usize,
        mut stream: Box<dyn DownloadStream>,
        expected_size: u64,
        mut writer: W,
        cancel: CancellationToken,
    ) -> Result<u64, FileStoreError>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let scope = cancel.child_token();

        let (tx, mut rx) = mpsc::channel::<Bytes>(1);
        let (err_tx, mut err_rx) = mpsc::channel::<FileStoreError>(2);

        // `stream` is the `'static` half, so it's spawned as its own task;
        // `writer` may be a borrowed reference with a shorter lifetime (the
        // caller typically passes `&mut`), so it has to stay inline. `tx`/
        // `err_tx` are moved into the spawned task and dropped when it
        // returns — that's what lets the writer loop's `rx.recv()` observe
        // end-of-stream instead of blocking forever.
        let network_scope = scope.clone();
        let network = tokio::spawn(async move {
            loop {
                let chunk = match stream.recv().await {
                    Ok(Some(chunk)) => chunk,
                    Ok(None) => return,
                    Err(e) => {
                        let _ = err_tx.send(e).await;
                        return;
                    }
                };
                tokio::select! {
                    _ = network_scope.cancelled() => return,
                    send_res = tx.send(chunk) => {
                        if send_res.is_err() {
                            return;
                        }
                    }
                }
            }
        });

        let mut written: u64 = 0;
        let writer_result: Result<(), FileStoreError> = async {
            loop {
                tokio::select! {
                    biased;
                    Some(err) = err_rx.recv() => return Err(err),
                    maybe_chunk = rx.recv() => {
                        match maybe_chunk {
                            Some(chunk) => {
                                written += chunk.len() as u64;
                                if written > expected_size {
                                    return Err(FileStoreError::Overflow {
                                        seq,
                                        limit: expected_size,
                                    });
                                }
                                writer
                                    .write_all(&chunk)
                                    .await
                                    .map_err(|e| FileStoreError::Transport(e.to_string()))?;
                            }
                            None => break,
                        }
                    }
                    _ = scope.cancelled() => return Err(FileStoreError::Cancelled),
                }
            }
            Ok(())
        }
        .await;

        // If the writer bailed out early (overflow, a write error, or
        // cancellation) while `network` still has chunks queued up, nothing
        // is left draining `rx` — cancel so `network`'s own `tx.send` wakes
        // up on `network_scope.cancelled()` instead of blocking forever.
        if writer_result.is_err() {
            scope.cancel();
        }
        let _ = network.await;
        writer_result?;

        if written != expected_size {
            return Err(FileStoreError::SizeMismatch {
                expected: expected_size,
                actual: written,
            });
        }
        writer
            .flush()
            .await
            .map_err(|e| FileStoreError::Transport(e.to_string()))?;
        Ok(written)
    }
}
