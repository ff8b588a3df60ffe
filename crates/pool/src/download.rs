//! Download reassembly.

use crate::Pool;
use crate::error::{Error, ErrorKind, Result};
use async_stream::stream;
use bytes::Bytes;
use colossus_metadata::{AccountId, Chunk, FileId, Layout, UserId};
use colossus_provider::{ProviderHandle, RemoteProvider};
use exn::ResultExt;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use tracing::instrument;

/// The bytes of a pooled file, in order.
///
/// An `Err` item ends the stream: bytes delivered before it are not the whole
/// file and must be discarded.
pub type DownloadStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send + 'static>>;

/// A file being downloaded.
pub struct Download {
    pub name: String,
    pub mime_type: String,
    /// Total bytes the stream delivers when it completes.
    pub size: u64,
    pub stream: DownloadStream,
}

/// One remote object of the file, with the client that reaches it.
struct Segment {
    account: AccountId,
    client: ProviderHandle,
    remote_id: String,
    size: u64,
}

impl Pool {
    /// Stream a file back in its original byte order.
    ///
    /// Every account the file is stored on is resolved, and its token
    /// refreshed if needed, before this returns. Chunks are then read one
    /// after the other as the stream is polled; a chunk's object is not opened
    /// until the previous one has been fully delivered.
    ///
    /// # Errors
    ///
    /// [`NotFound`](ErrorKind::NotFound) if the file doesn't exist, belongs to
    /// someone else or is in the trash. Account failures are reported here if
    /// they happen up front and as the stream's last item otherwise, as is
    /// [`Corrupted`](ErrorKind::Corrupted) when the bytes don't match what was
    /// uploaded.
    #[instrument(skip(self))]
    pub async fn download(&self, owner: UserId, id: FileId) -> Result<Download> {
        let record = self.record(owner, id).await?;
        if record.deleted {
            exn::bail!(ErrorKind::NotFound(id));
        }
        let parts: Vec<(AccountId, String, u64)> = match &record.layout {
            Layout::Single { account, remote_id } => vec![(*account, remote_id.clone(), record.size)],
            Layout::Chunked(chunks) => {
                let mut chunks: Vec<&Chunk> = chunks.iter().collect();
                chunks.sort_by_key(|chunk| chunk.index);
                chunks.into_iter().map(|chunk| (chunk.account, chunk.remote_id.clone(), chunk.size)).collect()
            },
        };

        let mut clients: HashMap<AccountId, ProviderHandle> = HashMap::new();
        let mut segments = Vec::with_capacity(parts.len());
        for (account, remote_id, size) in parts {
            let client = match clients.get(&account) {
                Some(client) => client.clone(),
                None => {
                    let stored = self
                        .credentials
                        .account(account, owner)
                        .await
                        .or_raise(|| ErrorKind::AccountUnavailable(account))?;
                    let client = self.tokens.client(&stored).await?;
                    clients.insert(account, client.clone());
                    client
                },
            };
            segments.push(Segment { account, client, remote_id, size });
        }

        tracing::info!(file = %id, size = record.size, segments = segments.len(), "Downloading file");
        Ok(Download {
            stream: reassemble(id, segments, record.content_hash),
            name: record.name,
            mime_type: record.mime_type,
            size: record.size,
        })
    }
}

/// Concatenate the segments' streams, checking each delivers exactly its
/// size and that the whole matches `content_hash`.
fn reassemble(file: FileId, segments: Vec<Segment>, content_hash: Option<String>) -> DownloadStream {
    Box::pin(stream! {
        let mut hasher = blake3::Hasher::new();
        for segment in segments {
            let mut remote = match segment.client.reader(&segment.remote_id).await {
                Ok(remote) => remote,
                Err(e) => {
                    tracing::warn!(file = %file, account = %segment.account, error = %e, "Could not open object");
                    yield Err(ErrorKind::account(e, segment.account));
                    return;
                },
            };
            let mut received = 0u64;
            while let Some(item) = remote.next().await {
                match item {
                    Ok(bytes) => {
                        received += bytes.len() as u64;
                        if received > segment.size {
                            tracing::warn!(file = %file, remote_id = %segment.remote_id, expected = segment.size, "Object is larger than recorded");
                            yield Err(Error::from(ErrorKind::Corrupted(file)));
                            return;
                        }
                        hasher.update(&bytes);
                        yield Ok(bytes);
                    },
                    Err(e) => {
                        tracing::warn!(file = %file, account = %segment.account, received, error = %e, "Download interrupted");
                        yield Err(ErrorKind::account(e, segment.account));
                        return;
                    },
                }
            }
            if received != segment.size {
                tracing::warn!(file = %file, remote_id = %segment.remote_id, expected = segment.size, received, "Object is smaller than recorded");
                yield Err(Error::from(ErrorKind::Corrupted(file)));
                return;
            }
        }
        match content_hash {
            Some(expected) if hasher.finalize().to_hex().as_str() != expected => {
                tracing::warn!(file = %file, "Content hash mismatch");
                yield Err(Error::from(ErrorKind::Corrupted(file)));
            },
            _ => tracing::debug!(file = %file, "Download complete"),
        }
    })
}
