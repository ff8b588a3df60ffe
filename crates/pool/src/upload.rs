//! Upload execution.

use crate::Pool;
use crate::error::{Error, ErrorKind, Result};
use crate::path::normalize as normalize_path;
use crate::plan::{Assignment, Plan, plan};
use crate::quota::{self, Probe};
use bytes::Bytes;
use colossus_metadata::{Account, AccountId, Chunk, FileRecord, Layout, NewFile, UserId};
use colossus_provider::error::{Error as ProviderError, ErrorKind as ProviderErrorKind, Result as ProviderResult};
use colossus_provider::{ProviderHandle, RemoteObject, RemoteProvider, validate_object_name};
use exn::ResultExt;
use tracing::instrument;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// A file to add to the pool.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub owner: UserId,
    pub name: String,
    /// Defaults to `application/octet-stream`.
    pub mime_type: Option<String>,
    /// Display path; defaults to the root.
    pub path: Option<String>,
    pub data: Bytes,
}

/// A remote object created during this upload, for compensation.
struct Placed {
    account: AccountId,
    client: ProviderHandle,
    remote_id: String,
}

impl Pool {
    /// Upload a file into the pool.
    ///
    /// Either the file is stored completely and its metadata persisted, or
    /// nothing is persisted and every object this upload created has been
    /// deleted again (best effort).
    ///
    /// # Errors
    ///
    /// - [`NoCapacity`](ErrorKind::NoCapacity) if the accounts don't have
    ///   room for the file, whether that is known up front or only discovered
    ///   when an account turns out to have less room than it reported.
    /// - [`PartialUploadFailure`](ErrorKind::PartialUploadFailure) if a chunk
    ///   failed for another reason after earlier chunks were placed.
    /// - [`AccountUnavailable`](ErrorKind::AccountUnavailable) or
    ///   [`AuthExpired`](ErrorKind::AuthExpired) if the first object couldn't
    ///   be placed.
    #[instrument(skip_all, fields(owner = %request.owner, name = %request.name, size = request.data.len()))]
    pub async fn upload(&self, request: UploadRequest) -> Result<FileRecord> {
        let size = request.data.len() as u64;
        if size == 0 {
            exn::bail!(ErrorKind::InvalidInput("file is empty".to_string()));
        }
        if size > self.options.max_file_size {
            exn::bail!(ErrorKind::InvalidInput(format!(
                "file is {size} bytes, the limit is {} bytes",
                self.options.max_file_size
            )));
        }
        validate_object_name(&request.name)
            .or_raise(|| ErrorKind::InvalidInput(format!("bad file name: {:?}", request.name)))?;
        let path = normalize_path(request.path.as_deref().unwrap_or("/"))?;
        let mime_type = match request.mime_type.as_deref().map(str::trim) {
            Some(mime_type) if !mime_type.is_empty() => mime_type.to_string(),
            _ => DEFAULT_MIME_TYPE.to_string(),
        };

        let accounts = self.credentials.list_accounts(request.owner).await.or_raise(|| ErrorKind::Metadata)?;
        if accounts.is_empty() {
            exn::bail!(ErrorKind::NoAccounts);
        }
        let probes = quota::probe(&self.tokens, &accounts).await;
        let candidates: Vec<_> = accounts.iter().zip(&probes).map(|(account, probe)| (account.id, probe.report)).collect();
        let plan = plan(size, &candidates)?;

        let (layout, placed) = match plan {
            Plan::Single { account } => {
                let client = client_for(&accounts, &probes, account)?;
                let object = create(&client, &request.name, &mime_type, request.data.clone()).await.map_err(|e| {
                    match e.is_storage_full() {
                        true => e.raise(ErrorKind::NoCapacity { needed: size, available: 0 }),
                        false => ErrorKind::account(e, account),
                    }
                })?;
                tracing::debug!(account = %account, remote_id = %object.id, "Placed file on a single account");
                let placed = vec![Placed { account, client, remote_id: object.id.clone() }];
                (Layout::Single { account, remote_id: object.id }, placed)
            },
            Plan::Chunked(assignments) => self.upload_chunks(&request, &accounts, &probes, &assignments).await?,
        };

        let file = NewFile {
            owner: request.owner,
            name: request.name,
            mime_type,
            size,
            path,
            content_hash: Some(blake3::hash(&request.data).to_hex().to_string()),
            layout,
        };
        let record = match self.files.create(file).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "Could not persist file metadata; removing uploaded objects");
                compensate(&placed).await;
                return Err(e).or_raise(|| ErrorKind::Metadata);
            },
        };
        tracing::info!(
            file = %record.id,
            size = record.size,
            chunked = record.layout.is_chunked(),
            objects = placed.len(),
            "Uploaded file"
        );
        Ok(record)
    }

    /// Upload each assignment in chunk-index order, stopping at the first
    /// failure and deleting what was already placed.
    async fn upload_chunks(
        &self,
        request: &UploadRequest,
        accounts: &[Account],
        probes: &[Probe],
        assignments: &[Assignment],
    ) -> Result<(Layout, Vec<Placed>)> {
        let needed = request.data.len() as u64;
        let mut placed = Vec::with_capacity(assignments.len());
        let mut chunks = Vec::with_capacity(assignments.len());
        let mut placed_bytes = 0u64;

        for assignment in assignments {
            let client = client_for(accounts, probes, assignment.account)?;
            let name = format!("{}.chunk{}", request.name, assignment.index);
            let data = request.data.slice(assignment.byte_start as usize..=assignment.byte_end as usize);
            match create(&client, &name, DEFAULT_MIME_TYPE, data).await {
                Ok(object) => {
                    tracing::debug!(
                        index = assignment.index,
                        account = %assignment.account,
                        byte_start = assignment.byte_start,
                        byte_end = assignment.byte_end,
                        "Placed chunk"
                    );
                    placed_bytes += assignment.size();
                    chunks.push(Chunk::new(
                        assignment.index,
                        assignment.account,
                        object.id.clone(),
                        assignment.byte_start,
                        assignment.byte_end,
                    ));
                    placed.push(Placed { account: assignment.account, client, remote_id: object.id });
                },
                Err(error) => {
                    tracing::warn!(
                        index = assignment.index,
                        account = %assignment.account,
                        placed = placed_bytes,
                        needed,
                        error = %error,
                        "Chunk upload failed; removing chunks already placed"
                    );
                    compensate(&placed).await;
                    return Err(chunk_failure(error, assignment.account, needed, placed_bytes));
                },
            }
        }
        Ok((Layout::Chunked(chunks), placed))
    }
}

/// The client the quota probe used for `account`.
///
/// Planning only picks accounts whose quota was fetched, so the client is
/// always there.
fn client_for(accounts: &[Account], probes: &[Probe], account: AccountId) -> Result<ProviderHandle> {
    accounts
        .iter()
        .zip(probes)
        .find(|(candidate, _)| candidate.id == account)
        .and_then(|(_, probe)| probe.client.clone())
        .ok_or_else(|| Error::from(ErrorKind::AccountUnavailable(account)))
}

/// Create an object, treating a size the provider didn't fully acknowledge
/// as a failure.
async fn create(client: &ProviderHandle, name: &str, mime_type: &str, data: Bytes) -> ProviderResult<RemoteObject> {
    let expected = data.len() as u64;
    let object = client.create(name, mime_type, data).await?;
    if object.size != expected {
        // Don't leave the truncated object behind.
        if let Err(e) = client.delete(&object.id).await {
            tracing::warn!(remote_id = %object.id, error = %e, "Could not remove truncated object");
        }
        exn::bail!(ProviderErrorKind::Provider(format!(
            "object `{}` stored {} of {expected} bytes",
            object.id, object.size
        )));
    }
    Ok(object)
}

fn chunk_failure(error: ProviderError, account: AccountId, needed: u64, placed: u64) -> Error {
    if error.is_storage_full() {
        return error.raise(ErrorKind::NoCapacity { needed, available: placed });
    }
    match placed {
        0 => ErrorKind::account(error, account),
        placed => ErrorKind::account(error, account).raise(ErrorKind::PartialUploadFailure { needed, placed }),
    }
}

/// Best-effort deletion of objects created by a failed upload.
///
/// Failures are logged and swallowed: the upload failure is what the caller
/// needs to see.
async fn compensate(placed: &[Placed]) {
    for object in placed {
        match object.client.delete(&object.remote_id).await {
            Ok(()) => tracing::debug!(account = %object.account, remote_id = %object.remote_id, "Removed uploaded object"),
            Err(e) => tracing::warn!(
                account = %object.account,
                remote_id = %object.remote_id,
                error = %e,
                "Could not remove uploaded object; it is orphaned"
            ),
        }
    }
}
