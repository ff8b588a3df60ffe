//! Subcommand handlers.

use crate::Context;
use crate::error::{Error, ErrorKind, Result};
use crate::format::human_size;
use bytes::Bytes;
use colossus_metadata::{AccountId, FileFilter, FileId, NewAccount, ProviderKind};
use colossus_pool::UploadRequest;
use exn::ResultExt;
use futures::TryStreamExt;
use std::path::{Path, PathBuf};
use time::{Duration, UtcDateTime};
use tokio::io::AsyncWriteExt;

/// Wrap a pool error, telling the user which account to reconnect if that is
/// what it takes.
fn pool_error(e: colossus_pool::error::Error) -> Error {
    if let Some(account) = e.reconnect_required() {
        eprintln!("account {account} must be reconnected before it can be used again");
    }
    e.raise(ErrorKind::Pool)
}

pub(crate) async fn connect_local(ctx: &Context, label: String, root: PathBuf, capacity: u64) -> Result<()> {
    let root = std::path::absolute(&root).map_err(ErrorKind::Io)?;
    tokio::fs::create_dir_all(&root).await.map_err(ErrorKind::Io)?;
    let account = ctx
        .repo
        .connect_account(NewAccount {
            owner: ctx.user,
            provider: ProviderKind::Local,
            label,
            access_token: String::new(),
            refresh_token: None,
            token_expiry: None,
            root_ref: Some(root.to_string_lossy().into_owned()),
            capacity: Some(capacity),
        })
        .await
        .or_raise(|| ErrorKind::Account)?;
    println!("connected account {} ({}, {})", account.id, account.label, human_size(capacity));
    Ok(())
}

pub(crate) async fn connect_drive(
    ctx: &Context,
    label: String,
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    folder: Option<String>,
) -> Result<()> {
    let account = ctx
        .repo
        .connect_account(NewAccount {
            owner: ctx.user,
            provider: ProviderKind::Drive,
            label,
            access_token,
            refresh_token,
            token_expiry: expires_in.map(|secs| UtcDateTime::now() + Duration::seconds(secs)),
            root_ref: folder,
            capacity: None,
        })
        .await
        .or_raise(|| ErrorKind::Account)?;
    println!("connected account {} ({})", account.id, account.label);
    Ok(())
}

pub(crate) async fn list_accounts(ctx: &Context) -> Result<()> {
    let summary = ctx.pool.summary(ctx.user).await.map_err(pool_error)?;
    for entry in &summary.accounts {
        let quota = match entry.quota.error {
            true => "unavailable".to_string(),
            false => format!(
                "{} free of {} ({} used)",
                human_size(entry.quota.free),
                human_size(entry.quota.total),
                human_size(entry.quota.used)
            ),
        };
        let (id, provider) = (entry.account.id.to_string(), entry.account.provider.to_string());
        println!("{id:>4}  {provider:<6} {:<32} {quota}", entry.account.label);
    }
    println!(
        "total: {} free of {} ({} used) across {} account(s)",
        human_size(summary.free),
        human_size(summary.total),
        human_size(summary.used),
        summary.accounts.len()
    );
    Ok(())
}

pub(crate) async fn disconnect(ctx: &Context, id: i64) -> Result<()> {
    ctx.repo.disconnect_account(AccountId(id), ctx.user).await.or_raise(|| ErrorKind::Account)?;
    println!("disconnected account {id}");
    Ok(())
}

pub(crate) async fn upload(
    ctx: &Context,
    file: PathBuf,
    name: Option<String>,
    mime_type: Option<String>,
    path: String,
) -> Result<()> {
    let name = match name {
        Some(name) => name,
        None => file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| Error::from(ErrorKind::InvalidArgument(format!("`{}` has no file name", file.display()))))?,
    };
    let mime_type = mime_type.or_else(|| mime_guess::from_path(&file).first().map(|mime| mime.essence_str().to_string()));
    let data = tokio::fs::read(&file).await.map_err(ErrorKind::Io)?;
    let request = UploadRequest { owner: ctx.user, name, mime_type, path: Some(path), data: Bytes::from(data) };
    let record = ctx.pool.upload(request).await.map_err(pool_error)?;
    let layout = match record.layout.objects().len() {
        1 => "single object".to_string(),
        n => format!("{n} chunks"),
    };
    println!("uploaded {} as file {} ({}, {layout})", record.name, record.id, human_size(record.size));
    Ok(())
}

pub(crate) async fn download(ctx: &Context, id: i64, output: Option<PathBuf>) -> Result<()> {
    let download = ctx.pool.download(ctx.user, FileId(id)).await.map_err(pool_error)?;
    let output = output.unwrap_or_else(|| PathBuf::from(&download.name));
    match write(&output, download.stream).await {
        Ok(written) => {
            println!("downloaded {} to {} ({})", download.name, output.display(), human_size(written));
            Ok(())
        },
        Err(e) => {
            // Never leave a truncated file behind looking like the real thing.
            _ = tokio::fs::remove_file(&output).await;
            Err(e)
        },
    }
}

async fn write(output: &Path, mut stream: colossus_pool::DownloadStream) -> Result<u64> {
    let mut file = tokio::fs::File::create(output).await.map_err(ErrorKind::Io)?;
    let mut written = 0u64;
    while let Some(bytes) = stream.try_next().await.map_err(pool_error)? {
        file.write_all(&bytes).await.map_err(ErrorKind::Io)?;
        written += bytes.len() as u64;
    }
    file.flush().await.map_err(ErrorKind::Io)?;
    Ok(written)
}

pub(crate) async fn list_files(ctx: &Context, search: Option<String>, path: Option<String>, trash: bool) -> Result<()> {
    let filter = FileFilter { search, path, deleted: trash };
    let files = ctx.pool.list(ctx.user, &filter).await.map_err(pool_error)?;
    for file in &files {
        println!(
            "{:>6}  {:>10}  {:<24} {}{}{}",
            file.id.to_string(),
            human_size(file.size),
            file.mime_type,
            file.path,
            if file.path.ends_with('/') { "" } else { "/" },
            file.name
        );
    }
    println!("{} file(s)", files.len());
    Ok(())
}

pub(crate) async fn delete(ctx: &Context, id: i64) -> Result<()> {
    let report = ctx.pool.delete(ctx.user, FileId(id)).await.map_err(pool_error)?;
    match report.failed {
        0 => println!("deleted file {id}"),
        failed => println!("deleted file {id}; {failed} of {} remote object(s) could not be removed", report.objects),
    }
    Ok(())
}

pub(crate) async fn trash(ctx: &Context, id: i64) -> Result<()> {
    ctx.pool.trash(ctx.user, FileId(id)).await.map_err(pool_error)?;
    println!("moved file {id} to the trash");
    Ok(())
}

pub(crate) async fn restore(ctx: &Context, id: i64) -> Result<()> {
    ctx.pool.restore(ctx.user, FileId(id)).await.map_err(pool_error)?;
    println!("restored file {id}");
    Ok(())
}

pub(crate) async fn purge(ctx: &Context) -> Result<()> {
    let reports = ctx.pool.purge_trash(ctx.user).await.map_err(pool_error)?;
    let orphaned: usize = reports.iter().map(|report| report.failed).sum();
    println!("purged {} file(s)", reports.len());
    if orphaned > 0 {
        println!("{orphaned} remote object(s) could not be removed");
    }
    Ok(())
}
