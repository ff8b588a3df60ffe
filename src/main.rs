//! Command-line front end for colossus.

mod commands;
mod error;
mod format;

use crate::error::{ErrorKind, Result};
use clap::{Args, Parser, Subcommand};
use colossus_config::Config;
use colossus_metadata::{Database, Repository, UserId};
use colossus_pool::{DefaultConnector, DefaultRefresher, OAuthClient, Pool, PoolOptions};
use exn::ResultExt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "colossus")]
#[command(about = "Pool many quota-limited storage accounts into one volume")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, global = true, env = "COLOSSUS_CONFIG")]
    config: Option<PathBuf>,

    /// User whose accounts and files to operate on
    #[arg(long, global = true, env = "COLOSSUS_USER", default_value_t = 1)]
    user: i64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Storage account management
    Account {
        #[command(subcommand)]
        command: AccountCommands,
    },
    /// Upload a file into the pool
    Upload {
        /// File to upload
        file: PathBuf,
        /// Name to store the file under (default: the file's name)
        #[arg(long)]
        name: Option<String>,
        /// MIME type (default: guessed from the extension)
        #[arg(long)]
        mime_type: Option<String>,
        /// Display path to file it under
        #[arg(long, default_value = "/")]
        path: String,
    },
    /// Download a file from the pool
    Download {
        /// File ID
        id: i64,
        /// Where to write the file (default: its name, in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List files
    List {
        #[command(flatten)]
        filter: ListArgs,
    },
    /// Delete a file and its remote objects for good
    Delete {
        /// File ID
        id: i64,
    },
    /// Move a file to the trash
    Trash {
        /// File ID
        id: i64,
    },
    /// Take a file back out of the trash
    Restore {
        /// File ID
        id: i64,
    },
    /// Delete every file in the trash for good
    Purge,
}

#[derive(Subcommand)]
enum AccountCommands {
    /// Connect a local directory as a storage account
    ConnectLocal {
        /// Account label
        label: String,
        /// Directory to store objects in
        #[arg(long)]
        root: PathBuf,
        /// Capacity to advertise (bytes, or with a K/M/G/T suffix)
        #[arg(long, value_parser = format::parse_size)]
        capacity: u64,
    },
    /// Connect a Google Drive account using tokens obtained elsewhere
    ConnectDrive {
        /// Account label (usually the account's email address)
        label: String,
        #[arg(long, env = "COLOSSUS_DRIVE_ACCESS_TOKEN")]
        access_token: String,
        #[arg(long, env = "COLOSSUS_DRIVE_REFRESH_TOKEN")]
        refresh_token: Option<String>,
        /// Seconds until the access token expires
        #[arg(long)]
        expires_in: Option<i64>,
        /// Drive folder ID to store objects in (default: My Drive)
        #[arg(long)]
        folder: Option<String>,
    },
    /// List connected accounts with their quota
    List,
    /// Disconnect an account that no longer holds any files
    Disconnect {
        /// Account ID
        id: i64,
    },
}

#[derive(Args)]
struct ListArgs {
    /// Only files whose name contains this (case-insensitive)
    #[arg(long)]
    search: Option<String>,
    /// Only files filed under exactly this display path
    #[arg(long)]
    path: Option<String>,
    /// List the trash instead
    #[arg(long, default_value_t = false)]
    trash: bool,
}

/// Everything a command needs.
pub(crate) struct Context {
    pub(crate) user: UserId,
    pub(crate) repo: Repository,
    pub(crate) pool: Pool,
}

async fn context(cli: &Cli) -> Result<(Context, Database)> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    tracing::debug!(database = %config.database.display(), drive = config.google.is_some(), "Loaded configuration");
    let db = Database::connect(&config.database).await.or_raise(|| ErrorKind::Database)?;
    let repo = Repository::from(&db);
    let oauth = config.google.map(|google| OAuthClient {
        client_id: google.client_id,
        client_secret: google.client_secret,
        token_url: google.token_url,
    });
    let options = PoolOptions {
        refresh_margin: time::Duration::seconds(i64::try_from(config.tokens.refresh_margin_secs).unwrap_or(i64::MAX)),
        max_file_size: config.upload.max_file_size,
    };
    let pool = Pool::new(
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(DefaultRefresher::new(oauth)),
        Arc::new(DefaultConnector::new()),
        options,
    );
    Ok((Context { user: UserId(cli.user), repo, pool }, db))
}

async fn run(cli: Cli) -> Result<()> {
    let (ctx, db) = context(&cli).await?;
    let result = match cli.command {
        Commands::Account { command } => match command {
            AccountCommands::ConnectLocal { label, root, capacity } => {
                commands::connect_local(&ctx, label, root, capacity).await
            },
            AccountCommands::ConnectDrive { label, access_token, refresh_token, expires_in, folder } => {
                commands::connect_drive(&ctx, label, access_token, refresh_token, expires_in, folder).await
            },
            AccountCommands::List => commands::list_accounts(&ctx).await,
            AccountCommands::Disconnect { id } => commands::disconnect(&ctx, id).await,
        },
        Commands::Upload { file, name, mime_type, path } => commands::upload(&ctx, file, name, mime_type, path).await,
        Commands::Download { id, output } => commands::download(&ctx, id, output).await,
        Commands::List { filter } => commands::list_files(&ctx, filter.search, filter.path, filter.trash).await,
        Commands::Delete { id } => commands::delete(&ctx, id).await,
        Commands::Trash { id } => commands::trash(&ctx, id).await,
        Commands::Restore { id } => commands::restore(&ctx, id).await,
        Commands::Purge => commands::purge(&ctx).await,
    };
    db.close().await;
    result
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:?}");
            ExitCode::FAILURE
        },
    }
}
