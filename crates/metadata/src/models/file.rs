use crate::error::{Error, ErrorKind, Result};
use crate::models::{AccountId, FileId, UserId, from_db_int, from_timestamp, to_db_int};
use time::UtcDateTime;

/// One contiguous byte range of a file, stored as one remote object.
///
/// `byte_end` is inclusive, so `size == byte_end - byte_start + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: u32,
    pub account: AccountId,
    pub remote_id: String,
    pub size: u64,
    pub byte_start: u64,
    pub byte_end: u64,
}

impl Chunk {
    pub fn new(index: u32, account: AccountId, remote_id: impl Into<String>, byte_start: u64, byte_end: u64) -> Self {
        Self {
            index,
            account,
            remote_id: remote_id.into(),
            size: byte_end - byte_start + 1,
            byte_start,
            byte_end,
        }
    }
}

/// Where the bytes of a file live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// The whole file is one object on one account.
    Single { account: AccountId, remote_id: String },
    /// The file is split across accounts, ordered by chunk index.
    Chunked(Vec<Chunk>),
}

impl Layout {
    pub fn is_chunked(&self) -> bool {
        matches!(self, Self::Chunked(_))
    }

    /// Every `(account, remote id)` pair holding part of the file, in byte order.
    pub fn objects(&self) -> Vec<(AccountId, &str)> {
        match self {
            Self::Single { account, remote_id } => vec![(*account, remote_id.as_str())],
            Self::Chunked(chunks) => {
                let mut chunks: Vec<&Chunk> = chunks.iter().collect();
                chunks.sort_by_key(|chunk| chunk.index);
                chunks.into_iter().map(|chunk| (chunk.account, chunk.remote_id.as_str())).collect()
            },
        }
    }

    /// Check that the layout covers `[0, total_size)` exactly.
    ///
    /// Chunks may be in any order; they must have contiguous indices starting
    /// at zero, each must start the byte after its predecessor ends, the sizes
    /// must agree with the ranges and the last chunk must end on the last byte.
    pub fn validate(&self, total_size: u64) -> Result<()> {
        let Self::Chunked(chunks) = self else {
            return Ok(());
        };
        if chunks.is_empty() {
            exn::bail!(ErrorKind::InvalidLayout("no chunks".to_string()));
        }
        let mut sorted: Vec<&Chunk> = chunks.iter().collect();
        sorted.sort_by_key(|chunk| chunk.index);
        let mut next_start = 0u64;
        for (position, chunk) in sorted.iter().enumerate() {
            if chunk.index as usize != position {
                exn::bail!(ErrorKind::InvalidLayout(format!("expected chunk {position}, found chunk {}", chunk.index)));
            }
            if chunk.byte_start != next_start {
                exn::bail!(ErrorKind::InvalidLayout(format!(
                    "chunk {} starts at byte {}, expected {next_start}",
                    chunk.index, chunk.byte_start
                )));
            }
            if chunk.byte_end < chunk.byte_start || chunk.size != chunk.byte_end - chunk.byte_start + 1 {
                exn::bail!(ErrorKind::InvalidLayout(format!(
                    "chunk {} has size {} but covers bytes {}..={}",
                    chunk.index, chunk.size, chunk.byte_start, chunk.byte_end
                )));
            }
            next_start = chunk.byte_end + 1;
        }
        if next_start != total_size {
            exn::bail!(ErrorKind::InvalidLayout(format!(
                "chunks cover {next_start} bytes of a {total_size} byte file"
            )));
        }
        Ok(())
    }
}

/// Persisted metadata of one pooled file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: FileId,
    pub owner: UserId,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    /// Normalised display path of the containing folder (`/` for the root).
    pub path: String,
    /// Soft-delete flag ("in the trash").
    pub deleted: bool,
    pub created_at: UtcDateTime,
    /// BLAKE3 hash of the whole file, hex encoded.
    pub content_hash: Option<String>,
    pub layout: Layout,
}

/// A file whose bytes have all been placed and which is ready to persist.
#[derive(Debug, Clone)]
pub struct NewFile {
    pub owner: UserId,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
    pub path: String,
    pub content_hash: Option<String>,
    pub layout: Layout,
}

/// Criteria for [`find()`](crate::FileStore::find).
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    /// Case-insensitive substring of the file name.
    pub search: Option<String>,
    /// Exact display path.
    pub path: Option<String>,
    /// List trashed files instead of live ones.
    pub deleted: bool,
}

impl FileFilter {
    /// The search term as a `LIKE` operand with wildcards escaped.
    pub(crate) fn like_term(&self) -> Option<String> {
        self.search.as_ref().filter(|s| !s.is_empty()).map(|search| {
            let mut escaped = String::with_capacity(search.len());
            for c in search.chars() {
                if matches!(c, '%' | '_' | '\\') {
                    escaped.push('\\');
                }
                escaped.push(c);
            }
            escaped
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct FileRow {
    pub(crate) id: i64,
    owner: i64,
    name: String,
    mime_type: String,
    size: i64,
    path: String,
    pub(crate) chunked: bool,
    deleted: bool,
    content_hash: Option<String>,
    account_id: Option<i64>,
    remote_id: Option<String>,
    created_at: i64,
}

#[derive(sqlx::FromRow)]
pub(crate) struct ChunkRow {
    chunk_index: i64,
    account_id: i64,
    remote_id: String,
    size: i64,
    byte_start: i64,
    byte_end: i64,
}

impl TryFrom<ChunkRow> for Chunk {
    type Error = Error;
    fn try_from(row: ChunkRow) -> Result<Self> {
        Ok(Self {
            index: u32::try_from(row.chunk_index).map_err(|_| ErrorKind::InvalidData("chunk index"))?,
            account: AccountId(row.account_id),
            remote_id: row.remote_id,
            size: from_db_int(row.size, "chunk size")?,
            byte_start: from_db_int(row.byte_start, "chunk start")?,
            byte_end: from_db_int(row.byte_end, "chunk end")?,
        })
    }
}

impl Chunk {
    /// Column values in `insert_chunk.sql` order, after the file id.
    pub(crate) fn columns(&self) -> Result<(i64, i64, &str, i64, i64, i64)> {
        Ok((
            i64::from(self.index),
            self.account.0,
            self.remote_id.as_str(),
            to_db_int(self.size, "chunk size")?,
            to_db_int(self.byte_start, "chunk start")?,
            to_db_int(self.byte_end, "chunk end")?,
        ))
    }
}

impl FileRow {
    /// Assemble the model; `chunks` is ignored for single-object files.
    pub(crate) fn into_record(self, chunks: Vec<ChunkRow>) -> Result<FileRecord> {
        let layout = if self.chunked {
            Layout::Chunked(chunks.into_iter().map(Chunk::try_from).collect::<Result<_>>()?)
        } else {
            match (self.account_id, self.remote_id) {
                (Some(account), Some(remote_id)) => Layout::Single { account: AccountId(account), remote_id },
                _ => exn::bail!(ErrorKind::InvalidData("single object location")),
            }
        };
        Ok(FileRecord {
            id: FileId(self.id),
            owner: UserId(self.owner),
            name: self.name,
            mime_type: self.mime_type,
            size: from_db_int(self.size, "file size")?,
            path: self.path,
            deleted: self.deleted,
            created_at: from_timestamp(self.created_at, "creation date")?,
            content_hash: self.content_hash,
            layout,
        })
    }
}
