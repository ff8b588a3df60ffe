mod account;
mod file;
mod ids;

pub use self::account::{Account, NewAccount, ProviderKind};
pub(crate) use self::account::AccountRow;
pub use self::file::{Chunk, FileFilter, FileRecord, Layout, NewFile};
pub(crate) use self::file::{ChunkRow, FileRow};
pub use self::ids::{AccountId, FileId, UserId};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use time::UtcDateTime;

pub(crate) fn to_db_int(value: u64, field: &'static str) -> Result<i64> {
    i64::try_from(value).or_raise(|| ErrorKind::InvalidData(field))
}

pub(crate) fn from_db_int(value: i64, field: &'static str) -> Result<u64> {
    u64::try_from(value).or_raise(|| ErrorKind::InvalidData(field))
}

pub(crate) fn from_timestamp(value: i64, field: &'static str) -> Result<UtcDateTime> {
    UtcDateTime::from_unix_timestamp(value).or_raise(|| ErrorKind::InvalidData(field))
}
