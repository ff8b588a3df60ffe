//! Remote storage providers.
//!
//! A provider is one connected storage account: it reports its quota, stores
//! opaque objects, streams them back and deletes them. Everything above this
//! crate treats providers as interchangeable [`ProviderHandle`]s.

pub mod error;
mod models;
mod name;
pub mod provider;

pub use crate::models::{Quota, RemoteObject};
pub use crate::name::validate as validate_object_name;
pub use crate::provider::{ByteStream, RemoteProvider};
use std::sync::Arc;

pub type ProviderHandle = Arc<dyn RemoteProvider + Send + Sync>;
