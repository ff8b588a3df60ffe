//! Provider models.

/// Capacity snapshot for one account, as reported by its provider.
///
/// Only valid at the moment it was fetched: other clients may be writing to
/// the same account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    /// Total capacity in bytes
    pub total: u64,
    /// Bytes in use
    pub used: u64,
}
impl Quota {
    pub fn new(total: u64, used: u64) -> Self {
        Self { total, used }
    }

    /// Bytes still available. Providers occasionally report usage above the
    /// limit (grandfathered plans, shared drives); that is zero free, not an
    /// underflow.
    pub fn free(&self) -> u64 {
        self.total.saturating_sub(self.used)
    }
}

/// An object stored on a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Provider-assigned identifier, opaque to everything but the provider
    pub id: String,
    /// Size in bytes as acknowledged by the provider
    pub size: u64,
}
impl RemoteObject {
    pub fn new(id: impl Into<String>, size: u64) -> Self {
        Self { id: id.into(), size }
    }
}
