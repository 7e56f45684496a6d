//! Value types shared by every store implementation.

use std::fmt;

/// Opaque version token issued by the store.
///
/// Callers only ever compare it for equality by handing it back to
/// `compare_and_swap`; its internal format belongs to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(String);

impl Version {
    /// Wrap a backend-specific version string.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A record payload together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    /// Serialized record.
    pub value: String,
    /// Version to present on the next conditional update.
    pub version: Version,
}

/// Store operation kinds, used to target fault injection and to label
/// recorded writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `get`
    Get,
    /// `create`
    Create,
    /// `compare_and_swap`
    CompareAndSwap,
    /// Unconditional operator overwrite. Never subject to fault injection.
    Put,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreOp::Get => f.write_str("get"),
            StoreOp::Create => f.write_str("create"),
            StoreOp::CompareAndSwap => f.write_str("compare_and_swap"),
            StoreOp::Put => f.write_str("put"),
        }
    }
}
