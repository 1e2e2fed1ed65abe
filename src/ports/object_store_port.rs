//! Object storage port trait.

use crate::domain::error::EtlError;
use std::path::Path;

/// Single-attempt upload; errors propagate to the caller.
pub trait ObjectStorePort {
    fn upload(&self, local_file: &Path, remote_key: &str) -> Result<(), EtlError>;
}
