//! Last-resort storage for types with no built-in mapping.

use crate::value::{CustomType, CustomValue};

/// Converts values of application types to and from raw bytes.
///
/// Consulted only after every built-in rule has failed to match.
pub trait BlobSerializer {
    fn can_handle(&self, ty: CustomType) -> bool;

    fn serialize(&self, value: &CustomValue) -> anyhow::Result<Vec<u8>>;

    fn deserialize(&self, ty: CustomType, bytes: &[u8]) -> anyhow::Result<CustomValue>;
}
