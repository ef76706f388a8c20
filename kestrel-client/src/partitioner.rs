//! Key-based partition selection.

use crate::error::{ClientError, ClientResult, ErrorKind};

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// The 32-bit FNV-1a hash of the given bytes.
pub fn fnv1a_32(data: &[u8]) -> u32 {
    data.iter().fold(FNV_OFFSET_BASIS, |hash, byte| (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME))
}

/// Select the partition of a key: `fnv1a_32(key) mod partition_count`.
///
/// Identical keys always map to the same partition for a given partition count.
pub fn partition_for_key(key: &[u8], partition_count: u32) -> ClientResult<u32> {
    if partition_count == 0 {
        return Err(ClientError::new(ErrorKind::InvalidInput, "partition count must be positive"));
    }
    Ok(fnv1a_32(key) % partition_count)
}
