use std::iter::FromIterator;

use anyhow::{bail, Context, Result};
use prost::Message;
use sled::IVec;

use crate::error::{ShutdownError, ShutdownResult};

/// The separator byte placed between variable-length key segments.
///
/// Topic names never contain a NUL byte and group IDs holding one are rejected before they are
/// stored, so this keeps key prefixes unambiguous.
const KEY_SEPARATOR: u8 = 0;

/// Encode the key of a partition's state record: `{topic}\0{partition:be}`.
///
/// Big-endian partition encoding keeps the partitions of a topic in numeric order under
/// lexicographical key sorting.
pub fn encode_partition_key(topic: &str, partition: u32) -> IVec {
    ivec_from_iter(
        topic
            .as_bytes()
            .iter()
            .copied()
            .chain(std::iter::once(KEY_SEPARATOR))
            .chain(encode_u32(partition)),
    )
}

/// Encode the key of a committed group offset: `{group}\0{topic}\0{partition:be}`.
pub fn encode_group_offset_key(group: &str, topic: &str, partition: u32) -> IVec {
    ivec_from_iter(
        group
            .as_bytes()
            .iter()
            .copied()
            .chain(std::iter::once(KEY_SEPARATOR))
            .chain(topic.as_bytes().iter().copied())
            .chain(std::iter::once(KEY_SEPARATOR))
            .chain(encode_u32(partition)),
    )
}

/// Encode the key prefix which covers all committed offsets of a group for a topic.
pub fn encode_group_topic_prefix(group: &str, topic: &str) -> IVec {
    ivec_from_iter(
        group
            .as_bytes()
            .iter()
            .copied()
            .chain(std::iter::once(KEY_SEPARATOR))
            .chain(topic.as_bytes().iter().copied())
            .chain(std::iter::once(KEY_SEPARATOR)),
    )
}

/// Encode the given u32 as an array of big-endian bytes.
pub fn encode_u32(val: u32) -> [u8; 4] {
    val.to_be_bytes()
}

/// Decode the given bytes as a u32.
pub fn decode_u32(val: &[u8]) -> Result<u32> {
    match val {
        [b0, b1, b2, b3] => Ok(u32::from_be_bytes([*b0, *b1, *b2, *b3])),
        _ => bail!("invalid byte array given to decode as u32, invalid len {} needed 4", val.len()),
    }
}

/// Encode the given model into a bytes vec.
pub fn encode_model<M: Message>(model: &M) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(model.encoded_len());
    model.encode(&mut buf).context("error serializing data model")?;
    Ok(buf)
}

/// Decode an object from the given buffer.
pub fn decode_model<M: Message + Default>(data: &[u8]) -> Result<M> {
    M::decode(data).context("error decoding object from storage")
}

/// Encode the given bytes iterator as an IVec.
pub fn ivec_from_iter<T: IntoIterator<Item = u8>>(data: T) -> IVec {
    IVec::from_iter(data)
}

/// The current time as milliseconds since the unix epoch.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Spawn a blocking function, returning a ShutdownError if anything goes wrong related to
/// spawning & joining.
pub async fn spawn_blocking<F, R>(f: F) -> ShutdownResult<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| ShutdownError::from(anyhow::Error::from(err)))
}
