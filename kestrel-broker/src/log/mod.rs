//! Partition log storage.
//!
//! A partition's log is an ordered sequence of segments stored in a directory named
//! `{topic}-{partition}` under the data root. Only the last segment is writable; when an append
//! would push it past its capacity a new segment is created whose base offset is the next offset
//! to be assigned, and all prior segments become immutable.
//!
//! ## Concurrency
//! Appends are serialized by a per-log writer lock. The writer lock guard is moved into the
//! blocking task which performs the write, so a cancelled caller can never release the lock while
//! a write is still in progress. Reads never take the writer lock: they are bounded by the high
//! watermark, which is only advanced once a batch is fully written, so readers always observe a
//! consistent prefix of the log.

#[cfg(test)]
mod mod_test;
mod segment;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use tokio::sync::Mutex;

use crate::error::{AppError, ERR_SHUTTING_DOWN};
use crate::utils;
use segment::Segment;

pub(crate) const METRIC_SEGMENT_ROTATIONS: &str = "kestrel_log_segment_rotations";
pub(crate) const METRIC_RETENTION_DELETIONS: &str = "kestrel_log_retention_deleted_segments";

/// Register the metrics of the log subsystem.
pub fn register_metrics() {
    metrics::register_counter!(METRIC_SEGMENT_ROTATIONS, metrics::Unit::Count, "the number of log segment rotations");
    metrics::register_counter!(METRIC_RETENTION_DELETIONS, metrics::Unit::Count, "the number of log segments deleted by retention");
}

/// A record to be appended to a log.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// A record read back from a log along with its assigned offset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoredRecord {
    pub offset: i64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// A durable, append-only log of records for a single partition.
#[derive(Clone)]
pub struct SegmentedLog {
    inner: Arc<LogInner>,
    /// The writer lock serializing appends, rotations and segment deletion.
    writer: Arc<Mutex<()>>,
}

struct LogInner {
    topic: String,
    partition: u32,
    /// The directory holding this log's segments.
    dir: PathBuf,
    /// The byte capacity of each segment.
    capacity: u64,
    /// All live segments ordered by base offset; the last one is writable.
    segments: ArcSwap<Vec<Arc<Segment>>>,
    /// The next offset to be assigned.
    high_watermark: AtomicI64,
    /// Set once the log has been closed.
    closed: AtomicBool,
}

impl SegmentedLog {
    /// Open the log of the given partition, recovering any existing segments.
    #[tracing::instrument(level = "debug", skip(data_root, capacity))]
    pub async fn open(data_root: &Path, topic: &str, partition: u32, capacity: u64) -> Result<Self> {
        let dir = partition_dir(data_root, topic, partition);
        let (topic, topic_inner) = (topic.to_string(), topic.to_string());
        let inner = utils::spawn_blocking(move || LogInner::recover(topic_inner, partition, dir, capacity))
            .await?
            .map_err(|err| AppError::IoFailure(format!("error opening log for {}/{}: {:#}", topic, partition, err)))?;
        let log = Self {
            inner: Arc::new(inner),
            writer: Arc::new(Mutex::new(())),
        };
        tracing::debug!(
            high_watermark = log.high_watermark(),
            earliest_offset = log.earliest_offset(),
            segments = log.segment_count(),
            "partition log recovered"
        );
        Ok(log)
    }

    /// The topic of this log.
    pub fn topic(&self) -> &str {
        &self.inner.topic
    }

    /// The partition of this log.
    pub fn partition(&self) -> u32 {
        self.inner.partition
    }

    /// The next offset that will be assigned.
    pub fn high_watermark(&self) -> i64 {
        self.inner.high_watermark.load(Ordering::Acquire)
    }

    /// The base offset of the first retained segment.
    pub fn earliest_offset(&self) -> i64 {
        self.inner.segments.load().first().map(|seg| seg.base_offset()).unwrap_or(0)
    }

    /// The number of segments currently making up this log.
    pub fn segment_count(&self) -> usize {
        self.inner.segments.load().len()
    }

    /// Append the given records, returning the offset assigned to the first.
    ///
    /// Offsets are assigned in order to all records of the call; either all records are appended
    /// or none are. When `sync` is true, this call returns only once the data is on disk.
    #[tracing::instrument(level = "trace", skip(self, records), fields(topic = %self.inner.topic, partition = self.inner.partition))]
    pub async fn append(&self, records: Vec<Record>, sync: bool) -> Result<i64> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(AppError::Unavailable(ERR_SHUTTING_DOWN.into()).into());
        }
        let guard = self.writer.clone().lock_owned().await;
        let inner = self.inner.clone();
        utils::spawn_blocking(move || -> Result<i64> {
            let _guard = guard;
            if inner.closed.load(Ordering::Acquire) {
                return Err(AppError::Unavailable(ERR_SHUTTING_DOWN.into()).into());
            }
            inner
                .append_blocking(records, sync)
                .map_err(|err| anyhow::Error::from(AppError::IoFailure(format!("{:#}", err))))
        })
        .await?
    }

    /// Read up to `max_records` records starting at `start_offset`.
    ///
    /// Fails with `OffsetOutOfRange` if the start offset is negative or past the high watermark.
    /// A start offset equal to the high watermark yields no records. A start offset below the
    /// earliest retained offset reads from the earliest retained offset.
    #[tracing::instrument(level = "trace", skip(self), fields(topic = %self.inner.topic, partition = self.inner.partition))]
    pub async fn read(&self, start_offset: i64, max_records: usize) -> Result<Vec<StoredRecord>> {
        let high_watermark = self.high_watermark();
        if start_offset < 0 || start_offset > high_watermark {
            return Err(AppError::OffsetOutOfRange {
                offset: start_offset,
                high_watermark,
            }
            .into());
        }
        if start_offset == high_watermark || max_records == 0 {
            return Ok(Vec::new());
        }
        let inner = self.inner.clone();
        utils::spawn_blocking(move || -> Result<Vec<StoredRecord>> {
            inner
                .read_blocking(start_offset, max_records, high_watermark)
                .map_err(|err| anyhow::Error::from(AppError::IoFailure(format!("{:#}", err))))
        })
        .await?
    }

    /// Flush and close this log; subsequent appends fail as unavailable.
    ///
    /// Closing an already closed log is a no-op.
    pub async fn close(&self) -> Result<()> {
        let guard = self.writer.clone().lock_owned().await;
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let inner = self.inner.clone();
        utils::spawn_blocking(move || {
            let _guard = guard;
            inner.sync_all()
        })
        .await?
    }

    /// Delete sealed segments whose data was last written more than `max_age` ago.
    ///
    /// Only a contiguous run of segments from the front of the log is deleted, and the active
    /// segment is never deleted. Returns the number of deleted segments.
    #[tracing::instrument(level = "debug", skip(self), fields(topic = %self.inner.topic, partition = self.inner.partition))]
    pub async fn enforce_retention(&self, max_age: Duration) -> Result<usize> {
        let guard = self.writer.clone().lock_owned().await;
        let inner = self.inner.clone();
        utils::spawn_blocking(move || {
            let _guard = guard;
            let cutoff = SystemTime::now().checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);
            inner.delete_sealed_before(cutoff)
        })
        .await?
    }
}

impl LogInner {
    /// Load all segments of the log from disk, creating the first segment if needed.
    fn recover(topic: String, partition: u32, dir: PathBuf, capacity: u64) -> Result<Self> {
        std::fs::create_dir_all(&dir).with_context(|| format!("error creating log dir {:?}", dir))?;
        let mut bases = Vec::new();
        for entry in std::fs::read_dir(&dir).with_context(|| format!("error reading log dir {:?}", dir))? {
            let entry = entry.with_context(|| format!("error reading entry of log dir {:?}", dir))?;
            if let Some(base) = segment::parse_base_offset(&entry.path()) {
                bases.push(base);
            }
        }
        bases.sort_unstable();

        let mut segments: Vec<Arc<Segment>> = Vec::with_capacity(bases.len().max(1));
        for base in bases {
            // Segments must be contiguous; anything following a gap cannot be served without
            // breaking offset continuity, so it is discarded.
            if let Some(prev) = segments.last() {
                if prev.next_offset() != base {
                    tracing::warn!(?dir, expected = prev.next_offset(), found = base, "discarding non-contiguous log segment");
                    let (data_path, index_path) = segment::segment_paths(&dir, base);
                    let _ = std::fs::remove_file(index_path);
                    std::fs::remove_file(&data_path).with_context(|| format!("error removing segment {:?}", data_path))?;
                    continue;
                }
            }
            segments.push(Arc::new(Segment::open(&dir, base, capacity)?));
        }
        if segments.is_empty() {
            segments.push(Arc::new(Segment::create(&dir, 0, capacity)?));
        }

        let high_watermark = segments.last().map(|seg| seg.next_offset()).unwrap_or(0);
        Ok(Self {
            topic,
            partition,
            dir,
            capacity,
            segments: ArcSwap::from_pointee(segments),
            high_watermark: AtomicI64::new(high_watermark),
            closed: AtomicBool::new(false),
        })
    }

    /// Append a batch of records atomically; must be called while holding the writer lock.
    fn append_blocking(&self, records: Vec<Record>, sync: bool) -> Result<i64> {
        let first_offset = self.high_watermark.load(Ordering::Acquire);
        if records.is_empty() {
            return Ok(first_offset);
        }
        let segments = self.segments.load_full();
        let active = segments.last().cloned().context("log has no active segment")?;
        let (rollback_size, rollback_count) = (active.size(), active.record_count());

        let mut created: Vec<Arc<Segment>> = Vec::new();
        let res = self.write_batch(&active, &records, first_offset, &mut created, sync);
        if let Err(err) = res {
            if let Err(rollback_err) = active.truncate(rollback_size, rollback_count) {
                tracing::error!(error = ?rollback_err, "error rolling back failed append");
            }
            for seg in created {
                if let Err(rm_err) = seg.remove_files() {
                    tracing::error!(error = ?rm_err, "error removing segment of failed append");
                }
            }
            return Err(err);
        }

        let next_offset = first_offset + records.len() as i64;
        if !created.is_empty() {
            metrics::counter!(METRIC_SEGMENT_ROTATIONS, created.len() as u64);
            let mut updated = Vec::with_capacity(segments.len() + created.len());
            updated.extend(segments.iter().cloned());
            updated.extend(created);
            self.segments.store(Arc::new(updated));
        }
        // Publish the new records only once every byte of the batch is written.
        self.high_watermark.store(next_offset, Ordering::Release);
        Ok(first_offset)
    }

    fn write_batch(&self, active: &Arc<Segment>, records: &[Record], first_offset: i64, created: &mut Vec<Arc<Segment>>, sync: bool) -> Result<()> {
        let mut current = active.clone();
        let (mut buf, mut positions) = (Vec::new(), Vec::new());
        for (idx, record) in records.iter().enumerate() {
            let offset = first_offset + idx as i64;
            let frame_len = segment::frame_len(record);
            if !current.has_room(buf.len() as u64, frame_len) {
                current.write_frames(&buf, &positions)?;
                // A sealed segment is never written again, so it is synced whatever the acks level.
                current.sync()?;
                buf.clear();
                positions.clear();
                let next = Arc::new(Segment::create(&self.dir, offset, self.capacity)?);
                tracing::debug!(topic = %self.topic, partition = self.partition, base_offset = offset, "rotated log segment");
                created.push(next.clone());
                current = next;
            }
            let position = current.size() + buf.len() as u64;
            positions.push(u32::try_from(position).context("segment position exceeds u32 range")?);
            segment::encode_frame(offset, record, &mut buf);
        }
        current.write_frames(&buf, &positions)?;

        if sync {
            current.sync()?;
        }
        Ok(())
    }

    fn read_blocking(&self, start_offset: i64, max_records: usize, high_watermark: i64) -> Result<Vec<StoredRecord>> {
        let segments = self.segments.load_full();
        let earliest = segments.first().map(|seg| seg.base_offset()).unwrap_or(0);
        let mut offset = start_offset.max(earliest);
        let limit = std::cmp::min(max_records as i64, high_watermark - offset).max(0) as usize;
        let mut out = Vec::with_capacity(limit);

        // Locate the segment holding the start offset.
        let idx = segments.partition_point(|seg| seg.base_offset() <= offset).saturating_sub(1);
        for seg in segments[idx..].iter() {
            if out.len() >= limit {
                break;
            }
            let read = seg.read(offset, limit - out.len(), &mut out)?;
            offset += read as i64;
        }
        Ok(out)
    }

    /// Sync every segment holding unsynced writes.
    fn sync_all(&self) -> Result<()> {
        for seg in self.segments.load().iter().filter(|seg| seg.is_dirty()) {
            seg.sync()?;
        }
        Ok(())
    }

    fn delete_sealed_before(&self, cutoff: SystemTime) -> Result<usize> {
        let segments = self.segments.load_full();
        let sealed = segments.len().saturating_sub(1);
        let mut expired = 0;
        for seg in segments[..sealed].iter() {
            if seg.modified()? >= cutoff {
                break;
            }
            expired += 1;
        }
        if expired == 0 {
            return Ok(0);
        }

        self.segments.store(Arc::new(segments[expired..].to_vec()));
        for seg in segments[..expired].iter() {
            seg.remove_files()?;
            tracing::debug!(topic = %self.topic, partition = self.partition, base_offset = seg.base_offset(), "deleted expired log segment");
        }
        metrics::counter!(METRIC_RETENTION_DELETIONS, expired as u64);
        Ok(expired)
    }
}

/// The directory of a partition's log under the given data root.
pub fn partition_dir(data_root: &Path, topic: &str, partition: u32) -> PathBuf {
    data_root.join(format!("{}-{}", topic, partition))
}
