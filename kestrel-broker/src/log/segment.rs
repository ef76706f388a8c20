//! A single bounded segment of a partition log.
//!
//! Each segment is a pair of files named by the segment's base offset:
//!
//! - `{base:020}.log` holds framed records: `[len u32][checksum u64][body]`, where the body is
//!   `[offset i64][key_len u32][key][value]` and the checksum is the seahash of the body.
//! - `{base:020}.index` holds one `[relative_offset u32][position u32]` entry per record.
//!
//! All integers are little-endian. All methods here block on file I/O and must be called from a
//! blocking context.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;

use anyhow::{bail, ensure, Context, Result};

use crate::log::{Record, StoredRecord};

/// The length of a frame header: body length plus checksum.
pub const FRAME_HEADER_LEN: u64 = 12;
/// The length of the fixed part of a frame body: offset plus key length.
const BODY_FIXED_LEN: usize = 12;
/// The length of an index entry.
const INDEX_ENTRY_LEN: u64 = 8;

pub const DATA_FILE_EXT: &str = "log";
pub const INDEX_FILE_EXT: &str = "index";

/// A segment of a partition log.
pub struct Segment {
    /// The offset of the first record of this segment.
    base_offset: i64,
    /// The byte capacity of this segment.
    capacity: u64,
    data_path: PathBuf,
    index_path: PathBuf,
    data: File,
    index: File,
    /// The byte position of each record in the data file, by relative offset.
    positions: RwLock<Vec<u32>>,
    /// The number of bytes written to the data file.
    size: AtomicU64,
    /// Set while this segment holds writes which have not been synced to disk.
    dirty: AtomicBool,
}

impl Segment {
    /// Create a new empty segment in the given directory.
    pub fn create(dir: &Path, base_offset: i64, capacity: u64) -> Result<Self> {
        let (data_path, index_path) = segment_paths(dir, base_offset);
        let data = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&data_path)
            .with_context(|| format!("error creating segment data file {:?}", data_path))?;
        let index = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&index_path)
            .with_context(|| format!("error creating segment index file {:?}", index_path))?;
        tracing::debug!(?data_path, base_offset, "created new segment");
        Ok(Self {
            base_offset,
            capacity,
            data_path,
            index_path,
            data,
            index,
            positions: RwLock::new(Vec::new()),
            size: AtomicU64::new(0),
            dirty: AtomicBool::new(false),
        })
    }

    /// Open an existing segment, recovering its index and discarding any torn trailing frame.
    pub fn open(dir: &Path, base_offset: i64, capacity: u64) -> Result<Self> {
        let (data_path, index_path) = segment_paths(dir, base_offset);
        let data = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&data_path)
            .with_context(|| format!("error opening segment data file {:?}", data_path))?;
        let index = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&index_path)
            .with_context(|| format!("error opening segment index file {:?}", index_path))?;
        let segment = Self {
            base_offset,
            capacity,
            data_path,
            index_path,
            data,
            index,
            positions: RwLock::new(Vec::new()),
            size: AtomicU64::new(0),
            dirty: AtomicBool::new(false),
        };
        segment.recover()?;
        Ok(segment)
    }

    /// The offset of the first record of this segment.
    pub fn base_offset(&self) -> i64 {
        self.base_offset
    }

    /// The number of bytes written to this segment.
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    /// The number of records held by this segment.
    pub fn record_count(&self) -> usize {
        self.positions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// The offset which will be assigned to the next record appended to this segment.
    pub fn next_offset(&self) -> i64 {
        self.base_offset + self.record_count() as i64
    }

    /// Check if a frame of the given length fits after `pending` not yet written bytes.
    ///
    /// An empty segment always accepts a frame, so that records larger than the segment
    /// capacity are still writable.
    pub fn has_room(&self, pending: u64, frame_len: u64) -> bool {
        let used = self.size() + pending;
        used == 0 || used + frame_len <= self.capacity
    }

    /// The last modification time of this segment's data file.
    pub fn modified(&self) -> Result<SystemTime> {
        self.data
            .metadata()
            .and_then(|meta| meta.modified())
            .with_context(|| format!("error reading mtime of {:?}", self.data_path))
    }

    /// Write a buffer of encoded frames to the end of this segment.
    ///
    /// `positions` holds the absolute data file position of each frame in `frames`, in order.
    pub fn write_frames(&self, frames: &[u8], positions: &[u32]) -> Result<()> {
        if frames.is_empty() {
            return Ok(());
        }
        let size = self.size();
        let count = self.record_count();
        self.data
            .write_all_at(frames, size)
            .with_context(|| format!("error writing to segment {:?}", self.data_path))?;

        let mut entries = Vec::with_capacity(positions.len() * INDEX_ENTRY_LEN as usize);
        for (idx, pos) in positions.iter().enumerate() {
            encode_index_entry((count + idx) as u32, *pos, &mut entries);
        }
        self.index
            .write_all_at(&entries, count as u64 * INDEX_ENTRY_LEN)
            .with_context(|| format!("error writing to segment index {:?}", self.index_path))?;

        self.positions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(positions);
        self.size.store(size + frames.len() as u64, Ordering::Release);
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Truncate this segment back to the given size and record count.
    pub fn truncate(&self, size: u64, record_count: usize) -> Result<()> {
        self.data
            .set_len(size)
            .with_context(|| format!("error truncating segment {:?}", self.data_path))?;
        self.index
            .set_len(record_count as u64 * INDEX_ENTRY_LEN)
            .with_context(|| format!("error truncating segment index {:?}", self.index_path))?;
        self.positions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .truncate(record_count);
        self.size.store(size, Ordering::Release);
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Read up to `count` records starting at the given absolute offset, appending them to `out`.
    ///
    /// Returns the number of records read.
    pub fn read(&self, offset: i64, count: usize, out: &mut Vec<StoredRecord>) -> Result<usize> {
        if offset < self.base_offset || count == 0 {
            return Ok(0);
        }
        let rel = (offset - self.base_offset) as usize;
        let (start, end, count) = {
            let positions = self.positions.read().unwrap_or_else(PoisonError::into_inner);
            if rel >= positions.len() {
                return Ok(0);
            }
            let last = std::cmp::min(rel + count, positions.len());
            let end = if last < positions.len() { positions[last] as u64 } else { self.size() };
            (positions[rel] as u64, end, last - rel)
        };
        ensure!(end >= start, "corrupt index in segment {:?}, end {} before start {}", self.data_path, end, start);

        let mut buf = vec![0u8; (end - start) as usize];
        self.data
            .read_exact_at(&mut buf, start)
            .with_context(|| format!("error reading from segment {:?}", self.data_path))?;

        let (mut cursor, mut expected) = (0usize, offset);
        for _ in 0..count {
            let (record, frame_len) = match decode_frame(&buf[cursor..])? {
                Some(decoded) => decoded,
                None => bail!("truncated frame at position {} of segment {:?}", start + cursor as u64, self.data_path),
            };
            ensure!(
                record.offset == expected,
                "unexpected offset in segment {:?}, expected {} got {}",
                self.data_path,
                expected,
                record.offset
            );
            out.push(record);
            cursor += frame_len;
            expected += 1;
        }
        Ok(count)
    }

    /// Check if this segment holds writes which have not yet been synced to disk.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Flush all written data of this segment to disk.
    pub fn sync(&self) -> Result<()> {
        self.dirty.store(false, Ordering::Release);
        let res = self
            .data
            .sync_data()
            .with_context(|| format!("error syncing segment {:?}", self.data_path))
            .and_then(|_| {
                self.index
                    .sync_data()
                    .with_context(|| format!("error syncing segment index {:?}", self.index_path))
            });
        if res.is_err() {
            self.dirty.store(true, Ordering::Release);
        }
        res
    }

    /// Remove this segment's files from disk.
    pub fn remove_files(&self) -> Result<()> {
        std::fs::remove_file(&self.data_path).with_context(|| format!("error removing {:?}", self.data_path))?;
        match std::fs::remove_file(&self.index_path) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("error removing {:?}", self.index_path)),
        }
    }

    /// Rebuild this segment's in-memory state from disk.
    ///
    /// Index entries are trusted as far as they are self-consistent and the last one points at a
    /// valid frame; the data file is scanned forward from there. Frames which are incomplete or
    /// fail their checksum end the scan, and the data file is truncated at that point.
    fn recover(&self) -> Result<()> {
        let data_len = self
            .data
            .metadata()
            .with_context(|| format!("error reading metadata of {:?}", self.data_path))?
            .len();
        let index_len = self
            .index
            .metadata()
            .with_context(|| format!("error reading metadata of {:?}", self.index_path))?
            .len();

        let mut index_buf = vec![0u8; index_len as usize];
        self.index
            .read_exact_at(&mut index_buf, 0)
            .with_context(|| format!("error reading segment index {:?}", self.index_path))?;
        let loaded = load_index_entries(&index_buf, data_len);
        let mut positions = loaded.clone();

        // Resume scanning at the last indexed frame, falling back to a full scan if that frame
        // is not valid.
        let mut pos = match positions.pop() {
            Some(last) => match self.read_frame_at(last as u64, data_len, self.base_offset + positions.len() as i64)? {
                Some(frame_len) => {
                    positions.push(last);
                    last as u64 + frame_len
                }
                None => {
                    tracing::warn!(path = ?self.index_path, "segment index points at an invalid frame, rescanning segment");
                    positions.clear();
                    0
                }
            },
            None => 0,
        };
        while let Some(frame_len) = self.read_frame_at(pos, data_len, self.base_offset + positions.len() as i64)? {
            positions.push(pos as u32);
            pos += frame_len;
        }

        if pos < data_len {
            tracing::warn!(path = ?self.data_path, valid = pos, len = data_len, "discarding torn bytes at end of segment");
            self.data
                .set_len(pos)
                .with_context(|| format!("error truncating torn segment {:?}", self.data_path))?;
        }
        let index_is_exact = positions == loaded && index_len == loaded.len() as u64 * INDEX_ENTRY_LEN;
        if !index_is_exact {
            tracing::debug!(path = ?self.index_path, records = positions.len(), "rewriting segment index");
            let mut entries = Vec::with_capacity(positions.len() * INDEX_ENTRY_LEN as usize);
            for (idx, pos) in positions.iter().enumerate() {
                encode_index_entry(idx as u32, *pos, &mut entries);
            }
            self.index
                .set_len(0)
                .and_then(|_| self.index.write_all_at(&entries, 0))
                .with_context(|| format!("error rewriting segment index {:?}", self.index_path))?;
        }

        *self.positions.write().unwrap_or_else(PoisonError::into_inner) = positions;
        self.size.store(pos, Ordering::Release);
        Ok(())
    }

    /// Validate the frame at the given position, returning its full length if it is intact and
    /// carries the expected offset.
    fn read_frame_at(&self, pos: u64, data_len: u64, expected_offset: i64) -> Result<Option<u64>> {
        if pos + FRAME_HEADER_LEN > data_len || pos > u32::MAX as u64 {
            return Ok(None);
        }
        let mut header = [0u8; FRAME_HEADER_LEN as usize];
        self.data
            .read_exact_at(&mut header, pos)
            .with_context(|| format!("error reading frame header from {:?}", self.data_path))?;
        let (body_len, checksum) = decode_header(&header);
        if (body_len as usize) < BODY_FIXED_LEN || pos + FRAME_HEADER_LEN + body_len as u64 > data_len {
            return Ok(None);
        }
        let mut body = vec![0u8; body_len as usize];
        self.data
            .read_exact_at(&mut body, pos + FRAME_HEADER_LEN)
            .with_context(|| format!("error reading frame body from {:?}", self.data_path))?;
        if seahash::hash(&body) != checksum || decode_body(&body).map(|(offset, _, _)| offset) != Some(expected_offset) {
            return Ok(None);
        }
        Ok(Some(FRAME_HEADER_LEN + body_len as u64))
    }
}

/// Build the data and index file paths of the segment with the given base offset.
pub fn segment_paths(dir: &Path, base_offset: i64) -> (PathBuf, PathBuf) {
    let stem = format!("{:020}", base_offset);
    (dir.join(format!("{}.{}", stem, DATA_FILE_EXT)), dir.join(format!("{}.{}", stem, INDEX_FILE_EXT)))
}

/// Parse the base offset out of a segment data file name.
pub fn parse_base_offset(path: &Path) -> Option<i64> {
    if path.extension()? != DATA_FILE_EXT {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok().filter(|base: &i64| *base >= 0)
}

/// The encoded length of a record's frame.
pub fn frame_len(record: &Record) -> u64 {
    FRAME_HEADER_LEN + (BODY_FIXED_LEN + record.key.len() + record.value.len()) as u64
}

/// Encode a record with the given offset as a frame, appending it to `buf`.
pub fn encode_frame(offset: i64, record: &Record, buf: &mut Vec<u8>) {
    let body_len = BODY_FIXED_LEN + record.key.len() + record.value.len();
    let header_at = buf.len();
    buf.extend_from_slice(&(body_len as u32).to_le_bytes());
    buf.extend_from_slice(&[0u8; 8]);
    let body_at = buf.len();
    buf.extend_from_slice(&offset.to_le_bytes());
    buf.extend_from_slice(&(record.key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&record.key);
    buf.extend_from_slice(&record.value);
    let checksum = seahash::hash(&buf[body_at..]);
    buf[header_at + 4..body_at].copy_from_slice(&checksum.to_le_bytes());
}

/// Decode the frame at the start of `buf`, returning the record and the frame length.
///
/// Returns `None` if `buf` does not hold a complete frame, and an error if the frame is complete
/// but corrupt.
pub fn decode_frame(buf: &[u8]) -> Result<Option<(StoredRecord, usize)>> {
    if buf.len() < FRAME_HEADER_LEN as usize {
        return Ok(None);
    }
    let (body_len, checksum) = decode_header(&buf[..FRAME_HEADER_LEN as usize]);
    let frame_len = FRAME_HEADER_LEN as usize + body_len as usize;
    if buf.len() < frame_len {
        return Ok(None);
    }
    let body = &buf[FRAME_HEADER_LEN as usize..frame_len];
    ensure!(seahash::hash(body) == checksum, "checksum mismatch in record frame");
    let (offset, key, value) = match decode_body(body) {
        Some(decoded) => decoded,
        None => bail!("malformed record frame body"),
    };
    let record = StoredRecord {
        offset,
        key: key.to_vec(),
        value: value.to_vec(),
    };
    Ok(Some((record, frame_len)))
}

fn decode_header(header: &[u8]) -> (u32, u64) {
    let mut len = [0u8; 4];
    let mut checksum = [0u8; 8];
    len.copy_from_slice(&header[..4]);
    checksum.copy_from_slice(&header[4..12]);
    (u32::from_le_bytes(len), u64::from_le_bytes(checksum))
}

fn decode_body(body: &[u8]) -> Option<(i64, &[u8], &[u8])> {
    if body.len() < BODY_FIXED_LEN {
        return None;
    }
    let mut offset = [0u8; 8];
    let mut key_len = [0u8; 4];
    offset.copy_from_slice(&body[..8]);
    key_len.copy_from_slice(&body[8..12]);
    let key_end = BODY_FIXED_LEN.checked_add(u32::from_le_bytes(key_len) as usize)?;
    if key_end > body.len() {
        return None;
    }
    Some((i64::from_le_bytes(offset), &body[BODY_FIXED_LEN..key_end], &body[key_end..]))
}

fn encode_index_entry(rel: u32, pos: u32, buf: &mut Vec<u8>) {
    buf.extend_from_slice(&rel.to_le_bytes());
    buf.extend_from_slice(&pos.to_le_bytes());
}

/// Load the longest self-consistent prefix of index entries.
fn load_index_entries(buf: &[u8], data_len: u64) -> Vec<u32> {
    let mut positions: Vec<u32> = Vec::with_capacity(buf.len() / INDEX_ENTRY_LEN as usize);
    for (idx, entry) in buf.chunks_exact(INDEX_ENTRY_LEN as usize).enumerate() {
        let mut rel = [0u8; 4];
        let mut pos = [0u8; 4];
        rel.copy_from_slice(&entry[..4]);
        pos.copy_from_slice(&entry[4..]);
        let (rel, pos) = (u32::from_le_bytes(rel), u32::from_le_bytes(pos));
        let ordered = positions.last().map(|prev| pos > *prev).unwrap_or(pos == 0);
        if rel as usize != idx || !ordered || pos as u64 >= data_len {
            break;
        }
        positions.push(pos);
    }
    positions
}
