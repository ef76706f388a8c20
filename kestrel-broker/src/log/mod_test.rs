use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::prelude::*;

use super::{partition_dir, segment, Record, SegmentedLog};
use crate::error::AppError;

const TOPIC: &str = "events";
const CAPACITY: u64 = 64 * 1024;

#[tokio::test]
async fn append_assigns_gapless_offsets_and_reads_back_in_order() -> Result<()> {
    let tmpdir = tempfile::tempdir_in("/tmp")?;
    let log = SegmentedLog::open(tmpdir.path(), TOPIC, 0, CAPACITY).await?;

    let (mut expected, mut next_offset) = (vec![], 0i64);
    for _ in 0..rand::thread_rng().gen_range(10..20) {
        let batch: Vec<_> = (0..rand::thread_rng().gen_range(1..10)).map(|_| random_record()).collect();
        let first = log.append(batch.clone(), true).await?;
        assert_eq!(first, next_offset, "expected first offset {} got {}", next_offset, first);
        next_offset += batch.len() as i64;
        expected.extend(batch);
    }

    assert_eq!(log.high_watermark(), next_offset, "expected high watermark {} got {}", next_offset, log.high_watermark());
    let records = log.read(0, expected.len() + 10).await?;
    assert_eq!(records.len(), expected.len(), "expected {} records got {}", expected.len(), records.len());
    for (idx, (stored, sent)) in records.iter().zip(expected.iter()).enumerate() {
        assert_eq!(stored.offset, idx as i64, "expected offset {} got {}", idx, stored.offset);
        assert_eq!(stored.key, sent.key, "expected key {:?} got {:?} at offset {}", sent.key, stored.key, idx);
        assert_eq!(stored.value, sent.value, "expected value {:?} got {:?} at offset {}", sent.value, stored.value, idx);
    }
    Ok(())
}

#[tokio::test]
async fn read_bounds_follow_high_watermark() -> Result<()> {
    let tmpdir = tempfile::tempdir_in("/tmp")?;
    let log = SegmentedLog::open(tmpdir.path(), TOPIC, 0, CAPACITY).await?;

    let empty = log.read(0, 10).await?;
    assert!(empty.is_empty(), "expected empty read from empty log, got {:?}", empty);

    log.append(vec![random_record(), random_record(), random_record()], true).await?;

    let at_hwm = log.read(3, 10).await?;
    assert!(at_hwm.is_empty(), "expected empty read at high watermark, got {} records", at_hwm.len());

    for offset in [4, -1] {
        let err = log.read(offset, 10).await.err().context("expected read to fail")?;
        let app_err = err.downcast::<AppError>().context("unexpected error type")?;
        assert!(
            matches!(app_err, AppError::OffsetOutOfRange { offset: got, high_watermark: 3 } if got == offset),
            "expected OffsetOutOfRange for offset {}, got {:?}",
            offset,
            app_err
        );
    }

    let limited = log.read(1, 1).await?;
    assert_eq!(limited.len(), 1, "expected a single record, got {}", limited.len());
    assert_eq!(limited[0].offset, 1, "expected offset 1 got {}", limited[0].offset);
    Ok(())
}

#[tokio::test]
async fn rotation_starts_segment_at_first_overflowing_offset() -> Result<()> {
    let tmpdir = tempfile::tempdir_in("/tmp")?;
    // Each record below is a 35 byte frame, so two fit in a 100 byte segment.
    let log = SegmentedLog::open(tmpdir.path(), TOPIC, 0, 100).await?;
    let record = || Record {
        key: b"k".to_vec(),
        value: b"0123456789".to_vec(),
    };
    assert_eq!(segment::frame_len(&record()), 35, "unexpected frame len {}", segment::frame_len(&record()));

    log.append(vec![record(), record()], true).await?;
    let dir = partition_dir(tmpdir.path(), TOPIC, 0);
    let (first_data, first_index) = segment::segment_paths(&dir, 0);
    let (data_before, index_before) = (std::fs::read(&first_data)?, std::fs::read(&first_index)?);
    assert_eq!(log.segment_count(), 1, "expected 1 segment before overflow, got {}", log.segment_count());

    let first = log.append(vec![record(), record(), record()], true).await?;
    assert_eq!(first, 2, "expected first offset 2 got {}", first);
    assert_eq!(log.segment_count(), 3, "expected 3 segments after overflow, got {}", log.segment_count());
    for base in [2, 4] {
        let (data, index) = segment::segment_paths(&dir, base);
        assert!(data.exists(), "expected segment data file for base offset {} at {:?}", base, data);
        assert!(index.exists(), "expected segment index file for base offset {} at {:?}", base, index);
    }

    let (data_after, index_after) = (std::fs::read(&first_data)?, std::fs::read(&first_index)?);
    assert!(data_before == data_after, "expected sealed segment data to be unchanged after rotation");
    assert!(index_before == index_after, "expected sealed segment index to be unchanged after rotation");

    let records = log.read(0, 10).await?;
    let offsets: Vec<_> = records.iter().map(|rec| rec.offset).collect();
    assert_eq!(offsets, vec![0, 1, 2, 3, 4], "expected offsets 0..5 across segments, got {:?}", offsets);
    Ok(())
}

#[tokio::test]
async fn unsynced_appends_sync_sealed_segments_and_close_syncs_the_rest() -> Result<()> {
    let tmpdir = tempfile::tempdir_in("/tmp")?;
    let log = SegmentedLog::open(tmpdir.path(), TOPIC, 0, 100).await?;
    let record = || Record {
        key: b"k".to_vec(),
        value: b"0123456789".to_vec(),
    };

    log.append(vec![record(), record(), record(), record(), record()], false).await?;
    let segments = log.inner.segments.load_full();
    assert_eq!(segments.len(), 3, "expected 3 segments after overflow, got {}", segments.len());
    for seg in segments[..2].iter() {
        assert!(!seg.is_dirty(), "expected sealed segment {} to be synced on rotation", seg.base_offset());
    }
    let active = segments.last().context("expected an active segment")?;
    assert!(active.is_dirty(), "expected the active segment to hold unsynced writes without sync");

    log.close().await?;
    for seg in segments.iter() {
        assert!(!seg.is_dirty(), "expected segment {} to be synced after close", seg.base_offset());
    }
    Ok(())
}

#[tokio::test]
async fn oversized_record_gets_its_own_segment() -> Result<()> {
    let tmpdir = tempfile::tempdir_in("/tmp")?;
    let log = SegmentedLog::open(tmpdir.path(), TOPIC, 0, 64).await?;
    let big = Record {
        key: vec![],
        value: vec![7u8; 256],
    };

    log.append(vec![random_record()], true).await?;
    let offset = log.append(vec![big.clone()], true).await?;

    let records = log.read(offset, 1).await?;
    assert_eq!(records.len(), 1, "expected the oversized record to be readable");
    assert_eq!(records[0].value, big.value, "unexpected value read for oversized record");
    assert_eq!(log.segment_count(), 2, "expected 2 segments, got {}", log.segment_count());
    Ok(())
}

#[tokio::test]
async fn reopen_recovers_high_watermark_and_records() -> Result<()> {
    let tmpdir = tempfile::tempdir_in("/tmp")?;
    let mut expected = vec![];
    {
        let log = SegmentedLog::open(tmpdir.path(), TOPIC, 3, 512).await?;
        for _ in 0..40 {
            let record = random_record();
            log.append(vec![record.clone()], false).await?;
            expected.push(record);
        }
        log.close().await?;
    }

    let log = SegmentedLog::open(tmpdir.path(), TOPIC, 3, 512).await?;
    assert_eq!(log.high_watermark(), 40, "expected recovered high watermark 40, got {}", log.high_watermark());
    assert!(log.segment_count() > 1, "expected multiple segments to be recovered, got {}", log.segment_count());
    let records = log.read(0, 100).await?;
    let values: Vec<_> = records.into_iter().map(|rec| rec.value).collect();
    let expected: Vec<_> = expected.into_iter().map(|rec| rec.value).collect();
    assert!(values == expected, "expected recovered records to match appended records");

    let next = log.append(vec![random_record()], true).await?;
    assert_eq!(next, 40, "expected next offset after recovery to be 40, got {}", next);
    Ok(())
}

#[tokio::test]
async fn concurrent_appends_serialize_without_gaps() -> Result<()> {
    let tmpdir = tempfile::tempdir_in("/tmp")?;
    let log = SegmentedLog::open(tmpdir.path(), TOPIC, 0, 4096).await?;

    let mut handles = vec![];
    for task in 0..8u8 {
        let log = log.clone();
        handles.push(tokio::spawn(async move {
            let mut firsts = vec![];
            for idx in 0..10u8 {
                let batch = vec![
                    Record {
                        key: vec![task],
                        value: vec![idx, 0],
                    },
                    Record {
                        key: vec![task],
                        value: vec![idx, 1],
                    },
                ];
                firsts.push(log.append(batch, false).await?);
            }
            Ok::<_, anyhow::Error>(firsts)
        }));
    }
    let mut firsts = HashSet::new();
    for handle in handles {
        firsts.extend(handle.await??);
    }

    assert_eq!(log.high_watermark(), 160, "expected high watermark 160, got {}", log.high_watermark());
    let expected: HashSet<i64> = (0..160).step_by(2).collect();
    assert!(firsts == expected, "expected batches to start at every even offset");

    // Records of a batch must be contiguous.
    let records = log.read(0, 200).await?;
    for pair in records.chunks(2) {
        assert_eq!(pair[0].key, pair[1].key, "expected batch records to be adjacent, got keys {:?} and {:?}", pair[0].key, pair[1].key);
        assert_eq!(pair[0].value[1], 0, "expected first record of batch at offset {}", pair[0].offset);
        assert_eq!(pair[1].value[1], 1, "expected second record of batch at offset {}", pair[1].offset);
    }
    Ok(())
}

#[tokio::test]
async fn retention_deletes_sealed_segments_only() -> Result<()> {
    let tmpdir = tempfile::tempdir_in("/tmp")?;
    let log = SegmentedLog::open(tmpdir.path(), TOPIC, 0, 100).await?;
    for _ in 0..5 {
        log.append(vec![Record { key: b"k".to_vec(), value: b"0123456789".to_vec() }], true).await?;
    }
    assert_eq!(log.segment_count(), 3, "expected 3 segments, got {}", log.segment_count());

    tokio::time::sleep(Duration::from_millis(50)).await;
    let deleted = log.enforce_retention(Duration::from_secs(3600)).await?;
    assert_eq!(deleted, 0, "expected no segments younger than the retention age to be deleted, got {}", deleted);

    let deleted = log.enforce_retention(Duration::ZERO).await?;
    assert_eq!(deleted, 2, "expected 2 sealed segments to be deleted, got {}", deleted);
    assert_eq!(log.segment_count(), 1, "expected the active segment to be retained, got {} segments", log.segment_count());
    assert_eq!(log.earliest_offset(), 4, "expected earliest offset 4, got {}", log.earliest_offset());

    // Reads below the earliest retained offset start at the earliest retained offset.
    let records = log.read(0, 10).await?;
    let offsets: Vec<_> = records.iter().map(|rec| rec.offset).collect();
    assert_eq!(offsets, vec![4], "expected only offset 4 to remain readable, got {:?}", offsets);
    Ok(())
}

#[tokio::test]
async fn closed_log_rejects_appends() -> Result<()> {
    let tmpdir = tempfile::tempdir_in("/tmp")?;
    let log = SegmentedLog::open(tmpdir.path(), TOPIC, 0, CAPACITY).await?;
    log.append(vec![random_record()], true).await?;
    log.close().await?;
    log.close().await?;

    let err = log.append(vec![random_record()], true).await.err().context("expected append to a closed log to fail")?;
    let app_err = err.downcast::<AppError>().context("unexpected error type")?;
    assert!(matches!(app_err, AppError::Unavailable(_)), "expected Unavailable error, got {:?}", app_err);

    let records = log.read(0, 10).await?;
    assert_eq!(records.len(), 1, "expected reads to keep working after close, got {} records", records.len());
    Ok(())
}

fn random_record() -> Record {
    let mut rng = rand::thread_rng();
    let key_len = rng.gen_range(0..16);
    let value_len = rng.gen_range(1..128);
    Record {
        key: (0..key_len).map(|_| rng.gen()).collect(),
        value: (0..value_len).map(|_| rng.gen()).collect(),
    }
}
