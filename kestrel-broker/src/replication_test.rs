use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::error::AppError;
use crate::grpc::Acks;
use crate::metadata::{MemoryMetadataStore, MetadataStore, PartitionState};
use crate::replication::{validate_topic_name, ReplicationCoordinator};

const BROKER: &str = "n1";

async fn setup(cache_ttl: Duration) -> Result<(Arc<MemoryMetadataStore>, ReplicationCoordinator)> {
    let store = Arc::new(MemoryMetadataStore::new());
    store.register_broker(BROKER, "127.0.0.1:7000", 30).await?;
    let coordinator = ReplicationCoordinator::new(BROKER.into(), store.clone(), cache_ttl);
    Ok((store, coordinator))
}

#[tokio::test]
async fn create_topic_assigns_leadership_to_live_brokers() -> Result<()> {
    let (store, coordinator) = setup(Duration::from_secs(2)).await?;

    let descriptor = coordinator.create_topic("events", 3, 1).await?;
    assert_eq!(descriptor.partition_count, 3, "expected 3 partitions, got {}", descriptor.partition_count);
    for partition in 0..3 {
        let state = coordinator.validate_leader("events", partition).await?;
        assert_eq!(state.leader, BROKER, "expected leader {} for partition {}, got {}", BROKER, partition, state.leader);
        assert_eq!(state.leader_epoch, 1, "expected epoch 1 for partition {}, got {}", partition, state.leader_epoch);
    }
    let stored = store.get_topic("events").await?;
    assert_eq!(stored, descriptor, "expected stored descriptor {:?}, got {:?}", descriptor, stored);
    Ok(())
}

#[tokio::test]
async fn create_topic_rejects_duplicates_without_mutation() -> Result<()> {
    let (store, coordinator) = setup(Duration::from_secs(2)).await?;
    let original = coordinator.create_topic("events", 2, 1).await?;

    let err = coordinator.create_topic("events", 5, 1).await.err().context("expected duplicate creation to fail")?;
    let app_err = err.downcast::<AppError>().context("unexpected error type")?;
    assert!(matches!(app_err, AppError::AlreadyExists(_)), "expected AlreadyExists, got {:?}", app_err);

    let stored = store.get_topic("events").await?;
    assert_eq!(stored, original, "expected descriptor {:?} to be unchanged, got {:?}", original, stored);
    let res = store.get_partition_state("events", 2).await;
    assert!(res.is_err(), "expected no partition state for partition 2, got {:?}", res);
    Ok(())
}

#[tokio::test]
async fn create_topic_validates_input() -> Result<()> {
    let (_store, coordinator) = setup(Duration::from_secs(2)).await?;
    for (name, partitions, rf) in [("", 1, 1), ("bad/name", 1, 1), ("events", 0, 1), ("events", 1, 0), ("events", -3, 1)] {
        let err = coordinator
            .create_topic(name, partitions, rf)
            .await
            .err()
            .with_context(|| format!("expected create_topic({:?}, {}, {}) to fail", name, partitions, rf))?;
        let app_err = err.downcast::<AppError>().context("unexpected error type")?;
        assert!(matches!(app_err, AppError::InvalidInput(_)), "expected InvalidInput for {:?}, got {:?}", name, app_err);
    }
    Ok(())
}

#[tokio::test]
async fn create_topic_surfaces_insufficient_brokers() -> Result<()> {
    let (_store, coordinator) = setup(Duration::from_secs(2)).await?;
    let err = coordinator.create_topic("events", 1, 3).await.err().context("expected creation to fail")?;
    let app_err = err.downcast::<AppError>().context("unexpected error type")?;
    assert!(
        matches!(app_err, AppError::InsufficientBrokers { required: 3, live: 1 }),
        "expected InsufficientBrokers, got {:?}",
        app_err
    );
    Ok(())
}

#[tokio::test]
async fn validate_leader_rejects_moved_leadership_after_refresh() -> Result<()> {
    let (store, coordinator) = setup(Duration::from_secs(60)).await?;
    coordinator.create_topic("events", 1, 1).await?;
    coordinator.validate_leader("events", 0).await?;

    // A cached view naming this broker is trusted until it expires or is invalidated.
    store.set_partition_state(
        "events",
        0,
        PartitionState {
            leader: "n2".into(),
            leader_epoch: 2,
            isr: vec!["n2".into()],
        },
    );
    coordinator.validate_leader("events", 0).await?;

    coordinator.invalidate("events", 0);
    let err = coordinator.validate_leader("events", 0).await.err().context("expected NotLeader")?;
    let app_err = err.downcast::<AppError>().context("unexpected error type")?;
    assert!(
        matches!(&app_err, AppError::NotLeader { leader, partition: 0, .. } if leader == "n2"),
        "expected NotLeader naming n2, got {:?}",
        app_err
    );
    Ok(())
}

#[tokio::test]
async fn validate_leader_refetches_when_cache_names_other_leader() -> Result<()> {
    let (store, coordinator) = setup(Duration::from_secs(60)).await?;
    coordinator.create_topic("events", 1, 1).await?;
    store.set_partition_state(
        "events",
        0,
        PartitionState {
            leader: "n2".into(),
            leader_epoch: 2,
            isr: vec!["n2".into()],
        },
    );
    coordinator.invalidate("events", 0);
    assert!(!coordinator.is_leader("events", 0).await?, "expected n1 to not lead after leadership moved");

    // Leadership returns; the cached state names n2, so validation must re-fetch.
    store.set_partition_state(
        "events",
        0,
        PartitionState {
            leader: BROKER.into(),
            leader_epoch: 3,
            isr: vec![BROKER.into()],
        },
    );
    let state = coordinator.validate_leader("events", 0).await?;
    assert_eq!(state.leader_epoch, 3, "expected epoch 3 after re-fetch, got {}", state.leader_epoch);
    Ok(())
}

#[tokio::test]
async fn stale_epochs_are_fenced() -> Result<()> {
    let (store, coordinator) = setup(Duration::ZERO).await?;
    coordinator.create_topic("events", 1, 1).await?;
    store.set_partition_state(
        "events",
        0,
        PartitionState {
            leader: BROKER.into(),
            leader_epoch: 5,
            isr: vec![BROKER.into()],
        },
    );
    coordinator.validate_leader("events", 0).await?;

    store.set_partition_state(
        "events",
        0,
        PartitionState {
            leader: BROKER.into(),
            leader_epoch: 4,
            isr: vec![BROKER.into()],
        },
    );
    let err = coordinator.validate_leader("events", 0).await.err().context("expected stale epoch to be rejected")?;
    let app_err = err.downcast::<AppError>().context("unexpected error type")?;
    assert!(matches!(app_err, AppError::Unavailable(_)), "expected Unavailable, got {:?}", app_err);
    Ok(())
}

#[tokio::test]
async fn metadata_outage_surfaces_as_unavailable() -> Result<()> {
    let (store, coordinator) = setup(Duration::ZERO).await?;
    coordinator.create_topic("events", 1, 1).await?;
    store.set_available(false);

    let err = coordinator.validate_leader("events", 0).await.err().context("expected outage to fail validation")?;
    let app_err = err.downcast::<AppError>().context("unexpected error type")?;
    assert!(matches!(app_err, AppError::Unavailable(_)), "expected Unavailable, got {:?}", app_err);
    Ok(())
}

#[tokio::test]
async fn acks_levels_decode_and_all_degrades_to_leader() -> Result<()> {
    let (_store, coordinator) = setup(Duration::from_secs(2)).await?;
    assert_eq!(Acks::from_request(0)?, Acks::Leader, "expected 0 to decode as LEADER");
    assert_eq!(Acks::from_request(1)?, Acks::None, "expected 1 to decode as NONE");
    assert_eq!(Acks::from_request(2)?, Acks::All, "expected 2 to decode as ALL");
    assert!(Acks::from_request(9).is_err(), "expected unknown acks level to be rejected");
    assert!(!Acks::None.requires_sync(), "expected NONE to skip fsync");
    assert!(Acks::All.requires_sync(), "expected ALL to require fsync");

    let state = PartitionState {
        leader: BROKER.into(),
        leader_epoch: 1,
        isr: vec![BROKER.into(), "n2".into()],
    };
    coordinator.await_replication(Acks::All, &state).await?;
    Ok(())
}

#[test]
fn topic_name_validation() {
    for name in ["events", "orders.v2", "a_b-c", &"x".repeat(249)] {
        assert!(validate_topic_name(name).is_ok(), "expected {:?} to be a valid topic name", name);
    }
    for name in ["", ".", "..", "has space", "slash/name", &"x".repeat(250)] {
        assert!(validate_topic_name(name).is_err(), "expected {:?} to be rejected", name);
    }
}
