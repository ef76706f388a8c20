use std::time::Duration;

use anyhow::Result;

use crate::config::*;

#[test]
fn config_deserializes_from_full_env() -> Result<()> {
    let config: Config = envy::from_iter(vec![
        ("RUST_LOG".into(), "error".into()),
        ("NODE_ID".into(), "broker-1".into()),
        ("RPC_ADDR".into(), "0.0.0.0:7100".into()),
        ("ADVERTISED_ADDR".into(), "broker-1.kestrel:7100".into()),
        ("METRICS_PORT".into(), "7102".into()),
        ("STORAGE_DATA_PATH".into(), "/var/lib/kestrel".into()),
        ("SEGMENT_BYTES".into(), "1048576".into()),
        ("REGISTRATION_TTL_SECONDS".into(), "30".into()),
        ("LEADER_CACHE_TTL_MILLIS".into(), "500".into()),
        ("SHUTDOWN_GRACE_SECONDS".into(), "5".into()),
        ("MAX_IN_FLIGHT_REQUESTS".into(), "128".into()),
        ("METADATA_BACKEND".into(), "kubernetes".into()),
        ("NAMESPACE".into(), "streaming".into()),
        ("RETENTION_POLICY_STRATEGY".into(), "time".into()),
        ("RETENTION_POLICY_RETENTION_SECONDS".into(), "3600".into()),
    ])?;
    config.validate()?;

    assert!(config.rust_log == "error", "unexpected value parsed for RUST_LOG, got {}, expected {}", config.rust_log, "error");
    assert!(config.node_id == "broker-1", "unexpected value parsed for NODE_ID, got {}, expected {}", config.node_id, "broker-1");
    assert!(config.rpc_addr == "0.0.0.0:7100", "unexpected value parsed for RPC_ADDR, got {}, expected {}", config.rpc_addr, "0.0.0.0:7100");
    assert!(
        config.advertised_addr() == "broker-1.kestrel:7100",
        "unexpected value parsed for ADVERTISED_ADDR, got {}, expected {}",
        config.advertised_addr(),
        "broker-1.kestrel:7100"
    );
    assert!(config.metrics_port == 7102, "unexpected value parsed for METRICS_PORT, got {}, expected {}", config.metrics_port, 7102);
    assert!(
        config.storage_data_path == "/var/lib/kestrel",
        "unexpected value parsed for STORAGE_DATA_PATH, got {}, expected {}",
        config.storage_data_path,
        "/var/lib/kestrel"
    );
    assert!(config.segment_bytes == 1048576, "unexpected value parsed for SEGMENT_BYTES, got {}, expected {}", config.segment_bytes, 1048576);
    assert!(
        config.registration_ttl_seconds == 30,
        "unexpected value parsed for REGISTRATION_TTL_SECONDS, got {}, expected {}",
        config.registration_ttl_seconds,
        30
    );
    assert!(
        config.registration_renew_interval() == Duration::from_secs(10),
        "unexpected renewal interval, got {:?}, expected {:?}",
        config.registration_renew_interval(),
        Duration::from_secs(10)
    );
    assert!(
        config.leader_cache_ttl() == Duration::from_millis(500),
        "unexpected value parsed for LEADER_CACHE_TTL_MILLIS, got {:?}, expected {:?}",
        config.leader_cache_ttl(),
        Duration::from_millis(500)
    );
    assert!(
        config.shutdown_grace() == Duration::from_secs(5),
        "unexpected value parsed for SHUTDOWN_GRACE_SECONDS, got {:?}, expected {:?}",
        config.shutdown_grace(),
        Duration::from_secs(5)
    );
    assert!(
        config.max_in_flight_requests == 128,
        "unexpected value parsed for MAX_IN_FLIGHT_REQUESTS, got {}, expected {}",
        config.max_in_flight_requests,
        128
    );
    assert!(
        config.metadata_backend == MetadataBackend::Kubernetes,
        "unexpected value parsed for METADATA_BACKEND, got {:?}, expected {:?}",
        config.metadata_backend,
        MetadataBackend::Kubernetes
    );
    assert!(config.namespace == "streaming", "unexpected value parsed for NAMESPACE, got {}, expected {}", config.namespace, "streaming");
    let policy = config.retention_policy();
    assert!(
        policy.strategy == RetentionStrategy::Time,
        "unexpected value parsed for RETENTION_POLICY_STRATEGY, got {}, expected {}",
        policy.strategy,
        RetentionStrategy::Time
    );
    assert!(
        policy.max_age() == Some(Duration::from_secs(3600)),
        "unexpected value parsed for RETENTION_POLICY_RETENTION_SECONDS, got {:?}, expected {:?}",
        policy.max_age(),
        Some(Duration::from_secs(3600))
    );

    Ok(())
}

#[test]
fn config_deserializes_from_sparse_env() -> Result<()> {
    let config: Config = envy::from_iter(vec![("RUST_LOG".into(), "error".into()), ("NODE_ID".into(), "broker-0".into())])?;
    config.validate()?;

    assert!(config.rpc_addr == "0.0.0.0:7000", "unexpected default for RPC_ADDR, got {}, expected {}", config.rpc_addr, "0.0.0.0:7000");
    assert!(
        config.advertised_addr() == "0.0.0.0:7000",
        "expected advertised addr to fall back to RPC_ADDR, got {}",
        config.advertised_addr()
    );
    assert!(config.metrics_port == 7002, "unexpected default for METRICS_PORT, got {}, expected {}", config.metrics_port, 7002);
    assert!(
        config.storage_data_path == DEFAULT_DATA_PATH,
        "unexpected default for STORAGE_DATA_PATH, got {}, expected {}",
        config.storage_data_path,
        DEFAULT_DATA_PATH
    );
    assert!(
        config.segment_bytes == 64 * 1024 * 1024,
        "unexpected default for SEGMENT_BYTES, got {}, expected {}",
        config.segment_bytes,
        64 * 1024 * 1024
    );
    assert!(
        config.metadata_backend == MetadataBackend::Embedded,
        "unexpected default for METADATA_BACKEND, got {:?}, expected {:?}",
        config.metadata_backend,
        MetadataBackend::Embedded
    );
    assert!(
        config.retention_policy().max_age().is_none(),
        "expected default retention policy to retain all data, got {:?}",
        config.retention_policy().max_age()
    );

    Ok(())
}

#[test]
fn config_time_retention_defaults_to_one_week() -> Result<()> {
    let config: Config = envy::from_iter(vec![
        ("RUST_LOG".into(), "error".into()),
        ("NODE_ID".into(), "broker-0".into()),
        ("RETENTION_POLICY_STRATEGY".into(), "time".into()),
    ])?;

    let expected = Some(Duration::from_secs(604800));
    assert!(
        config.retention_policy().max_age() == expected,
        "unexpected retention age, got {:?}, expected {:?}",
        config.retention_policy().max_age(),
        expected
    );
    Ok(())
}

#[test]
fn config_validate_rejects_empty_node_id() -> Result<()> {
    let config: Config = envy::from_iter(vec![("RUST_LOG".into(), "error".into()), ("NODE_ID".into(), "  ".into())])?;
    let res = config.validate();
    assert!(res.is_err(), "expected validation error for empty NODE_ID, got {:?}", res);
    Ok(())
}

#[test]
fn config_validate_rejects_out_of_range_segment_bytes() -> Result<()> {
    for bytes in ["512", "4294967296"] {
        let config: Config = envy::from_iter(vec![
            ("RUST_LOG".into(), "error".into()),
            ("NODE_ID".into(), "broker-0".into()),
            ("SEGMENT_BYTES".into(), bytes.into()),
        ])?;
        let res = config.validate();
        assert!(res.is_err(), "expected validation error for SEGMENT_BYTES={}, got {:?}", bytes, res);
    }
    Ok(())
}

#[test]
fn config_rejects_unknown_backend() {
    let res = envy::from_iter::<_, Config>(vec![
        ("RUST_LOG".into(), "error".into()),
        ("NODE_ID".into(), "broker-0".into()),
        ("METADATA_BACKEND".into(), "zookeeper".into()),
    ]);
    assert!(res.is_err(), "expected error for unknown METADATA_BACKEND, got {:?}", res);
}
