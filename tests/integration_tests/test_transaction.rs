// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use anyhow::Result;
use bytes::Bytes;
use zookeeper_client_rs::{errors::ZkError, protocol::CreateFlags};

use super::common::{MockServer, connected_client};

#[tokio::test]
async fn test_failed_batch_applies_nothing() -> Result<()> {
    let server = MockServer::start().await;
    let client = connected_client(&server).await;

    let mut txn = client.begin_transaction();
    txn.create("/t", None, None, CreateFlags::empty())?;
    // The fresh node would be at version 0; this check must fail.
    txn.check_version("/t", 1);

    let result = txn.commit().await?;
    assert!(!result.succeeded());

    // Atomicity: the create was rolled back with the rest.
    assert!(!server.has_node("/t"));
    assert!(!client.exists("/t", false).await?);

    let mut retry = client.begin_transaction();
    retry.create("/t", None, None, CreateFlags::empty())?;
    retry.check_version("/t", 1);
    assert_eq!(
        retry.commit_checked().await,
        Err(ZkError::TransactionFailed)
    );

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn test_successful_batch_buckets_results() -> Result<()> {
    let server = MockServer::start().await;
    let client = connected_client(&server).await;

    client
        .create("/seed", Some(Bytes::from_static(b"a")), None, CreateFlags::empty())
        .await?;

    let mut txn = client.begin_transaction();
    txn.check_version("/seed", 0);
    txn.create("/made", None, None, CreateFlags::empty())?;
    txn.set_data("/seed", Some(Bytes::from_static(b"b")), 0);
    txn.delete("/made", -1);

    let result = txn.commit().await?;
    assert!(result.succeeded());
    assert!(result.checked.contains("/seed"));
    assert!(result.created.contains("/made"));
    assert!(result.updated.contains("/seed"));
    assert!(result.deleted.contains("/made"));

    // Applied effects are visible; the created-then-deleted node is gone.
    assert!(!server.has_node("/made"));
    let (data, stat) = client.get("/seed", false).await?;
    assert_eq!(data.as_deref(), Some(b"b".as_ref()));
    assert_eq!(stat.version, 1);

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn test_empty_batch_is_refused() -> Result<()> {
    let server = MockServer::start().await;
    let client = connected_client(&server).await;

    let txn = client.begin_transaction();
    assert_eq!(txn.commit().await, Err(ZkError::BadArguments));

    client.close().await;
    Ok(())
}
