// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use tokio::time::timeout;
use zookeeper_client_rs::{errors::ZkError, protocol::CreateFlags};

use super::common::{MockServer, connected_client};

#[tokio::test]
async fn test_create_get_delete_cycle() -> Result<()> {
    let server = MockServer::start().await;
    let client = connected_client(&server).await;

    client.ensure_path("/g/t", None).await?;
    let created = client
        .create(
            "/g/t/w",
            Some(Bytes::from_static(b"hi")),
            None,
            CreateFlags::empty(),
        )
        .await?;
    assert_eq!(created, "/g/t/w");

    let (data, stat) = client.get("/g/t/w", false).await?;
    assert_eq!(data.as_deref(), Some(b"hi".as_ref()));
    assert_eq!(stat.version, 0);

    // Any stat-bearing reply keeps the cache current.
    let cached = client
        .stat_cache()
        .get("/g/t/w")
        .map(|stat| stat.version);
    assert_eq!(cached, Some(0));

    client.delete("/g/t/w", false).await?;
    assert!(!client.exists("/g/t/w", false).await?);

    // A second delete sees the node gone.
    assert_eq!(client.delete("/g/t/w", true).await, Err(ZkError::NoNode));

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn test_ensure_path_is_idempotent() -> Result<()> {
    let server = MockServer::start().await;
    let client = connected_client(&server).await;

    client.ensure_path("/a/b/c", None).await?;
    client.ensure_path("/a/b/c", None).await?;
    assert!(client.exists("/a/b/c", false).await?);

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn test_set_and_versioning() -> Result<()> {
    let server = MockServer::start().await;
    let client = connected_client(&server).await;

    client
        .create("/v", Some(Bytes::from_static(b"0")), None, CreateFlags::empty())
        .await?;

    let stat = client.set("/v", Some(Bytes::from_static(b"1")), 0).await?;
    assert_eq!(stat.version, 1);

    // Writing under a stale version surfaces the conflict untouched.
    assert_eq!(
        client.set("/v", Some(Bytes::from_static(b"2")), 0).await,
        Err(ZkError::BadVersion)
    );

    // set_data without force rides on the cached version.
    client.set_data("/v", Some(Bytes::from_static(b"2")), false).await?;
    let (data, stat) = client.get("/v", false).await?;
    assert_eq!(data.as_deref(), Some(b"2".as_ref()));
    assert_eq!(stat.version, 2);

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn test_deleteall_removes_subtree() -> Result<()> {
    let server = MockServer::start().await;
    let client = connected_client(&server).await;

    client.ensure_path("/tree/x", None).await?;
    client.ensure_path("/tree/y/z", None).await?;

    client.deleteall("/tree").await?;
    assert!(!server.has_node("/tree"));
    assert!(!client.exists("/tree", false).await?);

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn test_close_is_idempotent() -> Result<()> {
    let server = MockServer::start().await;
    let client = connected_client(&server).await;

    client
        .create(
            "/eph",
            None,
            None,
            CreateFlags::EPHEMERAL,
        )
        .await?;
    assert!(server.has_node("/eph"));

    timeout(Duration::from_secs(5), client.close()).await?;
    timeout(Duration::from_secs(5), client.close()).await?;

    // Closing the session reaped its ephemerals.
    assert!(!server.has_node("/eph"));
    Ok(())
}
