// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::Result;
use bytes::Bytes;
use serial_test::serial;
use tokio::time::{sleep, timeout};
use zookeeper_client_rs::protocol::{CreateFlags, EventKind};

use super::common::{MockServer, connected_client};

#[tokio::test]
async fn test_data_watch_fires_once() -> Result<()> {
    let server = MockServer::start().await;
    let client = connected_client(&server).await;
    let writer = connected_client(&server).await;

    client
        .create("/x", Some(Bytes::from_static(b"v0")), None, CreateFlags::empty())
        .await?;

    let waiter = client.wait_for_events(&[EventKind::DataChanged], "/x");
    let (data, _) = client.get("/x", true).await?;
    assert_eq!(data.as_deref(), Some(b"v0".as_ref()));

    writer.set("/x", Some(Bytes::from_static(b"v1")), -1).await?;

    let fired = timeout(Duration::from_secs(5), waiter.wait()).await??;
    assert_eq!(fired, "/x");

    let (data, _) = client.get("/x", false).await?;
    assert_eq!(data.as_deref(), Some(b"v1".as_ref()));

    client.close().await;
    writer.close().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
#[serial]
async fn test_watch_survives_reconnect() -> Result<()> {
    let server = MockServer::start().await;
    let client = connected_client(&server).await;

    client
        .create("/x", Some(Bytes::from_static(b"v0")), None, CreateFlags::empty())
        .await?;

    let waiter = client.wait_for_events(&[EventKind::DataChanged], "/x");
    client.get("/x", true).await?;

    // Sever the TCP connection; the session itself stays valid.
    server.kill_connections();

    // The next operation trips over the dead connection, suspends the
    // session and comes back after the repair loop has reconnected and
    // re-armed the registered watches.
    let exists = timeout(Duration::from_secs(10), client.exists("/x", false)).await??;
    assert!(exists);
    sleep(Duration::from_millis(200)).await;

    let writer = connected_client(&server).await;
    writer.set("/x", Some(Bytes::from_static(b"v1")), -1).await?;

    let fired = timeout(Duration::from_secs(5), waiter.wait()).await??;
    assert_eq!(fired, "/x");

    let (data, _) = client.get("/x", false).await?;
    assert_eq!(data.as_deref(), Some(b"v1".as_ref()));

    client.close().await;
    writer.close().await;
    Ok(())
}

#[tokio::test]
async fn test_created_watch() -> Result<()> {
    let server = MockServer::start().await;
    let client = connected_client(&server).await;
    let writer = connected_client(&server).await;

    let waiter = client.wait_for_events(&[EventKind::Created], "/later");
    assert!(!client.exists("/later", true).await?);

    writer.create("/later", None, None, CreateFlags::empty()).await?;

    let fired = timeout(Duration::from_secs(5), waiter.wait()).await??;
    assert_eq!(fired, "/later");

    client.close().await;
    writer.close().await;
    Ok(())
}
