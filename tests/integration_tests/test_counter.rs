// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use anyhow::Result;
use serial_test::serial;
use tokio::time::timeout;
use zookeeper_client_rs::recipes::{Counter, NumericValue};

use super::common::{MockServer, connected_client};

#[tokio::test]
async fn test_incr_decr_round_trip() -> Result<()> {
    let server = MockServer::start().await;
    let client = connected_client(&server).await;

    let counter = Counter::new(client.clone(), "/C", false);
    counter.start().await?;

    assert_eq!(counter.incr().await?, NumericValue::Int(1));
    assert_eq!(counter.incr().await?, NumericValue::Int(2));
    assert_eq!(counter.decr().await?, NumericValue::Int(1));
    assert_eq!(counter.get_value().await?, NumericValue::Int(1));

    counter.set_value(NumericValue::Int(40), false).await?;
    assert_eq!(counter.incr().await?, NumericValue::Int(41));

    client.close().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_concurrent_appliers_converge() -> Result<()> {
    let server = MockServer::start().await;
    const CLIENTS: usize = 5;
    const INCREMENTS: usize = 1;

    let mut clients = Vec::new();
    for _ in 0..CLIENTS {
        clients.push(connected_client(&server).await);
    }

    // Everyone races the compare-and-swap loop on the same znode.
    let mut tasks = Vec::new();
    for client in &clients {
        let counter = Counter::new(client.clone(), "/C", false);
        tasks.push(tokio::spawn(async move {
            counter.start().await.expect("start");
            for _ in 0..INCREMENTS {
                counter.incr().await.expect("incr");
            }
        }));
    }
    for task in tasks {
        timeout(Duration::from_secs(10), task).await??;
    }

    let checker = Counter::new(clients[0].clone(), "/C", false);
    checker.start().await?;
    assert_eq!(
        checker.get_value().await?,
        NumericValue::Int((CLIENTS * INCREMENTS) as i64)
    );
    // One version bump per applied increment.
    assert_eq!(
        server.data_version("/C"),
        Some((CLIENTS * INCREMENTS) as i32)
    );

    for client in &clients {
        client.close().await;
    }
    Ok(())
}

#[tokio::test]
async fn test_float_counter() -> Result<()> {
    let server = MockServer::start().await;
    let client = connected_client(&server).await;

    let counter = Counter::new(client.clone(), "/F", true);
    counter.start().await?;

    counter.set_value(NumericValue::Float(1.5), true).await?;
    assert_eq!(counter.incr().await?, NumericValue::Float(2.5));

    client.close().await;
    Ok(())
}
