// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::Result;
use serial_test::serial;
use tokio::time::{sleep, timeout};
use zookeeper_client_rs::{errors::ZkError, recipes::Lock};

use super::common::{MockServer, connected_client};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_acquisition_order_is_queue_order() -> Result<()> {
    let server = MockServer::start().await;

    let client_a = connected_client(&server).await;
    let client_b = connected_client(&server).await;
    let client_c = connected_client(&server).await;

    let lock_a = Lock::new(client_a.clone(), "/L");
    let lock_b = Arc::new(Lock::new(client_b.clone(), "/L"));
    let lock_c = Arc::new(Lock::new(client_c.clone(), "/L"));

    lock_a.acquire(None).await?;

    let order: Arc<Mutex<Vec<char>>> = Arc::new(Mutex::new(Vec::new()));

    let task_b = {
        let lock = Arc::clone(&lock_b);
        let order = Arc::clone(&order);
        tokio::spawn(async move {
            lock.acquire(None).await.expect("b acquires");
            order.lock().expect("order").push('b');
            sleep(Duration::from_millis(100)).await;
            lock.release().await.expect("b releases");
        })
    };
    sleep(Duration::from_millis(150)).await;
    let task_c = {
        let lock = Arc::clone(&lock_c);
        let order = Arc::clone(&order);
        tokio::spawn(async move {
            lock.acquire(None).await.expect("c acquires");
            order.lock().expect("order").push('c');
            lock.release().await.expect("c releases");
        })
    };

    // Both contenders are queued behind the holder.
    sleep(Duration::from_millis(300)).await;
    assert!(order.lock().expect("order").is_empty());

    lock_a.release().await?;

    timeout(Duration::from_secs(5), task_b).await??;
    timeout(Duration::from_secs(5), task_c).await??;
    assert_eq!(*order.lock().expect("order"), vec!['b', 'c']);

    client_a.close().await;
    client_b.close().await;
    client_c.close().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn test_holder_session_death_releases_waiter() -> Result<()> {
    let server = MockServer::start().await;

    let client_a = connected_client(&server).await;
    let client_b = connected_client(&server).await;

    let lock_a = Lock::new(client_a.clone(), "/L");
    let lock_b = Arc::new(Lock::new(client_b.clone(), "/L"));

    lock_a.acquire(None).await?;

    let waiter = {
        let lock = Arc::clone(&lock_b);
        tokio::spawn(async move {
            lock.acquire(None).await.expect("b acquires");
        })
    };
    sleep(Duration::from_millis(300)).await;
    assert!(!lock_b.is_locked());

    // Ending the holder's session reaps its ephemeral; no explicit release.
    client_a.close().await;

    timeout(Duration::from_secs(5), waiter).await??;
    assert!(lock_b.is_locked());

    lock_b.release().await?;
    client_b.close().await;
    Ok(())
}

#[tokio::test]
async fn test_acquire_timeout_leaves_nothing_behind() -> Result<()> {
    let server = MockServer::start().await;

    let holder = connected_client(&server).await;
    let contender = connected_client(&server).await;

    let held = Lock::new(holder.clone(), "/L");
    held.acquire(None).await?;

    let lock = Lock::new(contender.clone(), "/L");
    assert_eq!(
        lock.acquire(Some(Duration::from_millis(300))).await,
        Err(ZkError::Timeout)
    );

    // Only the holder's znode remains in the queue.
    sleep(Duration::from_millis(200)).await;
    assert_eq!(server.children("/L").len(), 1);

    // The instance is reusable after a timeout.
    held.release().await?;
    lock.acquire(Some(Duration::from_secs(5))).await?;
    lock.release().await?;

    holder.close().await;
    contender.close().await;
    Ok(())
}

#[tokio::test]
async fn test_reentrant_acquire_is_refused() -> Result<()> {
    let server = MockServer::start().await;
    let client = connected_client(&server).await;

    let lock = Lock::new(client.clone(), "/L");
    lock.acquire(None).await?;
    assert!(matches!(
        lock.acquire(None).await,
        Err(ZkError::InvalidClientState(_))
    ));

    lock.release().await?;
    client.close().await;
    Ok(())
}
