// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Generic fetch-loop watcher.
//!
//! One loop task runs per watched path, started with the first callback.
//! Each round fetches the current value (arming the server-side watch as a
//! side effect), hands it to every registered callback, and parks until
//! one of the mode's event kinds fires.  Emptying the callback set stops
//! the loop at its next wakeup.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::{
    client::client::ZkClient,
    errors::{ZkError, ZkResult},
    protocol::EventKind,
};

/// What a watcher fetches and which events re-trigger the fetch.
pub trait WatchMode: Send + Sync + 'static {
    type Output: Clone + Send + Sync + 'static;

    const EVENTS: &'static [EventKind];

    fn fetch(
        client: &ZkClient,
        path: &str,
    ) -> impl Future<Output = ZkResult<Self::Output>> + Send;
}

/// Callback receiving each fetched value; `None` is the gone-sentinel for
/// a path that does not exist.
pub type WatcherCallback<T> = Arc<dyn Fn(Option<T>) + Send + Sync>;

type CallbackMap<T> = DashMap<String, Vec<(u64, WatcherCallback<T>)>>;

pub struct BaseWatcher<M: WatchMode> {
    client: ZkClient,
    /// With this set, a missing path keeps the loop alive waiting for
    /// creation instead of reporting the sentinel and stopping.
    wait_for_creation: bool,
    callbacks: Arc<CallbackMap<M::Output>>,
    next_id: AtomicU64,
}

impl<M: WatchMode> BaseWatcher<M> {
    pub fn new(client: ZkClient) -> Self {
        Self {
            client,
            wait_for_creation: false,
            callbacks: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn waiting_for_creation(client: ZkClient) -> Self {
        Self {
            wait_for_creation: true,
            ..Self::new(client)
        }
    }

    /// Registers a callback; the first one on a path launches its loop.
    /// Returns an id for [`remove_callback`](Self::remove_callback).
    pub fn add_callback(&self, path: &str, callback: WatcherCallback<M::Output>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let launch = {
            let mut entry = self.callbacks.entry(path.to_string()).or_default();
            entry.push((id, callback));
            entry.len() == 1
        };

        if launch {
            let client = self.client.clone();
            let callbacks = Arc::clone(&self.callbacks);
            let path = path.to_string();
            let wait_for_creation = self.wait_for_creation;
            tokio::spawn(async move {
                watch_loop::<M>(client, callbacks, path, wait_for_creation).await;
            });
        }
        id
    }

    pub fn remove_callback(&self, path: &str, id: u64) {
        if let Some(mut entry) = self.callbacks.get_mut(path) {
            entry.retain(|(callback_id, _)| *callback_id != id);
        }
    }
}

async fn watch_loop<M: WatchMode>(
    client: ZkClient,
    callbacks: Arc<CallbackMap<M::Output>>,
    path: String,
    wait_for_creation: bool,
) {
    loop {
        let current: Vec<WatcherCallback<M::Output>> = callbacks
            .get(&path)
            .map(|entry| entry.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();
        if current.is_empty() {
            break;
        }

        // Install the completion before fetching so an event landing
        // between the fetch and the park is not missed.
        let wakeup = client.wait_for_events(M::EVENTS, &path);

        debug!(%path, "fetching watched value");
        match M::fetch(&client, &path).await {
            Ok(value) => {
                for callback in &current {
                    callback(Some(value.clone()));
                }
            },
            Err(ZkError::NoNode) => {
                if !wait_for_creation {
                    for callback in &current {
                        callback(None);
                    }
                    break;
                }
                // Arm an exists watch so creation wakes the loop; the fetch
                // against the missing node armed nothing.
                if client.exists(&path, true).await.is_err() {
                    break;
                }
            },
            Err(e) => {
                warn!(%path, error = %e, "watcher fetch failed");
                break;
            },
        }

        if wakeup.wait().await.is_err() {
            break;
        }
    }
    debug!(%path, "watch loop finished");
}
