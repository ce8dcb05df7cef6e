// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Local cache of a whole subtree, kept current by data and children
//! watchers on every cached node.

use std::{
    collections::{HashMap, HashSet},
    pin::Pin,
    sync::{Arc, Mutex as StdMutex, Weak},
};

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    client::client::ZkClient,
    errors::ZkResult,
    recipes::{
        canonical_path, children_watcher::ChildrenWatcher, data_watcher::DataWatcher,
    },
    utils::lock,
};

pub struct TreeCache {
    client: ZkClient,
    base_path: String,
    data_watcher: Arc<DataWatcher>,
    child_watcher: Arc<ChildrenWatcher>,
    root: StdMutex<Option<Arc<ZNodeCache>>>,
}

impl TreeCache {
    pub fn new(client: ZkClient, base_path: &str) -> Self {
        Self {
            base_path: canonical_path(base_path),
            data_watcher: Arc::new(DataWatcher::new(client.clone())),
            child_watcher: Arc::new(ChildrenWatcher::new(client.clone())),
            client,
            root: StdMutex::new(None),
        }
    }

    /// Populates the cache recursively and installs the watchers that keep
    /// it current.
    pub async fn start(&self) -> ZkResult<()> {
        debug!(base = %self.base_path, "starting tree cache");
        self.client.ensure_path(&self.base_path, None).await?;

        let root = Arc::new(ZNodeCache::new(
            self.base_path.clone(),
            self.client.clone(),
            Arc::clone(&self.data_watcher),
            Arc::clone(&self.child_watcher),
        ));
        Arc::clone(&root).start().await?;
        *lock(&self.root) = Some(root);
        Ok(())
    }

    /// Detaches every watcher callback; the cached values stay readable.
    pub fn stop(&self) {
        if let Some(root) = lock(&self.root).take() {
            root.stop();
        }
    }

    /// Projects the cached subtree: internal nodes become objects keyed by
    /// child name, leaves expose their data.
    pub fn as_map(&self) -> Value {
        match lock(&self.root).as_ref() {
            Some(root) => root.as_value(),
            None => Value::Null,
        }
    }
}

/// One cached znode: its data and its children, each child a nested cache.
pub struct ZNodeCache {
    path: String,
    client: ZkClient,
    data_watcher: Arc<DataWatcher>,
    child_watcher: Arc<ChildrenWatcher>,
    data: StdMutex<Option<Bytes>>,
    children: StdMutex<HashMap<String, Arc<ZNodeCache>>>,
    watch_ids: StdMutex<Option<(u64, u64)>>,
}

impl ZNodeCache {
    fn new(
        path: String,
        client: ZkClient,
        data_watcher: Arc<DataWatcher>,
        child_watcher: Arc<ChildrenWatcher>,
    ) -> Self {
        Self {
            path,
            client,
            data_watcher,
            child_watcher,
            data: StdMutex::new(None),
            children: StdMutex::new(HashMap::new()),
            watch_ids: StdMutex::new(None),
        }
    }

    pub fn value(&self) -> Option<Bytes> {
        lock(&self.data).clone()
    }

    fn child_node(&self, name: &str) -> Arc<ZNodeCache> {
        Arc::new(ZNodeCache::new(
            format!("{}/{name}", self.path),
            self.client.clone(),
            Arc::clone(&self.data_watcher),
            Arc::clone(&self.child_watcher),
        ))
    }

    fn start(self: Arc<Self>) -> Pin<Box<dyn Future<Output = ZkResult<()>> + Send>> {
        Box::pin(async move {
            let data = self.client.get_data(&self.path, false).await?;
            let child_names = self.client.get_children(&self.path, false).await?;

            *lock(&self.data) = data;

            let mut added = Vec::new();
            {
                let mut children = lock(&self.children);
                for name in child_names {
                    let node = self.child_node(&name);
                    children.insert(name, Arc::clone(&node));
                    added.push(node);
                }
            }
            for child in added {
                child.start().await?;
            }

            // Watch callbacks hold weak references; the parent chain from
            // the cache root is the only owner.
            let data_id = {
                let node = Arc::downgrade(&self);
                self.data_watcher.add_callback(
                    &self.path,
                    Arc::new(move |value: Option<Bytes>| {
                        if let Some(node) = node.upgrade() {
                            node.apply_data(value);
                        }
                    }),
                )
            };
            let child_id = {
                let node: Weak<ZNodeCache> = Arc::downgrade(&self);
                self.child_watcher.add_callback(
                    &self.path,
                    Arc::new(move |value: Option<Vec<String>>| {
                        if let Some(node) = node.upgrade() {
                            node.apply_children(value.unwrap_or_default());
                        }
                    }),
                )
            };
            *lock(&self.watch_ids) = Some((data_id, child_id));

            Ok(())
        })
    }

    fn stop(&self) {
        if let Some((data_id, child_id)) = lock(&self.watch_ids).take() {
            self.data_watcher.remove_callback(&self.path, data_id);
            self.child_watcher.remove_callback(&self.path, child_id);
        }
        for child in lock(&self.children).values() {
            child.stop();
        }
    }

    fn apply_data(&self, value: Option<Bytes>) {
        debug!(path = %self.path, gone = value.is_none(), "cached data updated");
        *lock(&self.data) = value;
    }

    /// Diffs the new child list against the cached one: dropped subtrees
    /// are stopped and discarded, new ones constructed and started.
    fn apply_children(self: &Arc<Self>, new_children: Vec<String>) {
        let mut added = Vec::new();
        {
            let mut children = lock(&self.children);
            let incoming: HashSet<&String> = new_children.iter().collect();

            let removed: Vec<String> = children
                .keys()
                .filter(|name| !incoming.contains(name))
                .cloned()
                .collect();
            for name in removed {
                if let Some(node) = children.remove(&name) {
                    debug!(path = %node.path, "removed cached subtree");
                    node.stop();
                }
            }

            for name in &new_children {
                if !children.contains_key(name) {
                    let node = self.child_node(name);
                    debug!(path = %node.path, "added cached subtree");
                    children.insert(name.clone(), Arc::clone(&node));
                    added.push(node);
                }
            }
        }

        for node in added {
            tokio::spawn(async move {
                let path = node.path.clone();
                if let Err(e) = node.start().await {
                    warn!(%path, error = %e, "failed to start cached subtree");
                }
            });
        }
    }

    fn as_value(&self) -> Value {
        let children = lock(&self.children);
        if !children.is_empty() {
            return Value::Object(
                children
                    .iter()
                    .map(|(name, node)| (name.clone(), node.as_value()))
                    .collect(),
            );
        }
        match lock(&self.data).as_ref() {
            Some(data) => Value::String(String::from_utf8_lossy(data).into_owned()),
            None => Value::Null,
        }
    }
}
