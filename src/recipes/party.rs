// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Named ephemeral membership under a base path.  A children watcher keeps
//! a local view of who is present; observers can await the next change.

use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::Notify;

use crate::{
    client::client::ZkClient,
    errors::ZkResult,
    recipes::{
        children_watcher::ChildrenWatcher,
        sequential::{SequentialRecipe, znode_label},
    },
    utils::lock,
};

pub struct Party {
    seq: SequentialRecipe,
    name: String,
    watcher: Arc<ChildrenWatcher>,
    members: Arc<StdMutex<Vec<String>>>,
    changed: Arc<Notify>,
    callback_id: StdMutex<Option<u64>>,
}

impl Party {
    pub fn new(client: ZkClient, base_path: &str, name: &str) -> Self {
        Self {
            watcher: Arc::new(ChildrenWatcher::new(client.clone())),
            seq: SequentialRecipe::new(client, base_path),
            name: name.to_string(),
            members: Arc::new(StdMutex::new(Vec::new())),
            changed: Arc::new(Notify::new()),
            callback_id: StdMutex::new(None),
        }
    }

    /// Current view of member labels, in arrival order.
    pub fn members(&self) -> Vec<String> {
        lock(&self.members).clone()
    }

    pub async fn join(&self) -> ZkResult<()> {
        self.seq.create_unique_znode(&self.name, None).await?;

        let (_, siblings) = self.seq.analyze_siblings().await?;
        update_members(&self.members, &self.changed, siblings);

        let members = Arc::clone(&self.members);
        let changed = Arc::clone(&self.changed);
        let id = self.watcher.add_callback(
            self.seq.base_path(),
            Arc::new(move |children: Option<Vec<String>>| {
                update_members(&members, &changed, children.unwrap_or_default());
            }),
        );
        *lock(&self.callback_id) = Some(id);
        Ok(())
    }

    /// Parks until the membership changes after this call.
    pub async fn wait_for_change(&self) {
        self.changed.notified().await;
    }

    pub async fn leave(&self) -> ZkResult<()> {
        if let Some(id) = lock(&self.callback_id).take() {
            self.watcher.remove_callback(self.seq.base_path(), id);
        }
        self.seq.delete_unique_znode(&self.name).await
    }
}

fn update_members(
    members: &StdMutex<Vec<String>>,
    changed: &Notify,
    raw_sibling_names: Vec<String>,
) {
    let new_members: Vec<String> = raw_sibling_names
        .iter()
        .map(|name| znode_label(name).to_string())
        .collect();
    *lock(members) = new_members;
    changed.notify_waiters();
}
