// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Shared machinery for recipes built on ephemeral-sequential znodes.
//!
//! Each instance tags its znodes `label-<guid>-` and lets the server append
//! the ten-digit sequence that defines the queueing order.  At most one
//! znode per label is owned at any time.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
};

use bytes::Bytes;
use tracing::{debug, warn};

use crate::{
    client::client::ZkClient,
    errors::{ZkError, ZkResult},
    protocol::{CreateFlags, EventKind},
    recipes::canonical_path,
    session::{RetryPolicy, SessionState},
    utils::{Deadline, generate_guid, lock},
};

/// True for names carrying the server-assigned ten-digit suffix.
pub(crate) fn has_sequence_suffix(name: &str) -> bool {
    name.len() >= 10 && name.as_bytes()[name.len() - 10..]
        .iter()
        .all(u8::is_ascii_digit)
}

pub(crate) fn sequence_number(name: &str) -> i64 {
    name[name.len() - 10..].parse().unwrap_or(i64::MAX)
}

/// Strips the guid and sequence off a sibling name, leaving its label.
pub(crate) fn znode_label(name: &str) -> &str {
    name.rsplitn(3, '-').nth(2).unwrap_or(name)
}

pub struct SequentialRecipe {
    client: ZkClient,
    base_path: String,
    guid: String,
    owned_paths: Arc<StdMutex<HashMap<String, String>>>,
}

impl SequentialRecipe {
    pub fn new(client: ZkClient, base_path: &str) -> Self {
        Self {
            base_path: canonical_path(base_path),
            client,
            guid: generate_guid(),
            owned_paths: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    pub fn client(&self) -> &ZkClient {
        &self.client
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn guid(&self) -> &str {
        &self.guid
    }

    pub fn sibling_path(&self, name: &str) -> String {
        format!("{}/{name}", self.base_path)
    }

    pub fn owned_path(&self, label: &str) -> Option<String> {
        lock(&self.owned_paths).get(label).cloned()
    }

    /// Drops local knowledge of a label without touching the server; used
    /// when the owned znode has been observed to be gone.
    pub(crate) fn forget(&self, label: &str) {
        lock(&self.owned_paths).remove(label);
    }

    /// Creates `base/label-guid-<seq>` as an ephemeral sequential and
    /// records it as owned.  A missing base path is created and the attempt
    /// retried once.  Owning a still-live znode under the same label is an
    /// error.
    pub async fn create_unique_znode(
        &self,
        label: &str,
        data: Option<Bytes>,
    ) -> ZkResult<String> {
        if label.contains('/') {
            return Err(ZkError::BadArguments);
        }

        if let Some(existing) = self.owned_path(label) {
            if self.client.exists(&existing, false).await? {
                return Err(ZkError::NodeExists);
            }
            self.forget(label);
        }

        let prefix = self.sibling_path(&format!("{label}-{}-", self.guid));
        let flags = CreateFlags::EPHEMERAL | CreateFlags::SEQUENTIAL;

        let created = match self
            .client
            .create(&prefix, data.clone(), None, flags)
            .await
        {
            Ok(path) => path,
            Err(ZkError::NoNode) => {
                self.client.ensure_path(&self.base_path, None).await?;
                self.client.create(&prefix, data, None, flags).await?
            },
            Err(e) => {
                // The request may have taken effect with its reply lost;
                // sweep any stray znode carrying our guid once reconnected.
                if !e.is_data_error() {
                    self.schedule_stray_cleanup(label);
                }
                return Err(e);
            },
        };

        lock(&self.owned_paths).insert(label.to_string(), created.clone());
        Ok(created)
    }

    /// Deletes the owned znode for `label`; an already-gone znode is fine.
    pub async fn delete_unique_znode(&self, label: &str) -> ZkResult<()> {
        if let Some(path) = self.owned_path(label) {
            match self.client.delete(&path, true).await {
                Ok(()) | Err(ZkError::NoNode) => {},
                Err(e) => return Err(e),
            }
        }
        self.forget(label);
        Ok(())
    }

    /// Lists the base path's sequential children ordered by sequence and
    /// locates this instance's znodes among them by guid.
    pub async fn analyze_siblings(
        &self,
    ) -> ZkResult<(HashMap<String, usize>, Vec<String>)> {
        let mut siblings: Vec<String> = self
            .client
            .get_children(&self.base_path, false)
            .await?
            .into_iter()
            .filter(|name| has_sequence_suffix(name))
            .collect();
        siblings.sort_by_key(|name| sequence_number(name));

        let mut owned_positions = HashMap::new();
        for (index, name) in siblings.iter().enumerate() {
            if name.contains(&self.guid) {
                owned_positions.insert(znode_label(name).to_string(), index);
            }
        }

        Ok((owned_positions, siblings))
    }

    /// Parks until `sibling` disappears.  The deletion waiter is installed
    /// before the exists probe, so the znode vanishing in between cannot be
    /// missed; an already-absent sibling resolves immediately.
    pub async fn wait_on_sibling(
        &self,
        sibling: &str,
        deadline: &Deadline,
    ) -> ZkResult<()> {
        debug!(sibling, "waiting on sibling");
        let path = self.sibling_path(sibling);

        let unblocked = self.client.wait_for_events(&[EventKind::Deleted], &path);

        let exists = self.client.exists(&path, true).await?;
        if !exists {
            return Ok(());
        }

        unblocked.wait_deadline(deadline).await.map(|_| ())
    }

    /// Background sweep for znodes created under our guid whose create
    /// reply never arrived.  Runs under backoff once the session is
    /// connected again; anything matching guid and label that is not the
    /// tracked owned path gets deleted.
    fn schedule_stray_cleanup(&self, label: &str) {
        let client = self.client.clone();
        let base_path = self.base_path.clone();
        let guid = self.guid.clone();
        let owned_paths = Arc::clone(&self.owned_paths);
        let label = label.to_string();

        tokio::spawn(async move {
            let retry = RetryPolicy::exponential_backoff(2.0, Some(60.0));
            let ticket = retry.ticket();
            loop {
                if retry.enforce(&ticket).await.is_err() {
                    break;
                }
                client
                    .session()
                    .state
                    .wait_for(&[SessionState::Connected])
                    .await;

                let children = match client.get_children(&base_path, false).await {
                    Ok(children) => children,
                    Err(ZkError::NoNode) => break,
                    Err(e) => {
                        warn!(error = %e, "stray cleanup listing failed");
                        continue;
                    },
                };

                let tracked = lock(&owned_paths).get(&label).cloned();
                let mut clean = true;
                for name in children {
                    if !name.contains(&guid) || znode_label(&name) != label {
                        continue;
                    }
                    let full = format!("{base_path}/{name}");
                    if tracked.as_deref() == Some(full.as_str()) {
                        continue;
                    }
                    debug!(%full, "removing stray znode");
                    match client.delete(&full, true).await {
                        Ok(()) | Err(ZkError::NoNode) => {},
                        Err(e) => {
                            warn!(error = %e, "stray cleanup delete failed");
                            clean = false;
                        },
                    }
                }
                if clean {
                    break;
                }
            }
        });
    }
}
