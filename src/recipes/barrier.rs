// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Single barrier: a znode whose presence blocks waiters and whose
//! deletion lifts them.  No znode means no barrier, so `wait` on a missing
//! path returns immediately.

use std::time::Duration;

use crate::{
    client::client::ZkClient,
    errors::{ZkError, ZkResult},
    protocol::EventKind,
    recipes::{canonical_path, create_znode},
    utils::Deadline,
};

pub struct Barrier {
    client: ZkClient,
    path: String,
}

impl Barrier {
    pub fn new(client: ZkClient, path: &str) -> Self {
        Self {
            path: canonical_path(path),
            client,
        }
    }

    /// Raises the barrier (a plain permanent znode).
    pub async fn create(&self) -> ZkResult<()> {
        create_znode(&self.client, &self.path).await
    }

    /// Lifts the barrier; lifting an absent barrier is fine.
    pub async fn lift(&self) -> ZkResult<()> {
        match self.client.delete(&self.path, true).await {
            Ok(()) | Err(ZkError::NoNode) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Parks until the barrier is lifted.
    pub async fn wait(&self, timeout: Option<Duration>) -> ZkResult<()> {
        let deadline = Deadline::after(timeout);

        let lifted = self
            .client
            .wait_for_events(&[EventKind::Deleted], &self.path);

        let exists = self.client.exists(&self.path, true).await?;
        if !exists {
            return Ok(());
        }

        lifted.wait_deadline(&deadline).await.map(|_| ())
    }
}
