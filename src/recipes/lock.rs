// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Distributed exclusive lock.
//!
//! Contenders queue as ephemeral sequentials under the base path and each
//! waits on the sibling directly ahead of it, so a release (or a died
//! session) wakes exactly one waiter.

use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex as StdMutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{
    client::client::ZkClient,
    errors::{ZkError, ZkResult},
    recipes::sequential::{SequentialRecipe, znode_label},
    session::SessionState,
    utils::{Deadline, lock},
};

pub struct Lock {
    seq: SequentialRecipe,
    label: String,
    /// When set, only siblings carrying one of these labels block us; the
    /// shared lock uses this so readers pass other readers.
    blocked_by: Option<HashSet<String>>,

    in_use: AtomicBool,
    locked: AtomicBool,
    lost: Arc<AtomicBool>,
    monitor: StdMutex<Option<JoinHandle<()>>>,
}

impl Lock {
    pub fn new(client: ZkClient, base_path: &str) -> Self {
        Self::with_label(client, base_path, "lock", None)
    }

    pub(crate) fn with_label(
        client: ZkClient,
        base_path: &str,
        label: &str,
        blocked_by: Option<HashSet<String>>,
    ) -> Self {
        Self {
            seq: SequentialRecipe::new(client, base_path),
            label: label.to_string(),
            blocked_by,
            in_use: AtomicBool::new(false),
            locked: AtomicBool::new(false),
            lost: Arc::new(AtomicBool::new(false)),
            monitor: StdMutex::new(None),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// True once the session died while the lock was held; the holder no
    /// longer owns anything server-side.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// Queues for the lock and parks until every blocker ahead is gone or
    /// the timeout runs out.  One acquire at a time per instance.
    pub async fn acquire(&self, timeout: Option<Duration>) -> ZkResult<()> {
        if self.in_use.swap(true, Ordering::SeqCst) {
            return Err(ZkError::InvalidClientState(
                "lock instance already acquiring or held".to_string(),
            ));
        }

        let deadline = Deadline::after(timeout);
        let result = self.wait_in_line(&deadline).await;
        if result.is_err() {
            self.in_use.store(false, Ordering::SeqCst);
        }
        result
    }

    async fn wait_in_line(&self, deadline: &Deadline) -> ZkResult<()> {
        loop {
            if deadline.has_passed() {
                let _ = self.seq.delete_unique_znode(&self.label).await;
                return Err(ZkError::Timeout);
            }

            match self.seq.create_unique_znode(&self.label, None).await {
                // NodeExists: our znode from a previous round is still
                // there, keep queueing with it.
                Ok(_) | Err(ZkError::NodeExists) => {},
                Err(ZkError::SessionLost) => {
                    self.wait_until_connected().await;
                    continue;
                },
                Err(e) => return Err(e),
            }

            let (owned_positions, siblings) = match self.seq.analyze_siblings().await {
                Ok(result) => result,
                Err(ZkError::SessionLost) => {
                    self.wait_until_connected().await;
                    continue;
                },
                Err(e) => return Err(e),
            };

            let Some(&position) = owned_positions.get(&self.label) else {
                // The ephemeral vanished: the session must have expired in
                // between.  Queue again from scratch.
                warn!(label = %self.label, "queued znode disappeared, re-queueing");
                self.seq.forget(&self.label);
                self.wait_until_connected().await;
                continue;
            };

            let mut blockers: Vec<&String> = siblings[..position].iter().collect();
            if let Some(blocked_by) = &self.blocked_by {
                blockers.retain(|name| blocked_by.contains(znode_label(name)));
            }

            let Some(&last_blocker) = blockers.last() else {
                break;
            };

            match self.seq.wait_on_sibling(last_blocker, deadline).await {
                Ok(()) => {},
                Err(ZkError::Timeout) => {
                    let _ = self.seq.delete_unique_znode(&self.label).await;
                    return Err(ZkError::Timeout);
                },
                Err(ZkError::SessionLost) => {
                    self.wait_until_connected().await;
                },
                Err(e) => return Err(e),
            }
        }

        self.start_session_loss_monitor();
        self.locked.store(true, Ordering::SeqCst);
        debug!(label = %self.label, "lock acquired");
        Ok(())
    }

    async fn wait_until_connected(&self) {
        self.seq
            .client()
            .session()
            .state
            .wait_for(&[SessionState::Connected])
            .await;
    }

    /// Watches for the session dropping to lost while the lock is held.
    /// The flag is the only signal: the znode is already gone server-side.
    fn start_session_loss_monitor(&self) {
        let session = Arc::clone(self.seq.client().session());
        let lost = Arc::clone(&self.lost);
        let label = self.label.clone();

        let mut slot = lock(&self.monitor);
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(async move {
            session.state.wait_for(&[SessionState::Lost]).await;
            lost.store(true, Ordering::SeqCst);
            warn!(%label, "session lost, lock is no longer held");
        }));
    }

    /// Releases the lock.  Flags always clear, even when the delete fails,
    /// so the instance stays usable.
    pub async fn release(&self) -> ZkResult<()> {
        if let Some(monitor) = lock(&self.monitor).take() {
            monitor.abort();
        }
        self.locked.store(false, Ordering::SeqCst);
        self.lost.store(false, Ordering::SeqCst);

        let result = self.seq.delete_unique_znode(&self.label).await;
        self.in_use.store(false, Ordering::SeqCst);
        result
    }
}
