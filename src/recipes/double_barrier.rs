// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Double barrier: workers gather at the entry until enough have arrived,
//! compute, then leave together.  A sentinel znode marks the barrier as
//! open; workers queue under it as ephemeral sequentials.

use std::{sync::Arc, time::Duration};

use tracing::debug;

use crate::{
    client::client::ZkClient,
    errors::{ZkError, ZkResult},
    protocol::EventKind,
    recipes::{create_znode, sequential::SequentialRecipe},
    utils::Deadline,
};

const WORKER_LABEL: &str = "worker";
const SENTINEL: &str = "sentinel";

pub struct DoubleBarrier {
    seq: Arc<SequentialRecipe>,
    min_participants: usize,
}

impl DoubleBarrier {
    pub fn new(client: ZkClient, base_path: &str, min_participants: usize) -> Self {
        Self {
            seq: Arc::new(SequentialRecipe::new(client, base_path)),
            min_participants,
        }
    }

    pub fn sentinel_path(&self) -> String {
        self.seq.sibling_path(SENTINEL)
    }

    /// Registers this worker and parks until `min_participants` have
    /// gathered.  The arrival that completes the quorum raises the
    /// sentinel, releasing everyone at once.  A failed or timed-out entry
    /// reaps the worker znode in the background.
    pub async fn enter(&self, timeout: Option<Duration>) -> ZkResult<()> {
        debug!(base = self.seq.base_path(), "entering double barrier");
        let deadline = Deadline::after(timeout);
        let sentinel = self.sentinel_path();
        let client = self.seq.client();

        let barrier_open = client.wait_for_events(&[EventKind::Created], &sentinel);
        let already_open = client.exists(&sentinel, true).await?;

        self.seq.create_unique_znode(WORKER_LABEL, None).await?;

        let result = async {
            if already_open {
                return Ok(());
            }

            let (_, participants) = self.seq.analyze_siblings().await?;
            if participants.len() >= self.min_participants {
                create_znode(client, &sentinel).await?;
                return Ok(());
            }

            barrier_open.wait_deadline(&deadline).await.map(|_| ())
        }
        .await;

        if result.is_err() {
            let seq = Arc::clone(&self.seq);
            tokio::spawn(async move {
                let _ = seq.delete_unique_znode(WORKER_LABEL).await;
            });
        }
        result
    }

    /// Leaves the barrier, parking until every worker has left.  The
    /// earliest worker waits for all others and then clears the sentinel.
    pub async fn leave(&self, timeout: Option<Duration>) -> ZkResult<()> {
        debug!(base = self.seq.base_path(), "leaving double barrier");
        let deadline = Deadline::after(timeout);

        loop {
            let (owned_positions, participants) = self.seq.analyze_siblings().await?;

            if participants.is_empty() {
                return Ok(());
            }

            if participants.len() == 1 {
                if owned_positions.contains_key(WORKER_LABEL) {
                    self.seq.delete_unique_znode(WORKER_LABEL).await?;
                    match self
                        .seq
                        .client()
                        .delete(&self.sentinel_path(), true)
                        .await
                    {
                        Ok(()) | Err(ZkError::NoNode) => {},
                        Err(e) => return Err(e),
                    }
                }
                return Ok(());
            }

            match owned_positions.get(WORKER_LABEL) {
                Some(0) => {
                    // First in line holds out until the last worker leaves.
                    let last = participants[participants.len() - 1].clone();
                    self.seq.wait_on_sibling(&last, &deadline).await?;
                },
                Some(_) => {
                    self.seq.delete_unique_znode(WORKER_LABEL).await?;
                    self.seq
                        .wait_on_sibling(&participants[0], &deadline)
                        .await?;
                },
                None => {
                    // Already deregistered; wait for the head to clear out.
                    self.seq
                        .wait_on_sibling(&participants[0], &deadline)
                        .await?;
                },
            }
        }
    }
}
