// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Leader election.
//!
//! Volunteers queue as candidates; position zero holds leadership.  When
//! the leader's ephemeral vanishes, its immediate successor observes the
//! deletion and promotes itself — no thundering herd.

use std::{
    sync::{Arc, Mutex as StdMutex},
    time::Duration,
};

use tokio::{sync::watch, task::JoinHandle, time::timeout};
use tracing::{debug, error, warn};

use crate::{
    client::client::ZkClient,
    errors::{ZkError, ZkResult},
    recipes::sequential::SequentialRecipe,
    utils::{Deadline, lock},
};

const CANDIDATE_LABEL: &str = "candidate";

pub struct LeaderElection {
    seq: Arc<SequentialRecipe>,
    leadership: Arc<watch::Sender<bool>>,
    watch_task: StdMutex<Option<JoinHandle<()>>>,
}

impl LeaderElection {
    pub fn new(client: ZkClient, base_path: &str) -> Self {
        let (leadership, _) = watch::channel(false);
        Self {
            seq: Arc::new(SequentialRecipe::new(client, base_path)),
            leadership: Arc::new(leadership),
            watch_task: StdMutex::new(None),
        }
    }

    pub fn has_leadership(&self) -> bool {
        *self.leadership.borrow()
    }

    /// Enters the candidate queue and starts watching the position ahead.
    pub async fn volunteer(&self) -> ZkResult<()> {
        self.seq.create_unique_znode(CANDIDATE_LABEL, None).await?;

        let seq = Arc::clone(&self.seq);
        let leadership = Arc::clone(&self.leadership);
        let mut slot = lock(&self.watch_task);
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(async move {
            watch_loop(seq, leadership).await;
        }));
        Ok(())
    }

    /// Parks until this candidate is promoted, bounded by `timeout`.
    pub async fn wait_for_leadership(&self, wait: Option<Duration>) -> ZkResult<()> {
        if self.has_leadership() {
            return Ok(());
        }

        let mut rx = self.leadership.subscribe();
        let promoted = async {
            rx.wait_for(|leader| *leader).await.map(|_| ()).map_err(|_| {
                ZkError::InvalidClientState("election dropped".to_string())
            })
        };

        match wait {
            None => promoted.await,
            Some(wait) => match timeout(wait, promoted).await {
                Ok(result) => result,
                Err(_) => Err(ZkError::Timeout),
            },
        }
    }

    /// Leaves the queue.  A sitting leader abdicates; its successor
    /// observes the deletion and takes over.
    pub async fn resign(&self) -> ZkResult<()> {
        if let Some(task) = lock(&self.watch_task).take() {
            task.abort();
        }
        self.seq.delete_unique_znode(CANDIDATE_LABEL).await?;
        self.leadership.send_replace(false);
        debug!("resigned from election");
        Ok(())
    }
}

async fn watch_loop(seq: Arc<SequentialRecipe>, leadership: Arc<watch::Sender<bool>>) {
    loop {
        let (owned_positions, candidates) = match seq.analyze_siblings().await {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "election sibling analysis failed");
                return;
            },
        };

        let Some(&position) = owned_positions.get(CANDIDATE_LABEL) else {
            error!("candidate znode is gone, leaving election");
            return;
        };

        if position == 0 {
            debug!("took leadership");
            leadership.send_replace(true);
            return;
        }

        let predecessor = candidates[position - 1].clone();
        if let Err(e) = seq
            .wait_on_sibling(&predecessor, &Deadline::indefinite())
            .await
        {
            warn!(error = %e, "wait on predecessor failed, re-checking position");
        }
    }
}
