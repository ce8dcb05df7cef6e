// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Timed leases: up to `limit` holders at a time under one base path, each
//! auto-released when its duration runs out.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use chrono::{TimeDelta, Utc};
use tokio::time::sleep;
use tracing::warn;

use crate::{
    client::client::ZkClient,
    errors::{ZkError, ZkResult},
    recipes::sequential::SequentialRecipe,
};

const LEASE_LABEL: &str = "lease";

pub struct Lease {
    seq: Arc<SequentialRecipe>,
    limit: usize,
}

impl Lease {
    pub fn new(client: ZkClient, base_path: &str, limit: usize) -> Self {
        Self {
            seq: Arc::new(SequentialRecipe::new(client, base_path)),
            limit,
        }
    }

    /// Tries to obtain a lease for `duration`.  Returns false when the
    /// holder limit is already reached.  The lease releases itself when
    /// the duration ends.
    pub async fn obtain(&self, duration: Duration) -> ZkResult<bool> {
        let lessees = match self
            .seq
            .client()
            .get_children(self.seq.base_path(), false)
            .await
        {
            Ok(children) => children,
            Err(ZkError::NoNode) => Vec::new(),
            Err(e) => return Err(e),
        };

        if lessees.len() >= self.limit {
            return Ok(false);
        }

        let expires = Utc::now()
            + TimeDelta::from_std(duration).unwrap_or_else(|_| TimeDelta::zero());
        let data = Bytes::from(expires.to_rfc3339());

        match self.seq.create_unique_znode(LEASE_LABEL, Some(data)).await {
            Ok(_) => {},
            Err(ZkError::NodeExists) => {
                warn!(base = self.seq.base_path(), "lease already obtained");
            },
            Err(e) => return Err(e),
        }

        let seq = Arc::clone(&self.seq);
        tokio::spawn(async move {
            sleep(duration).await;
            let _ = seq.delete_unique_znode(LEASE_LABEL).await;
        });

        Ok(true)
    }

    pub async fn release(&self) -> ZkResult<()> {
        self.seq.delete_unique_znode(LEASE_LABEL).await
    }
}
