// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Reader/writer lock over one queue.
//!
//! Readers and writers share the base path; a reader only waits behind
//! writers ahead of it, while a writer waits behind everyone.

use std::{collections::HashSet, time::Duration};

use crate::{client::client::ZkClient, errors::ZkResult, recipes::lock::Lock};

pub struct SharedLock {
    read: Lock,
    write: Lock,
}

impl SharedLock {
    pub fn new(client: ZkClient, base_path: &str) -> Self {
        let blocked_by: HashSet<String> = ["write".to_string()].into_iter().collect();
        Self {
            read: Lock::with_label(client.clone(), base_path, "read", Some(blocked_by)),
            write: Lock::with_label(client, base_path, "write", None),
        }
    }

    pub async fn acquire_read(&self, timeout: Option<Duration>) -> ZkResult<()> {
        self.read.acquire(timeout).await
    }

    pub async fn acquire_write(&self, timeout: Option<Duration>) -> ZkResult<()> {
        self.write.acquire(timeout).await
    }

    pub async fn release_read(&self) -> ZkResult<()> {
        self.read.release().await
    }

    pub async fn release_write(&self) -> ZkResult<()> {
        self.write.release().await
    }

    pub fn reader(&self) -> &Lock {
        &self.read
    }

    pub fn writer(&self) -> &Lock {
        &self.write
    }
}
