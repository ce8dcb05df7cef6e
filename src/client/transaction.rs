// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Builder for multi-operation batches and projection of their results.

use std::collections::HashSet;

use bytes::Bytes;

use crate::{
    client::client::ZkClient,
    errors::{ZkError, ZkResult},
    protocol::{
        Acl, CheckVersionRequest, CreateFlags, CreateRequest, DeleteRequest, Request,
        Response, SetDataRequest, TransactionRequest,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpKind {
    Checked,
    Created,
    Updated,
    Deleted,
}

/// Accumulates checks, creates, sets and deletes, then commits them as one
/// atomic request.
pub struct Transaction {
    client: ZkClient,
    request: TransactionRequest,
    /// Denormalized path and outcome bucket per sub-operation, in order.
    ops: Vec<(OpKind, String)>,
}

impl Transaction {
    pub(crate) fn new(client: ZkClient) -> Self {
        Self {
            client,
            request: TransactionRequest::default(),
            ops: Vec::new(),
        }
    }

    pub fn check_version(&mut self, path: &str, version: i32) {
        let normalized = self.client.normalize_path(path);
        self.ops
            .push((OpKind::Checked, self.client.denormalize_path(&normalized)));
        self.request.add(Request::CheckVersion(CheckVersionRequest {
            path: normalized,
            version,
        }));
    }

    pub fn create(
        &mut self,
        path: &str,
        data: Option<Bytes>,
        acl: Option<Vec<Acl>>,
        flags: CreateFlags,
    ) -> ZkResult<()> {
        let features = self.client.features();
        if flags.contains(CreateFlags::CONTAINER) && !features.containers {
            return Err(ZkError::BadArguments);
        }

        let normalized = self.client.normalize_path(path);
        self.ops
            .push((OpKind::Created, self.client.denormalize_path(&normalized)));
        self.request.add(Request::Create(CreateRequest {
            path: normalized,
            data,
            acl: acl.unwrap_or_else(|| vec![
                crate::protocol::UNRESTRICTED_ACCESS.clone(),
            ]),
            flags,
            with_stat: features.create_with_stat,
        }));
        Ok(())
    }

    pub fn set_data(&mut self, path: &str, data: Option<Bytes>, version: i32) {
        let normalized = self.client.normalize_path(path);
        self.ops
            .push((OpKind::Updated, self.client.denormalize_path(&normalized)));
        self.request.add(Request::SetData(SetDataRequest {
            path: normalized,
            data,
            version,
        }));
    }

    pub fn delete(&mut self, path: &str, version: i32) {
        let normalized = self.client.normalize_path(path);
        self.ops
            .push((OpKind::Deleted, self.client.denormalize_path(&normalized)));
        self.request.add(Request::Delete(DeleteRequest {
            path: normalized,
            version,
        }));
    }

    /// Sends the batch and buckets the per-operation outcomes.  The server
    /// applies all or none; a failed batch comes back with every slot an
    /// error and therefore an empty result.
    pub async fn commit(self) -> ZkResult<TxnResult> {
        if self.request.ops.is_empty() {
            return Err(ZkError::BadArguments);
        }

        let response = self
            .client
            .send(Request::Transaction(self.request))
            .await?;
        let Response::Transaction(txn) = response else {
            return Err(ZkError::Decode(
                "unexpected reply to transaction".to_string(),
            ));
        };

        let mut result = TxnResult::default();
        for ((kind, path), reply) in self.ops.into_iter().zip(txn.results.into_iter()) {
            if reply.is_err() {
                continue;
            }
            match kind {
                OpKind::Checked => result.checked.insert(path),
                OpKind::Created => result.created.insert(path),
                OpKind::Updated => result.updated.insert(path),
                OpKind::Deleted => result.deleted.insert(path),
            };
        }
        Ok(result)
    }

    /// Commits and raises `TransactionFailed` when nothing succeeded.
    pub async fn commit_checked(self) -> ZkResult<TxnResult> {
        let result = self.commit().await?;
        if !result.succeeded() {
            return Err(ZkError::TransactionFailed);
        }
        Ok(result)
    }
}

/// Outcome of a committed transaction, bucketed by operation kind and keyed
/// by denormalized path.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TxnResult {
    pub checked: HashSet<String>,
    pub created: HashSet<String>,
    pub updated: HashSet<String>,
    pub deleted: HashSet<String>,
}

impl TxnResult {
    /// True when at least one sub-operation succeeded.
    pub fn succeeded(&self) -> bool {
        !self.checked.is_empty()
            || !self.created.is_empty()
            || !self.updated.is_empty()
            || !self.deleted.is_empty()
    }
}
