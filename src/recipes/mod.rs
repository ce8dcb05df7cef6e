// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Coordination recipes built on znode primitives.

pub mod barrier;
pub mod base_watcher;
pub mod children_watcher;
pub mod counter;
pub mod data_watcher;
pub mod double_barrier;
pub mod election;
pub mod lease;
pub mod lock;
pub mod party;
pub mod sequential;
pub mod shared_lock;
pub mod tree_cache;

pub use barrier::Barrier;
pub use base_watcher::{BaseWatcher, WatchMode, WatcherCallback};
pub use children_watcher::{ChildrenWatch, ChildrenWatcher};
pub use counter::{Counter, NumericValue};
pub use data_watcher::{DataWatch, DataWatcher};
pub use double_barrier::DoubleBarrier;
pub use election::LeaderElection;
pub use lease::Lease;
pub use lock::Lock;
pub use party::Party;
pub use sequential::SequentialRecipe;
pub use shared_lock::SharedLock;
pub use tree_cache::TreeCache;

use crate::{
    client::client::ZkClient,
    errors::{ZkError, ZkResult},
    protocol::CreateFlags,
};

/// Creates a plain znode, tolerating a missing parent chain and a
/// concurrent creation.
pub(crate) async fn create_znode(client: &ZkClient, path: &str) -> ZkResult<()> {
    match client.create(path, None, None, CreateFlags::empty()).await {
        Ok(_) | Err(ZkError::NodeExists) => Ok(()),
        Err(ZkError::NoNode) => {
            client.ensure_path(&parent_path(path), None).await?;
            match client.create(path, None, None, CreateFlags::empty()).await {
                Ok(_) | Err(ZkError::NodeExists) => Ok(()),
                Err(e) => Err(e),
            }
        },
        Err(e) => Err(e),
    }
}

pub(crate) fn parent_path(path: &str) -> String {
    match path.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
    }
}

/// Canonicalizes a recipe base path without applying the client's chroot;
/// recipes keep all paths in client space and let each operation do the
/// chroot translation.
pub(crate) fn canonical_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}
