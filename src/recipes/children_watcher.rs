// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use crate::{
    client::client::ZkClient,
    errors::ZkResult,
    protocol::EventKind,
    recipes::base_watcher::{BaseWatcher, WatchMode},
};

/// Follows a znode's child list.
pub struct ChildrenWatch;

impl WatchMode for ChildrenWatch {
    type Output = Vec<String>;

    const EVENTS: &'static [EventKind] = &[
        EventKind::ChildrenChanged,
        EventKind::Deleted,
        EventKind::Created,
    ];

    fn fetch(
        client: &ZkClient,
        path: &str,
    ) -> impl Future<Output = ZkResult<Self::Output>> + Send {
        async move { client.get_children(path, true).await }
    }
}

pub type ChildrenWatcher = BaseWatcher<ChildrenWatch>;
