// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;

use crate::{
    client::client::ZkClient,
    errors::ZkResult,
    protocol::EventKind,
    recipes::base_watcher::{BaseWatcher, WatchMode},
};

/// Follows a znode's data.
pub struct DataWatch;

impl WatchMode for DataWatch {
    type Output = Bytes;

    const EVENTS: &'static [EventKind] = &[
        EventKind::DataChanged,
        EventKind::Deleted,
        EventKind::Created,
    ];

    fn fetch(
        client: &ZkClient,
        path: &str,
    ) -> impl Future<Output = ZkResult<Self::Output>> + Send {
        async move {
            let data = client.get_data(path, true).await?;
            Ok(data.unwrap_or_default())
        }
    }
}

pub type DataWatcher = BaseWatcher<DataWatch>;
