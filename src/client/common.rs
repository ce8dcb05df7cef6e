// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// Why a guarded I/O future did not produce a value.
#[derive(Debug)]
pub(super) enum IoFailure {
    Cancelled,
    Timeout,
    Io(std::io::Error),
}

pub(super) async fn io_with_timeout<F, T>(
    fut: F,
    io_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<T, IoFailure>
where
    F: Future<Output = std::io::Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(IoFailure::Cancelled),
        res = timeout(io_timeout, fut) => {
            match res {
                Ok(Ok(v)) => Ok(v),
                Ok(Err(e)) => Err(IoFailure::Io(e)),
                Err(_) => Err(IoFailure::Timeout),
            }
        }
    }
}
