// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Optimistic counter stored as decimal ASCII in a single znode.

use core::fmt;

use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    client::client::ZkClient,
    errors::{ZkError, ZkResult},
    protocol::CreateFlags,
    recipes::{canonical_path, parent_path},
};

/// The counter value, integer by default or float when configured so.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericValue {
    Int(i64),
    Float(f64),
}

impl NumericValue {
    fn parse(raw: &[u8], use_float: bool) -> ZkResult<Self> {
        let text = std::str::from_utf8(raw)
            .map_err(|_| ZkError::Decode("counter data is not utf-8".to_string()))?
            .trim();
        if text.is_empty() {
            return Ok(if use_float { Self::Float(0.0) } else { Self::Int(0) });
        }
        if use_float {
            text.parse()
                .map(Self::Float)
                .map_err(|_| ZkError::Decode(format!("bad float counter: {text:?}")))
        } else {
            text.parse()
                .map(Self::Int)
                .map_err(|_| ZkError::Decode(format!("bad int counter: {text:?}")))
        }
    }

    pub fn offset(self, delta: i64) -> Self {
        match self {
            Self::Int(value) => Self::Int(value + delta),
            Self::Float(value) => Self::Float(value + delta as f64),
        }
    }
}

impl fmt::Display for NumericValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
        }
    }
}

struct CounterState {
    value: NumericValue,
    version: i32,
}

pub struct Counter {
    client: ZkClient,
    base_path: String,
    use_float: bool,
    state: Mutex<CounterState>,
}

impl Counter {
    pub fn new(client: ZkClient, base_path: &str, use_float: bool) -> Self {
        Self {
            base_path: canonical_path(base_path),
            client,
            use_float,
            state: Mutex::new(CounterState {
                value: if use_float {
                    NumericValue::Float(0.0)
                } else {
                    NumericValue::Int(0)
                },
                version: -1,
            }),
        }
    }

    /// Creates the counter znode with a zero default when absent, then
    /// loads the current value and version.
    pub async fn start(&self) -> ZkResult<()> {
        if !self.client.exists(&self.base_path, false).await? {
            let default = if self.use_float { "0.0" } else { "0" };
            let data = Some(Bytes::from_static(default.as_bytes()));
            match self
                .client
                .create(&self.base_path, data.clone(), None, CreateFlags::empty())
                .await
            {
                Ok(_) | Err(ZkError::NodeExists) => {},
                Err(ZkError::NoNode) => {
                    self.client
                        .ensure_path(&parent_path(&self.base_path), None)
                        .await?;
                    match self
                        .client
                        .create(&self.base_path, data, None, CreateFlags::empty())
                        .await
                    {
                        Ok(_) | Err(ZkError::NodeExists) => {},
                        Err(e) => return Err(e),
                    }
                },
                Err(e) => return Err(e),
            }
        }
        self.fetch().await.map(|_| ())
    }

    async fn fetch(&self) -> ZkResult<NumericValue> {
        let (data, stat) = self.client.get(&self.base_path, false).await?;
        let value =
            NumericValue::parse(data.as_deref().unwrap_or_default(), self.use_float)?;
        let mut state = self.state.lock().await;
        state.value = value;
        state.version = stat.version;
        Ok(value)
    }

    /// Round-trips to the server for the current value.
    pub async fn get_value(&self) -> ZkResult<NumericValue> {
        self.fetch().await
    }

    pub async fn set_value(&self, value: NumericValue, force: bool) -> ZkResult<()> {
        let version = if force {
            -1
        } else {
            self.state.lock().await.version
        };
        let stat = self
            .client
            .set(&self.base_path, Some(Bytes::from(value.to_string())), version)
            .await?;
        let mut state = self.state.lock().await;
        state.value = value;
        state.version = stat.version;
        debug!(%value, "set counter value");
        Ok(())
    }

    /// Compare-and-swap loop: applies `operation` to the known value and
    /// writes under the known version; a version miss refetches and tries
    /// again.  Concurrent appliers all land exactly once.
    pub async fn apply_operation(
        &self,
        operation: impl Fn(NumericValue) -> NumericValue,
    ) -> ZkResult<NumericValue> {
        loop {
            let (current, version) = {
                let state = self.state.lock().await;
                (state.value, state.version)
            };
            let next = operation(current);

            match self
                .client
                .set(&self.base_path, Some(Bytes::from(next.to_string())), version)
                .await
            {
                Ok(stat) => {
                    let mut state = self.state.lock().await;
                    state.value = next;
                    state.version = stat.version;
                    return Ok(next);
                },
                Err(ZkError::BadVersion) => {
                    debug!("counter version mismatch, retrying");
                    self.fetch().await?;
                },
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn incr(&self) -> ZkResult<NumericValue> {
        self.apply_operation(|value| value.offset(1)).await
    }

    pub async fn decr(&self) -> ZkResult<NumericValue> {
        self.apply_operation(|value| value.offset(-1)).await
    }
}
