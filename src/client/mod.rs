// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

#![allow(clippy::module_inception)]
pub mod client;
pub mod common;
pub mod connection;
pub mod transaction;

pub use client::{Features, WatchWaiter, ZkClient};
pub use connection::Connection;
pub use transaction::{Transaction, TxnResult};
