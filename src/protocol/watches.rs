// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Watch events and watch management operations.

use bytes::{Bytes, BytesMut};

use crate::{
    errors::ZkResult,
    protocol::{
        primitives::{
            Record, get_i32, get_ustring, put_i32, put_i64, put_string_vec,
            put_ustring,
        },
        request::{OpCode, RequestRecord},
    },
};

/// Kinds of znode change a watch can fire for.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Created = 1,
    Deleted = 2,
    DataChanged = 3,
    ChildrenChanged = 4,
}

impl EventKind {
    pub fn from_i32(value: i32) -> Option<Self> {
        Some(match value {
            1 => Self::Created,
            2 => Self::Deleted,
            3 => Self::DataChanged,
            4 => Self::ChildrenChanged,
            _ => return None,
        })
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// A server-pushed notification.
///
/// `event_type != 0` is a znode notification; `event_type == 0` is really a
/// session-state event and carries no meaningful path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub event_type: i32,
    pub state: i32,
    pub path: String,
}

impl WatchEvent {
    // Session states delivered through type-0 events.
    pub const DISCONNECTED: i32 = 0;
    pub const CONNECTED: i32 = 3;
    pub const AUTH_FAILED: i32 = 4;
    pub const CONNECTED_READ_ONLY: i32 = 5;
    pub const SASL_AUTHENTICATED: i32 = 6;
    pub const SESSION_EXPIRED: i32 = -112;

    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_i32(self.event_type)
    }
}

impl Record for WatchEvent {
    fn write(&self, dst: &mut BytesMut) {
        put_i32(dst, self.event_type);
        put_i32(dst, self.state);
        put_ustring(dst, &self.path);
    }

    fn read(src: &mut Bytes) -> ZkResult<Self> {
        Ok(Self {
            event_type: get_i32(src)?,
            state: get_i32(src)?,
            path: get_ustring(src)?,
        })
    }
}

/// Bulk re-registration of watches after a reconnect.
///
/// The wire format has no slot for created/deleted watches; both re-arm as
/// exists watches, which the server fires for creation and deletion alike.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetWatchesRequest {
    pub relative_zxid: i64,
    pub data_watches: Vec<String>,
    pub exist_watches: Vec<String>,
    pub child_watches: Vec<String>,
}

impl RequestRecord for SetWatchesRequest {
    fn opcode(&self) -> OpCode {
        OpCode::SetWatches
    }

    fn write_body(&self, dst: &mut BytesMut) {
        put_i64(dst, self.relative_zxid);
        put_string_vec(dst, &self.data_watches);
        put_string_vec(dst, &self.exist_watches);
        put_string_vec(dst, &self.child_watches);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckWatchesRequest {
    pub path: String,
    pub watch_type: i32,
}

impl RequestRecord for CheckWatchesRequest {
    fn opcode(&self) -> OpCode {
        OpCode::CheckWatches
    }

    fn write_body(&self, dst: &mut BytesMut) {
        put_ustring(dst, &self.path);
        put_i32(dst, self.watch_type);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveWatchesRequest {
    pub path: String,
    pub watch_type: i32,
}

impl RequestRecord for RemoveWatchesRequest {
    fn opcode(&self) -> OpCode {
        OpCode::RemoveWatches
    }

    fn write_body(&self, dst: &mut BytesMut) {
        put_ustring(dst, &self.path);
        put_i32(dst, self.watch_type);
    }
}
