// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::BytesMut;

use crate::protocol::request::{OpCode, PING_XID, RequestRecord};

/// Session heartbeat.  Always travels under the fixed ping xid, so several
/// may be outstanding at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingRequest;

impl RequestRecord for PingRequest {
    fn opcode(&self) -> OpCode {
        OpCode::Ping
    }

    fn special_xid(&self) -> Option<i32> {
        Some(PING_XID)
    }

    fn write_body(&self, _dst: &mut BytesMut) {}
}
