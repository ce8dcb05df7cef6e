// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::BytesMut;

use crate::protocol::request::{CLOSE_XID, OpCode, RequestRecord};

/// Ends the session.  Goes out under xid 0; the reply comes back without a
/// reply header, so the read loop selects it by the pending close queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseRequest;

impl RequestRecord for CloseRequest {
    fn opcode(&self) -> OpCode {
        OpCode::Close
    }

    fn special_xid(&self) -> Option<i32> {
        Some(CLOSE_XID)
    }

    fn write_body(&self, _dst: &mut BytesMut) {}
}
