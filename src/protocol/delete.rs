// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::BytesMut;

use crate::protocol::{
    primitives::{put_i32, put_ustring},
    request::{OpCode, RequestRecord},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRequest {
    pub path: String,
    /// `-1` is the wildcard and bypasses the version check.
    pub version: i32,
}

impl RequestRecord for DeleteRequest {
    fn opcode(&self) -> OpCode {
        OpCode::Delete
    }

    fn writes_data(&self) -> bool {
        true
    }

    fn write_body(&self, dst: &mut BytesMut) {
        put_ustring(dst, &self.path);
        put_i32(dst, self.version);
    }
}
