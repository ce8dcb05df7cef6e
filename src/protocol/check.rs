// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::BytesMut;

use crate::protocol::{
    primitives::{put_i32, put_ustring},
    request::{OpCode, RequestRecord},
};

/// Version assertion; only meaningful inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckVersionRequest {
    pub path: String,
    pub version: i32,
}

impl RequestRecord for CheckVersionRequest {
    fn opcode(&self) -> OpCode {
        OpCode::CheckVersion
    }

    fn write_body(&self, dst: &mut BytesMut) {
        put_ustring(dst, &self.path);
        put_i32(dst, self.version);
    }
}
