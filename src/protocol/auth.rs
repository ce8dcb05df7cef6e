// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::BytesMut;

use crate::protocol::{
    primitives::{put_buffer, put_i32, put_ustring},
    request::{AUTH_XID, OpCode, RequestRecord},
};

/// Adds an authentication identity to the session.  Travels under the fixed
/// auth xid; the credential is passed through to the server untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub auth_type: i32,
    pub scheme: String,
    pub auth: Vec<u8>,
}

impl RequestRecord for AuthRequest {
    fn opcode(&self) -> OpCode {
        OpCode::Auth
    }

    fn special_xid(&self) -> Option<i32> {
        Some(AUTH_XID)
    }

    fn write_body(&self, dst: &mut BytesMut) {
        put_i32(dst, self.auth_type);
        put_ustring(dst, &self.scheme);
        put_buffer(dst, Some(&self.auth));
    }
}
