// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::{Bytes, BytesMut};

use crate::{
    errors::ZkResult,
    protocol::{
        primitives::{get_ustring, put_ustring},
        request::{OpCode, RequestRecord},
        response::Response,
    },
};

/// Flushes the leader/follower channel so subsequent reads on this session
/// observe everything written before the sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub path: String,
}

impl RequestRecord for SyncRequest {
    fn opcode(&self) -> OpCode {
        OpCode::Sync
    }

    fn write_body(&self, dst: &mut BytesMut) {
        put_ustring(dst, &self.path);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResponse {
    pub path: String,
}

impl SyncResponse {
    pub(crate) fn read(src: &mut Bytes) -> ZkResult<Response> {
        Ok(Response::Sync(Self {
            path: get_ustring(src)?,
        }))
    }
}
