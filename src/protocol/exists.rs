// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::{Bytes, BytesMut};

use crate::{
    errors::ZkResult,
    protocol::{
        primitives::{Record, put_bool, put_ustring},
        request::{OpCode, RequestRecord},
        response::Response,
        stat::Stat,
    },
};

/// Existence check.  With `watch` set the server arms an exists watch on the
/// path even when the node is currently absent, which is what the recipes
/// rely on when they park on a sibling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistsRequest {
    pub path: String,
    pub watch: bool,
}

impl RequestRecord for ExistsRequest {
    fn opcode(&self) -> OpCode {
        OpCode::Exists
    }

    fn write_body(&self, dst: &mut BytesMut) {
        put_ustring(dst, &self.path);
        put_bool(dst, self.watch);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExistsResponse {
    pub stat: Stat,
}

impl ExistsResponse {
    pub(crate) fn read(src: &mut Bytes) -> ZkResult<Response> {
        Ok(Response::Exists(Self {
            stat: Stat::read(src)?,
        }))
    }
}
