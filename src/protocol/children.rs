// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::{Bytes, BytesMut};

use crate::{
    errors::ZkResult,
    protocol::{
        primitives::{Record, get_string_vec, put_bool, put_ustring},
        request::{OpCode, RequestRecord},
        response::Response,
        stat::Stat,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetChildrenRequest {
    pub path: String,
    pub watch: bool,
}

impl RequestRecord for GetChildrenRequest {
    fn opcode(&self) -> OpCode {
        OpCode::GetChildren
    }

    fn write_body(&self, dst: &mut BytesMut) {
        put_ustring(dst, &self.path);
        put_bool(dst, self.watch);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetChildrenResponse {
    pub children: Vec<String>,
}

impl GetChildrenResponse {
    pub(crate) fn read(src: &mut Bytes) -> ZkResult<Response> {
        Ok(Response::GetChildren(Self {
            children: get_string_vec(src)?,
        }))
    }
}

/// The stat-bearing variant; the facade prefers it so the stat cache stays
/// warm on listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetChildren2Request {
    pub path: String,
    pub watch: bool,
}

impl RequestRecord for GetChildren2Request {
    fn opcode(&self) -> OpCode {
        OpCode::GetChildren2
    }

    fn write_body(&self, dst: &mut BytesMut) {
        put_ustring(dst, &self.path);
        put_bool(dst, self.watch);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetChildren2Response {
    pub children: Vec<String>,
    pub stat: Stat,
}

impl GetChildren2Response {
    pub(crate) fn read(src: &mut Bytes) -> ZkResult<Response> {
        Ok(Response::GetChildren2(Self {
            children: get_string_vec(src)?,
            stat: Stat::read(src)?,
        }))
    }
}
