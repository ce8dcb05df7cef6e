// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::{Bytes, BytesMut};

use crate::{
    errors::ZkResult,
    protocol::{
        primitives::{get_buffer, put_bool, put_buffer, put_i32, put_ustring, Record},
        request::{OpCode, RequestRecord},
        response::Response,
        stat::Stat,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetDataRequest {
    pub path: String,
    pub watch: bool,
}

impl RequestRecord for GetDataRequest {
    fn opcode(&self) -> OpCode {
        OpCode::GetData
    }

    fn write_body(&self, dst: &mut BytesMut) {
        put_ustring(dst, &self.path);
        put_bool(dst, self.watch);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetDataResponse {
    pub data: Option<Bytes>,
    pub stat: Stat,
}

impl GetDataResponse {
    pub(crate) fn read(src: &mut Bytes) -> ZkResult<Response> {
        Ok(Response::GetData(Self {
            data: get_buffer(src)?,
            stat: Stat::read(src)?,
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetDataRequest {
    pub path: String,
    pub data: Option<Bytes>,
    /// `-1` is the wildcard and bypasses the version check.
    pub version: i32,
}

impl RequestRecord for SetDataRequest {
    fn opcode(&self) -> OpCode {
        OpCode::SetData
    }

    fn writes_data(&self) -> bool {
        true
    }

    fn write_body(&self, dst: &mut BytesMut) {
        put_ustring(dst, &self.path);
        put_buffer(dst, self.data.as_deref());
        put_i32(dst, self.version);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetDataResponse {
    pub stat: Stat,
}

impl SetDataResponse {
    pub(crate) fn read(src: &mut Bytes) -> ZkResult<Response> {
        Ok(Response::SetData(Self {
            stat: Stat::read(src)?,
        }))
    }
}
