// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bitflags::bitflags;
use bytes::{Bytes, BytesMut};

use crate::{
    errors::ZkResult,
    protocol::{
        acl::Acl,
        primitives::{
            Record, get_ustring, put_buffer, put_i32, put_records, put_ustring,
        },
        request::{OpCode, RequestRecord},
        response::Response,
        stat::Stat,
    },
};

bitflags! {
    /// Creation mode bits carried in the create request.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct CreateFlags: i32 {
        const EPHEMERAL = 1 << 0;
        const SEQUENTIAL = 1 << 1;
        const CONTAINER = 1 << 2;
    }
}

/// Create a znode.
///
/// When `with_stat` is set the request goes out as the `create2` variant
/// (servers ≥ 3.5.0), whose reply also carries the new node's stat.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    pub path: String,
    pub data: Option<Bytes>,
    pub acl: Vec<Acl>,
    pub flags: CreateFlags,
    pub with_stat: bool,
}

impl RequestRecord for CreateRequest {
    fn opcode(&self) -> OpCode {
        if self.with_stat {
            OpCode::Create2
        } else {
            OpCode::Create
        }
    }

    fn writes_data(&self) -> bool {
        true
    }

    fn write_body(&self, dst: &mut BytesMut) {
        put_ustring(dst, &self.path);
        put_buffer(dst, self.data.as_deref());
        put_records(dst, &self.acl);
        put_i32(dst, self.flags.bits());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateResponse {
    pub path: String,
}

impl CreateResponse {
    pub(crate) fn read(src: &mut Bytes) -> ZkResult<Response> {
        Ok(Response::Create(Self {
            path: get_ustring(src)?,
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Create2Response {
    pub path: String,
    pub stat: Stat,
}

impl Create2Response {
    pub(crate) fn read(src: &mut Bytes) -> ZkResult<Response> {
        Ok(Response::Create2(Self {
            path: get_ustring(src)?,
            stat: Stat::read(src)?,
        }))
    }
}
