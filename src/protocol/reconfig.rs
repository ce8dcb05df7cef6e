// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::{Bytes, BytesMut};

use crate::{
    errors::ZkResult,
    protocol::{
        primitives::{Record, put_i64, put_ustring},
        request::{OpCode, RequestRecord},
        response::Response,
        stat::Stat,
    },
};

/// Dynamic ensemble reconfiguration (servers ≥ 3.5.0).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconfigRequest {
    pub joining_servers: String,
    pub leaving_servers: String,
    pub new_members: String,
    pub current_config_id: i64,
}

impl RequestRecord for ReconfigRequest {
    fn opcode(&self) -> OpCode {
        OpCode::Reconfig
    }

    fn writes_data(&self) -> bool {
        true
    }

    fn write_body(&self, dst: &mut BytesMut) {
        put_ustring(dst, &self.joining_servers);
        put_ustring(dst, &self.leaving_servers);
        put_ustring(dst, &self.new_members);
        put_i64(dst, self.current_config_id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconfigResponse {
    pub stat: Stat,
}

impl ReconfigResponse {
    pub(crate) fn read(src: &mut Bytes) -> ZkResult<Response> {
        Ok(Response::Reconfig(Self {
            stat: Stat::read(src)?,
        }))
    }
}
