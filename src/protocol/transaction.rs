// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The multi-operation batch.
//!
//! A transaction body interleaves a [`MultiHeader`] before every
//! sub-request and terminates with a `type = -1, done = true` footer.  The
//! reply mirrors the shape: each sub-result is either a response of the
//! sub-op's opcode or, under type `-1`, a bare error code.

use bytes::{Bytes, BytesMut};

use crate::{
    errors::{ZkError, ZkResult},
    protocol::{
        primitives::{Record, get_bool, get_i32, put_bool, put_i32},
        request::{OpCode, Request, RequestRecord},
        response::Response,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiHeader {
    pub op_type: i32,
    pub done: bool,
    pub error: i32,
}

impl Record for MultiHeader {
    fn write(&self, dst: &mut BytesMut) {
        put_i32(dst, self.op_type);
        put_bool(dst, self.done);
        put_i32(dst, self.error);
    }

    fn read(src: &mut Bytes) -> ZkResult<Self> {
        Ok(Self {
            op_type: get_i32(src)?,
            done: get_bool(src)?,
            error: get_i32(src)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionRequest {
    pub ops: Vec<Request>,
}

impl TransactionRequest {
    pub fn add(&mut self, request: Request) {
        self.ops.push(request);
    }
}

impl RequestRecord for TransactionRequest {
    fn opcode(&self) -> OpCode {
        OpCode::Transaction
    }

    fn writes_data(&self) -> bool {
        true
    }

    fn write_body(&self, dst: &mut BytesMut) {
        for op in &self.ops {
            MultiHeader {
                op_type: op.opcode().as_i32(),
                done: false,
                error: -1,
            }
            .write(dst);
            op.write_body(dst);
        }
        MultiHeader {
            op_type: -1,
            done: true,
            error: -1,
        }
        .write(dst);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionResponse {
    pub results: Vec<ZkResult<Response>>,
}

impl TransactionResponse {
    pub(crate) fn read(src: &mut Bytes) -> ZkResult<Response> {
        let mut results = Vec::new();

        let mut header = MultiHeader::read(src)?;
        while !header.done {
            if header.op_type == -1 {
                let code = get_i32(src)?;
                results.push(Err(ZkError::from_code(code)));
            } else {
                let opcode = OpCode::from_i32(header.op_type).ok_or_else(|| {
                    ZkError::Decode(format!(
                        "unknown opcode {} in transaction reply",
                        header.op_type
                    ))
                })?;
                results.push(Ok(Response::deserialize(opcode, src)?));
            }
            header = MultiHeader::read(src)?;
        }

        Ok(Response::Transaction(Self { results }))
    }
}
