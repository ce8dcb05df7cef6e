// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The session handshake pair.
//!
//! Connect frames are special: they carry no xid/opcode preamble and their
//! reply carries no reply header, so they live outside the [`Request`]
//! dispatch enum and are exchanged directly by the connection before its
//! read loop starts.
//!
//! [`Request`]: crate::protocol::request::Request

use bytes::{Bytes, BytesMut};

use crate::{
    errors::ZkResult,
    protocol::primitives::{
        Record, get_bool, get_buffer, get_i32, get_i64, put_bool, put_buffer,
        put_i32, put_i64,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub protocol_version: i32,
    pub last_seen_zxid: i64,
    pub timeout_ms: i32,
    pub session_id: i64,
    pub password: Vec<u8>,
    pub read_only: bool,
}

impl Record for ConnectRequest {
    fn write(&self, dst: &mut BytesMut) {
        put_i32(dst, self.protocol_version);
        put_i64(dst, self.last_seen_zxid);
        put_i32(dst, self.timeout_ms);
        put_i64(dst, self.session_id);
        put_buffer(dst, Some(&self.password));
        put_bool(dst, self.read_only);
    }

    fn read(src: &mut Bytes) -> ZkResult<Self> {
        Ok(Self {
            protocol_version: get_i32(src)?,
            last_seen_zxid: get_i64(src)?,
            timeout_ms: get_i32(src)?,
            session_id: get_i64(src)?,
            password: get_buffer(src)?.map(|b| b.to_vec()).unwrap_or_default(),
            read_only: get_bool(src)?,
        })
    }
}

/// A `session_id` of zero here means the server rejected the presented
/// session as expired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    pub protocol_version: i32,
    pub timeout_ms: i32,
    pub session_id: i64,
    pub password: Vec<u8>,
}

impl Record for ConnectResponse {
    fn write(&self, dst: &mut BytesMut) {
        put_i32(dst, self.protocol_version);
        put_i32(dst, self.timeout_ms);
        put_i64(dst, self.session_id);
        put_buffer(dst, Some(&self.password));
    }

    fn read(src: &mut Bytes) -> ZkResult<Self> {
        Ok(Self {
            protocol_version: get_i32(src)?,
            timeout_ms: get_i32(src)?,
            session_id: get_i64(src)?,
            password: get_buffer(src)?.map(|b| b.to_vec()).unwrap_or_default(),
        })
    }
}
