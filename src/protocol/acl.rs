// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bitflags::bitflags;
use bytes::{Bytes, BytesMut};
use once_cell::sync::Lazy;

use crate::{
    errors::ZkResult,
    protocol::{
        primitives::{
            Record, get_i32, get_records, get_ustring, put_i32, put_records,
            put_ustring,
        },
        request::{OpCode, RequestRecord},
        response::Response,
        stat::Stat,
    },
};

bitflags! {
    /// Permission bits carried by an [`Acl`] entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Perms: i32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const CREATE = 1 << 2;
        const DELETE = 1 << 3;
        const ADMIN = 1 << 4;
    }
}

/// Identity an ACL entry applies to.
///
/// Schemes: `world` (single id `anyone`), `auth` (any authenticated user,
/// empty id), `digest` (`user:base64(sha1(user:password))`), `host`, `ip`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Id {
    pub scheme: String,
    pub id: String,
}

impl Record for Id {
    fn write(&self, dst: &mut BytesMut) {
        put_ustring(dst, &self.scheme);
        put_ustring(dst, &self.id);
    }

    fn read(src: &mut Bytes) -> ZkResult<Self> {
        Ok(Self {
            scheme: get_ustring(src)?,
            id: get_ustring(src)?,
        })
    }
}

/// Access control entry attached to a znode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acl {
    pub perms: Perms,
    pub id: Id,
}

impl Acl {
    pub fn new(scheme: &str, id: &str, perms: Perms) -> Self {
        Self {
            perms,
            id: Id {
                scheme: scheme.to_string(),
                id: id.to_string(),
            },
        }
    }
}

impl Record for Acl {
    fn write(&self, dst: &mut BytesMut) {
        put_i32(dst, self.perms.bits());
        self.id.write(dst);
    }

    fn read(src: &mut Bytes) -> ZkResult<Self> {
        Ok(Self {
            perms: Perms::from_bits_retain(get_i32(src)?),
            id: Id::read(src)?,
        })
    }
}

pub static WORLD_READABLE: Lazy<Acl> =
    Lazy::new(|| Acl::new("world", "anyone", Perms::READ));

pub static AUTHED_UNRESTRICTED: Lazy<Acl> = Lazy::new(|| Acl::new("auth", "", Perms::all()));

pub static UNRESTRICTED_ACCESS: Lazy<Acl> =
    Lazy::new(|| Acl::new("world", "anyone", Perms::all()));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetAclRequest {
    pub path: String,
}

impl RequestRecord for GetAclRequest {
    fn opcode(&self) -> OpCode {
        OpCode::GetAcl
    }

    fn write_body(&self, dst: &mut BytesMut) {
        put_ustring(dst, &self.path);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GetAclResponse {
    pub acl: Vec<Acl>,
    pub stat: Stat,
}

impl GetAclResponse {
    pub(crate) fn read(src: &mut Bytes) -> ZkResult<Response> {
        Ok(Response::GetAcl(Self {
            acl: get_records(src)?,
            stat: Stat::read(src)?,
        }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetAclRequest {
    pub path: String,
    pub acl: Vec<Acl>,
    pub version: i32,
}

impl RequestRecord for SetAclRequest {
    fn opcode(&self) -> OpCode {
        OpCode::SetAcl
    }

    fn write_body(&self, dst: &mut BytesMut) {
        put_ustring(dst, &self.path);
        put_records(dst, &self.acl);
        put_i32(dst, self.version);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SetAclResponse {
    pub stat: Stat,
}

impl SetAclResponse {
    pub(crate) fn read(src: &mut Bytes) -> ZkResult<Response> {
        Ok(Response::SetAcl(Self {
            stat: Stat::read(src)?,
        }))
    }
}
