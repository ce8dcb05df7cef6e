// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;

use crate::{
    errors::{ZkError, ZkResult},
    protocol::{
        acl::{GetAclResponse, SetAclResponse},
        children::{GetChildren2Response, GetChildrenResponse},
        create::{Create2Response, CreateResponse},
        data::{GetDataResponse, SetDataResponse},
        exists::ExistsResponse,
        reconfig::ReconfigResponse,
        request::OpCode,
        stat::Stat,
        sync::SyncResponse,
        transaction::TransactionResponse,
    },
};

/// A decoded reply body, tagged by the opcode the reply answered.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Create(CreateResponse),
    Create2(Create2Response),
    Delete,
    Exists(ExistsResponse),
    GetData(GetDataResponse),
    SetData(SetDataResponse),
    GetAcl(GetAclResponse),
    SetAcl(SetAclResponse),
    GetChildren(GetChildrenResponse),
    GetChildren2(GetChildren2Response),
    Sync(SyncResponse),
    Ping,
    CheckVersion,
    Transaction(TransactionResponse),
    Reconfig(ReconfigResponse),
    CheckWatches,
    RemoveWatches,
    Close,
    Auth,
    SetWatches,
}

impl Response {
    /// The opcode → decoder table.  Deserialization of a reply body is
    /// driven entirely by the opcode recorded when the request went out.
    pub fn deserialize(opcode: OpCode, src: &mut Bytes) -> ZkResult<Self> {
        match opcode {
            OpCode::Create => CreateResponse::read(src),
            OpCode::Create2 => Create2Response::read(src),
            OpCode::Delete => Ok(Self::Delete),
            OpCode::Exists => ExistsResponse::read(src),
            OpCode::GetData => GetDataResponse::read(src),
            OpCode::SetData => SetDataResponse::read(src),
            OpCode::GetAcl => GetAclResponse::read(src),
            OpCode::SetAcl => SetAclResponse::read(src),
            OpCode::GetChildren => GetChildrenResponse::read(src),
            OpCode::GetChildren2 => GetChildren2Response::read(src),
            OpCode::Sync => SyncResponse::read(src),
            OpCode::Ping => Ok(Self::Ping),
            OpCode::CheckVersion => Ok(Self::CheckVersion),
            OpCode::Transaction => TransactionResponse::read(src),
            OpCode::Reconfig => ReconfigResponse::read(src),
            OpCode::CheckWatches => Ok(Self::CheckWatches),
            OpCode::RemoveWatches => Ok(Self::RemoveWatches),
            OpCode::Close => Ok(Self::Close),
            OpCode::Auth => Ok(Self::Auth),
            OpCode::SetWatches => Ok(Self::SetWatches),
            OpCode::Sasl => Err(ZkError::Unimplemented),
        }
    }

    /// The stat carried by this reply, when it has one.  Any stat-bearing
    /// reply refreshes the facade's stat cache.
    pub fn stat(&self) -> Option<&Stat> {
        match self {
            Self::Create2(r) => Some(&r.stat),
            Self::Exists(r) => Some(&r.stat),
            Self::GetData(r) => Some(&r.stat),
            Self::SetData(r) => Some(&r.stat),
            Self::GetAcl(r) => Some(&r.stat),
            Self::SetAcl(r) => Some(&r.stat),
            Self::GetChildren2(r) => Some(&r.stat),
            Self::Reconfig(r) => Some(&r.stat),
            _ => None,
        }
    }

    /// The path carried by this reply, when it has one (create replies
    /// return the server-assigned path, which matters for sequentials).
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Create(r) => Some(&r.path),
            Self::Create2(r) => Some(&r.path),
            Self::Sync(r) => Some(&r.path),
            _ => None,
        }
    }
}
