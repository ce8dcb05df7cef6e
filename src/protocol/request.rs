// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Request dispatch.
//!
//! Every operation is a value-object struct implementing [`RequestRecord`];
//! the [`Request`] enum dispatches over them so the session layer can frame
//! and retry any operation uniformly.  The connect handshake is the one
//! exchange that lives outside this enum (no xid/opcode preamble).

use bytes::{Bytes, BytesMut};
use enum_dispatch::enum_dispatch;

use crate::protocol::{
    acl::{GetAclRequest, SetAclRequest},
    auth::AuthRequest,
    check::CheckVersionRequest,
    children::{GetChildren2Request, GetChildrenRequest},
    close::CloseRequest,
    create::CreateRequest,
    data::{GetDataRequest, SetDataRequest},
    delete::DeleteRequest,
    exists::ExistsRequest,
    ping::PingRequest,
    primitives::put_i32,
    reconfig::ReconfigRequest,
    sync::SyncRequest,
    transaction::TransactionRequest,
    watches::{CheckWatchesRequest, RemoveWatchesRequest, SetWatchesRequest},
};

/// Watch events arrive under this xid and bypass the pending table.
pub const WATCH_XID: i32 = -1;
/// Heartbeats always travel under this xid.
pub const PING_XID: i32 = -2;
/// Authentication requests always travel under this xid.
pub const AUTH_XID: i32 = -4;
/// Close goes out under xid 0 and its reply carries no reply header.
pub const CLOSE_XID: i32 = 0;

pub const SPECIAL_XIDS: [i32; 3] = [AUTH_XID, PING_XID, CLOSE_XID];

/// Operation codes as the server knows them.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    Create = 1,
    Delete = 2,
    Exists = 3,
    GetData = 4,
    SetData = 5,
    GetAcl = 6,
    SetAcl = 7,
    GetChildren = 8,
    Sync = 9,
    Ping = 11,
    GetChildren2 = 12,
    CheckVersion = 13,
    Transaction = 14,
    Create2 = 15,
    Reconfig = 16,
    CheckWatches = 17,
    RemoveWatches = 18,
    Close = -11,
    Auth = 100,
    SetWatches = 101,
    Sasl = 102,
}

impl OpCode {
    pub fn from_i32(value: i32) -> Option<Self> {
        Some(match value {
            1 => Self::Create,
            2 => Self::Delete,
            3 => Self::Exists,
            4 => Self::GetData,
            5 => Self::SetData,
            6 => Self::GetAcl,
            7 => Self::SetAcl,
            8 => Self::GetChildren,
            9 => Self::Sync,
            11 => Self::Ping,
            12 => Self::GetChildren2,
            13 => Self::CheckVersion,
            14 => Self::Transaction,
            15 => Self::Create2,
            16 => Self::Reconfig,
            17 => Self::CheckWatches,
            18 => Self::RemoveWatches,
            -11 => Self::Close,
            100 => Self::Auth,
            101 => Self::SetWatches,
            102 => Self::Sasl,
            _ => return None,
        })
    }

    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

/// Behaviour every operation shares: its opcode, whether it mutates server
/// state (write ops must not run against a read-only server), its fixed xid
/// if it has one, and its body serialization.
#[enum_dispatch]
pub trait RequestRecord {
    fn opcode(&self) -> OpCode;

    fn writes_data(&self) -> bool {
        false
    }

    fn special_xid(&self) -> Option<i32> {
        None
    }

    fn write_body(&self, dst: &mut BytesMut);
}

#[enum_dispatch(RequestRecord)]
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Create(CreateRequest),
    Delete(DeleteRequest),
    Exists(ExistsRequest),
    GetData(GetDataRequest),
    SetData(SetDataRequest),
    GetAcl(GetAclRequest),
    SetAcl(SetAclRequest),
    GetChildren(GetChildrenRequest),
    GetChildren2(GetChildren2Request),
    Sync(SyncRequest),
    Ping(PingRequest),
    CheckVersion(CheckVersionRequest),
    Transaction(TransactionRequest),
    Reconfig(ReconfigRequest),
    CheckWatches(CheckWatchesRequest),
    RemoveWatches(RemoveWatchesRequest),
    Close(CloseRequest),
    Auth(AuthRequest),
    SetWatches(SetWatchesRequest),
}

impl Request {
    /// Frames the request for an established connection:
    /// `xid | opcode | body`.  Callers pass the xid they allocated; an
    /// operation with a fixed xid overrides it.
    pub fn serialize(&self, xid: i32) -> Bytes {
        let mut dst = BytesMut::with_capacity(64);
        put_i32(&mut dst, self.special_xid().unwrap_or(xid));
        put_i32(&mut dst, self.opcode().as_i32());
        self.write_body(&mut dst);
        dst.freeze()
    }

    /// The path this operation addresses, when it has one.  The facade uses
    /// it to key the stat cache.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::Create(r) => Some(&r.path),
            Self::Delete(r) => Some(&r.path),
            Self::Exists(r) => Some(&r.path),
            Self::GetData(r) => Some(&r.path),
            Self::SetData(r) => Some(&r.path),
            Self::GetAcl(r) => Some(&r.path),
            Self::SetAcl(r) => Some(&r.path),
            Self::GetChildren(r) => Some(&r.path),
            Self::GetChildren2(r) => Some(&r.path),
            Self::Sync(r) => Some(&r.path),
            Self::CheckVersion(r) => Some(&r.path),
            Self::CheckWatches(r) => Some(&r.path),
            Self::RemoveWatches(r) => Some(&r.path),
            Self::Ping(_)
            | Self::Transaction(_)
            | Self::Reconfig(_)
            | Self::Close(_)
            | Self::Auth(_)
            | Self::SetWatches(_) => None,
        }
    }
}
