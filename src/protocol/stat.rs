// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::{Bytes, BytesMut};

use crate::{
    errors::ZkResult,
    protocol::primitives::{Record, get_i32, get_i64, put_i32, put_i64},
};

/// Znode stat structure.
///
/// * `created_zxid` / `last_modified_zxid` / `last_modified_children` –
///   zxids of the changes that created / last modified this znode / last
///   modified its children.
/// * `created` / `modified` – milliseconds from epoch.
/// * `version` – number of changes to the data, used for optimistic
///   concurrency on set/delete.
/// * `child_version` / `acl_version` – change counters for children and ACL.
/// * `ephemeral_owner` – owning session id for ephemerals, zero otherwise.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    pub created_zxid: i64,
    pub last_modified_zxid: i64,
    pub created: i64,
    pub modified: i64,
    pub version: i32,
    pub child_version: i32,
    pub acl_version: i32,
    pub ephemeral_owner: i64,
    pub data_length: i32,
    pub num_children: i32,
    pub last_modified_children: i64,
}

impl Record for Stat {
    fn write(&self, dst: &mut BytesMut) {
        put_i64(dst, self.created_zxid);
        put_i64(dst, self.last_modified_zxid);
        put_i64(dst, self.created);
        put_i64(dst, self.modified);
        put_i32(dst, self.version);
        put_i32(dst, self.child_version);
        put_i32(dst, self.acl_version);
        put_i64(dst, self.ephemeral_owner);
        put_i32(dst, self.data_length);
        put_i32(dst, self.num_children);
        put_i64(dst, self.last_modified_children);
    }

    fn read(src: &mut Bytes) -> ZkResult<Self> {
        Ok(Self {
            created_zxid: get_i64(src)?,
            last_modified_zxid: get_i64(src)?,
            created: get_i64(src)?,
            modified: get_i64(src)?,
            version: get_i32(src)?,
            child_version: get_i32(src)?,
            acl_version: get_i32(src)?,
            ephemeral_owner: get_i64(src)?,
            data_length: get_i32(src)?,
            num_children: get_i32(src)?,
            last_modified_children: get_i64(src)?,
        })
    }
}
