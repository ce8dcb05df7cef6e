// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use bytes::Bytes;
use zookeeper_client_rs::protocol::{
    Acl, CloseRequest, CreateFlags, CreateRequest, DeleteRequest, ExistsRequest,
    PingRequest, Request, SetWatchesRequest, UNRESTRICTED_ACCESS,
};

use super::frame;

#[test]
fn test_exists_frame_layout() {
    let request = Request::Exists(ExistsRequest {
        path: "/zk".to_string(),
        watch: true,
    });

    // xid 5 | opcode 3 | ustring "/zk" | bool true
    let expected = frame(
        "00000005
         00000003
         00000003 2f7a6b
         01",
    );
    assert_eq!(request.serialize(5).as_ref(), &expected[..]);
}

#[test]
fn test_ping_uses_its_fixed_xid() {
    let request = Request::Ping(PingRequest);

    // The allocated xid is overridden by the ping xid -2; opcode 11.
    let expected = frame("fffffffe 0000000b");
    assert_eq!(request.serialize(99).as_ref(), &expected[..]);
}

#[test]
fn test_close_frame_layout() {
    let request = Request::Close(CloseRequest);

    // Close goes out under xid 0 with opcode -11 and an empty body.
    let expected = frame("00000000 fffffff5");
    assert_eq!(request.serialize(7).as_ref(), &expected[..]);
}

#[test]
fn test_create_frame_layout() {
    let acl: Vec<Acl> = vec![UNRESTRICTED_ACCESS.clone()];
    let request = Request::Create(CreateRequest {
        path: "/a".to_string(),
        data: Some(Bytes::from_static(b"hi")),
        acl,
        flags: CreateFlags::EPHEMERAL | CreateFlags::SEQUENTIAL,
        with_stat: false,
    });

    // xid 1 | opcode 1 | "/a" | buffer "hi" | one ACL (perms 31,
    // world/anyone) | flags 3
    let expected = frame(
        "00000001
         00000001
         00000002 2f61
         00000002 6869
         00000001
           0000001f
           00000005 776f726c64
           00000006 616e796f6e65
         00000003",
    );
    assert_eq!(request.serialize(1).as_ref(), &expected[..]);
}

#[test]
fn test_create2_opcode_switch() {
    let request = CreateRequest {
        path: "/a".to_string(),
        data: None,
        acl: vec![UNRESTRICTED_ACCESS.clone()],
        flags: CreateFlags::CONTAINER,
        with_stat: true,
    };
    let serialized = Request::Create(request).serialize(2);
    // opcode create2 = 15
    assert_eq!(&serialized[4..8], &15i32.to_be_bytes());
}

#[test]
fn test_delete_wildcard_version() {
    let request = Request::Delete(DeleteRequest {
        path: "/a".to_string(),
        version: -1,
    });

    let expected = frame(
        "00000003
         00000002
         00000002 2f61
         ffffffff",
    );
    assert_eq!(request.serialize(3).as_ref(), &expected[..]);
}

#[test]
fn test_set_watches_partitioned_paths() {
    let request = Request::SetWatches(SetWatchesRequest {
        relative_zxid: 0x10,
        data_watches: vec!["/d".to_string()],
        exist_watches: vec![],
        child_watches: vec!["/c".to_string()],
    });

    let expected = frame(
        "00000008
         00000065
         0000000000000010
         00000001 00000002 2f64
         00000000
         00000001 00000002 2f63",
    );
    assert_eq!(request.serialize(8).as_ref(), &expected[..]);
}
