// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! In-process mock ensemble.
//!
//! Implements enough of the wire protocol for the end-to-end scenarios:
//! the `srvr` probe, the session handshake, plain/sequential/ephemeral
//! creates, versioned set/delete, children listing, one-shot watches,
//! pings, bulk watch re-registration and atomic transactions.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use bytes::{Bytes, BytesMut};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, tcp::OwnedWriteHalf},
    sync::mpsc,
    task::JoinHandle,
    time::timeout,
};
use zookeeper_client_rs::{
    cfg::config::{RetryConfig, ZkConfig},
    client::client::ZkClient,
    protocol::{
        ConnectRequest, ConnectResponse, MultiHeader, Stat,
        primitives::{
            Record, get_bool, get_buffer, get_i32, get_i64, get_string_vec,
            get_ustring, put_buffer, put_i32, put_string_vec, put_ustring,
        },
    },
};

const BANNER: &str = "Zookeeper version: 3.5.1-test, built on 01/01/2020 00:00 GMT\n";

type Out = mpsc::UnboundedSender<Vec<u8>>;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum WatchClass {
    Exist,
    Data,
    Child,
}

#[derive(Clone)]
struct Node {
    data: Vec<u8>,
    version: i32,
    owner: i64,
}

struct Store {
    nodes: HashMap<String, Node>,
    sequences: HashMap<String, u64>,
    watches: HashMap<(WatchClass, String), Vec<Out>>,
    next_session: i64,
    zxid: i64,
}

impl Store {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            "/".to_string(),
            Node {
                data: Vec::new(),
                version: 0,
                owner: 0,
            },
        );
        Self {
            nodes,
            sequences: HashMap::new(),
            watches: HashMap::new(),
            next_session: 0x1000,
            zxid: 1,
        }
    }

    fn register_watch(&mut self, class: WatchClass, path: &str, out: &Out) {
        self.watches
            .entry((class, path.to_string()))
            .or_default()
            .push(out.clone());
    }

    fn fire(&mut self, class: WatchClass, path: &str, event_type: i32) {
        if let Some(subscribers) = self.watches.remove(&(class, path.to_string())) {
            let frame = watch_frame(self.zxid, event_type, path);
            for out in subscribers {
                let _ = out.send(frame.clone());
            }
        }
    }

    fn children_of(&self, path: &str) -> Vec<String> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        let mut names: Vec<String> = self
            .nodes
            .keys()
            .filter_map(|key| {
                let rest = key.strip_prefix(&prefix)?;
                if rest.is_empty() || rest.contains('/') {
                    None
                } else {
                    Some(rest.to_string())
                }
            })
            .collect();
        names.sort();
        names
    }

    fn stat_of(&self, path: &str) -> Stat {
        let node = &self.nodes[path];
        Stat {
            version: node.version,
            ephemeral_owner: node.owner,
            data_length: node.data.len() as i32,
            num_children: self.children_of(path).len() as i32,
            ..Stat::default()
        }
    }
}

fn parent_of(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
    }
}

fn headerless_frame(body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(body.len() + 4);
    frame.extend_from_slice(&(body.len() as i32).to_be_bytes());
    frame.extend_from_slice(body);
    frame
}

fn reply_frame(xid: i32, zxid: i64, err: i32, body: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(body.len() + 20);
    frame.extend_from_slice(&((body.len() + 16) as i32).to_be_bytes());
    frame.extend_from_slice(&xid.to_be_bytes());
    frame.extend_from_slice(&zxid.to_be_bytes());
    frame.extend_from_slice(&err.to_be_bytes());
    frame.extend_from_slice(body);
    frame
}

fn watch_frame(zxid: i64, event_type: i32, path: &str) -> Vec<u8> {
    let mut body = BytesMut::new();
    put_i32(&mut body, event_type);
    put_i32(&mut body, 3); // SyncConnected
    put_ustring(&mut body, path);
    reply_frame(-1, zxid, 0, &body)
}

// Node event types as they go over the wire.
const EV_CREATED: i32 = 1;
const EV_DELETED: i32 = 2;
const EV_DATA_CHANGED: i32 = 3;
const EV_CHILDREN_CHANGED: i32 = 4;

enum TxnOp {
    Check { path: String, version: i32 },
    Create { path: String, data: Vec<u8>, flags: i32, want_stat: bool },
    SetData { path: String, data: Vec<u8>, version: i32 },
    Delete { path: String, version: i32 },
}

pub struct MockServer {
    pub port: u16,
    store: Arc<Mutex<Store>>,
    conn_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    accept_task: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let store = Arc::new(Mutex::new(Store::new()));
        let conn_tasks: Arc<Mutex<Vec<JoinHandle<()>>>> =
            Arc::new(Mutex::new(Vec::new()));

        let accept_store = Arc::clone(&store);
        let accept_conns = Arc::clone(&conn_tasks);
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let store = Arc::clone(&accept_store);
                let task = tokio::spawn(async move {
                    serve_conn(stream, store).await;
                });
                accept_conns.lock().expect("conns").push(task);
            }
        });

        Self {
            port,
            store,
            conn_tasks,
            accept_task,
        }
    }

    /// Severs every live client connection without touching the store, as
    /// a network partition would.
    pub fn kill_connections(&self) {
        for task in self.conn_tasks.lock().expect("conns").drain(..) {
            task.abort();
        }
    }

    pub fn has_node(&self, path: &str) -> bool {
        self.store.lock().expect("store").nodes.contains_key(path)
    }

    pub fn children(&self, path: &str) -> Vec<String> {
        self.store.lock().expect("store").children_of(path)
    }

    pub fn data_version(&self, path: &str) -> Option<i32> {
        self.store
            .lock()
            .expect("store")
            .nodes
            .get(path)
            .map(|node| node.version)
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.accept_task.abort();
        self.kill_connections();
    }
}

pub fn test_config(port: u16) -> ZkConfig {
    let mut config = ZkConfig::default();
    config.ensemble.servers = vec![format!("127.0.0.1:{port}")];
    config.session.timeout = Duration::from_secs(10);
    config.retry = RetryConfig::Forever;
    config
}

pub async fn connected_client(server: &MockServer) -> ZkClient {
    let client = ZkClient::new(&test_config(server.port)).expect("client");
    timeout(Duration::from_secs(5), client.start())
        .await
        .expect("client should connect to the mock server")
        .expect("start");
    client
}

async fn serve_conn(stream: tokio::net::TcpStream, store: Arc<Mutex<Store>>) {
    stream.set_nodelay(true).ok();
    let (mut reader, writer) = stream.into_split();

    let (out_tx, out_rx) = mpsc::unbounded_channel::<Vec<u8>>();
    let writer_task = tokio::spawn(drain_writes(out_rx, writer));

    let mut first = [0u8; 4];
    if reader.read_exact(&mut first).await.is_err() {
        drop(out_tx);
        let _ = writer_task.await;
        return;
    }

    if &first == b"srvr" {
        let _ = out_tx.send(BANNER.as_bytes().to_vec());
        drop(out_tx);
        let _ = writer_task.await;
        return;
    }

    // Operational connection: `first` is the size of the connect frame.
    let size = i32::from_be_bytes(first) as usize;
    let mut body = vec![0u8; size];
    if reader.read_exact(&mut body).await.is_err() {
        return;
    }
    let mut body = Bytes::from(body);
    let Ok(request) = ConnectRequest::read(&mut body) else {
        return;
    };

    let session_id = {
        let mut store = store.lock().expect("store");
        if request.session_id == 0 {
            store.next_session += 1;
            store.next_session
        } else {
            request.session_id
        }
    };

    let mut reply = BytesMut::new();
    ConnectResponse {
        protocol_version: 0,
        timeout_ms: request.timeout_ms,
        session_id,
        password: vec![7u8; 16],
    }
    .write(&mut reply);
    let _ = out_tx.send(headerless_frame(&reply));

    loop {
        let mut size_buf = [0u8; 4];
        if reader.read_exact(&mut size_buf).await.is_err() {
            break;
        }
        let size = i32::from_be_bytes(size_buf) as usize;
        let mut frame = vec![0u8; size];
        if reader.read_exact(&mut frame).await.is_err() {
            break;
        }

        let mut frame = Bytes::from(frame);
        let Ok(xid) = get_i32(&mut frame) else { break };
        let Ok(opcode) = get_i32(&mut frame) else { break };

        if opcode == -11 {
            // Close: reap this session's ephemerals and acknowledge with a
            // headerless empty frame.
            close_session(&store, session_id);
            let _ = out_tx.send(headerless_frame(&[]));
            break;
        }

        handle_request(&store, session_id, xid, opcode, frame, &out_tx);
    }

    drop(out_tx);
    let _ = writer_task.await;
}

async fn drain_writes(mut out_rx: mpsc::UnboundedReceiver<Vec<u8>>, mut writer: OwnedWriteHalf) {
    while let Some(frame) = out_rx.recv().await {
        if writer.write_all(&frame).await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

fn close_session(store: &Mutex<Store>, session_id: i64) {
    let mut store = store.lock().expect("store");
    let ephemerals: Vec<String> = store
        .nodes
        .iter()
        .filter(|(_, node)| node.owner == session_id)
        .map(|(path, _)| path.clone())
        .collect();
    for path in ephemerals {
        store.nodes.remove(&path);
        store.zxid += 1;
        store.fire(WatchClass::Exist, &path, EV_DELETED);
        store.fire(WatchClass::Data, &path, EV_DELETED);
        let parent = parent_of(&path);
        store.fire(WatchClass::Child, &parent, EV_CHILDREN_CHANGED);
    }
}

fn handle_request(
    store: &Mutex<Store>,
    session_id: i64,
    xid: i32,
    opcode: i32,
    mut body: Bytes,
    out: &Out,
) {
    let mut store = store.lock().expect("store");
    let zxid = store.zxid;

    match opcode {
        // ping
        11 => {
            let _ = out.send(reply_frame(-2, zxid, 0, &[]));
        },
        // create / create2
        1 | 15 => {
            let path = get_ustring(&mut body).expect("create path");
            let data = get_buffer(&mut body)
                .expect("create data")
                .map(|b| b.to_vec())
                .unwrap_or_default();
            skip_acl(&mut body);
            let flags = get_i32(&mut body).expect("create flags");

            match do_create(&mut store, session_id, &path, data, flags, true) {
                Ok(created) => {
                    let mut reply = BytesMut::new();
                    put_ustring(&mut reply, &created);
                    if opcode == 15 {
                        store.stat_of(&created).write(&mut reply);
                    }
                    let _ = out.send(reply_frame(xid, store.zxid, 0, &reply));
                },
                Err(code) => {
                    let _ = out.send(reply_frame(xid, zxid, code, &[]));
                },
            }
        },
        // delete
        2 => {
            let path = get_ustring(&mut body).expect("delete path");
            let version = get_i32(&mut body).expect("delete version");
            match do_delete(&mut store, &path, version, true) {
                Ok(()) => {
                    let _ = out.send(reply_frame(xid, store.zxid, 0, &[]));
                },
                Err(code) => {
                    let _ = out.send(reply_frame(xid, zxid, code, &[]));
                },
            }
        },
        // exists
        3 => {
            let path = get_ustring(&mut body).expect("exists path");
            let watch = get_bool(&mut body).expect("exists watch");
            if watch {
                let out = out.clone();
                store.register_watch(WatchClass::Exist, &path, &out);
            }
            if store.nodes.contains_key(&path) {
                let mut reply = BytesMut::new();
                store.stat_of(&path).write(&mut reply);
                let _ = out.send(reply_frame(xid, zxid, 0, &reply));
            } else {
                let _ = out.send(reply_frame(xid, zxid, -101, &[]));
            }
        },
        // getData
        4 => {
            let path = get_ustring(&mut body).expect("get path");
            let watch = get_bool(&mut body).expect("get watch");
            if store.nodes.contains_key(&path) {
                if watch {
                    let out = out.clone();
                    store.register_watch(WatchClass::Data, &path, &out);
                }
                let mut reply = BytesMut::new();
                let data = store.nodes[&path].data.clone();
                put_buffer(&mut reply, Some(&data));
                store.stat_of(&path).write(&mut reply);
                let _ = out.send(reply_frame(xid, zxid, 0, &reply));
            } else {
                let _ = out.send(reply_frame(xid, zxid, -101, &[]));
            }
        },
        // setData
        5 => {
            let path = get_ustring(&mut body).expect("set path");
            let data = get_buffer(&mut body)
                .expect("set data")
                .map(|b| b.to_vec())
                .unwrap_or_default();
            let version = get_i32(&mut body).expect("set version");
            match do_set(&mut store, &path, data, version, true) {
                Ok(()) => {
                    let mut reply = BytesMut::new();
                    store.stat_of(&path).write(&mut reply);
                    let _ = out.send(reply_frame(xid, store.zxid, 0, &reply));
                },
                Err(code) => {
                    let _ = out.send(reply_frame(xid, zxid, code, &[]));
                },
            }
        },
        // sync
        9 => {
            let path = get_ustring(&mut body).expect("sync path");
            let mut reply = BytesMut::new();
            put_ustring(&mut reply, &path);
            let _ = out.send(reply_frame(xid, zxid, 0, &reply));
        },
        // getChildren2
        12 => {
            let path = get_ustring(&mut body).expect("children path");
            let watch = get_bool(&mut body).expect("children watch");
            if store.nodes.contains_key(&path) {
                if watch {
                    let out = out.clone();
                    store.register_watch(WatchClass::Child, &path, &out);
                }
                let mut reply = BytesMut::new();
                put_string_vec(&mut reply, &store.children_of(&path));
                store.stat_of(&path).write(&mut reply);
                let _ = out.send(reply_frame(xid, zxid, 0, &reply));
            } else {
                let _ = out.send(reply_frame(xid, zxid, -101, &[]));
            }
        },
        // transaction
        14 => {
            let ops = parse_txn_ops(&mut body);
            let reply = do_transaction(&mut store, session_id, &ops);
            let _ = out.send(reply_frame(xid, store.zxid, 0, &reply));
        },
        // setWatches
        101 => {
            let _relative_zxid = get_i64(&mut body).expect("relative zxid");
            let data = get_string_vec(&mut body).expect("data watches");
            let exist = get_string_vec(&mut body).expect("exist watches");
            let child = get_string_vec(&mut body).expect("child watches");
            let out_clone = out.clone();
            for path in data {
                store.register_watch(WatchClass::Data, &path, &out_clone);
            }
            for path in exist {
                store.register_watch(WatchClass::Exist, &path, &out_clone);
            }
            for path in child {
                store.register_watch(WatchClass::Child, &path, &out_clone);
            }
            let _ = out.send(reply_frame(xid, zxid, 0, &[]));
        },
        _ => {
            let _ = out.send(reply_frame(xid, zxid, -6, &[]));
        },
    }
}

fn skip_acl(body: &mut Bytes) {
    let count = get_i32(body).expect("acl count");
    for _ in 0..count {
        let _ = get_i32(body).expect("perms");
        let _ = get_ustring(body).expect("scheme");
        let _ = get_ustring(body).expect("id");
    }
}

fn do_create(
    store: &mut Store,
    session_id: i64,
    path: &str,
    data: Vec<u8>,
    flags: i32,
    fire: bool,
) -> Result<String, i32> {
    let parent = parent_of(path);
    if !store.nodes.contains_key(&parent) {
        return Err(-101);
    }

    let created = if flags & 2 != 0 {
        let counter = store.sequences.entry(parent.clone()).or_insert(0);
        let sequenced = format!("{path}{:010}", *counter);
        *counter += 1;
        sequenced
    } else {
        path.to_string()
    };

    if store.nodes.contains_key(&created) {
        return Err(-110);
    }

    let owner = if flags & 1 != 0 { session_id } else { 0 };
    store.nodes.insert(
        created.clone(),
        Node {
            data,
            version: 0,
            owner,
        },
    );
    store.zxid += 1;

    if fire {
        store.fire(WatchClass::Exist, &created, EV_CREATED);
        store.fire(WatchClass::Child, &parent, EV_CHILDREN_CHANGED);
    }
    Ok(created)
}

fn do_delete(store: &mut Store, path: &str, version: i32, fire: bool) -> Result<(), i32> {
    let Some(node) = store.nodes.get(path) else {
        return Err(-101);
    };
    if version != -1 && version != node.version {
        return Err(-103);
    }
    if !store.children_of(path).is_empty() {
        return Err(-111);
    }

    store.nodes.remove(path);
    store.zxid += 1;

    if fire {
        store.fire(WatchClass::Exist, path, EV_DELETED);
        store.fire(WatchClass::Data, path, EV_DELETED);
        let parent = parent_of(path);
        store.fire(WatchClass::Child, &parent, EV_CHILDREN_CHANGED);
    }
    Ok(())
}

fn do_set(
    store: &mut Store,
    path: &str,
    data: Vec<u8>,
    version: i32,
    fire: bool,
) -> Result<(), i32> {
    let Some(node) = store.nodes.get_mut(path) else {
        return Err(-101);
    };
    if version != -1 && version != node.version {
        return Err(-103);
    }
    node.data = data;
    node.version += 1;
    store.zxid += 1;

    if fire {
        store.fire(WatchClass::Data, path, EV_DATA_CHANGED);
        store.fire(WatchClass::Exist, path, EV_DATA_CHANGED);
    }
    Ok(())
}

fn parse_txn_ops(body: &mut Bytes) -> Vec<TxnOp> {
    let mut ops = Vec::new();
    loop {
        let header = MultiHeader::read(body).expect("txn header");
        if header.done {
            return ops;
        }
        match header.op_type {
            13 => ops.push(TxnOp::Check {
                path: get_ustring(body).expect("check path"),
                version: get_i32(body).expect("check version"),
            }),
            1 | 15 => {
                let path = get_ustring(body).expect("txn create path");
                let data = get_buffer(body)
                    .expect("txn create data")
                    .map(|b| b.to_vec())
                    .unwrap_or_default();
                skip_acl(body);
                let flags = get_i32(body).expect("txn create flags");
                ops.push(TxnOp::Create {
                    path,
                    data,
                    flags,
                    want_stat: header.op_type == 15,
                });
            },
            5 => ops.push(TxnOp::SetData {
                path: get_ustring(body).expect("txn set path"),
                data: get_buffer(body)
                    .expect("txn set data")
                    .map(|b| b.to_vec())
                    .unwrap_or_default(),
                version: get_i32(body).expect("txn set version"),
            }),
            2 => ops.push(TxnOp::Delete {
                path: get_ustring(body).expect("txn delete path"),
                version: get_i32(body).expect("txn delete version"),
            }),
            other => panic!("unexpected opcode {other} in transaction"),
        }
    }
}

/// Validates the batch against a scratch copy first; only a fully clean
/// batch is applied (with watch fires).  A dirty batch reports the failing
/// op's code and zero (rolled back) for the rest.
fn do_transaction(store: &mut Store, session_id: i64, ops: &[TxnOp]) -> Vec<u8> {
    let mut scratch = Store {
        nodes: store.nodes.clone(),
        sequences: store.sequences.clone(),
        watches: HashMap::new(),
        next_session: store.next_session,
        zxid: store.zxid,
    };

    let mut failure: Option<(usize, i32)> = None;
    for (index, op) in ops.iter().enumerate() {
        let outcome = match op {
            TxnOp::Check { path, version } => match scratch.nodes.get(path) {
                Some(node) if *version == -1 || node.version == *version => Ok(()),
                Some(_) => Err(-103),
                None => Err(-101),
            },
            TxnOp::Create {
                path, data, flags, ..
            } => do_create(&mut scratch, session_id, path, data.clone(), *flags, false)
                .map(|_| ()),
            TxnOp::SetData {
                path,
                data,
                version,
            } => do_set(&mut scratch, path, data.clone(), *version, false),
            TxnOp::Delete { path, version } => {
                do_delete(&mut scratch, path, *version, false)
            },
        };
        if let Err(code) = outcome {
            failure = Some((index, code));
            break;
        }
    }

    let mut reply = BytesMut::new();

    if let Some((failed_index, failed_code)) = failure {
        for index in 0..ops.len() {
            MultiHeader {
                op_type: -1,
                done: false,
                error: -1,
            }
            .write(&mut reply);
            let code = if index == failed_index { failed_code } else { 0 };
            put_i32(&mut reply, code);
        }
    } else {
        for op in ops {
            match op {
                TxnOp::Check { .. } => {
                    MultiHeader {
                        op_type: 13,
                        done: false,
                        error: -1,
                    }
                    .write(&mut reply);
                },
                TxnOp::Create {
                    path,
                    data,
                    flags,
                    want_stat,
                } => {
                    let created =
                        do_create(store, session_id, path, data.clone(), *flags, true)
                            .expect("validated create");
                    MultiHeader {
                        op_type: if *want_stat { 15 } else { 1 },
                        done: false,
                        error: -1,
                    }
                    .write(&mut reply);
                    put_ustring(&mut reply, &created);
                    if *want_stat {
                        store.stat_of(&created).write(&mut reply);
                    }
                },
                TxnOp::SetData {
                    path,
                    data,
                    version,
                } => {
                    do_set(store, path, data.clone(), *version, true)
                        .expect("validated set");
                    MultiHeader {
                        op_type: 5,
                        done: false,
                        error: -1,
                    }
                    .write(&mut reply);
                    store.stat_of(path).write(&mut reply);
                },
                TxnOp::Delete { path, version } => {
                    do_delete(store, path, *version, true).expect("validated delete");
                    MultiHeader {
                        op_type: 2,
                        done: false,
                        error: -1,
                    }
                    .write(&mut reply);
                },
            }
        }
    }

    MultiHeader {
        op_type: -1,
        done: true,
        error: -1,
    }
    .write(&mut reply);
    reply.to_vec()
}
