// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! One TCP connection to one server.
//!
//! A connection owns the framing: requests go out length-prefixed with an
//! `xid | opcode` preamble, replies come back matched to their waiter by
//! xid.  Server-pushed watch events travel under the watch xid and bypass
//! the pending table entirely.  A single read-loop task is the only reader
//! once the session handshake is done.

use std::{
    collections::VecDeque,
    io::ErrorKind,
    sync::{
        Arc, Mutex as StdMutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::{Mutex, mpsc, oneshot},
    task::JoinHandle,
    time::{Instant, sleep},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    client::common::{IoFailure, io_with_timeout},
    errors::{ZkError, ZkResult},
    utils::lock,
    protocol::{
        CLOSE_XID, ConnectRequest, ConnectResponse, OpCode, Request, Response,
        SPECIAL_XIDS, WATCH_XID, WatchEvent,
        primitives::{Record, get_i32, get_i64, put_i32},
        request::RequestRecord,
    },
};

pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(3);

/// Upper bound on a single frame; anything larger means the stream is
/// desynchronized.
const MAX_FRAME_SIZE: i32 = 4 * 1024 * 1024;

const REPLY_HEADER_LEN: usize = 4 + 8 + 4;

type ReplySender = oneshot::Sender<ZkResult<(i64, Response)>>;
/// Unresolved completion handle returned by [`Connection::send`].
pub type ReplyReceiver = oneshot::Receiver<ZkResult<(i64, Response)>>;

/// Represents a single client connection over a TCP stream.
pub struct Connection {
    pub host: String,
    pub port: u16,

    /// Version tuple reported by the `srvr` probe.
    pub version_info: (u32, u32, u32),
    /// Whether the probed server advertised read-only mode.
    pub start_read_only: bool,

    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<OwnedWriteHalf>,

    /// Watch events are handed to the session through this channel.
    watch_tx: mpsc::UnboundedSender<WatchEvent>,

    pending: DashMap<i32, ReplySender>,
    /// FIFO queues for the fixed xids; several pings/auths may be in flight.
    pending_specials: DashMap<i32, VecDeque<ReplySender>>,
    /// Opcode recorded at send time, consumed when the reply arrives.
    opcode_xref: DashMap<i32, OpCode>,

    read_timeout: Duration,
    closing: AtomicBool,
    cancel: CancellationToken,
    read_loop_task: StdMutex<Option<JoinHandle<()>>>,
}

impl Connection {
    /// Two-phase connect: probe the server with the four-letter `srvr`
    /// command on a throwaway stream, then open the operational stream.
    pub async fn connect(
        host: &str,
        port: u16,
        watch_tx: mpsc::UnboundedSender<WatchEvent>,
        read_timeout: Option<Duration>,
    ) -> ZkResult<Arc<Self>> {
        let addr = format!("{host}:{port}");
        let connect_error = || ZkError::Connect {
            host: host.to_string(),
            port,
        };

        debug!(%addr, "probing server");
        let mut probe = TcpStream::connect(&addr)
            .await
            .map_err(|_| connect_error())?;
        probe
            .write_all(b"srvr")
            .await
            .map_err(|_| connect_error())?;
        let mut banner = Vec::new();
        probe
            .read_to_end(&mut banner)
            .await
            .map_err(|_| connect_error())?;
        drop(probe);

        let (version_info, start_read_only) =
            parse_srvr_banner(&banner).ok_or_else(connect_error)?;
        debug!(?version_info, start_read_only, "probe complete");

        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|_| connect_error())?;
        stream.set_nodelay(true).map_err(|_| connect_error())?;
        let (r, w) = stream.into_split();

        Ok(Arc::new(Self {
            host: host.to_string(),
            port,
            version_info,
            start_read_only,
            reader: Mutex::new(r),
            writer: Mutex::new(w),
            watch_tx,
            pending: DashMap::new(),
            pending_specials: DashMap::new(),
            opcode_xref: DashMap::new(),
            read_timeout: read_timeout.unwrap_or(DEFAULT_READ_TIMEOUT),
            closing: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            read_loop_task: StdMutex::new(None),
        }))
    }

    fn connect_error(&self) -> ZkError {
        ZkError::Connect {
            host: self.host.clone(),
            port: self.port,
        }
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Performs the session handshake.  Meant to run before the read loop
    /// starts; the reply is consumed directly off the socket and carries no
    /// reply header.  Any failure to read a well-formed reply yields
    /// `Ok(None)`, which the session treats as a rejected session.
    pub async fn send_connect(
        &self,
        request: &ConnectRequest,
    ) -> ZkResult<Option<ConnectResponse>> {
        let mut payload = BytesMut::with_capacity(64);
        request.write(&mut payload);

        let mut frame = BytesMut::with_capacity(payload.len() + 4);
        put_i32(&mut frame, payload.len() as i32);
        frame.extend_from_slice(&payload);

        debug!(session_id = request.session_id, "sending connect request");
        {
            let mut w = self.writer.lock().await;
            if let Err(e) = w.write_all(&frame).await {
                warn!(error = %e, "connect request write failed");
                return Err(self.connect_error());
            }
        }

        let mut reader = self.reader.lock().await;

        let mut size_buf = [0u8; 4];
        if io_with_timeout(
            reader.read_exact(&mut size_buf),
            self.read_timeout,
            &self.cancel,
        )
        .await
        .is_err()
        {
            warn!("error reading connect response size");
            return Ok(None);
        }
        let size = i32::from_be_bytes(size_buf);
        if !(0..=MAX_FRAME_SIZE).contains(&size) {
            warn!(size, "bogus connect response size");
            return Ok(None);
        }

        let mut body = vec![0u8; size as usize];
        if io_with_timeout(
            reader.read_exact(&mut body),
            self.read_timeout,
            &self.cancel,
        )
        .await
        .is_err()
        {
            warn!("error reading connect response body");
            return Ok(None);
        }

        let mut body = Bytes::from(body);
        match ConnectResponse::read(&mut body) {
            Ok(response) => {
                debug!(session_id = response.session_id, "connect response");
                Ok(Some(response))
            },
            Err(e) => {
                warn!(error = %e, "malformed connect response");
                Ok(None)
            },
        }
    }

    /// Launches the read loop.  Call once, after a successful handshake.
    pub fn start_read_loop(self: &Arc<Self>) {
        let mut slot = lock(&self.read_loop_task);
        if slot.is_some() {
            return;
        }
        let conn = Arc::clone(self);
        *slot = Some(tokio::spawn(async move {
            conn.read_loop().await;
        }));
    }

    /// Frames and writes a request, parking an unresolved completion handle
    /// under its xid.  Operations with a fixed xid are queued FIFO instead.
    /// A write failure aborts the whole connection.
    pub async fn send(&self, request: Request, xid: i32) -> ZkResult<ReplyReceiver> {
        if self.is_closing() {
            return Err(self.connect_error());
        }

        let xid = request.special_xid().unwrap_or(xid);
        let opcode = request.opcode();
        let payload = request.serialize(xid);

        let mut frame = BytesMut::with_capacity(payload.len() + 4);
        put_i32(&mut frame, payload.len() as i32);
        frame.extend_from_slice(&payload);

        let (tx, rx) = oneshot::channel();
        self.opcode_xref.insert(xid, opcode);
        if SPECIAL_XIDS.contains(&xid) {
            self.pending_specials.entry(xid).or_default().push_back(tx);
        } else {
            self.pending.insert(xid, tx);
        }

        debug!(xid, ?opcode, len = frame.len(), "send");
        let written = {
            let mut w = self.writer.lock().await;
            w.write_all(&frame).await
        };
        if let Err(e) = written {
            warn!(error = %e, xid, "write failed, aborting connection");
            self.abort(self.connect_error());
            return Err(self.connect_error());
        }

        Ok(rx)
    }

    async fn read_loop(self: Arc<Self>) {
        loop {
            let size = tokio::select! {
                _ = self.cancel.cancelled() => return,
                read = async {
                    let mut size_buf = [0u8; 4];
                    let mut reader = self.reader.lock().await;
                    reader.read_exact(&mut size_buf).await.map(|_| i32::from_be_bytes(size_buf))
                } => match read {
                    Ok(size) => size,
                    Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                        // Server went away between frames: a clean stop, but
                        // every parked waiter still gets a transport error.
                        debug!("connection closed by server");
                        if !self.is_closing() {
                            self.abort(self.connect_error());
                        }
                        return;
                    },
                    Err(e) => {
                        warn!(error = %e, "error reading frame size");
                        self.abort(self.connect_error());
                        return;
                    },
                },
            };

            if !(0..=MAX_FRAME_SIZE).contains(&size) {
                warn!(size, "bogus frame size");
                self.abort(ZkError::Decode(format!("bogus frame size {size}")));
                return;
            }

            if let Err(e) = self.read_frame(size as usize).await {
                if !self.is_closing() {
                    warn!(error = %e, "error reading frame");
                    self.abort(e);
                }
                return;
            }
        }
    }

    /// Consumes one frame of `size` bytes and routes it: headerless close
    /// reply, watch event, error reply or regular reply.
    async fn read_frame(&self, size: usize) -> ZkResult<()> {
        // A populated close queue selects headerless parsing, same as the
        // initial connect reply.
        let close_pending = self
            .pending_specials
            .get(&CLOSE_XID)
            .map(|q| !q.is_empty())
            .unwrap_or(false);
        if close_pending {
            let _ = self.read_payload(size).await?;
            debug!("close reply received");
            self.complete(CLOSE_XID, Ok((0, Response::Close)));
            return Ok(());
        }

        if size < REPLY_HEADER_LEN {
            return Err(ZkError::Decode(format!("short reply frame: {size} bytes")));
        }

        let mut header = self.read_payload(REPLY_HEADER_LEN).await?;
        let xid = get_i32(&mut header)?;
        let zxid = get_i64(&mut header)?;
        let err = get_i32(&mut header)?;

        let mut body = self.read_payload(size - REPLY_HEADER_LEN).await?;

        if err != 0 {
            let error = ZkError::from_code(err);
            debug!(xid, code = err, "error reply: {error}");
            self.opcode_xref.remove(&xid);
            self.complete(xid, Err(error));
            return Ok(());
        }

        if xid == WATCH_XID {
            match WatchEvent::read(&mut body) {
                Ok(event) => {
                    debug!(?event, "watch event");
                    let _ = self.watch_tx.send(event);
                },
                Err(e) => warn!(error = %e, "malformed watch event"),
            }
            return Ok(());
        }

        let Some((_, opcode)) = self.opcode_xref.remove(&xid) else {
            warn!(xid, "reply for unknown xid dropped");
            return Ok(());
        };

        match Response::deserialize(opcode, &mut body) {
            Ok(response) => {
                debug!(xid, zxid, "recv");
                self.complete(xid, Ok((zxid, response)));
            },
            Err(e) => {
                warn!(xid, error = %e, "reply body failed to decode");
                self.complete(xid, Err(e));
            },
        }
        Ok(())
    }

    /// Reads exactly `len` payload bytes under the per-read deadline.
    /// Partial reads accumulate until the deadline fires.
    async fn read_payload(&self, len: usize) -> ZkResult<Bytes> {
        if len == 0 {
            return Ok(Bytes::new());
        }
        let mut buf = vec![0u8; len];
        let mut reader = self.reader.lock().await;
        match io_with_timeout(
            reader.read_exact(&mut buf),
            self.read_timeout,
            &self.cancel,
        )
        .await
        {
            Ok(_) => Ok(Bytes::from(buf)),
            Err(IoFailure::Timeout) => Err(ZkError::UnfinishedRead),
            Err(IoFailure::Cancelled) | Err(IoFailure::Io(_)) => {
                Err(self.connect_error())
            },
        }
    }

    fn complete(&self, xid: i32, result: ZkResult<(i64, Response)>) {
        let waiter = if SPECIAL_XIDS.contains(&xid) {
            self.pending_specials
                .get_mut(&xid)
                .and_then(|mut q| q.pop_front())
        } else {
            self.pending.remove(&xid).map(|(_, tx)| tx)
        };
        match waiter {
            // The receiver may be gone when the caller was cancelled; the
            // reply is dropped on the floor in that case.
            Some(tx) => {
                let _ = tx.send(result);
            },
            None => debug!(xid, "no waiter for reply"),
        }
    }

    /// Tears the connection down: refuses new sends, stops the read loop
    /// and fails every parked completion with `error`.
    pub fn abort(&self, error: ZkError) {
        warn!(host = %self.host, port = self.port, %error, "aborting connection");
        self.closing.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        self.fail_all_pending(error);
    }

    fn fail_all_pending(&self, error: ZkError) {
        for xid in SPECIAL_XIDS {
            if let Some((_, mut queue)) = self.pending_specials.remove(&xid) {
                for tx in queue.drain(..) {
                    let _ = tx.send(Err(error.clone()));
                }
            }
        }
        let xids: Vec<i32> = self.pending.iter().map(|entry| *entry.key()).collect();
        for xid in xids {
            if let Some((_, tx)) = self.pending.remove(&xid) {
                let _ = tx.send(Err(error.clone()));
            }
        }
        self.opcode_xref.clear();
    }

    fn has_pending(&self) -> bool {
        !self.pending.is_empty()
            || self
                .pending_specials
                .iter()
                .any(|entry| !entry.value().is_empty())
    }

    /// Graceful shutdown: refuse new sends, let in-flight completions drain
    /// for up to `timeout`, then stop the read loop, fail stragglers with a
    /// timeout and close the stream.  Idempotent.
    pub async fn close(&self, timeout: Duration) {
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(host = %self.host, port = self.port, "closing connection");

        let deadline = Instant::now() + timeout;
        while self.has_pending() && Instant::now() < deadline {
            sleep(Duration::from_millis(25)).await;
        }

        self.cancel.cancel();
        let task = lock(&self.read_loop_task).take();
        if let Some(task) = task {
            let _ = task.await;
        }

        self.fail_all_pending(ZkError::Timeout);

        let mut w = self.writer.lock().await;
        let _ = w.shutdown().await;
        debug!("connection closed");
    }
}

/// Parses the `srvr` probe output: the version triple from the first line
/// and whether the server runs read-only.
fn parse_srvr_banner(banner: &[u8]) -> Option<((u32, u32, u32), bool)> {
    let text = String::from_utf8_lossy(banner);
    let first_line = text.lines().next()?;
    let version = first_line.strip_prefix("Zookeeper version: ")?;
    let (core, _) = version.split_once('-')?;

    let mut parts = core.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    let patch = parts.next()?.parse().ok()?;

    Some(((major, minor, patch), text.contains("READ_ONLY")))
}
