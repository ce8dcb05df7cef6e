// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The session layer: server selection, handshake, state machine, retrying
//! send pipeline, heartbeats and watch dispatch.
//!
//! A session owns at most one live connection at a time plus three
//! long-running tasks: the repair loop (reconnects whenever the state drops
//! to suspended/lost), the watch dispatch task and a single re-armed
//! heartbeat timer.

use std::{
    sync::{
        Arc, Mutex as StdMutex,
        atomic::{AtomicBool, AtomicI32, AtomicI64, Ordering},
    },
    time::Duration,
};

use dashmap::DashMap;
use rand::seq::SliceRandom;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{sleep, timeout},
};
use tracing::{debug, error, info, warn};

use crate::{
    client::connection::Connection,
    errors::{ZkError, ZkResult},
    protocol::{
        ConnectRequest, EventKind, PingRequest, Request, Response,
        SetWatchesRequest, WatchEvent, request::RequestRecord,
    },
    session::{
        retry::RetryPolicy,
        state::{SessionState, SessionStateMachine},
    },
    utils::lock,
};

pub const DEFAULT_ZOOKEEPER_PORT: u16 = 2181;

/// Cap on the exponential backoff between connect rounds, in seconds.
const MAX_FIND_WAIT: f64 = 60.0;

/// Heartbeats per negotiated timeout interval.
const HEARTBEAT_FREQUENCY: u32 = 3;

/// Callback invoked with the path of a fired watch.
pub type WatchCallback = Arc<dyn Fn(&str) + Send + Sync>;

pub struct Session {
    hosts: Vec<(String, u16)>,
    conn: StdMutex<Option<Arc<Connection>>>,

    pub state: SessionStateMachine,
    retry_policy: RetryPolicy,
    allow_read_only: bool,

    xid: AtomicI32,
    last_zxid: AtomicI64,
    session_id: AtomicI64,
    password: StdMutex<Vec<u8>>,
    timeout: StdMutex<Duration>,
    read_timeout: Option<Duration>,

    watch_callbacks: DashMap<(i32, String), Vec<(u64, WatchCallback)>>,
    callback_seq: std::sync::atomic::AtomicU64,

    watch_tx: mpsc::UnboundedSender<WatchEvent>,
    watch_rx: StdMutex<Option<mpsc::UnboundedReceiver<WatchEvent>>>,

    repair_task: StdMutex<Option<JoinHandle<()>>>,
    dispatch_task: StdMutex<Option<JoinHandle<()>>>,
    heartbeat_task: StdMutex<Option<JoinHandle<()>>>,

    started: AtomicBool,
    closing: AtomicBool,
}

impl Session {
    pub fn new(
        servers: &str,
        session_timeout: Duration,
        retry_policy: Option<RetryPolicy>,
        allow_read_only: bool,
        read_timeout: Option<Duration>,
    ) -> ZkResult<Self> {
        let hosts = parse_servers(servers)?;
        let (watch_tx, watch_rx) = mpsc::unbounded_channel();

        Ok(Self {
            hosts,
            conn: StdMutex::new(None),
            state: SessionStateMachine::new(),
            retry_policy: retry_policy.unwrap_or_else(RetryPolicy::forever),
            allow_read_only,
            xid: AtomicI32::new(0),
            last_zxid: AtomicI64::new(0),
            session_id: AtomicI64::new(0),
            password: StdMutex::new(vec![0u8; 16]),
            timeout: StdMutex::new(session_timeout),
            read_timeout,
            watch_callbacks: DashMap::new(),
            callback_seq: std::sync::atomic::AtomicU64::new(0),
            watch_tx,
            watch_rx: StdMutex::new(Some(watch_rx)),
            repair_task: StdMutex::new(None),
            dispatch_task: StdMutex::new(None),
            heartbeat_task: StdMutex::new(None),
            started: AtomicBool::new(false),
            closing: AtomicBool::new(false),
        })
    }

    pub fn last_zxid(&self) -> i64 {
        self.last_zxid.load(Ordering::SeqCst)
    }

    pub fn session_id(&self) -> i64 {
        self.session_id.load(Ordering::SeqCst)
    }

    pub fn negotiated_timeout(&self) -> Duration {
        *lock(&self.timeout)
    }

    pub fn current_connection(&self) -> Option<Arc<Connection>> {
        lock(&self.conn).clone()
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Launches the background loops and parks until the session reaches a
    /// safe state.  Calling `start` on a started session just waits.
    pub async fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            self.ensure_safe_state(false).await;
            return;
        }
        debug!("starting session");

        if let Some(mut watch_rx) = lock(&self.watch_rx).take() {
            let session = Arc::clone(self);
            *lock(&self.dispatch_task) = Some(tokio::spawn(async move {
                while let Some(event) = watch_rx.recv().await {
                    session.event_dispatch(event);
                }
            }));
        }

        self.set_heartbeat();

        let session = Arc::clone(self);
        *lock(&self.repair_task) = Some(tokio::spawn(async move {
            session.repair_loop().await;
        }));

        self.ensure_safe_state(false).await;
    }

    /// Parks until the session is in a state where the given kind of
    /// operation is safe to dispatch.
    pub async fn ensure_safe_state(&self, writing: bool) {
        let mut safe_states = vec![SessionState::Connected];
        if self.allow_read_only && !writing {
            safe_states.push(SessionState::ReadOnly);
        }
        if self.state.is_in(&safe_states) {
            return;
        }
        self.state.wait_for(&safe_states).await;
    }

    /// Searches for a reachable server under exponential backoff and
    /// installs a fresh connection to it.  When only a read-only server
    /// answers, a background hunt for a writable one continues.
    async fn find_server(self: &Arc<Self>, allow_read_only: bool) {
        let conn = self.locate(allow_read_only).await;
        let read_only = conn.start_read_only;
        self.install_connection(conn);

        if read_only {
            let session = Arc::clone(self);
            tokio::spawn(async move {
                info!("connected read-only, keeping a lookout for a writable server");
                let writable = session.locate(false).await;
                session.install_connection(writable);
                // Drop to suspended so the repair loop re-establishes the
                // session on the writable server.
                session.state.transition_to(SessionState::Suspended);
            });
        }
    }

    async fn locate(&self, allow_read_only: bool) -> Arc<Connection> {
        let retry = RetryPolicy::exponential_backoff(2.0, Some(MAX_FIND_WAIT));
        let ticket = retry.ticket();

        loop {
            let _ = retry.enforce(&ticket).await;

            let mut servers = self.hosts.clone();
            servers.shuffle(&mut rand::rng());

            for (host, port) in servers {
                info!(%host, port, "connecting");
                let conn = match Connection::connect(
                    &host,
                    port,
                    self.watch_tx.clone(),
                    self.read_timeout,
                )
                .await
                {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(%host, port, error = %e, "could not connect");
                        continue;
                    },
                };
                if conn.start_read_only && !allow_read_only {
                    tokio::spawn(async move {
                        conn.close(Duration::from_secs(1)).await;
                    });
                    continue;
                }
                info!(%host, port, "connected");
                return conn;
            }

            warn!("no servers available, will keep trying");
        }
    }

    fn install_connection(&self, conn: Arc<Connection>) {
        let old = lock(&self.conn).replace(conn);
        if let Some(old) = old {
            debug!("closing previous connection");
            let close_timeout = self.negotiated_timeout();
            tokio::spawn(async move {
                old.close(close_timeout).await;
            });
        }
    }

    /// Runs the handshake on the current connection.  A nil or zero-session
    /// reply means the server rejected the resume: the session drops to
    /// lost and every caller sees `SessionLost`.
    async fn establish_session(&self) -> ZkResult<()> {
        let session_id = self.session_id();
        info!(session_id = format_args!("{session_id:#x}"), "establishing session");

        let conn = self.current_connection().ok_or(ZkError::NoServers)?;

        let request = ConnectRequest {
            protocol_version: 0,
            last_seen_zxid: self.last_zxid(),
            timeout_ms: self.negotiated_timeout().as_millis() as i32,
            session_id,
            password: lock(&self.password).clone(),
            read_only: self.allow_read_only,
        };

        let response = conn.send_connect(&request).await?;

        let Some(response) = response else {
            // Usually an inconsistent zxid on reconnection; the server just
            // hangs up instead of answering.
            if self.state.current() != SessionState::Lost {
                self.state.transition_to(SessionState::Lost);
            }
            self.last_zxid.store(0, Ordering::SeqCst);
            return Err(ZkError::SessionLost);
        };

        if response.session_id == 0 {
            debug!("session expired");
            if self.state.current() != SessionState::Lost {
                self.state.transition_to(SessionState::Lost);
            }
            self.last_zxid.store(0, Ordering::SeqCst);
            return Err(ZkError::SessionLost);
        }

        info!(
            session_id = format_args!("{:#x}", response.session_id),
            timeout_ms = response.timeout_ms,
            "negotiated session"
        );
        self.session_id.store(response.session_id, Ordering::SeqCst);
        *lock(&self.password) = response.password;
        *lock(&self.timeout) = Duration::from_millis(response.timeout_ms.max(0) as u64);
        Ok(())
    }

    /// Runs for the life of the session: whenever the state drops to
    /// suspended or lost, finds a server, re-establishes the session,
    /// restarts the read loop and re-arms the registered watches.
    async fn repair_loop(self: Arc<Self>) {
        loop {
            debug!("waiting for repairable state");
            self.state
                .wait_for(&[SessionState::Suspended, SessionState::Lost])
                .await;
            if self.is_closing() {
                break;
            }
            debug!("repair state reached");

            self.find_server(self.allow_read_only).await;

            let establish_timeout = self.negotiated_timeout();
            let established =
                match timeout(establish_timeout, self.establish_session()).await {
                    Ok(result) => result,
                    Err(_) => Err(ZkError::Timeout),
                };

            if let Err(e) = established {
                info!(error = %e, "session establishment failed");
                if let Some(conn) = self.current_connection() {
                    conn.abort(ZkError::SessionLost);
                    conn.close(self.negotiated_timeout()).await;
                }
                self.session_id.store(0, Ordering::SeqCst);
                *lock(&self.password) = vec![0u8; 16];
                continue;
            }

            let Some(conn) = self.current_connection() else {
                continue;
            };

            if conn.start_read_only {
                self.state.transition_to(SessionState::ReadOnly);
            } else {
                self.state.transition_to(SessionState::Connected);
            }

            conn.start_read_loop();

            if let Err(e) = self.set_existing_watches().await {
                warn!(error = %e, "failed to re-arm watches");
            }
        }
    }

    fn next_xid(&self) -> i32 {
        let previous = self
            .xid
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |xid| {
                Some(if xid == i32::MAX { 1 } else { xid + 1 })
            });
        match previous {
            Ok(i32::MAX) | Err(_) => 1,
            Ok(xid) => xid + 1,
        }
    }

    /// The send pipeline: enforce the retry policy, wait for a safe state,
    /// dispatch under a fresh xid and sort the outcome.  Transport errors
    /// suspend the session and retry; data errors propagate untouched.
    pub async fn send(self: &Arc<Self>, request: Request) -> ZkResult<Response> {
        let ticket = self.retry_policy.ticket();
        loop {
            self.retry_policy.enforce(&ticket).await?;
            self.ensure_safe_state(request.writes_data()).await;

            let Some(conn) = self.current_connection() else {
                self.state.transition_to(SessionState::Suspended);
                continue;
            };

            let xid = self.next_xid();
            let result = match conn.send(request.clone(), xid).await {
                Ok(reply) => match reply.await {
                    Ok(result) => result,
                    Err(_) => Err(ZkError::Connect {
                        host: conn.host.clone(),
                        port: conn.port,
                    }),
                },
                Err(e) => Err(e),
            };

            match result {
                Ok((zxid, response)) => {
                    self.last_zxid.store(zxid, Ordering::SeqCst);
                    self.set_heartbeat();
                    self.retry_policy.clear(&ticket);
                    return Ok(response);
                },
                Err(e) if e.is_data_error() => {
                    self.retry_policy.clear(&ticket);
                    return Err(e);
                },
                Err(ZkError::Connect { .. }) => {
                    self.state.transition_to(SessionState::Suspended);
                },
                Err(e) => {
                    error!(error = %e, "send failed");
                    self.retry_policy.clear(&ticket);
                    return Err(e);
                },
            }
        }
    }

    /// Re-arms the heartbeat timer at a third of the negotiated timeout.
    /// The previous timer task is always cancelled first, so at most one
    /// exists even when a send races a ping in flight.
    fn set_heartbeat(self: &Arc<Self>) {
        let delay = self.negotiated_timeout() / HEARTBEAT_FREQUENCY;
        let session = Arc::clone(self);
        let mut slot = lock(&self.heartbeat_task);
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        *slot = Some(tokio::spawn(async move {
            sleep(delay).await;
            session.heartbeat().await;
        }));
    }

    async fn heartbeat(self: &Arc<Self>) {
        if self.is_closing() {
            return;
        }
        self.ensure_safe_state(false).await;

        let outcome = async {
            let conn = self.current_connection().ok_or(ZkError::NoServers)?;
            let deadline =
                self.negotiated_timeout() - self.negotiated_timeout() / HEARTBEAT_FREQUENCY;
            let reply = conn.send(Request::Ping(PingRequest), 0).await?;
            match timeout(deadline, reply).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(ZkError::Connect {
                    host: conn.host.clone(),
                    port: conn.port,
                }),
                Err(_) => Err(ZkError::Timeout),
            }
        }
        .await;

        match outcome {
            Ok((zxid, _)) => {
                self.last_zxid.store(zxid, Ordering::SeqCst);
            },
            Err(ZkError::Connect { .. })
            | Err(ZkError::Timeout)
            | Err(ZkError::NoServers) => {
                self.state.transition_to(SessionState::Suspended);
            },
            Err(e) => {
                error!(error = %e, "heartbeat failed");
            },
        }

        self.set_heartbeat();
    }

    /// Registers a callback for `(kind, path)` and returns its id for later
    /// removal.
    pub fn add_watch_callback(
        &self,
        kind: EventKind,
        path: &str,
        callback: WatchCallback,
    ) -> u64 {
        let id = self
            .callback_seq
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.watch_callbacks
            .entry((kind.as_i32(), path.to_string()))
            .or_default()
            .push((id, callback));
        id
    }

    pub fn remove_watch_callback(&self, kind: EventKind, path: &str, id: u64) {
        let key = (kind.as_i32(), path.to_string());
        let mut now_empty = false;
        if let Some(mut entry) = self.watch_callbacks.get_mut(&key) {
            entry.retain(|(callback_id, _)| *callback_id != id);
            now_empty = entry.is_empty();
        }
        if now_empty {
            self.watch_callbacks.remove_if(&key, |_, v| v.is_empty());
        }
    }

    /// Routes one server-pushed event: znode notifications go to the
    /// registered callbacks, type-0 events drive the state machine.
    fn event_dispatch(&self, event: WatchEvent) {
        debug!(?event, "got watch event");

        if event.event_type != 0 {
            let key = (event.event_type, event.path.clone());
            let callbacks: Vec<WatchCallback> = self
                .watch_callbacks
                .get(&key)
                .map(|entry| entry.iter().map(|(_, cb)| Arc::clone(cb)).collect())
                .unwrap_or_default();
            for callback in callbacks {
                callback(&event.path);
            }
            return;
        }

        match event.state {
            WatchEvent::DISCONNECTED => {
                error!("got 'disconnected' watch event");
                self.state.transition_to(SessionState::Lost);
            },
            WatchEvent::SESSION_EXPIRED => {
                error!("got 'session expired' watch event");
                self.state.transition_to(SessionState::Lost);
            },
            WatchEvent::AUTH_FAILED => {
                error!("got 'auth failed' watch event");
                self.state.transition_to(SessionState::Lost);
            },
            WatchEvent::CONNECTED_READ_ONLY => {
                warn!("got 'connected read only' watch event");
                self.state.transition_to(SessionState::ReadOnly);
            },
            WatchEvent::SASL_AUTHENTICATED => {
                info!("authentication successful");
            },
            WatchEvent::CONNECTED => {
                info!("got 'connected' watch event");
                self.state.transition_to(SessionState::Connected);
            },
            other => debug!(state = other, "unhandled session event"),
        }
    }

    /// Replays the whole watch registry to the server in one request.
    /// Created and deleted watches re-arm as exists watches, which the
    /// server fires for both kinds of change.
    async fn set_existing_watches(self: &Arc<Self>) -> ZkResult<()> {
        if self.watch_callbacks.is_empty() {
            return Ok(());
        }

        let mut request = SetWatchesRequest {
            relative_zxid: self.last_zxid(),
            ..Default::default()
        };

        for entry in self.watch_callbacks.iter() {
            if entry.value().is_empty() {
                continue;
            }
            let (kind, path) = entry.key();
            match EventKind::from_i32(*kind) {
                Some(EventKind::Created) | Some(EventKind::Deleted) => {
                    request.exist_watches.push(path.clone());
                },
                Some(EventKind::DataChanged) => {
                    request.data_watches.push(path.clone());
                },
                Some(EventKind::ChildrenChanged) => {
                    request.child_watches.push(path.clone());
                },
                None => {},
            }
        }

        if request.data_watches.is_empty()
            && request.exist_watches.is_empty()
            && request.child_watches.is_empty()
        {
            return Ok(());
        }

        self.send(Request::SetWatches(request)).await.map(|_| ())
    }

    /// Ends the session: best-effort close request bounded by the
    /// negotiated timeout, then connection teardown and task reclamation.
    /// Idempotent.
    pub async fn close(self: &Arc<Self>) {
        if !self.started.load(Ordering::SeqCst) {
            debug!("session never started, nothing to close");
            return;
        }
        if self.closing.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(task) = lock(&self.repair_task).take() {
            task.abort();
        }

        let close_timeout = self.negotiated_timeout();
        let sent = timeout(
            close_timeout,
            self.send(Request::Close(crate::protocol::CloseRequest)),
        )
        .await;
        if let Ok(Err(e)) = sent {
            debug!(error = %e, "close request failed");
        }

        if self.state.current() != SessionState::Lost {
            self.state.transition_to(SessionState::Lost);
        }

        let conn = lock(&self.conn).take();
        if let Some(conn) = conn {
            conn.close(close_timeout).await;
        }

        if let Some(task) = lock(&self.heartbeat_task).take() {
            task.abort();
        }
        if let Some(task) = lock(&self.dispatch_task).take() {
            task.abort();
        }

        self.closing.store(false, Ordering::SeqCst);
        self.started.store(false, Ordering::SeqCst);
    }
}

fn parse_servers(servers: &str) -> ZkResult<Vec<(String, u16)>> {
    let mut hosts = Vec::new();
    for server in servers.split(',') {
        let server = server.trim();
        if server.is_empty() {
            continue;
        }
        let (host, port) = if let Some(rest) = server.strip_prefix('[') {
            // IPv6 literal: [addr]:port
            let (addr, port) = rest
                .split_once("]:")
                .ok_or(ZkError::BadArguments)?;
            (
                addr.to_string(),
                port.parse().map_err(|_| ZkError::BadArguments)?,
            )
        } else if let Some((host, port)) = server.rsplit_once(':') {
            (
                host.to_string(),
                port.parse().map_err(|_| ZkError::BadArguments)?,
            )
        } else {
            (server.to_string(), DEFAULT_ZOOKEEPER_PORT)
        };
        hosts.push((host, port));
    }
    if hosts.is_empty() {
        return Err(ZkError::NoServers);
    }
    Ok(hosts)
}
