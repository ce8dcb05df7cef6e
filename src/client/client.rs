// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The user-facing client: path normalization under the configured chroot,
//! typed operation wrappers and the advisory stat cache.

use std::{
    pin::Pin,
    sync::{Arc, Mutex as StdMutex},
};

use bytes::Bytes;
use dashmap::DashMap;
use tokio::{sync::oneshot, time::timeout};
use tracing::info;

use crate::{
    cfg::config::ZkConfig,
    client::transaction::Transaction,
    errors::{ZkError, ZkResult},
    protocol::{
        Acl, AuthRequest, CreateFlags, CreateRequest, DeleteRequest, EventKind,
        ExistsRequest, GetAclRequest, GetChildren2Request, GetDataRequest, Request,
        Response, SetAclRequest, SetDataRequest, Stat, SyncRequest,
        UNRESTRICTED_ACCESS,
    },
    session::{Session, WatchCallback},
    utils::{Deadline, lock},
};

/// Capabilities implied by the server version the probe reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    pub create_with_stat: bool,
    pub containers: bool,
    pub reconfigure: bool,
}

impl Features {
    pub fn from_version(version: (u32, u32, u32)) -> Self {
        Self {
            create_with_stat: version >= (3, 5, 0),
            containers: version >= (3, 5, 1),
            reconfigure: version >= (3, 5, 0),
        }
    }
}

/// Handle on the coordination service.  Cheap to clone; all clones share
/// one session.
#[derive(Clone)]
pub struct ZkClient {
    session: Arc<Session>,
    chroot: Option<String>,
    default_acl: Vec<Acl>,
    stat_cache: Arc<DashMap<String, Stat>>,
}

impl ZkClient {
    pub fn new(config: &ZkConfig) -> ZkResult<Self> {
        let chroot = config
            .ensemble
            .chroot
            .as_deref()
            .map(|chroot| normalize(chroot, None));
        if let Some(chroot) = &chroot {
            info!(%chroot, "using chroot");
        }

        let session = Session::new(
            &config.ensemble.servers_string(),
            config.session.timeout,
            Some(config.retry.to_policy()),
            config.session.allow_read_only,
            config.session.read_timeout,
        )?;

        Ok(Self {
            session: Arc::new(session),
            chroot,
            default_acl: vec![UNRESTRICTED_ACCESS.clone()],
            stat_cache: Arc::new(DashMap::new()),
        })
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn stat_cache(&self) -> &DashMap<String, Stat> {
        &self.stat_cache
    }

    /// Capabilities of the currently connected server; everything off when
    /// nothing is connected yet.
    pub fn features(&self) -> Features {
        match self.session.current_connection() {
            Some(conn) => Features::from_version(conn.version_info),
            None => Features::from_version((0, 0, 0)),
        }
    }

    pub async fn start(&self) -> ZkResult<()> {
        self.session.start().await;
        if self.chroot.is_some() {
            self.ensure_path("/", None).await?;
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.session.close().await;
    }

    /// Prefixes the chroot and collapses the path to its canonical form:
    /// single slashes, no trailing slash, root is `/`.
    pub fn normalize_path(&self, path: &str) -> String {
        normalize(path, self.chroot.as_deref())
    }

    /// Strips the chroot off a server-side path.
    pub fn denormalize_path(&self, path: &str) -> String {
        if let Some(chroot) = &self.chroot
            && let Some(stripped) = path.strip_prefix(chroot.as_str())
        {
            if stripped.is_empty() {
                return "/".to_string();
            }
            return stripped.to_string();
        }
        path.to_string()
    }

    /// Dispatches a request and feeds any returned stat into the cache
    /// under the denormalized path.
    pub async fn send(&self, request: Request) -> ZkResult<Response> {
        let path = request.path().map(str::to_owned);
        let response = self.session.send(request).await?;

        if let (Some(path), Some(stat)) = (path, response.stat()) {
            self.stat_cache.insert(self.denormalize_path(&path), *stat);
        }

        Ok(response)
    }

    pub async fn exists(&self, path: &str, watch: bool) -> ZkResult<bool> {
        let path = self.normalize_path(path);
        match self
            .send(Request::Exists(ExistsRequest { path, watch }))
            .await
        {
            Ok(_) => Ok(true),
            Err(ZkError::NoNode) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Creates a znode and returns its denormalized path (the server
    /// assigns the suffix for sequentials).  Uses the stat-bearing create
    /// variant when the server supports it.
    pub async fn create(
        &self,
        path: &str,
        data: Option<Bytes>,
        acl: Option<Vec<Acl>>,
        flags: CreateFlags,
    ) -> ZkResult<String> {
        let features = self.features();
        if flags.contains(CreateFlags::CONTAINER) && !features.containers {
            return Err(ZkError::BadArguments);
        }

        let request = CreateRequest {
            path: self.normalize_path(path),
            data,
            acl: acl.unwrap_or_else(|| self.default_acl.clone()),
            flags,
            with_stat: features.create_with_stat,
        };

        let response = self.send(Request::Create(request)).await?;
        let created = response.path().unwrap_or_default();
        Ok(self.denormalize_path(created))
    }

    /// Creates every missing ancestor of `path`, using container znodes
    /// where the server supports them.  Already-existing segments are fine.
    pub async fn ensure_path(&self, path: &str, acl: Option<Vec<Acl>>) -> ZkResult<()> {
        let path = self.normalize_path(path);
        let features = self.features();
        let acl = acl.unwrap_or_else(|| self.default_acl.clone());

        let mut prefix = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            prefix.push('/');
            prefix.push_str(segment);

            let mut flags = CreateFlags::empty();
            if features.containers {
                flags |= CreateFlags::CONTAINER;
            }

            let request = CreateRequest {
                path: prefix.clone(),
                data: None,
                acl: acl.clone(),
                flags,
                with_stat: features.create_with_stat,
            };
            match self.send(Request::Create(request)).await {
                Ok(_) | Err(ZkError::NodeExists) => {},
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Deletes a znode.  Without `force`, the cached stat's version rides
    /// along so a concurrent change surfaces as `BadVersion`.
    pub async fn delete(&self, path: &str, force: bool) -> ZkResult<()> {
        let path = self.normalize_path(path);
        let version = self.known_version(&path, force);
        self.send(Request::Delete(DeleteRequest { path, version }))
            .await
            .map(|_| ())
    }

    /// Depth-first removal of a whole subtree, children before parents.
    pub fn deleteall<'a>(
        &'a self,
        path: &'a str,
    ) -> Pin<Box<dyn Future<Output = ZkResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let children = self.get_children(path, false).await?;
            for child in children {
                let child_path = format!("{}/{child}", path.trim_end_matches('/'));
                self.deleteall(&child_path).await?;
            }
            self.delete(path, true).await
        })
    }

    pub async fn get(&self, path: &str, watch: bool) -> ZkResult<(Option<Bytes>, Stat)> {
        let path = self.normalize_path(path);
        let response = self
            .send(Request::GetData(GetDataRequest { path, watch }))
            .await?;
        match response {
            Response::GetData(r) => Ok((r.data, r.stat)),
            other => Err(unexpected_reply("getData", &other)),
        }
    }

    pub async fn get_data(&self, path: &str, watch: bool) -> ZkResult<Option<Bytes>> {
        Ok(self.get(path, watch).await?.0)
    }

    /// Writes data under an explicit version; optimistic-concurrency
    /// conflicts surface directly as `BadVersion`.
    pub async fn set(
        &self,
        path: &str,
        data: Option<Bytes>,
        version: i32,
    ) -> ZkResult<Stat> {
        let path = self.normalize_path(path);
        let response = self
            .send(Request::SetData(SetDataRequest {
                path,
                data,
                version,
            }))
            .await?;
        match response {
            Response::SetData(r) => Ok(r.stat),
            other => Err(unexpected_reply("setData", &other)),
        }
    }

    pub async fn set_data(
        &self,
        path: &str,
        data: Option<Bytes>,
        force: bool,
    ) -> ZkResult<()> {
        let path = self.normalize_path(path);
        let version = self.known_version(&path, force);
        self.send(Request::SetData(SetDataRequest {
            path,
            data,
            version,
        }))
        .await
        .map(|_| ())
    }

    pub async fn get_children(&self, path: &str, watch: bool) -> ZkResult<Vec<String>> {
        let path = self.normalize_path(path);
        let response = self
            .send(Request::GetChildren2(GetChildren2Request { path, watch }))
            .await?;
        match response {
            Response::GetChildren2(r) => Ok(r.children),
            other => Err(unexpected_reply("getChildren2", &other)),
        }
    }

    pub async fn get_acl(&self, path: &str) -> ZkResult<Vec<Acl>> {
        let path = self.normalize_path(path);
        let response = self.send(Request::GetAcl(GetAclRequest { path })).await?;
        match response {
            Response::GetAcl(r) => Ok(r.acl),
            other => Err(unexpected_reply("getACL", &other)),
        }
    }

    pub async fn set_acl(&self, path: &str, acl: Vec<Acl>, force: bool) -> ZkResult<()> {
        let path = self.normalize_path(path);
        let version = match (force, self.stat_cache.get(&self.denormalize_path(&path))) {
            (false, Some(stat)) => stat.acl_version,
            _ => -1,
        };
        self.send(Request::SetAcl(SetAclRequest { path, acl, version }))
            .await
            .map(|_| ())
    }

    /// Flushes the leader/follower channel for this path's subtree.
    pub async fn sync(&self, path: &str) -> ZkResult<()> {
        let path = self.normalize_path(path);
        self.send(Request::Sync(SyncRequest { path }))
            .await
            .map(|_| ())
    }

    /// Passes an authentication credential through to the server.
    pub async fn add_auth(&self, scheme: &str, auth: &[u8]) -> ZkResult<()> {
        self.send(Request::Auth(AuthRequest {
            auth_type: 0,
            scheme: scheme.to_string(),
            auth: auth.to_vec(),
        }))
        .await
        .map(|_| ())
    }

    pub fn begin_transaction(&self) -> Transaction {
        Transaction::new(self.clone())
    }

    /// Installs a one-shot completion that resolves as soon as any of the
    /// given event kinds fires for `path`.  Register the waiter *before*
    /// the operation that arms the server-side watch.
    pub fn wait_for_events(&self, kinds: &[EventKind], path: &str) -> WatchWaiter {
        let path = self.normalize_path(path);

        let (tx, rx) = oneshot::channel();
        let tx = Arc::new(StdMutex::new(Some(tx)));

        let mut registrations = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let tx = Arc::clone(&tx);
            let callback: WatchCallback = Arc::new(move |fired: &str| {
                if let Some(tx) = lock(&tx).take() {
                    let _ = tx.send(fired.to_string());
                }
            });
            let id = self.session.add_watch_callback(*kind, &path, callback);
            registrations.push((*kind, id));
        }

        WatchWaiter {
            session: Arc::clone(&self.session),
            path,
            registrations,
            rx: Some(rx),
        }
    }

    fn known_version(&self, normalized_path: &str, force: bool) -> i32 {
        if force {
            return -1;
        }
        self.stat_cache
            .get(&self.denormalize_path(normalized_path))
            .map(|stat| stat.version)
            .unwrap_or(-1)
    }
}

/// One-shot watch completion.  Dropping it (fired or not) removes its
/// registrations from the session.
pub struct WatchWaiter {
    session: Arc<Session>,
    path: String,
    registrations: Vec<(EventKind, u64)>,
    rx: Option<oneshot::Receiver<String>>,
}

impl WatchWaiter {
    /// Resolves with the path of the event that fired.
    pub async fn wait(mut self) -> ZkResult<String> {
        let Some(rx) = self.rx.take() else {
            return Err(ZkError::InvalidClientState(
                "watch waiter already consumed".to_string(),
            ));
        };
        rx.await.map_err(|_| {
            ZkError::InvalidClientState("watch waiter cancelled".to_string())
        })
    }

    /// Like [`wait`](Self::wait) but bounded by a caller deadline.
    pub async fn wait_deadline(self, deadline: &Deadline) -> ZkResult<String> {
        match deadline.remaining() {
            None => self.wait().await,
            Some(remaining) => match timeout(remaining, self.wait()).await {
                Ok(result) => result,
                Err(_) => Err(ZkError::Timeout),
            },
        }
    }
}

impl Drop for WatchWaiter {
    fn drop(&mut self) {
        for (kind, id) in &self.registrations {
            self.session.remove_watch_callback(*kind, &self.path, *id);
        }
    }
}

fn normalize(path: &str, chroot: Option<&str>) -> String {
    let joined = match chroot {
        Some(chroot) => format!("{chroot}/{path}"),
        None => path.to_string(),
    };
    let segments: Vec<&str> = joined.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

fn unexpected_reply(operation: &str, response: &Response) -> ZkError {
    ZkError::Decode(format!("unexpected reply to {operation}: {response:?}"))
}
