// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The closed error set of the client.
//!
//! Everything fallible in this crate funnels into [`ZkError`]: transport
//! failures, session lifecycle failures, codec failures and the server's
//! numeric error codes.  The retry pipeline relies on matching individual
//! variants, so the set is deliberately flat and `Clone`/`PartialEq`.

use thiserror::Error;

pub type ZkResult<T> = Result<T, ZkError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZkError {
    #[error("error connecting to {host}:{port}")]
    Connect { host: String, port: u16 },
    #[error("no servers available")]
    NoServers,
    #[error("session was lost")]
    SessionLost,
    #[error("invalid client state: {0}")]
    InvalidClientState(String),
    #[error("operation timed out")]
    Timeout,
    #[error("read ended before the full payload arrived")]
    UnfinishedRead,
    #[error("retry policy gave up")]
    FailedRetry,
    #[error("no operation in the transaction succeeded")]
    TransactionFailed,
    #[error("malformed wire data: {0}")]
    Decode(String),

    // Server-assigned error codes.
    #[error("transaction rolled back")]
    RolledBack,
    #[error("system error")]
    SystemError,
    #[error("runtime inconsistency")]
    RuntimeInconsistency,
    #[error("data inconsistency")]
    DataInconsistency,
    #[error("connection loss")]
    ConnectionLoss,
    #[error("marshalling error")]
    MarshallingError,
    #[error("operation is unimplemented")]
    Unimplemented,
    #[error("operation timeout")]
    OperationTimeout,
    #[error("bad arguments")]
    BadArguments,
    #[error("unknown session")]
    UnknownSession,
    #[error("no quorum for new config")]
    NewConfigNoQuorum,
    #[error("reconfiguration in process")]
    ReconfigInProcess,
    #[error("api error")]
    ApiError,
    #[error("node does not exist")]
    NoNode,
    #[error("not authenticated")]
    NoAuth,
    #[error("version conflict")]
    BadVersion,
    #[error("ephemeral nodes may not have children")]
    NoChildrenForEphemerals,
    #[error("node already exists")]
    NodeExists,
    #[error("node has children")]
    NotEmpty,
    #[error("session expired")]
    SessionExpired,
    #[error("invalid callback")]
    InvalidCallback,
    #[error("invalid acl")]
    InvalidAcl,
    #[error("authentication failed")]
    AuthFailed,
    #[error("session moved")]
    SessionMoved,
    #[error("server is in read-only mode")]
    NotReadOnly,
    #[error("ephemeral node on local session")]
    EphemeralOnLocalSession,
    #[error("no such watcher")]
    NoWatcher,
    #[error("unknown server error code: {0}")]
    Unknown(i32),
}

impl ZkError {
    /// Maps a server reply-header error code to its typed variant.
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::RolledBack,
            -1 => Self::SystemError,
            -2 => Self::RuntimeInconsistency,
            -3 => Self::DataInconsistency,
            -4 => Self::ConnectionLoss,
            -5 => Self::MarshallingError,
            -6 => Self::Unimplemented,
            -7 => Self::OperationTimeout,
            -8 => Self::BadArguments,
            -12 => Self::UnknownSession,
            -13 => Self::NewConfigNoQuorum,
            -14 => Self::ReconfigInProcess,
            -100 => Self::ApiError,
            -101 => Self::NoNode,
            -102 => Self::NoAuth,
            -103 => Self::BadVersion,
            -108 => Self::NoChildrenForEphemerals,
            -110 => Self::NodeExists,
            -111 => Self::NotEmpty,
            -112 => Self::SessionExpired,
            -113 => Self::InvalidCallback,
            -114 => Self::InvalidAcl,
            -115 => Self::AuthFailed,
            -118 => Self::SessionMoved,
            -119 => Self::NotReadOnly,
            -120 => Self::EphemeralOnLocalSession,
            -121 => Self::NoWatcher,
            other => Self::Unknown(other),
        }
    }

    /// Data errors propagate to the caller on first occurrence and are never
    /// retried by the send pipeline.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::NoNode | Self::NodeExists | Self::NotEmpty | Self::BadVersion
        )
    }
}
