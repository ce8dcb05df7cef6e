// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::session::RetryPolicy;

/// Client configuration, loadable from YAML.  Constructor parameters remain
/// the source of truth; this is the convenience layer over them.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ZkConfig {
    /// Which servers to talk to and under which path prefix.
    pub ensemble: EnsembleConfig,
    /// Session negotiation and per-read limits.
    pub session: SessionConfig,
    /// Retry behaviour applied to every dispatched operation.
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct EnsembleConfig {
    #[serde(rename = "Servers")]
    /// `host`, `host:port` or `[ipv6]:port` entries.
    pub servers: Vec<String>,

    #[serde(default, rename = "Chroot")]
    /// Prefix prepended to every user-supplied path.
    pub chroot: Option<String>,
}

impl EnsembleConfig {
    pub fn servers_string(&self) -> String {
        self.servers.join(",")
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct SessionConfig {
    #[serde(rename = "SessionTimeout", with = "serde_secs")]
    /// Requested session timeout; the server may negotiate it down.
    pub timeout: Duration,

    #[serde(default, rename = "AllowReadOnly")]
    /// Whether read operations may run against a read-only server.
    pub allow_read_only: bool,

    #[serde(default, rename = "ReadTimeout", with = "serde_opt_secs")]
    /// Per-message read deadline on the connection.
    pub read_timeout: Option<Duration>,
}

/// Serializable mirror of the retry policy constructors.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(tag = "Policy")]
pub enum RetryConfig {
    Forever,
    Once,
    NTimes {
        times: usize,
    },
    ExponentialBackoff {
        base: f64,
        maximum: Option<f64>,
    },
    UntilElapsed {
        #[serde(with = "serde_secs")]
        total: Duration,
    },
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::Forever
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        match self {
            Self::Forever => RetryPolicy::forever(),
            Self::Once => RetryPolicy::once(),
            Self::NTimes { times } => RetryPolicy::n_times(*times),
            Self::ExponentialBackoff { base, maximum } => {
                RetryPolicy::exponential_backoff(*base, *maximum)
            },
            Self::UntilElapsed { total } => RetryPolicy::until_elapsed(*total),
        }
    }
}

impl Default for ZkConfig {
    fn default() -> Self {
        Self {
            ensemble: EnsembleConfig {
                servers: vec!["localhost:2181".to_string()],
                chroot: None,
            },
            session: SessionConfig {
                timeout: Duration::from_secs(10),
                allow_read_only: false,
                read_timeout: None,
            },
            retry: RetryConfig::default(),
        }
    }
}

impl ZkConfig {
    /// Loads the configuration from YAML, validates it, and returns the
    /// ready-to-use value.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        let mut config: ZkConfig =
            serde_yaml::from_str(&raw).context("failed to parse config YAML")?;
        config.validate_and_normalize()?;
        Ok(config)
    }

    /// Validates invariants and normalizes derived fields.
    pub fn validate_and_normalize(&mut self) -> Result<()> {
        ensure!(
            !self.ensemble.servers.is_empty(),
            "Servers must not be empty"
        );
        for server in &self.ensemble.servers {
            ensure!(!server.trim().is_empty(), "empty server entry");
        }

        if let Some(chroot) = &mut self.ensemble.chroot {
            ensure!(!chroot.is_empty(), "Chroot must not be empty when set");
            if !chroot.starts_with('/') {
                chroot.insert(0, '/');
            }
        }

        ensure!(
            self.session.timeout >= Duration::from_secs(1),
            "SessionTimeout must be at least one second"
        );
        if let Some(read_timeout) = self.session.read_timeout {
            ensure!(
                read_timeout > Duration::ZERO,
                "ReadTimeout must be positive"
            );
        }

        if let RetryConfig::NTimes { times } = self.retry {
            ensure!(times >= 1, "NTimes retry needs at least one attempt");
        }

        Ok(())
    }
}

/// Serde helpers for representing `Duration` as a number of seconds.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

mod serde_opt_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        d: &Option<Duration>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<u64>::deserialize(d)?;
        Ok(secs.map(Duration::from_secs))
    }
}
