// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Resolves a possibly-relative config path against the current working
/// directory and canonicalizes it.
pub fn resolve_config_path(rel: &str) -> Result<PathBuf> {
    let path = Path::new(rel);

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot get current working dir")?
            .join(path)
    };

    absolute
        .canonicalize()
        .with_context(|| format!("failed to canonicalize path {absolute:?}"))
}
