// SPDX-License-Identifier: GNU GENERAL PUBLIC LICENSE Version 3
//
// Copyleft (c) 2024 James Wong. This file is part of James Wong.
// is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the
// Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// James Wong is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with James Wong.  If not, see <https://www.gnu.org/licenses/>.
//
// IMPORTANT: Any software that fully or partially contains or uses materials
// covered by this license must also be released under the GNU GPL license.
// This includes modifications and derived works.

use crate::waf::error::{BlocklistIoSnafu, NoSuchDirectorySnafu, Result};
use snafu::ResultExt;
use std::{
    io::ErrorKind,
    net::IpAddr,
    path::{Path, PathBuf},
};

/// A presence based address list kept on disk: a file named by the
/// textual address means the address is listed.
///
/// Entries are looked up directly under the directory, then in the sharded
/// namespace. Two shard layouts are in use and both are accepted:
///
/// - `<dir>/26/01/2601:647:...` (the first two pairs of characters)
/// - `<dir>/2601/647/2601:647:...` (the first two address components)
#[derive(Debug, Clone)]
pub struct BlocklistDirectory {
    dir: PathBuf,
}

impl BlocklistDirectory {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return NoSuchDirectorySnafu { path: dir }.fail();
        }
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn contains(&self, addr: &IpAddr) -> Result<bool> {
        let name = addr.to_string();
        if exists(&self.dir.join(&name))? {
            return Ok(true);
        }
        for (first, second) in shard_keys(&name) {
            if exists(&self.dir.join(first).join(second).join(&name))? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn exists(path: &Path) -> Result<bool> {
    match std::fs::metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).context(BlocklistIoSnafu { path }),
    }
}

fn shard_keys(name: &str) -> Vec<(&str, &str)> {
    let is_separator = |c: char| c == '.' || c == ':';
    let mut keys = Vec::with_capacity(2);

    if name.len() >= 4 && !name[..4].contains(is_separator) {
        keys.push((&name[..2], &name[2..4]));
    }

    let mut components = name.split(is_separator);
    if let (Some(first), Some(second)) = (components.next(), components.next()) {
        if !first.is_empty() && !second.is_empty() && !keys.contains(&(first, second)) {
            keys.push((first, second));
        }
    }
    keys
}
