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

use crate::waf::error::{LookupSnafu, NoSuchFileSnafu, OpenDatabaseSnafu, Result};
use maxminddb::{geoip2, MaxMindDBError, Reader};
use snafu::ResultExt;
use std::{
    collections::HashSet,
    fmt::Debug,
    net::IpAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

/// The external country lookup: resolves an address to an ISO country code.
///
/// An empty code means the location is unknown, failures to look up are
/// errors and never defaulted to any code.
pub trait CountryLookup: Send + Sync + Debug {
    fn country_of(&self, ip: &IpAddr) -> Result<String>;
}

/// A MaxMind (GeoLite2/GeoIP2) country database, opened once and shared
/// read-only between every rule that names the same file.
pub struct MaxMindCountryLookup {
    path: PathBuf,
    reader: Reader<Vec<u8>>,
}

impl MaxMindCountryLookup {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.is_file() {
            return NoSuchFileSnafu { path }.fail();
        }
        let reader = Reader::open_readfile(&path).context(OpenDatabaseSnafu { path: &path })?;
        tracing::info!(
            "Opened country database {} ({}, build epoch {})",
            path.display(),
            reader.metadata.database_type,
            reader.metadata.build_epoch
        );
        Ok(Self { path, reader })
    }
}

impl CountryLookup for MaxMindCountryLookup {
    fn country_of(&self, ip: &IpAddr) -> Result<String> {
        match self.reader.lookup::<geoip2::Country>(*ip) {
            Ok(record) => Ok(record
                .country
                .and_then(|c| c.iso_code)
                .map(String::from)
                .unwrap_or_default()),
            Err(MaxMindDBError::AddressNotFoundError(_)) => Ok(String::new()),
            Err(e) => LookupSnafu {
                ip: *ip,
                reason: e.to_string(),
            }
            .fail(),
        }
    }
}

impl Debug for MaxMindCountryLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaxMindCountryLookup").field("path", &self.path).finish()
    }
}

impl Drop for MaxMindCountryLookup {
    fn drop(&mut self) {
        tracing::debug!("Closing country database {}", self.path.display());
    }
}

/// Reduces the lookup result to membership in a set of country codes.
#[derive(Debug, Clone)]
pub struct GeoClassifier {
    lookup: Arc<dyn CountryLookup>,
    countries: HashSet<String>,
}

impl GeoClassifier {
    pub fn new<I, S>(lookup: Arc<dyn CountryLookup>, countries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let countries = countries
            .into_iter()
            .map(|c| c.as_ref().trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .collect();
        Self { lookup, countries }
    }

    pub fn countries(&self) -> &HashSet<String> {
        &self.countries
    }

    pub fn country_of(&self, ip: &IpAddr) -> Result<String> {
        self.lookup.country_of(ip)
    }

    /// An unknown location (empty code) is never in the set.
    pub fn matches(&self, ip: &IpAddr) -> Result<bool> {
        let country = self.country_of(ip)?;
        Ok(self.countries.contains(&country.to_uppercase()))
    }
}
