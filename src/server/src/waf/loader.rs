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

use crate::{
    config::config::{IpFilterProperties, IpFilterRuleProperties},
    waf::{
        address::AddressResolver,
        blocklist::BlocklistDirectory,
        chain::FilterChain,
        error::{InvalidRuleSnafu, MissingDatabaseSnafu, Result},
        geo::{CountryLookup, GeoClassifier, MaxMindCountryLookup},
        rule::FilterRule,
    },
};
use snafu::ResultExt;
use std::{collections::HashMap, path::PathBuf, sync::Arc};

/// Builds an immutable [`FilterChain`] from the configured rules.
///
/// Loading is all or nothing: the first invalid rule fails the whole chain
/// with its index. Country databases are opened once per path and shared
/// by every rule that names them.
#[derive(Debug, Default)]
pub struct ChainLoader {
    databases: HashMap<PathBuf, Arc<dyn CountryLookup>>,
}

impl ChainLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `lookup` for rules naming the database `path` instead of opening it.
    pub fn with_database(mut self, path: impl Into<PathBuf>, lookup: Arc<dyn CountryLookup>) -> Self {
        self.databases.insert(path.into(), lookup);
        self
    }

    pub fn load(mut self, props: &IpFilterProperties) -> Result<FilterChain> {
        let resolver = AddressResolver::new(&props.forwarded_header)?;
        tracing::info!("Trusted client address header is {}", resolver.header_name());
        let mut rules = Vec::with_capacity(props.rules.len());
        for (index, rule_props) in props.rules.iter().enumerate() {
            let rule = self.build_rule(rule_props).context(InvalidRuleSnafu { index })?;
            tracing::info!("Loaded ipfilter rule #{}: {}", index, rule);
            rules.push(rule);
        }
        Ok(FilterChain::new(resolver, rules))
    }

    fn build_rule(&mut self, props: &IpFilterRuleProperties) -> Result<FilterRule> {
        let mut builder = FilterRule::builder(props.rule).strict(props.strict);
        for scope in tokens(&props.paths) {
            builder = builder.path(scope);
        }

        let countries = tokens(&props.country).collect::<Vec<_>>();
        match (&props.database, countries.is_empty()) {
            (None, false) => return MissingDatabaseSnafu.fail(),
            (Some(database), true) => {
                tracing::warn!("Ignoring country database {} without any country codes", database);
            }
            (Some(database), false) => {
                let lookup = self.database(database)?;
                builder = builder.countries(GeoClassifier::new(lookup, countries));
            }
            (None, true) => {}
        }

        for token in tokens(&props.ip) {
            builder = builder.ip(token)?;
        }
        if let Some(dir) = &props.prefix_dir {
            builder = builder.blocklist(BlocklistDirectory::open(dir)?);
        }
        if let Some(page) = &props.blockpage {
            builder = builder.blockpage(page);
        }
        builder.build()
    }

    fn database(&mut self, path: &str) -> Result<Arc<dyn CountryLookup>> {
        let key = PathBuf::from(path);
        if let Some(lookup) = self.databases.get(&key) {
            return Ok(lookup.clone());
        }
        let lookup: Arc<dyn CountryLookup> = Arc::new(MaxMindCountryLookup::open(&key)?);
        self.databases.insert(key, lookup.clone());
        Ok(lookup)
    }
}

/// Loads the chain of `props`, opening every named country database.
pub fn load_chain(props: &IpFilterProperties) -> Result<FilterChain> {
    ChainLoader::new().load(props)
}

// List entries may hold several whitespace separated tokens.
fn tokens(entries: &[String]) -> impl Iterator<Item = &str> {
    entries.iter().flat_map(|entry| entry.split_whitespace())
}
