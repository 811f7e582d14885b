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
    config::config::AppConfig,
    waf::{chain::FilterChain, error::Result, loader::load_chain},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct IpgateState {
    pub config: Arc<AppConfig>,
    // Built once at startup, read-only for every request afterwards.
    pub chain: Arc<FilterChain>,
}

impl IpgateState {
    pub fn new(config: &Arc<AppConfig>) -> Result<Self> {
        let chain = load_chain(&config.ipfilter)?;
        tracing::info!("Loaded ipfilter chain with {} rules", chain.rules().len());
        Ok(Self::with_chain(config, chain))
    }

    pub fn with_chain(config: &Arc<AppConfig>, chain: FilterChain) -> Self {
        IpgateState {
            config: config.to_owned(),
            chain: Arc::new(chain),
        }
    }
}
