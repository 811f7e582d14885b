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

use anyhow::Result;
use clap::{ArgMatches, Command};
use ipgate_server::{
    config::config::{self, AppConfig},
    waf::{error, loader::load_chain},
};

/// Validates the configuration and the ipfilter chain without serving.
pub struct ConfigChecker {}

impl ConfigChecker {
    pub const COMMAND_NAME: &'static str = "check";

    pub fn build() -> Command {
        Command::new(Self::COMMAND_NAME)
            .about("Validate the configuration and print the loaded ipfilter rules.")
    }

    #[allow(clippy::print_stdout)]
    pub fn run(_matches: &ArgMatches) -> Result<()> {
        for line in Self::check(&config::get_config())? {
            println!("{}", line);
        }
        Ok(())
    }

    /// One summary line per rule, in evaluation order.
    pub fn check(config: &AppConfig) -> error::Result<Vec<String>> {
        let chain = load_chain(&config.ipfilter)?;
        if chain.is_empty() {
            return Ok(vec!["no ipfilter rules, every request is admitted".to_string()]);
        }
        Ok(chain
            .rules()
            .iter()
            .enumerate()
            .map(|(index, rule)| format!("#{} {}", index, rule))
            .collect())
    }
}
