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

use common_telemetry::init_global_logging;
use ipgate_cmd::cmd::{build_cli, check::ConfigChecker, server::WebServer};
use ipgate_server::config::config;

#[allow(clippy::print_stderr)]
fn main() {
    let matches = build_cli().get_matches();

    let config = match config::refresh_config(matches.get_one::<String>("config").map(String::as_str)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", ipgate_server::waf::error::display_chain(&e));
            std::process::exit(1);
        }
    };
    let _guards = init_global_logging(&config.service_name, &config.logging);

    let result = match matches.subcommand() {
        Some((WebServer::COMMAND_NAME, sub_matches)) => WebServer::run(sub_matches),
        Some((ConfigChecker::COMMAND_NAME, sub_matches)) => ConfigChecker::run(sub_matches),
        _ => {
            tracing::info!("Use <command> --help for more information about a specific command.");
            Ok(())
        }
    };
    if let Err(e) = result {
        tracing::error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
