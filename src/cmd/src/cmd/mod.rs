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

pub mod check;
pub mod server;

use check::ConfigChecker;
use clap::{Arg, Command};
use server::WebServer;

pub fn build_cli() -> Command {
    Command::new("ipgate")
        .version(env!("CARGO_PKG_VERSION"))
        .author("James Wong")
        .about("Ipgate - A request admission filter by client address, country and prefix directory.")
        .arg_required_else_help(true) // When no args are provided, show help.
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH") // Tips for the user.
                .help("Set global configuration file")
                .global(true), // Global args are available to all subcommands.
        )
        .subcommand(WebServer::build())
        .subcommand(ConfigChecker::build())
}
