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

use anyhow::{Context, Result};
use axum::{middleware::from_fn_with_state, routing::get, Json, Router};
use clap::{Arg, ArgMatches, Command};
use ipgate_forwarder::forwarder_base;
use ipgate_server::{
    config::config::{self, AppConfig, DEFAULT_CFG_PATH_ENV},
    context::state::IpgateState,
    waf::middleware::ipfilter_middleware,
};
use ipgate_utils::{panics::PanicHelper, tokio_signal::tokio_graceful_shutdown_signal};
use serde_json::{json, Value};
use std::{env, net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

pub struct WebServer {}

impl WebServer {
    pub const COMMAND_NAME: &'static str = "serve";

    pub fn build() -> Command {
        Command::new(Self::COMMAND_NAME)
            .about("Run the ipgate filtering Web Server.")
            .arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .action(clap::ArgAction::SetTrue)
                    .help("Verbose output."),
            )
    }

    #[tokio::main]
    pub async fn run(matches: &ArgMatches) -> Result<()> {
        PanicHelper::set_hook_default();

        let config = config::get_config();
        Self::print_banner(config.to_owned(), matches.get_flag("verbose"));

        // Notice: The chain is loaded before binding, an invalid rule must keep the server from starting.
        let state = IpgateState::new(&config).context("Failed to load the ipfilter chain")?;

        Self::start(&config, state).await
    }

    pub fn router(config: &Arc<AppConfig>, state: IpgateState) -> Result<Router> {
        tracing::debug!("Register Web server app routers ...");
        let router = Router::new()
            .route("/healthz", get(health))
            .merge(forwarder_base::init(&config.forward)?)
            // Notice: The first added layer is the outermost, requests are traced before being filtered.
            .layer(
                ServiceBuilder::new()
                    .layer(
                        TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                            tracing::info_span!(
                                "http_request",
                                method = %request.method(),
                                uri = %request.uri(),
                            )
                        }),
                    )
                    .layer(from_fn_with_state(state, ipfilter_middleware)),
            );
        Ok(router)
    }

    pub async fn start(config: &Arc<AppConfig>, state: IpgateState) -> Result<()> {
        let app_router = Self::router(config, state)?;

        let bind_addr = config.server.get_bind_addr();
        tracing::info!("Starting web server on {}", bind_addr);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("Failed to bind to {}", bind_addr))?;
        tracing::info!("Web server is ready on {}", bind_addr);

        axum::serve(
            listener,
            app_router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(tokio_graceful_shutdown_signal())
        .await
        .context("Error running web server")?;

        // The router, and with it the chain and its country databases, is dropped once drained.
        tracing::info!("Web server shut down gracefully");
        Ok(())
    }

    #[allow(clippy::print_stderr)]
    fn print_banner(config: Arc<AppConfig>, verbose: bool) {
        // http://www.network-science.de/ascii/#larry3d
        let ascii_name = r#"
     ______                            __
    /\__  _\                          /\ \__
    \/_/\ \/   _____      __      __  \ \ ,_\    __
       \ \ \  /\ '__`\  /'_ `\  /'__`\ \ \ \/  /'__`\
        \_\ \_\ \ \L\ \/\ \L\ \/\ \L\.\_\ \ \_/\  __/
        /\_____\\ \ ,__/\ \____ \ \__/.\_\\ \__\ \____\
        \/_____/ \ \ \/  \/___L\ \/__/\/_/ \/__/\/____/
                  \ \_\    /\____/
                   \/_/    \_/__/                 (Ipgate)
 "#;
        eprintln!();
        eprintln!("{}", ascii_name);
        eprintln!("                Package Version: {:?}", env!("CARGO_PKG_VERSION"));
        let path = env::var(DEFAULT_CFG_PATH_ENV).unwrap_or("none".to_string());
        eprintln!("        Configuration file path: {:?}", path);
        eprintln!(
            "            Web Serve listen on: \"{}://{}:{}\"",
            "http", &config.server.host, config.server.port
        );
        eprintln!(
            "                 Upstream URL is: {:?}",
            config.forward.upstream_url.as_deref().unwrap_or("none")
        );
        eprintln!("           Ipfilter rules count: {}", config.ipfilter.rules.len());
        if verbose {
            let config_json = serde_json::to_string(&config.inner).unwrap_or_default();
            eprintln!("Configuration loaded: {}", config_json);
        }
        eprintln!();
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "UP" }))
}
