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

use crate::forwarder_http::HttpForwardHandler;
use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{Request, State},
    response::{IntoResponse, Response},
    Router,
};
use hyper::StatusCode;
use ipgate_server::config::config::ForwardProperties;
use ipgate_types::forwarder::HttpIncomingRequest;
use std::sync::Arc;

#[async_trait]
pub trait IForwarder: Send + Sync {
    async fn http_forward(&self, incoming: Arc<HttpIncomingRequest>) -> Result<Response<Body>>;
}

/// The handler admitted requests are delegated to.
#[derive(Clone)]
pub struct ForwarderState {
    pub forwarder: Option<Arc<dyn IForwarder>>,
    pub max_body_bytes: usize,
}

impl ForwarderState {
    pub fn new(forward: &ForwardProperties) -> Result<Self> {
        let forwarder: Option<Arc<dyn IForwarder>> = match &forward.upstream_url {
            Some(upstream) => {
                tracing::info!("Forwarding admitted requests to {}", upstream);
                let handler: Arc<dyn IForwarder> = HttpForwardHandler::new(forward, upstream)?;
                Some(handler)
            }
            None => {
                tracing::warn!("No upstream configured, admitted requests are answered with 404");
                None
            }
        };
        Ok(Self {
            forwarder,
            max_body_bytes: forward.max_body_bytes,
        })
    }
}

/// A router forwarding every request, to be merged as the fallback of the app.
pub fn init(forward: &ForwardProperties) -> Result<Router> {
    let state = ForwarderState::new(forward)?;
    Ok(Router::new().fallback(forward_handler).with_state(state))
}

pub async fn forward_handler(State(state): State<ForwarderState>, req: Request<Body>) -> Response {
    let Some(forwarder) = state.forwarder else {
        return StatusCode::NOT_FOUND.into_response();
    };

    // Wrap to unified incoming request.
    let incoming = match HttpIncomingRequest::new(req, state.max_body_bytes).await {
        Ok(incoming) => incoming,
        Err(e) => {
            tracing::debug!("Unable to buffer the request body: {}", e);
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    match forwarder.http_forward(incoming.to_owned()).await {
        Ok(response) => {
            tracing::debug!("[Forwarded] - {}", incoming.path_and_query());
            response
        }
        Err(err) => {
            tracing::warn!("[ForwardErr] - {} - {:#}", incoming.path_and_query(), err);
            (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response()
        }
    }
}
