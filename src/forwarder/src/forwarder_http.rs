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

use crate::forwarder_base::IForwarder;
use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{body::Body, response::Response};
use common_telemetry::{debug, info};
use hyper::{header, Method};
use ipgate_server::config::config::ForwardProperties;
use ipgate_types::forwarder::HttpIncomingRequest;
use reqwest::Proxy;
use std::{str::FromStr, sync::Arc, time::Duration};

// Connection scoped headers, never passed through in either direction.
const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

pub struct HttpForwardHandler {
    client: reqwest::Client,
    upstream_base_uri: String,
}

impl HttpForwardHandler {
    pub fn new(forward: &ForwardProperties, upstream_base_uri: &str) -> Result<Arc<Self>> {
        let mut builder = reqwest::ClientBuilder::new()
            .connect_timeout(Duration::from_secs(forward.connect_timeout))
            .read_timeout(Duration::from_secs(forward.read_timeout))
            .timeout(Duration::from_secs(forward.total_timeout))
            .connection_verbose(forward.verbose);
        if let Some(proxy) = &forward.http_proxy {
            builder = builder.proxy(Proxy::http(proxy).context("parse http proxy addr error")?);
        }
        Ok(Arc::new(Self {
            client: builder.build().context("build http client error")?,
            upstream_base_uri: upstream_base_uri.to_owned(),
        }))
    }

    fn get_upstream_url(&self, incoming: &HttpIncomingRequest) -> String {
        let path = incoming.path_and_query();
        let base = self.upstream_base_uri.as_str();
        // Join without doubling or dropping the slash between base and path.
        let url = if base.ends_with('/') && path.starts_with('/') {
            format!("{}{}", base, &path[1..])
        } else if !base.ends_with('/') && !path.starts_with('/') {
            format!("{}/{}", base, path)
        } else {
            format!("{}{}", base, path)
        };
        debug!("Resolved the upstream url: {}", url);
        url
    }

    // Forward the request to the upstream server.
    async fn do_forward_request(
        &self,
        incoming: Arc<HttpIncomingRequest>,
        forward_url: String,
    ) -> Result<Response<Body>> {
        let mut req_builder = self
            .client
            .request(Method::from_str(incoming.method.as_str())?, forward_url);

        // Copy original request headers, but exclude the connection related ones.
        for (name, value) in incoming.headers.iter() {
            let name = name.to_lowercase();
            if name == header::CONTENT_LENGTH.as_str() || HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
                continue;
            }
            if let Some(v) = value {
                req_builder = req_builder.header(name.as_str(), v.as_str());
            }
        }

        // The body is type of axum::Bytes is cheaply cloneable.
        if let Some(body) = incoming.body.to_owned() {
            req_builder = req_builder.body(body);
        }

        let resp = req_builder.send().await.context("Failed to send request to upstream")?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp
            .bytes()
            .await
            .context("Failed to read response body from upstream")?;

        info!(
            "Forwarded {} {} to upstream, status: {}",
            incoming.method,
            incoming.path_and_query(),
            status
        );

        let mut response = Response::builder()
            .status(status.as_u16())
            .body(Body::from(bytes))
            .context("Failed to build response")?;

        // Copy the headers from the upstream response, the body is fully buffered
        // so its length is set anew.
        let resp_headers = response.headers_mut();
        for (name, value) in headers.iter() {
            if *name == header::CONTENT_LENGTH || HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
                continue;
            }
            resp_headers.append(name, value.to_owned());
        }

        Ok(response)
    }
}

#[async_trait]
impl IForwarder for HttpForwardHandler {
    #[tracing::instrument(skip_all)]
    async fn http_forward(&self, incoming: Arc<HttpIncomingRequest>) -> Result<Response<Body>> {
        let url = self.get_upstream_url(&incoming);
        self.do_forward_request(incoming, url).await
    }
}
