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

use std::{collections::HashMap, sync::Arc};

use axum::{
    body::{to_bytes, Body, Bytes},
    extract::Request,
};

/// A fully buffered incoming request, as handed to the upstream forwarder
/// once the request has been admitted.
#[derive(Clone, Debug)]
pub struct HttpIncomingRequest {
    pub method: String,
    pub scheme: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub headers: HashMap<String, Option<String>>,
    pub path: String,
    pub query: Option<String>,
    pub body: Option<Bytes>,
}

impl HttpIncomingRequest {
    /// Buffers the request body up to `max_body_bytes`, a larger body is an error.
    pub async fn new(req: Request<Body>, max_body_bytes: usize) -> Result<Arc<Self>, axum::Error> {
        let (parts, body) = req.into_parts();
        let bytes = to_bytes(body, max_body_bytes).await?;
        let uri = &parts.uri;

        // Extract request headers.
        let headers = parts
            .headers
            .iter()
            .map(|(name, value)| {
                let key = name.as_str().to_string();
                let value = value.to_str().map(|v| v.to_string()).ok();
                (key, value)
            })
            .collect();

        // The authority is only part of the uri for absolute-form requests.
        let host = uri.host().map(|s| s.to_string()).or_else(|| {
            parts
                .headers
                .get(axum::http::header::HOST)
                .and_then(|h| h.to_str().ok())
                .map(|h| h.to_string())
        });

        tracing::trace!("Buffered incoming request {} {} ({} bytes)", parts.method, uri, bytes.len());

        Ok(Arc::new(HttpIncomingRequest {
            method: parts.method.to_string(),
            scheme: uri.scheme().map(|s| s.to_string()),
            host,
            port: uri.port_u16(),
            headers,
            path: uri.path().to_string(),
            query: uri.query().map(|s| s.to_string()),
            body: if bytes.is_empty() { None } else { Some(bytes) },
        }))
    }

    /// The path plus the query string, if any.
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.to_owned(),
        }
    }
}
